use crate::core::image::Image;
use crate::core::ledger::Pair;

/// Which side of a duplicate pair an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn tag(&self) -> &'static str {
        match self {
            Side::Left => "dup_1",
            Side::Right => "dup_2",
        }
    }
}

/// One output file of a duplicate pair.
#[derive(Debug, Clone, Copy)]
pub struct Artifact<'a> {
    /// 1-based position of the pair in the result sequence.
    pub index: usize,
    pub side: Side,
    pub image: &'a Image,
}

impl Artifact<'_> {
    pub fn file_name(&self) -> String {
        format!("{}_{}.jpg", self.index, self.side.tag())
    }
}

/// Turn the ordered duplicate pairs into `(left, right)` artifacts named by
/// their 1-based sequence index. Pairs are taken as given; uniqueness is the
/// ledger's job.
pub fn assemble<'a>(pairs: &[Pair], images: &'a [Image]) -> Vec<(Artifact<'a>, Artifact<'a>)> {
    pairs
        .iter()
        .enumerate()
        .map(|(offset, pair)| {
            let index = offset + 1;
            (
                Artifact {
                    index,
                    side: Side::Left,
                    image: &images[pair.first()],
                },
                Artifact {
                    index,
                    side: Side::Right,
                    image: &images[pair.second()],
                },
            )
        })
        .collect()
}
