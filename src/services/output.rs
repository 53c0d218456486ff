use crate::core::assembler::Artifact;
use crate::core::error::Result;
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

/// Persists assembled duplicate pairs somewhere run-scoped.
pub trait ResultSink {
    /// Returns the number of artifacts written.
    fn persist(&mut self, artifacts: &[(Artifact<'_>, Artifact<'_>)]) -> Result<usize>;
}

/// Writes `{index}_dup_1.jpg` / `{index}_dup_2.jpg` into a local directory.
#[derive(Debug, Clone)]
pub struct FolderSink {
    dir: PathBuf,
}

impl FolderSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the target already holds entries that `persist` would wipe.
    pub fn has_existing_content(&self) -> bool {
        fs::read_dir(&self.dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    fn reset(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn write(&self, artifact: &Artifact<'_>) -> Result<()> {
        let rgb = artifact_pixels(artifact);
        rgb.save(self.dir.join(artifact.file_name()))?;
        Ok(())
    }
}

/// The original file at full resolution when it can still be read, the
/// normalized raster otherwise.
fn artifact_pixels(artifact: &Artifact<'_>) -> RgbImage {
    let source = artifact.image.source();
    if source.is_file() {
        match image::open(source) {
            Ok(original) => return original.to_rgb8(),
            Err(e) => log::warn!(
                "Falling back to raster for {}: {}",
                source.display(),
                e
            ),
        }
    }
    artifact.image.to_rgb8()
}

impl ResultSink for FolderSink {
    fn persist(&mut self, artifacts: &[(Artifact<'_>, Artifact<'_>)]) -> Result<usize> {
        self.reset()?;
        let mut written = 0;
        for (left, right) in artifacts {
            self.write(left)?;
            self.write(right)?;
            written += 2;
        }
        log::info!("Wrote {} artifacts to {}", written, self.dir.display());
        Ok(written)
    }
}
