use crate::core::cancel::CancelToken;
use crate::core::error::{DetectError, Result};
use crate::core::image::Image;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Supplies one ordered, fully decoded batch per call.
pub trait ImageSource {
    fn load(&self, cancel: &CancelToken) -> Result<Vec<Image>>;
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub recursive: bool,
    pub supported_formats: Vec<String>,
    /// Directories never descended into, e.g. the output of a previous run.
    pub exclude: Vec<PathBuf>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            supported_formats: ["png", "jpg", "jpeg", "webp", "bmp", "gif", "tif", "tiff"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            exclude: Vec::new(),
        }
    }
}

/// Images in a local directory, ordered by path.
#[derive(Debug, Clone)]
pub struct FolderSource {
    dir: PathBuf,
    options: ScanOptions,
}

impl FolderSource {
    pub fn new(dir: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self {
            dir: dir.into(),
            options,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Supported image files under the directory, sorted.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(DetectError::InvalidPath {
                path: self.dir.to_string_lossy().to_string(),
            });
        }

        let walker = if self.options.recursive {
            WalkDir::new(&self.dir)
        } else {
            WalkDir::new(&self.dir).max_depth(1)
        };

        // compared canonically so `out` and `./dir/out` are the same directory
        let excluded: Vec<PathBuf> = self
            .options
            .exclude
            .iter()
            .filter_map(|path| path.canonicalize().ok())
            .collect();
        let is_excluded = |path: &Path| {
            path.canonicalize()
                .map(|canonical| excluded.contains(&canonical))
                .unwrap_or(false)
        };

        let mut files = Vec::new();
        let entries = walker.follow_links(false).into_iter().filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_type().is_dir() || !is_excluded(entry.path())
        });
        for entry in entries {
            // walk errors fail the batch, like decode errors
            let entry = entry.map_err(|e| {
                log::warn!("Failed to walk {}: {}", self.dir.display(), e);
                DetectError::Io(e.into())
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(extension) = path.extension() {
                let ext = extension.to_string_lossy().to_lowercase();
                if self.options.supported_formats.contains(&ext) {
                    files.push(path.to_path_buf());
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

impl ImageSource for FolderSource {
    /// Any file that fails to decode fails the whole batch.
    fn load(&self, cancel: &CancelToken) -> Result<Vec<Image>> {
        let files = self.discover()?;
        log::info!("Decoding {} images from {}", files.len(), self.dir.display());

        files
            .par_iter()
            .enumerate()
            .map(|(id, path)| -> Result<Image> {
                cancel.check()?;
                let decoded = image::open(path).map_err(|source| DetectError::Decode {
                    path: path.clone(),
                    source,
                })?;
                Ok(Image::from_dynamic(id, &decoded, path.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::RASTER_SIZE;
    use crate::core::test_utils::textured_rgb;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discovers_supported_files_in_order() {
        let temp_dir = TempDir::new().unwrap();
        textured_rgb(1).save(temp_dir.path().join("b.png")).unwrap();
        textured_rgb(2).save(temp_dir.path().join("a.jpg")).unwrap();
        fs::rename(temp_dir.path().join("a.jpg"), temp_dir.path().join("a.JPG")).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"not an image").unwrap();
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        textured_rgb(3).save(temp_dir.path().join("nested/c.png")).unwrap();

        let flat = FolderSource::new(temp_dir.path(), ScanOptions::default());
        let files = flat.discover().unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);

        let recursive = FolderSource::new(
            temp_dir.path(),
            ScanOptions {
                recursive: true,
                ..ScanOptions::default()
            },
        );
        assert_eq!(recursive.discover().unwrap().len(), 3);
    }

    #[test]
    fn test_load_assigns_ordinals_and_normalizes() {
        let temp_dir = TempDir::new().unwrap();
        image::RgbImage::from_pixel(640, 320, image::Rgb([200, 10, 10]))
            .save(temp_dir.path().join("0.png"))
            .unwrap();
        textured_rgb(5).save(temp_dir.path().join("1.png")).unwrap();

        let images = FolderSource::new(temp_dir.path(), ScanOptions::default())
            .load(&CancelToken::new())
            .unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].id(), 0);
        assert_eq!(images[1].id(), 1);
        assert!(images[0].source().ends_with("0.png"));
        assert_eq!(images[0].raster().dimensions(), (RASTER_SIZE, RASTER_SIZE));
    }

    #[test]
    fn test_undecodable_file_fails_batch() {
        let temp_dir = TempDir::new().unwrap();
        textured_rgb(5).save(temp_dir.path().join("good.png")).unwrap();
        fs::write(temp_dir.path().join("broken.png"), b"definitely not a png").unwrap();

        let result = FolderSource::new(temp_dir.path(), ScanOptions::default())
            .load(&CancelToken::new());
        assert!(matches!(result, Err(DetectError::Decode { .. })));
    }

    #[test]
    fn test_excluded_directory_is_not_scanned() {
        let temp_dir = TempDir::new().unwrap();
        textured_rgb(1).save(temp_dir.path().join("a.png")).unwrap();
        let out = temp_dir.path().join("duplicates");
        fs::create_dir(&out).unwrap();
        textured_rgb(1).save(out.join("1_dup_1.jpg")).unwrap();
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        textured_rgb(2).save(temp_dir.path().join("nested/b.png")).unwrap();

        let source = FolderSource::new(
            temp_dir.path(),
            ScanOptions {
                recursive: true,
                exclude: vec![temp_dir.path().join(".").join("duplicates")],
                ..ScanOptions::default()
            },
        );
        let files = source.discover().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|path| !path.starts_with(&out)));

        // a not-yet-created exclusion is harmless
        let source = FolderSource::new(
            temp_dir.path(),
            ScanOptions {
                recursive: true,
                exclude: vec![temp_dir.path().join("missing")],
                ..ScanOptions::default()
            },
        );
        assert_eq!(source.discover().unwrap().len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_fails_discovery() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        textured_rgb(1).save(temp_dir.path().join("a.png")).unwrap();
        let locked = temp_dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // privileged users read through the mode bits; nothing to check then
        let readable = fs::read_dir(&locked).is_ok();
        let result = FolderSource::new(
            temp_dir.path(),
            ScanOptions {
                recursive: true,
                ..ScanOptions::default()
            },
        )
        .discover();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        if !readable {
            assert!(matches!(result, Err(DetectError::Io(_))));
        }
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let source = FolderSource::new(temp_dir.path().join("missing"), ScanOptions::default());
        assert!(matches!(
            source.discover(),
            Err(DetectError::InvalidPath { .. })
        ));
    }
}
