//! Input discovery for the batch CLI: turn a directory into ordered sources.
//!
//! The scan is non-recursive and keeps every non-directory entry, following
//! symlinks, whose extension is one of [`SUPPORTED_EXTENSIONS`]
//! (case-insensitive). File names are sorted
//! lexicographically so `001.jpg` precedes `002.jpg`; the sorted position
//! becomes each source's ordering index.

use crate::error::ConvertError;
use crate::source::{ImageSource, SUPPORTED_EXTENSIONS};
use std::path::{Path, PathBuf};
use tracing::debug;

/// `true` if the path carries one of the supported image extensions.
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// List supported image files directly inside `dir`, sorted by file name.
pub async fn discover_images(dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    let unreadable = |source| ConvertError::InputDirUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(unreadable)?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        let path = entry.path();
        if !has_supported_extension(&path) {
            continue;
        }
        // `metadata` follows symlinks; dangling links are skipped.
        match tokio::fs::metadata(&path).await {
            Ok(meta) if !meta.is_dir() => found.push(path),
            Ok(_) => {}
            Err(e) => debug!(path = %path.display(), "skipping unreadable entry: {e}"),
        }
    }

    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), count = found.len(), "discovered images");
    Ok(found)
}

/// Discover images in `dir` and wrap each in a lazily-opened [`ImageSource`].
pub async fn sources_from_dir(dir: &Path) -> Result<Vec<ImageSource>, ConvertError> {
    Ok(discover_images(dir)
        .await?
        .into_iter()
        .enumerate()
        .map(|(index, path)| ImageSource::from_path(index, path))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_filter() {
        assert!(has_supported_extension(Path::new("a.JPG")));
        assert!(has_supported_extension(Path::new("dir/b.webp")));
        assert!(has_supported_extension(Path::new("c.jpeg")));
        assert!(!has_supported_extension(Path::new("d.gif")));
        assert!(!has_supported_extension(Path::new("notes.txt")));
        assert!(!has_supported_extension(Path::new("png")));
    }

    #[tokio::test]
    async fn discovers_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "c.webp", "readme.txt", "z.gif"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let found = discover_images(dir.path()).await.unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.webp"]);
    }

    #[tokio::test]
    async fn sources_carry_sorted_indices() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["002.png", "001.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let sources = sources_from_dir(dir.path()).await.unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].original_name, "001.png");
        assert_eq!(sources[0].index(), 0);
        assert_eq!(sources[1].index(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn follows_symlinks_but_not_to_directories() {
        let elsewhere = tempfile::tempdir().unwrap();
        let real_file = elsewhere.path().join("real.png");
        std::fs::write(&real_file, b"x").unwrap();
        let real_dir = elsewhere.path().join("folder");
        std::fs::create_dir(&real_dir).unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(&real_file, dir.path().join("a.png")).unwrap();
        std::os::unix::fs::symlink(&real_dir, dir.path().join("b.png")).unwrap();
        std::os::unix::fs::symlink(elsewhere.path().join("gone.png"), dir.path().join("c.png")).unwrap();

        let found = discover_images(dir.path()).await.unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png"]);
    }

    #[tokio::test]
    async fn missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_images(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, ConvertError::InputDirUnreadable { .. }));
    }
}
