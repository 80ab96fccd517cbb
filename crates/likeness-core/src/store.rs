//! Read-only reference photo store.

use std::path::{Component, Path, PathBuf};

/// File extensions treated as reference photos (lowercase).
const PHOTO_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Reference photos addressed by identifier.
pub trait PhotoStore: Send + Sync {
    /// Whether `name` resolves to an existing photo.
    fn exists(&self, name: &str) -> bool;

    /// All photo identifiers, sorted. Empty when the store is unreachable.
    fn list(&self) -> Vec<String>;

    /// Location handed to the comparator, if `name` is a valid identifier.
    fn path(&self, name: &str) -> Option<PathBuf>;

    fn is_reachable(&self) -> bool;
}

/// Photos stored as files directly inside one directory.
#[derive(Debug, Clone)]
pub struct DirectoryPhotoStore {
    root: PathBuf,
}

impl DirectoryPhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Only a single plain path component is an identifier: no separators,
/// no `..`, no absolute paths.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}

fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| PHOTO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl PhotoStore for DirectoryPhotoStore {
    fn exists(&self, name: &str) -> bool {
        self.path(name).is_some_and(|p| p.is_file())
    }

    fn list(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(root = %self.root.display(), error = %e, "photo store unreadable");
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_photo(path))
            .filter_map(|path| path.file_name()?.to_str().map(str::to_owned))
            .collect();
        names.sort();
        names
    }

    fn path(&self, name: &str) -> Option<PathBuf> {
        is_plain_file_name(name).then(|| self.root.join(name))
    }

    fn is_reachable(&self) -> bool {
        self.root.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store_with(files: &[&str]) -> (TempDir, DirectoryPhotoStore) {
        let dir = TempDir::new().unwrap();
        for f in files {
            fs::write(dir.path().join(f), b"x").unwrap();
        }
        let store = DirectoryPhotoStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_exists() {
        let (_dir, store) = store_with(&["alice.jpg"]);
        assert!(store.exists("alice.jpg"));
        assert!(!store.exists("bob.jpg"));
        assert!(!store.exists(""));
    }

    #[test]
    fn test_traversal_never_resolves() {
        let (dir, store) = store_with(&["alice.jpg"]);
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("x.jpg"), b"x").unwrap();

        for name in ["../alice.jpg", "sub/x.jpg", "/etc/passwd", "..", ".", "./alice.jpg"] {
            assert!(store.path(name).is_none(), "{name}");
            assert!(!store.exists(name), "{name}");
        }
    }

    #[test]
    fn test_directory_is_not_a_photo() {
        let (dir, store) = store_with(&[]);
        fs::create_dir(dir.path().join("folder.jpg")).unwrap();
        assert!(!store.exists("folder.jpg"));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let (_dir, store) =
            store_with(&["zed.PNG", "notes.txt", "amy.jpeg", "bo.webp", "cy.jpg", "noext"]);
        assert_eq!(store.list(), vec!["amy.jpeg", "bo.webp", "cy.jpg", "zed.PNG"]);
    }

    #[test]
    fn test_unreachable_store() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryPhotoStore::new(dir.path().join("missing"));
        assert!(!store.is_reachable());
        assert!(store.list().is_empty());
        assert!(!store.exists("a.jpg"));
    }
}
