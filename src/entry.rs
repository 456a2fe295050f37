use crate::model::path::display_name_of;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A point in the storage namespace: absolute path plus display name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub display_name: String,
}

impl Location {
    pub fn new(path: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
        }
    }

    /// Location named after the last path component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = display_name_of(&path);
        Self { path, display_name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Label shown for the owning tab, `/` for a filesystem root.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            "/"
        } else {
            &self.display_name
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Folder,
    File,
}

/// One row of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEntry {
    pub path: PathBuf,
    pub name: String,
    pub kind: EntryKind,
    pub hidden: bool,
}

impl StorageEntry {
    pub fn folder(path: impl Into<PathBuf>) -> Self {
        Self::with_kind(path.into(), EntryKind::Folder)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_kind(path.into(), EntryKind::File)
    }

    fn with_kind(path: PathBuf, kind: EntryKind) -> Self {
        let name = display_name_of(&path);
        let hidden = name.starts_with('.');
        Self {
            path,
            name,
            kind,
            hidden,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn location(&self) -> Location {
        Location::new(self.path.clone(), self.name.clone())
    }
}

/// Folders first, then case-insensitive by name.
pub fn sort_entries(entries: &mut [StorageEntry]) {
    entries.sort_by(|a, b| {
        if a.is_dir() != b.is_dir() {
            return b.is_dir().cmp(&a.is_dir());
        }
        a.name.to_lowercase().cmp(&b.name.to_lowercase())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folders_sort_before_files() {
        let mut entries = vec![
            StorageEntry::file("/r/b.txt"),
            StorageEntry::folder("/r/Zeta"),
            StorageEntry::file("/r/A.txt"),
            StorageEntry::folder("/r/alpha"),
        ];
        sort_entries(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["alpha", "Zeta", "A.txt", "b.txt"]);
    }

    #[test]
    fn dot_names_are_hidden() {
        assert!(StorageEntry::folder("/r/.git").hidden);
        assert!(!StorageEntry::folder("/r/src").hidden);
    }

    #[test]
    fn root_location_label() {
        let root = Location::from_path("/");
        assert_eq!(root.label(), "/");
        assert_eq!(Location::from_path("/home/kei").label(), "kei");
    }
}
