use crate::entry::{sort_entries, EntryKind, StorageEntry};
use crate::error::StorageError;
use crate::io::provider::StorageProvider;
use crate::model::path::display_name_of;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

pub fn read_directory(path: &Path, show_hidden: bool) -> Result<Vec<StorageEntry>, std::io::Error> {
    let mut entries = Vec::new();
    let read_dir = fs::read_dir(path)?;

    for entry in read_dir.flatten() {
        let path = entry.path();
        let is_dir = match entry.file_type() {
            Ok(ft) if ft.is_symlink() => path.is_dir(),
            Ok(ft) => ft.is_dir(),
            Err(_) => continue,
        };
        let mut storage_entry = if is_dir {
            StorageEntry::folder(path)
        } else {
            StorageEntry::file(path)
        };
        storage_entry.hidden = is_hidden_path(&storage_entry.path);
        if !show_hidden && storage_entry.hidden {
            continue;
        }
        entries.push(storage_entry);
    }
    sort_entries(&mut entries);
    Ok(entries)
}

#[cfg(windows)]
pub fn is_hidden_path(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    let dotted = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false);
    dotted
        || fs::metadata(path)
            .map(|m| m.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
            .unwrap_or(false)
}

#[cfg(not(windows))]
pub fn is_hidden_path(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn probe_subfolders(path: &Path, show_hidden: bool) -> bool {
    let Ok(read_dir) = fs::read_dir(path) else {
        return false;
    };
    read_dir.flatten().any(|entry| {
        let child = entry.path();
        child.is_dir() && (show_hidden || !is_hidden_path(&child))
    })
}

/// The local filesystem, enumerated on the blocking pool.
#[derive(Clone, Debug, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

async fn blocking<T, F>(path: &Path, f: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce(PathBuf) -> Result<T, std::io::Error> + Send + 'static,
{
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || f(owned))
        .await
        .map_err(|e| StorageError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .map_err(|e| StorageError::from_io(path, e))
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn list_children(
        &self,
        path: &Path,
        include_hidden: bool,
    ) -> Result<Vec<StorageEntry>, StorageError> {
        blocking(path, move |p| read_directory(&p, include_hidden)).await
    }

    async fn kind(&self, path: &Path) -> Result<EntryKind, StorageError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        Ok(if metadata.is_dir() {
            EntryKind::Folder
        } else {
            EntryKind::File
        })
    }

    async fn display_name(&self, path: &Path) -> Result<String, StorageError> {
        tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        Ok(display_name_of(path))
    }

    async fn is_hidden(&self, path: &Path) -> bool {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || is_hidden_path(&owned))
            .await
            .unwrap_or(false)
    }

    async fn has_subfolders(&self, path: &Path, include_hidden: bool) -> bool {
        blocking(path, move |p| Ok(probe_subfolders(&p, include_hidden)))
            .await
            .unwrap_or(false)
    }

    #[cfg(windows)]
    fn volumes(&self) -> Vec<PathBuf> {
        (b'A'..=b'Z')
            .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
            .filter(|drive| drive.exists())
            .collect()
    }

    #[cfg(not(windows))]
    fn volumes(&self) -> Vec<PathBuf> {
        vec![PathBuf::from("/")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn populate() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("beta")).unwrap();
        fs::create_dir(dir.path().join(".cache")).unwrap();
        fs::create_dir_all(dir.path().join("Alpha/inner")).unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        dir
    }

    #[test]
    fn read_directory_hides_dot_entries() {
        let dir = populate();
        let names: Vec<_> = read_directory(dir.path(), false)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["Alpha", "beta", "a.txt"]);

        let all = read_directory(dir.path(), true).unwrap();
        assert!(all.iter().any(|e| e.name == ".cache" && e.hidden));
    }

    #[tokio::test]
    async fn local_storage_probes() {
        let dir = populate();
        let storage = LocalStorage::new();
        assert!(storage.has_subfolders(&dir.path().join("Alpha"), false).await);
        assert!(!storage.has_subfolders(&dir.path().join("beta"), false).await);
        assert_eq!(
            storage.kind(&dir.path().join("a.txt")).await.unwrap(),
            EntryKind::File
        );
        assert!(storage.is_hidden(&dir.path().join(".cache")).await);
        assert!(!storage.exists(&dir.path().join("missing")).await);
    }

    #[tokio::test]
    async fn listing_missing_folder_is_not_found() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = LocalStorage::new()
            .list_children(&missing, false)
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::NotFound(missing));
    }

    #[cfg(unix)]
    #[test]
    fn root_of_local_path_is_slash() {
        let storage = LocalStorage::new();
        assert_eq!(storage.root_of(Path::new("/usr/lib")), PathBuf::from("/"));
    }
}
