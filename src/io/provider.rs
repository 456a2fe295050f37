// Collaborator seams: storage, privileged execution, prompting, history
use crate::entry::{EntryKind, StorageEntry};
use crate::error::{ElevationDenied, HistoryStoreError, OperationError, StorageError};
use crate::io::ops::{FileOperation, OperationReport};
use crate::message::{Choice, Dialog};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Read access to the storage namespace.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Direct children of `path`, folders first.
    async fn list_children(
        &self,
        path: &Path,
        include_hidden: bool,
    ) -> Result<Vec<StorageEntry>, StorageError>;

    async fn kind(&self, path: &Path) -> Result<EntryKind, StorageError>;

    async fn exists(&self, path: &Path) -> bool {
        self.kind(path).await.is_ok()
    }

    async fn display_name(&self, path: &Path) -> Result<String, StorageError>;

    async fn is_hidden(&self, path: &Path) -> bool;

    /// Cheap probe used to flag tree nodes as expandable.
    async fn has_subfolders(&self, path: &Path, include_hidden: bool) -> bool {
        match self.list_children(path, include_hidden).await {
            Ok(children) => children.iter().any(StorageEntry::is_dir),
            Err(_) => false,
        }
    }

    /// Known devices / mount roots.
    fn volumes(&self) -> Vec<PathBuf>;

    /// Volume root containing `path`: the longest matching volume, else the
    /// path's own filesystem root.
    fn root_of(&self, path: &Path) -> PathBuf {
        self.volumes()
            .into_iter()
            .filter(|volume| path.starts_with(volume))
            .max_by_key(|volume| volume.components().count())
            .unwrap_or_else(|| filesystem_root(path))
    }
}

/// The `/` or drive-prefix part of `path`.
pub fn filesystem_root(path: &Path) -> PathBuf {
    path.components()
        .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
        .collect()
}

/// Executes mutations, possibly with escalated rights.
#[async_trait]
pub trait PrivilegedChannel: Send + Sync {
    async fn run_privileged(
        &self,
        operation: &FileOperation,
    ) -> Result<OperationReport, OperationError>;

    /// Asks the platform for elevated rights for subsequent attempts.
    async fn elevate(&self) -> Result<(), ElevationDenied>;
}

/// Confirmation/notice presenter.
#[async_trait]
pub trait Prompt: Send + Sync {
    async fn confirm(&self, dialog: &Dialog) -> Choice;
}

/// Persistent path-visit and search-term history shared by all views.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_path_visit(&self, path: &Path) -> Result<(), HistoryStoreError>;
    async fn record_search_term(&self, term: &str) -> Result<(), HistoryStoreError>;
    /// Remembered paths and terms starting with `prefix`, most recent first.
    async fn suggestions_for(&self, prefix: &str) -> Result<Vec<String>, HistoryStoreError>;
}
