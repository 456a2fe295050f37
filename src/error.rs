use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while walking a path segment by segment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("no path segment left to consume")]
    ExhaustedPath,
    #[error("{path} is not located under {root}")]
    NotUnderRoot { path: PathBuf, root: PathBuf },
}

/// Out-of-range history navigation. Caller errors, never retried.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    #[error("already at the oldest history entry")]
    AtHistoryStart,
    #[error("already at the newest history entry")]
    AtHistoryEnd,
}

/// Failures reported by a storage provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(PathBuf),
    #[error("access denied: {0}")]
    AccessDenied(PathBuf),
    #[error("i/o error on {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl StorageError {
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path),
            std::io::ErrorKind::PermissionDenied => StorageError::AccessDenied(path),
            _ => StorageError::Io {
                path,
                message: err.to_string(),
            },
        }
    }
}

/// Failures of a mutation executed through the privileged channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// Denied for lack of privilege. Eligible for an elevation retry.
    #[error("access denied: {0}")]
    AccessDenied(PathBuf),
    /// Held open by another process. Never retried.
    #[error("in use by another process: {0}")]
    InUse(PathBuf),
    #[error("not found: {0}")]
    NotFound(PathBuf),
    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("{0}")]
    Other(String),
}

impl OperationError {
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if is_sharing_violation(&err) {
            return OperationError::InUse(path);
        }
        match err.kind() {
            std::io::ErrorKind::NotFound => OperationError::NotFound(path),
            std::io::ErrorKind::PermissionDenied => OperationError::AccessDenied(path),
            std::io::ErrorKind::AlreadyExists => OperationError::AlreadyExists(path),
            _ => OperationError::Other(format!("{}: {}", path.display(), err)),
        }
    }
}

#[cfg(unix)]
fn is_sharing_violation(err: &std::io::Error) -> bool {
    // EBUSY, ETXTBSY
    matches!(err.raw_os_error(), Some(16) | Some(26))
}

#[cfg(windows)]
fn is_sharing_violation(err: &std::io::Error) -> bool {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    matches!(err.raw_os_error(), Some(32) | Some(33))
}

#[cfg(not(any(unix, windows)))]
fn is_sharing_violation(_err: &std::io::Error) -> bool {
    false
}

/// The privileged channel refused to escalate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("elevation denied: {reason}")]
pub struct ElevationDenied {
    pub reason: String,
}

/// Terminal failure of a privileged mutation after the retry protocol ran.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationFailure {
    #[error("not found: {0}")]
    NotFound(PathBuf),
    #[error("in use by another process: {0}")]
    InUse(PathBuf),
    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("user declined elevation")]
    ElevationDeclined,
    #[error(transparent)]
    ElevationFailed(#[from] ElevationDenied),
    #[error("access denied after elevation: {0}")]
    DeniedAfterElevation(PathBuf),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Failures of navigation requests on a view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavError {
    #[error("could not locate folder {0}")]
    LocateFolderFailed(PathBuf),
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),
    #[error("{0} is hidden")]
    Hidden(PathBuf),
    #[error("{0} lies under a hidden folder")]
    HiddenAncestor(PathBuf),
    #[error("access denied: {0}")]
    AccessDenied(PathBuf),
    #[error("no folder is displayed")]
    NoCurrentFolder,
    #[error("already at the volume root")]
    AtRoot,
    #[error("breadcrumb segment {0} does not exist")]
    NoSuchSegment(usize),
    #[error("no breadcrumb flyout is open")]
    NoOpenFlyout,
    #[error("cannot drop onto {0}: it is inside a dragged folder")]
    DropIntoSource(PathBuf),
    #[error("invalid folder name: {0:?}")]
    InvalidName(String),
    #[error("view has been closed")]
    ViewClosed,
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Storage(StorageError),
    #[error(transparent)]
    Operation(#[from] OperationFailure),
}

impl From<StorageError> for NavError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => NavError::PathNotFound(path),
            StorageError::AccessDenied(path) => NavError::AccessDenied(path),
            other => NavError::Storage(other),
        }
    }
}

/// Failures of the persistent path/search history. Best-effort: logged only.
#[derive(Error, Debug)]
pub enum HistoryStoreError {
    #[error("history i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("history format: {0}")]
    Format(String),
}

/// Config file load/save failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("config i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize: {0}")]
    Serialize(#[from] toml::ser::Error),
}
