use crate::error::{ElevationDenied, OperationError};
use crate::io::provider::PrivilegedChannel;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A filesystem mutation handed to the privileged channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileOperation {
    /// Moves to the recycle bin unless `permanent`.
    Delete { paths: Vec<PathBuf>, permanent: bool },
    Move { sources: Vec<PathBuf>, destination: PathBuf },
    Copy { sources: Vec<PathBuf>, destination: PathBuf },
    Rename { path: PathBuf, new_name: String },
    /// Creates `name` under `parent`, suffixing ` (2)`, ` (3)` on collision.
    CreateFolder { parent: PathBuf, name: String },
    /// Runs a program (address-bar command alias).
    Launch {
        program: String,
        args: Vec<String>,
        working_dir: Option<PathBuf>,
    },
    /// Opens a file with its default application.
    Open { path: PathBuf },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Delete,
    Move,
    Copy,
    Rename,
    Create,
    Launch,
    Open,
}

impl FileOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            FileOperation::Delete { .. } => OperationKind::Delete,
            FileOperation::Move { .. } => OperationKind::Move,
            FileOperation::Copy { .. } => OperationKind::Copy,
            FileOperation::Rename { .. } => OperationKind::Rename,
            FileOperation::CreateFolder { .. } => OperationKind::Create,
            FileOperation::Launch { .. } => OperationKind::Launch,
            FileOperation::Open { .. } => OperationKind::Open,
        }
    }
}

/// Result of a completed operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationReport {
    pub summary: String,
    /// Path produced by a rename or folder creation.
    pub created: Option<PathBuf>,
}

impl OperationReport {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            created: None,
        }
    }

    pub fn with_created(mut self, path: PathBuf) -> Self {
        self.created = Some(path);
        self
    }
}

/// First free `name`, `name (2)`, `name (3)`... under `parent`.
pub fn unique_child_name(parent: &Path, name: &str, taken: impl Fn(&Path) -> bool) -> PathBuf {
    let first = parent.join(name);
    if !taken(&first) {
        return first;
    }
    let mut n = 2;
    loop {
        let candidate = parent.join(format!("{} ({})", name, n));
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Executes operations directly against the local filesystem.
///
/// Elevation needs an external helper, which this channel does not have:
/// `elevate` always reports denial.
#[derive(Clone, Debug, Default)]
pub struct LocalChannel;

impl LocalChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PrivilegedChannel for LocalChannel {
    async fn run_privileged(
        &self,
        operation: &FileOperation,
    ) -> Result<OperationReport, OperationError> {
        let operation = operation.clone();
        tokio::task::spawn_blocking(move || execute(operation))
            .await
            .map_err(|e| OperationError::Other(e.to_string()))?
    }

    async fn elevate(&self) -> Result<(), ElevationDenied> {
        Err(ElevationDenied {
            reason: "no elevation helper is available".to_string(),
        })
    }
}

fn execute(operation: FileOperation) -> Result<OperationReport, OperationError> {
    match operation {
        FileOperation::Delete { paths, permanent } => delete_files(&paths, permanent),
        FileOperation::Move {
            sources,
            destination,
        } => move_files(&sources, &destination),
        FileOperation::Copy {
            sources,
            destination,
        } => copy_files(&sources, &destination),
        FileOperation::Rename { path, new_name } => rename_file(&path, &new_name),
        FileOperation::CreateFolder { parent, name } => create_directory(&parent, &name),
        FileOperation::Launch {
            program,
            args,
            working_dir,
        } => launch(&program, &args, working_dir.as_deref()),
        FileOperation::Open { path } => {
            open::that_detached(&path).map_err(|e| OperationError::from_io(&path, e))?;
            Ok(OperationReport::new(format!("Opened {}", path.display())))
        }
    }
}

fn file_name_of(src: &Path) -> Result<&std::ffi::OsStr, OperationError> {
    src.file_name()
        .ok_or_else(|| OperationError::Other(format!("Invalid source: {}", src.display())))
}

/// A folder cannot be copied or moved into itself or one of its descendants.
fn refuse_nested(sources: &[PathBuf], dest_dir: &Path) -> Result<(), OperationError> {
    match sources.iter().find(|src| dest_dir.starts_with(src)) {
        Some(src) => Err(OperationError::Other(format!(
            "{} is inside {}",
            dest_dir.display(),
            src.display()
        ))),
        None => Ok(()),
    }
}

fn copy_files(sources: &[PathBuf], dest_dir: &Path) -> Result<OperationReport, OperationError> {
    refuse_nested(sources, dest_dir)?;
    for src in sources {
        let dest = dest_dir.join(file_name_of(src)?);
        if src.is_dir() {
            copy_dir_recursive(src, &dest)?;
        } else {
            fs::copy(src, &dest).map_err(|e| OperationError::from_io(src, e))?;
        }
    }
    Ok(OperationReport::new(format!("Copied {} item(s)", sources.len())))
}

fn move_files(sources: &[PathBuf], dest_dir: &Path) -> Result<OperationReport, OperationError> {
    refuse_nested(sources, dest_dir)?;
    for src in sources {
        let dest = dest_dir.join(file_name_of(src)?);
        fs::rename(src, &dest).map_err(|e| OperationError::from_io(src, e))?;
    }
    Ok(OperationReport::new(format!("Moved {} item(s)", sources.len())))
}

fn delete_files(paths: &[PathBuf], permanent: bool) -> Result<OperationReport, OperationError> {
    for path in paths {
        if !path.exists() {
            return Err(OperationError::NotFound(path.clone()));
        }
        if !permanent {
            trash::delete(path).map_err(|e| trash_error(path, e))?;
        } else if path.is_dir() {
            fs::remove_dir_all(path).map_err(|e| OperationError::from_io(path, e))?;
        } else {
            fs::remove_file(path).map_err(|e| OperationError::from_io(path, e))?;
        }
    }
    let verb = if permanent { "Deleted" } else { "Trashed" };
    Ok(OperationReport::new(format!("{} {} item(s)", verb, paths.len())))
}

fn trash_error(path: &Path, err: trash::Error) -> OperationError {
    let message = err.to_string();
    if message.to_lowercase().contains("permission denied") {
        OperationError::AccessDenied(path.to_path_buf())
    } else {
        OperationError::Other(format!("{}: {}", path.display(), message))
    }
}

fn rename_file(old_path: &Path, new_name: &str) -> Result<OperationReport, OperationError> {
    let parent = old_path
        .parent()
        .ok_or_else(|| OperationError::Other("Cannot get parent directory".to_string()))?;
    let new_path = parent.join(new_name);
    if new_path.exists() {
        return Err(OperationError::AlreadyExists(new_path));
    }
    fs::rename(old_path, &new_path).map_err(|e| OperationError::from_io(old_path, e))?;
    Ok(OperationReport::new(format!("Renamed to {}", new_name)).with_created(new_path))
}

fn create_directory(parent: &Path, name: &str) -> Result<OperationReport, OperationError> {
    let new_dir = unique_child_name(parent, name, |p| p.exists());
    fs::create_dir(&new_dir).map_err(|e| OperationError::from_io(&new_dir, e))?;
    Ok(OperationReport::new(format!("Created directory: {}", new_dir.display()))
        .with_created(new_dir))
}

fn launch(
    program: &str,
    args: &[String],
    working_dir: Option<&Path>,
) -> Result<OperationReport, OperationError> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }
    command
        .spawn()
        .map_err(|e| OperationError::from_io(program, e))?;
    Ok(OperationReport::new(format!("Launched {}", program)))
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), OperationError> {
    fs::create_dir_all(dest).map_err(|e| OperationError::from_io(dest, e))?;

    for entry in fs::read_dir(src).map_err(|e| OperationError::from_io(src, e))? {
        let entry = entry.map_err(|e| OperationError::from_io(src, e))?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if path.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            fs::copy(&path, &dest_path).map_err(|e| OperationError::from_io(&path, e))?;
        }
    }

    Ok(())
}
