// In-memory collaborators for tests and headless sessions
use crate::entry::{sort_entries, EntryKind, StorageEntry};
use crate::error::{ElevationDenied, OperationError, StorageError};
use crate::io::ops::{unique_child_name, FileOperation, OperationReport};
use crate::io::provider::{PrivilegedChannel, Prompt, StorageProvider};
use crate::message::{Choice, Dialog};
use crate::model::path::display_name_of;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Debug)]
struct MemNode {
    kind: EntryKind,
    hidden: bool,
}

impl MemNode {
    fn new(path: &Path, kind: EntryKind) -> Self {
        Self {
            kind,
            hidden: display_name_of(path).starts_with('.'),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryFs {
    nodes: BTreeMap<PathBuf, MemNode>,
    volumes: Vec<(PathBuf, String)>,
    denied: HashSet<PathBuf>,
    broken_names: HashSet<PathBuf>,
    listings: HashMap<PathBuf, usize>,
}

impl MemoryFs {
    fn insert_with_ancestors(&mut self, path: &Path, kind: EntryKind) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.file_name().is_none() {
                break;
            }
            self.nodes
                .entry(ancestor.to_path_buf())
                .or_insert_with(|| MemNode::new(ancestor, EntryKind::Folder));
        }
        self.nodes
            .insert(path.to_path_buf(), MemNode::new(path, kind));
    }

    fn remove_tree(&mut self, path: &Path) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|p, _| !p.starts_with(path));
        before != self.nodes.len()
    }

    fn subtree(&self, path: &Path) -> Vec<(PathBuf, MemNode)> {
        self.nodes
            .iter()
            .filter(|(p, _)| p.starts_with(path))
            .map(|(p, n)| (p.clone(), n.clone()))
            .collect()
    }

    fn graft(&mut self, from: &Path, to: &Path, nodes: Vec<(PathBuf, MemNode)>) {
        for (path, mut node) in nodes {
            let Ok(rest) = path.strip_prefix(from) else {
                continue;
            };
            let target = to.join(rest);
            if rest.as_os_str().is_empty() {
                node.hidden = display_name_of(&target).starts_with('.');
            }
            self.nodes.insert(target, node);
        }
    }

    fn is_folder(&self, path: &Path) -> bool {
        matches!(self.nodes.get(path), Some(n) if n.kind == EntryKind::Folder)
    }
}

/// A storage namespace held in memory. Volumes are registered roots such as
/// `/Root`; every folder added beneath one is listed by `list_children`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    fs: Mutex<MemoryFs>,
    list_delay: Mutex<Option<Duration>>,
    active_listings: AtomicUsize,
    peak_listings: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(self, root: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        self.add_volume(root, label);
        self
    }

    pub fn add_volume(&self, root: impl Into<PathBuf>, label: impl Into<String>) {
        let root = root.into();
        let mut fs = guard(&self.fs);
        fs.insert_with_ancestors(&root, EntryKind::Folder);
        fs.volumes.push((root, label.into()));
    }

    /// Adds a folder and any missing ancestors.
    pub fn add_folder(&self, path: impl AsRef<Path>) {
        guard(&self.fs).insert_with_ancestors(path.as_ref(), EntryKind::Folder);
    }

    pub fn add_file(&self, path: impl AsRef<Path>) {
        guard(&self.fs).insert_with_ancestors(path.as_ref(), EntryKind::File);
    }

    pub fn set_hidden(&self, path: impl AsRef<Path>, hidden: bool) {
        if let Some(node) = guard(&self.fs).nodes.get_mut(path.as_ref()) {
            node.hidden = hidden;
        }
    }

    /// Removes `path` and everything below it, as an external process would.
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        guard(&self.fs).remove_tree(path.as_ref())
    }

    /// Listing and kind queries on `path` fail with access denied.
    pub fn deny(&self, path: impl Into<PathBuf>) {
        guard(&self.fs).denied.insert(path.into());
    }

    pub fn allow(&self, path: impl AsRef<Path>) {
        guard(&self.fs).denied.remove(path.as_ref());
    }

    /// `display_name` of `path` fails with an i/o error.
    pub fn break_display_name(&self, path: impl Into<PathBuf>) {
        guard(&self.fs).broken_names.insert(path.into());
    }

    /// Every listing sleeps this long before answering.
    pub fn set_list_delay(&self, delay: Duration) {
        *guard(&self.list_delay) = Some(delay);
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        guard(&self.fs).nodes.contains_key(path.as_ref())
    }

    /// Number of `list_children` calls made for `path`.
    pub fn listing_count(&self, path: impl AsRef<Path>) -> usize {
        guard(&self.fs)
            .listings
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of listings that were in flight at once.
    pub fn peak_concurrent_listings(&self) -> usize {
        self.peak_listings.load(Ordering::SeqCst)
    }

    fn children_of(&self, path: &Path, include_hidden: bool) -> Vec<StorageEntry> {
        let fs = guard(&self.fs);
        let mut entries: Vec<StorageEntry> = fs
            .nodes
            .iter()
            .filter(|(p, n)| p.parent() == Some(path) && (include_hidden || !n.hidden))
            .map(|(p, n)| StorageEntry {
                path: p.clone(),
                name: display_name_of(p),
                kind: n.kind,
                hidden: n.hidden,
            })
            .collect();
        sort_entries(&mut entries);
        entries
    }

    fn check_listable(&self, path: &Path) -> Result<(), StorageError> {
        let mut fs = guard(&self.fs);
        *fs.listings.entry(path.to_path_buf()).or_insert(0) += 1;
        if fs.denied.contains(path) {
            return Err(StorageError::AccessDenied(path.to_path_buf()));
        }
        match fs.nodes.get(path) {
            Some(node) if node.kind == EntryKind::Folder => Ok(()),
            Some(_) => Err(StorageError::Io {
                path: path.to_path_buf(),
                message: "not a folder".to_string(),
            }),
            None => Err(StorageError::NotFound(path.to_path_buf())),
        }
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn list_children(
        &self,
        path: &Path,
        include_hidden: bool,
    ) -> Result<Vec<StorageEntry>, StorageError> {
        self.check_listable(path)?;
        let active = self.active_listings.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_listings.fetch_max(active, Ordering::SeqCst);

        let delay = *guard(&self.list_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let entries = self.children_of(path, include_hidden);

        self.active_listings.fetch_sub(1, Ordering::SeqCst);
        Ok(entries)
    }

    async fn kind(&self, path: &Path) -> Result<EntryKind, StorageError> {
        let fs = guard(&self.fs);
        if fs.denied.contains(path) {
            return Err(StorageError::AccessDenied(path.to_path_buf()));
        }
        fs.nodes
            .get(path)
            .map(|n| n.kind)
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))
    }

    async fn display_name(&self, path: &Path) -> Result<String, StorageError> {
        let fs = guard(&self.fs);
        if fs.broken_names.contains(path) {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                message: "display name unavailable".to_string(),
            });
        }
        if let Some((_, label)) = fs.volumes.iter().find(|(root, _)| root == path) {
            return Ok(label.clone());
        }
        if fs.nodes.contains_key(path) {
            Ok(display_name_of(path))
        } else {
            Err(StorageError::NotFound(path.to_path_buf()))
        }
    }

    async fn is_hidden(&self, path: &Path) -> bool {
        guard(&self.fs)
            .nodes
            .get(path)
            .map(|n| n.hidden)
            .unwrap_or(false)
    }

    async fn has_subfolders(&self, path: &Path, include_hidden: bool) -> bool {
        guard(&self.fs).nodes.iter().any(|(p, n)| {
            p.parent() == Some(path)
                && n.kind == EntryKind::Folder
                && (include_hidden || !n.hidden)
        })
    }

    fn volumes(&self) -> Vec<PathBuf> {
        guard(&self.fs)
            .volumes
            .iter()
            .map(|(root, _)| root.clone())
            .collect()
    }
}

/// Privileged channel over a [`MemoryStorage`] with scripted failures.
///
/// Paths registered with [`protect`](Self::protect) refuse mutations with
/// access denied until [`elevate`](PrivilegedChannel::elevate) succeeds.
#[derive(Debug)]
pub struct MemoryChannel {
    storage: Arc<MemoryStorage>,
    scripted: Mutex<VecDeque<OperationError>>,
    protected: Mutex<HashSet<PathBuf>>,
    elevation_refusal: Mutex<Option<String>>,
    elevated: AtomicBool,
    invocations: Mutex<Vec<FileOperation>>,
    elevation_requests: AtomicUsize,
}

impl MemoryChannel {
    pub fn new(storage: Arc<MemoryStorage>) -> Self {
        Self {
            storage,
            scripted: Mutex::new(VecDeque::new()),
            protected: Mutex::new(HashSet::new()),
            elevation_refusal: Mutex::new(None),
            elevated: AtomicBool::new(false),
            invocations: Mutex::new(Vec::new()),
            elevation_requests: AtomicUsize::new(0),
        }
    }

    /// The next invocation fails with `err` without touching storage.
    pub fn fail_next(&self, err: OperationError) {
        guard(&self.scripted).push_back(err);
    }

    pub fn protect(&self, path: impl Into<PathBuf>) {
        guard(&self.protected).insert(path.into());
    }

    pub fn refuse_elevation(&self, reason: impl Into<String>) {
        *guard(&self.elevation_refusal) = Some(reason.into());
    }

    pub fn invocations(&self) -> Vec<FileOperation> {
        guard(&self.invocations).clone()
    }

    pub fn invocation_count(&self) -> usize {
        guard(&self.invocations).len()
    }

    pub fn elevation_requests(&self) -> usize {
        self.elevation_requests.load(Ordering::SeqCst)
    }

    fn check_protected(&self, paths: &[&Path]) -> Result<(), OperationError> {
        if self.elevated.load(Ordering::SeqCst) {
            return Ok(());
        }
        let protected = guard(&self.protected);
        for path in paths {
            if protected.iter().any(|p| path.starts_with(p)) {
                return Err(OperationError::AccessDenied(path.to_path_buf()));
            }
        }
        Ok(())
    }

    fn apply(&self, operation: &FileOperation) -> Result<OperationReport, OperationError> {
        let mut fs = guard(&self.storage.fs);
        match operation {
            FileOperation::Delete { paths, .. } => {
                let refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
                self.check_protected(&refs)?;
                for path in paths {
                    if !fs.remove_tree(path) {
                        return Err(OperationError::NotFound(path.clone()));
                    }
                }
                Ok(OperationReport::new(format!("Deleted {} item(s)", paths.len())))
            }
            FileOperation::Move {
                sources,
                destination,
            }
            | FileOperation::Copy {
                sources,
                destination,
            } => {
                let moving = matches!(operation, FileOperation::Move { .. });
                let mut refs: Vec<&Path> = sources.iter().map(PathBuf::as_path).collect();
                refs.push(destination);
                self.check_protected(&refs)?;
                if !fs.is_folder(destination) {
                    return Err(OperationError::NotFound(destination.clone()));
                }
                if let Some(src) = sources.iter().find(|src| destination.starts_with(src)) {
                    return Err(OperationError::Other(format!(
                        "{} is inside {}",
                        destination.display(),
                        src.display()
                    )));
                }
                for src in sources {
                    let nodes = fs.subtree(src);
                    if nodes.is_empty() {
                        return Err(OperationError::NotFound(src.clone()));
                    }
                    let target = destination.join(display_name_of(src));
                    if moving {
                        fs.remove_tree(src);
                    }
                    fs.graft(src, &target, nodes);
                }
                let verb = if moving { "Moved" } else { "Copied" };
                Ok(OperationReport::new(format!("{} {} item(s)", verb, sources.len())))
            }
            FileOperation::Rename { path, new_name } => {
                self.check_protected(&[path.as_path()])?;
                let nodes = fs.subtree(path);
                if nodes.is_empty() {
                    return Err(OperationError::NotFound(path.clone()));
                }
                let target = path
                    .parent()
                    .map(|p| p.join(new_name))
                    .ok_or_else(|| OperationError::Other("cannot rename a root".to_string()))?;
                if fs.nodes.contains_key(&target) {
                    return Err(OperationError::AlreadyExists(target));
                }
                fs.remove_tree(path);
                fs.graft(path, &target, nodes);
                Ok(OperationReport::new(format!("Renamed to {}", new_name)).with_created(target))
            }
            FileOperation::CreateFolder { parent, name } => {
                self.check_protected(&[parent.as_path()])?;
                if !fs.is_folder(parent) {
                    return Err(OperationError::NotFound(parent.clone()));
                }
                let target = unique_child_name(parent, name, |p| fs.nodes.contains_key(p));
                fs.insert_with_ancestors(&target, EntryKind::Folder);
                Ok(OperationReport::new(format!("Created {}", target.display()))
                    .with_created(target))
            }
            FileOperation::Launch { program, .. } => {
                Ok(OperationReport::new(format!("Launched {}", program)))
            }
            FileOperation::Open { path } => {
                if !fs.nodes.contains_key(path) {
                    return Err(OperationError::NotFound(path.clone()));
                }
                Ok(OperationReport::new(format!("Opened {}", path.display())))
            }
        }
    }
}

#[async_trait]
impl PrivilegedChannel for MemoryChannel {
    async fn run_privileged(
        &self,
        operation: &FileOperation,
    ) -> Result<OperationReport, OperationError> {
        guard(&self.invocations).push(operation.clone());
        let scripted = guard(&self.scripted).pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }
        self.apply(operation)
    }

    async fn elevate(&self) -> Result<(), ElevationDenied> {
        self.elevation_requests.fetch_add(1, Ordering::SeqCst);
        let refusal = guard(&self.elevation_refusal).clone();
        match refusal {
            Some(reason) => Err(ElevationDenied { reason }),
            None => {
                self.elevated.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

/// Prompt answering from a queue; records every dialog shown.
#[derive(Debug)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Choice>>,
    fallback: Choice,
    shown: Mutex<Vec<Dialog>>,
}

impl Default for ScriptedPrompt {
    fn default() -> Self {
        Self::answering(std::iter::empty())
    }
}

impl ScriptedPrompt {
    /// Answers in order, then `Choice::Dismissed` once the queue runs dry.
    pub fn answering(answers: impl IntoIterator<Item = Choice>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            fallback: Choice::Dismissed,
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn push_answer(&self, choice: Choice) {
        guard(&self.answers).push_back(choice);
    }

    pub fn dialogs(&self) -> Vec<Dialog> {
        guard(&self.shown).clone()
    }

    pub fn titles(&self) -> Vec<String> {
        guard(&self.shown).iter().map(|d| d.title.clone()).collect()
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn confirm(&self, dialog: &Dialog) -> Choice {
        guard(&self.shown).push(dialog.clone());
        guard(&self.answers).pop_front().unwrap_or(self.fallback)
    }
}
