// Explorer - one view: folder tree, content pane, breadcrumbs and history
use crate::config::Config;
use crate::entry::{EntryKind, Location, StorageEntry};
use crate::error::{NavError, OperationFailure, StorageError};
use crate::io::{FileOperation, OperationKind, OperationReport, Services};
use crate::message::{Choice, Notice};
use crate::model::path::{display_name_of, expand_address_text, is_same_or_descendant};
use crate::model::PathAnalyzer;
use crate::state::navigation::NavigationHistory;
use crate::state::tree::NodeHandle;
use crate::subscription::watcher::{FolderWatcher, WatchEvent};
use crate::sync::{
    BreadcrumbReconciler, ElevationRetry, Gated, GuardKind, NavigationGate, ReconcileOutcome,
    RemovalEffect, TreeSynchronizer,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const NEW_FOLDER_NAME: &str = "New folder";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Replay {
    Back,
    Forward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Visit {
    Fresh,
    Refresh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropAction {
    Copy,
    Move,
}

/// What a submitted address-bar line turned into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressOutcome {
    /// Empty input, or the folder already shown.
    Ignored,
    Launched(String),
    OpenedFile(PathBuf),
    Navigated(Location),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The user answered anything but the primary button.
    Cancelled,
    /// Nothing to do, e.g. a move onto the items' own parent.
    Unchanged,
    Completed(OperationReport),
}

#[derive(Default)]
struct ViewState {
    current: Option<Location>,
    current_node: Option<NodeHandle>,
    content: Vec<StorageEntry>,
    history: NavigationHistory,
    /// Set while a back/forward step is being displayed.
    replay: Option<Replay>,
}

pub struct Explorer {
    services: Services,
    config: Config,
    gate: NavigationGate,
    tree: TreeSynchronizer,
    breadcrumbs: BreadcrumbReconciler,
    view: Mutex<ViewState>,
    show_hidden: AtomicBool,
    watcher: std::sync::Mutex<Option<FolderWatcher>>,
}

impl Explorer {
    pub fn new(services: Services, config: Config) -> Self {
        let show_hidden = config.navigation.show_hidden;
        Self {
            gate: NavigationGate::new(),
            tree: TreeSynchronizer::new(services.storage.clone(), show_hidden),
            breadcrumbs: BreadcrumbReconciler::new(services.storage.clone()),
            view: Mutex::new(ViewState {
                history: NavigationHistory::with_limit(config.history.max_entries),
                ..ViewState::default()
            }),
            show_hidden: AtomicBool::new(show_hidden),
            watcher: std::sync::Mutex::new(None),
            services,
            config,
        }
    }

    fn include_hidden(&self) -> bool {
        self.show_hidden.load(Ordering::Acquire)
    }

    fn detached(&self) -> bool {
        self.config.navigation.detach_tree
    }

    // ---- navigation ----

    /// Shows `path` with the folder tree rooted at it.
    pub async fn open(&self, path: impl AsRef<Path>) -> Result<Location, NavError> {
        let path = path.as_ref();
        let result = {
            let _permit = self.gate.acquire().await?;
            self.display(path, Visit::Fresh, true).await
        };
        self.finish(result).await
    }

    pub async fn navigate(&self, path: impl AsRef<Path>) -> Result<Location, NavError> {
        let path = path.as_ref();
        let result = {
            let _permit = self.gate.acquire().await?;
            self.display(path, Visit::Fresh, false).await
        };
        self.finish(result).await
    }

    /// Re-lists the current folder without touching history.
    pub async fn refresh(&self) -> Result<Location, NavError> {
        let result = {
            let _permit = self.gate.acquire().await?;
            match self.current_path().await {
                Some(current) => {
                    let node = self.view.lock().await.current_node;
                    if let Some(node) = node {
                        if let Err(e) = self.tree.refresh_children(node).await {
                            warn!("failed to refresh tree node of {}: {}", current.display(), e);
                        }
                    }
                    self.display(&current, Visit::Refresh, false).await
                }
                None => Err(NavError::NoCurrentFolder),
            }
        };
        self.finish(result).await
    }

    pub async fn go_back(&self) -> Result<Gated<Location>, NavError> {
        self.step(Replay::Back).await
    }

    pub async fn go_forward(&self) -> Result<Gated<Location>, NavError> {
        self.step(Replay::Forward).await
    }

    pub async fn go_parent(&self) -> Result<Gated<Location>, NavError> {
        let Some(_ticket) = self.gate.try_enter(GuardKind::Step) else {
            return Ok(Gated::Skipped);
        };
        let result = {
            let _permit = self.gate.acquire().await?;
            match self.parent_of_current().await {
                Ok(parent) => self.display(&parent, Visit::Fresh, false).await,
                Err(err) => Err(err),
            }
        };
        self.finish(result).await.map(Gated::Ran)
    }

    async fn step(&self, direction: Replay) -> Result<Gated<Location>, NavError> {
        let Some(_ticket) = self.gate.try_enter(GuardKind::Step) else {
            return Ok(Gated::Skipped);
        };
        let result = {
            let _permit = self.gate.acquire().await?;
            let target = {
                let mut view = self.view.lock().await;
                let target = match direction {
                    Replay::Back => view.history.go_back()?,
                    Replay::Forward => view.history.go_forward()?,
                };
                view.replay = Some(direction);
                target
            };

            let result = self.display(&target.path, Visit::Fresh, false).await;
            if result.is_err() {
                let mut view = self.view.lock().await;
                if let Some(replay) = view.replay.take() {
                    let restored = match replay {
                        Replay::Back => view.history.go_forward(),
                        Replay::Forward => view.history.go_back(),
                    };
                    if let Err(e) = restored {
                        warn!("history cursor not restored: {}", e);
                    }
                }
            }
            result
        };
        self.finish(result).await.map(Gated::Ran)
    }

    async fn parent_of_current(&self) -> Result<PathBuf, NavError> {
        let current = self.current_path().await.ok_or(NavError::NoCurrentFolder)?;
        if current == self.services.storage.root_of(&current) {
            return Err(NavError::AtRoot);
        }
        current
            .parent()
            .map(Path::to_path_buf)
            .ok_or(NavError::AtRoot)
    }

    /// Displays `target`. Callers hold the navigation permit.
    async fn display(
        &self,
        target: &Path,
        visit: Visit,
        root_here: bool,
    ) -> Result<Location, NavError> {
        let storage = &self.services.storage;
        let not_located = || NavError::LocateFolderFailed(target.to_path_buf());

        match storage.kind(target).await {
            Ok(EntryKind::Folder) => {}
            Ok(EntryKind::File) | Err(StorageError::NotFound(_)) => return Err(not_located()),
            Err(err) => return Err(err.into()),
        }
        self.check_hidden(target).await?;

        let label = storage
            .display_name(target)
            .await
            .unwrap_or_else(|_| display_name_of(target));
        let location = Location::new(target, label);

        let node = if self.detached() {
            None
        } else {
            Some(self.sync_tree(&location, root_here).await?)
        };

        let content = storage
            .list_children(target, self.include_hidden())
            .await
            .map_err(|err| match err {
                StorageError::NotFound(_) => not_located(),
                other => other.into(),
            })?;

        let recorded = {
            let mut view = self.view.lock().await;
            if self.gate.is_closed() {
                return Err(NavError::ViewClosed);
            }
            let replaying = view.replay.take().is_some();
            let revisit = view
                .history
                .current()
                .is_some_and(|current| current.path == location.path);
            let record = visit == Visit::Fresh && !replaying && !revisit;
            if record {
                view.history.record_visit(location.clone());
            }
            view.current = Some(location.clone());
            view.current_node = node;
            view.content = content;
            record
        };

        self.breadcrumbs.reconcile(target).await;
        if recorded {
            if let Err(e) = self.services.history.record_path_visit(target).await {
                warn!("failed to remember {}: {}", target.display(), e);
            }
        }
        self.follow(target);
        debug!(path = %target.display(), ?visit, recorded, "folder displayed");
        Ok(location)
    }

    async fn check_hidden(&self, target: &Path) -> Result<(), NavError> {
        if self.include_hidden() {
            return Ok(());
        }
        let storage = &self.services.storage;
        if storage.is_hidden(target).await {
            return Err(NavError::Hidden(target.to_path_buf()));
        }
        if self.detached() {
            return Ok(());
        }
        let root = storage.root_of(target);
        let Ok(mut analyzer) = PathAnalyzer::new(target, &root) else {
            return Ok(());
        };
        while analyzer.remaining().len() > 1 {
            let Ok(ancestor) = analyzer.next_full_path() else {
                break;
            };
            if storage.is_hidden(&ancestor).await {
                return Err(NavError::HiddenAncestor(target.to_path_buf()));
            }
        }
        Ok(())
    }

    /// Re-roots the tree when `location` falls outside it, then expands down to it.
    async fn sync_tree(&self, location: &Location, root_here: bool) -> Result<NodeHandle, NavError> {
        let target = location.path();
        if root_here {
            self.tree.reset_root(location.clone()).await;
        } else {
            let inside = self
                .tree
                .root_path()
                .await
                .is_some_and(|root| is_same_or_descendant(target, &root));
            if !inside {
                let volume = self.services.storage.root_of(target);
                let label = self
                    .services
                    .storage
                    .display_name(&volume)
                    .await
                    .unwrap_or_else(|_| display_name_of(&volume));
                self.tree.reset_root(Location::new(volume, label)).await;
            }
        }
        self.tree.reveal(target).await
    }

    // ---- address bar ----

    /// Resolves a submitted address line: command alias, file, or folder.
    pub async fn submit_address(&self, text: &str) -> Result<AddressOutcome, NavError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(AddressOutcome::Ignored);
        }
        let home = home_dir();
        let expanded = expand_address_text(trimmed, home.as_deref());
        let current = self.current_path().await;
        if current.as_deref() == Some(Path::new(&expanded)) {
            return Ok(AddressOutcome::Ignored);
        }

        let mut words = expanded.split_whitespace();
        if let Some(alias) = words.next().and_then(|w| self.config.address.command(w)) {
            let mut args = alias.args.clone();
            args.extend(words.map(str::to_string));
            let operation = FileOperation::Launch {
                program: alias.program.clone(),
                args,
                working_dir: current,
            };
            self.run_mutation(&operation).await?;
            return Ok(AddressOutcome::Launched(alias.program.clone()));
        }

        for candidate in self.address_candidates(&expanded, current.as_deref()) {
            match self.services.storage.kind(&candidate).await {
                Ok(EntryKind::File) => {
                    let operation = FileOperation::Open {
                        path: candidate.clone(),
                    };
                    self.run_mutation(&operation).await?;
                    return Ok(AddressOutcome::OpenedFile(candidate));
                }
                Ok(EntryKind::Folder) | Err(StorageError::AccessDenied(_)) => {
                    return self
                        .navigate(&candidate)
                        .await
                        .map(AddressOutcome::Navigated);
                }
                Err(_) => continue,
            }
        }

        self.show(Notice::LocatePathFailure(trimmed.to_string()))
            .await;
        Err(NavError::PathNotFound(PathBuf::from(trimmed)))
    }

    fn address_candidates(&self, text: &str, current: Option<&Path>) -> Vec<PathBuf> {
        let typed = PathBuf::from(text);
        if typed.is_absolute() || typed.has_root() {
            return vec![typed];
        }
        current
            .map(|current| current.join(&typed))
            .into_iter()
            .chain(self.config.address.lookup_dirs.iter().map(|dir| dir.join(&typed)))
            .collect()
    }

    /// Folder completions for the typed text, followed by remembered entries.
    pub async fn address_suggestions(&self, text: &str) -> Gated<Vec<String>> {
        let Some(_ticket) = self.gate.try_enter(GuardKind::Autocomplete) else {
            return Gated::Skipped;
        };
        let home = home_dir();
        let expanded = expand_address_text(text, home.as_deref());
        let mut suggestions: Vec<String> = Vec::new();

        let typed = PathBuf::from(&expanded);
        if typed.has_root() {
            let (parent, leaf) = if expanded.ends_with(['/', '\\']) {
                (typed.clone(), String::new())
            } else {
                match (typed.parent(), typed.file_name()) {
                    (Some(parent), Some(leaf)) => {
                        (parent.to_path_buf(), leaf.to_string_lossy().to_lowercase())
                    }
                    _ => (typed.clone(), String::new()),
                }
            };
            match self
                .services
                .storage
                .list_children(&parent, self.include_hidden())
                .await
            {
                Ok(children) => suggestions.extend(
                    children
                        .into_iter()
                        .filter(|e| e.is_dir() && e.name.to_lowercase().starts_with(&leaf))
                        .map(|e| e.path.display().to_string()),
                ),
                Err(e) => debug!("no completions under {}: {}", parent.display(), e),
            }
        }

        match self.services.history.suggestions_for(&expanded).await {
            Ok(remembered) => {
                for entry in remembered {
                    if !suggestions.contains(&entry) {
                        suggestions.push(entry);
                    }
                }
            }
            Err(e) => warn!("history suggestions unavailable: {}", e),
        }
        suggestions.truncate(self.config.history.suggestion_limit);
        Gated::Ran(suggestions)
    }

    pub async fn remember_search(&self, term: &str) {
        if let Err(e) = self.services.history.record_search_term(term).await {
            warn!("failed to remember search term: {}", e);
        }
    }

    pub async fn search_suggestions(&self, prefix: &str) -> Vec<String> {
        match self.services.history.suggestions_for(prefix).await {
            Ok(mut found) => {
                found.truncate(self.config.history.suggestion_limit);
                found
            }
            Err(e) => {
                warn!("history suggestions unavailable: {}", e);
                Vec::new()
            }
        }
    }

    // ---- breadcrumbs ----

    pub async fn open_segment(&self, index: usize) -> Result<Location, NavError> {
        let path = self.breadcrumbs.segment_path(index).await?;
        self.navigate(&path).await
    }

    pub async fn open_segment_flyout(&self, index: usize) -> Result<Gated<Vec<String>>, NavError> {
        let Some(_ticket) = self.gate.try_enter(GuardKind::BreadcrumbLayout) else {
            return Ok(Gated::Skipped);
        };
        let result = self
            .breadcrumbs
            .open_flyout(index, self.include_hidden())
            .await;
        self.finish(result).await.map(Gated::Ran)
    }

    pub async fn close_segment_flyout(&self) {
        self.breadcrumbs.close_flyout().await;
    }

    /// Navigates to `name` under the segment whose flyout is open.
    pub async fn open_flyout_item(&self, name: &str) -> Result<Location, NavError> {
        let anchor = self
            .breadcrumbs
            .trail()
            .await
            .flyout()
            .map(|flyout| flyout.anchor)
            .ok_or(NavError::NoOpenFlyout)?;
        let base = self.breadcrumbs.segment_path(anchor).await?;
        self.breadcrumbs.close_flyout().await;
        self.navigate(base.join(name)).await
    }

    /// Re-runs breadcrumb layout for the current folder, e.g. after a resize.
    pub async fn refresh_breadcrumbs(&self) -> Gated<Option<ReconcileOutcome>> {
        let Some(_ticket) = self.gate.try_enter(GuardKind::BreadcrumbLayout) else {
            return Gated::Skipped;
        };
        match self.current_path().await {
            Some(current) => Gated::Ran(Some(self.breadcrumbs.reconcile(&current).await)),
            None => Gated::Ran(None),
        }
    }

    /// Copies or moves dragged items into the folder of segment `index`.
    pub async fn drop_on_segment(
        &self,
        index: usize,
        items: Vec<PathBuf>,
        action: DropAction,
    ) -> Result<Gated<MutationOutcome>, NavError> {
        let Some(_ticket) = self.gate.try_enter(GuardKind::DropTarget) else {
            return Ok(Gated::Skipped);
        };
        let target = self.breadcrumbs.segment_path(index).await?;
        if !self.include_hidden() && self.services.storage.is_hidden(&target).await {
            return self.finish(Err(NavError::Hidden(target))).await;
        }
        if items.iter().any(|item| is_same_or_descendant(&target, item)) {
            return self.finish(Err(NavError::DropIntoSource(target))).await;
        }
        let already_there = items
            .iter()
            .all(|item| item.parent() == Some(target.as_path()));
        if items.is_empty() || (action == DropAction::Move && already_there) {
            return Ok(Gated::Ran(MutationOutcome::Unchanged));
        }

        let operation = match action {
            DropAction::Copy => FileOperation::Copy {
                sources: items.clone(),
                destination: target.clone(),
            },
            DropAction::Move => FileOperation::Move {
                sources: items.clone(),
                destination: target.clone(),
            },
        };
        let report = self.run_mutation(&operation).await?;

        if action == DropAction::Move {
            for item in &items {
                self.handle_external_removal(item).await?;
            }
        }
        self.resync_after_change(&target).await;
        Ok(Gated::Ran(MutationOutcome::Completed(report)))
    }

    // ---- mutations of the current folder ----

    pub async fn delete_current_folder(&self, permanent: bool) -> Result<MutationOutcome, NavError> {
        let current = self.existing_current().await?;
        let choice = self
            .show(Notice::ConfirmDelete {
                path: current.clone(),
                permanent,
            })
            .await;
        if choice != Choice::Primary {
            return Ok(MutationOutcome::Cancelled);
        }

        let operation = FileOperation::Delete {
            paths: vec![current.clone()],
            permanent,
        };
        let report = self.run_mutation(&operation).await?;
        self.handle_external_removal(&current).await?;
        Ok(MutationOutcome::Completed(report))
    }

    pub async fn rename_current_folder(&self, new_name: &str) -> Result<MutationOutcome, NavError> {
        let name = new_name.trim();
        let current = self.existing_current().await?;
        if name.is_empty() || display_name_of(&current) == name {
            return Ok(MutationOutcome::Unchanged);
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return self.finish(Err(NavError::InvalidName(name.to_string()))).await;
        }

        let operation = FileOperation::Rename {
            path: current.clone(),
            new_name: name.to_string(),
        };
        let report = self.run_mutation(&operation).await?;
        let renamed = report
            .created
            .clone()
            .unwrap_or_else(|| current.with_file_name(name));
        self.tree
            .relocate(&current, Location::from_path(&renamed))
            .await;
        self.navigate(&renamed).await?;
        Ok(MutationOutcome::Completed(report))
    }

    /// Creates "New folder" (suffixed on collision) inside the current folder.
    pub async fn create_folder(&self) -> Result<MutationOutcome, NavError> {
        let current = self.existing_current().await?;
        let operation = FileOperation::CreateFolder {
            parent: current.clone(),
            name: NEW_FOLDER_NAME.to_string(),
        };
        let report = self.run_mutation(&operation).await?;
        self.resync_after_change(&current).await;
        Ok(MutationOutcome::Completed(report))
    }

    async fn existing_current(&self) -> Result<PathBuf, NavError> {
        let current = self.current_path().await.ok_or(NavError::NoCurrentFolder)?;
        if self.services.storage.exists(&current).await {
            return Ok(current);
        }
        let err = NavError::LocateFolderFailed(current);
        self.notify_error(&err).await;
        Err(err)
    }

    async fn run_mutation(&self, operation: &FileOperation) -> Result<OperationReport, NavError> {
        let run = ElevationRetry::new(self.services.channel.as_ref(), self.services.prompt.as_ref())
            .run(operation)
            .await;
        match run.outcome {
            Ok(report) => {
                info!(attempts = run.attempts, "{}", report.summary);
                Ok(report)
            }
            Err(failure) => {
                self.report_failure(operation.kind(), &failure).await;
                Err(NavError::Operation(failure))
            }
        }
    }

    async fn report_failure(&self, kind: OperationKind, failure: &OperationFailure) {
        warn!(?kind, "operation failed: {}", failure);
        let notice = match failure {
            OperationFailure::NotFound(path) => Notice::LocateFolderFailure(path.clone()),
            OperationFailure::InUse(path) => Notice::ItemInUse(path.clone()),
            OperationFailure::AlreadyExists(path) => Notice::AlreadyExists(path.clone()),
            OperationFailure::DeniedAfterElevation(_) => Notice::OperationFailed {
                kind,
                message: failure.to_string(),
            },
            OperationFailure::Unexpected(message) => Notice::UnexpectedError(message.clone()),
            // Declining needs no notice; a refused elevation was already shown.
            OperationFailure::ElevationDeclined | OperationFailure::ElevationFailed(_) => return,
        };
        self.show(notice).await;
    }

    // ---- external changes ----

    /// Applies the removal of `path` to the tree and, when the displayed
    /// folder went with it, moves to the nearest surviving ancestor.
    pub async fn handle_external_removal(&self, path: &Path) -> Result<RemovalEffect, NavError> {
        let current = self.current_path().await;
        let effect = self.tree.propagate_removal(path, current.as_deref()).await;

        match &effect {
            RemovalEffect::CurrentInvalidated { fallback_parent } => {
                let mut candidate = fallback_parent.clone();
                while let Some(dir) = candidate {
                    if self.services.storage.exists(&dir).await {
                        info!(from = %path.display(), to = %dir.display(), "displayed folder removed");
                        self.navigate(&dir).await?;
                        return Ok(effect);
                    }
                    candidate = dir.parent().map(Path::to_path_buf);
                }
                self.clear_view().await;
            }
            RemovalEffect::Unaffected => {
                if current.is_some() && path.parent() == current.as_deref() {
                    self.refresh().await?;
                }
            }
        }
        Ok(effect)
    }

    pub async fn apply_watch_event(&self, event: WatchEvent) -> Result<(), NavError> {
        match event {
            WatchEvent::Removed(path) => self.handle_external_removal(&path).await.map(|_| ()),
            WatchEvent::Created(path) | WatchEvent::Changed(path) => {
                if let Some(parent) = path.parent() {
                    self.resync_after_change(parent).await;
                }
                Ok(())
            }
        }
    }

    /// Follows the displayed folder for external changes. The returned task
    /// ends once the explorer is dropped.
    pub async fn start_watching(self: &Arc<Self>) -> Result<Option<JoinHandle<()>>, notify::Error> {
        if !self.config.navigation.watch_current_folder {
            return Ok(None);
        }
        let (mut watcher, mut events) = FolderWatcher::new()?;
        if let Some(current) = self.current_path().await {
            watcher.watch(&current)?;
        }
        *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);

        let explorer = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(explorer) = explorer.upgrade() else {
                    break;
                };
                if let Err(e) = explorer.apply_watch_event(event).await {
                    debug!("watch event not applied: {}", e);
                }
            }
        });
        Ok(Some(task))
    }

    fn follow(&self, path: &Path) {
        let mut slot = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(watcher) = slot.as_mut() {
            if let Err(e) = watcher.watch(path) {
                warn!("cannot watch {}: {}", path.display(), e);
            }
        }
    }

    async fn resync_after_change(&self, folder: &Path) {
        if let Some(node) = self.tree.node_for(folder).await {
            if let Err(e) = self.tree.refresh_children(node).await {
                warn!("failed to refresh tree node of {}: {}", folder.display(), e);
            }
        }
        if self.current_path().await.as_deref() == Some(folder) {
            // Failures were already reported by refresh.
            let _ = self.refresh().await;
        }
    }

    // ---- settings and tree gestures ----

    pub async fn set_show_hidden(&self, show: bool) {
        if self.show_hidden.swap(show, Ordering::AcqRel) == show {
            return;
        }
        self.tree.set_show_hidden(show);
        if self.current_path().await.is_some() {
            let _ = self.refresh().await;
        }
    }

    pub fn show_hidden(&self) -> bool {
        self.include_hidden()
    }

    pub async fn expand_node(&self, node: NodeHandle) -> Result<usize, NavError> {
        let _permit = self.gate.acquire().await?;
        Ok(self.tree.expand(node).await?)
    }

    pub async fn collapse_node(&self, node: NodeHandle) -> Result<(), NavError> {
        let _permit = self.gate.acquire().await?;
        self.tree.collapse(node).await;
        Ok(())
    }

    /// Closes the view. Pending and future navigations fail with `ViewClosed`.
    pub async fn dispose(&self) {
        // An admitted navigation finishes before the view is torn down.
        let permit = self.gate.acquire().await.ok();
        self.gate.close();
        self.clear_view().await;
        self.view.lock().await.history.clear();
        self.tree.clear().await;
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(permit);
        debug!("explorer disposed");
    }

    async fn clear_view(&self) {
        {
            let mut view = self.view.lock().await;
            view.current = None;
            view.current_node = None;
            view.content.clear();
            view.replay = None;
        }
        self.breadcrumbs.clear().await;
    }

    // ---- notices ----

    async fn finish<T>(&self, result: Result<T, NavError>) -> Result<T, NavError> {
        if let Err(err) = &result {
            self.notify_error(err).await;
        }
        result
    }

    async fn notify_error(&self, err: &NavError) {
        let notice = match err {
            NavError::LocateFolderFailed(path) => Notice::LocateFolderFailure(path.clone()),
            NavError::PathNotFound(path) => Notice::LocatePathFailure(path.display().to_string()),
            NavError::Hidden(path) => Notice::ItemHidden(path.clone()),
            NavError::HiddenAncestor(path) => Notice::NeedOpenHiddenSwitch(path.clone()),
            NavError::AccessDenied(path) => Notice::AccessFolderFailure(path.clone()),
            NavError::Storage(err) => Notice::UnexpectedError(err.to_string()),
            NavError::DropIntoSource(path) => Notice::DropIntoSource(path.clone()),
            NavError::InvalidName(name) => Notice::InvalidName(name.clone()),
            // Already reported by the operation path.
            NavError::Operation(_) => return,
            NavError::NoCurrentFolder
            | NavError::AtRoot
            | NavError::NoSuchSegment(_)
            | NavError::NoOpenFlyout
            | NavError::ViewClosed
            | NavError::History(_) => {
                debug!("navigation refused: {}", err);
                return;
            }
        };
        warn!("{}", err);
        self.show(notice).await;
    }

    async fn show(&self, notice: Notice) -> Choice {
        self.services.prompt.confirm(&notice.dialog()).await
    }

    // ---- snapshots ----

    pub async fn current_location(&self) -> Option<Location> {
        self.view.lock().await.current.clone()
    }

    pub async fn current_path(&self) -> Option<PathBuf> {
        self.view
            .lock()
            .await
            .current
            .as_ref()
            .map(|location| location.path.clone())
    }

    pub async fn current_node(&self) -> Option<NodeHandle> {
        self.view.lock().await.current_node
    }

    pub async fn content(&self) -> Vec<StorageEntry> {
        self.view.lock().await.content.clone()
    }

    pub async fn breadcrumbs(&self) -> Vec<String> {
        self.breadcrumbs.labels().await
    }

    pub async fn history(&self) -> NavigationHistory {
        self.view.lock().await.history.clone()
    }

    pub async fn can_go_back(&self) -> bool {
        self.view.lock().await.history.can_go_back()
    }

    pub async fn can_go_forward(&self) -> bool {
        self.view.lock().await.history.can_go_forward()
    }

    pub async fn can_go_parent(&self) -> bool {
        self.parent_of_current().await.is_ok()
    }

    pub fn tree(&self) -> &TreeSynchronizer {
        &self.tree
    }

    pub fn breadcrumb_reconciler(&self) -> &BreadcrumbReconciler {
        &self.breadcrumbs
    }

    pub fn gate(&self) -> &NavigationGate {
        &self.gate
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn home_dir() -> Option<PathBuf> {
    directories::UserDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::error::OperationError;
    use crate::io::{
        LocalChannel, LocalStorage, MemoryChannel, MemoryHistoryStore, MemoryStorage,
        ScriptedPrompt,
    };
    use std::time::Duration;

    struct Fixture {
        storage: Arc<MemoryStorage>,
        channel: Arc<MemoryChannel>,
        prompt: Arc<ScriptedPrompt>,
        explorer: Arc<Explorer>,
    }

    fn fixture_with(config: Config) -> Fixture {
        let storage = Arc::new(
            MemoryStorage::new()
                .with_volume("/Root", "Root")
                .with_volume("/Other", "Other"),
        );
        storage.add_folder("/Root/A/B");
        storage.add_folder("/Root/A/C");
        storage.add_folder("/Root/.secret/inner");
        storage.set_hidden("/Root/.secret", true);
        storage.add_file("/Root/A/notes.txt");
        storage.add_folder("/Other/X");
        let channel = Arc::new(MemoryChannel::new(storage.clone()));
        let prompt = Arc::new(ScriptedPrompt::default());
        let services = Services {
            storage: storage.clone(),
            channel: channel.clone(),
            prompt: prompt.clone(),
            history: Arc::new(MemoryHistoryStore::new(HistoryConfig::default())),
        };
        Fixture {
            storage,
            channel,
            prompt,
            explorer: Arc::new(Explorer::new(services, config)),
        }
    }

    fn fixture() -> Fixture {
        let mut config = Config::default();
        config.address.lookup_dirs.clear();
        fixture_with(config)
    }

    #[tokio::test]
    async fn navigate_updates_content_breadcrumbs_and_history() {
        let f = fixture();
        f.explorer.navigate("/Root/A").await.unwrap();

        assert_eq!(f.explorer.current_path().await, Some(PathBuf::from("/Root/A")));
        let names: Vec<String> = f.explorer.content().await.into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["B", "C", "notes.txt"]);
        assert_eq!(f.explorer.breadcrumbs().await, ["Root", "A"]);
        assert_eq!(f.explorer.history().await.len(), 1);
        assert!(f.explorer.current_node().await.is_some());
    }

    #[tokio::test]
    async fn back_then_forward_replays_without_recording() {
        let f = fixture();
        for path in ["/Root", "/Root/A", "/Root/A/B"] {
            f.explorer.navigate(path).await.unwrap();
        }
        let back = f.explorer.go_back().await.unwrap().ran().unwrap();
        assert_eq!(back.path, PathBuf::from("/Root/A"));
        assert!(f.explorer.can_go_forward().await);

        let forward = f.explorer.go_forward().await.unwrap().ran().unwrap();
        assert_eq!(forward.path, PathBuf::from("/Root/A/B"));
        assert_eq!(f.explorer.history().await.len(), 3);
    }

    #[tokio::test]
    async fn failed_replay_restores_cursor() {
        let f = fixture();
        f.explorer.navigate("/Root/A/B").await.unwrap();
        f.explorer.navigate("/Root/A/C").await.unwrap();
        f.storage.remove("/Root/A/B");

        let err = f.explorer.go_back().await.unwrap_err();
        assert_eq!(err, NavError::LocateFolderFailed(PathBuf::from("/Root/A/B")));
        let history = f.explorer.history().await;
        assert_eq!(history.cursor(), 1);
        assert_eq!(f.explorer.current_path().await, Some(PathBuf::from("/Root/A/C")));
    }

    #[tokio::test]
    async fn hidden_target_and_hidden_ancestor_are_refused() {
        let f = fixture();
        assert_eq!(
            f.explorer.navigate("/Root/.secret").await,
            Err(NavError::Hidden(PathBuf::from("/Root/.secret")))
        );
        assert_eq!(
            f.explorer.navigate("/Root/.secret/inner").await,
            Err(NavError::HiddenAncestor(PathBuf::from("/Root/.secret/inner")))
        );
        assert_eq!(
            f.prompt.dialogs(),
            [
                Notice::ItemHidden(PathBuf::from("/Root/.secret")).dialog(),
                Notice::NeedOpenHiddenSwitch(PathBuf::from("/Root/.secret/inner")).dialog(),
            ]
        );

        f.explorer.set_show_hidden(true).await;
        assert!(f.explorer.navigate("/Root/.secret/inner").await.is_ok());
    }

    #[tokio::test]
    async fn parent_stops_at_volume_root() {
        let f = fixture();
        f.explorer.navigate("/Root/A").await.unwrap();
        let parent = f.explorer.go_parent().await.unwrap().ran().unwrap();
        assert_eq!(parent.path, PathBuf::from("/Root"));
        assert!(!f.explorer.can_go_parent().await);
        assert_eq!(f.explorer.go_parent().await, Err(NavError::AtRoot));
    }

    #[tokio::test]
    async fn busy_step_guard_skips_gesture() {
        let f = fixture();
        f.explorer.navigate("/Root/A").await.unwrap();
        let _held = f.explorer.gate().try_enter(GuardKind::Step).unwrap();
        assert_eq!(f.explorer.go_parent().await, Ok(Gated::Skipped));
        assert_eq!(f.explorer.current_path().await, Some(PathBuf::from("/Root/A")));
    }

    #[tokio::test]
    async fn address_ladder_resolves_relative_and_missing() {
        let f = fixture();
        f.explorer.navigate("/Root/A").await.unwrap();

        assert_eq!(f.explorer.submit_address("  ").await, Ok(AddressOutcome::Ignored));
        assert_eq!(f.explorer.submit_address("/Root/A").await, Ok(AddressOutcome::Ignored));

        let outcome = f.explorer.submit_address("C").await.unwrap();
        assert!(matches!(outcome, AddressOutcome::Navigated(ref l) if l.path == Path::new("/Root/A/C")));

        assert_eq!(
            f.explorer.submit_address("nowhere").await,
            Err(NavError::PathNotFound(PathBuf::from("nowhere")))
        );
        assert_eq!(
            f.prompt.titles().last().map(String::as_str),
            Some(Notice::LocatePathFailure("nowhere".into()).title().as_str())
        );
    }

    #[tokio::test]
    async fn address_opens_files_and_launches_aliases() {
        let mut config = Config::default();
        config.address.lookup_dirs.clear();
        config.address.commands.insert(
            "term".to_string(),
            crate::config::CommandAlias {
                program: "xterm".to_string(),
                args: vec!["-hold".to_string()],
            },
        );
        let f = fixture_with(config);
        f.explorer.navigate("/Root/A").await.unwrap();

        assert_eq!(
            f.explorer.submit_address("notes.txt").await,
            Ok(AddressOutcome::OpenedFile(PathBuf::from("/Root/A/notes.txt")))
        );
        assert_eq!(
            f.explorer.submit_address("TERM -e top").await,
            Ok(AddressOutcome::Launched("xterm".to_string()))
        );
        assert_eq!(
            f.channel.invocations().last(),
            Some(&FileOperation::Launch {
                program: "xterm".to_string(),
                args: vec!["-hold".into(), "-e".into(), "top".into()],
                working_dir: Some(PathBuf::from("/Root/A")),
            })
        );
    }

    #[tokio::test]
    async fn suggestions_complete_typed_folder() {
        let f = fixture();
        let suggestions = f.explorer.address_suggestions("/Root/A/").await.ran().unwrap();
        assert_eq!(suggestions, ["/Root/A/B", "/Root/A/C"]);

        let suggestions = f.explorer.address_suggestions("/Root/A/c").await.ran().unwrap();
        assert_eq!(suggestions, ["/Root/A/C"]);
    }

    #[tokio::test]
    async fn delete_with_elevation_moves_to_parent() {
        let f = fixture();
        f.explorer.navigate("/Root/A/B").await.unwrap();
        f.channel.fail_next(OperationError::AccessDenied(PathBuf::from("/Root/A/B")));
        f.prompt.push_answer(Choice::Primary);
        f.prompt.push_answer(Choice::Primary);

        let outcome = f.explorer.delete_current_folder(true).await.unwrap();
        assert!(matches!(outcome, MutationOutcome::Completed(_)));
        assert_eq!(f.channel.invocation_count(), 2);
        assert!(!f.storage.contains("/Root/A/B"));
        assert_eq!(f.explorer.current_path().await, Some(PathBuf::from("/Root/A")));
    }

    #[tokio::test]
    async fn cancelled_delete_touches_nothing() {
        let f = fixture();
        f.explorer.navigate("/Root/A/B").await.unwrap();
        f.prompt.push_answer(Choice::Secondary);

        assert_eq!(
            f.explorer.delete_current_folder(false).await,
            Ok(MutationOutcome::Cancelled)
        );
        assert_eq!(f.channel.invocation_count(), 0);
        assert!(f.storage.contains("/Root/A/B"));
    }

    #[tokio::test]
    async fn rename_follows_folder() {
        let f = fixture();
        f.explorer.navigate("/Root/A/B").await.unwrap();
        f.explorer.rename_current_folder("Renamed").await.unwrap();

        assert_eq!(
            f.explorer.current_path().await,
            Some(PathBuf::from("/Root/A/Renamed"))
        );
        assert_eq!(f.explorer.breadcrumbs().await, ["Root", "A", "Renamed"]);
    }

    #[tokio::test]
    async fn create_folder_suffixes_and_lists_new_entry() {
        let f = fixture();
        f.explorer.navigate("/Root/A").await.unwrap();
        f.explorer.create_folder().await.unwrap();
        f.explorer.create_folder().await.unwrap();

        let names: Vec<String> = f.explorer.content().await.into_iter().map(|e| e.name).collect();
        assert!(names.contains(&"New folder".to_string()));
        assert!(names.contains(&"New folder (2)".to_string()));
    }

    #[tokio::test]
    async fn external_removal_of_current_moves_up() {
        let f = fixture();
        f.explorer.navigate("/Root/A/B").await.unwrap();
        f.storage.remove("/Root/A");

        let effect = f
            .explorer
            .handle_external_removal(Path::new("/Root/A"))
            .await
            .unwrap();
        assert!(matches!(effect, RemovalEffect::CurrentInvalidated { .. }));
        assert_eq!(f.explorer.current_path().await, Some(PathBuf::from("/Root")));
    }

    #[tokio::test]
    async fn move_drop_onto_own_parent_is_noop() {
        let f = fixture();
        f.explorer.navigate("/Root/A/B").await.unwrap();
        let outcome = f
            .explorer
            .drop_on_segment(1, vec![PathBuf::from("/Root/A/C")], DropAction::Move)
            .await
            .unwrap();
        assert_eq!(outcome, Gated::Ran(MutationOutcome::Unchanged));
        assert_eq!(f.channel.invocation_count(), 0);
    }

    #[tokio::test]
    async fn dispose_fails_later_navigation() {
        let f = fixture();
        f.explorer.navigate("/Root/A").await.unwrap();
        f.explorer.dispose().await;

        assert_eq!(f.explorer.navigate("/Root").await, Err(NavError::ViewClosed));
        assert!(f.explorer.current_path().await.is_none());
        assert!(f.explorer.breadcrumbs().await.is_empty());
        assert!(f.explorer.history().await.is_empty());
    }

    #[tokio::test]
    async fn drop_into_dragged_folder_is_refused() {
        let f = fixture();
        f.explorer.navigate("/Root/A/B").await.unwrap();

        for action in [DropAction::Copy, DropAction::Move] {
            assert_eq!(
                f.explorer
                    .drop_on_segment(2, vec![PathBuf::from("/Root/A")], action)
                    .await,
                Err(NavError::DropIntoSource(PathBuf::from("/Root/A/B")))
            );
        }
        assert_eq!(
            f.explorer
                .drop_on_segment(1, vec![PathBuf::from("/Root/A")], DropAction::Copy)
                .await,
            Err(NavError::DropIntoSource(PathBuf::from("/Root/A")))
        );
        assert_eq!(f.channel.invocation_count(), 0);
        assert_eq!(
            f.prompt.titles().last().map(String::as_str),
            Some("Cannot drop here")
        );
        assert!(f.storage.contains("/Root/A/B"));
    }

    #[tokio::test]
    async fn hidden_drop_target_is_refused() {
        let mut config = Config::default();
        config.navigation.show_hidden = true;
        let f = fixture_with(config);
        f.explorer.navigate("/Root/.secret/inner").await.unwrap();
        f.explorer.set_show_hidden(false).await;
        assert_eq!(f.explorer.breadcrumbs().await, ["Root", ".secret", "inner"]);

        assert_eq!(
            f.explorer
                .drop_on_segment(1, vec![PathBuf::from("/Root/A/C")], DropAction::Copy)
                .await,
            Err(NavError::Hidden(PathBuf::from("/Root/.secret")))
        );
        assert_eq!(f.channel.invocation_count(), 0);
        assert_eq!(
            f.prompt.dialogs().last(),
            Some(&Notice::ItemHidden(PathBuf::from("/Root/.secret")).dialog())
        );
    }

    #[tokio::test]
    async fn copy_drop_lists_new_folder_under_target() {
        let f = fixture();
        f.explorer.navigate("/Root/A/B").await.unwrap();

        let outcome = f
            .explorer
            .drop_on_segment(0, vec![PathBuf::from("/Root/A/C")], DropAction::Copy)
            .await
            .unwrap();

        assert!(matches!(outcome, Gated::Ran(MutationOutcome::Completed(_))));
        assert!(f.storage.contains("/Root/C"));
        assert!(f.storage.contains("/Root/A/C"));
        assert!(f.explorer.tree().node_for(Path::new("/Root/C")).await.is_some());
        assert_eq!(f.explorer.current_path().await, Some(PathBuf::from("/Root/A/B")));
    }

    #[tokio::test]
    async fn moving_displayed_folder_moves_view_up() {
        let f = fixture();
        f.explorer.navigate("/Root/A/C").await.unwrap();

        let outcome = f
            .explorer
            .drop_on_segment(0, vec![PathBuf::from("/Root/A/C")], DropAction::Move)
            .await
            .unwrap();

        assert!(matches!(outcome, Gated::Ran(MutationOutcome::Completed(_))));
        assert!(f.storage.contains("/Root/C"));
        assert!(!f.storage.contains("/Root/A/C"));
        assert_eq!(f.explorer.current_path().await, Some(PathBuf::from("/Root/A")));
        assert!(f.explorer.tree().node_for(Path::new("/Root/A/C")).await.is_none());
    }

    #[tokio::test]
    async fn rename_refuses_path_like_names() {
        let f = fixture();
        f.explorer.navigate("/Root/A/B").await.unwrap();

        for name in ["x/y", "x\\y", ".", ".."] {
            assert_eq!(
                f.explorer.rename_current_folder(name).await,
                Err(NavError::InvalidName(name.to_string()))
            );
        }
        assert_eq!(f.channel.invocation_count(), 0);
        assert_eq!(f.prompt.titles().last().map(String::as_str), Some("Invalid name"));
        assert_eq!(f.explorer.current_path().await, Some(PathBuf::from("/Root/A/B")));
    }

    #[tokio::test]
    async fn watch_events_follow_removal_and_creation() {
        let f = fixture();
        f.explorer.navigate("/Root/A/B").await.unwrap();

        f.storage.remove("/Root/A/B");
        f.explorer
            .apply_watch_event(WatchEvent::Removed(PathBuf::from("/Root/A/B")))
            .await
            .unwrap();
        assert_eq!(f.explorer.current_path().await, Some(PathBuf::from("/Root/A")));

        f.storage.add_folder("/Root/A/D");
        f.explorer
            .apply_watch_event(WatchEvent::Created(PathBuf::from("/Root/A/D")))
            .await
            .unwrap();
        let names: Vec<String> = f.explorer.content().await.into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["C", "D", "notes.txt"]);
    }

    #[tokio::test]
    async fn watcher_refreshes_displayed_folder_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.navigation.show_hidden = true;
        let services = Services {
            storage: Arc::new(LocalStorage::new()),
            channel: Arc::new(LocalChannel::new()),
            prompt: Arc::new(ScriptedPrompt::default()),
            history: Arc::new(MemoryHistoryStore::new(HistoryConfig::default())),
        };
        let explorer = Arc::new(Explorer::new(services, config));
        explorer.open(dir.path()).await.unwrap();
        let task = explorer.start_watching().await.unwrap().unwrap();

        std::fs::create_dir(dir.path().join("fresh")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if explorer.content().await.iter().any(|e| e.name == "fresh") {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
        .await
        .unwrap();

        drop(explorer);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn breadcrumb_refresh_respects_layout_guard() {
        let f = fixture();
        assert_eq!(f.explorer.refresh_breadcrumbs().await, Gated::Ran(None));

        f.explorer.navigate("/Root/A").await.unwrap();
        assert_eq!(
            f.explorer.refresh_breadcrumbs().await,
            Gated::Ran(Some(ReconcileOutcome::Extended { kept: 2 }))
        );

        let _held = f.explorer.gate().try_enter(GuardKind::BreadcrumbLayout).unwrap();
        assert_eq!(f.explorer.refresh_breadcrumbs().await, Gated::Skipped);
        assert_eq!(f.explorer.open_segment_flyout(0).await, Ok(Gated::Skipped));
    }

    #[tokio::test]
    async fn busy_autocomplete_skips_suggestions() {
        let f = fixture();
        let _held = f.explorer.gate().try_enter(GuardKind::Autocomplete).unwrap();
        assert_eq!(f.explorer.address_suggestions("/Root/").await, Gated::Skipped);
    }

    #[tokio::test]
    async fn tree_nodes_expand_and_collapse() {
        let f = fixture();
        f.explorer.navigate("/Root").await.unwrap();
        let root = f.explorer.tree().tree().await.root().unwrap();

        assert_eq!(f.explorer.expand_node(root).await, Ok(1));
        assert_eq!(f.explorer.tree().tree().await.children(root).len(), 1);

        f.explorer.collapse_node(root).await.unwrap();
        assert!(f.explorer.tree().tree().await.children(root).is_empty());
        assert_eq!(f.explorer.expand_node(root).await, Ok(1));
    }

    #[tokio::test]
    async fn search_terms_are_suggested_back() {
        let f = fixture();
        f.explorer.remember_search("report").await;
        f.explorer.remember_search("Repository").await;
        f.explorer.remember_search("   ").await;

        let mut found = f.explorer.search_suggestions("rep").await;
        found.sort();
        assert_eq!(found, ["Repository", "report"]);
        assert!(f.explorer.search_suggestions("zzz").await.is_empty());
    }

    #[tokio::test]
    async fn dispose_waits_for_admitted_navigation() {
        let f = fixture();
        f.storage.set_list_delay(Duration::from_millis(30));
        let pending = {
            let explorer = f.explorer.clone();
            tokio::spawn(async move { explorer.navigate("/Root/A/B").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        f.explorer.dispose().await;

        let _ = pending.await.unwrap();
        assert!(f.explorer.current_path().await.is_none());
        assert!(f.explorer.breadcrumbs().await.is_empty());
        assert!(f.explorer.tree().root_path().await.is_none());
    }
}
