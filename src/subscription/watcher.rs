use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::warn;

/// Filesystem change seen in the watched folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Removed(PathBuf),
    Created(PathBuf),
    Changed(PathBuf),
}

/// Follows one folder at a time and forwards its changes over a channel.
pub struct FolderWatcher {
    watcher: RecommendedWatcher,
    watched: Option<PathBuf>,
}

impl FolderWatcher {
    pub fn new() -> Result<(Self, UnboundedReceiver<WatchEvent>), notify::Error> {
        let (tx, rx) = unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    for change in translate(&event) {
                        if tx.send(change).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!("watcher error: {}", e),
            }
        })?;
        Ok((
            Self {
                watcher,
                watched: None,
            },
            rx,
        ))
    }

    /// Moves the watch to `path`. Watching the same folder again is a no-op.
    pub fn watch(&mut self, path: &Path) -> Result<(), notify::Error> {
        if self.watched.as_deref() == Some(path) {
            return Ok(());
        }
        if let Some(previous) = self.watched.take() {
            if let Err(e) = self.watcher.unwatch(&previous) {
                warn!("failed to unwatch {}: {}", previous.display(), e);
            }
        }
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.watched = Some(path.to_path_buf());
        Ok(())
    }

    pub fn watched(&self) -> Option<&Path> {
        self.watched.as_deref()
    }
}

/// Maps a raw notify event onto the changes the explorer reacts to.
pub fn translate(event: &Event) -> Vec<WatchEvent> {
    match &event.kind {
        EventKind::Remove(_) => event.paths.iter().cloned().map(WatchEvent::Removed).collect(),
        EventKind::Create(_) => event.paths.iter().cloned().map(WatchEvent::Created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().cloned().map(WatchEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().cloned().map(WatchEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                WatchEvent::Removed(from.clone()),
                WatchEvent::Created(to.clone()),
            ],
            other => other.iter().cloned().map(WatchEvent::Changed).collect(),
        },
        EventKind::Modify(_) => event.paths.iter().cloned().map(WatchEvent::Changed).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind};
    use std::time::Duration;

    #[test]
    fn rename_becomes_removal_plus_creation() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/r/old"))
            .add_path(PathBuf::from("/r/new"));
        assert_eq!(
            translate(&event),
            [
                WatchEvent::Removed(PathBuf::from("/r/old")),
                WatchEvent::Created(PathBuf::from("/r/new")),
            ]
        );
    }

    #[test]
    fn create_and_remove_map_directly() {
        let created = Event::new(EventKind::Create(CreateKind::Folder)).add_path("/r/a".into());
        let removed = Event::new(EventKind::Remove(RemoveKind::Any)).add_path("/r/a".into());
        assert_eq!(translate(&created), [WatchEvent::Created("/r/a".into())]);
        assert_eq!(translate(&removed), [WatchEvent::Removed("/r/a".into())]);
        assert!(translate(&Event::new(EventKind::Any)).is_empty());
    }

    #[tokio::test]
    async fn watcher_reports_new_folder() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, mut rx) = FolderWatcher::new().unwrap();
        watcher.watch(dir.path()).unwrap();
        assert_eq!(watcher.watched(), Some(dir.path()));

        std::fs::create_dir(dir.path().join("fresh")).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(WatchEvent::Created(path)) if path.ends_with("fresh") => break path,
                    Some(_) => continue,
                    None => panic!("watcher channel closed"),
                }
            }
        })
        .await
        .unwrap();
        assert!(event.ends_with("fresh"));
    }
}
