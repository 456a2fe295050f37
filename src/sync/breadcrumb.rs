// Breadcrumb reconciler - minimal trail edits against the storage provider
use crate::error::NavError;
use crate::io::provider::StorageProvider;
use crate::state::breadcrumbs::{BreadcrumbTrail, TrailPlan};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Rebuilt,
    /// Leading `kept` segments were retained as they were.
    Extended { kept: usize },
    /// Root resolution failed; the trail shows the full path as one segment.
    Fallback,
    /// A newer reconcile was issued while this one waited.
    Superseded,
}

pub struct BreadcrumbReconciler {
    trail: Mutex<BreadcrumbTrail>,
    storage: Arc<dyn StorageProvider>,
    latest: AtomicU64,
}

impl BreadcrumbReconciler {
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self {
            trail: Mutex::new(BreadcrumbTrail::new()),
            storage,
            latest: AtomicU64::new(0),
        }
    }

    pub async fn trail(&self) -> MutexGuard<'_, BreadcrumbTrail> {
        self.trail.lock().await
    }

    pub async fn labels(&self) -> Vec<String> {
        self.trail
            .lock()
            .await
            .labels()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Brings the trail in line with `target`. Only the most recently issued
    /// reconcile may apply a rebuild.
    pub async fn reconcile(&self, target: &Path) -> ReconcileOutcome {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let root = self.storage.root_of(target);

        let (root, segments) = {
            let mut trail = self.trail.lock().await;
            match trail.plan(target, &root) {
                Ok(TrailPlan::Extend { keep, append }) => {
                    trail.extend_from(keep, append);
                    return ReconcileOutcome::Extended { kept: keep };
                }
                Ok(TrailPlan::Rebuild { root, segments }) => (root, segments),
                Err(err) => {
                    warn!("breadcrumb plan failed for {}: {}", target.display(), err);
                    trail.show_fallback(target);
                    return ReconcileOutcome::Fallback;
                }
            }
        };

        let label = self.storage.display_name(&root).await;

        let mut trail = self.trail.lock().await;
        if self.latest.load(Ordering::SeqCst) != ticket {
            debug!(target = %target.display(), "breadcrumb rebuild superseded");
            return ReconcileOutcome::Superseded;
        }
        match label {
            Ok(label) => {
                trail.rebuild(root, label, segments);
                ReconcileOutcome::Rebuilt
            }
            Err(err) => {
                warn!("breadcrumb root {} unavailable: {}", root.display(), err);
                trail.show_fallback(target);
                ReconcileOutcome::Fallback
            }
        }
    }

    pub async fn segment_path(&self, index: usize) -> Result<PathBuf, NavError> {
        self.trail
            .lock()
            .await
            .segment_path(index)
            .ok_or(NavError::NoSuchSegment(index))
    }

    /// Lists subfolders of the segment at `index` as flyout candidates.
    pub async fn open_flyout(&self, index: usize, include_hidden: bool) -> Result<Vec<String>, NavError> {
        let path = self.segment_path(index).await?;
        let candidates: Vec<String> = self
            .storage
            .list_children(&path, include_hidden)
            .await?
            .into_iter()
            .filter(|e| e.is_dir())
            .map(|e| e.name)
            .collect();
        self.trail
            .lock()
            .await
            .open_flyout(index, candidates.clone());
        Ok(candidates)
    }

    pub async fn close_flyout(&self) {
        self.trail.lock().await.close_flyout();
    }

    pub async fn clear(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
        self.trail.lock().await.clear();
    }
}
