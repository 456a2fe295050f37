// Tabs state management for multiple explorer views
use crate::app::Explorer;
use crate::config::Config;
use crate::entry::Location;
use crate::error::NavError;
use crate::io::Services;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Manages multiple tabs, one [`Explorer`] each, over shared services
pub struct TabsManager {
    services: Services,
    config: Config,
    tabs: Vec<Arc<Explorer>>,
    active_tab: usize,
}

impl TabsManager {
    pub fn new(services: Services, config: Config) -> Self {
        Self {
            services,
            config,
            tabs: Vec::new(),
            active_tab: 0,
        }
    }

    pub fn active(&self) -> Option<&Arc<Explorer>> {
        self.tabs.get(self.active_tab)
    }

    pub fn active_index(&self) -> usize {
        self.active_tab
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Explorer>> {
        self.tabs.get(index)
    }

    /// Opens `path` in a new tab and makes it active. A tab whose path
    /// cannot be shown is not kept.
    pub async fn new_tab(&mut self, path: impl AsRef<Path>) -> Result<Location, NavError> {
        let explorer = Arc::new(Explorer::new(self.services.clone(), self.config.clone()));
        let location = explorer.open(path).await?;
        self.tabs.push(explorer);
        self.active_tab = self.tabs.len() - 1;
        debug!(tabs = self.tabs.len(), path = %location.path.display(), "tab opened");
        Ok(location)
    }

    /// Closes the tab at `index` and disposes its view. The last tab stays open.
    pub async fn close_tab(&mut self, index: usize) -> bool {
        if self.tabs.len() <= 1 || index >= self.tabs.len() {
            return false;
        }

        let closed = self.tabs.remove(index);
        closed.dispose().await;

        if self.active_tab >= index && self.active_tab > 0 {
            self.active_tab -= 1;
        }
        true
    }

    pub async fn close_current_tab(&mut self) -> bool {
        self.close_tab(self.active_tab).await
    }

    pub fn switch_to_tab(&mut self, index: usize) {
        if index < self.tabs.len() {
            self.active_tab = index;
        }
    }

    pub fn next_tab(&mut self) {
        if !self.tabs.is_empty() {
            self.active_tab = (self.active_tab + 1) % self.tabs.len();
        }
    }

    pub fn prev_tab(&mut self) {
        if self.active_tab == 0 {
            self.active_tab = self.tabs.len().saturating_sub(1);
        } else {
            self.active_tab -= 1;
        }
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    /// Tab titles: the display name of each tab's current folder.
    pub async fn labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.tabs.len());
        for tab in &self.tabs {
            let label = tab
                .current_location()
                .await
                .map(|location| location.display_name)
                .unwrap_or_default();
            labels.push(label);
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::io::{MemoryChannel, MemoryHistoryStore, MemoryStorage, ScriptedPrompt};
    use std::path::PathBuf;

    fn manager() -> TabsManager {
        let storage = Arc::new(MemoryStorage::new().with_volume("/Root", "Root"));
        storage.add_folder("/Root/A");
        storage.add_folder("/Root/B");
        let services = Services {
            storage: storage.clone(),
            channel: Arc::new(MemoryChannel::new(storage)),
            prompt: Arc::new(ScriptedPrompt::default()),
            history: Arc::new(MemoryHistoryStore::new(HistoryConfig::default())),
        };
        TabsManager::new(services, Config::default())
    }

    #[tokio::test]
    async fn tabs_keep_independent_views() {
        let mut tabs = manager();
        tabs.new_tab("/Root/A").await.unwrap();
        tabs.new_tab("/Root/B").await.unwrap();
        assert_eq!(tabs.tab_count(), 2);
        assert_eq!(tabs.active_index(), 1);
        assert_eq!(tabs.labels().await, ["A", "B"]);

        tabs.active().unwrap().navigate("/Root").await.unwrap();
        assert_eq!(
            tabs.get(0).unwrap().current_path().await,
            Some(PathBuf::from("/Root/A"))
        );
    }

    #[tokio::test]
    async fn last_tab_cannot_be_closed() {
        let mut tabs = manager();
        tabs.new_tab("/Root/A").await.unwrap();
        assert!(!tabs.close_current_tab().await);

        tabs.new_tab("/Root/B").await.unwrap();
        let closed = tabs.get(1).unwrap().clone();
        assert!(tabs.close_tab(1).await);
        assert_eq!(tabs.active_index(), 0);
        assert_eq!(closed.navigate("/Root").await, Err(NavError::ViewClosed));
    }

    #[tokio::test]
    async fn switching_wraps_around() {
        let mut tabs = manager();
        for path in ["/Root", "/Root/A", "/Root/B"] {
            tabs.new_tab(path).await.unwrap();
        }
        tabs.next_tab();
        assert_eq!(tabs.active_index(), 0);
        tabs.prev_tab();
        assert_eq!(tabs.active_index(), 2);
        tabs.switch_to_tab(1);
        assert_eq!(tabs.active_index(), 1);
        tabs.switch_to_tab(9);
        assert_eq!(tabs.active_index(), 1);
    }

    #[tokio::test]
    async fn unreachable_path_opens_no_tab() {
        let mut tabs = manager();
        assert!(tabs.new_tab("/Root/missing").await.is_err());
        assert_eq!(tabs.tab_count(), 0);
    }
}
