// Persistent path/search history shared across views
use crate::config::HistoryConfig;
use crate::error::HistoryStoreError;
use crate::io::provider::HistoryStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HistoryRecord {
    pub value: String,
    pub last_used: DateTime<Utc>,
    pub uses: u32,
}

/// Most-recent-first lists of visited paths and search terms.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct HistoryBook {
    pub paths: Vec<HistoryRecord>,
    pub searches: Vec<HistoryRecord>,
}

fn touch(records: &mut Vec<HistoryRecord>, value: &str, limit: usize) {
    let uses = match records.iter().position(|r| r.value == value) {
        Some(index) => records.remove(index).uses + 1,
        None => 1,
    };
    records.insert(
        0,
        HistoryRecord {
            value: value.to_string(),
            last_used: Utc::now(),
            uses,
        },
    );
    records.truncate(limit);
}

impl HistoryBook {
    pub fn record_path(&mut self, path: &Path, limit: usize) {
        touch(&mut self.paths, &path.display().to_string(), limit);
    }

    pub fn record_search(&mut self, term: &str, limit: usize) {
        let term = term.trim();
        if term.is_empty() {
            return;
        }
        touch(&mut self.searches, term, limit);
    }

    /// Case-insensitive prefix matches, paths before search terms.
    pub fn suggestions(&self, prefix: &str, limit: usize) -> Vec<String> {
        let needle = prefix.to_lowercase();
        let mut out: Vec<String> = Vec::new();
        for record in self.paths.iter().chain(self.searches.iter()) {
            if out.len() >= limit {
                break;
            }
            if record.value.to_lowercase().starts_with(&needle) && !out.contains(&record.value) {
                out.push(record.value.clone());
            }
        }
        out
    }
}

/// History kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    book: Mutex<HistoryBook>,
    limits: HistoryConfig,
}

impl MemoryHistoryStore {
    pub fn new(limits: HistoryConfig) -> Self {
        Self {
            book: Mutex::new(HistoryBook::default()),
            limits,
        }
    }

    pub async fn snapshot(&self) -> HistoryBook {
        self.book.lock().await.clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn record_path_visit(&self, path: &Path) -> Result<(), HistoryStoreError> {
        self.book
            .lock()
            .await
            .record_path(path, self.limits.max_path_visits);
        Ok(())
    }

    async fn record_search_term(&self, term: &str) -> Result<(), HistoryStoreError> {
        self.book
            .lock()
            .await
            .record_search(term, self.limits.max_search_terms);
        Ok(())
    }

    async fn suggestions_for(&self, prefix: &str) -> Result<Vec<String>, HistoryStoreError> {
        Ok(self
            .book
            .lock()
            .await
            .suggestions(prefix, self.limits.suggestion_limit))
    }
}

/// History persisted as TOML, rewritten after every change.
#[derive(Debug)]
pub struct FileHistoryStore {
    path: PathBuf,
    book: Mutex<HistoryBook>,
    limits: HistoryConfig,
}

impl FileHistoryStore {
    /// `history.toml` in the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "heike")
            .map(|dirs| dirs.data_dir().join("history.toml"))
    }

    /// Loads `path`; a missing or corrupt file starts an empty history.
    pub async fn open(path: PathBuf, limits: HistoryConfig) -> Self {
        let book = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match toml::from_str::<HistoryBook>(&contents) {
                Ok(book) => book,
                Err(e) => {
                    tracing::warn!("Ignoring corrupt history file {}: {}", path.display(), e);
                    HistoryBook::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HistoryBook::default(),
            Err(e) => {
                tracing::warn!("Failed to read history file {}: {}", path.display(), e);
                HistoryBook::default()
            }
        };
        Self {
            path,
            book: Mutex::new(book),
            limits,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, book: &HistoryBook) -> Result<(), HistoryStoreError> {
        let contents =
            toml::to_string_pretty(book).map_err(|e| HistoryStoreError::Format(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn record_path_visit(&self, path: &Path) -> Result<(), HistoryStoreError> {
        let mut book = self.book.lock().await;
        book.record_path(path, self.limits.max_path_visits);
        self.persist(&book).await
    }

    async fn record_search_term(&self, term: &str) -> Result<(), HistoryStoreError> {
        let mut book = self.book.lock().await;
        book.record_search(term, self.limits.max_search_terms);
        self.persist(&book).await
    }

    async fn suggestions_for(&self, prefix: &str) -> Result<Vec<String>, HistoryStoreError> {
        Ok(self
            .book
            .lock()
            .await
            .suggestions(prefix, self.limits.suggestion_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max: usize) -> HistoryConfig {
        HistoryConfig {
            max_path_visits: max,
            max_search_terms: max,
            suggestion_limit: 5,
            ..HistoryConfig::default()
        }
    }

    #[test]
    fn revisit_moves_record_to_front() {
        let mut book = HistoryBook::default();
        book.record_path(Path::new("/a"), 10);
        book.record_path(Path::new("/b"), 10);
        book.record_path(Path::new("/a"), 10);
        let values: Vec<_> = book.paths.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, ["/a", "/b"]);
        assert_eq!(book.paths[0].uses, 2);
    }

    #[test]
    fn blank_search_terms_are_ignored() {
        let mut book = HistoryBook::default();
        book.record_search("   ", 10);
        assert!(book.searches.is_empty());
    }

    #[tokio::test]
    async fn memory_store_is_bounded() {
        let store = MemoryHistoryStore::new(limits(2));
        for p in ["/x/1", "/x/2", "/x/3"] {
            store.record_path_visit(Path::new(p)).await.unwrap();
        }
        let suggestions = store.suggestions_for("/X").await.unwrap();
        assert_eq!(suggestions, ["/x/3", "/x/2"]);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/history.toml");

        let store = FileHistoryStore::open(path.clone(), limits(10)).await;
        store.record_path_visit(Path::new("/home/kei/docs")).await.unwrap();
        store.record_search_term("invoice").await.unwrap();
        drop(store);

        let reopened = FileHistoryStore::open(path, limits(10)).await;
        assert_eq!(
            reopened.suggestions_for("/home").await.unwrap(),
            ["/home/kei/docs"]
        );
        assert_eq!(reopened.suggestions_for("inv").await.unwrap(), ["invoice"]);
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.toml");
        std::fs::write(&path, "paths = 3").unwrap();
        let store = FileHistoryStore::open(path, limits(10)).await;
        assert!(store.suggestions_for("").await.unwrap().is_empty());
    }
}
