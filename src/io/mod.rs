pub mod directory;
pub mod history;
pub mod memory;
pub mod ops;
pub mod provider;

pub use directory::LocalStorage;
pub use history::{FileHistoryStore, MemoryHistoryStore};
pub use memory::{MemoryChannel, MemoryStorage, ScriptedPrompt};
pub use ops::{FileOperation, LocalChannel, OperationKind, OperationReport};
pub use provider::{HistoryStore, PrivilegedChannel, Prompt, StorageProvider};

use std::sync::Arc;

/// Collaborators shared by every view of a session.
#[derive(Clone)]
pub struct Services {
    pub storage: Arc<dyn StorageProvider>,
    pub channel: Arc<dyn PrivilegedChannel>,
    pub prompt: Arc<dyn Prompt>,
    pub history: Arc<dyn HistoryStore>,
}
