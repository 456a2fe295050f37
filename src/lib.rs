//! Directory navigation and synchronization engine for a file explorer view.
//!
//! An [`Explorer`] keeps a folder tree, a content listing, a breadcrumb trail
//! and a back/forward history in step with one displayed folder. Storage,
//! privileged execution, prompting and remembered history are collaborators
//! supplied through [`io::Services`].
pub mod app;
pub mod config;
pub mod entry;
pub mod error;
pub mod io;
pub mod message;
pub mod model;
pub mod state;
pub mod subscription;
pub mod sync;

pub use app::{AddressOutcome, DropAction, Explorer, MutationOutcome};
pub use config::Config;
pub use entry::{EntryKind, Location, StorageEntry};
pub use error::NavError;
pub use io::Services;
pub use state::TabsManager;
