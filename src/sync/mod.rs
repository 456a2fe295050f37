pub mod breadcrumb;
pub mod elevation;
pub mod gate;
pub mod tree;

pub use breadcrumb::{BreadcrumbReconciler, ReconcileOutcome};
pub use elevation::{ElevationRetry, RetryRun, RetryState};
pub use gate::{Gated, GuardKind, NavigationGate};
pub use tree::{RemovalEffect, TreeSynchronizer};
