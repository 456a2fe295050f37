pub mod breadcrumbs;
pub mod navigation;
pub mod tabs;
pub mod tree;

pub use breadcrumbs::{BreadcrumbTrail, Segment, SegmentFlyout, TrailPlan};
pub use navigation::NavigationHistory;
pub use tabs::TabsManager;
pub use tree::{FolderNode, FolderTree, NodeHandle};
