pub mod path;

pub use path::PathAnalyzer;
