// Breadcrumb trail - address-bar segments mirroring the current path
use crate::error::PathError;
use crate::model::path::{common_prefix_len, PathAnalyzer};
use std::path::{Path, PathBuf};

/// One breadcrumb button. `id` stays stable while the segment is retained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub id: u64,
    pub label: String,
}

/// Subfolder candidates shown under a segment's expansion arrow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentFlyout {
    pub anchor: usize,
    pub candidates: Vec<String>,
}

/// Edit needed to bring the trail in line with a new target path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrailPlan {
    /// Replace everything: new root plus the segments beneath it.
    Rebuild { root: PathBuf, segments: Vec<String> },
    /// Keep the first `keep` segments (root included), then append.
    Extend { keep: usize, append: Vec<String> },
}

#[derive(Clone, Debug, Default)]
pub struct BreadcrumbTrail {
    root: PathBuf,
    segments: Vec<Segment>,
    flyout: Option<SegmentFlyout>,
    fallback: bool,
    next_id: u64,
}

impl BreadcrumbTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the edit for `target`, whose volume root is `target_root`.
    pub fn plan(&self, target: &Path, target_root: &Path) -> Result<TrailPlan, PathError> {
        let analyzer = PathAnalyzer::new(target, target_root)?;
        let wanted = analyzer.segments();

        if self.segments.is_empty() || self.fallback || self.root != target_root {
            return Ok(TrailPlan::Rebuild {
                root: target_root.to_path_buf(),
                segments: wanted.to_vec(),
            });
        }

        let shown: Vec<String> = self.segments[1..].iter().map(|s| s.label.clone()).collect();
        // The shared root counts as the first common component.
        let keep = 1 + common_prefix_len(&shown, wanted);
        Ok(TrailPlan::Extend {
            keep,
            append: wanted[keep - 1..].to_vec(),
        })
    }

    pub fn rebuild(&mut self, root: PathBuf, root_label: String, segments: Vec<String>) {
        self.segments.clear();
        self.root = root;
        self.fallback = false;
        self.flyout = None;
        self.push(root_label);
        for label in segments {
            self.push(label);
        }
    }

    pub fn extend_from(&mut self, keep: usize, append: Vec<String>) {
        self.segments.truncate(keep);
        if matches!(&self.flyout, Some(flyout) if flyout.anchor >= keep) {
            self.flyout = None;
        }
        for label in append {
            self.push(label);
        }
    }

    /// Replaces the trail with the full path as a single segment.
    pub fn show_fallback(&mut self, path: &Path) {
        self.segments.clear();
        self.root = path.to_path_buf();
        self.flyout = None;
        self.push(path.display().to_string());
        self.fallback = true;
    }

    fn push(&mut self, label: String) {
        self.next_id += 1;
        self.segments.push(Segment {
            id: self.next_id,
            label,
        });
    }

    /// Path represented by the segment at `index`.
    pub fn segment_path(&self, index: usize) -> Option<PathBuf> {
        if index >= self.segments.len() {
            return None;
        }
        if self.fallback {
            return Some(self.root.clone());
        }
        let mut path = self.root.clone();
        for segment in &self.segments[1..=index] {
            path.push(&segment.label);
        }
        Some(path)
    }

    pub fn open_flyout(&mut self, anchor: usize, candidates: Vec<String>) {
        self.flyout = Some(SegmentFlyout { anchor, candidates });
    }

    pub fn close_flyout(&mut self) {
        self.flyout = None;
    }

    pub fn flyout(&self) -> Option<&SegmentFlyout> {
        self.flyout.as_ref()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn labels(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.label.as_str()).collect()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.flyout = None;
        self.fallback = false;
        self.root = PathBuf::new();
    }
}
