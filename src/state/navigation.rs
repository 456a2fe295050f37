// Navigation history - visited locations with a back/forward cursor
use crate::entry::Location;
use crate::error::HistoryError;

pub const DEFAULT_HISTORY_LIMIT: usize = 256;

#[derive(Clone, Debug)]
pub struct NavigationHistory {
    entries: Vec<Location>,
    index: usize,
    limit: usize,
}

impl Default for NavigationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: 0,
            limit: limit.max(1),
        }
    }

    /// Records a fresh navigation. Never called while replaying back/forward.
    pub fn record_visit(&mut self, location: Location) {
        // Remove any forward history when navigating to a new path
        if !self.entries.is_empty() {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push(location);

        if self.entries.len() > self.limit {
            let overflow = self.entries.len() - self.limit;
            self.entries.drain(..overflow);
        }
        self.index = self.entries.len() - 1;
    }

    pub fn go_back(&mut self) -> Result<Location, HistoryError> {
        if !self.can_go_back() {
            return Err(HistoryError::AtHistoryStart);
        }
        self.index -= 1;
        Ok(self.entries[self.index].clone())
    }

    pub fn go_forward(&mut self) -> Result<Location, HistoryError> {
        if !self.can_go_forward() {
            return Err(HistoryError::AtHistoryEnd);
        }
        self.index += 1;
        Ok(self.entries[self.index].clone())
    }

    pub fn can_go_back(&self) -> bool {
        !self.entries.is_empty() && self.index > 0
    }

    pub fn can_go_forward(&self) -> bool {
        !self.entries.is_empty() && self.index < self.entries.len() - 1
    }

    pub fn current(&self) -> Option<&Location> {
        self.entries.get(self.index)
    }

    pub fn cursor(&self) -> usize {
        self.index
    }

    pub fn entries(&self) -> &[Location] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(path: &str) -> Location {
        Location::from_path(path)
    }

    #[test]
    fn back_twice_returns_first_visit() {
        let mut history = NavigationHistory::new();
        history.record_visit(loc("/a"));
        history.record_visit(loc("/b"));
        history.record_visit(loc("/c"));

        assert_eq!(history.go_back().unwrap(), loc("/b"));
        assert_eq!(history.go_back().unwrap(), loc("/a"));
        assert_eq!(history.go_back(), Err(HistoryError::AtHistoryStart));
    }

    #[test]
    fn fresh_visit_discards_forward_entries() {
        let mut history = NavigationHistory::new();
        for p in ["/a", "/b", "/c"] {
            history.record_visit(loc(p));
        }
        history.go_back().unwrap();
        history.go_back().unwrap();
        history.record_visit(loc("/d"));

        assert_eq!(history.go_forward(), Err(HistoryError::AtHistoryEnd));
        let paths: Vec<_> = history.entries().iter().map(|l| l.path.clone()).collect();
        assert_eq!(paths, [loc("/a").path, loc("/d").path]);
        assert_eq!(history.go_back().unwrap(), loc("/a"));
    }

    #[test]
    fn predicates_follow_cursor() {
        let mut history = NavigationHistory::new();
        assert!(!history.can_go_back());
        assert!(!history.can_go_forward());
        assert_eq!(history.go_forward(), Err(HistoryError::AtHistoryEnd));

        history.record_visit(loc("/a"));
        assert!(!history.can_go_back());
        history.record_visit(loc("/b"));
        assert!(history.can_go_back());
        assert!(!history.can_go_forward());

        history.go_back().unwrap();
        assert!(history.can_go_forward());
        assert_eq!(history.go_forward().unwrap(), loc("/b"));
    }

    #[test]
    fn limit_drops_oldest_entries() {
        let mut history = NavigationHistory::with_limit(2);
        for p in ["/a", "/b", "/c"] {
            history.record_visit(loc(p));
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), 1);
        assert_eq!(history.go_back().unwrap(), loc("/b"));
        assert!(!history.can_go_back());
    }

    #[test]
    fn clear_resets_cursor() {
        let mut history = NavigationHistory::new();
        history.record_visit(loc("/a"));
        history.record_visit(loc("/b"));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.current(), None);
    }
}
