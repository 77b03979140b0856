use crate::types::{TimestampEntry, TimestampResponse};

/// Topic entries for one media file, ordered by `time`.
#[derive(Debug, Clone, Default)]
pub struct TimestampIndex {
    entries: Vec<TimestampEntry>,
}

impl TimestampIndex {
    /// Sorts ascending by `time`, keeping the server's order for ties.
    /// Entries without a finite time cannot be placed and are dropped.
    pub fn new(entries: Vec<TimestampEntry>) -> Self {
        let mut entries: Vec<TimestampEntry> = entries
            .into_iter()
            .filter(|entry| {
                let keep = entry.time.is_finite();
                if !keep {
                    tracing::warn!(id = %entry.id, "dropping timestamp entry without a finite time");
                }
                keep
            })
            .collect();
        entries.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { entries }
    }

    pub fn from_response(response: TimestampResponse) -> Self {
        Self::new(response.timestamps)
    }

    /// Index of the last entry with `time <= position`, or `None` when the
    /// position precedes every entry.
    pub fn active(&self, position: f64) -> Option<usize> {
        let mut active = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.time <= position {
                active = Some(index);
            } else {
                break;
            }
        }
        active
    }

    pub fn entries(&self) -> &[TimestampEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&TimestampEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveChange {
    pub previous: Option<usize>,
    pub current: Option<usize>,
}

/// Follows the playhead and reports when the active entry changes.
#[derive(Debug, Clone, Default)]
pub struct PlaybackTracker {
    index: TimestampIndex,
    active: Option<usize>,
}

impl PlaybackTracker {
    pub fn new(index: TimestampIndex) -> Self {
        Self {
            index,
            active: None,
        }
    }

    pub fn index(&self) -> &TimestampIndex {
        &self.index
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn active_entry(&self) -> Option<&TimestampEntry> {
        self.active.and_then(|index| self.index.get(index))
    }

    pub fn observe(&mut self, position: f64) -> Option<ActiveChange> {
        let current = self.index.active(position);
        if current == self.active {
            return None;
        }
        let change = ActiveChange {
            previous: self.active,
            current,
        };
        self.active = current;
        Some(change)
    }

    /// Swaps in a freshly loaded index and re-evaluates at `position`.
    pub fn replace_index(&mut self, index: TimestampIndex, position: f64) -> Option<ActiveChange> {
        self.index = index;
        self.active = None;
        self.observe(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, time: f64) -> TimestampEntry {
        TimestampEntry {
            id: id.to_string(),
            time,
            topic: format!("topic {id}"),
            description: String::new(),
            keywords: Vec::new(),
            confidence: None,
        }
    }

    fn three_topics() -> TimestampIndex {
        TimestampIndex::new(vec![entry("a", 0.0), entry("b", 120.0), entry("c", 300.0)])
    }

    #[test]
    fn test_active_picks_last_entry_at_or_before_position() {
        let index = three_topics();
        assert_eq!(index.active(-1.0), None);
        assert_eq!(index.active(0.0), Some(0));
        assert_eq!(index.active(119.9), Some(0));
        assert_eq!(index.active(120.0), Some(1));
        assert_eq!(index.active(305.0), Some(2));
    }

    #[test]
    fn test_active_on_empty_index_is_none() {
        let index = TimestampIndex::default();
        assert!(index.is_empty());
        assert_eq!(index.active(10.0), None);
    }

    #[test]
    fn test_new_sorts_and_keeps_tie_order() {
        let index = TimestampIndex::new(vec![
            entry("late", 50.0),
            entry("tie-1", 10.0),
            entry("tie-2", 10.0),
            entry("bad", f64::NAN),
        ]);
        let ids: Vec<&str> = index.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["tie-1", "tie-2", "late"]);
        assert_eq!(index.active(10.0), Some(1));
    }

    #[test]
    fn test_active_with_nan_position_is_none() {
        assert_eq!(three_topics().active(f64::NAN), None);
    }

    #[test]
    fn test_tracker_reports_changes_only() {
        let mut tracker = PlaybackTracker::new(three_topics());
        assert_eq!(tracker.observe(-5.0), None);
        assert_eq!(
            tracker.observe(1.0),
            Some(ActiveChange {
                previous: None,
                current: Some(0)
            })
        );
        assert_eq!(tracker.observe(60.0), None);
        assert_eq!(
            tracker.observe(130.0),
            Some(ActiveChange {
                previous: Some(0),
                current: Some(1)
            })
        );
        assert_eq!(tracker.active_entry().map(|e| e.id.as_str()), Some("b"));

        // Seeking backwards is a change like any other.
        assert_eq!(
            tracker.observe(0.5),
            Some(ActiveChange {
                previous: Some(1),
                current: Some(0)
            })
        );
    }

    #[test]
    fn test_tracker_replace_index_reevaluates() {
        let mut tracker = PlaybackTracker::default();
        assert_eq!(tracker.observe(200.0), None);
        let change = tracker.replace_index(three_topics(), 200.0);
        assert_eq!(
            change,
            Some(ActiveChange {
                previous: None,
                current: Some(1)
            })
        );
        assert_eq!(tracker.index().len(), 3);
    }
}
