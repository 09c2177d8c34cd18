use std::collections::BTreeMap;
use std::ops::Bound;

/// A set of `u64` stored as sorted, disjoint, non-adjacent closed runs.
///
/// Membership and insertion cost O(log k) where k is the number of runs, so
/// clustered sets of billions of indices stay small.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    /// run start -> run end (inclusive)
    runs: BTreeMap<u64, u64>,
    len: u64,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_runs(runs: impl IntoIterator<Item = (u64, u64)>) -> Self {
        let mut set = Self::new();
        for (start, end) in runs {
            set.insert_range(start, end);
        }
        set
    }

    /// Number of members.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_runs(&self) -> usize {
        self.runs.len()
    }

    pub fn iter_runs(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.runs.iter().map(|(&start, &end)| (start, end))
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.iter_runs().flat_map(|(start, end)| start..=end)
    }

    pub fn contains(&self, value: u64) -> bool {
        self.runs
            .range(..=value)
            .next_back()
            .is_some_and(|(_, &end)| value <= end)
    }

    /// Returns false if `value` was already present.
    pub fn insert(&mut self, value: u64) -> bool {
        self.insert_range(value, value) == 1
    }

    /// Insert `[start, end]`, merging with overlapping or adjacent runs.
    /// Returns how many values were newly added.
    pub fn insert_range(&mut self, start: u64, end: u64) -> u64 {
        if end < start {
            return 0;
        }

        let mut merged_start = start;
        let mut merged_end = end;
        let mut absorbed = Vec::new();
        let mut overlap = 0u64;
        for (&run_start, &run_end) in self.runs.range(..=end.saturating_add(1)).rev() {
            if run_end.saturating_add(1) < start {
                break;
            }
            absorbed.push(run_start);
            merged_start = merged_start.min(run_start);
            merged_end = merged_end.max(run_end);
            let lo = run_start.max(start);
            let hi = run_end.min(end);
            if lo <= hi {
                overlap += hi - lo + 1;
            }
        }

        for run_start in absorbed {
            self.runs.remove(&run_start);
        }
        self.runs.insert(merged_start, merged_end);

        let added = (end - start + 1) - overlap;
        self.len += added;
        added
    }

    /// Returns false if `value` was not present.
    pub fn remove(&mut self, value: u64) -> bool {
        let Some((&run_start, &run_end)) = self.runs.range(..=value).next_back() else {
            return false;
        };
        if value > run_end {
            return false;
        }

        self.runs.remove(&run_start);
        if run_start < value {
            self.runs.insert(run_start, value - 1);
        }
        if value < run_end {
            self.runs.insert(value + 1, run_end);
        }
        self.len -= 1;
        true
    }

    /// How many members fall inside `[start, end]`.
    pub fn count_in_range(&self, start: u64, end: u64) -> u64 {
        if end < start {
            return 0;
        }
        let mut count = 0;
        // The run beginning before `start` may still overlap it.
        let first = self
            .runs
            .range(..start)
            .next_back()
            .map(|(&s, _)| Bound::Included(s))
            .unwrap_or(Bound::Included(start));
        for (&run_start, &run_end) in self.runs.range((first, Bound::Included(end))) {
            let lo = run_start.max(start);
            let hi = run_end.min(end);
            if lo <= hi {
                count += hi - lo + 1;
            }
        }
        count
    }

    /// First member inside `[start, end]`, if any.
    pub fn first_in_range(&self, start: u64, end: u64) -> Option<u64> {
        if self.contains(start) {
            return Some(start);
        }
        self.runs
            .range(start..=end)
            .next()
            .map(|(&run_start, _)| run_start)
    }

    pub fn intersection_with_range(&self, start: u64, end: u64) -> IntervalSet {
        let mut out = IntervalSet::new();
        if end < start {
            return out;
        }
        for (run_start, run_end) in self.iter_runs() {
            if run_start > end {
                break;
            }
            let lo = run_start.max(start);
            let hi = run_end.min(end);
            if lo <= hi {
                out.insert_range(lo, hi);
            }
        }
        out
    }

    pub fn union(&self, other: &IntervalSet) -> IntervalSet {
        let mut out = self.clone();
        for (start, end) in other.iter_runs() {
            out.insert_range(start, end);
        }
        out
    }

    pub fn is_disjoint(&self, other: &IntervalSet) -> bool {
        other
            .iter_runs()
            .all(|(start, end)| self.count_in_range(start, end) == 0)
    }

    pub fn is_subset(&self, other: &IntervalSet) -> bool {
        self.iter_runs()
            .all(|(start, end)| other.count_in_range(start, end) == end - start + 1)
    }
}
