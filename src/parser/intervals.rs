/// Sorted, disjoint set of inclusive line ranges.
///
/// Adjacent and overlapping ranges are merged on insert, so `ranges()` always
/// yields the minimal representation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    ranges: Vec<(usize, usize)>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `start..=end`. Empty ranges (`start > end`) are ignored.
    pub fn insert(&mut self, start: usize, end: usize) {
        if start > end {
            return;
        }

        // First range that could touch the new one
        let idx = self.ranges.partition_point(|&(_, e)| e.saturating_add(1) < start);
        let mut merged = (start, end);
        let mut last = idx;
        while last < self.ranges.len() && self.ranges[last].0 <= end.saturating_add(1) {
            merged.0 = merged.0.min(self.ranges[last].0);
            merged.1 = merged.1.max(self.ranges[last].1);
            last += 1;
        }
        self.ranges.splice(idx..last, std::iter::once(merged));
    }

    /// Everything in `lo..=hi` not covered by this set.
    pub fn complement(&self, lo: usize, hi: usize) -> IntervalSet {
        let mut out = IntervalSet::new();
        if lo > hi {
            return out;
        }
        let mut cursor = lo;
        for &(s, e) in &self.ranges {
            if e < cursor {
                continue;
            }
            if s > hi {
                break;
            }
            if s > cursor {
                out.ranges.push((cursor, s - 1));
            }
            cursor = e.saturating_add(1);
            if cursor > hi {
                return out;
            }
        }
        out.ranges.push((cursor, hi));
        out
    }

    pub fn ranges(&self) -> &[(usize, usize)] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterate every covered value in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranges.iter().flat_map(|&(s, e)| s..=e)
    }

    /// Number of covered values
    pub fn len(&self) -> usize {
        self.ranges.iter().map(|&(s, e)| e - s + 1).sum()
    }
}
