use alloc::vec::Vec;
use core::cmp::Ordering;

use smallvec::SmallVec;

use super::handle::Handle;
use super::node::Cell;
use super::raw_tree::RawWeftTree;
use super::sorted_list::SearchMode;

/// Per-leaf scratch for range collection. Sized to cover common fanouts
/// without spilling; a node never holds more than `max_node_size` cells,
/// though duplicate expansion can exceed the inline capacity.
type LeafBuffer = SmallVec<[Handle; 16]>;

impl<K, V> RawWeftTree<K, V> {
    /// Resolves `mode` against a key.
    ///
    /// The descent lands on the leaf whose interval covers the key; when
    /// that leaf cannot satisfy the mode, the answer sits in a chain
    /// neighbor - to the left for `Lt`/`Le`, to the right for `Gt`/`Ge` -
    /// so the walk continues there until a leaf yields an entry.
    pub(crate) fn lookup<C>(&self, cmp: &C, key: &K, mode: SearchMode) -> Option<Handle>
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let mut leaf_id = self.find_leaf(cmp, key)?;
        let position = |cell: &Cell<K, V>| cmp(cell.key(), key);
        loop {
            let node = self.nodes.get(leaf_id);
            if let Some(hit) = node.cells().search_by(&self.cells, &position, mode) {
                return Some(hit);
            }
            leaf_id = match mode {
                SearchMode::Eq => return None,
                SearchMode::Lt | SearchMode::Le => node.prev()?,
                SearchMode::Gt | SearchMode::Ge => node.next()?,
            };
        }
    }

    /// Emits every key satisfying the predicate, in ascending order.
    ///
    /// With a bookmark the scan starts at the leaf covering the bookmark
    /// key and drops exactly one match - the bookmark itself - so a caller
    /// can resume a previous scan without re-reading its last result.
    pub(crate) fn scan_where<C, P>(
        &self,
        cmp: &C,
        predicate: &P,
        bookmark: Option<&K>,
        limit: Option<usize>,
    ) -> Vec<Handle>
    where
        C: Fn(&K, &K) -> Ordering,
        P: Fn(&K) -> bool,
    {
        let mut out = Vec::new();
        if limit == Some(0) {
            return out;
        }
        let mut leaf = match bookmark {
            Some(key) => self.find_leaf(cmp, key),
            None => self.first_leaf,
        };
        let mut skip_bookmark = bookmark.is_some();
        let cell_matches = |cell: &Cell<K, V>| predicate(cell.key());

        while let Some(leaf_id) = leaf {
            let node = self.nodes.get(leaf_id);
            let mut full = false;
            node.cells().find_where(&self.cells, &cell_matches, |entry| {
                if full {
                    return;
                }
                if skip_bookmark {
                    skip_bookmark = false;
                    return;
                }
                out.push(entry);
                if let Some(limit) = limit
                    && out.len() >= limit
                {
                    full = true;
                }
            });
            if full {
                break;
            }
            leaf = node.next();
        }
        out
    }

    /// The entry at expanded position `(size - 1) / 2`: the middle element
    /// with duplicate multiplicities counted, found by walking the leaf
    /// chain from the left.
    pub(crate) fn median_entry(&self) -> Option<Handle> {
        if self.size == 0 {
            return None;
        }
        let target = (self.size - 1) / 2;
        let mut seen: u64 = 0;
        let mut leaf = self.first_leaf;
        while let Some(leaf_id) = leaf {
            let node = self.nodes.get(leaf_id);
            for entry_id in node.cells().iter(&self.cells) {
                seen += 1 + self.cells.get(entry_id).duplicates() as u64;
                if seen > target {
                    return Some(entry_id);
                }
            }
            leaf = node.next();
        }
        None
    }
}

impl<K: Clone, V> RawWeftTree<K, V> {
    /// Collects the entries inside the closed interval `[start, end]` in
    /// ascending order, duplicates expanded, after skipping `offset`
    /// matches and stopping once `limit` entries are out (`None` is
    /// unbounded).
    ///
    /// The walk starts at the leaf covering `start` (or the first leaf)
    /// and ends after the leaf covering `end` (or the last leaf); leaves
    /// past the end leaf cannot hold in-range keys, so the cursor never
    /// visits them.
    pub(crate) fn range_entries<C>(
        &self,
        cmp: &C,
        start: Option<&K>,
        end: Option<&K>,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<Handle>
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let mut out = Vec::new();
        if self.size == 0 || limit == Some(0) {
            return out;
        }
        let start_leaf = match start {
            Some(key) => self.find_leaf(cmp, key),
            None => self.first_leaf,
        };
        let end_leaf = match end {
            Some(key) => self.find_leaf(cmp, key),
            None => self.last_leaf,
        };
        let (Some(start_leaf), Some(end_leaf)) = (start_leaf, end_leaf) else {
            return out;
        };

        // Bound probes are materialized once; the list filters both ends
        // of the interval inclusively.
        let start_probe = start.map(|key| Cell::leaf(key.clone(), None));
        let end_probe = end.map(|key| Cell::leaf(key.clone(), None));
        let by_key = |a: &Cell<K, V>, b: &Cell<K, V>| cmp(a.key(), b.key());

        let mut to_skip = offset;
        let mut remaining = limit;
        let mut leaf = Some(start_leaf);
        while let Some(leaf_id) = leaf {
            let node = self.nodes.get(leaf_id);
            let mut buffer = LeafBuffer::new();
            node.cells().range_collect(
                &self.cells,
                &by_key,
                start_probe.as_ref(),
                end_probe.as_ref(),
                true,
                |entry| buffer.push(entry),
            );
            for entry in buffer {
                if to_skip > 0 {
                    to_skip -= 1;
                    continue;
                }
                out.push(entry);
                if let Some(remaining) = &mut remaining {
                    *remaining -= 1;
                    if *remaining == 0 {
                        return out;
                    }
                }
            }
            if leaf_id == end_leaf {
                break;
            }
            leaf = node.next();
        }
        out
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn int_cmp(a: &i32, b: &i32) -> Ordering {
        a.cmp(b)
    }

    fn tens() -> RawWeftTree<i32, i32> {
        let mut tree = RawWeftTree::new(4).unwrap();
        for key in (10..=100).step_by(10) {
            tree.insert(&int_cmp, key, Some(key)).unwrap();
        }
        tree
    }

    fn keys_of(tree: &RawWeftTree<i32, i32>, entries: &[Handle]) -> Vec<i32> {
        entries.iter().map(|&entry| *tree.cell(entry).key()).collect()
    }

    #[test]
    fn range_walks_across_leaves() {
        let tree = tens();
        let all = tree.range_entries(&int_cmp, None, None, 0, None);
        assert_eq!(keys_of(&tree, &all), [10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[test]
    fn range_bounds_are_inclusive_even_when_absent() {
        let tree = tens();
        let hits = tree.range_entries(&int_cmp, Some(&35), Some(&75), 0, None);
        assert_eq!(keys_of(&tree, &hits), [40, 50, 60, 70]);
        let hits = tree.range_entries(&int_cmp, Some(&40), Some(&70), 0, None);
        assert_eq!(keys_of(&tree, &hits), [40, 50, 60, 70]);
    }

    #[test]
    fn range_applies_offset_and_limit() {
        let tree = tens();
        let hits = tree.range_entries(&int_cmp, Some(&35), Some(&75), 1, Some(2));
        assert_eq!(keys_of(&tree, &hits), [50, 60]);
        let hits = tree.range_entries(&int_cmp, None, None, 8, Some(5));
        assert_eq!(keys_of(&tree, &hits), [90, 100]);
        assert!(tree.range_entries(&int_cmp, None, None, 10, None).is_empty());
        assert!(tree.range_entries(&int_cmp, None, None, 0, Some(0)).is_empty());
    }

    #[test]
    fn range_with_inverted_bounds_is_empty() {
        let tree = tens();
        assert!(tree.range_entries(&int_cmp, Some(&80), Some(&20), 0, None).is_empty());
    }

    #[test]
    fn range_expands_duplicates() {
        let mut tree = tens();
        tree.insert(&int_cmp, 40, Some(41)).unwrap();
        tree.insert(&int_cmp, 40, Some(42)).unwrap();
        let hits = tree.range_entries(&int_cmp, Some(&30), Some(&50), 0, None);
        assert_eq!(keys_of(&tree, &hits), [30, 40, 40, 40, 50]);
        // Offsets count expanded copies.
        let hits = tree.range_entries(&int_cmp, Some(&30), Some(&50), 2, Some(2));
        assert_eq!(keys_of(&tree, &hits), [40, 40]);
    }

    #[test]
    fn lookup_modes_cross_leaf_boundaries() {
        let tree = tens();
        let key = |entry: Option<Handle>| entry.map(|e| *tree.cell(e).key());

        assert_eq!(key(tree.lookup(&int_cmp, &50, SearchMode::Eq)), Some(50));
        assert_eq!(key(tree.lookup(&int_cmp, &55, SearchMode::Eq)), None);
        assert_eq!(key(tree.lookup(&int_cmp, &55, SearchMode::Le)), Some(50));
        assert_eq!(key(tree.lookup(&int_cmp, &55, SearchMode::Ge)), Some(60));
        // An exact hit forces Lt/Gt into the neighboring entry, which may
        // live in the neighboring leaf.
        assert_eq!(key(tree.lookup(&int_cmp, &50, SearchMode::Lt)), Some(40));
        assert_eq!(key(tree.lookup(&int_cmp, &50, SearchMode::Gt)), Some(60));
        assert_eq!(key(tree.lookup(&int_cmp, &10, SearchMode::Lt)), None);
        assert_eq!(key(tree.lookup(&int_cmp, &100, SearchMode::Gt)), None);
        assert_eq!(key(tree.lookup(&int_cmp, &5, SearchMode::Ge)), Some(10));
        assert_eq!(key(tree.lookup(&int_cmp, &500, SearchMode::Le)), Some(100));
    }

    #[test]
    fn scan_where_filters_and_resumes() {
        let tree = tens();
        let even_hundreds = |key: &i32| key % 20 == 0;

        let hits = tree.scan_where(&int_cmp, &even_hundreds, None, None);
        assert_eq!(keys_of(&tree, &hits), [20, 40, 60, 80, 100]);

        let hits = tree.scan_where(&int_cmp, &even_hundreds, None, Some(2));
        assert_eq!(keys_of(&tree, &hits), [20, 40]);

        // Resuming from the last result skips it and continues.
        let hits = tree.scan_where(&int_cmp, &even_hundreds, Some(&40), Some(2));
        assert_eq!(keys_of(&tree, &hits), [60, 80]);
    }

    #[test]
    fn median_counts_duplicates() {
        let mut tree = RawWeftTree::<i32, i32>::new(4).unwrap();
        assert!(tree.median_entry().is_none());

        for key in [50, 30, 70, 10, 40, 60, 90, 20, 80, 100] {
            tree.insert(&int_cmp, key, None).unwrap();
        }
        let median = tree.median_entry().unwrap();
        assert_eq!(*tree.cell(median).key(), 50);

        // Three extra copies of 20 shift the middle of the expanded
        // sequence: thirteen elements put it at position six, which the
        // duplicates push onto 40.
        for _ in 0..3 {
            tree.insert(&int_cmp, 20, None).unwrap();
        }
        let median = tree.median_entry().unwrap();
        assert_eq!(*tree.cell(median).key(), 40);
    }
}
