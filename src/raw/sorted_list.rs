use core::cmp::Ordering;

use crate::error::{TreeError, TreeResult};

use super::arena::Arena;
use super::handle::Handle;

/// How a search resolves against the probe key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchMode {
    /// The entry equal to the probe.
    Eq,
    /// The greatest entry less than or equal to the probe.
    Le,
    /// The least entry greater than or equal to the probe.
    Ge,
    /// The greatest entry strictly less than the probe.
    Lt,
    /// The least entry strictly greater than the probe.
    Gt,
}

/// One element of a [`SortedList`].
///
/// Equal inserts collapse into a single entry: the stored item is replaced
/// by the newest insert and `duplicates` counts how many extras collided.
pub(crate) struct Entry<T> {
    item: T,
    left: Option<Handle>,
    right: Option<Handle>,
    duplicates: usize,
}

impl<T> Entry<T> {
    fn new(item: T) -> Self {
        Self {
            item,
            left: None,
            right: None,
            duplicates: 0,
        }
    }

    pub(crate) fn item(&self) -> &T {
        &self.item
    }

    pub(crate) fn item_mut(&mut self) -> &mut T {
        &mut self.item
    }

    pub(crate) fn into_item(self) -> T {
        self.item
    }

    pub(crate) fn left(&self) -> Option<Handle> {
        self.left
    }

    pub(crate) fn right(&self) -> Option<Handle> {
        self.right
    }

    /// Number of extra inserts that collided on equality after the first.
    pub(crate) fn duplicates(&self) -> usize {
        self.duplicates
    }
}

/// An ordered doubly-linked sequence of entries.
///
/// The list owns no storage: it is a link overlay over an [`Arena`] of
/// entries supplied with every call. Because splits and merges only relink
/// entries, a `Handle` obtained from one list stays valid when the entry
/// migrates to another list, which is what lets tree nodes keep stable
/// handles to the parent cells that reference them.
///
/// `count` is structural: it counts collapsed entries, not duplicate
/// multiplicity.
#[derive(Default)]
pub(crate) struct SortedList {
    min: Option<Handle>,
    max: Option<Handle>,
    count: usize,
}

impl SortedList {
    pub(crate) const fn new() -> Self {
        Self {
            min: None,
            max: None,
            count: 0,
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub(crate) fn min(&self) -> Option<Handle> {
        self.min
    }

    pub(crate) fn max(&self) -> Option<Handle> {
        self.max
    }

    /// Walks the list left to right.
    pub(crate) fn iter<'a, T>(&self, arena: &'a Arena<Entry<T>>) -> impl Iterator<Item = Handle> + 'a {
        let mut cursor = self.min;
        core::iter::from_fn(move || {
            let id = cursor?;
            cursor = arena.get(id).right;
            Some(id)
        })
    }

    /// Resolves `mode` against a probe expressed as an ordering function.
    ///
    /// `position(entry)` must return how the entry orders relative to the
    /// probe (`Less` when the entry is smaller). The scan runs left to
    /// right and stops at the first entry past the probe.
    pub(crate) fn search_by<T, F>(&self, arena: &Arena<Entry<T>>, position: &F, mode: SearchMode) -> Option<Handle>
    where
        F: Fn(&T) -> Ordering,
    {
        let mut below = None;
        let mut cursor = self.min;
        while let Some(id) = cursor {
            let entry = arena.get(id);
            match position(&entry.item) {
                Ordering::Less => {
                    below = Some(id);
                    cursor = entry.right;
                }
                Ordering::Equal => {
                    return match mode {
                        SearchMode::Eq | SearchMode::Le | SearchMode::Ge => Some(id),
                        SearchMode::Lt => below,
                        // Equal inserts collapse, so the next entry is strictly greater.
                        SearchMode::Gt => entry.right,
                    };
                }
                Ordering::Greater => break,
            }
        }
        match mode {
            SearchMode::Le | SearchMode::Lt => below,
            SearchMode::Ge | SearchMode::Gt => cursor,
            SearchMode::Eq => None,
        }
    }

    /// Resolves `mode` against a probe item under `cmp`.
    #[allow(dead_code)]
    pub(crate) fn search<T, C>(
        &self,
        arena: &Arena<Entry<T>>,
        cmp: &C,
        probe: &T,
        mode: SearchMode,
    ) -> Option<Handle>
    where
        C: Fn(&T, &T) -> Ordering,
    {
        self.search_by(arena, &|item| cmp(item, probe), mode)
    }

    /// Inserts an item at its sorted position.
    ///
    /// Returns the entry handle and whether the entry is structurally new.
    /// When the item is equal to an existing entry, the stored item is
    /// replaced (the latest write wins), the entry's duplicate counter is
    /// bumped, and the count is unchanged.
    pub(crate) fn insert<T, C>(&mut self, arena: &mut Arena<Entry<T>>, cmp: &C, item: T) -> (Handle, bool)
    where
        C: Fn(&T, &T) -> Ordering,
    {
        match self.search_by(arena, &|existing| cmp(existing, &item), SearchMode::Le) {
            None => {
                // No predecessor: the item becomes the new minimum.
                let old_min = self.min;
                let id = arena.alloc(Entry::new(item));
                arena.get_mut(id).right = old_min;
                match old_min {
                    Some(m) => arena.get_mut(m).left = Some(id),
                    None => self.max = Some(id),
                }
                self.min = Some(id);
                self.count += 1;
                (id, true)
            }
            Some(pred) => {
                if cmp(&arena.get(pred).item, &item) == Ordering::Equal {
                    let entry = arena.get_mut(pred);
                    entry.item = item;
                    entry.duplicates += 1;
                    return (pred, false);
                }
                // Splice after the predecessor.
                let after = arena.get(pred).right;
                let id = arena.alloc(Entry::new(item));
                let entry = arena.get_mut(id);
                entry.left = Some(pred);
                entry.right = after;
                arena.get_mut(pred).right = Some(id);
                match after {
                    Some(a) => arena.get_mut(a).left = Some(id),
                    None => self.max = Some(id),
                }
                self.count += 1;
                (id, true)
            }
        }
    }

    /// Unlinks the entry equal to the probe and returns it detached,
    /// duplicate counter included. `None` when no entry matches.
    #[allow(dead_code)]
    pub(crate) fn delete<T, C>(&mut self, arena: &mut Arena<Entry<T>>, cmp: &C, probe: &T) -> Option<Entry<T>>
    where
        C: Fn(&T, &T) -> Ordering,
    {
        self.delete_by(arena, &|item| cmp(item, probe))
    }

    /// [`delete`](Self::delete) with the probe expressed as an ordering
    /// function.
    pub(crate) fn delete_by<T, F>(&mut self, arena: &mut Arena<Entry<T>>, position: &F) -> Option<Entry<T>>
    where
        F: Fn(&T) -> Ordering,
    {
        let id = self.search_by(arena, position, SearchMode::Eq)?;
        Some(self.remove(arena, id))
    }

    /// Unlinks a known entry and returns it detached.
    pub(crate) fn remove<T>(&mut self, arena: &mut Arena<Entry<T>>, id: Handle) -> Entry<T> {
        let mut entry = arena.take(id);
        match entry.left {
            Some(l) => arena.get_mut(l).right = entry.right,
            None => self.min = entry.right,
        }
        match entry.right {
            Some(r) => arena.get_mut(r).left = entry.left,
            None => self.max = entry.left,
        }
        entry.left = None;
        entry.right = None;
        self.count -= 1;
        entry
    }

    /// Cuts the list after `index` (0-based from the minimum).
    ///
    /// The list is mutated into the left half and the right half is
    /// returned; `index == count - 1` yields an empty right half. Out of
    /// range indices are a precondition violation.
    pub(crate) fn split_at<T>(&mut self, arena: &mut Arena<Entry<T>>, index: usize) -> TreeResult<SortedList> {
        if index >= self.count {
            return Err(TreeError::PreconditionViolation("split index is out of range"));
        }
        if index == self.count - 1 {
            return Ok(SortedList::new());
        }

        let mut boundary = self.min.expect("non-empty list has a minimum");
        for _ in 0..index {
            boundary = arena.get(boundary).right.expect("chain is as long as the count");
        }
        let first_right = arena.get(boundary).right.expect("interior cut has a successor");

        arena.get_mut(boundary).right = None;
        arena.get_mut(first_right).left = None;

        let right = SortedList {
            min: Some(first_right),
            max: self.max,
            count: self.count - index - 1,
        };
        self.max = Some(boundary);
        self.count = index + 1;
        Ok(right)
    }

    /// Splices another list's entries after this list's maximum.
    pub(crate) fn append<T>(&mut self, arena: &mut Arena<Entry<T>>, other: SortedList) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other;
            return;
        }
        let tail = self.max.expect("non-empty list has a maximum");
        let head = other.min.expect("non-empty list has a minimum");
        arena.get_mut(tail).right = Some(head);
        arena.get_mut(head).left = Some(tail);
        self.max = other.max;
        self.count += other.count;
    }

    /// Splices another list's entries before this list's minimum.
    pub(crate) fn prepend<T>(&mut self, arena: &mut Arena<Entry<T>>, other: SortedList) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other;
            return;
        }
        let head = self.min.expect("non-empty list has a minimum");
        let tail = other.max.expect("non-empty list has a maximum");
        arena.get_mut(tail).right = Some(head);
        arena.get_mut(head).left = Some(tail);
        self.min = other.min;
        self.count += other.count;
    }

    /// Emits every entry inside the closed interval `[start, end]`.
    ///
    /// Unbounded sides run to the list ends. With `expand_duplicates` an
    /// entry is emitted `1 + duplicates` times, otherwise once.
    pub(crate) fn range_collect<T, C, F>(
        &self,
        arena: &Arena<Entry<T>>,
        cmp: &C,
        start: Option<&T>,
        end: Option<&T>,
        expand_duplicates: bool,
        mut emit: F,
    ) where
        C: Fn(&T, &T) -> Ordering,
        F: FnMut(Handle),
    {
        let mut cursor = self.min;
        while let Some(id) = cursor {
            let entry = arena.get(id);
            cursor = entry.right;
            if let Some(s) = start
                && cmp(&entry.item, s) == Ordering::Less
            {
                continue;
            }
            if let Some(e) = end
                && cmp(&entry.item, e) == Ordering::Greater
            {
                break;
            }
            let copies = if expand_duplicates { 1 + entry.duplicates } else { 1 };
            for _ in 0..copies {
                emit(id);
            }
        }
    }

    /// Emits every entry whose item satisfies the predicate, left to right.
    pub(crate) fn find_where<T, P, F>(&self, arena: &Arena<Entry<T>>, predicate: &P, mut emit: F)
    where
        P: Fn(&T) -> bool,
        F: FnMut(Handle),
    {
        let mut cursor = self.min;
        while let Some(id) = cursor {
            let entry = arena.get(id);
            cursor = entry.right;
            if predicate(&entry.item) {
                emit(id);
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    fn int_cmp(a: &i32, b: &i32) -> Ordering {
        a.cmp(b)
    }

    fn build(items: &[i32]) -> (Arena<Entry<i32>>, SortedList) {
        let mut arena = Arena::new();
        let mut list = SortedList::new();
        for &item in items {
            list.insert(&mut arena, &int_cmp, item);
        }
        (arena, list)
    }

    fn collect(arena: &Arena<Entry<i32>>, list: &SortedList) -> Vec<i32> {
        list.iter(arena).map(|id| *arena.get(id).item()).collect()
    }

    #[test]
    fn insert_keeps_items_sorted() {
        let (arena, list) = build(&[5, 1, 4, 2, 3]);
        assert_eq!(collect(&arena, &list), [1, 2, 3, 4, 5]);
        assert_eq!(list.count(), 5);
        assert_eq!(*arena.get(list.min().unwrap()).item(), 1);
        assert_eq!(*arena.get(list.max().unwrap()).item(), 5);
    }

    #[test]
    fn equal_inserts_collapse() {
        let (arena, list) = build(&[7, 7, 7]);
        assert_eq!(list.count(), 1);
        let entry = arena.get(list.min().unwrap());
        assert_eq!(entry.duplicates(), 2);
    }

    #[test]
    fn search_modes() {
        let (arena, list) = build(&[10, 20, 30]);
        let item = |id: Option<Handle>| id.map(|id| *arena.get(id).item());

        // Probe present in the list.
        assert_eq!(item(list.search(&arena, &int_cmp, &20, SearchMode::Eq)), Some(20));
        assert_eq!(item(list.search(&arena, &int_cmp, &20, SearchMode::Le)), Some(20));
        assert_eq!(item(list.search(&arena, &int_cmp, &20, SearchMode::Ge)), Some(20));
        assert_eq!(item(list.search(&arena, &int_cmp, &20, SearchMode::Lt)), Some(10));
        assert_eq!(item(list.search(&arena, &int_cmp, &20, SearchMode::Gt)), Some(30));

        // Probe between entries.
        assert_eq!(item(list.search(&arena, &int_cmp, &25, SearchMode::Eq)), None);
        assert_eq!(item(list.search(&arena, &int_cmp, &25, SearchMode::Le)), Some(20));
        assert_eq!(item(list.search(&arena, &int_cmp, &25, SearchMode::Ge)), Some(30));

        // Probe outside the list.
        assert_eq!(item(list.search(&arena, &int_cmp, &5, SearchMode::Lt)), None);
        assert_eq!(item(list.search(&arena, &int_cmp, &5, SearchMode::Ge)), Some(10));
        assert_eq!(item(list.search(&arena, &int_cmp, &35, SearchMode::Gt)), None);
        assert_eq!(item(list.search(&arena, &int_cmp, &35, SearchMode::Le)), Some(30));
    }

    #[test]
    fn delete_detaches_the_collapsed_entry() {
        let (mut arena, mut list) = build(&[1, 2, 2, 3]);
        assert_eq!(list.count(), 3);

        let removed = list.delete(&mut arena, &int_cmp, &2).unwrap();
        assert_eq!(*removed.item(), 2);
        assert_eq!(removed.duplicates(), 1);
        assert_eq!(list.count(), 2);
        assert_eq!(collect(&arena, &list), [1, 3]);

        assert!(list.delete(&mut arena, &int_cmp, &2).is_none());
    }

    #[test]
    fn delete_updates_endpoints() {
        let (mut arena, mut list) = build(&[1, 2, 3]);
        list.delete(&mut arena, &int_cmp, &1).unwrap();
        assert_eq!(*arena.get(list.min().unwrap()).item(), 2);
        list.delete(&mut arena, &int_cmp, &3).unwrap();
        assert_eq!(*arena.get(list.max().unwrap()).item(), 2);
        list.delete(&mut arena, &int_cmp, &2).unwrap();
        assert!(list.is_empty());
        assert!(list.min().is_none());
        assert!(list.max().is_none());
    }

    #[test]
    fn split_at_interior_cut() {
        let (mut arena, mut list) = build(&[1, 2, 3, 4, 5]);
        let right = list.split_at(&mut arena, 1).unwrap();
        assert_eq!(collect(&arena, &list), [1, 2]);
        assert_eq!(collect(&arena, &right), [3, 4, 5]);
        assert_eq!(list.count(), 2);
        assert_eq!(right.count(), 3);
    }

    #[test]
    fn split_at_last_index_leaves_right_empty() {
        let (mut arena, mut list) = build(&[1, 2, 3]);
        let right = list.split_at(&mut arena, 2).unwrap();
        assert!(right.is_empty());
        assert_eq!(collect(&arena, &list), [1, 2, 3]);
    }

    #[test]
    fn split_at_rejects_out_of_range() {
        let (mut arena, mut list) = build(&[1, 2]);
        assert!(matches!(
            list.split_at(&mut arena, 2),
            Err(TreeError::PreconditionViolation(_))
        ));

        let mut empty = SortedList::new();
        assert!(matches!(
            empty.split_at(&mut arena, 0),
            Err(TreeError::PreconditionViolation(_))
        ));
    }

    #[test]
    fn append_and_prepend_splice() {
        let (mut arena, mut list) = build(&[4, 5]);

        let mut low = SortedList::new();
        for item in [1, 2, 3] {
            low.insert(&mut arena, &int_cmp, item);
        }
        list.prepend(&mut arena, low);
        assert_eq!(collect(&arena, &list), [1, 2, 3, 4, 5]);

        let mut high = SortedList::new();
        for item in [6, 7] {
            high.insert(&mut arena, &int_cmp, item);
        }
        list.append(&mut arena, high);
        assert_eq!(collect(&arena, &list), [1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(list.count(), 7);

        // Empty splices are no-ops.
        list.append(&mut arena, SortedList::new());
        list.prepend(&mut arena, SortedList::new());
        assert_eq!(list.count(), 7);
    }

    #[test]
    fn splits_then_merges_round_trip() {
        let (mut arena, mut list) = build(&[1, 2, 3, 4, 5, 6]);
        let right = list.split_at(&mut arena, 2).unwrap();
        list.append(&mut arena, right);
        assert_eq!(collect(&arena, &list), [1, 2, 3, 4, 5, 6]);
        assert_eq!(*arena.get(list.max().unwrap()).item(), 6);
    }

    #[test]
    fn range_collect_closed_bounds() {
        let (mut arena, mut list) = build(&[10, 20, 30, 40, 50]);
        list.insert(&mut arena, &int_cmp, 30);

        let gather = |start: Option<&i32>, end: Option<&i32>, expand: bool| {
            let mut out = Vec::new();
            list.range_collect(&arena, &int_cmp, start, end, expand, |id| out.push(*arena.get(id).item()));
            out
        };

        assert_eq!(gather(Some(&20), Some(&40), false), [20, 30, 40]);
        assert_eq!(gather(Some(&20), Some(&40), true), [20, 30, 30, 40]);
        // Bounds that fall between entries still close the interval.
        assert_eq!(gather(Some(&15), Some(&35), false), [20, 30]);
        assert_eq!(gather(None, Some(&20), false), [10, 20]);
        assert_eq!(gather(Some(&40), None, false), [40, 50]);
        assert_eq!(gather(None, None, false), [10, 20, 30, 40, 50]);
        assert_eq!(gather(Some(&41), Some(&49), false), []);
    }

    #[test]
    fn find_where_emits_matches_in_order() {
        let (arena, list) = build(&[1, 2, 3, 4, 5, 6]);
        let mut out = Vec::new();
        list.find_where(&arena, &|item: &i32| item % 2 == 0, |id| out.push(*arena.get(id).item()));
        assert_eq!(out, [2, 4, 6]);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(i32),
        Delete(i32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0i32..64).prop_map(Op::Insert),
            1 => (0i32..64).prop_map(Op::Delete),
        ]
    }

    proptest! {
        /// Replays random insert/delete sequences against a sorted-vec
        /// model of (item, duplicates) pairs.
        #[test]
        fn behaves_like_a_sorted_multiset(ops in prop::collection::vec(op_strategy(), 0..300)) {
            let mut arena: Arena<Entry<i32>> = Arena::new();
            let mut list = SortedList::new();
            let mut model: Vec<(i32, usize)> = Vec::new();

            for op in ops {
                match op {
                    Op::Insert(item) => {
                        list.insert(&mut arena, &int_cmp, item);
                        match model.iter_mut().find(|(existing, _)| *existing == item) {
                            Some((_, dups)) => *dups += 1,
                            None => {
                                model.push((item, 0));
                                model.sort_unstable();
                            }
                        }
                    }
                    Op::Delete(item) => {
                        let removed = list.delete(&mut arena, &int_cmp, &item);
                        let position = model.iter().position(|(existing, _)| *existing == item);
                        match (removed, position) {
                            (Some(entry), Some(index)) => {
                                prop_assert_eq!(entry.duplicates(), model[index].1);
                                model.remove(index);
                            }
                            (None, None) => {}
                            _ => prop_assert!(false, "list and model disagree on delete({})", item),
                        }
                    }
                }

                prop_assert_eq!(list.count(), model.len());
                let items: Vec<i32> = list.iter(&arena).map(|id| *arena.get(id).item()).collect();
                let expected: Vec<i32> = model.iter().map(|(item, _)| *item).collect();
                prop_assert_eq!(items, expected);
            }
        }
    }
}
