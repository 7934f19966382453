use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::error::TreeResult;
use crate::raw::{RawWeftTree, SearchMode};

/// An ordered key-value index over a caller-supplied comparator.
///
/// `WeftTree` keeps its keys in the order defined by the comparator given
/// at construction, not by an `Ord` bound, so the same key type can be
/// indexed under different orders (case folding, reversed, by a projected
/// field). Values are optional: a tree of bare keys behaves as a counted
/// multiset.
///
/// Inserting a key equal to a stored one does not add a slot: the stored
/// key and value are overwritten - the latest write wins on lookup - and a
/// duplicate counter tracks the multiplicity. [`len`](Self::len) counts
/// every insert; [`remove`](Self::remove) drops a key with its whole
/// multiplicity.
///
/// # Examples
///
/// ```
/// use weft_tree::{SearchMode, WeftTree};
///
/// let mut tree = WeftTree::new(4, |a: &u32, b: &u32| a.cmp(b)).unwrap();
/// for (key, name) in [(3, "three"), (1, "one"), (4, "four"), (1, "uno"), (5, "five")] {
///     tree.insert(key, Some(name)).unwrap();
/// }
///
/// // 1 was written twice: one slot, the latest value, counted twice.
/// assert_eq!(tree.len(), 5);
/// assert_eq!(tree.get(&1), Some(&"uno"));
///
/// // Mode-based lookup resolves near-misses.
/// assert_eq!(tree.lookup(&2, SearchMode::Ge), Some((&3, Some(&"three"))));
///
/// // Ordered, paginated iteration.
/// let keys = tree.range_keys(Some(&1), Some(&4), 1, None);
/// assert_eq!(keys, [&1, &3, &4]);
/// ```
///
/// The tree is exclusively owned and single-threaded; operations never
/// block and run to completion. A comparator must be a total order over
/// all keys ever inserted - an inconsistent comparator leads to missed
/// lookups or balancing errors, though never to memory unsafety.
pub struct WeftTree<K, V, C> {
    raw: RawWeftTree<K, V>,
    cmp: C,
}

impl<K, V, C> WeftTree<K, V, C>
where
    C: Fn(&K, &K) -> Ordering,
{
    /// Creates an empty tree.
    ///
    /// `max_node_size` bounds the cells per node and must be an even
    /// number no smaller than 4; non-root nodes always stay at least half
    /// full.
    ///
    /// # Errors
    ///
    /// [`TreeError::PreconditionViolation`](crate::TreeError::PreconditionViolation)
    /// when `max_node_size` is odd or below 4.
    pub fn new(max_node_size: usize, cmp: C) -> TreeResult<Self> {
        Ok(Self {
            raw: RawWeftTree::new(max_node_size)?,
            cmp,
        })
    }

    /// Total element count, duplicates included.
    pub fn len(&self) -> u64 {
        self.raw.size()
    }

    /// Whether the tree holds no elements.
    pub fn is_empty(&self) -> bool {
        self.raw.size() == 0
    }

    /// Drops every element.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Returns the value stored under a key, if any.
    ///
    /// A key stored without a value yields `None`, exactly like a missing
    /// key; use [`lookup`](Self::lookup) to distinguish the two.
    pub fn get(&self, key: &K) -> Option<&V> {
        let entry = self.raw.lookup(&self.cmp, key, SearchMode::Eq)?;
        self.raw.cell(entry).value()
    }

    /// Whether the tree contains a key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.raw.lookup(&self.cmp, key, SearchMode::Eq).is_some()
    }

    /// How many times a key was inserted: zero when absent, otherwise one
    /// plus its duplicate count.
    pub fn multiplicity(&self, key: &K) -> u64 {
        match self.raw.lookup(&self.cmp, key, SearchMode::Eq) {
            Some(entry) => 1 + self.raw.cell_duplicates(entry) as u64,
            None => 0,
        }
    }

    /// Resolves a search mode against a key, returning the matched entry.
    ///
    /// `Eq` finds the key itself; `Le`/`Ge` settle for the nearest key on
    /// the given side when the exact key is absent; `Lt`/`Gt` always step
    /// past an exact match. The match may live in a neighboring leaf; the
    /// walk follows the leaf chain as far as needed.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_tree::{SearchMode, WeftTree};
    ///
    /// let mut tree = WeftTree::new(4, |a: &i32, b: &i32| a.cmp(b)).unwrap();
    /// for key in [10, 20, 30] {
    ///     tree.insert(key, Some(key * 10)).unwrap();
    /// }
    ///
    /// assert_eq!(tree.lookup(&20, SearchMode::Lt), Some((&10, Some(&100))));
    /// assert_eq!(tree.lookup(&25, SearchMode::Ge), Some((&30, Some(&300))));
    /// assert_eq!(tree.lookup(&30, SearchMode::Gt), None);
    /// ```
    pub fn lookup(&self, key: &K, mode: SearchMode) -> Option<(&K, Option<&V>)> {
        let entry = self.raw.lookup(&self.cmp, key, mode)?;
        let cell = self.raw.cell(entry);
        Some((cell.key(), cell.value()))
    }

    /// Emits every key satisfying a predicate, in ascending order.
    ///
    /// With a `bookmark` the scan resumes behind an earlier one: it starts
    /// at the leaf holding the bookmark key and drops exactly one match,
    /// the bookmark itself. `limit` caps the result (`None` is unbounded).
    pub fn find<P>(&self, predicate: P, bookmark: Option<&K>, limit: Option<usize>) -> Vec<&K>
    where
        P: Fn(&K) -> bool,
    {
        self.raw
            .scan_where(&self.cmp, &predicate, bookmark, limit)
            .into_iter()
            .map(|entry| self.raw.cell(entry).key())
            .collect()
    }

    /// [`find`](Self::find), returning key-value pairs.
    pub fn find_entries<P>(&self, predicate: P, bookmark: Option<&K>, limit: Option<usize>) -> Vec<(&K, Option<&V>)>
    where
        P: Fn(&K) -> bool,
    {
        self.raw
            .scan_where(&self.cmp, &predicate, bookmark, limit)
            .into_iter()
            .map(|entry| {
                let cell = self.raw.cell(entry);
                (cell.key(), cell.value())
            })
            .collect()
    }

    /// The key in the middle of the tree: position `(len - 1) / 2` of the
    /// ascending sequence, duplicates counted. `None` on an empty tree.
    pub fn median_key(&self) -> Option<&K> {
        let entry = self.raw.median_entry()?;
        Some(self.raw.cell(entry).key())
    }
}

impl<K, V, C> WeftTree<K, V, C>
where
    K: Clone,
    C: Fn(&K, &K) -> Ordering,
{
    /// Inserts a key with an optional value.
    ///
    /// An equal key already present is overwritten in place (key and
    /// value) and its duplicate counter grows; [`len`](Self::len) grows
    /// either way.
    ///
    /// # Errors
    ///
    /// [`TreeError::Balance`](crate::TreeError::Balance) if rebalancing
    /// fails; the tree must not be used afterwards.
    pub fn insert(&mut self, key: K, value: Option<V>) -> TreeResult<()> {
        self.raw.insert(&self.cmp, key, value)
    }

    /// Removes a key together with its whole duplicate multiplicity and
    /// returns the stored pair, or `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// [`TreeError::Balance`](crate::TreeError::Balance) if rebalancing
    /// fails; the tree must not be used afterwards.
    pub fn remove(&mut self, key: &K) -> TreeResult<Option<(K, Option<V>)>> {
        self.raw.remove(&self.cmp, key)
    }

    /// Collects the key-value pairs inside the closed interval
    /// `[start, end]` in ascending order.
    ///
    /// Absent bounds run to the tree's ends; bounds need not be present
    /// in the tree. Duplicates are emitted once per insert. Pagination
    /// applies after bound filtering: `offset` entries are skipped, then
    /// up to `limit` are returned (`None` is unbounded).
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_tree::WeftTree;
    ///
    /// let mut tree = WeftTree::new(4, |a: &i32, b: &i32| a.cmp(b)).unwrap();
    /// for key in (10..=100).step_by(10) {
    ///     tree.insert(key, Some(key / 10)).unwrap();
    /// }
    ///
    /// let page: Vec<_> = tree.range(Some(&35), Some(&75), 1, Some(2));
    /// assert_eq!(page, [(&50, Some(&5)), (&60, Some(&6))]);
    /// ```
    pub fn range(
        &self,
        start: Option<&K>,
        end: Option<&K>,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<(&K, Option<&V>)> {
        self.raw
            .range_entries(&self.cmp, start, end, offset, limit)
            .into_iter()
            .map(|entry| {
                let cell = self.raw.cell(entry);
                (cell.key(), cell.value())
            })
            .collect()
    }

    /// [`range`](Self::range), keys only.
    pub fn range_keys(&self, start: Option<&K>, end: Option<&K>, offset: usize, limit: Option<usize>) -> Vec<&K> {
        self.raw
            .range_entries(&self.cmp, start, end, offset, limit)
            .into_iter()
            .map(|entry| self.raw.cell(entry).key())
            .collect()
    }

    /// [`range`](Self::range), values only; keys stored without a value
    /// contribute a `None`.
    pub fn range_values(
        &self,
        start: Option<&K>,
        end: Option<&K>,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<Option<&V>> {
        self.raw
            .range_entries(&self.cmp, start, end, offset, limit)
            .into_iter()
            .map(|entry| self.raw.cell(entry).value())
            .collect()
    }
}
