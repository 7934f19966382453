use core::cmp::Ordering;

use crate::error::{TreeError, TreeResult};

use super::arena::Arena;
use super::handle::Handle;
use super::node::{Cell, Node};
use super::sorted_list::{Entry, SearchMode, SortedList};

/// The core B+ tree backing `WeftTree`.
///
/// Nodes live in one arena, cell-list entries in another; every relation
/// of the structure is a handle into one of the two. The separator
/// convention is the usual B+ tree one: a key less than or equal to a
/// separator belongs to the subtree on the separator's left.
pub(crate) struct RawWeftTree<K, V> {
    pub(super) nodes: Arena<Node>,
    pub(super) cells: Arena<Entry<Cell<K, V>>>,
    pub(super) root: Option<Handle>,
    pub(super) first_leaf: Option<Handle>,
    pub(super) last_leaf: Option<Handle>,
    /// Total element count, duplicates included.
    pub(super) size: u64,
    pub(super) max_node_size: usize,
    pub(super) half_capacity: usize,
}

impl<K, V> RawWeftTree<K, V> {
    pub(crate) fn new(max_node_size: usize) -> TreeResult<Self> {
        if max_node_size < 4 || max_node_size % 2 != 0 {
            return Err(TreeError::PreconditionViolation(
                "max_node_size must be an even number no smaller than 4",
            ));
        }
        Ok(Self {
            nodes: Arena::new(),
            cells: Arena::new(),
            root: None,
            first_leaf: None,
            last_leaf: None,
            size: 0,
            max_node_size,
            half_capacity: max_node_size / 2,
        })
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.cells.clear();
        self.root = None;
        self.first_leaf = None;
        self.last_leaf = None;
        self.size = 0;
    }

    /// The cell stored in a list entry.
    pub(crate) fn cell(&self, entry: Handle) -> &Cell<K, V> {
        self.cells.get(entry).item()
    }

    /// The duplicate count carried by a list entry.
    pub(crate) fn cell_duplicates(&self, entry: Handle) -> usize {
        self.cells.get(entry).duplicates()
    }

    /// Descends from the root to the leaf whose key interval covers `key`.
    ///
    /// A probe equal to a separator descends left of it: separators bound
    /// their left subtree inclusively, so the matching leaf key sits there.
    pub(crate) fn find_leaf<C>(&self, cmp: &C, key: &K) -> Option<Handle>
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let mut current = self.root?;
        loop {
            let node = self.nodes.get(current);
            if node.is_leaf() {
                return Some(current);
            }
            let position = |cell: &Cell<K, V>| cmp(cell.key(), key);
            let next = match node.cells().search_by(&self.cells, &position, SearchMode::Le) {
                None => node.leftmost_child(),
                Some(hit) => {
                    let entry = self.cells.get(hit);
                    if cmp(entry.item().key(), key) == Ordering::Equal {
                        match entry.left() {
                            Some(previous) => self.cells.get(previous).item().right_child(),
                            None => node.leftmost_child(),
                        }
                    } else {
                        entry.item().right_child()
                    }
                }
            };
            current = next.expect("interior node is missing a child link");
        }
    }

    /// Rewrites the parent links of every child referenced by the node's
    /// cells. Call after cells migrate between nodes.
    pub(super) fn reinforce_child_parents(&mut self, node_id: Handle) {
        let mut cursor = self.nodes.get(node_id).cells().min();
        while let Some(entry_id) = cursor {
            let entry = self.cells.get(entry_id);
            let child = entry.item().right_child();
            cursor = entry.right();
            if let Some(child) = child {
                let child_node = self.nodes.get_mut(child);
                child_node.set_parent(Some(node_id));
                child_node.set_parent_cell(Some(entry_id));
            }
        }
    }

    /// Assigns a node's leftmost child and repairs the child's back links.
    fn adopt_leftmost_child(&mut self, node_id: Handle, child: Option<Handle>) {
        self.nodes.get_mut(node_id).set_leftmost_child(child);
        if let Some(child) = child {
            let child_node = self.nodes.get_mut(child);
            child_node.set_parent(Some(node_id));
            child_node.set_parent_cell(None);
        }
    }

    /// The cell at the nearest ancestor that separates a node from its
    /// left chain neighbor.
    ///
    /// The node's own parent cell is that separator unless the node is a
    /// leftmost child; then the walk continues upward (chain neighbors may
    /// be cousins, and their separator sits at the lowest common ancestor).
    /// A node that is leftmost at every level falls back to its parent's
    /// minimum cell.
    fn effective_separator(&self, node_id: Handle) -> TreeResult<Handle> {
        let mut current = node_id;
        loop {
            let node = self.nodes.get(current);
            if let Some(cell) = node.parent_cell() {
                return Ok(cell);
            }
            match node.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        let parent = self
            .nodes
            .get(node_id)
            .parent()
            .ok_or_else(|| TreeError::invariant("rebalanced node has no parent"))?;
        self.nodes
            .get(parent)
            .cells()
            .min()
            .ok_or_else(|| TreeError::invariant("separator fallback found an empty parent"))
    }
}

impl<K: Clone, V> RawWeftTree<K, V> {
    /// Inserts a key with an optional value.
    ///
    /// An insert that collides with an equal key overwrites the stored key
    /// and value and bumps the slot's duplicate counter; the size grows
    /// either way.
    pub(crate) fn insert<C>(&mut self, cmp: &C, key: K, value: Option<V>) -> TreeResult<()>
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let by_key = |a: &Cell<K, V>, b: &Cell<K, V>| cmp(a.key(), b.key());
        match self.root {
            None => {
                let mut cells = SortedList::new();
                cells.insert(&mut self.cells, &by_key, Cell::leaf(key, value));
                let mut leaf = Node::new_leaf();
                leaf.replace_cells(cells);
                let leaf_id = self.nodes.alloc(leaf);
                self.root = Some(leaf_id);
                self.first_leaf = Some(leaf_id);
                self.last_leaf = Some(leaf_id);
            }
            Some(_) => {
                let leaf_id = self.find_leaf(cmp, &key).expect("non-empty tree has leaves");
                self.nodes
                    .get_mut(leaf_id)
                    .cells_mut()
                    .insert(&mut self.cells, &by_key, Cell::leaf(key, value));
                self.balance(cmp, leaf_id)?;
            }
        }
        self.size += 1;
        Ok(())
    }

    /// Removes a key and its whole duplicate multiset.
    pub(crate) fn remove<C>(&mut self, cmp: &C, key: &K) -> TreeResult<Option<(K, Option<V>)>>
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let Some(leaf_id) = self.find_leaf(cmp, key) else {
            return Ok(None);
        };
        let position = |cell: &Cell<K, V>| cmp(cell.key(), key);
        let removed = self
            .nodes
            .get_mut(leaf_id)
            .cells_mut()
            .delete_by(&mut self.cells, &position);
        let Some(entry) = removed else {
            return Ok(None);
        };
        self.size -= 1 + entry.duplicates() as u64;
        self.balance(cmp, leaf_id)?;
        let (key, value, _) = entry.into_item().into_parts();
        Ok(Some((key, value)))
    }

    /// Restores the occupancy invariant from `start` up the parent spine.
    ///
    /// Runs as a loop rather than recursion so deep trees cannot overflow
    /// the stack. Any failure is reported once, wrapped with its cause.
    pub(super) fn balance<C>(&mut self, cmp: &C, start: Handle) -> TreeResult<()>
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let mut current = Some(start);
        while let Some(node_id) = current {
            current = self.balance_step(cmp, node_id).map_err(TreeError::balancing)?;
        }
        Ok(())
    }

    /// Examines one node and applies at most one rebalancing action.
    ///
    /// Returns the next node to examine: splits and merges change the cell
    /// count of a parent, distribution and the terminal cases do not.
    fn balance_step<C>(&mut self, cmp: &C, node_id: Handle) -> TreeResult<Option<Handle>>
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let node = self.nodes.get(node_id);
        let count = node.cells().count();

        if count > self.max_node_size {
            return self.split(cmp, node_id).map(Some);
        }
        if count >= self.half_capacity {
            return Ok(None);
        }

        if node.parent().is_none() {
            // The root may run under half capacity; an interior root with
            // no cells left collapses into its only child.
            if count == 0 && !node.is_leaf() {
                let child = self
                    .nodes
                    .get(node_id)
                    .leftmost_child()
                    .ok_or_else(|| TreeError::invariant("interior root has no children"))?;
                self.nodes.free(node_id);
                let child_node = self.nodes.get_mut(child);
                child_node.set_parent(None);
                child_node.set_parent_cell(None);
                self.root = Some(child);
            }
            return Ok(None);
        }

        // Underfull: prefer the right chain neighbor, and redistribution
        // over merging whenever a neighbor can spare cells.
        let right = node.next();
        let left = node.prev();

        if let Some(source) = right
            && self.nodes.get(source).cells().count() > self.half_capacity
        {
            self.distribute_from_right(cmp, node_id, source)?;
            return Ok(None);
        }
        if let Some(source) = left
            && self.nodes.get(source).cells().count() > self.half_capacity
        {
            self.distribute_from_left(cmp, node_id, source)?;
            return Ok(None);
        }
        if let Some(source) = right {
            return self.merge(cmp, node_id, source).map(Some);
        }
        if let Some(target) = left {
            return self.merge(cmp, target, node_id).map(Some);
        }
        Err(TreeError::PreconditionViolation("underfull node has no chain neighbor"))
    }

    /// Splits an overfull node and pushes a separator into its parent.
    ///
    /// Leaf separators are copied from the left half's maximum key; interior
    /// separators are promoted - the boundary cell leaves the left half and
    /// its child becomes the new right node's leftmost child.
    fn split<C>(&mut self, cmp: &C, node_id: Handle) -> TreeResult<Handle>
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let is_leaf = self.nodes.get(node_id).is_leaf();

        // Splitting the root first grows a fresh interior root above it.
        if self.nodes.get(node_id).parent().is_none() {
            let root_id = self.nodes.alloc(Node::new_interior());
            self.adopt_leftmost_child(root_id, Some(node_id));
            self.root = Some(root_id);
        }
        let parent_id = self.nodes.get(node_id).parent().expect("split node has a parent");

        let cut = if is_leaf { self.half_capacity - 1 } else { self.half_capacity };
        let right_list = self
            .nodes
            .get_mut(node_id)
            .cells_mut()
            .split_at(&mut self.cells, cut)?;

        let (separator_key, adopted_child) = if is_leaf {
            let left_max = self.nodes.get(node_id).cells().max().expect("left half is never empty");
            (self.cells.get(left_max).item().key().clone(), None)
        } else {
            let left_max = self.nodes.get(node_id).cells().max().expect("left half is never empty");
            let boundary = self
                .nodes
                .get_mut(node_id)
                .cells_mut()
                .remove(&mut self.cells, left_max);
            let (key, _, child) = boundary.into_item().into_parts();
            (key, child)
        };

        let mut right_node = if is_leaf { Node::new_leaf() } else { Node::new_interior() };
        right_node.replace_cells(right_list);
        right_node.set_parent(Some(parent_id));
        right_node.set_prev(Some(node_id));
        let old_next = self.nodes.get(node_id).next();
        right_node.set_next(old_next);
        let right_id = self.nodes.alloc(right_node);

        self.nodes.get_mut(node_id).set_next(Some(right_id));
        if let Some(next) = old_next {
            self.nodes.get_mut(next).set_prev(Some(right_id));
        }
        if is_leaf && self.last_leaf == Some(node_id) {
            self.last_leaf = Some(right_id);
        }
        if !is_leaf {
            self.adopt_leftmost_child(right_id, adopted_child);
            self.reinforce_child_parents(right_id);
        }

        let by_key = |a: &Cell<K, V>, b: &Cell<K, V>| cmp(a.key(), b.key());
        let (separator_entry, _) = self.nodes.get_mut(parent_id).cells_mut().insert(
            &mut self.cells,
            &by_key,
            Cell::separator(separator_key, Some(right_id)),
        );
        self.nodes.get_mut(right_id).set_parent_cell(Some(separator_entry));

        Ok(parent_id)
    }

    /// Absorbs `source` (the right member of an adjacent pair) into
    /// `target` and detaches it from its parent.
    ///
    /// Returns the source's parent, which lost a cell and must be examined
    /// next.
    fn merge<C>(&mut self, cmp: &C, target: Handle, source: Handle) -> TreeResult<Handle>
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let separator = self.effective_separator(source)?;
        let is_leaf = self.nodes.get(source).is_leaf();
        let by_key = |a: &Cell<K, V>, b: &Cell<K, V>| cmp(a.key(), b.key());

        if !is_leaf {
            // Bridge the two cell runs: the separator key, over the
            // source's leftmost subtree, slots between target's maximum
            // and source's minimum.
            let separator_key = self.cells.get(separator).item().key().clone();
            let source_leftmost = self.nodes.get(source).leftmost_child();
            self.nodes.get_mut(target).cells_mut().insert(
                &mut self.cells,
                &by_key,
                Cell::separator(separator_key, source_leftmost),
            );
        }

        let source_cells = self.nodes.get_mut(source).take_cells();
        self.nodes.get_mut(target).cells_mut().append(&mut self.cells, source_cells);
        if !is_leaf {
            self.reinforce_child_parents(target);
        }

        let source_next = self.nodes.get(source).next();
        self.nodes.get_mut(target).set_next(source_next);
        if let Some(next) = source_next {
            self.nodes.get_mut(next).set_prev(Some(target));
        }
        if self.last_leaf == Some(source) {
            self.last_leaf = Some(target);
        }

        let parent = self
            .nodes
            .get(source)
            .parent()
            .ok_or_else(|| TreeError::invariant("merge source has no parent"))?;
        match self.nodes.get(source).parent_cell() {
            Some(cell_id) => {
                self.nodes.get_mut(parent).cells_mut().remove(&mut self.cells, cell_id);
            }
            None => {
                // The source was its parent's leftmost child: its slot is
                // taken over by the minimum cell's child, and that cell's
                // key moves up into the separator.
                let min_cell = self
                    .nodes
                    .get(parent)
                    .cells()
                    .min()
                    .ok_or_else(|| TreeError::invariant("merge source's parent has no cells"))?;
                let promoted = self.nodes.get_mut(parent).cells_mut().remove(&mut self.cells, min_cell);
                let (promoted_key, _, promoted_child) = promoted.into_item().into_parts();
                self.adopt_leftmost_child(parent, promoted_child);
                self.cells.get_mut(separator).item_mut().set_key(promoted_key);
            }
        }
        self.nodes.free(source);

        Ok(parent)
    }

    /// Moves cells from an over-provisioned right chain neighbor into an
    /// underfull node, leaving the donor at exactly half capacity.
    fn distribute_from_right<C>(&mut self, cmp: &C, target: Handle, source: Handle) -> TreeResult<()>
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let separator = self.effective_separator(source)?;
        let is_leaf = self.nodes.get(source).is_leaf();
        let source_count = self.nodes.get(source).cells().count();
        let by_key = |a: &Cell<K, V>, b: &Cell<K, V>| cmp(a.key(), b.key());

        // The donor's low end is the portion adjacent to the target.
        let cut = source_count - self.half_capacity - 1;
        let kept = self
            .nodes
            .get_mut(source)
            .cells_mut()
            .split_at(&mut self.cells, cut)?;
        let mut donated = self.nodes.get_mut(source).replace_cells(kept);

        if is_leaf {
            self.nodes.get_mut(target).cells_mut().append(&mut self.cells, donated);
            // The separator follows the target's new maximum key.
            let new_max = self.nodes.get(target).cells().max().expect("target received cells");
            let new_key = self.cells.get(new_max).item().key().clone();
            self.cells.get_mut(separator).item_mut().set_key(new_key);
        } else {
            // The donated run's maximum is promoted: its key replaces the
            // separator and its child becomes the donor's new leftmost
            // child. The old separator key bridges onto the donor's old
            // leftmost subtree.
            let separator_key = self.cells.get(separator).item().key().clone();
            let source_leftmost = self.nodes.get(source).leftmost_child();
            let boundary_id = donated.max().expect("donated run is never empty");
            let boundary = donated.remove(&mut self.cells, boundary_id);
            let (replacement_key, _, boundary_child) = boundary.into_item().into_parts();

            self.nodes.get_mut(target).cells_mut().insert(
                &mut self.cells,
                &by_key,
                Cell::separator(separator_key, source_leftmost),
            );
            self.nodes.get_mut(target).cells_mut().append(&mut self.cells, donated);
            self.reinforce_child_parents(target);
            self.adopt_leftmost_child(source, boundary_child);
            self.cells.get_mut(separator).item_mut().set_key(replacement_key);
        }
        Ok(())
    }

    /// Mirror of [`distribute_from_right`](Self::distribute_from_right)
    /// for a left chain neighbor donating its high end.
    fn distribute_from_left<C>(&mut self, cmp: &C, target: Handle, source: Handle) -> TreeResult<()>
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let separator = self.effective_separator(target)?;
        let is_leaf = self.nodes.get(source).is_leaf();
        let by_key = |a: &Cell<K, V>, b: &Cell<K, V>| cmp(a.key(), b.key());

        if is_leaf {
            let cut = self.half_capacity - 1;
            let donated = self
                .nodes
                .get_mut(source)
                .cells_mut()
                .split_at(&mut self.cells, cut)?;
            self.nodes.get_mut(target).cells_mut().prepend(&mut self.cells, donated);
            // The separator follows the donor's new maximum key.
            let new_max = self.nodes.get(source).cells().max().expect("donor keeps half its cells");
            let new_key = self.cells.get(new_max).item().key().clone();
            self.cells.get_mut(separator).item_mut().set_key(new_key);
        } else {
            let cut = self.half_capacity;
            let donated = self
                .nodes
                .get_mut(source)
                .cells_mut()
                .split_at(&mut self.cells, cut)?;
            // The donor's new maximum is promoted: its key replaces the
            // separator and its child becomes the target's new leftmost
            // child. The old separator key bridges onto the target's old
            // leftmost subtree.
            let separator_key = self.cells.get(separator).item().key().clone();
            let target_leftmost = self.nodes.get(target).leftmost_child();
            let boundary_id = self.nodes.get(source).cells().max().expect("donor keeps cells");
            let boundary = self
                .nodes
                .get_mut(source)
                .cells_mut()
                .remove(&mut self.cells, boundary_id);
            let (replacement_key, _, boundary_child) = boundary.into_item().into_parts();

            self.nodes.get_mut(target).cells_mut().insert(
                &mut self.cells,
                &by_key,
                Cell::separator(separator_key, target_leftmost),
            );
            self.nodes.get_mut(target).cells_mut().prepend(&mut self.cells, donated);
            self.reinforce_child_parents(target);
            self.adopt_leftmost_child(target, boundary_child);
            self.cells.get_mut(separator).item_mut().set_key(replacement_key);
        }
        Ok(())
    }
}
