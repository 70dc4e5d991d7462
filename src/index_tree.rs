//! Location-addressed tree model that mirrors its visible nodes into a flat
//! `SequenceSink`.
//!
//! Every node caches `visible_count`, the number of rows its subtree occupies
//! in the sink. A node's row index is found by descending from the root and
//! adding up the counts of the preceding siblings at each level, so mutations
//! only touch the spliced range and its ancestor chain.

use serde::Deserialize;
use tracing::{debug, trace};

use crate::arena::{NodeArena, NodeId, NodeRef, TreeNode};
use crate::element::{NodeElement, TreeItem, TreeRow};
use crate::error::{Result, TreeError};
use crate::sink::SequenceSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    pub collapse_by_default: bool,
    pub auto_expand_single_children: bool,
}

/// A node whose collapsed or collapsible flag changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapseStateChange {
    pub location: Vec<usize>,
    pub collapsed: bool,
    /// Set for descendants reached through a recursive update.
    pub deep: bool,
}

type CollapseListener = Box<dyn FnMut(&CollapseStateChange)>;

#[derive(Debug, Clone, Copy)]
enum CollapseUpdate {
    Collapsed { collapsed: bool, recursive: bool },
    Collapsible(bool),
}

struct ParentPosition {
    parent: NodeId,
    list_index: usize,
    revealed: bool,
}

struct NodePosition {
    node: NodeId,
    list_index: Option<usize>,
}

pub struct IndexTreeModel<T, S> {
    arena: NodeArena<T>,
    sink: S,
    options: ModelOptions,
    listeners: Vec<CollapseListener>,
}

impl<T: Clone, S: SequenceSink<T>> IndexTreeModel<T, S> {
    pub fn new(sink: S, options: ModelOptions) -> Self {
        Self {
            arena: NodeArena::new(),
            sink,
            options,
            listeners: Vec::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn options(&self) -> ModelOptions {
        self.options
    }

    /// Number of nodes in the tree, not counting the root sentinel.
    pub fn size(&self) -> usize {
        self.arena.len()
    }

    /// Number of rows currently mirrored into the sink.
    pub fn visible_len(&self) -> usize {
        self.arena.get(NodeId::ROOT).visible_count
    }

    pub fn on_did_change_collapse_state(
        &mut self,
        listener: impl FnMut(&CollapseStateChange) + 'static,
    ) {
        self.listeners.push(Box::new(listener));
    }

    /// Replaces `delete_count` children of the node addressed by all but the
    /// last index of `location`, starting at the last index, with `to_insert`.
    ///
    /// Returns the removed subtrees.
    pub fn splice(
        &mut self,
        location: &[usize],
        delete_count: usize,
        to_insert: impl IntoIterator<Item = TreeItem<T>>,
    ) -> Result<Vec<TreeItem<T>>> {
        let Some((&start, parent_location)) = location.split_last() else {
            return Err(TreeError::location(location));
        };
        let position = self.parent_position(location)?;
        let parent_depth = self.arena.get(position.parent).depth;

        let mut rows = Vec::new();
        let mut inserted = Vec::new();
        for item in to_insert {
            let id = self.create_node(
                item,
                position.parent,
                parent_depth + 1,
                position.revealed,
                &mut rows,
            );
            inserted.push(id);
        }
        let inserted_count: usize = inserted
            .iter()
            .map(|id| self.arena.get(*id).visible_count)
            .sum();

        let parent = self.arena.get_mut(position.parent);
        let had_children = !parent.children.is_empty();
        let end = start.saturating_add(delete_count).min(parent.children.len());
        let removed: Vec<NodeId> = parent.children.splice(start..end, inserted).collect();
        let has_children = !parent.children.is_empty();

        let removed_count: usize = removed
            .iter()
            .map(|id| self.arena.get(*id).visible_count)
            .sum();
        let deleted = removed
            .into_iter()
            .filter_map(|id| self.remove_subtree(id))
            .collect();

        if position.revealed {
            self.adjust_ancestor_counts(
                Some(position.parent),
                inserted_count as isize - removed_count as isize,
            );
            trace!(
                index = position.list_index,
                removed = removed_count,
                inserted = rows.len(),
                "forwarding splice"
            );
            self.sink.splice(position.list_index, removed_count, rows);
        }

        if had_children != has_children && position.parent != NodeId::ROOT {
            self.apply_collapse_update(parent_location, CollapseUpdate::Collapsible(has_children))?;
        }

        Ok(deleted)
    }

    /// Replaces every child of the node at `location`.
    pub fn set_children(
        &mut self,
        location: &[usize],
        children: impl IntoIterator<Item = TreeItem<T>>,
    ) -> Result<Vec<TreeItem<T>>> {
        let mut target = location.to_vec();
        target.push(0);
        self.splice(&target, usize::MAX, children)
    }

    /// Sets (or toggles, when `collapsed` is `None`) the collapsed flag.
    ///
    /// Returns whether any node changed. Nodes that are not collapsible are
    /// left untouched.
    pub fn set_collapsed(
        &mut self,
        location: &[usize],
        collapsed: Option<bool>,
        recursive: bool,
    ) -> Result<bool> {
        let position = self.node_position(location)?;
        let collapsed = collapsed.unwrap_or(!self.arena.get(position.node).collapsed);
        let changed = self.apply_collapse_update(
            location,
            CollapseUpdate::Collapsed {
                collapsed,
                recursive,
            },
        )?;

        if changed && !collapsed && !recursive && self.options.auto_expand_single_children {
            self.auto_expand_single_child(location)?;
        }
        Ok(changed)
    }

    /// Sets (or toggles) the collapsible flag. A node with children stays
    /// collapsible.
    pub fn set_collapsible(
        &mut self,
        location: &[usize],
        collapsible: Option<bool>,
    ) -> Result<bool> {
        let position = self.node_position(location)?;
        let collapsible = collapsible.unwrap_or(!self.arena.get(position.node).collapsible);
        self.apply_collapse_update(location, CollapseUpdate::Collapsible(collapsible))
    }

    /// Expands every collapsed ancestor of `location`.
    pub fn expand_to(&mut self, location: &[usize]) -> Result<()> {
        self.node_position(location)?;
        for depth in 1..location.len() {
            let ancestor = &location[..depth];
            if self.is_collapsed(ancestor)? {
                self.set_collapsed(ancestor, Some(false), false)?;
            }
        }
        Ok(())
    }

    /// Re-issues the row at `location` if it is visible.
    pub fn rerender(&mut self, location: &[usize]) -> Result<()> {
        let position = self.node_position(location)?;
        if let (Some(index), true) = (position.list_index, self.arena.get(position.node).visible) {
            if let Some(row) = self.arena.row(position.node) {
                self.sink.rerender(index, row);
            }
        }
        Ok(())
    }

    pub fn has_node(&self, location: &[usize]) -> bool {
        self.node_position(location).is_ok()
    }

    pub fn get_node(&self, location: &[usize]) -> Result<NodeRef<'_, T>> {
        let position = self.node_position(location)?;
        Ok(self.arena.node_ref(position.node))
    }

    /// Looks a node up by id; `None` once the node has been removed.
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_, T>> {
        self.arena.contains(id).then(|| self.arena.node_ref(id))
    }

    pub fn get_node_location(&self, node: NodeRef<'_, T>) -> Vec<usize> {
        self.arena.location_of(node.id())
    }

    /// Row index of the node at `location`, or `None` while it is hidden.
    pub fn get_node_list_index(&self, location: &[usize]) -> Result<Option<usize>> {
        let position = self.node_position(location)?;
        if !self.arena.get(position.node).visible {
            return Ok(None);
        }
        Ok(position.list_index)
    }

    pub fn is_collapsible(&self, location: &[usize]) -> bool {
        self.node_position(location)
            .map(|position| self.arena.get(position.node).collapsible)
            .unwrap_or(false)
    }

    pub fn is_collapsed(&self, location: &[usize]) -> Result<bool> {
        let position = self.node_position(location)?;
        Ok(self.arena.get(position.node).collapsed)
    }

    pub fn get_parent_node_location(&self, location: &[usize]) -> Result<Option<Vec<usize>>> {
        self.node_position(location)?;
        Ok(location.split_last().map(|(_, parent)| parent.to_vec()))
    }

    pub fn get_first_element_child(&self, location: &[usize]) -> Result<Option<&T>> {
        let position = self.node_position(location)?;
        Ok(self
            .arena
            .get(position.node)
            .children
            .first()
            .and_then(|child| self.arena.get(*child).element.item()))
    }

    /// Deepest last visible descendant of the node at `location`, or the node
    /// itself when nothing below it is visible.
    pub fn get_last_element_ancestor(&self, location: &[usize]) -> Result<Option<&T>> {
        let position = self.node_position(location)?;
        let mut current = position.node;
        loop {
            let node = self.arena.get(current);
            let last_visible = node
                .children
                .iter()
                .rev()
                .find(|child| self.arena.get(**child).visible);
            match last_visible {
                Some(child) if !node.hides_children() => current = *child,
                _ => return Ok(node.element.item()),
            }
        }
    }

    /// Visits every descendant of `location` in pre-order, hidden ones
    /// included. The node at `location` itself is not visited.
    pub fn visit_descendants(
        &self,
        location: &[usize],
        mut visit: impl FnMut(NodeRef<'_, T>),
    ) -> Result<()> {
        let position = self.node_position(location)?;
        let mut stack: Vec<NodeId> = self
            .arena
            .get(position.node)
            .children
            .iter()
            .rev()
            .copied()
            .collect();
        while let Some(id) = stack.pop() {
            visit(self.arena.node_ref(id));
            stack.extend(self.arena.get(id).children.iter().rev().copied());
        }
        Ok(())
    }

    /// Elements of the visible nodes in row order.
    pub fn visible_elements(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.visible_len());
        let mut stack: Vec<NodeId> = self
            .arena
            .get(NodeId::ROOT)
            .children
            .iter()
            .rev()
            .copied()
            .collect();
        while let Some(id) = stack.pop() {
            let node = self.arena.get(id);
            if !node.visible {
                continue;
            }
            out.extend(node.element.item());
            if !node.hides_children() {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn parent_position(&self, location: &[usize]) -> Result<ParentPosition> {
        let Some((&last, path)) = location.split_last() else {
            return Err(TreeError::location(location));
        };
        let mut current = NodeId::ROOT;
        let mut list_index = 0;
        let mut revealed = true;

        for &index in path {
            let node = self.arena.get(current);
            let Some(&child) = node.children.get(index) else {
                return Err(TreeError::location(location));
            };
            list_index += self.preceding_rows(node, index);
            revealed = revealed && !node.hides_children();
            current = child;
            list_index += 1;
        }

        let parent = self.arena.get(current);
        if last > parent.children.len() {
            return Err(TreeError::location(location));
        }
        list_index += self.preceding_rows(parent, last);
        // Inserting children makes the parent collapsible, so a collapsed
        // leaf hides them as well.
        revealed = revealed && parent.visible && !parent.collapsed;

        Ok(ParentPosition {
            parent: current,
            list_index,
            revealed,
        })
    }

    fn node_position(&self, location: &[usize]) -> Result<NodePosition> {
        if location.is_empty() {
            return Ok(NodePosition {
                node: NodeId::ROOT,
                list_index: None,
            });
        }
        let position = self.parent_position(location)?;
        let index = location[location.len() - 1];
        let Some(&node) = self.arena.get(position.parent).children.get(index) else {
            return Err(TreeError::location(location));
        };
        Ok(NodePosition {
            node,
            list_index: Some(position.list_index),
        })
    }

    fn preceding_rows(&self, node: &TreeNode<T>, index: usize) -> usize {
        node.children[..index]
            .iter()
            .map(|child| self.arena.get(*child).visible_count)
            .sum()
    }

    fn create_node(
        &mut self,
        item: TreeItem<T>,
        parent: NodeId,
        depth: usize,
        revealed: bool,
        rows: &mut Vec<TreeRow<T>>,
    ) -> NodeId {
        let TreeItem {
            element,
            collapsible,
            collapsed,
            children,
        } = item;
        let collapsible = collapsible.unwrap_or(collapsed.is_some()) || !children.is_empty();
        let collapsed = collapsed.unwrap_or(self.options.collapse_by_default);

        let id = self.arena.insert(TreeNode {
            element: NodeElement::Item(element),
            parent: Some(parent),
            children: Vec::with_capacity(children.len()),
            depth,
            visible: revealed,
            collapsible,
            collapsed,
            visible_count: 0,
        });
        if revealed {
            rows.extend(self.arena.row(id));
        }

        let children_revealed = revealed && !(collapsed && collapsible);
        let mut children_count = 0;
        for child in children {
            let child_id = self.create_node(child, id, depth + 1, children_revealed, rows);
            children_count += self.arena.get(child_id).visible_count;
            self.arena.get_mut(id).children.push(child_id);
        }

        let node = self.arena.get_mut(id);
        node.visible_count = match (revealed, node.hides_children()) {
            (false, _) => 0,
            (true, true) => 1,
            (true, false) => 1 + children_count,
        };
        id
    }

    fn remove_subtree(&mut self, id: NodeId) -> Option<TreeItem<T>> {
        let node = self.arena.remove(id);
        let children = node
            .children
            .into_iter()
            .filter_map(|child| self.remove_subtree(child))
            .collect();
        match node.element {
            NodeElement::Root => None,
            NodeElement::Item(element) => Some(TreeItem {
                element,
                collapsible: Some(node.collapsible),
                collapsed: Some(node.collapsed),
                children,
            }),
        }
    }

    fn adjust_ancestor_counts(&mut self, from: Option<NodeId>, delta: isize) {
        if delta == 0 {
            return;
        }
        let mut current = from;
        while let Some(id) = current {
            let node = self.arena.get_mut(id);
            node.visible_count = node
                .visible_count
                .checked_add_signed(delta)
                .unwrap_or_else(|| panic!("visible count underflow at {id:?}"));
            current = node.parent;
        }
    }

    fn apply_collapse_update(
        &mut self,
        location: &[usize],
        update: CollapseUpdate,
    ) -> Result<bool> {
        let position = self.node_position(location)?;
        let mut changed_nodes = Vec::new();
        let changed = self.update_collapse_flags(position.node, update, &mut changed_nodes);

        let node = self.arena.get(position.node);
        if changed && node.visible {
            match update {
                CollapseUpdate::Collapsed { .. } => {
                    self.refresh_visibility(position.node, position.list_index);
                }
                CollapseUpdate::Collapsible(_) => {
                    let row = self.arena.row(position.node);
                    if let (Some(index), Some(row)) = (position.list_index, row) {
                        self.sink.rerender(index, row);
                    }
                }
            }
        }

        if changed {
            debug!(?location, ?update, nodes = changed_nodes.len(), "collapse state changed");
            self.notify_collapse_changes(&changed_nodes);
        }
        Ok(changed)
    }

    /// Writes the new flags on `root` (and its subtree when recursive) and
    /// collects every node that actually changed.
    fn update_collapse_flags(
        &mut self,
        root: NodeId,
        update: CollapseUpdate,
        changed_nodes: &mut Vec<(NodeId, bool)>,
    ) -> bool {
        let mut changed = false;
        let mut stack = vec![(root, false)];
        while let Some((id, deep)) = stack.pop() {
            let node = self.arena.get_mut(id);
            if id != NodeId::ROOT {
                let node_changed = match update {
                    CollapseUpdate::Collapsible(collapsible) => {
                        let collapsible = collapsible || !node.children.is_empty();
                        let node_changed = node.collapsible != collapsible;
                        node.collapsible = collapsible;
                        node_changed
                    }
                    CollapseUpdate::Collapsed { collapsed, .. } if node.collapsible => {
                        let node_changed = node.collapsed != collapsed;
                        node.collapsed = collapsed;
                        node_changed
                    }
                    CollapseUpdate::Collapsed { .. } => false,
                };
                if node_changed {
                    changed_nodes.push((id, deep));
                    changed = true;
                }
            }
            if let CollapseUpdate::Collapsed { recursive: true, .. } = update {
                stack.extend(node.children.iter().rev().map(|child| (*child, true)));
            }
        }
        changed
    }

    /// Recomputes `visible` and `visible_count` below a visible node whose
    /// collapse state changed, then forwards the row delta to the sink.
    fn refresh_visibility(&mut self, id: NodeId, list_index: Option<usize>) {
        let previous = self.arena.get(id).visible_count;

        let mut order = Vec::new();
        let mut stack = vec![(id, true)];
        while let Some((current, revealed)) = stack.pop() {
            let node = self.arena.get_mut(current);
            let was_visible = node.visible;
            node.visible = revealed;
            if !revealed {
                node.visible_count = 0;
                if was_visible {
                    stack.extend(node.children.iter().map(|child| (*child, false)));
                }
                continue;
            }
            order.push(current);
            let children_revealed = !node.hides_children();
            stack.extend(node.children.iter().rev().map(|child| (*child, children_revealed)));
        }

        for &current in order.iter().rev() {
            let node = self.arena.get(current);
            let count = if node.hides_children() {
                1
            } else {
                let own = usize::from(current != NodeId::ROOT);
                own + node
                    .children
                    .iter()
                    .map(|child| self.arena.get(*child).visible_count)
                    .sum::<usize>()
            };
            self.arena.get_mut(current).visible_count = count;
        }

        let current = self.arena.get(id).visible_count;
        let parent = self.arena.get(id).parent;
        self.adjust_ancestor_counts(parent, current as isize - previous as isize);

        let rows: Vec<TreeRow<T>> = order
            .iter()
            .filter(|node| **node != id)
            .filter_map(|node| self.arena.row(*node))
            .collect();
        match list_index {
            Some(index) => {
                trace!(
                    index = index + 1,
                    removed = previous - 1,
                    inserted = rows.len(),
                    "forwarding collapse splice"
                );
                self.sink.splice(index + 1, previous - 1, rows);
                if let Some(row) = self.arena.row(id) {
                    self.sink.rerender(index, row);
                }
            }
            None => {
                trace!(removed = previous, inserted = rows.len(), "forwarding root splice");
                self.sink.splice(0, previous, rows);
            }
        }
    }

    fn auto_expand_single_child(&mut self, location: &[usize]) -> Result<()> {
        let mut location = location.to_vec();
        loop {
            let node = self.arena.get(self.node_position(&location)?.node);
            if node.children.len() != 1 {
                return Ok(());
            }
            location.push(0);
            let child = self.arena.get(node.children[0]);
            if !child.collapsible || !child.collapsed {
                return Ok(());
            }
            self.apply_collapse_update(
                &location,
                CollapseUpdate::Collapsed {
                    collapsed: false,
                    recursive: false,
                },
            )?;
        }
    }

    fn notify_collapse_changes(&mut self, changed_nodes: &[(NodeId, bool)]) {
        if self.listeners.is_empty() {
            return;
        }
        for &(id, deep) in changed_nodes {
            let change = CollapseStateChange {
                location: self.arena.location_of(id),
                collapsed: self.arena.get(id).collapsed,
                deep,
            };
            for listener in &mut self.listeners {
                listener(&change);
            }
        }
    }
}
