use std::fmt;

use crate::element::{NodeElement, TreeRow};

/// Handle of a node inside a `NodeArena`.
///
/// Ids of removed nodes are recycled, so a handle is only meaningful while the
/// node it was obtained for is still in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug)]
pub(crate) struct TreeNode<T> {
    pub(crate) element: NodeElement<T>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) depth: usize,
    pub(crate) visible: bool,
    pub(crate) collapsible: bool,
    pub(crate) collapsed: bool,
    pub(crate) visible_count: usize,
}

impl<T> TreeNode<T> {
    pub(crate) fn hides_children(&self) -> bool {
        self.collapsed && self.collapsible
    }
}

/// Owning storage for every node of one tree.
///
/// Children are owned through their parent's `children` list; `parent` is a
/// plain back-reference used for upward walks only.
#[derive(Debug)]
pub struct NodeArena<T> {
    slots: Vec<Option<TreeNode<T>>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> NodeArena<T> {
    pub(crate) fn new() -> Self {
        let root = TreeNode {
            element: NodeElement::Root,
            parent: None,
            children: Vec::new(),
            depth: 0,
            visible: true,
            collapsible: false,
            collapsed: false,
            visible_count: 0,
        };
        Self {
            slots: vec![Some(root)],
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live nodes, not counting the root sentinel.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn insert(&mut self, node: TreeNode<T>) -> NodeId {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(node);
            return NodeId(slot);
        }
        self.slots.push(Some(node));
        NodeId(self.slots.len() - 1)
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> TreeNode<T> {
        assert_ne!(id, NodeId::ROOT, "the root sentinel is never removed");
        let node = match self.slots.get_mut(id.0).and_then(Option::take) {
            Some(node) => node,
            None => panic!("removing stale tree node {id:?}"),
        };
        self.free.push(id.0);
        self.len -= 1;
        node
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    pub(crate) fn get(&self, id: NodeId) -> &TreeNode<T> {
        match self.slots.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("stale tree node {id:?}"),
        }
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut TreeNode<T> {
        match self.slots.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("stale tree node {id:?}"),
        }
    }

    /// Structural location of `id`, found by walking parent links and
    /// searching each parent's children.
    pub(crate) fn location_of(&self, id: NodeId) -> Vec<usize> {
        let mut location = Vec::new();
        let mut current = id;
        while let Some(parent) = self.get(current).parent {
            let index = self
                .get(parent)
                .children
                .iter()
                .position(|child| *child == current)
                .unwrap_or_else(|| panic!("{current:?} missing from its parent's children"));
            location.push(index);
            current = parent;
        }
        location.reverse();
        location
    }

    pub(crate) fn row(&self, id: NodeId) -> Option<TreeRow<T>>
    where
        T: Clone,
    {
        let node = self.get(id);
        node.element.item().map(|element| TreeRow {
            element: element.clone(),
            depth: node.depth,
            collapsible: node.collapsible,
            collapsed: node.collapsed,
        })
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> NodeRef<'_, T> {
        NodeRef { arena: self, id }
    }
}

/// Borrowed, read-only view of one node.
pub struct NodeRef<'a, T> {
    arena: &'a NodeArena<T>,
    id: NodeId,
}

impl<T> Clone for NodeRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<'_, T> {}

impl<'a, T> NodeRef<'a, T> {
    fn node(&self) -> &'a TreeNode<T> {
        self.arena.get(self.id)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn element(&self) -> &'a NodeElement<T> {
        &self.node().element
    }

    pub fn depth(&self) -> usize {
        self.node().depth
    }

    pub fn visible(&self) -> bool {
        self.node().visible
    }

    pub fn collapsible(&self) -> bool {
        self.node().collapsible
    }

    pub fn collapsed(&self) -> bool {
        self.node().collapsed
    }

    /// Rows this node occupies: its own plus every visible descendant.
    pub fn visible_count(&self) -> usize {
        self.node().visible_count
    }

    pub fn child_count(&self) -> usize {
        self.node().children.len()
    }

    pub fn parent(&self) -> Option<NodeRef<'a, T>> {
        let arena = self.arena;
        self.node().parent.map(|id| arena.node_ref(id))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a, T>> + 'a {
        let arena = self.arena;
        self.node()
            .children
            .iter()
            .map(move |id| arena.node_ref(*id))
    }

    pub fn location(&self) -> Vec<usize> {
        self.arena.location_of(self.id)
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node();
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("element", &node.element)
            .field("depth", &node.depth)
            .field("visible", &node.visible)
            .field("collapsible", &node.collapsible)
            .field("collapsed", &node.collapsed)
            .field("visible_count", &node.visible_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(element: &'static str, parent: NodeId, depth: usize) -> TreeNode<&'static str> {
        TreeNode {
            element: NodeElement::Item(element),
            parent: Some(parent),
            children: Vec::new(),
            depth,
            visible: true,
            collapsible: false,
            collapsed: false,
            visible_count: 1,
        }
    }

    #[test]
    fn removed_slots_are_recycled() {
        let mut arena = NodeArena::new();
        let a = arena.insert(leaf("a", NodeId::ROOT, 1));
        let b = arena.insert(leaf("b", NodeId::ROOT, 1));
        assert_eq!(arena.len(), 2);

        arena.remove(a);
        assert!(!arena.contains(a));
        let c = arena.insert(leaf("c", NodeId::ROOT, 1));
        assert_eq!(c, a);
        assert!(arena.contains(b));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn location_follows_parent_links() {
        let mut arena = NodeArena::new();
        let a = arena.insert(leaf("a", NodeId::ROOT, 1));
        let b = arena.insert(leaf("b", NodeId::ROOT, 1));
        let c = arena.insert(leaf("c", b, 2));
        arena.get_mut(NodeId::ROOT).children = vec![a, b];
        arena.get_mut(b).children = vec![c];

        assert_eq!(arena.location_of(c), vec![1, 0]);
        assert_eq!(arena.location_of(NodeId::ROOT), Vec::<usize>::new());
        let view = arena.node_ref(c);
        assert_eq!(view.parent().map(|p| p.id()), Some(b));
        assert_eq!(view.element().item(), Some(&"c"));
    }

    #[test]
    #[should_panic(expected = "root sentinel")]
    fn root_cannot_be_removed() {
        let mut arena: NodeArena<&str> = NodeArena::new();
        arena.remove(NodeId::ROOT);
    }
}
