use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use futures::future::{LocalBoxFuture, Shared};

use crate::arena::NodeRef;
use crate::element::{NodeElement, TreeRow};
use crate::error::Result;
use crate::sink::SequenceSink;

/// Completion handle of an in-flight refresh, shared by every waiter.
pub(crate) type Signal = Shared<LocalBoxFuture<'static, Result<()>>>;

#[derive(Clone)]
pub(crate) struct Refreshing {
    pub(crate) signal: Signal,
    /// Whether this refresh ends by committing the node's subtree into the
    /// index model, as opposed to being one step of an ancestor's refresh.
    pub(crate) commits: bool,
}

struct AsyncNodeInner<T> {
    key: u64,
    element: NodeElement<T>,
    parent: Weak<AsyncNodeInner<T>>,
    children: RefCell<Vec<AsyncNode<T>>>,
    has_children: Cell<bool>,
    refreshing: RefCell<Option<Refreshing>>,
}

/// Node of the coordinator's data graph: one provider element, its fetched
/// children and the refresh currently running for it, if any.
///
/// Clones share the node; equality is identity.
pub struct AsyncNode<T>(Rc<AsyncNodeInner<T>>);

impl<T> Clone for AsyncNode<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> PartialEq for AsyncNode<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for AsyncNode<T> {}

impl<T> Hash for AsyncNode<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncNode")
            .field("key", &self.0.key)
            .field("element", &self.0.element)
            .field("children", &self.0.children.borrow().len())
            .field("refreshing", &self.0.refreshing.borrow().is_some())
            .finish()
    }
}

impl<T> AsyncNode<T> {
    pub(crate) fn root(key: u64) -> Self {
        Self(Rc::new(AsyncNodeInner {
            key,
            element: NodeElement::Root,
            parent: Weak::new(),
            children: RefCell::new(Vec::new()),
            has_children: Cell::new(true),
            refreshing: RefCell::new(None),
        }))
    }

    pub(crate) fn child(key: u64, element: T, parent: &AsyncNode<T>) -> Self {
        Self(Rc::new(AsyncNodeInner {
            key,
            element: NodeElement::Item(element),
            parent: Rc::downgrade(&parent.0),
            children: RefCell::new(Vec::new()),
            has_children: Cell::new(false),
            refreshing: RefCell::new(None),
        }))
    }

    pub(crate) fn key(&self) -> u64 {
        self.0.key
    }

    pub fn element(&self) -> &NodeElement<T> {
        &self.0.element
    }

    pub fn item(&self) -> Option<&T> {
        self.0.element.item()
    }

    pub fn has_children(&self) -> bool {
        self.0.has_children.get()
    }

    pub(crate) fn set_has_children(&self, has_children: bool) {
        self.0.has_children.set(has_children);
    }

    pub fn parent(&self) -> Option<AsyncNode<T>> {
        self.0.parent.upgrade().map(AsyncNode)
    }

    pub(crate) fn children(&self) -> Ref<'_, Vec<AsyncNode<T>>> {
        self.0.children.borrow()
    }

    /// Installs a new child list and returns the previous one.
    pub(crate) fn replace_children(&self, children: Vec<AsyncNode<T>>) -> Vec<AsyncNode<T>> {
        self.0.children.replace(children)
    }

    pub(crate) fn refreshing(&self) -> Option<Refreshing> {
        self.0.refreshing.borrow().clone()
    }

    pub(crate) fn set_refreshing(&self, refreshing: Option<Refreshing>) {
        *self.0.refreshing.borrow_mut() = refreshing;
    }

    pub fn is_refreshing(&self) -> bool {
        self.0.refreshing.borrow().is_some()
    }

    pub fn is_ancestor_of(&self, other: &AsyncNode<T>) -> bool {
        let mut current = other.parent();
        while let Some(node) = current {
            if node == *self {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Whether refreshing both nodes would touch a common subtree.
    pub fn intersects(&self, other: &AsyncNode<T>) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }
}

/// Read-only view of an index-model node whose payload is an `AsyncNode`,
/// reporting the provider element instead of the wrapper.
pub struct UnwrappedNode<'a, T> {
    node: NodeRef<'a, AsyncNode<T>>,
}

impl<'a, T> UnwrappedNode<'a, T> {
    pub(crate) fn new(node: NodeRef<'a, AsyncNode<T>>) -> Self {
        Self { node }
    }

    /// The element, or `None` for the root.
    pub fn element(&self) -> Option<&'a T> {
        self.node.element().item().and_then(AsyncNode::item)
    }

    pub fn depth(&self) -> usize {
        self.node.depth()
    }

    pub fn visible(&self) -> bool {
        self.node.visible()
    }

    pub fn collapsible(&self) -> bool {
        self.node.collapsible()
    }

    pub fn collapsed(&self) -> bool {
        self.node.collapsed()
    }

    pub fn visible_count(&self) -> usize {
        self.node.visible_count()
    }

    pub fn parent(&self) -> Option<UnwrappedNode<'a, T>> {
        self.node.parent().map(UnwrappedNode::new)
    }

    pub fn children(&self) -> impl Iterator<Item = UnwrappedNode<'a, T>> + 'a {
        self.node.children().map(UnwrappedNode::new)
    }
}

/// Forwards rows of an `AsyncNode`-backed model to a sink of plain elements.
pub struct UnwrappingSink<S>(pub(crate) S);

impl<S> UnwrappingSink<S> {
    pub fn get_ref(&self) -> &S {
        &self.0
    }
}

fn unwrap_row<T: Clone>(row: TreeRow<AsyncNode<T>>) -> Option<TreeRow<T>> {
    let element = row.element.item()?.clone();
    Some(row.map(|_| element))
}

impl<T: Clone, S: SequenceSink<T>> SequenceSink<AsyncNode<T>> for UnwrappingSink<S> {
    fn splice(&mut self, index: usize, delete_count: usize, rows: Vec<TreeRow<AsyncNode<T>>>) {
        let rows = rows.into_iter().filter_map(unwrap_row).collect();
        self.0.splice(index, delete_count, rows);
    }

    fn rerender(&mut self, index: usize, row: TreeRow<AsyncNode<T>>) {
        if let Some(row) = unwrap_row(row) {
            self.0.rerender(index, row);
        }
    }
}
