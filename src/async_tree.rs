use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use futures::future::{join_all, FutureExt, LocalBoxFuture, Shared};
use tracing::{debug, trace, warn};

use crate::arena::NodeId;
use crate::async_node::{AsyncNode, Refreshing, Signal, UnwrappedNode, UnwrappingSink};
use crate::element::TreeItem;
use crate::error::{Result, TreeError};
use crate::index_tree::{IndexTreeModel, ModelOptions};
use crate::provider::ChildrenProvider;
use crate::sink::SequenceSink;

type ChildrenFetch<T> = Shared<LocalBoxFuture<'static, Result<Vec<T>>>>;

struct TreeShared<T, P, S> {
    provider: P,
    model: RefCell<IndexTreeModel<AsyncNode<T>, UnwrappingSink<S>>>,
    root: AsyncNode<T>,
    /// Index-model node of every committed element.
    nodes: RefCell<HashMap<T, NodeId>>,
    /// In-flight subtree refreshes keyed by node, used for overlap checks.
    subtree_refreshes: RefCell<HashMap<u64, (AsyncNode<T>, Signal)>>,
    children_fetches: RefCell<HashMap<u64, ChildrenFetch<T>>>,
    next_key: Cell<u64>,
}

/// Tree of provider elements that discovers children asynchronously and
/// mirrors the committed result into an `IndexTreeModel`.
///
/// Elements identify nodes, so every element must be unique in the tree.
/// Collapse listeners and sinks must not call back into the tree.
pub struct AsyncDataTree<T, P, S> {
    shared: Rc<TreeShared<T, P, S>>,
}

impl<T, P, S> AsyncDataTree<T, P, S>
where
    T: Clone + Eq + Hash + 'static,
    P: ChildrenProvider<T> + 'static,
    S: SequenceSink<T> + 'static,
{
    pub fn new(provider: P, sink: S, options: ModelOptions) -> Self {
        Self {
            shared: Rc::new(TreeShared {
                provider,
                model: RefCell::new(IndexTreeModel::new(UnwrappingSink(sink), options)),
                root: AsyncNode::root(0),
                nodes: RefCell::new(HashMap::new()),
                subtree_refreshes: RefCell::new(HashMap::new()),
                children_fetches: RefCell::new(HashMap::new()),
                next_key: Cell::new(1),
            }),
        }
    }

    /// Re-fetches the subtree of `element` (the root for `None`) and commits
    /// it into the model once every level has resolved.
    ///
    /// A refresh of the same node that is already running is joined instead
    /// of repeated. Refreshes of an ancestor or descendant run one after the
    /// other. On failure the previously committed subtree is left untouched.
    pub async fn refresh(&self, element: Option<&T>) -> Result<()> {
        loop {
            let node = self.shared.resolve(element)?;
            if let Some(refreshing) = node.refreshing() {
                if refreshing.commits {
                    trace!(key = node.key(), "joining in-flight refresh");
                    return refreshing.signal.await;
                }
            }
            if let Some(signal) = self.shared.overlapping_refresh(&node) {
                trace!(key = node.key(), "waiting for overlapping refresh");
                let _ = signal.await;
                continue;
            }
            debug!(key = node.key(), "refreshing subtree");
            return TreeShared::refresh_subtree(&self.shared, node, true).await;
        }
    }

    /// Re-issues the row of `element` without fetching anything.
    pub fn rerender(&self, element: &T) -> Result<()> {
        let location = self.shared.location(element)?;
        self.shared.model.borrow_mut().rerender(&location)
    }

    pub fn expand(&self, element: &T, recursive: bool) -> Result<bool> {
        let location = self.shared.location(element)?;
        self.shared
            .model
            .borrow_mut()
            .set_collapsed(&location, Some(false), recursive)
    }

    pub fn collapse(&self, element: &T, recursive: bool) -> Result<bool> {
        let location = self.shared.location(element)?;
        self.shared
            .model
            .borrow_mut()
            .set_collapsed(&location, Some(true), recursive)
    }

    /// Expands every collapsed ancestor of `element`.
    pub fn expand_to(&self, element: &T) -> Result<()> {
        let location = self.shared.location(element)?;
        self.shared.model.borrow_mut().expand_to(&location)
    }

    pub fn has_node(&self, element: &T) -> bool {
        self.shared.location(element).is_ok()
    }

    pub fn get_node_location(&self, element: &T) -> Result<Vec<usize>> {
        self.shared.location(element)
    }

    pub fn get_node_list_index(&self, element: &T) -> Result<Option<usize>> {
        let location = self.shared.location(element)?;
        self.shared.model.borrow().get_node_list_index(&location)
    }

    pub fn is_collapsed(&self, element: &T) -> Result<bool> {
        let location = self.shared.location(element)?;
        self.shared.model.borrow().is_collapsed(&location)
    }

    pub fn is_collapsible(&self, element: &T) -> bool {
        self.shared
            .location(element)
            .map(|location| self.shared.model.borrow().is_collapsible(&location))
            .unwrap_or(false)
    }

    /// Committed children of `element` (the root for `None`).
    pub fn children(&self, element: Option<&T>) -> Result<Vec<T>> {
        let location = self.shared.location_of_element(element)?;
        let model = self.shared.model.borrow();
        let node = model.get_node(&location)?;
        Ok(node
            .children()
            .filter_map(|child| child.element().item().and_then(AsyncNode::item).cloned())
            .collect())
    }

    /// Runs `inspect` against the committed node of `element`.
    pub fn inspect_node<R>(
        &self,
        element: Option<&T>,
        inspect: impl FnOnce(UnwrappedNode<'_, T>) -> R,
    ) -> Result<R> {
        let location = self.shared.location_of_element(element)?;
        let model = self.shared.model.borrow();
        let node = model.get_node(&location)?;
        Ok(inspect(UnwrappedNode::new(node)))
    }

    /// Whether a refresh touching `element` is running.
    pub fn is_refreshing(&self, element: Option<&T>) -> bool {
        self.shared
            .resolve(element)
            .map(|node| node.is_refreshing())
            .unwrap_or(false)
    }

    /// Number of committed nodes, not counting the root.
    pub fn size(&self) -> usize {
        self.shared.model.borrow().size()
    }

    pub fn visible_len(&self) -> usize {
        self.shared.model.borrow().visible_len()
    }

    pub fn with_sink<R>(&self, read: impl FnOnce(&S) -> R) -> R {
        let model = self.shared.model.borrow();
        read(model.sink().get_ref())
    }
}

impl<T, P, S> TreeShared<T, P, S>
where
    T: Clone + Eq + Hash + 'static,
    P: ChildrenProvider<T> + 'static,
    S: SequenceSink<T> + 'static,
{
    fn allocate_key(&self) -> u64 {
        let key = self.next_key.get();
        self.next_key.set(key + 1);
        key
    }

    fn committed_id(&self, element: &T) -> Result<NodeId> {
        self.nodes
            .borrow()
            .get(element)
            .copied()
            .ok_or(TreeError::ElementNotFound)
    }

    fn location(&self, element: &T) -> Result<Vec<usize>> {
        let id = self.committed_id(element)?;
        let model = self.model.borrow();
        let node = model.node(id).ok_or(TreeError::ElementNotFound)?;
        Ok(node.location())
    }

    fn location_of_element(&self, element: Option<&T>) -> Result<Vec<usize>> {
        match element {
            None => Ok(Vec::new()),
            Some(element) => self.location(element),
        }
    }

    /// Committed async node of `element`.
    fn resolve(&self, element: Option<&T>) -> Result<AsyncNode<T>> {
        let Some(element) = element else {
            return Ok(self.root.clone());
        };
        let id = self.committed_id(element)?;
        let model = self.model.borrow();
        model
            .node(id)
            .and_then(|node| node.element().item().cloned())
            .ok_or(TreeError::ElementNotFound)
    }

    fn overlapping_refresh(&self, node: &AsyncNode<T>) -> Option<Signal> {
        self.subtree_refreshes
            .borrow()
            .values()
            .find(|(other, _)| other.intersects(node))
            .map(|(_, signal)| signal.clone())
    }

    /// Starts refreshing `node` and its whole subtree. The returned signal is
    /// registered before anything runs, so later callers can find it.
    ///
    /// With `commits` set the result is rendered into the model, and a
    /// failure restores the node's previous children.
    fn refresh_subtree(shared: &Rc<Self>, node: AsyncNode<T>, commits: bool) -> Signal {
        let work = {
            let shared = Rc::clone(shared);
            let node = node.clone();
            async move {
                let previous = commits.then(|| (node.children().clone(), node.has_children()));
                let mut result = Self::refresh_children(Rc::clone(&shared), node.clone()).await;
                if commits && result.is_ok() {
                    result = shared.render(&node);
                }
                if let (Err(err), Some((children, has_children))) = (&result, previous) {
                    warn!(
                        key = node.key(),
                        error = %err,
                        "refresh failed, keeping previous children"
                    );
                    node.replace_children(children);
                    node.set_has_children(has_children);
                }
                shared.subtree_refreshes.borrow_mut().remove(&node.key());
                node.set_refreshing(None);
                result
            }
        };
        let signal = work.boxed_local().shared();
        shared
            .subtree_refreshes
            .borrow_mut()
            .insert(node.key(), (node.clone(), signal.clone()));
        node.set_refreshing(Some(Refreshing {
            signal: signal.clone(),
            commits,
        }));
        signal
    }

    async fn refresh_children(shared: Rc<Self>, node: AsyncNode<T>) -> Result<()> {
        let has_children = shared
            .provider
            .has_children(node.element())
            .await
            .map_err(TreeError::provider)?;
        let elements = if has_children {
            Self::fetch_children(&shared, &node).await?
        } else {
            Vec::new()
        };

        node.set_has_children(has_children);
        let children: Vec<AsyncNode<T>> = elements
            .into_iter()
            .map(|element| AsyncNode::child(shared.allocate_key(), element, &node))
            .collect();
        node.replace_children(children.clone());

        let refreshes: Vec<Signal> = children
            .into_iter()
            .map(|child| Self::refresh_subtree(&shared, child, false))
            .collect();
        join_all(refreshes).await.into_iter().collect()
    }

    /// Asks the provider for the children of `node`, sharing a fetch that is
    /// still outstanding for the same node.
    ///
    /// `refresh` never runs two refreshes of one node at once, so within a
    /// single tree the shared path is only a guard against a second caller.
    fn fetch_children(shared: &Rc<Self>, node: &AsyncNode<T>) -> ChildrenFetch<T> {
        let key = node.key();
        let outstanding = shared.children_fetches.borrow().get(&key).cloned();
        if let Some(fetch) = outstanding {
            trace!(key = key, "reusing outstanding children fetch");
            return fetch;
        }

        let fetch = {
            let shared = Rc::clone(shared);
            let node = node.clone();
            async move {
                let result = shared
                    .provider
                    .get_children(node.element())
                    .await
                    .map_err(TreeError::provider);
                shared.children_fetches.borrow_mut().remove(&node.key());
                result
            }
        }
        .boxed_local()
        .shared();
        shared.children_fetches.borrow_mut().insert(key, fetch.clone());
        fetch
    }

    /// Replaces the committed children of `node` with its refreshed subtree.
    fn render(&self, node: &AsyncNode<T>) -> Result<()> {
        let location = match node.item() {
            None => Vec::new(),
            Some(element) => self.location(element)?,
        };
        let mut model = self.model.borrow_mut();

        let mut collapsed_state = HashMap::new();
        {
            let mut nodes = self.nodes.borrow_mut();
            model.visit_descendants(&location, |old| {
                if let Some(element) = old.element().item().and_then(AsyncNode::item) {
                    nodes.remove(element);
                    if old.collapsible() {
                        collapsed_state.insert(element.clone(), old.collapsed());
                    }
                }
            })?;
        }

        let items: Vec<_> = node
            .children()
            .iter()
            .map(|child| to_item(child, &collapsed_state))
            .collect();
        model.set_children(&location, items)?;

        let mut nodes = self.nodes.borrow_mut();
        model.visit_descendants(&location, |new| {
            if let Some(element) = new.element().item().and_then(AsyncNode::item) {
                nodes.insert(element.clone(), new.id());
            }
        })?;
        if !location.is_empty() {
            model.set_collapsible(&location, Some(node.has_children()))?;
        }
        debug!(key = node.key(), rows = model.visible_len(), "committed refreshed subtree");
        Ok(())
    }
}

fn to_item<T: Clone + Eq + Hash>(
    node: &AsyncNode<T>,
    collapsed_state: &HashMap<T, bool>,
) -> TreeItem<AsyncNode<T>> {
    let mut item = TreeItem::new(node.clone()).collapsible(node.has_children());
    item.collapsed = node.item().and_then(|element| collapsed_state.get(element).copied());
    item.children = node
        .children()
        .iter()
        .map(|child| to_item(child, collapsed_state))
        .collect();
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{NodeElement, TreeRow};
    use std::collections::HashSet;
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures::executor::block_on;

    /// Suspends once so provider calls interleave with other futures.
    #[derive(Default)]
    struct YieldNow {
        yielded: bool,
    }

    impl Future for YieldNow {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.yielded {
                return Poll::Ready(());
            }
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }

    type Key = Option<&'static str>;

    #[derive(Default)]
    struct MapProvider {
        children: RefCell<HashMap<Key, Vec<&'static str>>>,
        failing: RefCell<HashSet<&'static str>>,
        broken: RefCell<HashSet<&'static str>>,
        events: RefCell<Vec<String>>,
    }

    impl MapProvider {
        fn set(&self, key: Key, children: &[&'static str]) {
            self.children.borrow_mut().insert(key, children.to_vec());
        }

        fn events(&self) -> Vec<String> {
            self.events.borrow().clone()
        }

        fn fetches(&self, label: &str) -> usize {
            let expected = format!("fetch {label}");
            self.events.borrow().iter().filter(|e| **e == expected).count()
        }
    }

    fn key_of(element: &NodeElement<&'static str>) -> Key {
        element.item().copied()
    }

    fn label(key: Key) -> &'static str {
        key.unwrap_or("root")
    }

    impl ChildrenProvider<&'static str> for Rc<MapProvider> {
        fn has_children(
            &self,
            element: &NodeElement<&'static str>,
        ) -> impl Future<Output = anyhow::Result<bool>> {
            let this = Rc::clone(self);
            let key = key_of(element);
            async move {
                YieldNow::default().await;
                if let Some(name) = key {
                    if this.broken.borrow().contains(name) {
                        anyhow::bail!("cannot stat {name}");
                    }
                }
                Ok(this.children.borrow().contains_key(&key))
            }
        }

        fn get_children(
            &self,
            element: &NodeElement<&'static str>,
        ) -> impl Future<Output = anyhow::Result<Vec<&'static str>>> {
            let this = Rc::clone(self);
            let key = key_of(element);
            async move {
                this.events.borrow_mut().push(format!("fetch {}", label(key)));
                YieldNow::default().await;
                if let Some(name) = key {
                    if this.failing.borrow().contains(name) {
                        anyhow::bail!("cannot list {name}");
                    }
                }
                let children = this.children.borrow().get(&key).cloned().unwrap_or_default();
                this.events.borrow_mut().push(format!("done {}", label(key)));
                Ok(children)
            }
        }
    }

    type TestTree = AsyncDataTree<&'static str, Rc<MapProvider>, Vec<TreeRow<&'static str>>>;

    fn tree(provider: &Rc<MapProvider>) -> TestTree {
        AsyncDataTree::new(Rc::clone(provider), Vec::new(), ModelOptions::default())
    }

    fn rows(tree: &TestTree) -> Vec<(&'static str, usize)> {
        tree.with_sink(|rows| rows.iter().map(|row| (row.element, row.depth)).collect())
    }

    /// root -> a -> b -> c
    fn chain() -> Rc<MapProvider> {
        let provider = Rc::new(MapProvider::default());
        provider.set(None, &["a"]);
        provider.set(Some("a"), &["b"]);
        provider.set(Some("b"), &["c"]);
        provider
    }

    #[test]
    fn initial_refresh_renders_whole_tree() {
        let provider = chain();
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("refresh");

        assert_eq!(rows(&tree), [("a", 1), ("b", 2), ("c", 3)]);
        assert_eq!(tree.size(), 3);
        assert!(tree.is_collapsible(&"b"));
        assert!(!tree.is_collapsible(&"c"));
        assert_eq!(tree.get_node_location(&"c").expect("location"), vec![0, 0, 0]);
        assert_eq!(tree.get_node_list_index(&"c").expect("index"), Some(2));
        assert!(!tree.is_refreshing(None));
    }

    #[test]
    fn concurrent_refreshes_of_same_node_fetch_once() {
        let provider = chain();
        let tree = tree(&provider);

        let (first, second) =
            block_on(async { futures::join!(tree.refresh(None), tree.refresh(None)) });
        first.expect("first refresh");
        second.expect("second refresh");

        assert_eq!(provider.fetches("root"), 1);
        assert_eq!(provider.fetches("a"), 1);
        assert_eq!(rows(&tree), [("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn descendant_refresh_waits_for_ancestor() {
        let provider = chain();
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("initial refresh");
        provider.events.borrow_mut().clear();
        provider.set(Some("a"), &["b", "x"]);
        provider.set(Some("b"), &["c", "y"]);

        let (outer, inner) =
            block_on(async { futures::join!(tree.refresh(Some(&"a")), tree.refresh(Some(&"b"))) });
        outer.expect("refresh a");
        inner.expect("refresh b");

        assert_eq!(
            provider.events(),
            ["fetch a", "done a", "fetch b", "done b", "fetch b", "done b"]
        );
        assert_eq!(rows(&tree), [("a", 1), ("b", 2), ("c", 3), ("y", 3), ("x", 2)]);
        assert!(tree.subtree_is_idle());
    }

    #[test]
    fn ancestor_refresh_waits_for_descendant() {
        let provider = chain();
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("initial refresh");
        provider.events.borrow_mut().clear();

        let (inner, outer) =
            block_on(async { futures::join!(tree.refresh(Some(&"b")), tree.refresh(Some(&"a"))) });
        inner.expect("refresh b");
        outer.expect("refresh a");

        assert_eq!(
            provider.events(),
            ["fetch b", "done b", "fetch a", "done a", "fetch b", "done b"]
        );
        assert_eq!(rows(&tree), [("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn disjoint_refreshes_interleave() {
        let provider = Rc::new(MapProvider::default());
        provider.set(None, &["p", "q"]);
        provider.set(Some("p"), &["p1"]);
        provider.set(Some("q"), &["q1"]);
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("initial refresh");
        provider.events.borrow_mut().clear();

        let (p, q) =
            block_on(async { futures::join!(tree.refresh(Some(&"p")), tree.refresh(Some(&"q"))) });
        p.expect("refresh p");
        q.expect("refresh q");

        assert_eq!(provider.events(), ["fetch p", "fetch q", "done p", "done q"]);
    }

    #[test]
    fn failed_refresh_leaves_committed_tree_untouched() {
        let provider = chain();
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("initial refresh");
        let before = rows(&tree);

        provider.set(None, &["a", "z"]);
        provider.failing.borrow_mut().insert("b");
        let err = block_on(tree.refresh(None)).expect_err("refresh should fail");
        assert!(matches!(err, TreeError::Provider(_)));
        assert!(err.to_string().contains("cannot list b"));

        assert_eq!(rows(&tree), before);
        assert!(!tree.has_node(&"z"));
        assert_eq!(tree.children(None).expect("children"), ["a"]);
        assert!(tree.subtree_is_idle());

        provider.failing.borrow_mut().clear();
        block_on(tree.refresh(None)).expect("retry");
        assert_eq!(rows(&tree), [("a", 1), ("b", 2), ("c", 3), ("z", 1)]);
    }

    #[test]
    fn collapse_state_survives_refresh() {
        let provider = chain();
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("initial refresh");
        assert!(tree.collapse(&"b", false).expect("collapse"));
        assert_eq!(rows(&tree), [("a", 1), ("b", 2)]);

        provider.set(Some("a"), &["b", "x"]);
        block_on(tree.refresh(Some(&"a"))).expect("refresh a");

        assert_eq!(rows(&tree), [("a", 1), ("b", 2), ("x", 2)]);
        assert!(tree.is_collapsed(&"b").expect("collapsed"));
        assert_eq!(tree.get_node_list_index(&"c").expect("index"), None);

        tree.expand(&"b", false).expect("expand");
        assert_eq!(rows(&tree), [("a", 1), ("b", 2), ("c", 3), ("x", 2)]);
    }

    #[test]
    fn collapse_by_default_applies_to_new_elements() {
        let provider = chain();
        let options = ModelOptions {
            collapse_by_default: true,
            ..ModelOptions::default()
        };
        let tree: TestTree = AsyncDataTree::new(Rc::clone(&provider), Vec::new(), options);
        block_on(tree.refresh(None)).expect("refresh");

        assert_eq!(rows(&tree), [("a", 1)]);
        tree.expand_to(&"c").expect("expand to c");
        assert_eq!(rows(&tree), [("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn removed_elements_are_forgotten() {
        let provider = chain();
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("initial refresh");

        provider.set(Some("a"), &["x"]);
        block_on(tree.refresh(Some(&"a"))).expect("refresh a");

        assert!(!tree.has_node(&"b"));
        assert!(!tree.has_node(&"c"));
        assert!(tree.has_node(&"x"));
        assert_eq!(tree.size(), 2);
        assert!(matches!(
            tree.refresh(Some(&"b")).now_or_never(),
            Some(Err(TreeError::ElementNotFound))
        ));
    }

    #[test]
    fn leaf_refresh_clears_collapsible() {
        let provider = chain();
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("initial refresh");

        provider.children.borrow_mut().remove(&Some("b"));
        block_on(tree.refresh(Some(&"b"))).expect("refresh b");

        assert!(!tree.is_collapsible(&"b"));
        assert_eq!(rows(&tree), [("a", 1), ("b", 2)]);
        assert!(tree.children(Some(&"b")).expect("children").is_empty());
    }

    #[test]
    fn collapsed_node_stays_collapsed_when_children_return() {
        let provider = chain();
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("initial refresh");
        tree.collapse(&"b", false).expect("collapse b");

        provider.children.borrow_mut().remove(&Some("b"));
        block_on(tree.refresh(Some(&"b"))).expect("refresh b as leaf");
        assert!(!tree.is_collapsible(&"b"));

        provider.set(Some("b"), &["c"]);
        block_on(tree.refresh(Some(&"b"))).expect("refresh b with children");
        assert_eq!(rows(&tree), [("a", 1), ("b", 2)]);
        assert!(tree.is_collapsible(&"b"));
        assert!(tree.is_collapsed(&"b").expect("collapsed"));
        assert_eq!(tree.get_node_list_index(&"c").expect("index"), None);
        assert_eq!(tree.visible_len(), 2);
        let b_rows = tree.inspect_node(Some(&"b"), |node| node.visible_count());
        assert_eq!(b_rows.expect("inspect b"), 1);

        tree.expand(&"b", false).expect("expand b");
        assert_eq!(rows(&tree), [("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn has_children_failure_keeps_committed_tree() {
        let provider = chain();
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("initial refresh");
        tree.collapse(&"b", false).expect("collapse b");
        let before = rows(&tree);

        provider.set(Some("a"), &["b", "x"]);
        provider.broken.borrow_mut().insert("c");
        let err = block_on(tree.refresh(Some(&"a"))).expect_err("refresh should fail");
        assert!(matches!(err, TreeError::Provider(_)));
        assert!(err.to_string().contains("cannot stat c"));

        assert_eq!(rows(&tree), before);
        assert!(!tree.has_node(&"x"));
        assert!(tree.is_collapsed(&"b").expect("still collapsed"));
        assert_eq!(tree.children(Some(&"a")).expect("children"), ["b"]);
        assert!(tree.subtree_is_idle());
    }

    #[test]
    fn outstanding_children_fetch_is_shared() {
        let provider = chain();
        let tree = tree(&provider);
        let root = tree.shared.root.clone();

        let first = TreeShared::fetch_children(&tree.shared, &root);
        let second = TreeShared::fetch_children(&tree.shared, &root);
        let (first, second) = block_on(futures::future::join(first, second));

        assert_eq!(first.expect("first fetch"), ["a"]);
        assert_eq!(second.expect("second fetch"), ["a"]);
        assert_eq!(provider.fetches("root"), 1);
        assert!(tree.subtree_is_idle());
    }

    #[test]
    fn inspect_node_reports_plain_elements() {
        let provider = chain();
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("refresh");

        let (element, depth, parent) = tree
            .inspect_node(Some(&"b"), |node| {
                let parent = node.parent().and_then(|p| p.element().copied());
                (node.element().copied(), node.depth(), parent)
            })
            .expect("inspect");
        assert_eq!(element, Some("b"));
        assert_eq!(depth, 2);
        assert_eq!(parent, Some("a"));

        let root_children = tree
            .inspect_node(None, |node| node.children().count())
            .expect("inspect root");
        assert_eq!(root_children, 1);
    }

    #[test]
    fn rerender_keeps_rows() {
        let provider = chain();
        let tree = tree(&provider);
        block_on(tree.refresh(None)).expect("refresh");

        tree.rerender(&"b").expect("rerender");
        assert_eq!(rows(&tree), [("a", 1), ("b", 2), ("c", 3)]);
        assert!(matches!(tree.rerender(&"missing"), Err(TreeError::ElementNotFound)));
        assert!(!tree.is_collapsible(&"missing"));
    }

    impl TestTree {
        fn subtree_is_idle(&self) -> bool {
            self.shared.subtree_refreshes.borrow().is_empty()
                && self.shared.children_fetches.borrow().is_empty()
        }
    }
}
