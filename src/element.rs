use serde::Serialize;

/// Payload of a tree node: the root sentinel or a caller element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeElement<T> {
    Root,
    Item(T),
}

impl<T> NodeElement<T> {
    pub fn item(&self) -> Option<&T> {
        match self {
            Self::Root => None,
            Self::Item(element) => Some(element),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }
}

/// Insertion descriptor accepted by `IndexTreeModel::splice`.
///
/// `collapsible` and `collapsed` left as `None` fall back to the model's
/// options. A node with children is always collapsible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem<T> {
    pub element: T,
    pub collapsible: Option<bool>,
    pub collapsed: Option<bool>,
    pub children: Vec<TreeItem<T>>,
}

impl<T> TreeItem<T> {
    pub fn new(element: T) -> Self {
        Self {
            element,
            collapsible: None,
            collapsed: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<TreeItem<T>>) -> Self {
        self.children = children;
        self
    }

    pub fn collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = Some(collapsed);
        self
    }

    pub fn collapsible(mut self, collapsible: bool) -> Self {
        self.collapsible = Some(collapsible);
        self
    }
}

/// One rendered row, as handed to a `SequenceSink`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeRow<T> {
    pub element: T,
    pub depth: usize,
    pub collapsible: bool,
    pub collapsed: bool,
}

impl<T> TreeRow<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TreeRow<U> {
        TreeRow {
            element: f(self.element),
            depth: self.depth,
            collapsible: self.collapsible,
            collapsed: self.collapsed,
        }
    }
}
