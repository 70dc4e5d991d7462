pub mod arena;
pub mod async_node;
pub mod async_tree;
pub mod config;
pub mod element;
pub mod error;
pub mod index_tree;
pub mod provider;
pub mod sink;
pub mod ui_model;

pub use async_tree::AsyncDataTree;
pub use element::{NodeElement, TreeItem, TreeRow};
pub use error::{Result, TreeError};
pub use index_tree::{CollapseStateChange, IndexTreeModel, ModelOptions};
pub use provider::{ChildrenProvider, FsProvider};
pub use sink::SequenceSink;
