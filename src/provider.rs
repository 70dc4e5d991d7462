use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use std::fs;
use std::future::{self, Future};
use std::path::{Path, PathBuf};

use crate::element::NodeElement;

/// Source of truth for the children of each element.
///
/// Both calls may complete immediately or suspend. They are repeated on every
/// refresh, so they should be cheap to call more than once for the same
/// element.
pub trait ChildrenProvider<T> {
    fn has_children(&self, element: &NodeElement<T>) -> impl Future<Output = Result<bool>>;

    fn get_children(&self, element: &NodeElement<T>) -> impl Future<Output = Result<Vec<T>>>;
}

#[derive(Debug, Clone)]
pub struct FsOptions {
    /// Directories at this depth below the root report no children.
    pub max_depth: usize,
    pub show_hidden: bool,
    pub dirs_first: bool,
    pub exclude: Vec<Regex>,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            max_depth: 4,
            show_hidden: false,
            dirs_first: true,
            exclude: Vec::new(),
        }
    }
}

pub fn compile_exclude_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid exclude pattern {pattern:?}"))
        })
        .collect()
}

/// Lists directory entries below a fixed root. The root sentinel stands for
/// the root directory itself.
#[derive(Debug, Clone)]
pub struct FsProvider {
    root: PathBuf,
    options: FsOptions,
}

impl FsProvider {
    pub fn new(root: &Path, options: FsOptions) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize root {}", root.display()))?;
        Ok(Self { root, options })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn depth_of(&self, path: &Path) -> usize {
        path.strip_prefix(&self.root)
            .map(|rel| rel.components().count())
            .unwrap_or(usize::MAX)
    }

    fn is_listable_dir(&self, path: &Path) -> bool {
        let is_dir = fs::symlink_metadata(path)
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        is_dir && self.depth_of(path) < self.options.max_depth
    }

    fn is_shown(&self, name: &str) -> bool {
        if !self.options.show_hidden && name.starts_with('.') {
            return false;
        }
        !self.options.exclude.iter().any(|re| re.is_match(name))
    }

    pub fn list_children(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let iter = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
        let mut entries = Vec::new();
        for entry in iter {
            let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !self.is_shown(&name) {
                continue;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            entries.push((is_dir, name.to_ascii_lowercase(), entry.path()));
        }

        if self.options.dirs_first {
            entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        } else {
            entries.sort_by(|a, b| a.1.cmp(&b.1));
        }
        Ok(entries.into_iter().map(|(_, _, path)| path).collect())
    }
}

impl ChildrenProvider<PathBuf> for FsProvider {
    fn has_children(&self, element: &NodeElement<PathBuf>) -> impl Future<Output = Result<bool>> {
        let has_children = match element {
            NodeElement::Root => true,
            NodeElement::Item(path) => self.is_listable_dir(path),
        };
        future::ready(Ok(has_children))
    }

    fn get_children(
        &self,
        element: &NodeElement<PathBuf>,
    ) -> impl Future<Output = Result<Vec<PathBuf>>> {
        let dir = match element {
            NodeElement::Root => self.root.as_path(),
            NodeElement::Item(path) => path.as_path(),
        };
        future::ready(self.list_children(dir))
    }
}
