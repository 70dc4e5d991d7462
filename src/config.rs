use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::index_tree::ModelOptions;
use crate::provider::{compile_exclude_patterns, FsOptions};

/// Settings read from a JSON file; command-line flags are applied on top.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub collapse_by_default: bool,
    pub auto_expand_single_children: bool,
    pub max_depth: usize,
    pub show_hidden: bool,
    pub dirs_first: bool,
    pub exclude: Vec<String>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            collapse_by_default: false,
            auto_expand_single_children: false,
            max_depth: 4,
            show_hidden: false,
            dirs_first: true,
            exclude: Vec::new(),
        }
    }
}

impl TreeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            collapse_by_default: self.collapse_by_default,
            auto_expand_single_children: self.auto_expand_single_children,
        }
    }

    pub fn fs_options(&self) -> Result<FsOptions> {
        Ok(FsOptions {
            max_depth: self.max_depth,
            show_hidden: self.show_hidden,
            dirs_first: self.dirs_first,
            exclude: compile_exclude_patterns(&self.exclude)?,
        })
    }
}
