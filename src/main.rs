use anyhow::{Context, Result};
use clap::Parser;
use futures::executor::block_on;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use flist_tree::async_tree::AsyncDataTree;
use flist_tree::config::TreeConfig;
use flist_tree::element::TreeRow;
use flist_tree::provider::FsProvider;
use flist_tree::ui_model::{render_rows, rows_to_json};

#[derive(Parser, Debug)]
#[command(name = "flisttree")]
#[command(about = "Print the visible rows of a directory tree")]
struct Args {
    #[arg(long, default_value = ".")]
    root: PathBuf,
    #[arg(long)]
    max_depth: Option<usize>,
    /// Directory to collapse, relative to the root. May be repeated.
    #[arg(long = "collapse")]
    collapse: Vec<PathBuf>,
    #[arg(long, default_value_t = false)]
    json: bool,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    show_hidden: bool,
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
}

fn load_config(args: &Args) -> Result<TreeConfig> {
    let mut config = match &args.config {
        Some(path) => TreeConfig::load(path)?,
        None => TreeConfig::default(),
    };
    if let Some(max_depth) = args.max_depth {
        config.max_depth = max_depth;
    }
    if args.show_hidden {
        config.show_hidden = true;
    }
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let provider = FsProvider::new(&args.root, config.fs_options()?)?;
    let root = provider.root().to_path_buf();
    let tree = AsyncDataTree::new(provider, Vec::<TreeRow<PathBuf>>::new(), config.model_options());

    block_on(tree.refresh(None)).context("failed to refresh tree")?;
    for rel in &args.collapse {
        tree.collapse(&root.join(rel), false)
            .with_context(|| format!("failed to collapse {}", rel.display()))?;
    }
    debug!(nodes = tree.size(), rows = tree.visible_len(), "tree ready");

    let output = tree.with_sink(|rows| {
        if args.json {
            rows_to_json(rows, &root)
        } else {
            Ok(render_rows(rows).join("\n"))
        }
    })?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;
    run(&args)
}
