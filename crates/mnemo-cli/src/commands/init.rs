//! `mnemo init` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use mnemo_chain::{Chain, ChainConfig};

use crate::opts::{ChainOpts, resolve_key_path};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path to create the chain in (defaults to --chain-dir or the current
    /// directory)
    pub path: Option<PathBuf>,
}

pub fn cmd_init(opts: &ChainOpts, args: &InitArgs) -> Result<()> {
    let dir = args
        .path
        .clone()
        .or_else(|| opts.chain_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let key_path = resolve_key_path(opts, &dir);

    Chain::init(&dir, Some(&key_path))?;
    // Opening once materializes the journal, content store, and index.
    Chain::open_with_key(&dir, &key_path, ChainConfig::default())?;

    println!("chain initialized at {}", dir.display());
    println!("  journal: {}", dir.join("chain.jsonl").display());
    println!("  content: {}", dir.join("content").display());
    println!("  index:   {}", dir.join("memory.db").display());
    println!("  key:     {}", key_path.display());
    Ok(())
}
