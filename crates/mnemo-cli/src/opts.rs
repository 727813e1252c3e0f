//! Global CLI options and chain directory resolution.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use mnemo_chain::{Chain, ChainConfig, MockBackend};

/// Global options shared by every `mnemo` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ChainOpts {
    /// Chain directory (env: CHAIN_DIR)
    #[arg(short = 'd', long = "chain-dir", global = true, env = "CHAIN_DIR")]
    pub chain_dir: Option<PathBuf>,

    /// Writer key file (env: WRITER_KEY_PATH, default: <chain>/agent.key)
    #[arg(long = "writer-key", global = true, env = "WRITER_KEY_PATH")]
    pub writer_key: Option<PathBuf>,

    /// Emit JSON instead of human output
    #[arg(long, global = true)]
    pub json: bool,
}

/// Resolve the chain directory.
///
/// Priority:
/// 1. `--chain-dir` / `-d` flag
/// 2. `CHAIN_DIR` env var (handled by Clap)
/// 3. CWD if it looks like a chain (contains chain.jsonl or agent.key)
/// 4. Error
pub fn resolve_chain_dir(opts: &ChainOpts) -> Result<PathBuf> {
    if let Some(dir) = &opts.chain_dir {
        return Ok(dir.clone());
    }
    let cwd = std::env::current_dir().context("get current directory")?;
    if cwd.join("chain.jsonl").exists() || cwd.join("agent.key").exists() {
        return Ok(cwd);
    }
    anyhow::bail!(
        "no chain specified; pass --chain-dir <DIR>, set CHAIN_DIR, \
         or run from a directory containing chain.jsonl"
    );
}

/// The writer key path, honoring the override.
pub fn resolve_key_path(opts: &ChainOpts, dir: &std::path::Path) -> PathBuf {
    opts.writer_key
        .clone()
        .unwrap_or_else(|| dir.join("agent.key"))
}

/// Open the chain with the default config and the built-in `mock` anchor
/// backend registered.
pub fn open_chain(opts: &ChainOpts) -> Result<Chain> {
    let dir = resolve_chain_dir(opts)?;
    let key_path = resolve_key_path(opts, &dir);
    let mut chain = Chain::open_with_key(&dir, &key_path, ChainConfig::default())?;
    chain.register_anchor_backend(Box::new(MockBackend::default()));
    Ok(chain)
}
