//! `mnemo rebuild` command.

use anyhow::Result;
use clap::Args;

use crate::opts::{ChainOpts, open_chain};

#[derive(Args, Debug)]
pub struct RebuildArgs {}

pub fn cmd_rebuild(opts: &ChainOpts, _args: &RebuildArgs) -> Result<()> {
    let mut chain = open_chain(opts)?;
    chain.rebuild()?;
    let stats = chain.stats()?;
    println!("index rebuilt ({} entries)", stats.index.entries);
    Ok(())
}
