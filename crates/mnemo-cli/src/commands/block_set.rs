//! `mnemo block-set` command.

use anyhow::Result;
use clap::Args;
use mnemo_chain::ops::BlockUpdateRequest;
use mnemo_chain::{BlockLabel, ChainError};

use crate::opts::{ChainOpts, open_chain};
use crate::output::emit;

#[derive(Args, Debug)]
pub struct BlockSetArgs {
    /// Block label (persona, user_profile, goals, knowledge)
    pub label: String,

    /// New block content
    pub content: String,

    /// Do not flag this block version as core memory
    #[arg(long)]
    pub no_core: bool,
}

pub fn cmd_block_set(opts: &ChainOpts, args: &BlockSetArgs) -> Result<()> {
    let label: BlockLabel = args
        .label
        .parse()
        .map_err(|e: mnemo_chain::entry::EnumParseError| ChainError::InvalidInput(e.to_string()))?;

    let mut chain = open_chain(opts)?;
    let outcome = chain.block_update(BlockUpdateRequest {
        is_core: !args.no_core,
        ..BlockUpdateRequest::new(label, args.content.clone())
    })?;

    emit(
        opts,
        &outcome,
        Some(format!(
            "block {} set to version {} (seq {})",
            label, outcome.version, outcome.seq
        )),
    )
}
