//! `mnemo rethink` command.

use anyhow::Result;
use clap::Args;
use mnemo_chain::ChainError;
use mnemo_chain::ops::RethinkRequest;

use crate::opts::{ChainOpts, open_chain};
use crate::output::emit;

#[derive(Args, Debug)]
pub struct RethinkArgs {
    /// Comma-separated seqs the new understanding supersedes
    #[arg(long, required = true)]
    pub supersedes: String,

    /// The consolidated understanding
    pub content: String,

    /// Why the consolidation happened
    #[arg(long)]
    pub reason: Option<String>,
}

pub fn cmd_rethink(opts: &ChainOpts, args: &RethinkArgs) -> Result<()> {
    let supersedes = args
        .supersedes
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| ChainError::InvalidInput(format!("bad seq '{}'", part.trim())))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut chain = open_chain(opts)?;
    let outcome = chain.rethink(RethinkRequest {
        supersedes,
        new_understanding: args.content.clone(),
        reason: args.reason.clone(),
        importance: None,
        created_at: None,
    })?;

    emit(
        opts,
        &outcome,
        Some(format!(
            "consolidated into seq {} ({} superseded)",
            outcome.consolidation_seq, outcome.superseded_count
        )),
    )
}
