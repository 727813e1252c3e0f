//! `mnemo recall` command.

use anyhow::Result;
use clap::Args;
use mnemo_chain::ops::RecallRequest;
use mnemo_chain::{ChainError, Tier};

use crate::opts::{ChainOpts, open_chain};
use crate::output::emit;

#[derive(Args, Debug)]
pub struct RecallArgs {
    /// Query text
    pub query: String,

    /// Cap on returned entries
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Token budget for the returned contents
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Restrict to these tiers (repeatable)
    #[arg(long = "tier")]
    pub tiers: Vec<String>,

    /// Include superseded entries
    #[arg(long)]
    pub include_superseded: bool,
}

pub fn cmd_recall(opts: &ChainOpts, args: &RecallArgs) -> Result<()> {
    let tiers = if args.tiers.is_empty() {
        None
    } else {
        Some(
            args.tiers
                .iter()
                .map(|t| {
                    t.parse::<Tier>()
                        .map_err(|e| ChainError::InvalidInput(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
        )
    };

    let mut chain = open_chain(opts)?;
    let hits = chain.recall(RecallRequest {
        query: args.query.clone(),
        max_tokens: args.max_tokens,
        max_results: args.max_results,
        tiers,
        include_superseded: args.include_superseded,
    })?;

    if opts.json {
        return emit(opts, &hits, None);
    }
    if hits.is_empty() {
        println!("no matches");
        return Ok(());
    }
    for hit in &hits {
        println!("{:>6}  {:.3}  {}", hit.seq, hit.score, hit.content);
    }
    Ok(())
}
