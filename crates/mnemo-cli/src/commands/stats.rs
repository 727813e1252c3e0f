//! `mnemo stats` command.

use anyhow::Result;
use clap::Args;

use crate::opts::{ChainOpts, open_chain};
use crate::output::emit;

#[derive(Args, Debug)]
pub struct StatsArgs {}

pub fn cmd_stats(opts: &ChainOpts, _args: &StatsArgs) -> Result<()> {
    let chain = open_chain(opts)?;
    let stats = chain.stats()?;
    if opts.json {
        return emit(opts, &stats, None);
    }
    match stats.head_seq {
        Some(head) => println!("head seq: {head}"),
        None => println!("head seq: (empty chain)"),
    }
    println!("entries:  {}", stats.index.entries);
    print_group("kind", &stats.index.by_kind);
    print_group("tier", &stats.index.by_tier);
    print_group("decay", &stats.index.by_decay);
    Ok(())
}

fn print_group(name: &str, counts: &[(String, u64)]) {
    for (value, count) in counts {
        println!("  {name}/{value}: {count}");
    }
}
