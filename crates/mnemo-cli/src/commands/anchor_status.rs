//! `mnemo anchor-status` command.

use anyhow::Result;
use clap::Args;

use crate::commands::anchor::status_str;
use crate::opts::{ChainOpts, open_chain};
use crate::output::emit;

#[derive(Args, Debug)]
pub struct AnchorStatusArgs {
    /// Only receipts for this seq
    #[arg(long)]
    pub seq: Option<u64>,

    /// Run the upgrade pass (settle pending receipts) before listing
    #[arg(long)]
    pub upgrade: bool,
}

pub fn cmd_anchor_status(opts: &ChainOpts, args: &AnchorStatusArgs) -> Result<()> {
    let chain = open_chain(opts)?;
    if args.upgrade {
        let settled = chain.upgrade_anchors()?;
        if settled > 0 {
            eprintln!("settled {settled} pending receipt(s)");
        }
    }
    let receipts = chain.anchor_status(args.seq)?;
    if opts.json {
        return emit(opts, &receipts, None);
    }
    if receipts.is_empty() {
        println!("no anchor receipts");
        return Ok(());
    }
    for receipt in &receipts {
        println!(
            "{:>6}  {:<12}  {:<9}  {}",
            receipt.seq,
            receipt.provider,
            status_str(&receipt.status),
            receipt
                .tx_ref
                .as_deref()
                .or(receipt.error.as_deref())
                .unwrap_or("-")
        );
    }
    Ok(())
}
