//! `mnemo anchor` command.

use anyhow::Result;
use clap::Args;

use crate::opts::{ChainOpts, open_chain};
use crate::output::emit;

#[derive(Args, Debug)]
pub struct AnchorArgs {
    /// Anchor backend tag
    #[arg(long, required = true)]
    pub provider: String,

    /// Anchor this seq instead of the current head
    #[arg(long)]
    pub seq: Option<u64>,

    /// Report the backend's fee estimate instead of submitting
    #[arg(long)]
    pub estimate: bool,

    /// Number of anchors to estimate for (with --estimate)
    #[arg(long, default_value_t = 1)]
    pub count: u64,
}

pub fn cmd_anchor(opts: &ChainOpts, args: &AnchorArgs) -> Result<()> {
    let mut chain = open_chain(opts)?;
    if args.estimate {
        let estimate = chain.estimate_anchor_cost(&args.provider, args.count)?;
        return emit(
            opts,
            &estimate,
            Some(format!(
                "estimated fee for {} anchor(s) via {}: {} (available: {})",
                args.count, args.provider, estimate.fee, estimate.available
            )),
        );
    }
    let receipt = chain.anchor(&args.provider, args.seq)?;
    emit(
        opts,
        &receipt,
        Some(format!(
            "anchor submitted: provider={} seq={} status={}",
            receipt.provider,
            receipt.seq,
            status_str(&receipt.status)
        )),
    )
}

pub(crate) fn status_str(status: &mnemo_chain::ReceiptStatus) -> &'static str {
    match status {
        mnemo_chain::ReceiptStatus::Pending => "pending",
        mnemo_chain::ReceiptStatus::Confirmed => "confirmed",
        mnemo_chain::ReceiptStatus::Failed => "failed",
    }
}
