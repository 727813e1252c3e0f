//! `mnemo redact` command.

use anyhow::Result;
use clap::Args;

use crate::opts::{ChainOpts, open_chain};
use crate::output::emit;

#[derive(Args, Debug)]
pub struct RedactArgs {
    /// Seq of the entry whose payload is destroyed
    pub seq: u64,

    /// Reason recorded in the redaction entry
    #[arg(long)]
    pub reason: Option<String>,
}

pub fn cmd_redact(opts: &ChainOpts, args: &RedactArgs) -> Result<()> {
    let mut chain = open_chain(opts)?;
    let outcome = chain.redact(args.seq, args.reason.clone())?;
    emit(
        opts,
        &outcome,
        Some(format!(
            "redacted seq {} (redaction entry {})",
            outcome.redacted_seq, outcome.redaction_seq
        )),
    )
}
