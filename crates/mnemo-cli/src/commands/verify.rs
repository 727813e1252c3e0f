//! `mnemo verify` command.

use anyhow::Result;
use clap::Args;
use mnemo_chain::ChainError;
use mnemo_chain::verify::verify_chain_dir;

use crate::opts::{ChainOpts, resolve_chain_dir};
use crate::output::emit;

#[derive(Args, Debug)]
pub struct VerifyArgs {}

pub fn cmd_verify(opts: &ChainOpts, _args: &VerifyArgs) -> Result<()> {
    // Verification only needs agent.pub, so it works without the writer key
    // and never touches the journal.
    let dir = resolve_chain_dir(opts)?;
    let report = verify_chain_dir(&dir)?;
    if report.ok {
        return emit(
            opts,
            &report,
            Some(format!("ok: {} entries verified", report.entries)),
        );
    }
    let failure = report
        .failure
        .expect("failing reports carry their first failure");
    println!(
        "verify: seq={} invariant={} anomalies={}",
        failure.seq, failure.invariant, report.anomalies
    );
    Err(ChainError::VerifyFailed {
        seq: failure.seq,
        invariant: failure.invariant,
    }
    .into())
}
