//! `mnemo introspect` command.

use anyhow::Result;
use clap::Args;

use crate::opts::{ChainOpts, open_chain};
use crate::output::emit;

#[derive(Args, Debug)]
pub struct IntrospectArgs {
    /// Seq to inspect
    pub seq: u64,
}

pub fn cmd_introspect(opts: &ChainOpts, args: &IntrospectArgs) -> Result<()> {
    let chain = open_chain(opts)?;
    let view = chain.introspect(args.seq)?;
    emit(opts, &view, None)
}
