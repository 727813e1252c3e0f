//! `mnemo add` command.

use anyhow::Result;
use clap::Args;
use mnemo_chain::ops::CommitRequest;
use mnemo_chain::{ChainError, EntryKind, Links, Provenance, ProvenanceSource, Tier};

use crate::opts::{ChainOpts, open_chain};
use crate::output::emit;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Content to remember
    pub content: String,

    /// Entry kind (memory, identity, decision)
    #[arg(long, default_value = "memory")]
    pub kind: String,

    /// Storage tier (committed, relationship, ephemeral)
    #[arg(long, default_value = "ephemeral")]
    pub tier: String,

    /// Importance in [0.0, 1.0]
    #[arg(long, default_value_t = 0.5)]
    pub importance: f64,

    /// What prompted this memory
    #[arg(long)]
    pub trigger: Option<String>,

    /// Mark as core memory, always offered to context assemblers
    #[arg(long)]
    pub core: bool,
}

pub fn cmd_add(opts: &ChainOpts, args: &AddArgs) -> Result<()> {
    let kind: EntryKind = args
        .kind
        .parse()
        .map_err(|e: mnemo_chain::entry::EnumParseError| ChainError::InvalidInput(e.to_string()))?;
    let tier: Tier = args
        .tier
        .parse()
        .map_err(|e: mnemo_chain::entry::EnumParseError| ChainError::InvalidInput(e.to_string()))?;

    let mut chain = open_chain(opts)?;
    let receipt = chain.commit(CommitRequest {
        entry_kind: kind,
        tier,
        provenance: Provenance {
            source: ProvenanceSource::Manual,
            trigger: args.trigger.clone(),
            importance: args.importance,
            emotion_tag: None,
        },
        links: Links {
            is_core: args.core,
            ..Links::default()
        },
        ..CommitRequest::new(args.content.clone())
    })?;

    emit(
        opts,
        &receipt,
        Some(format!(
            "committed seq {} ({})",
            receipt.seq, receipt.content_hash
        )),
    )
}
