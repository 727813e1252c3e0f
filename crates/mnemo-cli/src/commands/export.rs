//! `mnemo export` command.

use anyhow::Result;
use clap::{Args, ValueEnum};

use crate::opts::{ChainOpts, open_chain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
    pub format: ExportFormat,
}

pub fn cmd_export(opts: &ChainOpts, args: &ExportArgs) -> Result<()> {
    let chain = open_chain(opts)?;
    let records = chain.export()?;
    match args.format {
        ExportFormat::Json => {
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
        }
        ExportFormat::Markdown => {
            for record in &records {
                println!(
                    "## seq {} [{} / {}]\n",
                    record.entry.seq, record.entry.entry_kind, record.entry.tier
                );
                println!("{}\n", record.content);
            }
        }
    }
    Ok(())
}
