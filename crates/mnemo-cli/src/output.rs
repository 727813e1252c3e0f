//! Shared output helpers: primary data to stdout, JSON on request.

use anyhow::Result;
use serde::Serialize;

use crate::opts::ChainOpts;

/// Print `value` as pretty JSON in `--json` mode; otherwise print the human
/// line, falling back to JSON when no human rendering exists.
pub fn emit<T: Serialize>(opts: &ChainOpts, value: &T, human: Option<String>) -> Result<()> {
    if opts.json {
        println!("{}", serde_json::to_string_pretty(value)?);
        return Ok(());
    }
    match human {
        Some(line) => println!("{line}"),
        None => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
