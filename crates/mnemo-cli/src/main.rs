mod commands;
mod opts;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mnemo_chain::ChainError;
use tracing_subscriber::EnvFilter;

use commands::add::AddArgs;
use commands::anchor::AnchorArgs;
use commands::anchor_status::AnchorStatusArgs;
use commands::block_set::BlockSetArgs;
use commands::export::ExportArgs;
use commands::init::InitArgs;
use commands::introspect::IntrospectArgs;
use commands::recall::RecallArgs;
use commands::rebuild::RebuildArgs;
use commands::redact::RedactArgs;
use commands::rethink::RethinkArgs;
use commands::stats::StatsArgs;
use commands::verify::VerifyArgs;
use opts::ChainOpts;

#[derive(Parser, Debug)]
#[command(name = "mnemo", version, about = "Verifiable memory chain CLI")]
struct Cli {
    #[command(flatten)]
    opts: ChainOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a chain directory and writer keypair
    Init(InitArgs),

    /// Commit a new memory entry
    Add(AddArgs),

    /// Retrieve ranked matches for a query
    Recall(RecallArgs),

    /// Consolidate prior entries under a new understanding
    Rethink(RethinkArgs),

    /// Set a labeled core-context block
    BlockSet(BlockSetArgs),

    /// Destroy an entry's payload while keeping its signed header
    Redact(RedactArgs),

    /// Show the composite view of one entry
    Introspect(IntrospectArgs),

    /// Verify every chain invariant
    Verify(VerifyArgs),

    /// Rebuild the index from the journal
    Rebuild(RebuildArgs),

    /// Submit the chain head (or one entry) to an anchor backend
    Anchor(AnchorArgs),

    /// List anchor receipts
    AnchorStatus(AnchorStatusArgs),

    /// Stream all entries
    Export(ExportArgs),

    /// Head seq and counts by kind, tier, and decay
    Stats(StatsArgs),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let (tag, code) = classify(&err);
            eprintln!("error[{tag}]: {err:#}");
            ExitCode::from(code)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let opts = &cli.opts;
    match &cli.command {
        Command::Init(args) => commands::init::cmd_init(opts, args),
        Command::Add(args) => commands::add::cmd_add(opts, args),
        Command::Recall(args) => commands::recall::cmd_recall(opts, args),
        Command::Rethink(args) => commands::rethink::cmd_rethink(opts, args),
        Command::BlockSet(args) => commands::block_set::cmd_block_set(opts, args),
        Command::Redact(args) => commands::redact::cmd_redact(opts, args),
        Command::Introspect(args) => commands::introspect::cmd_introspect(opts, args),
        Command::Verify(args) => commands::verify::cmd_verify(opts, args),
        Command::Rebuild(args) => commands::rebuild::cmd_rebuild(opts, args),
        Command::Anchor(args) => commands::anchor::cmd_anchor(opts, args),
        Command::AnchorStatus(args) => commands::anchor_status::cmd_anchor_status(opts, args),
        Command::Export(args) => commands::export::cmd_export(opts, args),
        Command::Stats(args) => commands::stats::cmd_stats(opts, args),
    }
}

/// Map a failure onto its stable tag and exit code. Exit codes are part of
/// the CLI contract; do not renumber.
fn classify(err: &anyhow::Error) -> (&'static str, u8) {
    match err.downcast_ref::<ChainError>() {
        Some(chain_err) => {
            let tag = chain_err.kind();
            (tag, exit_code(tag))
        }
        None => ("error", 1),
    }
}

fn exit_code(tag: &str) -> u8 {
    match tag {
        "invalid_input" => 2,
        "unknown_seq" => 3,
        "cyclic_supersede" => 4,
        "write_locked" => 5,
        "signature_failed" => 6,
        "verify_failed" => 7,
        "io" => 8,
        "corrupt" => 9,
        "backend_unavailable" => 10,
        "backend_timeout" => 11,
        "conflict" => 12,
        _ => 1,
    }
}
