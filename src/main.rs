//! CLI entry point for `mailvault`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{ArgGroup, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailvault::config::{self, Config};
use mailvault::fetch::PrivilegedFetcher;
use mailvault::index::reader::{self as index_reader, ALL_MAILBOXES};
use mailvault::index::store::IndexStore;
use mailvault::index::update;
use mailvault::retention::{
    load_authoritative_contacts, PruneMode, PruneOutcome, PruneReport, ProtectionRules,
    RetentionPruner, Tier,
};
use mailvault::store::archive::ArchiveDir;
use mailvault::store::attachments::AttachmentStore;
use mailvault::sync::SyncEngine;

#[derive(Parser)]
#[command(name = "mailvault", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (overrides $MAILVAULT_CONFIG and the default location)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan all configured mailboxes and archive new messages
    Sync,
    /// Sync, then list unread messages oldest first
    Check {
        /// Do not sync before listing
        #[arg(long)]
        no_sync: bool,
    },
    /// Thin old archive files according to the retention tiers
    #[command(group(ArgGroup::new("mode").args(["dry_run", "execute", "summary"])))]
    Prune {
        /// Show what would be pruned without deleting (default)
        #[arg(long)]
        dry_run: bool,
        /// Delete files and update the index
        #[arg(long)]
        execute: bool,
        /// Print counts only, no file listings
        #[arg(long)]
        summary: bool,
    },
    /// List archived messages, newest first
    List {
        /// Mailbox label to show, or "all"
        #[arg(short, long, default_value = ALL_MAILBOXES)]
        mailbox: String,
        /// Only unread messages
        #[arg(short, long)]
        unread: bool,
        /// Maximum number of messages to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Print one message and mark it read
    Read {
        /// 12-character message ID
        id: String,
    },
    /// Set the read flag of a message
    Mark {
        id: String,
        /// Mark as unread instead
        #[arg(long)]
        unread: bool,
    },
    /// Update the action fields of a message
    Action {
        id: String,
        /// What needs doing
        #[arg(long)]
        todo: Option<String>,
        /// What was done
        #[arg(long)]
        taken: Option<String>,
    },
    /// Show index statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Write a default config file if none exists
    Init,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref());

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Sync => cmd_sync(&config),
        Commands::Check { no_sync } => cmd_check(&config, no_sync),
        Commands::Prune {
            dry_run: _,
            execute,
            summary,
        } => {
            let mode = if execute {
                PruneMode::Execute
            } else if summary {
                PruneMode::Summary
            } else {
                PruneMode::DryRun
            };
            cmd_prune(&config, mode)
        }
        Commands::List {
            mailbox,
            unread,
            limit,
        } => cmd_list(&config, &mailbox, unread, limit),
        Commands::Read { id } => cmd_read(&config, &id),
        Commands::Mark { id, unread } => cmd_mark(&config, &id, !unread),
        Commands::Action { id, todo, taken } => {
            cmd_action(&config, &id, todo.as_deref(), taken.as_deref())
        }
        Commands::Stats { json } => cmd_stats(&config, json),
        Commands::Init => cmd_init(&config, cli.config.as_deref()),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = config::cache_dir(config);
    let log_name = log_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "mailvault.log".into());

    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, log_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn index_store(config: &Config) -> IndexStore {
    IndexStore::new(config.paths.index_file())
}

fn archive_dir(config: &Config) -> ArchiveDir {
    ArchiveDir::new(&config.paths.archive_dir)
}

fn build_engine(config: &Config) -> SyncEngine {
    SyncEngine::new(
        config.mailboxes.clone(),
        Box::new(PrivilegedFetcher::from_config(&config.reader)),
        AttachmentStore::new(config.paths.attachments_dir()),
        archive_dir(config),
        index_store(config),
    )
}

/// Run one sync pass with a progress bar over the sources.
fn run_sync(config: &Config) -> anyhow::Result<mailvault::sync::SyncReport> {
    if config.mailboxes.is_empty() {
        tracing::warn!("No mailboxes configured; add [[mailboxes]] entries to the config file");
    }

    let engine = build_engine(config);
    let pb = ProgressBar::new(engine.sources().len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Syncing [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let report = engine.run(Some(&|done, _total, name: &str| {
        pb.set_position(done as u64);
        pb.set_message(name.to_string());
    }))?;

    pb.finish_and_clear();
    Ok(report)
}

fn cmd_sync(config: &Config) -> anyhow::Result<ExitCode> {
    let start = Instant::now();
    let report = run_sync(config)?;
    println!("{report}");
    tracing::info!(elapsed = ?start.elapsed(), "Sync command finished");
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(config: &Config, no_sync: bool) -> anyhow::Result<ExitCode> {
    let report = if no_sync {
        None
    } else {
        Some(run_sync(config)?)
    };
    if let Some(ref report) = report {
        if report.new_entries() > 0 || !report.errors.is_empty() {
            println!("{report}\n");
        }
    }

    let index = index_store(config).load()?;
    let unread = index_reader::unread(&index);
    if unread.is_empty() {
        println!("No unread emails.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} unread email(s):\n", unread.len());
    for (key, entry) in unread {
        println!("  [{key}] {}", entry.date);
        println!("    From: {}", entry.from);
        println!("    Subject: {}", entry.subject);
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_prune(config: &Config, mode: PruneMode) -> anyhow::Result<ExitCode> {
    let contacts = load_authoritative_contacts(config.paths.contacts_file.as_deref());
    let pruner = RetentionPruner::new(
        archive_dir(config),
        index_store(config),
        config.retention,
        ProtectionRules::standard(contacts),
    )?;

    let today = chrono::Local::now().date_naive();
    println!("Email Archive Pruner - {today}");
    println!("Archive dir : {}", config.paths.archive_dir.display());
    println!(
        "Mode        : {}",
        if mode.deletes() { "EXECUTE" } else { "DRY-RUN" }
    );
    println!();

    let (report, outcome) = pruner.run(today, mode)?;
    print_prune_report(&report, mode == PruneMode::Summary);

    let c = &report.classification;
    if c.prune.is_empty() {
        println!();
        println!("Nothing to prune: all files are within retention policy.");
        return Ok(ExitCode::SUCCESS);
    }

    let Some(outcome) = outcome else {
        println!();
        println!("=== DRY-RUN: No files were deleted. ===");
        println!("Run with --execute to apply pruning.");
        return Ok(ExitCode::SUCCESS);
    };

    print_prune_outcome(&outcome);

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_prune_report(report: &PruneReport, summary_only: bool) {
    use humansize::{format_size, BINARY};

    let c = &report.classification;
    println!("  {:<25} {}", "Index entries", report.index_entries);
    println!("  {:<25} {}", "Email files", report.files_scanned);
    println!();
    println!("=== Classification Results ===");
    println!("  {:<25} {}", "Keep (within retention)", c.keep.len());
    println!("  {:<25} {}", "Protected (special rules)", c.protected.len());
    println!("  {:<25} {}", "Unknown (no date in name)", c.unknown.len());
    println!("  {:<25} {}", "PRUNE", c.prune.len());
    println!("  {:<25} {}", "Total classified", c.total());
    if !c.prune.is_empty() {
        println!(
            "  {:<25} {}",
            "Estimated space freed",
            format_size(report.bytes_freed(), BINARY)
        );
    }

    println!();
    println!("  Files per tier:");
    for (tier, label) in [
        (Tier::KeepAll, "recent"),
        (Tier::Full, "full retention"),
        (Tier::Daily, "one per day"),
        (Tier::Weekly, "one per week"),
    ] {
        let count = c.tier_counts.get(&tier).copied().unwrap_or(0);
        println!("    {count:>6}  {label}");
    }

    if !summary_only && !c.prune.is_empty() {
        println!();
        println!("=== Files to prune ({}) ===", c.prune.len());
        let mut names: Vec<&String> = c.prune.iter().collect();
        names.sort();
        for name in names {
            let size = report
                .prune_sizes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, s)| *s)
                .unwrap_or(0);
            println!("  {name}  ({size} bytes)");
        }
    }

    if !summary_only && !c.protected.is_empty() {
        println!();
        println!("=== Protected files ({}) ===", c.protected.len());
        for (name, reason) in &c.protected {
            println!("  {name}  [{reason}]");
        }
    }

    if !summary_only && !c.unknown.is_empty() {
        println!();
        println!(
            "=== Files with unparseable dates (kept) ({}) ===",
            c.unknown.len()
        );
        for name in &c.unknown {
            println!("  {name}");
        }
    }
}

fn print_prune_outcome(outcome: &PruneOutcome) {
    use humansize::{format_size, BINARY};

    println!();
    println!("=== Done ===");
    for (name, error) in &outcome.failed {
        println!("  ERROR deleting {name}: {error}");
    }
    println!("  {:<25} {}", "Deleted", outcome.deleted.len());
    println!("  {:<25} {}", "Missing (skipped)", outcome.missing.len());
    println!("  {:<25} {}", "Failed", outcome.failed.len());
    println!("  {:<25} {}", "Index entries removed", outcome.index_removed);
    println!("  {:<25} {}", "Index entries remaining", outcome.index_remaining);
    println!(
        "  {:<25} {}",
        "Space freed",
        format_size(outcome.bytes_freed, BINARY)
    );
}

fn cmd_list(
    config: &Config,
    mailbox: &str,
    only_unread: bool,
    limit: usize,
) -> anyhow::Result<ExitCode> {
    let index = index_store(config).load()?;
    if index.is_empty() {
        println!("No emails in index. Run `mailvault sync` first.");
        return Ok(ExitCode::SUCCESS);
    }

    let listing = index_reader::list_entries(&index, mailbox, only_unread, limit);
    if listing.entries.is_empty() {
        println!("No emails match filters (mailbox={mailbox}, only_unread={only_unread}).");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "Showing {} of {} emails (total in index: {}):\n",
        listing.entries.len(),
        listing.matched,
        index.len()
    );
    for (key, entry) in &listing.entries {
        let marker = if entry.read { ' ' } else { '*' };
        let attachments = if entry.has_attachments() {
            format!(" [+{} attachment(s)]", entry.attachments.len())
        } else {
            String::new()
        };
        println!("  {marker} [{key}] {}", entry.date);
        println!("    From: {} | To: {}", entry.from, entry.to);
        println!("    Subject: {}{attachments}", entry.subject);
        println!("    Mailbox: {}", entry.mailbox);
        if !entry.action_todo.is_empty() {
            println!("    Action TODO: {}", entry.action_todo);
        }
        if !entry.action_taken.is_empty() {
            println!("    Action Taken: {}", entry.action_taken);
        }
        println!();
    }
    println!("(* = unread)");
    Ok(ExitCode::SUCCESS)
}

fn cmd_read(config: &Config, id: &str) -> anyhow::Result<ExitCode> {
    let text = update::read_email(&index_store(config), &archive_dir(config), id)?;
    print!("{text}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_mark(config: &Config, id: &str, read: bool) -> anyhow::Result<ExitCode> {
    let entry = update::mark_email(&index_store(config), id, read)?;
    let status = if read { "read" } else { "unread" };
    println!("Email [{id}] '{}' marked as {status}.", entry.subject);
    Ok(ExitCode::SUCCESS)
}

fn cmd_action(
    config: &Config,
    id: &str,
    todo: Option<&str>,
    taken: Option<&str>,
) -> anyhow::Result<ExitCode> {
    let entry = update::update_action(&index_store(config), id, todo, taken)?;
    println!("Email [{id}] '{}' action fields updated:", entry.subject);
    if let Some(todo) = todo {
        println!("  action_todo: {todo}");
    }
    if let Some(taken) = taken {
        println!("  action_taken: {taken}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Show index statistics.
fn cmd_stats(config: &Config, json: bool) -> anyhow::Result<ExitCode> {
    use humansize::{format_size, BINARY};

    let store = index_store(config);
    let index = store.load()?;
    let stats = index_reader::stats(&index);
    let index_size = std::fs::metadata(store.path()).map(|m| m.len()).unwrap_or(0);
    let range = index_reader::date_range(&index);
    let top = index_reader::top_senders(&index, 10);

    if json {
        let top_json: Vec<serde_json::Value> = top
            .iter()
            .map(|(sender, count)| {
                serde_json::json!({
                    "sender": sender,
                    "count": count,
                })
            })
            .collect();
        let output = serde_json::json!({
            "index": store.path().to_string_lossy(),
            "index_size": index_size,
            "total": stats.total,
            "unread": stats.unread,
            "with_attachments": stats.with_attachments,
            "per_mailbox": stats.per_mailbox,
            "date_range": range.map(|(min, max)| serde_json::json!({
                "oldest": min.to_rfc3339(),
                "newest": max.to_rfc3339(),
            })),
            "top_senders": top_json,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!();
    println!("  {:<20} {}", "Index", store.path().display());
    println!("  {:<20} {}", "Index size", format_size(index_size, BINARY));
    println!("  {:<20} {}", "Messages", stats.total);
    println!("  {:<20} {}", "Unread", stats.unread);
    println!(
        "  {:<20} {} ({:.1}%)",
        "With attachments",
        stats.with_attachments,
        if stats.total == 0 {
            0.0
        } else {
            stats.with_attachments as f64 / stats.total as f64 * 100.0
        }
    );
    if let Some((min, max)) = range {
        println!(
            "  {:<20} {} - {}",
            "Date range",
            min.format("%Y-%m-%d"),
            max.format("%Y-%m-%d")
        );
    }

    if !stats.per_mailbox.is_empty() {
        println!();
        println!("  Mailboxes:");
        for (mailbox, count) in &stats.per_mailbox {
            println!("    {count:>6}  {mailbox}");
        }
    }

    if !top.is_empty() {
        println!();
        println!("  Top senders:");
        for (sender, count) in &top {
            println!("    {count:>6}  {sender}");
        }
    }
    println!();
    Ok(ExitCode::SUCCESS)
}

fn cmd_init(config: &Config, explicit: Option<&Path>) -> anyhow::Result<ExitCode> {
    let path = config::resolve_config_path(explicit)
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    if path.exists() {
        println!("Config already exists: {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }
    config::save_config(config, &path)?;
    println!("Wrote {}", path.display());
    Ok(ExitCode::SUCCESS)
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<ExitCode> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailvault", &mut std::io::stdout());
    Ok(ExitCode::SUCCESS)
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<ExitCode> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(ExitCode::SUCCESS)
}
