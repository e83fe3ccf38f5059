use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;

use ncl_ledger::ConsentLedger;
use ncl_server::{ConsentServer, ServerConfig};
use ncl_store::{LedgerStore, RecoveryMode};
use ncl_types::{ConsentRecord, Timestamp};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Set(args) => cmd_set(&config, format, args),
        Command::Status(args) => cmd_status(&config, format, args),
        Command::History(args) => cmd_history(&config, format, args),
        Command::Verify(args) => cmd_verify(&config, format, args),
        Command::Replay(args) => cmd_replay(config, format, args),
        Command::Serve(args) => cmd_serve(config, args),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    debug!(data_dir = %config.data_dir.display(), ledger = %config.ledger_name, "configuration loaded");
    Ok(config)
}

fn open_ledger(config: &ServerConfig) -> anyhow::Result<ConsentLedger> {
    let ledger = ConsentLedger::open(&config.data_dir, config.store.clone(), config.bus.clone())
        .with_context(|| format!("failed to open ledger in {}", config.data_dir.display()))?;
    Ok(ledger.with_name(config.ledger_name.clone()))
}

fn label(status: bool) -> colored::ColoredString {
    if status {
        "granted".green().bold()
    } else {
        "revoked".red().bold()
    }
}

fn record_json(record: &ConsentRecord) -> serde_json::Value {
    json!({
        "sequence": record.sequence,
        "status": record.status,
        "timestamp": record.timestamp.as_unix_secs(),
        "time": record.timestamp.to_rfc3339(),
        "record_hash": record.record_hash.to_hex(),
        "prev_hash": record.prev_hash.map(|h| h.to_hex()),
    })
}

fn cmd_set(config: &ServerConfig, format: OutputFormat, args: SetArgs) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let status = args.decision.status();
    let timestamp = args.at.map_or_else(Timestamp::now, Timestamp::from_unix_secs);
    let receipt = ledger.set_consent_at(&args.subject, status, timestamp)?;
    ledger.close()?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "subject": args.subject,
                "status": status,
                "sequence": receipt.sequence,
                "record_hash": receipt.record_hash.to_hex(),
                "timestamp": receipt.timestamp.as_unix_secs(),
            })
        ),
        OutputFormat::Text => {
            println!("{} {} {}", "✓".green().bold(), args.subject.bold(), label(status));
            println!("  Sequence: {}", receipt.sequence.to_string().yellow());
            println!("  Hash: {}", receipt.record_hash.to_hex().dimmed());
            println!("  Time: {}", receipt.timestamp);
        }
    }
    Ok(())
}

fn cmd_status(config: &ServerConfig, format: OutputFormat, args: SubjectArgs) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let status = ledger.get_status(&args.subject);
    let count = ledger.get_history_count(&args.subject);
    let latest = ledger.latest(&args.subject);
    ledger.close()?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "subject": args.subject,
                "status": status,
                "history_count": count,
                "last_sequence": latest.map(|r| r.sequence),
            })
        ),
        OutputFormat::Text => match latest {
            Some(record) => println!(
                "{}: {} as of {} ({} records)",
                args.subject.bold(),
                label(status),
                format!("#{}", record.sequence).yellow(),
                count
            ),
            None => println!("{}: {} (no records)", args.subject.bold(), "not granted".red()),
        },
    }
    Ok(())
}

fn cmd_history(config: &ServerConfig, format: OutputFormat, args: SubjectArgs) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let records: Vec<ConsentRecord> = ledger.get_history(&args.subject).collect();
    ledger.close()?;

    match format {
        OutputFormat::Json => {
            let records: Vec<_> = records.iter().map(record_json).collect();
            println!("{}", json!({ "subject": args.subject, "records": records }));
        }
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No records for {}.", args.subject.bold());
            }
            for record in &records {
                println!(
                    "{}  {}  {}  {}",
                    format!("#{}", record.sequence).yellow().bold(),
                    label(record.status),
                    record.timestamp.to_string().dimmed(),
                    record.record_hash.short_hex().dimmed()
                );
            }
        }
    }
    Ok(())
}

fn cmd_verify(config: &ServerConfig, format: OutputFormat, args: VerifyArgs) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let reports = match &args.subject {
        Some(subject) => vec![ledger.verify(subject)?],
        None => ledger.verify_all(),
    };
    ledger.close()?;

    let failed = reports.iter().filter(|r| !r.is_valid()).count();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            for report in &reports {
                if report.is_valid() {
                    println!(
                        "{} {} ({} records)",
                        "✓".green().bold(),
                        report.subject.as_str().bold(),
                        report.record_count
                    );
                } else {
                    println!("{} {}", "✗".red().bold(), report.subject.as_str().bold());
                    for violation in &report.violations {
                        println!(
                            "  {} {:?}: {}",
                            format!("#{}", violation.sequence).yellow(),
                            violation.kind,
                            violation.description
                        );
                    }
                }
            }
            if reports.is_empty() {
                println!("No records to verify.");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} subject(s) failed verification");
    }
    Ok(())
}

fn cmd_replay(mut config: ServerConfig, format: OutputFormat, args: ReplayArgs) -> anyhow::Result<()> {
    if args.lenient {
        config.store.recovery = RecoveryMode::Lenient;
    }
    let store = LedgerStore::open(&config.data_dir, config.store.clone())
        .with_context(|| format!("replay of {} failed", config.data_dir.display()))?;
    let report = store.recovery_report().clone();
    let violations: usize = store.verify_all().iter().map(|r| r.violations.len()).sum();
    let subjects = store.subject_count();
    let records = store.total_records();
    let last_sequence = store.last_sequence();
    store.close()?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "recovery": report,
                "subjects": subjects,
                "records": records,
                "last_sequence": last_sequence,
                "chain_violations": violations,
            })
        ),
        OutputFormat::Text => {
            let mark = if report.is_clean() && violations == 0 {
                "✓".green().bold()
            } else {
                "!".yellow().bold()
            };
            println!("{mark} Replay complete.");
            println!("  Records: {records} across {subjects} subjects");
            println!("  Last sequence: {last_sequence}");
            if !report.is_clean() {
                println!("  Skipped entries: {}", report.skipped_entries);
                println!("  Dropped entries: {}", report.dropped_entries);
                println!("  Truncated bytes: {}", report.truncated_bytes);
                println!("  Unverified records: {}", report.unverified_records);
            }
            if violations > 0 {
                println!("  Chain violations: {}", violations.to_string().red());
            }
        }
    }
    Ok(())
}

fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    println!(
        "NCL server on {} (data: {})",
        config.bind_addr.to_string().bold(),
        config.data_dir.display()
    );
    let server = ConsentServer::new(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}
