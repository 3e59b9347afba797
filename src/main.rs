mod config;
mod discovery;
mod pipeline;
mod report;
mod store;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};

use config::Settings;
use pipeline::dispatcher::{self, ChunkOutcome};
use pipeline::parser;
use store::Store;

/// Operator-facing timestamp format for report windows.
const OPERATOR_TS_FORMAT: &str = "%Y-%m-%d-%H.%M.%S";

#[derive(Parser)]
#[command(name = "lagtrace", version, about = "Pub/sub latency trace ingestion and reporting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse log files and insert trace records into the store
    Ingest {
        /// SQLite DB path (default: ./lagtrace.db)
        #[arg(long, env = "LAGTRACE_DB")]
        db: Option<PathBuf>,

        /// Directory of log files to scan
        #[arg(long)]
        logs: Option<PathBuf>,

        /// Destination table
        #[arg(long)]
        table: Option<String>,

        /// Insert without committing per chunk
        #[arg(long)]
        no_commit: bool,
    },

    /// Aggregate a time window into a per-second percentile CSV report
    Report {
        /// Window start, e.g. 2026-01-05-10.00.00
        start: String,

        /// Window end, same format
        end: String,

        /// SQLite DB path (default: ./lagtrace.db)
        #[arg(long, env = "LAGTRACE_DB")]
        db: Option<PathBuf>,

        /// Output directory for the CSV report
        #[arg(long)]
        out: Option<PathBuf>,

        /// Source table
        #[arg(long)]
        table: Option<String>,
    },

    /// Parse one log file and report record counts (dev/validation tool)
    Parse {
        /// Path to a trace log file
        path: PathBuf,

        /// Print parsed records
        #[arg(long)]
        dump: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lagtrace=info".parse()?),
        )
        .init();

    // Cooperative shutdown: the ingest loop checks this flag between
    // chunks and files, commits what it has, and exits.
    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&stop))?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest {
            db,
            logs,
            table,
            no_commit,
        } => {
            let settings = Settings::default().with_overrides(
                db.as_deref(),
                logs.as_deref(),
                None,
                table.as_deref(),
            );
            cmd_ingest(&settings, !no_commit, &stop)
        }
        Commands::Report {
            start,
            end,
            db,
            out,
            table,
        } => {
            let settings = Settings::default().with_overrides(
                db.as_deref(),
                None,
                out.as_deref(),
                table.as_deref(),
            );
            cmd_report(&settings, &start, &end)
        }
        Commands::Parse { path, dump } => cmd_parse(&path, dump),
    }
}

// ---------------------------------------------------------------------------
// ingest subcommand
// ---------------------------------------------------------------------------

fn cmd_ingest(settings: &Settings, commit: bool, stop: &AtomicBool) -> anyhow::Result<()> {
    let store = Store::open(&settings.db_path)?;
    tracing::info!(
        "Ingesting into {:?} (statement ceiling {} bytes)",
        settings.table,
        store.max_allowed_packet(),
    );

    let files = discovery::discover_log_files(&settings.logs_dir);
    if files.is_empty() {
        tracing::warn!("No log files under {}", settings.logs_dir.display());
        return Ok(());
    }

    let mut total_inserts = 0usize;
    for path in &files {
        if stop.load(Ordering::Relaxed) {
            tracing::info!("Quit log submission on interrupt");
            break;
        }

        tracing::info!("Analyzing log file: {}", path.display());
        let lines = discovery::read_trace_lines(path)?;

        let mut records = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            // First bad line aborts the run — a corrupt file must not
            // half-ingest silently.
            let record = parser::parse_line(line)
                .with_context(|| format!("{}: trace line {}", path.display(), i + 1))?;
            records.push(record);
        }

        if records.is_empty() {
            tracing::info!("No trace lines in {}", path.display());
            continue;
        }

        let outcomes = dispatcher::dispatch(
            &store,
            &settings.table,
            &records,
            store.max_allowed_packet(),
            commit,
            stop,
        )?;

        let inserted = dispatcher::inserted_rows(&outcomes);
        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, ChunkOutcome::Skipped { .. }))
            .count();
        if skipped > 0 {
            tracing::warn!("{} chunk(s) skipped for {}", skipped, path.display());
        }
        tracing::info!(
            "Done log {} submission. Total inserts: {}",
            path.display(),
            inserted,
        );
        total_inserts += inserted;
    }

    // Interrupt or not, whatever was staged gets committed before exit.
    store.commit()?;
    tracing::info!("Ingest finished: {} rows across {} files", total_inserts, files.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// report subcommand
// ---------------------------------------------------------------------------

fn cmd_report(settings: &Settings, start_raw: &str, end_raw: &str) -> anyhow::Result<()> {
    let start = parse_operator_ts(start_raw)?;
    let end = parse_operator_ts(end_raw)?;
    anyhow::ensure!(start <= end, "window start {} is after end {}", start_raw, end_raw);

    let store = Store::open(&settings.db_path)?;

    // Sanity pass over the inclusive range; violations warn, never block.
    let uniq = report::check_unique(&store, &settings.table, start, end)?;
    if uniq.passed() {
        tracing::info!("Uniqueness checklist successful");
    } else {
        tracing::warn!("Uniqueness checklist failed, aggregating anyway");
    }

    let rows = report::aggregate(&store, &settings.table, start, end)?;

    std::fs::create_dir_all(&settings.out_dir)
        .with_context(|| format!("creating {}", settings.out_dir.display()))?;
    let out_path = settings
        .out_dir
        .join(format!("query_result-{}-{}.csv", start_raw, end_raw));
    report::write_report(&out_path, &rows)?;

    tracing::info!("Wrote {} rows to {}", rows.len(), out_path.display());
    Ok(())
}

fn parse_operator_ts(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, OPERATOR_TS_FORMAT)
        .with_context(|| format!("bad timestamp {:?}, expected {}", raw, OPERATOR_TS_FORMAT))?;
    Ok(naive.and_utc())
}

// ---------------------------------------------------------------------------
// parse subcommand
// ---------------------------------------------------------------------------

fn cmd_parse(path: &std::path::Path, dump: bool) -> anyhow::Result<()> {
    let lines = discovery::read_trace_lines(path)?;

    let mut records = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let record = parser::parse_line(line)
            .with_context(|| format!("{}: trace line {}", path.display(), i + 1))?;
        records.push(record);
    }

    println!("{}: {} trace records", path.display(), records.len());
    if dump {
        for record in &records {
            println!("{:?}", record);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_operator_ts() {
        let ts = parse_operator_ts("2026-01-05-10.00.30").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 30).unwrap());
    }

    #[test]
    fn test_parse_operator_ts_rejects_garbage() {
        assert!(parse_operator_ts("2026/01/05 10:00:30").is_err());
    }

    #[test]
    fn test_ingest_then_report_end_to_end() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        std::fs::create_dir_all(&logs).unwrap();

        // Two trace lines in consecutive seconds, plus chatter the
        // payload filter must drop
        let mut f = std::fs::File::create(logs.join("consumer.log.0")).unwrap();
        writeln!(f, "consumer started").unwrap();
        writeln!(
            f,
            "DEBUG:root:c1|2026-01-05T10:00:00.200000+00:00|2026-01-05T10:00:00.000000+00:00|t-1|ns|msg-1|payload-xx|ph|sh"
        )
        .unwrap();
        writeln!(
            f,
            "DEBUG:root:c2|2026-01-05T10:00:01.400000+00:00|2026-01-05T10:00:01.000000+00:00|t-1|ns|msg-2|payload-xx|ph|sh"
        )
        .unwrap();
        drop(f);

        let settings = Settings::default().with_overrides(
            Some(&dir.path().join("traces.db")),
            Some(&logs),
            Some(&dir.path().join("result")),
            None,
        );

        cmd_ingest(&settings, true, &AtomicBool::new(false)).unwrap();
        cmd_report(&settings, "2026-01-05-10.00.00", "2026-01-05-10.00.02").unwrap();

        let csv = std::fs::read_to_string(
            dir.path()
                .join("result/query_result-2026-01-05-10.00.00-2026-01-05-10.00.02.csv"),
        )
        .unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "TIMESTAMP,TPS,P50(ms),P99(ms)");
        assert_eq!(lines.len(), 3);
        // One record per bucket; 200ms and 400ms latencies in ms
        assert_eq!(lines[1], "2026-01-05 10:00:00,1,200,200");
        assert_eq!(lines[2], "2026-01-05 10:00:01,1,400,400");
    }
}
