use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use rgclog::model::{CauseStatistics, EventDetailFilter, GCModel, PhaseStatistics};
use rgclog::util::{known_double, known_int};

/// GC log analyzer.
#[derive(Parser)]
#[command(name = "rgclog", about = "Analyze JVM garbage-collection logs", version)]
struct Args {
    /// Path to the GC log file.
    log: PathBuf,

    /// Output the full report as JSON.
    #[arg(long)]
    json: bool,

    /// Print up to N per-event detail lines after the report.
    #[arg(long, value_name = "N", default_value = "0")]
    details: usize,

    /// Only show details of events pausing at least this many milliseconds.
    #[arg(long, value_name = "MS")]
    min_pause: Option<f64>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode, errors only.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let model = match analyze(&args.log) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("{}: {e}", args.log.display());
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        let report = Report::from_model(&model);
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("failed to serialize report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report(&model);
    }

    if args.details > 0 {
        let filter = EventDetailFilter {
            min_pause: args.min_pause,
            ..EventDetailFilter::default()
        };
        let (total, lines) = model.event_details(&filter, 0, args.details);
        println!();
        println!("Events ({} matching, showing {}):", total, lines.len());
        for line in lines {
            println!("  {line}");
        }
    }
    ExitCode::SUCCESS
}

fn analyze(path: &PathBuf) -> Result<GCModel, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let mut model = rgclog::parser::parse_log(BufReader::new(file))?;
    model.calculate_derived_info()?;
    info!(
        collector = model.collector().name(),
        events = model.gc_events().len(),
        "log parsed"
    );
    Ok(model)
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is WARN; -v raises to debug, -q drops to errors only.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("rgclog={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ============================================================
// JSON report
// ============================================================

#[derive(Serialize)]
struct Report<'a> {
    basic_info: Option<&'a rgclog::model::BasicInfo>,
    kpis: std::collections::BTreeMap<&'static str, f64>,
    cause_statistics: &'a [CauseStatistics],
    phase_statistics: &'a [PhaseStatistics],
    diagnosis: Option<&'a rgclog::diagnoser::GlobalDiagnoseInfo>,
}

impl<'a> Report<'a> {
    fn from_model(model: &'a GCModel) -> Self {
        Self {
            basic_info: model.basic_info(),
            kpis: model.kpi_summary(),
            cause_statistics: model.cause_statistics(),
            phase_statistics: model.phase_statistics(),
            diagnosis: model.diagnosis(),
        }
    }
}

// ============================================================
// Human-readable report
// ============================================================

fn print_report(model: &GCModel) {
    if let Some(info) = model.basic_info() {
        println!("Collector:      {}", info.collector);
        println!("Log style:      {:?}", info.log_style);
        println!("Log duration:   {}", fmt_ms(info.duration));
        println!("Heap size:      {}", fmt_bytes(info.heap_size));
        println!("Young gen:      {}", fmt_bytes(info.young_gen_size));
        println!("Old gen:        {}", fmt_bytes(info.old_gen_size));
        println!("Metaspace:      {}", fmt_bytes(info.metaspace_size));
    }

    println!();
    println!("KPIs:");
    for (name, value) in model.kpi_summary() {
        if known_double(value) {
            println!("  {name}: {value:.3}");
        }
    }

    if !model.cause_statistics().is_empty() {
        println!();
        println!("Causes:");
        for c in model.cause_statistics() {
            println!(
                "  {:<30} count {:<5} avg {:<10} max {}",
                c.cause,
                c.count,
                fmt_ms(c.avg_pause),
                fmt_ms(c.max_pause)
            );
        }
    }

    if !model.phase_statistics().is_empty() {
        println!();
        println!("Phases:");
        for p in model.phase_statistics() {
            println!(
                "  {:<40} count {:<5} avg {:<10} max {}",
                p.name,
                p.count,
                fmt_ms(p.avg_duration),
                fmt_ms(p.max_duration)
            );
        }
    }

    if let Some(diagnosis) = model.diagnosis() {
        println!();
        match diagnosis.problem {
            Some(problem) => {
                println!(
                    "Diagnosis:      {} ({:?})",
                    problem.name(),
                    diagnosis.seriousness
                );
                for suggestion in &diagnosis.suggestions {
                    println!("  - {suggestion}");
                }
            }
            None => println!("Diagnosis:      nothing abnormal found"),
        }
    }
}

fn fmt_ms(ms: f64) -> String {
    if !known_double(ms) {
        return "-".to_string();
    }
    if ms >= 60_000.0 {
        format!("{:.1}min", ms / 60_000.0)
    } else if ms >= 1_000.0 {
        format!("{:.2}s", ms / 1_000.0)
    } else {
        format!("{ms:.3}ms")
    }
}

fn fmt_bytes(bytes: i64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    if !known_int(bytes) {
        return "-".to_string();
    }
    let b = bytes as f64;
    if b >= GIB {
        format!("{:.1}G", b / GIB)
    } else if b >= MIB {
        format!("{:.1}M", b / MIB)
    } else if b >= KIB {
        format!("{:.1}K", b / KIB)
    } else {
        format!("{bytes}B")
    }
}
