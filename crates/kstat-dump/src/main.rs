//! kstat-dump - display kernel statistics.
//!
//! A `kstat(1M)` work-alike built on kstat-core. On hosts without a kstat
//! facility, or with `--mock`, it reads a built-in sample chain instead.

use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Local, Utc};
use clap::{Parser, ValueEnum};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use kstat_core::chain::MockChain;
use kstat_core::filter::{FilterError, FilterSpec, KstatFilter};
use kstat_core::model::{Kstat, KstatType};
use kstat_core::session::{Session, SessionError};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TimeFormat {
    /// Seconds since the epoch.
    U,
    /// Date and time.
    D,
}

#[derive(Parser)]
#[command(
    name = "kstat-dump",
    about = "Display kernel statistics",
    version,
    after_help = "Operands are module:instance:name:statistic specs, optionally followed by\ninterval [count]. Empty parts and * match anything."
)]
struct Args {
    /// List matching statistic names only.
    #[arg(short = 'l')]
    list: bool,

    /// Parseable output: module:instance:name:statistic<TAB>value.
    #[arg(short = 'p')]
    parseable: bool,

    /// Print each pass as a JSON array.
    #[arg(short = 'j', long = "json", conflicts_with_all = ["list", "parseable"])]
    json: bool,

    /// Print a timestamp before each pass.
    #[arg(short = 'T', value_enum, value_name = "u|d")]
    timestamp: Option<TimeFormat>,

    /// Only kstats of this class.
    #[arg(short = 'c', value_name = "class")]
    class: Option<String>,

    /// Only kstats of this type (e.g. KSTAT_TYPE_NAMED).
    #[arg(short = 't', long = "type", value_name = "type", value_parser = parse_type)]
    kstat_type: Option<KstatType>,

    #[arg(short = 'm', value_name = "module")]
    module: Option<String>,

    #[arg(short = 'i', value_name = "instance")]
    instance: Option<i32>,

    #[arg(short = 'n', value_name = "name")]
    name: Option<String>,

    #[arg(short = 's', value_name = "statistic")]
    statistic: Option<String>,

    /// Read the built-in sample chain instead of the kernel.
    #[arg(long)]
    mock: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// module:instance:name:statistic ... [interval [count]]
    #[arg(value_name = "OPERAND")]
    operands: Vec<String>,
}

fn parse_type(s: &str) -> Result<KstatType, String> {
    s.parse()
}

/// Operands split into filter specs and the repeat schedule.
#[derive(Debug, Default, PartialEq, Eq)]
struct Operands {
    specs: Vec<String>,
    interval: Option<u64>,
    count: Option<u64>,
}

fn parse_operands(operands: &[String]) -> Result<Operands, String> {
    let mut out = Operands::default();
    for op in operands {
        if op.contains(':') {
            if out.interval.is_some() {
                return Err(format!("spec '{}' after interval", op));
            }
            out.specs.push(op.clone());
            continue;
        }
        let n: u64 = op
            .parse()
            .map_err(|_| format!("'{}' is neither a spec nor an interval", op))?;
        if n == 0 {
            return Err("interval and count must be positive".to_string());
        }
        match (out.interval, out.count) {
            (None, _) => out.interval = Some(n),
            (Some(_), None) => out.count = Some(n),
            (Some(_), Some(_)) => return Err(format!("unexpected operand '{}'", op)),
        }
    }
    Ok(out)
}

fn build_filter(args: &Args, specs: &[String]) -> Result<KstatFilter, FilterError> {
    let mut filter = KstatFilter::new();
    if let Some(class) = &args.class {
        filter.set_class(class.clone());
    }
    if let Some(ty) = args.kstat_type {
        filter.set_type(ty);
    }
    if args.module.is_some() || args.instance.is_some() || args.name.is_some() || args.statistic.is_some() {
        filter.add_spec(FilterSpec {
            module: args.module.clone(),
            instance: args.instance,
            name: args.name.clone(),
            statistic: args.statistic.clone(),
        });
    } else {
        for spec in specs {
            filter.add_filter(spec)?;
        }
    }
    Ok(filter)
}

// ── Logging ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for krate in ["kstat_dump", "kstat_core"] {
        if let Ok(directive) = format!("{}={}", krate, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ── Output ───────────────────────────────────────────────────────────────────

fn seconds(ns: i64) -> String {
    format!("{:.9}", ns as f64 / 1_000_000_000.0)
}

fn print_time_header(format: Option<TimeFormat>) {
    match format {
        Some(TimeFormat::U) => println!("{}", Utc::now().timestamp()),
        Some(TimeFormat::D) => println!("{}", Local::now().format("%a %b %e %H:%M:%S %Z %Y")),
        None => {}
    }
}

fn value_text(ks: &Kstat, stat: &str) -> String {
    ks.value(stat)
        .map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string())
}

fn statistics_to_show<'a>(ks: &'a Kstat, filter: &KstatFilter, statistic: Option<&'a str>) -> Vec<&'a str> {
    match statistic {
        Some(s) => vec![s],
        None => filter.filtered_statistics(ks),
    }
}

fn print_list(ks: &Kstat, stats: &[&str]) {
    let triplet = ks.triplet();
    if stats.is_empty() {
        println!("{}", triplet);
    }
    for stat in stats {
        println!("{}:{}", triplet, stat);
    }
}

fn print_parseable(ks: &Kstat, stats: &[&str]) {
    let triplet = ks.triplet();
    for stat in stats {
        println!("{}:{}\t{}", triplet, stat, value_text(ks, stat));
    }
}

fn print_kstat(ks: &Kstat, stats: &[&str], show_times: bool) {
    println!("module:\t{}\tinstance:\t{}", ks.module(), ks.instance());
    println!("name:\t{}\tclass:\t{}", ks.name(), ks.class());
    if show_times {
        println!("\tcrtime\t{}", seconds(ks.crtime()));
        println!("\tsnaptime\t{}", seconds(ks.snaptime()));
    }
    for stat in stats {
        println!("\t{}\t{}", stat, value_text(ks, stat));
    }
    println!();
}

fn display(args: &Args, session: &Session, filter: &KstatFilter) {
    print_time_header(args.timestamp);

    let kstats = filter.select(session);
    debug!(kstats = kstats.len(), chain_id = session.chain_id(), "pass selected");

    if args.json {
        match serde_json::to_string_pretty(&kstats) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize kstats: {}", e),
        }
        return;
    }

    for ks in &kstats {
        let stats = statistics_to_show(ks, filter, args.statistic.as_deref());
        if args.list {
            print_list(ks, &stats);
        } else if args.parseable {
            print_parseable(ks, &stats);
        } else {
            print_kstat(ks, &stats, args.statistic.is_none());
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn sample_session() -> Result<&'static Session, SessionError> {
    Session::install(Session::new(MockChain::typical_system()))
}

fn open_session(mock: bool) -> &'static Session {
    let result = if mock {
        info!("Using built-in sample chain");
        sample_session()
    } else {
        match Session::init() {
            Err(SessionError::Unsupported) => {
                warn!("kstat is not available on this platform, using built-in sample chain");
                sample_session()
            }
            other => other,
        }
    };
    match result {
        Ok(session) => session,
        Err(e) => {
            error!("{}", e);
            process::exit(2);
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let operands = match parse_operands(&args.operands) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("kstat-dump: {}", e);
            process::exit(1);
        }
    };
    let filter = match build_filter(&args, &operands.specs) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("kstat-dump: {}", e);
            process::exit(1);
        }
    };

    let session = open_session(args.mock);

    display(&args, session, &filter);

    let Some(interval) = operands.interval else {
        return;
    };
    let interval = Duration::from_secs(interval);
    // The first pass already ran.
    let mut remaining = operands.count.map(|c| c - 1);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    while running.load(Ordering::SeqCst) && remaining != Some(0) {
        // Sleep with periodic checks for the interrupt flag.
        let step = Duration::from_millis(100);
        let mut left = interval;
        while left > Duration::ZERO && running.load(Ordering::SeqCst) {
            let t = left.min(step);
            std::thread::sleep(t);
            left = left.saturating_sub(t);
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
        display(&args, session, &filter);
        remaining = remaining.map(|c| c - 1);
    }
}
