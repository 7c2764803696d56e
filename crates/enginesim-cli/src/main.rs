//! enginesim operator console
//!
//! Streams simulated TPS/MAP readings to an ECU and prints what it answers.
//! Keys are typed as lines on stdin; Ctrl-D ends a manual run.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use enginesim_core::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "enginesim", version, about = "HIL engine signal simulator")]
struct Cli {
    /// JSON configuration file; missing fields keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, or tcp://host:port for a virtual ECU
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Who drives the engine
    #[arg(long, value_enum)]
    driver: Option<DriverArg>,

    /// Stop after this many simulated seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Command sent once before streaming starts (repeatable)
    #[arg(long = "init", value_name = "CMD")]
    init: Vec<String>,

    /// Keep running after the top gear is reached
    #[arg(long)]
    no_stop_at_top: bool,

    /// Redraw the status line in place
    #[arg(long)]
    in_place: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DriverArg {
    Manual,
    Auto,
}

impl From<DriverArg> for DriverMode {
    fn from(arg: DriverArg) -> Self {
        match arg {
            DriverArg::Manual => DriverMode::Manual,
            DriverArg::Auto => DriverMode::Auto,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(cli: &Cli) -> Result<SimConfig> {
    let mut config = match &cli.config {
        Some(path) => SimConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SimConfig::default(),
    };

    if let Some(port) = &cli.port {
        config.link.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.link.baud_rate = baud;
    }
    if let Some(driver) = cli.driver {
        config.driver = driver.into();
    }
    if cli.duration.is_some() {
        config.max_duration = cli.duration;
    }
    if !cli.init.is_empty() {
        config.link.startup_commands = cli.init.clone();
    }
    if cli.no_stop_at_top {
        config.stop_at_top_gear = false;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_controls() {
    println!("Controls (type, then Enter):");
    println!("  up arrow / +     accelerate      down arrow / -   brake");
    println!("  right arrow / >  shift up        left arrow / <   shift down");
    println!("  1 TPS min   2 TPS max   3 MAP min   4 MAP max   5 normal output");
    println!("  any other word   sent to the ECU as a command");
    println!("  Ctrl-D           quit (manual driver)");
    println!("  Ctrl-C           stop the run");
}

/// Ctrl-C asks the session to stop so the link is closed only after the
/// telemetry workers have been joined
fn install_interrupt_handler(cancel: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        if cancel.swap(true, Ordering::SeqCst) {
            // second Ctrl-C: the run is stuck, give up
            std::process::exit(130);
        }
        warn!("interrupted, stopping");
    })
    .context("installing Ctrl-C handler")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.list_ports {
        for port in list_ports() {
            match (&port.product, port.vid, port.pid) {
                (Some(product), Some(vid), Some(pid)) => {
                    println!("{}  {} [{:04x}:{:04x}]", port.name, product, vid, pid)
                }
                _ => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let config = build_config(&cli)?;
    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let session = Session::new(config)?;
    install_interrupt_handler(session.cancel_handle())?;
    let link = open_link(&session.config().link)
        .with_context(|| format!("opening ECU link {}", session.config().link.port))?;
    let mut keys = StdinKeySource::spawn()?;

    print_controls();
    let reporter = Arc::new(ConsoleReporter::new(cli.in_place));
    let summary = session.run(link, &mut keys, reporter)?;

    if cli.in_place {
        println!();
    }
    info!(
        frames = summary.stats.frames_sent,
        replies = summary.stats.lines_received,
        "done: {:?}",
        summary.reason
    );
    Ok(())
}
