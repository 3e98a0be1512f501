//! CAN Sniffer CLI Application
//!
//! Command-line front end for the can-sniffer-core engine. It adds:
//! - Live monitoring of a serial port with a periodic aggregated table
//! - Session recording and timed replay (with optional retransmission)
//! - Manual command transmission from the function database
//! - Serial port enumeration
//!
//! The engine does all the work; this layer only wires it up and renders
//! snapshots.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use can_sniffer_core::config::MonitorConfig;
use can_sniffer_core::ingest::{LinkReader, LinkState};
use can_sniffer_core::labels::{FunctionDb, IdLabels};
use can_sniffer_core::monitor::Monitor;
use can_sniffer_core::playback::{PlaybackEngine, PlaybackSession, PlaybackState};
use can_sniffer_core::transport::{shared, SerialTransport, Transmitter};
use can_sniffer_core::types::PAYLOAD_LEN;

mod config;
mod render;

use config::AppConfig;

/// CAN Sniffer - monitor, record and replay CAN traffic over a serial link
#[derive(Parser, Debug)]
#[command(name = "can-sniffer")]
#[command(about = "Monitor, record and replay CAN bus traffic", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor live traffic on a serial port
    Live {
        /// Serial port path (overrides the config file)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate (overrides the config file)
        #[arg(short, long)]
        baud: Option<u32>,

        /// Export the captured session to this file on exit
        #[arg(long, value_name = "FILE")]
        record: Option<PathBuf>,

        /// Stop automatically after this many seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,

        /// Seconds between table refreshes
        #[arg(long, default_value_t = 1.0)]
        refresh: f64,

        /// Show only frames whose payload changed since the last one
        #[arg(long)]
        hide_unchanged: bool,

        /// Hide frames with an all-zero payload
        #[arg(long)]
        hide_all_zero: bool,
    },

    /// Replay a recorded session
    Replay {
        /// Session file produced by `live --record`
        session: PathBuf,

        /// Speed multiplier: 0 = as fast as possible, 2.0 = twice as fast
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Restart from the beginning when the session ends
        #[arg(long = "loop")]
        looped: bool,

        /// Retransmit each frame out the serial port
        #[arg(long)]
        retransmit: bool,

        /// Serial port for retransmission
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate for retransmission
        #[arg(short, long)]
        baud: Option<u32>,
    },

    /// Send a command out the serial port
    Send {
        /// Serial port path (overrides the config file)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate (overrides the config file)
        #[arg(short, long)]
        baud: Option<u32>,

        /// Target id (hex text, e.g. 6B1)
        #[arg(long)]
        id: String,

        /// Payload bytes as hex pairs (e.g. "1A 00 FF")
        #[arg(long)]
        data: Option<String>,

        /// Named function from the function database (alternative to --data)
        #[arg(long)]
        function: Option<String>,

        /// How many times to send the command
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Spacing between repeats in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },

    /// List available serial ports
    Ports,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("CAN Sniffer CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using engine library v{}", can_sniffer_core::VERSION);

    let app_config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => AppConfig::default(),
    };

    match args.command {
        Command::Live {
            port,
            baud,
            record,
            duration,
            refresh,
            hide_unchanged,
            hide_all_zero,
        } => run_live(
            &app_config,
            port,
            baud,
            record,
            duration,
            refresh,
            hide_unchanged,
            hide_all_zero,
        ),
        Command::Replay {
            session,
            speed,
            looped,
            retransmit,
            port,
            baud,
        } => run_replay(&app_config, &session, speed, looped, retransmit, port, baud),
        Command::Send {
            port,
            baud,
            id,
            data,
            function,
            count,
            interval_ms,
        } => run_send(&app_config, port, baud, &id, data, function, count, interval_ms),
        Command::Ports => list_ports(),
    }
}

/// Install a Ctrl-C handler that clears the returned flag.
fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let handle = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handle.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;
    Ok(running)
}

fn resolve_port(flag: Option<String>, config: &AppConfig) -> Result<String> {
    flag.or_else(|| config.link.port.clone())
        .context("No serial port given - use --port or set [link] port in the config file")
}

#[allow(clippy::too_many_arguments)]
fn run_live(
    app_config: &AppConfig,
    port: Option<String>,
    baud: Option<u32>,
    record: Option<PathBuf>,
    duration: Option<u64>,
    refresh: f64,
    hide_unchanged: bool,
    hide_all_zero: bool,
) -> Result<()> {
    let port = resolve_port(port, app_config)?;
    let baud = baud.unwrap_or(app_config.link.baud);

    let labels = IdLabels::load(&app_config.databases.id_labels);
    let functions = FunctionDb::load(&app_config.databases.function_codes);

    let mut engine_config: MonitorConfig = app_config.engine.clone();
    engine_config.filters.hide_unchanged |= hide_unchanged;
    engine_config.filters.hide_all_zero |= hide_all_zero;

    let mut monitor = Monitor::start(engine_config)?;
    let transport = SerialTransport::open(&port, baud)
        .with_context(|| format!("Cannot open serial port {}", port))?;
    let mut reader = LinkReader::spawn(shared(transport), monitor.injector())?;

    println!("Monitoring {} at {} baud - Ctrl-C to stop", port, baud);

    let running = interrupt_flag()?;
    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let refresh = Duration::from_secs_f64(refresh.max(0.1));
    let injector = monitor.injector();

    while running.load(Ordering::SeqCst) {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        if reader.state() == LinkState::Failed {
            eprintln!("Link lost - stopping");
            break;
        }

        std::thread::sleep(refresh);
        let snapshot = monitor.snapshot();
        println!();
        print!(
            "{}",
            render::render_table(&snapshot, &labels, &functions, injector.now())
        );
    }

    reader.stop();
    monitor.stop();

    if let Some(path) = record {
        monitor.export_session(&path)?;
        println!("Session written to {}", path.display());
    }
    println!("{}", render::render_summary(&monitor));
    Ok(())
}

fn run_replay(
    app_config: &AppConfig,
    session_path: &PathBuf,
    speed: f64,
    looped: bool,
    retransmit: bool,
    port: Option<String>,
    baud: Option<u32>,
) -> Result<()> {
    let session = PlaybackSession::load(session_path)?
        .with_speed(speed)
        .with_loop(looped)
        .with_retransmit(retransmit);

    if session.entries.is_empty() {
        bail!("Session file {:?} contains no frames", session_path);
    }
    println!(
        "Replaying {} frames spanning {:.3}s (speed {})",
        session.entries.len(),
        session.span(),
        speed
    );

    let transmitter = if retransmit {
        let port = resolve_port(port, app_config)
            .context("--retransmit needs a serial port")?;
        let baud = baud.unwrap_or(app_config.link.baud);
        let transport = SerialTransport::open(&port, baud)
            .with_context(|| format!("Cannot open serial port {}", port))?;
        Some(Transmitter::new(shared(transport)))
    } else {
        None
    };

    let labels = IdLabels::load(&app_config.databases.id_labels);
    let functions = FunctionDb::load(&app_config.databases.function_codes);
    let mut monitor = Monitor::start(app_config.engine.clone())?;
    let injector = monitor.injector();

    let running = interrupt_flag()?;
    let mut engine = PlaybackEngine::new(session);
    engine.start(monitor.injector(), transmitter);

    while engine.state() == PlaybackState::Playing {
        if !running.load(Ordering::SeqCst) {
            engine.stop();
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    engine.wait();

    // let the processor drain the tail of the queue
    std::thread::sleep(Duration::from_millis(50));
    monitor.stop();

    let snapshot = monitor.snapshot();
    print!(
        "{}",
        render::render_table(&snapshot, &labels, &functions, injector.now())
    );
    println!("Playback {:?} - {}", engine.state(), render::render_summary(&monitor));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_send(
    app_config: &AppConfig,
    port: Option<String>,
    baud: Option<u32>,
    id: &str,
    data: Option<String>,
    function: Option<String>,
    count: u32,
    interval_ms: u64,
) -> Result<()> {
    let id = id.to_ascii_uppercase();
    let payload_text = match (data, function) {
        (Some(data), None) => data,
        (None, Some(function)) => {
            let db = FunctionDb::load(&app_config.databases.function_codes);
            db.payload_for(&id, &function)
                .with_context(|| format!("No function '{}' recorded for id {}", function, id))?
                .to_string()
        }
        (Some(_), Some(_)) => bail!("--data and --function are mutually exclusive"),
        (None, None) => bail!("One of --data or --function is required"),
    };
    let payload = parse_payload(&payload_text)?;

    let port = resolve_port(port, app_config)?;
    let baud = baud.unwrap_or(app_config.link.baud);
    let transport = SerialTransport::open(&port, baud)
        .with_context(|| format!("Cannot open serial port {}", port))?;
    let transmitter = Transmitter::new(shared(transport));

    let running = interrupt_flag()?;
    let mut sent = 0u32;
    for i in 0..count {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        transmitter
            .send(&id, &payload)
            .with_context(|| format!("Write failed after {} commands", sent))?;
        sent += 1;
        if i + 1 < count {
            std::thread::sleep(Duration::from_millis(interval_ms));
        }
    }

    println!("Sent {} command(s) to {}", sent, id);
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("Could not enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports detected");
        return Ok(());
    }
    for port in ports {
        println!("{}\t{:?}", port.port_name, port.port_type);
    }
    Ok(())
}

/// Parse "1A 00 FF" into bytes; up to 8 are sent.
fn parse_payload(text: &str) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    for token in text.split_whitespace() {
        let byte = u8::from_str_radix(token, 16)
            .with_context(|| format!("Invalid payload byte '{}'", token))?;
        payload.push(byte);
    }
    if payload.is_empty() {
        bail!("Payload is empty");
    }
    payload.truncate(PAYLOAD_LEN);
    Ok(payload)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
