#[macro_use]
extern crate log;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;

use aetherd::capture::{CaptureSource, FileReplayCaptureSource, NullCaptureSource};
use aetherd::config::{self, Config};
use aetherd::daemon::Daemon;
use aetherd::eventloop::EventLoop;
use aetherd::gps::{GpsSource, NullGpsSource};

/// Command-line flags. Every flag mirrors a configuration file key and
/// overrides it when present; the config file itself remains the
/// source of truth for everything not passed on the command line.
#[derive(Parser, Debug)]
#[command(author, version, about = "passive 802.11 discovery and tracking daemon", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short = 'f', long = "config-file", default_value = "aetherd.conf")]
    config_file: PathBuf,

    /// Override `logdefault`.
    #[arg(long = "log-title")]
    log_title: Option<String>,

    /// Disable all file logging regardless of `logtypes`.
    #[arg(long = "no-logging")]
    no_logging: bool,

    /// Override `captype`.
    #[arg(long = "capture-type")]
    capture_type: Option<String>,

    /// Override `capinterface`.
    #[arg(long = "capture-interface")]
    capture_interface: Option<String>,

    /// Override `logtypes` (comma-separated).
    #[arg(long = "log-types", value_delimiter = ',')]
    log_types: Option<Vec<String>>,

    /// Override `dumptype`.
    #[arg(long = "dump-type")]
    dump_type: Option<String>,

    /// Override `tcpport`.
    #[arg(long = "port")]
    port: Option<u16>,

    /// Override `allowedhosts` (comma-separated, stored verbatim).
    #[arg(long = "allowed-hosts")]
    allowed_hosts: Option<String>,

    /// Suppress the startup banner.
    #[arg(long = "quiet")]
    quiet: bool,

    /// Suppress all but warnings and errors (same effect as `--quiet`
    /// plus a quieter `env_logger` filter).
    #[arg(long = "silent")]
    silent: bool,
}

fn apply_overrides(mut config: Config, args: &Args) -> Config {
    if let Some(title) = &args.log_title {
        config.logdefault = title.clone();
    }
    if args.no_logging {
        config.logtypes.clear();
    }
    if let Some(captype) = &args.capture_type {
        config.captype = captype.clone();
    }
    if let Some(iface) = &args.capture_interface {
        config.capinterface = iface.clone();
    }
    if let Some(types) = &args.log_types {
        config.logtypes = types.clone();
    }
    if let Some(dumptype) = &args.dump_type {
        config.dumptype = dumptype.clone();
    }
    if let Some(port) = args.port {
        config.tcpport = port;
    }
    if let Some(hosts) = &args.allowed_hosts {
        config.allowedhosts = hosts.clone();
    }
    config
}

fn build_capture(config: &Config) -> Result<Box<dyn CaptureSource>> {
    match config.captype.as_str() {
        "file" => {
            let path = PathBuf::from(&config.capinterface);
            Ok(Box::new(
                FileReplayCaptureSource::open(&path).context("opening capture source")?,
            ))
        }
        "none" => Ok(Box::new(NullCaptureSource)),
        other => bail!("unsupported capture type {other:?}; only \"file\" and \"none\" are built"),
    }
}

fn build_gps(config: &Config) -> Box<dyn GpsSource> {
    if config.gps {
        warn!("GPS wire client is not built; running with no fix regardless of gpshost");
    }
    Box::new(NullGpsSource)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.silent { "warn" } else { "info" };
    env_logger::init_from_env(Env::new().default_filter_or(default_filter));

    let config = config::load(&args.config_file)
        .with_context(|| format!("loading configuration from {:?}", args.config_file))?;
    let config = apply_overrides(config, &args);

    if !args.quiet {
        info!(
            "aetherd starting: capture={} port={} logtypes={:?}",
            config.captype, config.tcpport, config.logtypes
        );
    }

    let capture = build_capture(&config)?;
    let gps = build_gps(&config);

    let start_time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let daemon = Daemon::build(config, capture, gps, start_time).context("assembling daemon")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    aetherd::shutdown::install(shutdown.clone()).context("installing signal handlers")?;

    let mut event_loop = EventLoop::new(daemon, shutdown).context("starting event loop")?;
    let run_result = event_loop.run();
    let mut daemon = event_loop.into_daemon();

    // Shutdown must run whether the loop exited cleanly (signal) or on
    // a fatal error, so capture and logs are always flushed and closed.
    let shutdown_result = aetherd::shutdown::run(&mut daemon).context("shutting down");

    run_result.context("running event loop")?;
    shutdown_result?;

    if !args.quiet {
        info!("aetherd stopped cleanly");
    }
    Ok(())
}
