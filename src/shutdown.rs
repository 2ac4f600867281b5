//! Ordered, exactly-once shutdown coordinator triggered by
//! SIGINT/SIGTERM/SIGHUP (or any fatal internal error).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::flag;

use crate::daemon::Daemon;
use crate::logs::{unlink_if_empty, Dump};

/// Register SIGINT/SIGTERM/SIGHUP to flip a shared flag. SIGPIPE needs
/// no handler: Rust's runtime already ignores it on process start,
/// unlike a C daemon, which must call `SIG_IGN` itself.
pub fn install(shutdown: Arc<std::sync::atomic::AtomicBool>) -> Result<()> {
    flag::register(SIGINT, shutdown.clone())?;
    flag::register(SIGTERM, shutdown.clone())?;
    flag::register(SIGHUP, shutdown)?;
    Ok(())
}

/// Run the eight-step shutdown sequence. Safe to call exactly once;
/// calling it twice would double-close already-closed handles.
pub fn run(daemon: &mut Daemon) -> Result<()> {
    daemon.capture.close();

    daemon.server.shutdown()?;

    daemon.tracker.flush_maps()?;

    daemon.rewrite_snapshots()?;
    let num_networks = daemon.tracker.fetch_num_networks() as u64;
    if let Some(s) = &daemon.network_snapshot {
        unlink_if_empty(Some(s.path()), num_networks)?;
    }
    if let Some(s) = &daemon.csv_snapshot {
        unlink_if_empty(Some(s.path()), num_networks)?;
    }
    if let Some(s) = &daemon.xml_snapshot {
        unlink_if_empty(Some(s.path()), num_networks)?;
    }
    let num_cisco = daemon.tracker.fetch_num_cisco() as u64;
    if let Some(s) = &daemon.cisco_snapshot {
        unlink_if_empty(Some(s.path()), num_cisco)?;
    }

    if let Some(dump) = &mut daemon.dump {
        dump.close()?;
        crate::logs::dump::unlink_if_empty(dump)?;
    }

    if let Some(weak) = &mut daemon.weak {
        let dumped = weak.fetch_dumped();
        weak.close()?;
        unlink_if_empty(weak.fetch_filename(), dumped)?;
    }

    if let Some(trail) = &mut daemon.gps_trail {
        let dumped = trail.fetch_dumped();
        trail.close()?;
        unlink_if_empty(trail.fetch_filename(), dumped)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::NullCaptureSource;
    use crate::config::Config;
    use crate::daemon::Daemon;
    use crate::gps::NullGpsSource;

    fn empty_config(dir: &std::path::Path) -> Config {
        let dir = dir.display();
        toml::from_str(&format!(
            r#"
            configdir = "{dir}"
            allowedhosts = "127.0.0.1"
            tcpport = 0
            logtypes = ["dump", "network"]
            logtemplate = "{dir}/%t-%i.%n"
            "#
        ))
        .unwrap()
    }

    #[test]
    fn empty_run_leaves_no_log_files_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = empty_config(dir.path());
        let mut daemon = Daemon::build(
            config,
            Box::new(NullCaptureSource),
            Box::new(NullGpsSource),
            1_700_000_000,
        )
        .unwrap();

        let dump_path = daemon.dump.as_ref().unwrap().fetch_filename().unwrap().to_path_buf();
        let network_path = daemon.network_snapshot.as_ref().unwrap().path().to_path_buf();

        run(&mut daemon).unwrap();

        assert!(!dump_path.exists());
        assert!(!network_path.exists());
    }
}
