//! Models and functionality to work with the config file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::mac::MacAddr;

fn default_log_template() -> String {
    "%t-%i.%n".to_string()
}

fn default_log_types() -> Vec<String> {
    vec!["dump".to_string(), "network".to_string()]
}

fn default_decay() -> i64 {
    5
}

fn default_tcp_port() -> u16 {
    2501
}

fn default_max_clients() -> usize {
    32
}

fn default_capture_type() -> String {
    "file".to_string()
}

/// Rust representation of the configuration file (`kismet.conf`-style
/// keys, see `configuration keys` in the daemon's design notes).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub configdir: PathBuf,

    pub ssidmap: Option<PathBuf>,
    pub ipmap: Option<PathBuf>,

    #[serde(default)]
    pub waypoints: bool,
    pub waypointdata: Option<PathBuf>,

    #[serde(default)]
    pub metric: bool,

    #[serde(default = "default_log_title")]
    pub logdefault: String,
    #[serde(default = "default_log_types")]
    pub logtypes: Vec<String>,
    #[serde(default = "default_log_template")]
    pub logtemplate: String,

    pub dumplimit: Option<u64>,
    #[serde(default = "default_dump_type")]
    pub dumptype: String,

    #[serde(default)]
    pub noiselog: bool,
    #[serde(default)]
    pub beaconlog: bool,

    #[serde(default = "default_decay")]
    pub decay: i64,

    #[serde(default = "default_tcp_port")]
    pub tcpport: u16,
    #[serde(default = "default_max_clients")]
    pub maxclients: usize,
    #[serde(default = "default_allowed_hosts")]
    pub allowedhosts: String,

    #[serde(default)]
    pub sound: bool,
    pub soundplay: Option<String>,
    pub sound_new: Option<String>,
    pub sound_traffic: Option<String>,
    pub sound_junktraffic: Option<String>,
    pub sound_gpslock: Option<String>,
    pub sound_gpslost: Option<String>,

    #[serde(default)]
    pub speech: bool,
    pub festival: Option<String>,

    #[serde(default)]
    pub writeinterval: i64,

    #[serde(default = "default_capture_type")]
    pub captype: String,
    #[serde(default)]
    pub capinterface: String,

    #[serde(default)]
    pub gps: bool,
    pub gpshost: Option<String>,

    #[serde(default)]
    pub fuzzycrypt: bool,
    pub macfilter: Option<MacAddr>,
}

fn default_log_title() -> String {
    "aether".to_string()
}

fn default_dump_type() -> String {
    "pcap".to_string()
}

fn default_allowed_hosts() -> String {
    "127.0.0.1".to_string()
}

pub fn load(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path).context("Failed to read config")?;
    let config: Config = toml::from_str(&data).context("Failed to parse config")?;
    if config.allowedhosts.trim().is_empty() {
        anyhow::bail!("configuration has no allowed hosts");
    }
    if config.logtypes.is_empty() {
        anyhow::bail!("configuration has no log types enabled");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aether.conf");
        fs::write(
            &path,
            r#"
            configdir = "/tmp/aether"
            allowedhosts = "127.0.0.1"
            "#,
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.tcpport, 2501);
        assert_eq!(config.decay, 5);
        assert_eq!(config.logtypes, vec!["dump".to_string(), "network".to_string()]);
    }

    #[test]
    fn rejects_empty_allowed_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aether.conf");
        fs::write(
            &path,
            r#"
            configdir = "/tmp/aether"
            allowedhosts = ""
            "#,
        )
        .unwrap();

        assert!(load(&path).is_err());
    }
}
