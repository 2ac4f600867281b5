//! Persistent BSSID→cleartext-SSID map
//!
//! A beacon is "cloaked" when it carries an empty or all-zero SSID
//! field. Once a cleartext SSID has been seen for a BSSID (typically in
//! a probe response), it is remembered here so later cloaked beacons
//! for the same BSSID resolve to the same name.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::mac::MacAddr;

/// An SSID is treated as cloaked when it is missing or, after trimming
/// NUL padding, empty.
pub fn normalize_ssid(ssid: Option<&str>) -> Option<String> {
    let ssid = ssid?;
    let trimmed = ssid.trim_matches('\0').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub struct CloakMap {
    path: Option<PathBuf>,
    map: BTreeMap<MacAddr, String>,
    writable: bool,
}

impl CloakMap {
    pub fn disabled() -> Self {
        Self {
            path: None,
            map: BTreeMap::new(),
            writable: false,
        }
    }

    /// Load the map from `path` if it exists; a missing file is not an
    /// error (first run), but a present-and-unreadable file is fatal.
    pub fn open(path: &Path) -> Result<Self> {
        let map = if path.exists() {
            let data = fs::read_to_string(path)
                .with_context(|| format!("could not open SSID track file {path:?}"))?;
            parse_map(&data)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            map,
            writable: true,
        })
    }

    pub fn get(&self, bssid: MacAddr) -> Option<&str> {
        self.map.get(&bssid).map(String::as_str)
    }

    /// Resolve a beacon/probe SSID against the map, persisting a newly
    /// observed cleartext SSID and returning the effective SSID to
    /// attach to the network.
    pub fn resolve(&mut self, bssid: MacAddr, observed: Option<&str>) -> Option<String> {
        match normalize_ssid(observed) {
            Some(clear) => {
                if self.map.get(&bssid) != Some(&clear) {
                    self.map.insert(bssid, clear.clone());
                    self.append(bssid, &clear);
                }
                Some(clear)
            }
            None => self.get(bssid).map(str::to_string),
        }
    }

    fn append(&mut self, bssid: MacAddr, ssid: &str) {
        if !self.writable {
            return;
        }
        let Some(path) = &self.path else { return };
        let result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{bssid} {}", escape_value(ssid)));
        if let Err(e) = result {
            log::warn!("disabling SSID map writes after append failure: {e}");
            self.writable = false;
        }
    }

    pub fn write_full(&self) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let mut out = String::new();
        for (bssid, ssid) in &self.map {
            out.push_str(&format!("{bssid} {}\n", escape_value(ssid)));
        }
        fs::write(path, out).with_context(|| format!("writing SSID map {path:?}"))
    }
}

fn escape_value(s: &str) -> String {
    s.replace('\\', "\\\\").replace(' ', "\\s").replace('\n', "\\n")
}

fn unescape_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('s') => out.push(' '),
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_map(data: &str) -> Result<BTreeMap<MacAddr, String>> {
    let mut map = BTreeMap::new();
    for (lineno, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (bssid, value) = line
            .split_once(' ')
            .with_context(|| format!("SSID map line {} is malformed: {line:?}", lineno + 1))?;
        let bssid: MacAddr = bssid
            .parse()
            .with_context(|| format!("SSID map line {} has a bad BSSID", lineno + 1))?;
        map.insert(bssid, unescape_value(value));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloak_resolution_is_idempotent() {
        let mut map = CloakMap {
            path: None,
            map: BTreeMap::new(),
            writable: false,
        };
        let bssid: MacAddr = "AA:BB:CC:DD:EE:FF".parse().unwrap();

        assert_eq!(map.resolve(bssid, None), None);
        assert_eq!(map.resolve(bssid, Some("guest")), Some("guest".to_string()));
        assert_eq!(map.resolve(bssid, None), Some("guest".to_string()));
        assert_eq!(map.resolve(bssid, Some("\0\0\0")), Some("guest".to_string()));
    }

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssid.map");
        let bssid: MacAddr = "AA:BB:CC:DD:EE:FF".parse().unwrap();

        let mut map = CloakMap::open(&path).unwrap();
        map.resolve(bssid, Some("guest wifi"));

        let reloaded = CloakMap::open(&path).unwrap();
        assert_eq!(reloaded.get(bssid), Some("guest wifi"));
    }

    #[test]
    fn normalize_rejects_nul_padded_empty() {
        assert_eq!(normalize_ssid(Some("\0\0\0\0")), None);
        assert_eq!(normalize_ssid(Some("  ")), None);
        assert_eq!(normalize_ssid(Some("lab")), Some("lab".to_string()));
    }
}
