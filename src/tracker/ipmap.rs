//! Persistent BSSID→(ip,mask) map and the monotonic IP-range widening
//! rule

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::mac::MacAddr;
use crate::packet::AddressKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IpRange {
    pub kind: AddressKind,
    pub network: Ipv4Addr,
    pub prefix_len: u8,
}

impl IpRange {
    /// Widen `self` to also contain `other`, never narrowing. The wider
    /// (smaller prefix length) of the two always wins; ties keep the
    /// existing value to avoid needless churn.
    pub fn widen(self, other: IpRange) -> IpRange {
        if other.prefix_len < self.prefix_len {
            other
        } else {
            self
        }
    }
}

pub struct IpMap {
    path: Option<PathBuf>,
    map: BTreeMap<MacAddr, IpRange>,
    writable: bool,
}

impl IpMap {
    pub fn disabled() -> Self {
        Self {
            path: None,
            map: BTreeMap::new(),
            writable: false,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let map = if path.exists() {
            let data = fs::read_to_string(path)
                .with_context(|| format!("could not open IP track file {path:?}"))?;
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

    pub fn get(&self, bssid: MacAddr) -> Option<IpRange> {
        self.map.get(&bssid).copied()
    }

    pub fn widen(&mut self, bssid: MacAddr, candidate: IpRange) -> IpRange {
        let widened = match self.map.get(&bssid) {
            Some(existing) => existing.widen(candidate),
            None => candidate,
        };
        if self.map.get(&bssid) != Some(&widened) {
            self.map.insert(bssid, widened);
            self.append(bssid, widened);
        }
        widened
    }

    fn append(&mut self, bssid: MacAddr, range: IpRange) {
        if !self.writable {
            return;
        }
        let Some(path) = &self.path else { return };
        let result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{bssid} {} {}", range.network, range.prefix_len));
        if let Err(e) = result {
            log::warn!("disabling IP map writes after append failure: {e}");
            self.writable = false;
        }
    }
}

fn parse_map(data: &str) -> Result<BTreeMap<MacAddr, IpRange>> {
    let mut map = BTreeMap::new();
    for (lineno, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let bssid: MacAddr = fields
            .next()
            .with_context(|| format!("IP map line {} is empty", lineno + 1))?
            .parse()
            .with_context(|| format!("IP map line {} has a bad BSSID", lineno + 1))?;
        let ip: Ipv4Addr = fields
            .next()
            .with_context(|| format!("IP map line {} is missing an address", lineno + 1))?
            .parse()
            .with_context(|| format!("IP map line {} has a bad address", lineno + 1))?;
        let prefix_len: u8 = fields
            .next()
            .with_context(|| format!("IP map line {} is missing a mask", lineno + 1))?
            .parse()
            .with_context(|| format!("IP map line {} has a bad mask", lineno + 1))?;
        map.insert(
            bssid,
            IpRange {
                kind: AddressKind::Ip4,
                network: ip,
                prefix_len,
            },
        );
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(prefix: u8) -> IpRange {
        IpRange {
            kind: AddressKind::Ip4,
            network: Ipv4Addr::new(192, 168, 1, 0),
            prefix_len: prefix,
        }
    }

    #[test]
    fn wider_subnet_always_wins_never_narrows() {
        assert_eq!(range(24).widen(range(16)).prefix_len, 16);
        assert_eq!(range(16).widen(range(24)).prefix_len, 16);
        assert_eq!(range(24).widen(range(24)).prefix_len, 24);
    }

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ip.map");
        let bssid: MacAddr = "AA:BB:CC:DD:EE:FF".parse().unwrap();

        let mut map = IpMap::open(&path).unwrap();
        map.widen(bssid, range(24));
        map.widen(bssid, range(16));

        let reloaded = IpMap::open(&path).unwrap();
        assert_eq!(reloaded.get(bssid).unwrap().prefix_len, 16);
    }
}
