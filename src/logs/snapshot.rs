//! Truncate-and-rewrite snapshot writers: plain-text, CSV, and XML
//! network snapshots, plus the CDP (Cisco) log. Each call rewrites the
//! file from scratch; none of these append.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::tracker::{wire, Network};

pub struct NetworkSnapshot {
    path: PathBuf,
}

impl NetworkSnapshot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, networks: &[&Network]) -> Result<()> {
        let mut out = String::new();
        for net in networks {
            out.push_str(&wire::net_to_string(net));
            out.push('\n');
            for client in net.clients.values() {
                out.push_str(&format!(
                    "\tCLIENT {} {} {}\n",
                    client.mac, client.counters.to_ap, client.counters.from_ap
                ));
            }
        }
        fs::write(&self.path, out).with_context(|| format!("writing network snapshot {:?}", self.path))
    }
}

pub struct CsvNetworkSnapshot {
    path: PathBuf,
}

impl CsvNetworkSnapshot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, networks: &[&Network]) -> Result<()> {
        let mut writer = csv::Writer::from_path(&self.path)
            .with_context(|| format!("opening CSV snapshot {:?}", self.path))?;
        writer.write_record([
            "bssid",
            "type",
            "ssid",
            "channel",
            "wep",
            "first_time",
            "last_time",
            "llc",
            "data",
            "crypt",
            "interesting",
        ])?;
        for net in networks {
            writer.write_record([
                net.bssid.to_string(),
                net.classification.as_wire().to_string(),
                net.ssid.clone().unwrap_or_default(),
                net.channel.to_string(),
                (net.wep as u8).to_string(),
                net.first_time.to_string(),
                net.last_time.to_string(),
                net.llc_packets.to_string(),
                net.data_packets.to_string(),
                net.crypt_packets.to_string(),
                net.interesting_packets.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub struct XmlNetworkSnapshot {
    path: PathBuf,
}

impl XmlNetworkSnapshot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, networks: &[&Network]) -> Result<()> {
        let mut out = String::from("<?xml version=\"1.0\"?>\n<networks>\n");
        for net in networks {
            out.push_str(&format!(
                "  <network bssid=\"{}\" type=\"{}\" channel=\"{}\" wep=\"{}\">\n",
                net.bssid,
                net.classification.as_wire(),
                net.channel,
                net.wep as u8,
            ));
            out.push_str(&format!(
                "    <ssid>{}</ssid>\n",
                xml_escape(net.ssid.as_deref().unwrap_or(""))
            ));
            out.push_str(&format!(
                "    <packets llc=\"{}\" data=\"{}\" crypt=\"{}\" interesting=\"{}\"/>\n",
                net.llc_packets, net.data_packets, net.crypt_packets, net.interesting_packets
            ));
            out.push_str("  </network>\n");
        }
        out.push_str("</networks>\n");
        fs::write(&self.path, out).with_context(|| format!("writing XML snapshot {:?}", self.path))
    }
}

pub struct CiscoSnapshot {
    path: PathBuf,
}

impl CiscoSnapshot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, networks: &[&Network]) -> Result<()> {
        let mut out = String::new();
        for net in networks {
            for cdp in net.cisco_equip.values() {
                out.push_str(&format!("{} {}\n", net.bssid, wire::cdp_to_string(cdp)));
            }
        }
        fs::write(&self.path, out).with_context(|| format!("writing CDP log {:?}", self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::MacAddr;
    use crate::tracker::Classification;

    fn sample_network() -> Network {
        Network {
            bssid: "00:11:22:33:44:55".parse::<MacAddr>().unwrap(),
            classification: Classification::Ap,
            ssid: Some("lab".to_string()),
            beacon_info: String::new(),
            channel: 6,
            wep: false,
            first_time: 100,
            last_time: 101,
            llc_packets: 1,
            data_packets: 1,
            crypt_packets: 0,
            interesting_packets: 0,
            address: None,
            cisco_equip: Default::default(),
            clients: Default::default(),
            gps: None,
        }
    }

    #[test]
    fn plain_snapshot_contains_net_to_string_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.dump");
        let snapshot = NetworkSnapshot::new(path.clone());
        let net = sample_network();
        snapshot.write(&[&net]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().next().unwrap(), wire::net_to_string(&net));
    }

    #[test]
    fn csv_snapshot_has_header_and_one_row_per_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.csv");
        let snapshot = CsvNetworkSnapshot::new(path.clone());
        snapshot.write(&[&sample_network()]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn xml_snapshot_escapes_ssid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.xml");
        let snapshot = XmlNetworkSnapshot::new(path.clone());
        let mut net = sample_network();
        net.ssid = Some("a&b".to_string());
        snapshot.write(&[&net]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("a&amp;b"));
    }
}
