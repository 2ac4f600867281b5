//! The in-memory aggregation state machine that turns a stream of
//! frames into a live set of wireless-network records

pub mod cloak;
pub mod ipmap;
pub mod wire;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use crate::gps::{GpsFix, GpsTrail};
use crate::mac::MacAddr;
use crate::packet::{AddressKind, FrameKind, PacketInfo};

use cloak::CloakMap;
use ipmap::{IpMap, IpRange};

pub type CdpEntry = crate::packet::CdpRecord;

/// Network classification. `Remove` is a tombstone, never assigned by
/// a classifiable frame — only [`Tracker::mark_remove`] sets it; it is
/// reserved for callers that want explicit removal notices and is
/// otherwise unused by the tracker itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Ap,
    Adhoc,
    Probe,
    Data,
    Lor,
    Remove,
}

impl Classification {
    pub fn as_wire(self) -> u8 {
        match self {
            Classification::Ap => 0,
            Classification::Adhoc => 1,
            Classification::Probe => 2,
            Classification::Data => 3,
            Classification::Lor => 4,
            Classification::Remove => 5,
        }
    }

    fn from_frame(kind: FrameKind) -> Option<Classification> {
        match kind {
            FrameKind::Beacon | FrameKind::ProbeResponse => Some(Classification::Ap),
            FrameKind::AdHoc => Some(Classification::Adhoc),
            FrameKind::ProbeRequest => Some(Classification::Probe),
            FrameKind::Data => Some(Classification::Data),
            FrameKind::Noise | FrameKind::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClientCounters {
    pub to_ap: u64,
    pub from_ap: u64,
}

#[derive(Debug, Clone)]
pub struct Client {
    pub mac: MacAddr,
    pub counters: ClientCounters,
    pub gps: Option<GpsTrail>,
}

#[derive(Debug, Clone)]
pub struct Network {
    pub bssid: MacAddr,
    pub classification: Classification,
    pub ssid: Option<String>,
    pub beacon_info: String,
    pub channel: u16,
    pub wep: bool,
    pub first_time: i64,
    pub last_time: i64,
    pub llc_packets: u64,
    pub data_packets: u64,
    pub crypt_packets: u64,
    pub interesting_packets: u64,
    pub address: Option<IpRange>,
    pub cisco_equip: BTreeMap<String, CdpEntry>,
    pub clients: BTreeMap<MacAddr, Client>,
    pub gps: Option<GpsTrail>,
}

impl Network {
    fn new(bssid: MacAddr, classification: Classification, time: i64) -> Self {
        Self {
            bssid,
            classification,
            ssid: None,
            beacon_info: String::new(),
            channel: 0,
            wep: false,
            first_time: time,
            last_time: time,
            llc_packets: 0,
            data_packets: 0,
            crypt_packets: 0,
            interesting_packets: 0,
            address: None,
            cisco_equip: BTreeMap::new(),
            clients: BTreeMap::new(),
            gps: None,
        }
    }
}

#[derive(Default)]
struct TrackerCounters {
    packets: u64,
    crypt: u64,
    interesting: u64,
    noise: u64,
    dropped: u64,
}

pub struct Tracker {
    networks: BTreeMap<MacAddr, Network>,
    ssid_map: CloakMap,
    ip_map: IpMap,
    counters: TrackerCounters,
    current_fix: Option<GpsFix>,
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            networks: BTreeMap::new(),
            ssid_map: CloakMap::disabled(),
            ip_map: IpMap::disabled(),
            counters: TrackerCounters::default(),
            current_fix: None,
        }
    }

    pub fn with_ssid_map(mut self, path: &Path) -> Result<Self> {
        self.ssid_map = CloakMap::open(path)?;
        Ok(self)
    }

    pub fn with_ip_map(mut self, path: &Path) -> Result<Self> {
        self.ip_map = IpMap::open(path)?;
        Ok(self)
    }

    /// Fold the current GPS fix into every network/client touched by
    /// the next [`Tracker::process_packet`] call. Called once per tick
    /// by the event loop before the next packet is processed.
    pub fn set_gps_fix(&mut self, fix: Option<GpsFix>) {
        self.current_fix = fix;
    }

    /// Integrate one frame. Returns `Some(status)` for a notable event
    /// (new network), `None` otherwise. Never fails: malformed or
    /// unclassifiable frames are counted as dropped and ignored.
    pub fn process_packet(&mut self, info: &PacketInfo) -> Option<String> {
        if matches!(info.kind, FrameKind::Noise) {
            self.counters.noise += 1;
            return None;
        }

        let Some(default_class) = Classification::from_frame(info.kind) else {
            self.counters.dropped += 1;
            return None;
        };

        let is_new = !self.networks.contains_key(&info.bssid_mac);
        let bssid = info.bssid_mac;

        let net = self
            .networks
            .entry(bssid)
            .or_insert_with(|| Network::new(bssid, default_class, info.time));

        net.last_time = net.last_time.max(info.time);
        if info.channel != 0 {
            net.channel = info.channel;
        }
        net.wep = net.wep || info.wep;

        match info.kind {
            FrameKind::Beacon | FrameKind::ProbeResponse | FrameKind::ProbeRequest => {
                net.llc_packets += 1;
            }
            FrameKind::Data => {
                net.data_packets += 1;
            }
            _ => {}
        }
        if info.wep {
            net.crypt_packets += 1;
            self.counters.crypt += 1;
        }
        if info.encrypted || info.wep {
            net.interesting_packets += 1;
            self.counters.interesting += 1;
        }
        self.counters.packets += 1;

        if matches!(info.kind, FrameKind::Beacon | FrameKind::ProbeResponse) {
            net.ssid = self.ssid_map.resolve(bssid, info.ssid.as_deref());
        }

        if let Some(inferred) = info.inferred_address {
            if inferred.kind != AddressKind::None {
                let candidate = IpRange {
                    kind: inferred.kind,
                    network: inferred.network,
                    prefix_len: inferred.prefix_len,
                };
                net.address = Some(self.ip_map.widen(bssid, candidate));
            }
        }

        if let Some(cdp) = &info.cdp {
            net.cisco_equip.insert(cdp.device_id.clone(), cdp.clone());
        }

        if let Some(fix) = self.current_fix {
            match &mut net.gps {
                Some(trail) => trail.fold(fix),
                None => net.gps = Some(GpsTrail::first_fix(fix)),
            }
        }

        if info.source_mac != bssid && !info.source_mac.is_broadcast() {
            let client = net
                .clients
                .entry(info.source_mac)
                .or_insert_with(|| Client {
                    mac: info.source_mac,
                    counters: ClientCounters::default(),
                    gps: None,
                });
            client.counters.to_ap += 1;
            if let Some(fix) = self.current_fix {
                match &mut client.gps {
                    Some(trail) => trail.fold(fix),
                    None => client.gps = Some(GpsTrail::first_fix(fix)),
                }
            }
        }

        if is_new {
            Some(format!("New network '{bssid}' detected"))
        } else {
            None
        }
    }

    pub fn fetch_networks(&self) -> Vec<&Network> {
        self.networks.values().collect()
    }

    pub fn fetch_network(&self, bssid: MacAddr) -> Option<&Network> {
        self.networks.get(&bssid)
    }

    pub fn fetch_num_networks(&self) -> usize {
        self.networks.len()
    }

    pub fn fetch_num_packets(&self) -> u64 {
        self.counters.packets
    }

    pub fn fetch_num_crypt(&self) -> u64 {
        self.counters.crypt
    }

    pub fn fetch_num_interesting(&self) -> u64 {
        self.counters.interesting
    }

    pub fn fetch_num_noise(&self) -> u64 {
        self.counters.noise
    }

    pub fn fetch_num_dropped(&self) -> u64 {
        self.counters.dropped
    }

    pub fn fetch_num_cisco(&self) -> usize {
        self.networks.values().map(|n| n.cisco_equip.len()).sum()
    }

    /// Tombstone a network so it is broadcast once more as `*REMOVE`
    /// before [`Tracker::remove_network`] erases it. Reserved for
    /// explicit policy; the tracker never calls this itself.
    pub fn mark_remove(&mut self, bssid: MacAddr) {
        if let Some(net) = self.networks.get_mut(&bssid) {
            net.classification = Classification::Remove;
        }
    }

    /// Idempotent: removing an unknown BSSID is a no-op.
    pub fn remove_network(&mut self, bssid: MacAddr) {
        self.networks.remove(&bssid);
    }

    pub fn flush_maps(&self) -> Result<()> {
        self.ssid_map.write_full()
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{CdpRecord, InferredAddress};

    fn beacon(bssid: &str, ssid: Option<&str>, time: i64) -> PacketInfo {
        PacketInfo {
            time,
            kind: FrameKind::Beacon,
            source_mac: bssid.parse().unwrap(),
            dest_mac: MacAddr::BROADCAST,
            bssid_mac: bssid.parse().unwrap(),
            ssid: ssid.map(str::to_string),
            channel: 6,
            quality: 0,
            signal: -40,
            noise: -90,
            wep: false,
            encrypted: false,
            beacon_interval: 100,
            iv: None,
            cdp: None,
            inferred_address: None,
            strings: Vec::new(),
        }
    }

    fn data(bssid: &str, time: i64) -> PacketInfo {
        PacketInfo {
            time,
            kind: FrameKind::Data,
            source_mac: "11:22:33:44:55:66".parse().unwrap(),
            dest_mac: bssid.parse().unwrap(),
            bssid_mac: bssid.parse().unwrap(),
            ssid: None,
            channel: 6,
            quality: 0,
            signal: -40,
            noise: -90,
            wep: false,
            encrypted: false,
            beacon_interval: 0,
            iv: None,
            cdp: None,
            inferred_address: None,
            strings: Vec::new(),
        }
    }

    #[test]
    fn bssid_is_unique_and_duplicate_frames_only_bump_counters() {
        let mut tracker = Tracker::new();
        let b = beacon("00:11:22:33:44:55", Some("lab"), 100);
        tracker.process_packet(&b);
        tracker.process_packet(&b);
        assert_eq!(tracker.fetch_num_networks(), 1);
        let net = tracker.fetch_network("00:11:22:33:44:55".parse().unwrap()).unwrap();
        assert_eq!(net.llc_packets, 2);
    }

    #[test]
    fn s1_single_ap_with_data_frame() {
        let mut tracker = Tracker::new();
        tracker.process_packet(&beacon("00:11:22:33:44:55", Some("lab"), 100));
        tracker.process_packet(&data("00:11:22:33:44:55", 101));

        let net = tracker.fetch_network("00:11:22:33:44:55".parse().unwrap()).unwrap();
        assert_eq!(net.ssid.as_deref(), Some("lab"));
        assert_eq!(net.channel, 6);
        assert!(!net.wep);
        assert_eq!(net.data_packets, 1);
    }

    #[test]
    fn s2_cloak_resolution() {
        let mut tracker = Tracker::new();
        let bssid = "AA:BB:CC:DD:EE:FF";
        tracker.process_packet(&beacon(bssid, Some("\0\0\0"), 100));

        let mut probe = beacon(bssid, Some("guest"), 101);
        probe.kind = FrameKind::ProbeResponse;
        tracker.process_packet(&probe);

        tracker.process_packet(&beacon(bssid, Some("\0\0\0"), 102));

        let net = tracker.fetch_network(bssid.parse().unwrap()).unwrap();
        assert_eq!(net.ssid.as_deref(), Some("guest"));
    }

    #[test]
    fn monotonic_counters_never_decrease() {
        let mut tracker = Tracker::new();
        let bssid = "00:11:22:33:44:55";
        let mut last = 0;
        for t in 100..110 {
            tracker.process_packet(&data(bssid, t));
            let net = tracker.fetch_network(bssid.parse().unwrap()).unwrap();
            assert!(net.data_packets >= last);
            last = net.data_packets;
        }
    }

    #[test]
    fn cdp_announcements_merge_by_device_id() {
        let mut tracker = Tracker::new();
        let bssid = "00:11:22:33:44:55";

        let mut first = data(bssid, 100);
        first.cdp = Some(CdpRecord {
            device_id: "switch1".to_string(),
            capabilities: 40,
            interface: "Gi0/1".to_string(),
            ip: "10.0.0.1".to_string(),
            platform: "cisco WS-C2950".to_string(),
            software: "IOS 12.1".to_string(),
        });
        tracker.process_packet(&first);

        let mut second = data(bssid, 101);
        second.cdp = Some(CdpRecord {
            device_id: "switch1".to_string(),
            capabilities: 40,
            interface: "Gi0/2".to_string(),
            ip: "10.0.0.1".to_string(),
            platform: "cisco WS-C2950".to_string(),
            software: "IOS 12.2".to_string(),
        });
        tracker.process_packet(&second);

        let net = tracker.fetch_network(bssid.parse().unwrap()).unwrap();
        assert_eq!(net.cisco_equip.len(), 1);
        assert_eq!(net.cisco_equip["switch1"].interface, "Gi0/2");
    }

    #[test]
    fn inferred_address_widens_the_tracked_ip_range() {
        let mut tracker = Tracker::new();
        let bssid = "00:11:22:33:44:55";

        let mut narrow = data(bssid, 100);
        narrow.inferred_address = Some(InferredAddress {
            kind: AddressKind::Ip4,
            network: "192.168.1.0".parse().unwrap(),
            prefix_len: 24,
        });
        tracker.process_packet(&narrow);

        let mut wide = data(bssid, 101);
        wide.inferred_address = Some(InferredAddress {
            kind: AddressKind::Ip4,
            network: "192.168.0.0".parse().unwrap(),
            prefix_len: 16,
        });
        tracker.process_packet(&wide);

        let net = tracker.fetch_network(bssid.parse().unwrap()).unwrap();
        assert_eq!(net.address.unwrap().prefix_len, 16);
    }

    #[test]
    fn remove_network_is_idempotent() {
        let mut tracker = Tracker::new();
        let bssid: MacAddr = "00:11:22:33:44:55".parse().unwrap();
        tracker.process_packet(&beacon("00:11:22:33:44:55", Some("lab"), 100));
        tracker.remove_network(bssid);
        tracker.remove_network(bssid);
        assert_eq!(tracker.fetch_num_networks(), 0);
    }
}
