//! The `packet_info` record produced by the (external) frame parser and
//! consumed by the [`crate::tracker::Tracker`].

use crate::mac::MacAddr;

/// Coarse classification of a captured frame, as filled in by the
/// frame parser from the 802.11 type/subtype pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Beacon,
    ProbeResponse,
    ProbeRequest,
    AdHoc,
    Data,
    Noise,
    Unknown,
}

impl FrameKind {
    /// Whether this frame can create or update a [`crate::tracker::Network`].
    pub fn is_classifiable(self) -> bool {
        !matches!(self, FrameKind::Noise | FrameKind::Unknown)
    }
}

/// Address family inferred from observed traffic for a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressKind {
    #[default]
    None,
    Ip4,
    Ip6,
    Arp,
}

/// A Cisco Discovery Protocol announcement, decoded by the frame parser
/// and handed to the tracker as an already-populated field (CDP/LLC
/// decode itself is out of scope for this crate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdpRecord {
    pub device_id: String,
    pub capabilities: u32,
    pub interface: String,
    pub ip: String,
    pub platform: String,
    pub software: String,
}

/// One captured-and-parsed 802.11 frame.
#[derive(Debug, Clone)]
pub struct PacketInfo {
    pub time: i64,
    pub kind: FrameKind,
    pub source_mac: MacAddr,
    pub dest_mac: MacAddr,
    pub bssid_mac: MacAddr,
    pub ssid: Option<String>,
    pub channel: u16,
    pub quality: i32,
    pub signal: i32,
    pub noise: i32,
    pub wep: bool,
    pub encrypted: bool,
    pub beacon_interval: u16,
    /// Raw WEP IV bytes, when `wep` is set and the frame carries one.
    pub iv: Option<[u8; 3]>,
    /// Populated by the frame parser when this frame carries a CDP
    /// payload; `None` otherwise.
    pub cdp: Option<CdpRecord>,
    /// Populated when the frame parser was able to infer an address
    /// family/value for the transmitting station (ARP snoop, IPv6
    /// source form, broadcast destination).
    pub inferred_address: Option<InferredAddress>,
    /// ASCII strings extracted from the payload, for unencrypted data
    /// frames only; empty otherwise. Exposed here rather than recomputed
    /// in the event loop, since that extraction is the frame parser's
    /// job.
    pub strings: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct InferredAddress {
    pub kind: AddressKind,
    pub network: std::net::Ipv4Addr,
    pub prefix_len: u8,
}

pub const CHANNEL_MAX: usize = 200;
