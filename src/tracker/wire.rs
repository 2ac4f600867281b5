//! Deterministic single-line serialization for the push protocol and
//! the plain-text network snapshot
//!
//! Field order for each line type is fixed here and never varies
//! between releases, so a client can parse by position.

use crate::tracker::{CdpEntry, Network};
use crate::packet::PacketInfo;

/// Percent-escape spaces/control bytes/newlines so a naive
/// whitespace-splitting client can still parse the line.
pub fn escape_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b' ' => out.push_str("%20"),
            b'\n' => out.push_str("%0A"),
            b'\r' => out.push_str("%0D"),
            b'%' => out.push_str("%25"),
            0..=0x1f | 0x7f => out.push_str(&format!("%{b:02X}")),
            _ => out.push(b as char),
        }
    }
    out
}

/// `bssid type ssid info llc data crypt interesting channel wep
/// first_time last_time address_type range_ip mask lat lon alt spd fix
/// firstlat firstlon firstalt firstspd firstfix`
pub fn net_to_string(net: &Network) -> String {
    let ssid = net.ssid.as_deref().unwrap_or("");
    let (range_ip, mask) = match net.address {
        Some(r) => (r.network.to_string(), r.prefix_len.to_string()),
        None => ("0.0.0.0".to_string(), "0".to_string()),
    };
    let gps = net.gps;
    format!(
        "{bssid} {classification} {ssid} {info} {llc} {data} {crypt} {interesting} {channel} {wep} {first_time} {last_time} {address_type} {range_ip} {mask} {lat} {lon} {alt} {spd} {fix} {firstlat} {firstlon} {firstalt} {firstspd} {firstfix}",
        bssid = net.bssid,
        classification = net.classification.as_wire(),
        ssid = escape_field(ssid),
        info = escape_field(&net.beacon_info),
        llc = net.llc_packets,
        data = net.data_packets,
        crypt = net.crypt_packets,
        interesting = net.interesting_packets,
        channel = net.channel,
        wep = net.wep as u8,
        first_time = net.first_time,
        last_time = net.last_time,
        address_type = net.address.map(|r| r.kind as u8).unwrap_or(0),
        range_ip = range_ip,
        mask = mask,
        lat = gps.map(|g| g.min_lat).unwrap_or(0.0),
        lon = gps.map(|g| g.min_lon).unwrap_or(0.0),
        alt = gps.map(|g| g.best_alt).unwrap_or(0.0),
        spd = gps.map(|g| g.best_spd).unwrap_or(0.0),
        fix = gps.map(|g| g.first.mode).unwrap_or(0),
        firstlat = gps.map(|g| g.first.lat).unwrap_or(0.0),
        firstlon = gps.map(|g| g.first.lon).unwrap_or(0.0),
        firstalt = gps.map(|g| g.first.alt).unwrap_or(0.0),
        firstspd = gps.map(|g| g.first.spd).unwrap_or(0.0),
        firstfix = gps.map(|g| g.first.mode).unwrap_or(0),
    )
}

/// `device_id capabilities interface ip platform software`
pub fn cdp_to_string(cdp: &CdpEntry) -> String {
    format!(
        "{device_id} {capabilities} {interface} {ip} {platform} {software}",
        device_id = escape_field(&cdp.device_id),
        capabilities = cdp.capabilities,
        interface = escape_field(&cdp.interface),
        ip = escape_field(&cdp.ip),
        platform = escape_field(&cdp.platform),
        software = escape_field(&cdp.software),
    )
}

/// `time type source_mac dest_mac bssid_mac channel quality
/// signal noise wep encrypted`
pub fn packet_to_string(info: &PacketInfo) -> String {
    format!(
        "{time} {kind} {source} {dest} {bssid} {channel} {quality} {signal} {noise} {wep} {encrypted}",
        time = info.time,
        kind = kind_name(info.kind),
        source = info.source_mac,
        dest = info.dest_mac,
        bssid = info.bssid_mac,
        channel = info.channel,
        quality = info.quality,
        signal = info.signal,
        noise = info.noise,
        wep = info.wep as u8,
        encrypted = info.encrypted as u8,
    )
}

fn kind_name(kind: crate::packet::FrameKind) -> &'static str {
    use crate::packet::FrameKind::*;
    match kind {
        Beacon => "beacon",
        ProbeResponse => "proberesp",
        ProbeRequest => "probereq",
        AdHoc => "adhoc",
        Data => "data",
        Noise => "noise",
        Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_space_and_percent() {
        assert_eq!(escape_field("guest wifi"), "guest%20wifi");
        assert_eq!(escape_field("100%"), "100%25");
        assert_eq!(escape_field("a\nb"), "a%0Ab");
    }
}
