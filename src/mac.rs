//! 48-bit hardware address used to key networks and clients.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

/// A parsed 802.11 MAC address.
///
/// Formatted as `AA:BB:CC:DD:EE:FF` for every broadcast line; stored
/// verbatim (no case folding) for binary dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut out = [0u8; 6];
        let mut parts = s.split(':');
        for slot in out.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| anyhow!("MAC address '{s}' has too few octets"))?;
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| anyhow!("MAC address '{s}' has a non-hex octet '{part}'"))?;
        }
        if parts.next().is_some() {
            return Err(anyhow!("MAC address '{s}' has too many octets"));
        }
        Ok(MacAddr(out))
    }
}

impl serde::Serialize for MacAddr {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for MacAddr {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        MacAddr::from_str(&s).map_err(serde::de::Error::custom)
    }
}
