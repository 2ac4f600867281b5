//! Weak-IV subset dump: append-forever, filtered to WEP frames whose
//! IV matches the classic FMS weak-key pattern. Only opened when
//! `crypt_log` is enabled.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::packet::PacketInfo;

use super::Dump;

/// The commonly published reduced form `(iv[0] + iv[1]) == 1 && iv[2]
/// <= 0x0a` is intentionally not used here; this crate follows the
/// classic FMS weak-IV class test instead.
pub fn is_weak_iv(iv: [u8; 3]) -> bool {
    iv[1] == 0xff && iv[0] >= 3 && iv[0] <= 15
}

pub struct WeakDump {
    file: Option<File>,
    path: Option<PathBuf>,
    dumped: u64,
}

impl WeakDump {
    pub fn new() -> Self {
        Self {
            file: None,
            path: None,
            dumped: 0,
        }
    }
}

impl Default for WeakDump {
    fn default() -> Self {
        Self::new()
    }
}

impl Dump for WeakDump {
    fn open(&mut self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening weak-IV dump {path:?}"))?;
        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn dump_packet(&mut self, info: &PacketInfo) -> Result<()> {
        let Some(iv) = info.iv else { return Ok(()) };
        if !info.wep || !is_weak_iv(iv) {
            return Ok(());
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        writeln!(
            file,
            "{} {} {:02x}{:02x}{:02x}",
            info.time, info.bssid_mac, iv[0], iv[1], iv[2]
        )?;
        self.dumped += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    fn fetch_dumped(&self) -> u64 {
        self.dumped
    }

    fn fetch_filename(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn fetch_type(&self) -> &str {
        "weak"
    }
}
