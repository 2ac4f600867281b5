//! Binary packet dump: append-forever, rotated by packet quota.
//!
//! The frame parser that would hand this crate raw captured bytes is
//! out of scope, so the record this writer appends is a
//! length-prefixed encoding of [`PacketInfo`] rather than a verbatim
//! wire-format frame. Each record still carries a fixed header (frame
//! time + payload length) ahead of the payload, playing the same role
//! a pcap-style per-frame header would.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::packet::PacketInfo;

use super::{expand_template, Dump};

#[derive(Serialize, Deserialize)]
struct DumpRecord {
    time: i64,
    source_mac: String,
    dest_mac: String,
    bssid_mac: String,
    channel: u16,
    signal: i32,
    wep: bool,
}

impl From<&PacketInfo> for DumpRecord {
    fn from(p: &PacketInfo) -> Self {
        DumpRecord {
            time: p.time,
            source_mac: p.source_mac.to_string(),
            dest_mac: p.dest_mac.to_string(),
            bssid_mac: p.bssid_mac.to_string(),
            channel: p.channel,
            signal: p.signal,
            wep: p.wep,
        }
    }
}

fn write_record(file: &mut File, info: &PacketInfo) -> Result<()> {
    let payload = serde_json::to_vec(&DumpRecord::from(info))?;
    file.write_all(&info.time.to_be_bytes())?;
    file.write_all(&(payload.len() as u32).to_be_bytes())?;
    file.write_all(&payload)?;
    Ok(())
}

/// Append-forever binary dump with quota-based rotation.
///
/// Rotation picks the next free run-number slot rather than reusing
/// the current one, so a rotated-out file is never silently
/// overwritten by the following run.
pub struct BinaryDump {
    template: String,
    title: String,
    quota: Option<u64>,
    run: u32,
    file: Option<File>,
    path: Option<PathBuf>,
    dumped: u64,
    since_rotation: u64,
}

impl BinaryDump {
    pub fn new(template: impl Into<String>, title: impl Into<String>, quota: Option<u64>) -> Self {
        Self {
            template: template.into(),
            title: title.into(),
            quota,
            run: 0,
            file: None,
            path: None,
            dumped: 0,
            since_rotation: 0,
        }
    }

    /// Rotate to the next free run slot if the configured quota has
    /// been exceeded. Returns a status line for the push server when a
    /// rotation happened.
    pub fn maybe_rotate(&mut self) -> Result<Option<String>> {
        let Some(quota) = self.quota else { return Ok(None) };
        if self.since_rotation < quota {
            return Ok(None);
        }
        let old = self.path.clone();
        self.open_next_slot()?;
        Ok(Some(format!(
            "Rotated packet dump from {:?} to {:?}",
            old, self.path
        )))
    }

    fn open_next_slot(&mut self) -> Result<()> {
        let run = super::find_free_slot(&self.template, &self.title, &["dump"])?;
        let path = expand_template(&self.template, &self.title, "dump", run);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening packet dump {path:?}"))?;
        self.run = run;
        self.file = Some(file);
        self.path = Some(path);
        self.since_rotation = 0;
        Ok(())
    }
}

impl Dump for BinaryDump {
    fn open(&mut self, _path: &Path) -> Result<()> {
        self.open_next_slot()
    }

    fn dump_packet(&mut self, info: &PacketInfo) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        write_record(file, info)?;
        self.dumped += 1;
        self.since_rotation += 1;
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
        "dump"
    }
}

/// Remove the dump's current file if nothing was ever written to it,
/// matching the shutdown empty-file policy.
pub fn unlink_if_empty(dump: &BinaryDump) -> Result<()> {
    if dump.fetch_dumped() == 0 {
        if let Some(path) = dump.fetch_filename() {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::MacAddr;
    use crate::packet::FrameKind;

    fn frame(bssid: &str, time: i64) -> PacketInfo {
        PacketInfo {
            time,
            kind: FrameKind::Data,
            source_mac: MacAddr::ZERO,
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
    fn rotation_splits_seven_frames_into_three_run_files() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/%t-%i.%n", dir.path().display());
        let mut dump = BinaryDump::new(template, "aether", Some(3));
        dump.open(Path::new("")).unwrap();

        for i in 0..7 {
            dump.dump_packet(&frame("00:11:22:33:44:55", 100 + i)).unwrap();
            dump.maybe_rotate().unwrap();
        }
        dump.close().unwrap();

        assert_eq!(dump.run, 3);
        assert_eq!(dump.fetch_dumped(), 7);

        // Quota 3 over 7 frames: two full runs plus a trailing partial one.
        let record_len = fs::metadata(dir.path().join("aether-03.dump")).unwrap().len();
        assert_eq!(fs::metadata(dir.path().join("aether-01.dump")).unwrap().len(), record_len * 3);
        assert_eq!(fs::metadata(dir.path().join("aether-02.dump")).unwrap().len(), record_len * 3);
    }

    #[test]
    fn unlink_if_empty_deletes_untouched_dump_file() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/%t-%i.%n", dir.path().display());
        let mut dump = BinaryDump::new(template, "aether", None);
        dump.open(Path::new("")).unwrap();
        let path = dump.fetch_filename().unwrap().to_path_buf();
        dump.close().unwrap();

        assert!(path.exists());
        unlink_if_empty(&dump).unwrap();
        assert!(!path.exists());
    }
}
