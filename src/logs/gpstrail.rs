//! GPS trail log: appended per fix while GPS logging is enabled,
//! finalized on close with an XML wrapper matching the paired
//! network-XML file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::gps::GpsFix;

pub struct GpsTrailDump {
    file: Option<File>,
    path: Option<PathBuf>,
    records: u64,
}

impl GpsTrailDump {
    pub fn new() -> Self {
        Self {
            file: None,
            path: None,
            records: 0,
        }
    }

    pub fn open(&mut self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("opening GPS trail log {path:?}"))?;
        writeln!(file, "<?xml version=\"1.0\"?>\n<gps-trail>")?;
        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn append_fix(&mut self, time: i64, fix: GpsFix) -> Result<()> {
        let Some(file) = self.file.as_mut() else { return Ok(()) };
        writeln!(
            file,
            "  <point time=\"{time}\" lat=\"{}\" lon=\"{}\" alt=\"{}\" spd=\"{}\" mode=\"{}\"/>",
            fix.lat, fix.lon, fix.alt, fix.spd, fix.mode
        )?;
        self.records += 1;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            writeln!(file, "</gps-trail>")?;
            file.flush()?;
        }
        Ok(())
    }

    pub fn fetch_dumped(&self) -> u64 {
        self.records
    }

    pub fn fetch_filename(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Default for GpsTrailDump {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_file_is_well_formed_xml_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gps.xml");
        let mut trail = GpsTrailDump::new();
        trail.open(&path).unwrap();
        trail
            .append_fix(
                100,
                GpsFix {
                    lat: 1.0,
                    lon: 2.0,
                    alt: 3.0,
                    spd: 4.0,
                    mode: 2,
                },
            )
            .unwrap();
        trail.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("<?xml"));
        assert!(content.trim_end().ends_with("</gps-trail>"));
        assert_eq!(trail.fetch_dumped(), 1);
    }
}
