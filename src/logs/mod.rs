//! Multi-stream persistence: the six log writers, their filename
//! templating/rotation-slot search, and the empty-file unlink policy
//! applied at shutdown.

pub mod dump;
pub mod gpstrail;
pub mod snapshot;
pub mod weak;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

/// Shared contract for the two append-forever writers (binary dump,
/// weak subset). Truncate-and-rewrite snapshot writers do not share
/// this trait since they have no running dumped-count or rotation.
pub trait Dump {
    fn open(&mut self, path: &Path) -> Result<()>;
    fn dump_packet(&mut self, info: &crate::packet::PacketInfo) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn fetch_dumped(&self) -> u64;
    fn fetch_filename(&self) -> Option<&Path>;
    fn fetch_type(&self) -> &str;
}

/// Expand a log template against a title, a log-type name, and a run
/// number. Recognized placeholders: `%t` (title), `%n` (log type
/// name), `%i` (run number, two digits, zero padded).
pub fn expand_template(template: &str, title: &str, name: &str, run: u32) -> PathBuf {
    let expanded = template
        .replace("%t", title)
        .replace("%n", name)
        .replace("%i", &format!("{run:02}"));
    PathBuf::from(expanded)
}

/// Find the lowest run number in `1..=99` for which every name in
/// `names` expands to a path that does not yet exist, so a fresh run
/// never clobbers a previous one's files.
pub fn find_free_slot(template: &str, title: &str, names: &[&str]) -> Result<u32> {
    for run in 1..=99u32 {
        if names
            .iter()
            .all(|name| !expand_template(template, title, name, run).exists())
        {
            return Ok(run);
        }
    }
    Err(anyhow::anyhow!(
        "no free log slot in 1..=99 for template {template:?}"
    ))
}

/// Delete `path` if `dumped == 0`, matching the shutdown-time
/// empty-file policy shared by every log writer.
pub fn unlink_if_empty(path: Option<&Path>, dumped: u64) -> Result<()> {
    if dumped != 0 {
        return Ok(());
    }
    let Some(path) = path else { return Ok(()) };
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_template_substitutes_all_placeholders() {
        let path = expand_template("%t-%i.%n", "aether", "dump", 3);
        assert_eq!(path, PathBuf::from("aether-03.dump"));
    }

    #[test]
    fn find_free_slot_skips_occupied_runs() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/%t-%i.%n", dir.path().display());
        fs::write(expand_template(&template, "aether", "dump", 1), b"x").unwrap();

        let slot = find_free_slot(&template, "aether", &["dump", "weak"]).unwrap();
        assert_eq!(slot, 2);
    }

    #[test]
    fn unlink_if_empty_removes_only_when_dumped_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.dump");
        fs::write(&path, b"data").unwrap();

        unlink_if_empty(Some(&path), 1).unwrap();
        assert!(path.exists());

        unlink_if_empty(Some(&path), 0).unwrap();
        assert!(!path.exists());
    }
}
