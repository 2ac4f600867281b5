//! Typed errors for the paths the event loop has to branch on.
//!
//! Configuration/startup failure stays on `anyhow::Result` (see
//! `main.rs`); these variants name the runtime failures the event loop
//! status-broadcasts before escalating, rather than handing clients a
//! bare `Display` string. Per-client socket errors are deliberately not
//! one of these: a single client's connection failing closes that
//! client, it never escalates to the daemon.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("capture source failed: {0}")]
    CaptureFatal(String),

    #[error("gps error: {0}")]
    GpsTransient(String),

    #[error("failed to rotate dump file: {0}")]
    RotationFailed(String),
}
