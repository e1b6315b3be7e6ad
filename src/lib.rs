//! Home entrance face surveillance.
//!
//! Faces seen by the camera are matched against a gallery of residents;
//! persistent unknown presence raises an SMS alert, rate-limited by a
//! cooldown.

pub mod alert;
pub mod classifier;
pub mod config;
pub mod console;
pub mod detection_log;
pub mod face;
pub mod gallery;
pub mod logging;
pub mod notify;
pub mod surveillance;
pub mod wizard;

#[cfg(feature = "camera")]
pub mod vision;

/// Serializes tests that read or write process environment variables.
#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
