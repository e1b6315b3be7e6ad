use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("failed to encode configuration: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Flat record persisted in `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    pub camera_id: i64,
    pub image_path: String,
    /// Empty disables SMS alerts.
    #[serde(default)]
    pub alert_phone_number: String,
    /// Seconds between two alerts.
    pub alert_cooldown: i64,
    /// Consecutive unknown frames before alerting.
    pub unknown_threshold: i64,
    #[serde(default = "default_detector_model")]
    pub detector_model: String,
    #[serde(default = "default_recognizer_model")]
    pub recognizer_model: String,
}

fn default_detector_model() -> String {
    "models/face_detection_yunet_2023mar.onnx".to_string()
}
fn default_recognizer_model() -> String {
    "models/face_recognition_sface_2021dec.onnx".to_string()
}

impl Default for StoredConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            image_path: "./images".to_string(),
            alert_phone_number: String::new(),
            alert_cooldown: 300,
            unknown_threshold: 3,
            detector_model: default_detector_model(),
            recognizer_model: default_recognizer_model(),
        }
    }
}

/// Validated settings for one surveillance run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub camera_id: u32,
    pub gallery_path: PathBuf,
    /// `None` when alerting is disabled.
    pub alert_phone_number: Option<String>,
    pub alert_cooldown_secs: u64,
    pub unknown_threshold: u32,
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
}

impl SessionConfig {
    pub fn alerts_enabled(&self) -> bool {
        self.alert_phone_number.is_some()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}

/// Camera ids are device indices: 0 up to `i32::MAX`.
pub fn validate_camera_id(value: i64) -> Result<u32, ConfigError> {
    i32::try_from(value)
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| {
            invalid("camera_id", format!("{} must be between 0 and {}", value, i32::MAX))
        })
}

pub fn validate_cooldown(value: i64) -> Result<u64, ConfigError> {
    u64::try_from(value)
        .map_err(|_| invalid("alert_cooldown", format!("{} must be 0 or greater", value)))
}

pub fn validate_threshold(value: i64) -> Result<u32, ConfigError> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v >= 1)
        .ok_or_else(|| invalid("unknown_threshold", format!("{} must be 1 or greater", value)))
}

impl TryFrom<StoredConfig> for SessionConfig {
    type Error = ConfigError;

    fn try_from(stored: StoredConfig) -> Result<Self, Self::Error> {
        if stored.image_path.trim().is_empty() {
            return Err(invalid("image_path", "must not be empty"));
        }
        let phone = stored.alert_phone_number.trim();
        Ok(Self {
            camera_id: validate_camera_id(stored.camera_id)?,
            gallery_path: PathBuf::from(stored.image_path),
            alert_phone_number: (!phone.is_empty()).then(|| phone.to_string()),
            alert_cooldown_secs: validate_cooldown(stored.alert_cooldown)?,
            unknown_threshold: validate_threshold(stored.unknown_threshold)?,
            detector_model: PathBuf::from(stored.detector_model),
            recognizer_model: PathBuf::from(stored.recognizer_model),
        })
    }
}

/// Load `path` with `SECURE_HOME__*` environment overrides.
///
/// A missing file is not an error: returns `Ok(None)`.
pub fn load(path: &Path) -> Result<Option<StoredConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let cfg = ::config::Config::builder()
        .add_source(::config::File::from(path).format(::config::FileFormat::Json))
        .add_source(::config::Environment::with_prefix("SECURE_HOME").separator("__"))
        .build()?;
    Ok(Some(cfg.try_deserialize()?))
}

/// Whether `init` should run the wizard.
///
/// With `reset` the existing file is not read at all, so a corrupt or
/// incomplete configuration can always be replaced.
pub fn needs_setup(path: &Path, reset: bool) -> Result<bool, ConfigError> {
    if reset {
        return Ok(true);
    }
    Ok(load(path)?.is_none())
}

pub fn save(path: &Path, stored: &StoredConfig) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(stored)?;
    std::fs::write(path, json).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_absent() {
        let _env = crate::env_lock();
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(load(&dir.path().join("config.json")).unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let _env = crate::env_lock();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let stored = StoredConfig {
            camera_id: 2,
            image_path: "/srv/faces".into(),
            alert_phone_number: "+15551234567".into(),
            alert_cooldown: 60,
            unknown_threshold: 5,
            ..StoredConfig::default()
        };
        save(&path, &stored).unwrap();
        assert_eq!(load(&path).unwrap(), Some(stored));
    }

    #[test]
    fn test_model_paths_default_when_absent() {
        let _env = crate::env_lock();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"camera_id": 0, "image_path": "./images", "alert_phone_number": "",
                "alert_cooldown": 300, "unknown_threshold": 3}"#,
        )
        .unwrap();
        assert_eq!(load(&path).unwrap(), Some(StoredConfig::default()));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let _env = crate::env_lock();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load(&path), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_session_from_defaults() {
        let session = SessionConfig::try_from(StoredConfig::default()).unwrap();
        assert_eq!(session.camera_id, 0);
        assert_eq!(session.alert_cooldown_secs, 300);
        assert_eq!(session.unknown_threshold, 3);
        assert_eq!(session.alert_phone_number, None);
        assert!(!session.alerts_enabled());
    }

    #[test]
    fn test_phone_is_trimmed() {
        let stored = StoredConfig {
            alert_phone_number: " +15550001 ".into(),
            ..StoredConfig::default()
        };
        let session = SessionConfig::try_from(stored).unwrap();
        assert_eq!(session.alert_phone_number.as_deref(), Some("+15550001"));
    }

    #[test]
    fn test_validation_rules() {
        let bad = |f: fn(&mut StoredConfig)| {
            let mut s = StoredConfig::default();
            f(&mut s);
            SessionConfig::try_from(s).unwrap_err()
        };
        let field = |e: ConfigError| match e {
            ConfigError::Invalid { field, .. } => field,
            other => panic!("unexpected error: {}", other),
        };
        assert_eq!(field(bad(|s| s.camera_id = -1)), "camera_id");
        assert_eq!(field(bad(|s| s.alert_cooldown = -5)), "alert_cooldown");
        assert_eq!(field(bad(|s| s.unknown_threshold = 0)), "unknown_threshold");
        assert_eq!(field(bad(|s| s.image_path = "  ".into())), "image_path");

        let zero_cooldown = StoredConfig {
            alert_cooldown: 0,
            unknown_threshold: 1,
            ..StoredConfig::default()
        };
        assert!(SessionConfig::try_from(zero_cooldown).is_ok());
    }

    #[test]
    fn test_camera_id_fits_device_index() {
        assert_eq!(validate_camera_id(i64::from(i32::MAX)).unwrap(), i32::MAX as u32);
        assert!(validate_camera_id(i64::from(i32::MAX) + 1).is_err());
        assert!(validate_camera_id(i64::from(u32::MAX)).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let _env = crate::env_lock();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        save(&path, &StoredConfig::default()).unwrap();

        std::env::set_var("SECURE_HOME__UNKNOWN_THRESHOLD", "7");
        std::env::set_var("SECURE_HOME__ALERT_PHONE_NUMBER", "+15551234567");
        let loaded = load(&path);
        std::env::remove_var("SECURE_HOME__UNKNOWN_THRESHOLD");
        std::env::remove_var("SECURE_HOME__ALERT_PHONE_NUMBER");

        let stored = loaded.unwrap().unwrap();
        assert_eq!(stored.unknown_threshold, 7);
        assert_eq!(stored.alert_phone_number, "+15551234567");
        assert_eq!(stored.alert_cooldown, 300);
    }

    #[test]
    fn test_reset_replaces_corrupt_file() {
        let _env = crate::env_lock();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ \"camera_id\": ").unwrap();

        assert!(needs_setup(&path, false).is_err());
        assert!(needs_setup(&path, true).unwrap());
    }

    #[test]
    fn test_existing_config_skips_setup_unless_reset() {
        let _env = crate::env_lock();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        assert!(needs_setup(&path, false).unwrap());

        save(&path, &StoredConfig::default()).unwrap();
        assert!(!needs_setup(&path, false).unwrap());
        assert!(needs_setup(&path, true).unwrap());
    }
}
