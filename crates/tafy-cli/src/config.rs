//! Node configuration file – reads/writes `~/.tafy/node.toml`.
//!
//! `TAFY_CONFIG` points at a different file. Selected fields can be
//! overridden from the environment, see [`apply_env_overrides`].

use std::fs;
use std::path::PathBuf;

use tafy_runtime::NodeConfig;

pub const CONFIG_ENV: &str = "TAFY_CONFIG";

/// `$TAFY_CONFIG`, or `~/.tafy/node.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".tafy").join("node.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<NodeConfig>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &PathBuf) -> Result<Option<NodeConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: NodeConfig =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `TAFY_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TAFY_DEVICE_ID` | `device_id` |
/// | `TAFY_BROKER_URL` | `broker_url` (empty string clears it) |
/// | `TAFY_SENSOR_INTERVAL_MS` | `timing.sensor_interval_ms` |
pub fn apply_env_overrides(cfg: &mut NodeConfig) {
    if let Ok(v) = std::env::var("TAFY_DEVICE_ID") {
        cfg.device_id = v;
    }
    if let Ok(v) = std::env::var("TAFY_BROKER_URL") {
        cfg.broker_url = (!v.trim().is_empty()).then_some(v);
    }
    if let Ok(v) = std::env::var("TAFY_SENSOR_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
        && ms > 0
    {
        cfg.timing.sensor_interval_ms = ms;
    }
}

/// Save the config, creating the parent directory if necessary.
pub fn save(cfg: &NodeConfig) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &NodeConfig, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&NodeConfig::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_customised_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = NodeConfig::default();
        cfg.drive.wheel_base = 0.25;
        cfg.range.max_range_mm = 1200.0;
        cfg.timing.heartbeat_interval_ms = 5000;
        cfg.safety.emergency_stop_distance_mm = 150.0;
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.drive.wheel_base, 0.25);
        assert_eq!(loaded.range.max_range_mm, 1200.0);
        assert_eq!(loaded.timing.heartbeat_interval_ms, 5000);
        assert_eq!(loaded.safety.emergency_stop_distance_mm, 150.0);
        assert_eq!(loaded.range.quality, cfg.range.quality);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "[drive]\nmax_linear_vel = 0.8\n").unwrap();
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.drive.max_linear_vel, 0.8);
        assert_eq!(loaded.drive.wheel_base, 0.2);
        assert_eq!(loaded.timing.motor_telemetry_interval_ms, 200);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "drive = [not toml").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_tafy_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".tafy"));
        assert!(p.to_string_lossy().ends_with("node.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_device_id() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("TAFY_DEVICE_ID", "rover-9") };
        let mut cfg = NodeConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.device_id, "rover-9");
        unsafe { std::env::remove_var("TAFY_DEVICE_ID") };
    }

    #[test]
    fn apply_env_overrides_sets_and_clears_broker_url() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("TAFY_BROKER_URL", "ws://10.0.0.5:9090") };
        let mut cfg = NodeConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.broker_url.as_deref(), Some("ws://10.0.0.5:9090"));

        unsafe { std::env::set_var("TAFY_BROKER_URL", "") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.broker_url, None);
        unsafe { std::env::remove_var("TAFY_BROKER_URL") };
    }

    #[test]
    fn apply_env_overrides_sensor_interval() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("TAFY_SENSOR_INTERVAL_MS", "25") };
        let mut cfg = NodeConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.timing.sensor_interval_ms, 25);

        unsafe { std::env::set_var("TAFY_SENSOR_INTERVAL_MS", "fast") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.timing.sensor_interval_ms, 25);
        unsafe { std::env::remove_var("TAFY_SENSOR_INTERVAL_MS") };
    }
}
