use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Listen address for the registry API (default: 0.0.0.0:4000).
    pub bind_addr: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Euclidean acceptance radius for a positive match.
    pub accept_distance: f32,
}

impl Config {
    /// Load configuration from `VIGILD_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("vigil");

        let db_path = std::env::var("VIGILD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("faces.db"));

        Self {
            bind_addr: std::env::var("VIGILD_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:4000".to_string()),
            db_path,
            accept_distance: env_f32("VIGILD_ACCEPT_DISTANCE", vigil_core::ACCEPT_DISTANCE),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
