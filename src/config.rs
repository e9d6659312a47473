use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Prontuario";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// ViaCEP public endpoint
pub const DEFAULT_LOOKUP_URL: &str = "https://viacep.com.br";
pub const DEFAULT_LOOKUP_TIMEOUT_SECS: u64 = 5;

pub const ENV_LOOKUP_URL: &str = "PRONTUARIO_LOOKUP_URL";
pub const ENV_LOOKUP_TIMEOUT_SECS: &str = "PRONTUARIO_LOOKUP_TIMEOUT_SECS";
pub const ENV_DB_PATH: &str = "PRONTUARIO_DB_PATH";

/// Get the application data directory.
/// Platform data dir when known (`~/.local/share/Prontuario` on Linux),
/// otherwise the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the records database
pub fn database_path() -> PathBuf {
    app_data_dir().join("records.db")
}

/// Log filter used when `RUST_LOG` is unset
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "prontuario_lib=debug"
    } else {
        "prontuario_lib=info"
    }
}

/// Runtime settings for a form engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormConfig {
    pub lookup_base_url: String,
    pub lookup_timeout: Duration,
    pub database_path: PathBuf,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            lookup_base_url: DEFAULT_LOOKUP_URL.to_string(),
            lookup_timeout: Duration::from_secs(DEFAULT_LOOKUP_TIMEOUT_SECS),
            database_path: database_path(),
        }
    }
}

impl FormConfig {
    /// Defaults overridden by `PRONTUARIO_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank or unparseable values
    /// fall back to the default.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var(ENV_LOOKUP_URL) {
            config.lookup_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(raw) = var(ENV_LOOKUP_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.lookup_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    var = ENV_LOOKUP_TIMEOUT_SECS,
                    value = %raw,
                    "Ignoring invalid lookup timeout"
                ),
            }
        }
        if let Some(path) = var(ENV_DB_PATH) {
            config.database_path = PathBuf::from(path);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with(APP_NAME));
    }

    #[test]
    fn database_under_app_data() {
        let db = database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("records.db"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn defaults_without_vars() {
        let config = FormConfig::from_vars(vars(&[]));
        assert_eq!(config, FormConfig::default());
        assert_eq!(config.lookup_base_url, "https://viacep.com.br");
        assert_eq!(config.lookup_timeout, Duration::from_secs(5));
    }

    #[test]
    fn vars_override_defaults() {
        let config = FormConfig::from_vars(vars(&[
            (ENV_LOOKUP_URL, "http://localhost:9000/"),
            (ENV_LOOKUP_TIMEOUT_SECS, "12"),
            (ENV_DB_PATH, "/tmp/forms.db"),
        ]));
        assert_eq!(config.lookup_base_url, "http://localhost:9000");
        assert_eq!(config.lookup_timeout, Duration::from_secs(12));
        assert_eq!(config.database_path, PathBuf::from("/tmp/forms.db"));
    }

    #[test]
    fn invalid_timeout_keeps_default() {
        for raw in ["abc", "0", "  "] {
            let config = FormConfig::from_vars(vars(&[(ENV_LOOKUP_TIMEOUT_SECS, raw)]));
            assert_eq!(config.lookup_timeout, Duration::from_secs(5), "raw={raw:?}");
        }
    }
}
