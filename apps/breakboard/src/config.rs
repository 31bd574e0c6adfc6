use std::{collections::HashMap, fs, time::Duration};

use client_core::{DEFAULT_CANCEL_KEYWORD, DEFAULT_REMOTE_TIMEOUT};
use storage::DEFAULT_STORAGE_KEY;
use tracing::warn;
use url::Url;

const CONFIG_FILE: &str = "breakboard.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub storage_key: String,
    pub remote_url: Option<Url>,
    /// Bound on each remote request and on the wait for remote work at exit.
    pub remote_timeout: Duration,
    pub admin_passphrase: String,
    pub cancel_keyword: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/breakboard.db".into(),
            storage_key: DEFAULT_STORAGE_KEY.into(),
            remote_url: None,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            admin_passphrase: "1212".into(),
            cancel_keyword: DEFAULT_CANCEL_KEYWORD.into(),
        }
    }
}

impl Settings {
    /// `database_url` as a `sqlite://` URL; blank falls back to the default.
    pub fn resolved_database_url(&self) -> String {
        if self.database_url.trim().is_empty() {
            return Self::default().database_url;
        }
        storage::normalize_database_url(&self.database_url)
    }
}

/// Defaults, then `breakboard.toml` (or the file named by
/// `BREAKBOARD_CONFIG`), then environment variables.
pub fn load_settings() -> Settings {
    let path = std::env::var("BREAKBOARD_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());
    let file = fs::read_to_string(&path).ok();
    settings_from(file.as_deref(), |name| std::env::var(name).ok())
}

fn settings_from(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<HashMap<String, String>>(raw) {
            Ok(file_cfg) => {
                let lookup = |key: &str| file_cfg.get(key).cloned();
                apply(&mut settings, "database_url", lookup("database_url"));
                apply(&mut settings, "storage_key", lookup("storage_key"));
                apply(&mut settings, "remote_url", lookup("remote_url"));
                apply(&mut settings, "remote_timeout_secs", lookup("remote_timeout_secs"));
                apply(&mut settings, "admin_passphrase", lookup("admin_passphrase"));
                apply(&mut settings, "cancel_keyword", lookup("cancel_keyword"));
            }
            Err(err) => warn!("ignoring unreadable {CONFIG_FILE}: {err}"),
        }
    }

    for field in [
        "database_url",
        "storage_key",
        "remote_url",
        "remote_timeout_secs",
        "admin_passphrase",
        "cancel_keyword",
    ] {
        let upper = field.to_ascii_uppercase();
        apply(&mut settings, field, env(&format!("BREAKBOARD_{upper}")));
        apply(&mut settings, field, env(&format!("APP__{upper}")));
    }

    settings
}

fn apply(settings: &mut Settings, field: &str, value: Option<String>) {
    let Some(value) = value else {
        return;
    };
    match field {
        "database_url" => settings.database_url = value,
        "storage_key" => settings.storage_key = value,
        "admin_passphrase" => settings.admin_passphrase = value,
        "cancel_keyword" => settings.cancel_keyword = value,
        "remote_url" if value.trim().is_empty() => settings.remote_url = None,
        "remote_url" => match Url::parse(value.trim()) {
            Ok(url) => settings.remote_url = Some(url),
            Err(err) => warn!("ignoring invalid remote_url '{value}': {err}"),
        },
        "remote_timeout_secs" => match value.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => settings.remote_timeout = Duration::from_secs(secs),
            _ => warn!("ignoring invalid remote_timeout_secs '{value}'"),
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_file_or_env() {
        assert_eq!(settings_from(None, no_env), Settings::default());
    }

    #[test]
    fn file_values_then_env_overrides() {
        let file = r#"
            database_url = "sqlite://./board.db"
            remote_url = "http://127.0.0.1:8080/api/data"
            cancel_keyword = "undo"
        "#;
        let settings = settings_from(Some(file), |name| match name {
            "APP__CANCEL_KEYWORD" => Some("stop".into()),
            "BREAKBOARD_ADMIN_PASSPHRASE" => Some("s3cret".into()),
            _ => None,
        });

        assert_eq!(settings.database_url, "sqlite://./board.db");
        assert_eq!(
            settings.remote_url.as_ref().map(Url::as_str),
            Some("http://127.0.0.1:8080/api/data")
        );
        assert_eq!(settings.cancel_keyword, "stop");
        assert_eq!(settings.admin_passphrase, "s3cret");
        assert_eq!(settings.storage_key, DEFAULT_STORAGE_KEY);
    }

    #[test]
    fn invalid_or_blank_remote_url_disables_sync() {
        let settings = settings_from(Some("remote_url = \"not a url\""), no_env);
        assert!(settings.remote_url.is_none());

        let settings = settings_from(Some("remote_url = \"http://x/api\""), |name| {
            (name == "BREAKBOARD_REMOTE_URL").then(String::new)
        });
        assert!(settings.remote_url.is_none());
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let settings = settings_from(Some("database_url = ["), no_env);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn remote_timeout_reads_whole_seconds() {
        let settings = settings_from(Some("remote_timeout_secs = \"2\""), no_env);
        assert_eq!(settings.remote_timeout, Duration::from_secs(2));

        let settings = settings_from(None, |name| {
            (name == "BREAKBOARD_REMOTE_TIMEOUT_SECS").then(|| "0".to_string())
        });
        assert_eq!(settings.remote_timeout, DEFAULT_REMOTE_TIMEOUT);
    }

    #[test]
    fn database_url_is_normalized_with_blank_default() {
        let mut settings = Settings {
            database_url: "./data/test.db".into(),
            ..Settings::default()
        };
        assert_eq!(settings.resolved_database_url(), "sqlite://./data/test.db");

        settings.database_url = "  ".into();
        assert_eq!(
            settings.resolved_database_url(),
            Settings::default().database_url
        );
    }
}
