use std::{fs, path::Path, time::Duration};

use tracing::warn;

use crate::{gif::GIF_PREVIEW_LIMIT, types::MAX_CHAT_ATTACHMENTS};

const MAX_GIF_PREVIEW_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct ComposerSettings {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub max_attachments: usize,
    pub gif_preview_limit: usize,
    pub status_ttl: Duration,
    pub request_timeout: Duration,
    pub target_settle: Duration,
    pub message_settle: Duration,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000".into(),
            api_token: None,
            max_attachments: MAX_CHAT_ATTACHMENTS,
            gif_preview_limit: GIF_PREVIEW_LIMIT,
            status_ttl: Duration::from_millis(4000),
            request_timeout: Duration::from_secs(30),
            target_settle: Duration::from_millis(100),
            message_settle: Duration::from_millis(75),
        }
    }
}

/// Defaults, then `composer.toml` in the working directory, then the environment.
pub fn load_settings() -> ComposerSettings {
    let mut settings = ComposerSettings::default();
    let path = Path::new("composer.toml");
    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<toml::Table>(&raw) {
            Ok(table) => apply_file(&mut settings, &table),
            Err(err) => warn!(path = %path.display(), "ignoring unreadable settings file: {err}"),
        }
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn file_value(table: &toml::Table, key: &str) -> Option<String> {
    match table.get(key)? {
        toml::Value::String(v) => Some(v.clone()),
        toml::Value::Integer(v) => Some(v.to_string()),
        _ => None,
    }
}

fn apply_file(settings: &mut ComposerSettings, table: &toml::Table) {
    if let Some(v) = file_value(table, "api_url") {
        settings.api_base_url = v;
    }
    if let Some(v) = file_value(table, "api_token") {
        settings.api_token = Some(v);
    }
    apply_numeric(settings, |key| file_value(table, &key.to_ascii_lowercase()));
}

/// Environment overrides. `lookup` is `std::env::var` outside of tests.
pub fn apply_env(settings: &mut ComposerSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("COMPOSER_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_TOKEN") {
        settings.api_token = Some(v).filter(|token| !token.trim().is_empty());
    }
    apply_numeric(settings, |key| lookup(&format!("APP__{key}")));
}

fn apply_numeric(settings: &mut ComposerSettings, lookup: impl Fn(&str) -> Option<String>) {
    let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

    if let Some(v) = number("MAX_ATTACHMENTS") {
        settings.max_attachments = usize::try_from(v).unwrap_or(MAX_CHAT_ATTACHMENTS).max(1);
    }
    if let Some(v) = number("GIF_PREVIEW_LIMIT") {
        settings.gif_preview_limit = usize::try_from(v)
            .unwrap_or(GIF_PREVIEW_LIMIT)
            .clamp(1, MAX_GIF_PREVIEW_LIMIT);
    }
    if let Some(v) = number("STATUS_TTL_MS") {
        settings.status_ttl = Duration::from_millis(v);
    }
    if let Some(v) = number("REQUEST_TIMEOUT_SECS") {
        settings.request_timeout = Duration::from_secs(v.max(1));
    }
}
