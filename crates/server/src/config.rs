use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;
use tracing::warn;

pub const CONFIG_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8443".into(),
            database_url: storage::DEFAULT_DATABASE_URL.into(),
            jwt_secret: "dev-jwt-secret".into(),
            token_ttl_seconds: 8 * 3600,
        }
    }
}

/// Defaults, then `server.toml` in the working directory, then environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    apply_file(&mut settings, Path::new(CONFIG_FILE));
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, path: &Path) {
    let Ok(raw) = fs::read_to_string(path) else {
        return;
    };
    match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
        Ok(file_cfg) => apply_table(settings, &file_cfg),
        Err(err) => warn!(path = %path.display(), error = %err, "ignoring malformed config file"),
    }
}

fn apply_table(settings: &mut Settings, table: &HashMap<String, toml::Value>) {
    let text = |key: &str| table.get(key).and_then(|v| v.as_str()).map(str::to_string);
    if let Some(v) = text("bind_addr") {
        settings.server_bind = v;
    }
    if let Some(v) = text("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = text("jwt_secret") {
        settings.jwt_secret = v;
    }
    if let Some(v) = table.get("token_ttl_seconds").and_then(|v| v.as_integer()) {
        settings.token_ttl_seconds = v;
    }
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = lookup("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = lookup("APP__JWT_SECRET") {
        settings.jwt_secret = v;
    }

    if let Some(v) = lookup("APP__TOKEN_TTL_SECONDS") {
        match v.parse::<i64>() {
            Ok(parsed) if parsed > 0 => settings.token_ttl_seconds = parsed,
            _ => warn!(value = %v, "ignoring invalid APP__TOKEN_TTL_SECONDS"),
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
