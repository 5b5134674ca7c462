use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    errors::Error,
    messaging::{throttled::ThrottleConfig, types::RenderMode},
    Result,
};

/// Typed, immutable bot configuration.
///
/// Loaded once at startup and shared as `Arc<Config>`; components never read the
/// environment themselves.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    /// Users allowed to talk to the bot. Empty means everyone.
    pub allowed_users: Vec<i64>,

    // Delivery
    /// Max characters of the description preview; 0 disables the preview.
    pub preview_text_len: usize,
    pub message_mode: RenderMode,
    pub disable_web_page_preview: bool,
    pub message_template: Option<String>,

    /// Consecutive fetch failures after which subscribers are warned.
    pub error_threshold: u32,

    // Storage
    pub store_file: Option<PathBuf>,

    // Telegram limits
    pub throttle: ThrottleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            allowed_users: Vec::new(),
            preview_text_len: 0,
            message_mode: RenderMode::Html,
            disable_web_page_preview: false,
            message_template: None,
            error_threshold: 100,
            store_file: None,
            throttle: ThrottleConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(env_str)
    }

    /// Build a config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let telegram_bot_token = lookup("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let allowed_users = parse_csv_i64(lookup("ALLOWED_USERS"));

        let preview_text_len = parse_usize(lookup("PREVIEW_TEXT")).unwrap_or(0);
        let message_mode = match lookup("MESSAGE_MODE").and_then(non_empty) {
            Some(raw) => RenderMode::parse(&raw)
                .ok_or_else(|| Error::Config(format!("unknown MESSAGE_MODE: {raw}")))?,
            None => defaults.message_mode,
        };
        let disable_web_page_preview =
            parse_bool(lookup("DISABLE_WEB_PAGE_PREVIEW")).unwrap_or(false);
        let message_template = lookup("MESSAGE_TEMPLATE").and_then(non_empty);

        let error_threshold =
            parse_u32(lookup("ERROR_THRESHOLD")).unwrap_or(defaults.error_threshold);

        let store_file = lookup("STORE_FILE").and_then(non_empty).map(PathBuf::from);

        let throttle = ThrottleConfig {
            global_min_interval: parse_u64(lookup("THROTTLE_GLOBAL_MS"))
                .map(Duration::from_millis)
                .unwrap_or(defaults.throttle.global_min_interval),
            per_chat_min_interval: parse_u64(lookup("THROTTLE_PER_CHAT_MS"))
                .map(Duration::from_millis)
                .unwrap_or(defaults.throttle.per_chat_min_interval),
        };

        Ok(Self {
            telegram_bot_token,
            allowed_users,
            preview_text_len,
            message_mode,
            disable_web_page_preview,
            message_template,
            error_threshold,
            store_file,
            throttle,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_u32(v: Option<String>) -> Option<u32> {
    v.and_then(|s| s.trim().parse::<u32>().ok())
}

fn parse_usize(v: Option<String>) -> Option<usize> {
    v.and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::from_lookup(lookup_from(&[("TELEGRAM_BOT_TOKEN", "t")])).unwrap();
        assert!(cfg.allowed_users.is_empty());
        assert_eq!(cfg.preview_text_len, 0);
        assert_eq!(cfg.message_mode, RenderMode::Html);
        assert!(!cfg.disable_web_page_preview);
        assert_eq!(cfg.error_threshold, 100);
        assert_eq!(cfg.throttle, ThrottleConfig::default());
    }

    #[test]
    fn parses_delivery_settings() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ALLOWED_USERS", "1, 2,x,3"),
            ("PREVIEW_TEXT", "120"),
            ("MESSAGE_MODE", "Markdown"),
            ("DISABLE_WEB_PAGE_PREVIEW", "yes"),
            ("ERROR_THRESHOLD", "5"),
            ("STORE_FILE", "/tmp/fsb.json"),
            ("THROTTLE_PER_CHAT_MS", "10"),
        ]))
        .unwrap();

        assert_eq!(cfg.allowed_users, vec![1, 2, 3]);
        assert_eq!(cfg.preview_text_len, 120);
        assert_eq!(cfg.message_mode, RenderMode::Markdown);
        assert!(cfg.disable_web_page_preview);
        assert_eq!(cfg.error_threshold, 5);
        assert_eq!(cfg.store_file, Some(PathBuf::from("/tmp/fsb.json")));
        assert_eq!(cfg.throttle.per_chat_min_interval, Duration::from_millis(10));
    }

    #[test]
    fn rejects_unknown_message_mode() {
        let err = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("MESSAGE_MODE", "bbcode"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MESSAGE_MODE"));
    }

    #[test]
    fn unquote_strips_matching_quotes_only() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("\"abc'"), "\"abc'");
    }
}
