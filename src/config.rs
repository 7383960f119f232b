//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or an explicit `-c` path), resolves it into
//! typed [`Config`], then applies `GURUH_WORK_DIR` and `GURUH_LOG_LEVEL`
//! overrides.  Secrets (`TELEGRAM_BOT_TOKEN`, `ADMIN_IDS`) are only ever
//! read from the environment.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::AppError;

/// Pattern set used by the question heuristic when none is configured.
pub const DEFAULT_QUESTION_PATTERNS: &[&str] =
    &[r"(mi\b|\?|kim\b|nima\b|qachon\b|qayerda\b|nega\b|qanday\b)$"];

/// Spam signatures used when none are configured: a generic URL and a
/// Telegram deep link.
pub const DEFAULT_SPAM_PATTERNS: &[&str] = &[
    r"http[s]?://(?:[a-zA-Z]|[0-9]|[$-_@.&+]|[!*(),]|(?:%[0-9a-fA-F][0-9a-fA-F]))+",
    r"t\.me/",
];

const DEFAULT_FALLBACK_REPLY: &str = "Bilmadim 🤔";
const DEFAULT_GREETING: &str = "Salom! Men sizga yordam berish uchun tayyorman. \
Savollaringizni yozing yoki o'zimni qiziqtiradigan narsalarni so'rang 😊";

/// Which [`KvBackend`](crate::subsystems::memory::KvBackend) to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process map, discarded on exit.
    Tmp,
    /// One JSON file per key under `{work_dir}/store/`.
    JsonFile,
    /// SQLite database at `{work_dir}/store.db` (feature `store-sqlite`).
    Sqlite,
}

impl StoreBackend {
    fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "tmp" => Ok(Self::Tmp),
            "json_file" => Ok(Self::JsonFile),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(AppError::Config(format!("unknown store backend '{other}'"))),
        }
    }
}

/// Persistent store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory holding legacy flat `<key>.json` files, consulted when the
    /// primary backend has no value for a key.
    pub legacy_dir: Option<PathBuf>,
    /// Upper bound for any single store call.
    pub timeout: Duration,
}

/// Responder behaviour knobs.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Chance in `[0, 1]` that a qualifying message receives a reaction.
    pub reaction_probability: f64,
    /// Reply used for detected questions when no fallback replies are stored.
    pub fallback_reply: String,
    /// Reply to `/start` when it does not resume the bot.
    pub greeting: String,
    pub question_patterns: Vec<String>,
    pub spam_patterns: Vec<String>,
    /// Maximum number of learned Q/A pairs kept (FIFO).  `0` = unbounded.
    pub qa_cap: usize,
    /// Telegram username without the `@`.  When set, `/cmd@other` is not
    /// treated as one of this bot's commands.
    pub bot_username: Option<String>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            reaction_probability: default_reaction_probability(),
            fallback_reply: default_fallback_reply(),
            greeting: default_greeting(),
            question_patterns: default_question_patterns(),
            spam_patterns: default_spam_patterns(),
            qa_cap: default_qa_cap(),
            bot_username: None,
        }
    }
}

/// Webhook (axum) channel configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub enabled: bool,
    /// Socket address to bind the webhook listener to.
    pub bind: String,
    /// Route receiving Telegram updates.
    pub path: String,
    /// Public base URL; when set, the first `GET` on `path` registers
    /// `{public_url}{path}` with Telegram.
    pub public_url: Option<String>,
}

/// Long-polling Telegram channel configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Whether the polling channel is explicitly enabled.
    pub enabled: bool,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub webhook: WebhookConfig,
    pub telegram: TelegramConfig,
    /// Telegram Bot API base URL.
    pub api_base_url: String,
    /// Upper bound for any single outbound call.
    pub outbound_timeout: Duration,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub store: StoreConfig,
    pub responder: ResponderConfig,
    pub comms: CommsConfig,
    /// Raw admin identities from `ADMIN_IDS`.  Empty = unrestricted.
    pub admin_ids: Vec<String>,
    /// From `TELEGRAM_BOT_TOKEN` (or legacy `API_TOKEN`).  Never sourced from TOML.
    pub bot_token: Option<String>,
}

impl Config {
    /// Returns `true` if the webhook channel should be loaded.
    pub fn comms_webhook_should_load(&self) -> bool {
        self.comms.webhook.enabled
    }

    /// Returns `true` if the polling channel should be loaded.
    pub fn comms_telegram_should_load(&self) -> bool {
        self.comms.telegram.enabled
    }
}

// ── Raw TOML shape ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    supervisor: RawSupervisor,
    #[serde(default)]
    store: RawStore,
    #[serde(default)]
    responder: RawResponder,
    #[serde(default)]
    memory: RawMemory,
    #[serde(default)]
    comms: RawComms,
}

#[derive(Deserialize)]
struct RawSupervisor {
    bot_name: String,
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawStore {
    #[serde(default = "default_store_backend")]
    backend: String,
    #[serde(default)]
    legacy_dir: Option<String>,
    #[serde(default = "default_store_timeout_ms")]
    timeout_ms: u64,
}

impl Default for RawStore {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            legacy_dir: None,
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

#[derive(Deserialize)]
struct RawResponder {
    #[serde(default = "default_reaction_probability")]
    reaction_probability: f64,
    #[serde(default = "default_fallback_reply")]
    fallback_reply: String,
    #[serde(default = "default_greeting")]
    greeting: String,
    #[serde(default = "default_question_patterns")]
    question_patterns: Vec<String>,
    #[serde(default = "default_spam_patterns")]
    spam_patterns: Vec<String>,
    #[serde(default)]
    bot_username: Option<String>,
}

impl Default for RawResponder {
    fn default() -> Self {
        Self {
            reaction_probability: default_reaction_probability(),
            fallback_reply: default_fallback_reply(),
            greeting: default_greeting(),
            question_patterns: default_question_patterns(),
            spam_patterns: default_spam_patterns(),
            bot_username: None,
        }
    }
}

#[derive(Deserialize)]
struct RawMemory {
    #[serde(default = "default_qa_cap")]
    qa_cap: usize,
}

impl Default for RawMemory {
    fn default() -> Self {
        Self { qa_cap: default_qa_cap() }
    }
}

#[derive(Deserialize)]
struct RawComms {
    #[serde(default)]
    webhook: RawWebhook,
    #[serde(default)]
    telegram: RawTelegram,
    #[serde(default = "default_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_outbound_timeout_ms")]
    outbound_timeout_ms: u64,
}

impl Default for RawComms {
    fn default() -> Self {
        Self {
            webhook: RawWebhook::default(),
            telegram: RawTelegram::default(),
            api_base_url: default_api_base_url(),
            outbound_timeout_ms: default_outbound_timeout_ms(),
        }
    }
}

#[derive(Deserialize)]
struct RawWebhook {
    /// Defaults to `true`: the webhook is the primary deployment mode.
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_webhook_bind")]
    bind: String,
    #[serde(default = "default_webhook_path")]
    path: String,
    #[serde(default)]
    public_url: Option<String>,
}

impl Default for RawWebhook {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_webhook_bind(),
            path: default_webhook_path(),
            public_url: None,
        }
    }
}

#[derive(Deserialize, Default)]
struct RawTelegram {
    /// Defaults to `false`: long polling must be explicitly enabled.
    #[serde(default)]
    enabled: bool,
}

fn default_log_level() -> String { "info".to_string() }
fn default_store_backend() -> String { "json_file".to_string() }
fn default_store_timeout_ms() -> u64 { 3_000 }
fn default_reaction_probability() -> f64 { 0.6 }
fn default_fallback_reply() -> String { DEFAULT_FALLBACK_REPLY.to_string() }
fn default_greeting() -> String { DEFAULT_GREETING.to_string() }
fn default_question_patterns() -> Vec<String> {
    DEFAULT_QUESTION_PATTERNS.iter().map(|p| p.to_string()).collect()
}
fn default_spam_patterns() -> Vec<String> {
    DEFAULT_SPAM_PATTERNS.iter().map(|p| p.to_string()).collect()
}
fn default_qa_cap() -> usize { 10_000 }
fn default_api_base_url() -> String { "https://api.telegram.org".to_string() }
fn default_outbound_timeout_ms() -> u64 { 10_000 }
fn default_webhook_bind() -> String { "0.0.0.0:8080".to_string() }
fn default_webhook_path() -> String { "/api/telegram".to_string() }

fn default_true() -> bool {
    true
}

// ── Loading ──────────────────────────────────────────────────────────────────

/// Load config from the given path, or `config/default.toml`, then apply
/// env-var overrides.  With no path and no `config/default.toml`, the
/// built-in defaults are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("GURUH_WORK_DIR").ok();
    let log_level_override = env::var("GURUH_LOG_LEVEL").ok();

    let default_path = Path::new("config/default.toml");
    let path = match config_path {
        Some(p) => Path::new(p),
        None if default_path.exists() => default_path,
        None => {
            return resolve(
                builtin_raw(),
                work_dir_override.as_deref(),
                log_level_override.as_deref(),
            );
        }
    };

    load_from(path, work_dir_override.as_deref(), log_level_override.as_deref())
}

/// Internal loader: accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    resolve(parsed, work_dir_override, log_level_override)
}

fn builtin_raw() -> RawConfig {
    RawConfig {
        supervisor: RawSupervisor {
            bot_name: "guruh".to_string(),
            work_dir: "~/.guruh".to_string(),
            log_level: default_log_level(),
        },
        store: RawStore::default(),
        responder: RawResponder::default(),
        memory: RawMemory::default(),
        comms: RawComms::default(),
    }
}

fn resolve(
    parsed: RawConfig,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let s = parsed.supervisor;

    let work_dir = expand_home(work_dir_override.unwrap_or(&s.work_dir));
    let log_level = log_level_override.unwrap_or(&s.log_level).to_string();

    let probability = parsed.responder.reaction_probability;
    if !(0.0..=1.0).contains(&probability) {
        return Err(AppError::Config(format!(
            "reaction_probability must be within [0, 1], got {probability}"
        )));
    }

    let path = parsed.comms.webhook.path;
    if !path.starts_with('/') {
        return Err(AppError::Config(format!("webhook path must start with '/': {path}")));
    }

    let legacy_dir = parsed.store.legacy_dir.map(|dir| {
        let dir = expand_home(&dir);
        if dir.is_absolute() { dir } else { work_dir.join(dir) }
    });

    Ok(Config {
        bot_name: s.bot_name,
        work_dir,
        log_level,
        store: StoreConfig {
            backend: StoreBackend::parse(&parsed.store.backend)?,
            legacy_dir,
            timeout: Duration::from_millis(parsed.store.timeout_ms),
        },
        responder: ResponderConfig {
            reaction_probability: probability,
            fallback_reply: parsed.responder.fallback_reply,
            greeting: parsed.responder.greeting,
            question_patterns: parsed.responder.question_patterns,
            spam_patterns: parsed.responder.spam_patterns,
            qa_cap: parsed.memory.qa_cap,
            bot_username: env::var("BOT_USERNAME")
                .ok()
                .or(parsed.responder.bot_username)
                .map(|u| u.trim().trim_start_matches('@').to_string())
                .filter(|u| !u.is_empty()),
        },
        comms: CommsConfig {
            webhook: WebhookConfig {
                enabled: parsed.comms.webhook.enabled,
                bind: parsed.comms.webhook.bind,
                path,
                public_url: parsed
                    .comms
                    .webhook
                    .public_url
                    .map(|u| u.trim_end_matches('/').to_string())
                    .filter(|u| !u.is_empty()),
            },
            telegram: TelegramConfig {
                enabled: parsed.comms.telegram.enabled,
            },
            api_base_url: parsed.comms.api_base_url.trim_end_matches('/').to_string(),
            outbound_timeout: Duration::from_millis(parsed.comms.outbound_timeout_ms),
        },
        admin_ids: env::var("ADMIN_IDS")
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default(),
        bot_token: env::var("TELEGRAM_BOT_TOKEN")
            .or_else(|_| env::var("API_TOKEN"))
            .ok()
            .filter(|t| !t.trim().is_empty()),
    })
}

/// Split an `ADMIN_IDS` value on commas and whitespace.
pub fn parse_admin_ids(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: tmp store, no token, no admins.
#[cfg(test)]
impl Config {
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            bot_name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            store: StoreConfig {
                backend: StoreBackend::Tmp,
                legacy_dir: None,
                timeout: Duration::from_secs(1),
            },
            responder: ResponderConfig {
                reaction_probability: 0.0,
                qa_cap: 0,
                ..ResponderConfig::default()
            },
            comms: CommsConfig {
                webhook: WebhookConfig {
                    enabled: false,
                    bind: "127.0.0.1:0".into(),
                    path: default_webhook_path(),
                    public_url: None,
                },
                telegram: TelegramConfig { enabled: false },
                api_base_url: "http://localhost:0".into(),
                outbound_timeout: Duration::from_secs(1),
            },
            admin_ids: Vec::new(),
            bot_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[supervisor]
bot_name = "test-bot"
work_dir = "~/.guruh"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_basic_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.bot_name, "test-bot");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.store.backend, StoreBackend::JsonFile);
        assert_eq!(cfg.responder.reaction_probability, 0.6);
        assert_eq!(cfg.responder.qa_cap, 10_000);
        assert_eq!(cfg.comms.webhook.path, "/api/telegram");
        assert!(cfg.comms_webhook_should_load());
        assert!(!cfg.comms_telegram_should_load());
    }

    #[test]
    fn default_patterns_are_present() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.responder.spam_patterns.len(), 2);
        assert_eq!(cfg.responder.question_patterns.len(), 1);
        assert_eq!(cfg.responder.fallback_reply, "Bilmadim 🤔");
    }

    #[test]
    fn sections_override_defaults() {
        let f = write_toml(
            r#"
[supervisor]
bot_name = "b"
work_dir = "/srv/guruh"
log_level = "debug"

[store]
backend = "tmp"
legacy_dir = "legacy"
timeout_ms = 250

[responder]
reaction_probability = 0.25
spam_patterns = ["casino"]
bot_username = "@guruh_bot"

[memory]
qa_cap = 0

[comms.webhook]
bind = "127.0.0.1:9000"
public_url = "https://bot.example.com/"
"#,
        );
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.store.backend, StoreBackend::Tmp);
        assert_eq!(cfg.store.legacy_dir, Some(PathBuf::from("/srv/guruh/legacy")));
        assert_eq!(cfg.store.timeout, Duration::from_millis(250));
        assert_eq!(cfg.responder.reaction_probability, 0.25);
        assert_eq!(cfg.responder.spam_patterns, vec!["casino".to_string()]);
        assert_eq!(cfg.responder.qa_cap, 0);
        assert_eq!(cfg.responder.bot_username.as_deref(), Some("guruh_bot"));
        assert_eq!(cfg.comms.webhook.bind, "127.0.0.1:9000");
        assert_eq!(
            cfg.comms.webhook.public_url.as_deref(),
            Some("https://bot.example.com")
        );
    }

    #[test]
    fn unknown_backend_errors() {
        let f = write_toml(&format!("{MINIMAL_TOML}\n[store]\nbackend = \"redis\"\n"));
        let msg = load_from(f.path(), None, None).unwrap_err().to_string();
        assert!(msg.contains("unknown store backend 'redis'"));
    }

    #[test]
    fn probability_out_of_range_errors() {
        let f = write_toml(&format!("{MINIMAL_TOML}\n[responder]\nreaction_probability = 1.5\n"));
        assert!(load_from(f.path(), None, None).is_err());
    }

    #[test]
    fn admin_ids_split_on_commas_and_spaces() {
        assert_eq!(parse_admin_ids("42, 43 44,,"), vec!["42", "43", "44"]);
        assert!(parse_admin_ids("  ").is_empty());
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.guruh");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".guruh"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn shipped_default_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
        let cfg = load_from(&path, Some("/tmp/guruh"), None).unwrap();
        assert_eq!(cfg.bot_name, "guruh");
        assert_eq!(cfg.responder.question_patterns, default_question_patterns());
        assert_eq!(cfg.responder.spam_patterns, default_spam_patterns());
        assert_eq!(cfg.comms.webhook.public_url, None);
    }

    #[test]
    fn env_overrides_apply() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("/tmp/test-override"), Some("debug")).unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/test-override"));
        assert_eq!(cfg.log_level, "debug");
    }
}
