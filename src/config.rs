use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating mode advertised to the protocol client and handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Public,
    #[default]
    Private,
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Mode::Public),
            "private" => Ok(Mode::Private),
            _ => Err(()),
        }
    }
}

/// Base configuration for the bot host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotConfig {
    /// Composite session token (`fileId#key`, optionally label-prefixed)
    /// used once at startup to locate the remote credential blob.
    pub session_token: Option<String>,
    /// Whether the bot responds to everyone or only to its own account.
    pub mode: Mode,
    /// Attach a random reaction to incoming messages.
    pub auto_react: bool,
    /// Port for the static asset server.
    pub port: u16,
    /// Directory holding persisted credential material.
    pub session_dir: PathBuf,
    /// Directory served over HTTP.
    pub assets_dir: PathBuf,
    /// Base URL of the remote credential blob service.
    pub storage_url: String,
    /// Name used in the welcome notification.
    pub bot_name: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            session_token: None,
            mode: Mode::Private,
            auto_react: false,
            port: 3000,
            session_dir: "./session".into(),
            assets_dir: "./assets".into(),
            storage_url: "https://files.wabot.dev/session".into(),
            bot_name: "wabot".into(),
        }
    }
}

impl BotConfig {
    /// Build a configuration from the process environment. Absent or
    /// malformed values fall back to defaults; nothing here is fatal.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            session_token: env::var("SESSION_ID").ok().filter(|s| !s.is_empty()),
            mode: env::var("MODE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.mode),
            auto_react: env::var("AUTO_REACT")
                .map(|s| parse_bool(&s))
                .unwrap_or(defaults.auto_react),
            port: env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            session_dir: env::var("SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_dir),
            assets_dir: env::var("ASSETS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.assets_dir),
            storage_url: env::var("STORAGE_URL").unwrap_or(defaults.storage_url),
            bot_name: env::var("BOT_NAME").unwrap_or(defaults.bot_name),
        }
    }

    /// Override the session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Override the operating mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable auto-reactions.
    pub fn with_auto_react(mut self, enabled: bool) -> Self {
        self.auto_react = enabled;
        self
    }

    /// Override the HTTP port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the credential store directory.
    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = dir.into();
        self
    }

    /// Override the static assets directory.
    pub fn with_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    /// Override the blob service base URL.
    pub fn with_storage_url(mut self, url: impl Into<String>) -> Self {
        self.storage_url = url.into();
        self
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
