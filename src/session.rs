//! Session bootstrap: local credentials, remote blob download, or pairing.
//!
//! Before the lifecycle controller starts a client, exactly one of three
//! paths must produce a usable credential store: existing local material,
//! a blob downloaded with the configured session token, or interactive
//! pairing. Failures along the way are logged and fall through to the next
//! path; nothing here aborts the process.

use std::io::Read;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::BotConfig;
use crate::store::CredentialStore;

/// Composite identifier for a remotely stored credential blob. Used once
/// at startup and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub file_id: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("session token is missing the '#' delimiter")]
    MissingDelimiter,
    #[error("session token has an empty file id")]
    EmptyFileId,
    #[error("session token has an empty key")]
    EmptyKey,
    #[error("session token has trailing '#' parts")]
    TrailingParts,
}

impl SessionToken {
    /// Parse a token of the form `fileId#key`. A human label prefix ending
    /// in `~` (e.g. `WABOT~abc123#k3y`) is stripped first; the remainder
    /// must split into exactly two non-empty parts.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let raw = match raw.rfind('~') {
            Some(idx) => &raw[idx + 1..],
            None => raw,
        };

        let (file_id, key) = raw.split_once('#').ok_or(TokenError::MissingDelimiter)?;
        if key.contains('#') {
            return Err(TokenError::TrailingParts);
        }
        if file_id.is_empty() {
            return Err(TokenError::EmptyFileId);
        }
        if key.is_empty() {
            return Err(TokenError::EmptyKey);
        }

        Ok(Self {
            file_id: file_id.to_string(),
            key: key.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("blob download failed: {0}")]
    Transport(String),
    #[error("blob service returned status {0}")]
    Status(u16),
    #[error("downloaded blob is not valid credential material: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Resolves a session token against the remote blob service.
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    async fn fetch(&self, token: &SessionToken) -> Result<Vec<u8>, FetchError>;
}

/// HTTP implementation of [`BlobFetcher`]. The service decrypts the blob
/// server-side using the token key and returns credential JSON.
pub struct HttpBlobFetcher {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpBlobFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    fn blob_url(&self, token: &SessionToken) -> String {
        format!(
            "{}/{}?key={}",
            self.base_url.trim_end_matches('/'),
            token.file_id,
            token.key
        )
    }
}

#[async_trait]
impl BlobFetcher for HttpBlobFetcher {
    async fn fetch(&self, token: &SessionToken) -> Result<Vec<u8>, FetchError> {
        let url = self.blob_url(token);
        let agent = self.agent.clone();

        // ureq is blocking; keep it off the event loop.
        tokio::task::spawn_blocking(move || {
            let response = agent.get(&url).call().map_err(|err| match err {
                ureq::Error::Status(code, _) => FetchError::Status(code),
                other => FetchError::Transport(other.to_string()),
            })?;

            let mut body = Vec::new();
            response
                .into_reader()
                .read_to_end(&mut body)
                .map_err(|err| FetchError::Transport(err.to_string()))?;
            Ok(body)
        })
        .await
        .map_err(|err| FetchError::Transport(err.to_string()))?
    }
}

/// Which of the three bootstrap paths was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    /// Credential material was already on disk.
    Local,
    /// Credential material was downloaded and persisted.
    Downloaded,
    /// No usable material; the client must pair interactively.
    Pairing,
}

/// How the client should authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Resume from stored credential material.
    Resume,
    /// Expose a scannable pairing code and wait for the client to
    /// populate the store.
    Interactive,
}

impl SessionSource {
    pub fn auth_mode(self) -> AuthMode {
        match self {
            SessionSource::Local | SessionSource::Downloaded => AuthMode::Resume,
            SessionSource::Pairing => AuthMode::Interactive,
        }
    }
}

/// Produce a usable credential store before the client starts. The three
/// paths are attempted in strict order; each failure is non-fatal.
pub async fn bootstrap(
    config: &BotConfig,
    store: &CredentialStore,
    fetcher: &dyn BlobFetcher,
) -> SessionSource {
    if store.has_credentials() {
        info!("session file found, starting");
        return SessionSource::Local;
    }

    let token = match &config.session_token {
        None => {
            warn!("no session token configured, falling back to pairing");
            return SessionSource::Pairing;
        }
        Some(raw) => match SessionToken::parse(raw) {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "invalid session token, falling back to pairing");
                return SessionSource::Pairing;
            }
        },
    };

    info!(file_id = %token.file_id, "downloading session blob");
    let blob = match fetcher.fetch(&token).await {
        Ok(blob) => blob,
        Err(err) => {
            warn!(error = %err, "session download failed, falling back to pairing");
            return SessionSource::Pairing;
        }
    };

    // The store only ever holds credential JSON; reject anything else
    // before it shadows a real session.
    if let Err(err) = serde_json::from_slice::<serde_json::Value>(&blob) {
        warn!(error = %err, "session blob did not decode, falling back to pairing");
        return SessionSource::Pairing;
    }

    if let Err(err) = store.persist(&blob) {
        warn!(error = %err, "could not persist session blob, falling back to pairing");
        return SessionSource::Pairing;
    }

    info!("session blob downloaded and persisted");
    SessionSource::Downloaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Records fetch calls; answers from a canned response.
    struct FakeFetcher {
        calls: Mutex<Vec<SessionToken>>,
        response: Result<Vec<u8>, ()>,
    }

    impl FakeFetcher {
        fn ok(body: &[u8]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                response: Ok(body.to_vec()),
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                response: Err(()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BlobFetcher for FakeFetcher {
        async fn fetch(&self, token: &SessionToken) -> Result<Vec<u8>, FetchError> {
            self.calls.lock().unwrap().push(token.clone());
            self.response
                .clone()
                .map_err(|_| FetchError::Transport("connection refused".into()))
        }
    }

    #[test]
    fn test_token_parse_plain() {
        let token = SessionToken::parse("abc123#k3y").unwrap();
        assert_eq!(token.file_id, "abc123");
        assert_eq!(token.key, "k3y");
    }

    #[test]
    fn test_token_parse_strips_label_prefix() {
        let token = SessionToken::parse("WABOT~MD~abc123#k3y").unwrap();
        assert_eq!(token.file_id, "abc123");
        assert_eq!(token.key, "k3y");
    }

    #[test]
    fn test_token_parse_rejects_malformed() {
        assert_eq!(
            SessionToken::parse("no-delimiter-here"),
            Err(TokenError::MissingDelimiter)
        );
        assert_eq!(SessionToken::parse("#key"), Err(TokenError::EmptyFileId));
        assert_eq!(SessionToken::parse("file#"), Err(TokenError::EmptyKey));
        assert_eq!(
            SessionToken::parse("file#key#extra"),
            Err(TokenError::TrailingParts)
        );
    }

    #[tokio::test]
    async fn test_local_credentials_skip_download() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();
        store.persist(b"{}").unwrap();

        let config = BotConfig::default().with_session_token("abc#def");
        let fetcher = FakeFetcher::ok(b"{}");

        let source = bootstrap(&config, &store, &fetcher).await;
        assert_eq!(source, SessionSource::Local);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_download_persists_blob() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();

        let config = BotConfig::default().with_session_token("abc123#k3y");
        let fetcher = FakeFetcher::ok(br#"{"noiseKey":"zzz"}"#);

        let source = bootstrap(&config, &store, &fetcher).await;
        assert_eq!(source, SessionSource::Downloaded);
        assert_eq!(source.auth_mode(), AuthMode::Resume);
        assert_eq!(fetcher.call_count(), 1);

        let recorded = fetcher.calls.lock().unwrap();
        assert_eq!(recorded[0].file_id, "abc123");
        assert_eq!(recorded[0].key, "k3y");
        drop(recorded);

        assert!(store.has_credentials());
    }

    #[tokio::test]
    async fn test_malformed_token_skips_fetch() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();

        let config = BotConfig::default().with_session_token("no-delimiter-here");
        let fetcher = FakeFetcher::ok(b"{}");

        let source = bootstrap(&config, &store, &fetcher).await;
        assert_eq!(source, SessionSource::Pairing);
        assert_eq!(source.auth_mode(), AuthMode::Interactive);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_pairing() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();

        let config = BotConfig::default().with_session_token("abc#def");
        let fetcher = FakeFetcher::failing();

        let source = bootstrap(&config, &store, &fetcher).await;
        assert_eq!(source, SessionSource::Pairing);
        assert_eq!(fetcher.call_count(), 1);
        assert!(!store.has_credentials());
    }

    #[tokio::test]
    async fn test_undecodable_blob_falls_back_to_pairing() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();

        let config = BotConfig::default().with_session_token("abc#def");
        let fetcher = FakeFetcher::ok(b"\x00\x01not json");

        let source = bootstrap(&config, &store, &fetcher).await;
        assert_eq!(source, SessionSource::Pairing);
        assert!(!store.has_credentials());
    }

    #[tokio::test]
    async fn test_missing_token_falls_back_to_pairing() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();

        let config = BotConfig::default();
        let fetcher = FakeFetcher::ok(b"{}");

        let source = bootstrap(&config, &store, &fetcher).await;
        assert_eq!(source, SessionSource::Pairing);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[test]
    fn test_blob_url_format() {
        let fetcher = HttpBlobFetcher::new("https://files.example.dev/session/");
        let token = SessionToken::parse("abc#key").unwrap();
        assert_eq!(
            fetcher.blob_url(&token),
            "https://files.example.dev/session/abc?key=key"
        );
    }
}
