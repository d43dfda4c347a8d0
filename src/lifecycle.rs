//! Connection lifecycle controller.
//!
//! Owns the protocol client across its `Connecting → Open → Closed` cycle:
//! bootstraps credentials, connects a fresh client per attempt, persists
//! credential rotations, sends the one-time welcome notification, and
//! restarts after recoverable disconnects with capped exponential backoff.
//! A logout halts the controller; startup failures abort it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::client::{
    ClientError, ClientFactory, EventStream, LinkPreview, MessageBody, OutboundMessage,
    ProtocolClient,
};
use crate::config::BotConfig;
use crate::dispatch::{spawn_reactor, EventHandlers, Reactor};
use crate::pairing;
use crate::session::{self, BlobFetcher};
use crate::store::CredentialStore;
use crate::types::{ClientEvent, ConnectionState, DisconnectReason};

const WELCOME_IMAGE_URL: &str = "https://files.wabot.dev/static/welcome.jpg";
const WELCOME_THUMBNAIL_URL: &str = "https://files.wabot.dev/static/thumb.jpg";
const WELCOME_SOURCE_URL: &str = "https://github.com/wabot-dev/wabot";

/// Backoff applied between recoverable reconnect attempts. Delays double
/// from `base` up to `cap`; after `max_attempts` consecutive failures the
/// controller gives up instead of hot-looping against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.cap)
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("client startup failed: {0}")]
    Startup(#[from] ClientError),
    #[error("giving up after {0} consecutive failed connection cycles")]
    RetriesExhausted(u32),
}

/// What one connection cycle ended with.
enum CycleEnd {
    /// Terminal disconnect; the controller halts and the store is left
    /// untouched for the operator.
    LoggedOut,
    /// Recoverable disconnect; restart after backoff.
    Retry(DisconnectReason),
}

/// Drives the protocol client for the whole process lifetime.
pub struct LifecycleController {
    config: BotConfig,
    store: CredentialStore,
    fetcher: Arc<dyn BlobFetcher>,
    factory: Arc<dyn ClientFactory>,
    handlers: Arc<dyn EventHandlers>,
    retry: RetryPolicy,
    welcomed: bool,
    failures: u32,
}

impl LifecycleController {
    pub fn new(
        config: BotConfig,
        store: CredentialStore,
        fetcher: Arc<dyn BlobFetcher>,
        factory: Arc<dyn ClientFactory>,
        handlers: Arc<dyn EventHandlers>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            factory,
            handlers,
            retry: RetryPolicy::default(),
            welcomed: false,
            failures: 0,
        }
    }

    /// Override the reconnect policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run until logout (Ok) or an unrecoverable error. Each cycle re-runs
    /// the full startup sequence: session bootstrap, then a fresh client.
    pub async fn run(mut self) -> Result<(), LifecycleError> {
        loop {
            let source =
                session::bootstrap(&self.config, &self.store, self.fetcher.as_ref()).await;
            debug!(?source, "session bootstrap complete");

            let (client, mut events) = self
                .factory
                .connect(&self.store, source.auth_mode())
                .await?;
            info!(state = ?ConnectionState::Connecting, "client started");

            let reactor = self
                .config
                .auto_react
                .then(|| spawn_reactor(client.clone()));

            let end = self.drive(client.clone(), &mut events, reactor.as_ref()).await;

            if let Some(reactor) = reactor {
                reactor.shutdown().await;
            }

            match end {
                CycleEnd::LoggedOut => {
                    warn!("logged out; not restarting. clear the session directory and re-pair");
                    return Ok(());
                }
                CycleEnd::Retry(reason) => {
                    self.failures += 1;
                    if self.failures > self.retry.max_attempts {
                        return Err(LifecycleError::RetriesExhausted(self.failures));
                    }
                    let delay = self.retry.delay_for(self.failures);
                    warn!(
                        ?reason,
                        attempt = self.failures,
                        delay_ms = delay.as_millis() as u64,
                        "connection closed, restarting"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Process events from one connection until it closes.
    async fn drive(
        &mut self,
        client: Arc<dyn ProtocolClient>,
        events: &mut EventStream,
        reactor: Option<&Reactor>,
    ) -> CycleEnd {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Connection {
                    state: ConnectionState::Open,
                    ..
                } => {
                    self.failures = 0;
                    if self.welcomed {
                        info!("connection reestablished");
                    } else {
                        self.welcomed = true;
                        info!(bot = %self.config.bot_name, "connected and online");
                        self.send_welcome(client.as_ref()).await;
                    }
                }
                ClientEvent::Connection {
                    state: ConnectionState::Closed,
                    reason,
                } => {
                    let reason = reason.unwrap_or(DisconnectReason::Unknown);
                    if reason.is_terminal() {
                        return CycleEnd::LoggedOut;
                    }
                    return CycleEnd::Retry(reason);
                }
                ClientEvent::Connection {
                    state: ConnectionState::Connecting,
                    ..
                } => debug!("connecting"),
                ClientEvent::CredentialsRotated(material) => {
                    // Persist before touching the next event; losing a
                    // rotation invalidates the stored session.
                    match self.store.persist(&material) {
                        Ok(()) => debug!("rotated credentials persisted"),
                        Err(err) => error!(error = %err, "failed to persist rotated credentials"),
                    }
                }
                ClientEvent::PairingCode(code) => match pairing::render_terminal(&code) {
                    Ok(art) => {
                        info!("scan the QR code below to pair this device");
                        println!("{art}");
                    }
                    Err(err) => warn!(error = %err, "could not render pairing code"),
                },
                ClientEvent::Messages(batch) => {
                    if let Some(reactor) = reactor {
                        reactor.offer(batch.clone());
                    }
                    self.handlers.on_messages(&batch, client.as_ref()).await;
                }
                ClientEvent::Call(call) => {
                    self.handlers.on_call(&call, client.as_ref()).await;
                }
                ClientEvent::Group(update) => {
                    self.handlers.on_group_update(&update, client.as_ref()).await;
                }
            }
        }

        // The event stream ended without a close event: the client died.
        CycleEnd::Retry(DisconnectReason::Unknown)
    }

    /// One-time welcome notification to the bot's own account.
    async fn send_welcome(&self, client: &dyn ProtocolClient) {
        let Some(to) = client.self_jid() else {
            warn!("connected client has no JID, skipping welcome message");
            return;
        };

        let message = OutboundMessage {
            to: to.clone(),
            body: MessageBody::Image {
                url: WELCOME_IMAGE_URL.to_string(),
                caption: format!("connected as {to}"),
                preview: Some(LinkPreview {
                    title: self.config.bot_name.clone(),
                    body: "online and ready".to_string(),
                    thumbnail_url: WELCOME_THUMBNAIL_URL.to_string(),
                    source_url: WELCOME_SOURCE_URL.to_string(),
                }),
            },
        };

        if let Err(err) = client.send_message(message).await {
            warn!(error = %err, "welcome message failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sim::SimFactory;
    use crate::config::Mode;
    use crate::dispatch::LogHandlers;
    use crate::session::{FetchError, SessionToken};
    use crate::types::{
        CallEvent, GroupAction, GroupUpdate, IncomingMessage, MessageBatch, MessageContent,
        MessageInfo, JID,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Fetcher that must never be called.
    struct NoFetch;

    #[async_trait]
    impl BlobFetcher for NoFetch {
        async fn fetch(&self, _token: &SessionToken) -> Result<Vec<u8>, FetchError> {
            panic!("lifecycle tests must not hit the network");
        }
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(4),
            max_attempts: 10,
        }
    }

    fn open() -> ClientEvent {
        ClientEvent::Connection {
            state: ConnectionState::Open,
            reason: None,
        }
    }

    fn closed(reason: DisconnectReason) -> ClientEvent {
        ClientEvent::Connection {
            state: ConnectionState::Closed,
            reason: Some(reason),
        }
    }

    fn controller(factory: Arc<SimFactory>, store: CredentialStore) -> LifecycleController {
        LifecycleController::new(
            BotConfig::default(),
            store,
            Arc::new(NoFetch),
            factory,
            Arc::new(LogHandlers),
        )
        .with_retry_policy(quick_retry())
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            max_attempts: 10,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(5), Duration::from_secs(16));
        assert_eq!(policy.delay_for(9), Duration::from_secs(60));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_logout_is_terminal() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();
        let factory = Arc::new(SimFactory::with_scripts(
            Mode::Private,
            vec![vec![open(), closed(DisconnectReason::LoggedOut)]],
        ));

        controller(factory.clone(), store).run().await.unwrap();
        assert_eq!(factory.connects(), 1);
    }

    #[tokio::test]
    async fn test_recoverable_close_restarts_once() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();
        let factory = Arc::new(SimFactory::with_scripts(
            Mode::Private,
            vec![
                vec![open(), closed(DisconnectReason::NetworkError("reset".into()))],
                vec![open(), closed(DisconnectReason::LoggedOut)],
            ],
        ));

        controller(factory.clone(), store).run().await.unwrap();
        assert_eq!(factory.connects(), 2);
    }

    #[tokio::test]
    async fn test_welcome_sent_exactly_once() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();
        let factory = Arc::new(SimFactory::with_scripts(
            Mode::Private,
            vec![
                vec![open(), closed(DisconnectReason::Replaced)],
                vec![open(), closed(DisconnectReason::LoggedOut)],
            ],
        ));

        controller(factory.clone(), store).run().await.unwrap();

        let clients = factory.clients();
        let total_sent: usize = clients.iter().map(|c| c.sent().len()).sum();
        assert_eq!(total_sent, 1);
        // The welcome went out on the first connection, to the bot itself.
        let sent = clients[0].sent();
        assert_eq!(sent[0].to, clients[0].self_jid().unwrap());
        assert!(matches!(sent[0].body, MessageBody::Image { .. }));
    }

    #[tokio::test]
    async fn test_startup_failure_is_fatal() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();
        let factory = Arc::new(SimFactory::new(Mode::Private).failing_connect());

        let err = controller(factory, store).run().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Startup(_)));
    }

    #[tokio::test]
    async fn test_retries_exhaust_into_error() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();
        let factory = Arc::new(SimFactory::with_scripts(
            Mode::Private,
            vec![
                vec![closed(DisconnectReason::Unknown)],
                vec![closed(DisconnectReason::Unknown)],
                vec![closed(DisconnectReason::Unknown)],
            ],
        ));

        let mut policy = quick_retry();
        policy.max_attempts = 2;
        let controller = controller(factory.clone(), store).with_retry_policy(policy);

        let err = controller.run().await.unwrap_err();
        assert!(matches!(err, LifecycleError::RetriesExhausted(3)));
        assert_eq!(factory.connects(), 3);
    }

    #[tokio::test]
    async fn test_rotation_persists_before_continuing() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();
        let factory = Arc::new(SimFactory::with_scripts(
            Mode::Private,
            vec![vec![
                open(),
                ClientEvent::CredentialsRotated(b"{\"rotated\":1}".to_vec()),
                closed(DisconnectReason::LoggedOut),
            ]],
        ));

        let store_probe = CredentialStore::open(tmp.path()).unwrap();
        controller(factory, store).run().await.unwrap();
        assert_eq!(
            store_probe.load().unwrap().unwrap(),
            b"{\"rotated\":1}".to_vec()
        );
    }

    #[tokio::test]
    async fn test_events_reach_handlers() {
        struct Counting {
            messages: AtomicUsize,
            calls: AtomicUsize,
            groups: AtomicUsize,
        }

        #[async_trait]
        impl EventHandlers for Counting {
            async fn on_messages(&self, batch: &MessageBatch, _client: &dyn ProtocolClient) {
                self.messages
                    .fetch_add(batch.messages.len(), Ordering::SeqCst);
            }

            async fn on_call(&self, _event: &CallEvent, _client: &dyn ProtocolClient) {
                self.calls.fetch_add(1, Ordering::SeqCst);
            }

            async fn on_group_update(&self, _update: &GroupUpdate, _client: &dyn ProtocolClient) {
                self.groups.fetch_add(1, Ordering::SeqCst);
            }
        }

        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();

        let batch = MessageBatch::new(vec![IncomingMessage {
            info: MessageInfo {
                id: "m1".into(),
                sender: JID::user("15550000002"),
                chat: JID::user("15550000002"),
                is_from_me: false,
                is_group: false,
                timestamp: 1_700_000_000,
                push_name: Some("Test User".into()),
            },
            content: MessageContent::Text("hello".into()),
        }]);

        let factory = Arc::new(SimFactory::with_scripts(
            Mode::Private,
            vec![vec![
                open(),
                ClientEvent::Messages(batch),
                ClientEvent::Call(CallEvent {
                    id: "c1".into(),
                    from: JID::user("15550000003"),
                    timestamp: 1_700_000_000,
                }),
                ClientEvent::Group(GroupUpdate {
                    group: "123-456@g.us".parse().unwrap(),
                    participants: vec![JID::user("15550000004")],
                    action: GroupAction::Add,
                }),
                closed(DisconnectReason::LoggedOut),
            ]],
        ));

        let handlers = Arc::new(Counting {
            messages: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            groups: AtomicUsize::new(0),
        });

        let controller = LifecycleController::new(
            BotConfig::default(),
            store,
            Arc::new(NoFetch),
            factory,
            handlers.clone(),
        )
        .with_retry_policy(quick_retry());

        controller.run().await.unwrap();
        assert_eq!(handlers.messages.load(Ordering::SeqCst), 1);
        assert_eq!(handlers.calls.load(Ordering::SeqCst), 1);
        assert_eq!(handlers.groups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auto_react_reaches_client() {
        let tmp = tempdir().unwrap();
        let store = CredentialStore::open(tmp.path()).unwrap();

        let batch = MessageBatch::new(vec![IncomingMessage {
            info: MessageInfo {
                id: "m1".into(),
                sender: JID::user("15550000002"),
                chat: JID::user("15550000002"),
                is_from_me: false,
                is_group: false,
                timestamp: 1_700_000_000,
                push_name: None,
            },
            content: MessageContent::Text("react to me".into()),
        }]);

        let factory = Arc::new(SimFactory::with_scripts(
            Mode::Private,
            vec![vec![
                open(),
                ClientEvent::Messages(batch),
                closed(DisconnectReason::LoggedOut),
            ]],
        ));

        let config = BotConfig::default().with_auto_react(true);
        let controller = LifecycleController::new(
            config,
            store,
            Arc::new(NoFetch),
            factory.clone(),
            Arc::new(LogHandlers),
        )
        .with_retry_policy(quick_retry());

        controller.run().await.unwrap();
        assert_eq!(factory.clients()[0].reactions().len(), 1);
    }
}
