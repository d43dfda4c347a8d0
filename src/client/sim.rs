//! Simulated protocol transport.
//!
//! Stands in for a real protocol backend the way the engine's in-memory
//! store stands in for a database: the binary runs against it locally and
//! the lifecycle tests script it. Each connection replays a scripted event
//! sequence and records outbound traffic for inspection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::client::{
    ClientError, ClientFactory, EventStream, OutboundMessage, ProtocolClient, Reaction,
};
use crate::config::Mode;
use crate::session::AuthMode;
use crate::store::CredentialStore;
use crate::types::{ClientEvent, ConnectionState, MessageID, JID};

/// Simulated client. Records what the runtime sends through it.
pub struct SimClient {
    jid: JID,
    mode: Mode,
    sent: Mutex<Vec<OutboundMessage>>,
    reactions: Mutex<Vec<Reaction>>,
    fail_sends: bool,
    // Keeps the event channel open while the client is alive.
    _keepalive: mpsc::Sender<ClientEvent>,
}

impl SimClient {
    /// Messages sent through this client so far.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Reactions sent through this client so far.
    pub fn reactions(&self) -> Vec<Reaction> {
        self.reactions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProtocolClient for SimClient {
    async fn send_message(&self, message: OutboundMessage) -> Result<MessageID, ClientError> {
        if self.fail_sends {
            return Err(ClientError::SendFailed("simulated send failure".into()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(format!("{:X}", rand::random::<u64>()))
    }

    async fn send_reaction(&self, reaction: Reaction) -> Result<(), ClientError> {
        if self.fail_sends {
            return Err(ClientError::SendFailed("simulated send failure".into()));
        }
        self.reactions.lock().unwrap().push(reaction);
        Ok(())
    }

    fn self_jid(&self) -> Option<JID> {
        Some(self.jid.clone())
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}

/// Factory producing [`SimClient`]s. Without explicit scripts every
/// connection opens immediately (preceded by a pairing code when the auth
/// mode is interactive) and then idles.
pub struct SimFactory {
    mode: Mode,
    scripts: Mutex<VecDeque<Vec<ClientEvent>>>,
    connects: AtomicUsize,
    clients: Mutex<Vec<Arc<SimClient>>>,
    fail_sends: bool,
    fail_connect: bool,
}

impl SimFactory {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            scripts: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
            clients: Mutex::new(Vec::new()),
            fail_sends: false,
            fail_connect: false,
        }
    }

    /// Queue scripted event sequences, one per connection, consumed in
    /// order. Connections beyond the last script fall back to the default.
    pub fn with_scripts(mode: Mode, scripts: Vec<Vec<ClientEvent>>) -> Self {
        let factory = Self::new(mode);
        *factory.scripts.lock().unwrap() = scripts.into();
        factory
    }

    /// Make every client refuse sends, for exercising error paths.
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    /// Make `connect` itself fail, for exercising startup failures.
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Number of connections made so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Clients handed out so far, oldest first.
    pub fn clients(&self) -> Vec<Arc<SimClient>> {
        self.clients.lock().unwrap().clone()
    }

    fn default_script(auth: AuthMode) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        if auth == AuthMode::Interactive {
            events.push(ClientEvent::PairingCode(pairing_payload()));
            // A paired client hands fresh credential material to the host.
            let creds = serde_json::json!({
                "simulated": true,
                "registeredAt": chrono::Utc::now().to_rfc3339(),
            });
            events.push(ClientEvent::CredentialsRotated(
                creds.to_string().into_bytes(),
            ));
        }
        events.push(ClientEvent::Connection {
            state: ConnectionState::Open,
            reason: None,
        });
        events
    }
}

#[async_trait]
impl ClientFactory for SimFactory {
    async fn connect(
        &self,
        _store: &CredentialStore,
        auth: AuthMode,
    ) -> Result<(Arc<dyn ProtocolClient>, EventStream), ClientError> {
        if self.fail_connect {
            return Err(ClientError::ConnectionFailed(
                "simulated connect failure".into(),
            ));
        }

        self.connects.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(64);
        let client = Arc::new(SimClient {
            jid: JID::user("15550000001"),
            mode: self.mode,
            sent: Mutex::new(Vec::new()),
            reactions: Mutex::new(Vec::new()),
            fail_sends: self.fail_sends,
            _keepalive: tx.clone(),
        });
        self.clients.lock().unwrap().push(client.clone());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Self::default_script(auth));

        tokio::spawn(async move {
            for event in script {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok((client, rx))
    }
}

/// Fabricate a pairing payload in the `ref,key,key` shape real transports
/// emit, so the QR path renders something realistic.
fn pairing_payload() -> String {
    let noise: [u8; 32] = rand::random();
    let identity: [u8; 32] = rand::random();
    let ref_id = format!("{:X}", rand::random::<u64>());
    format!(
        "{},{},{}",
        ref_id,
        base64::encode(noise),
        base64::encode(identity)
    )
}
