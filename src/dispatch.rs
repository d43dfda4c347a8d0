//! Event forwarding and the auto-reaction side task.
//!
//! The runtime forwards message, call, and group events unmodified to an
//! [`EventHandlers`] implementation. Auto-reactions run in their own
//! supervised task: failures are traced and swallowed, never propagated
//! into the lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{ProtocolClient, Reaction};
use crate::types::{CallEvent, GroupUpdate, MessageBatch};

/// Fixed emoji set sampled uniformly for auto-reactions.
pub const REACTION_EMOJIS: &[&str] = &["❤️", "😂", "👍", "🔥", "😮", "🎉", "🙏", "💯"];

/// External collaborators receiving the raw event payloads together with
/// the live client.
#[async_trait]
pub trait EventHandlers: Send + Sync {
    async fn on_messages(&self, batch: &MessageBatch, client: &dyn ProtocolClient);

    async fn on_call(&self, event: &CallEvent, client: &dyn ProtocolClient);

    async fn on_group_update(&self, update: &GroupUpdate, client: &dyn ProtocolClient);
}

/// Default handlers: log a summary of everything that comes through.
pub struct LogHandlers;

#[async_trait]
impl EventHandlers for LogHandlers {
    async fn on_messages(&self, batch: &MessageBatch, _client: &dyn ProtocolClient) {
        for message in &batch.messages {
            info!(
                from = %message.info.sender,
                chat = %message.info.chat,
                from_me = message.info.is_from_me,
                "message received"
            );
        }
    }

    async fn on_call(&self, event: &CallEvent, _client: &dyn ProtocolClient) {
        info!(from = %event.from, id = %event.id, "incoming call");
    }

    async fn on_group_update(&self, update: &GroupUpdate, _client: &dyn ProtocolClient) {
        info!(
            group = %update.group,
            action = ?update.action,
            participants = update.participants.len(),
            "group update"
        );
    }
}

/// Handle to a running auto-reaction task.
pub struct Reactor {
    tx: mpsc::Sender<MessageBatch>,
    handle: JoinHandle<()>,
}

impl Reactor {
    /// Queue a batch for reaction processing. Best-effort: a full queue
    /// drops the batch with a trace.
    pub fn offer(&self, batch: MessageBatch) {
        if self.tx.try_send(batch).is_err() {
            debug!("auto-react queue full, dropping batch");
        }
    }

    /// Stop the task and report whether it panicked.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "auto-react task ended abnormally");
        }
    }
}

/// Spawn the supervised auto-reaction task. For every queued message that
/// did not originate from the bot's own account, attach one emoji chosen
/// uniformly at random.
pub fn spawn_reactor(client: Arc<dyn ProtocolClient>) -> Reactor {
    let (tx, mut rx) = mpsc::channel::<MessageBatch>(64);

    let handle = tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            for message in batch.messages {
                if message.info.is_from_me {
                    continue;
                }

                let emoji = {
                    let mut rng = rand::thread_rng();
                    match REACTION_EMOJIS.choose(&mut rng) {
                        Some(emoji) => emoji.to_string(),
                        None => continue,
                    }
                };

                let reaction = Reaction {
                    message_id: message.info.id.clone(),
                    chat: message.info.chat.clone(),
                    emoji,
                };

                if let Err(err) = client.send_reaction(reaction).await {
                    warn!(error = %err, message_id = %message.info.id, "auto-react failed");
                }
            }
        }
    });

    Reactor { tx, handle }
}
