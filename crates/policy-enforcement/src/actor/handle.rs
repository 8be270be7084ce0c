//! Handle to a running enforcer

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;
use twin_telemetry::metrics::MESSAGES_DROPPED;
use twin_types::Signal;

use crate::actor::messages::{Address, AddressId, EnforcementMessage, Reply};
use crate::domain::Outcome;
use crate::error::AskError;

/// Bound for request/reply exchanges with a local enforcer.
pub const LOCAL_ASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends messages to one enforcer's mailbox.
///
/// The enforcer stops once every handle is dropped or
/// [`shutdown`](Self::shutdown) was sent.
#[derive(Debug, Clone)]
pub struct EnforcerHandle {
    id: AddressId,
    mailbox: mpsc::Sender<EnforcementMessage>,
}

impl EnforcerHandle {
    pub(crate) fn new(id: AddressId, mailbox: mpsc::Sender<EnforcementMessage>) -> Self {
        Self { id, mailbox }
    }

    /// Identity replies from this enforcer carry in [`Reply::from`].
    pub fn id(&self) -> AddressId {
        self.id
    }

    /// Fire and forget. Waits for mailbox space when the mailbox is full.
    pub async fn tell(&self, message: EnforcementMessage) -> Result<(), AskError> {
        self.mailbox.send(message).await.map_err(|rejected| {
            debug!(
                enforcer = %self.id,
                message = rejected.0.kind(),
                "Enforcer mailbox closed, dropping message"
            );
            MESSAGES_DROPPED.with_label_values(&["mailbox_closed"]).inc();
            AskError::MailboxClosed
        })
    }

    /// Send the message built by `make` with a fresh reply address and wait
    /// up to [`LOCAL_ASK_TIMEOUT`] for the first reply.
    ///
    /// A response that bypasses filtering is only forwarded to the parent,
    /// so asking with one times out.
    pub async fn ask<F>(&self, make: F) -> Result<Reply, AskError>
    where
        F: FnOnce(Address) -> EnforcementMessage,
    {
        self.ask_within(LOCAL_ASK_TIMEOUT, make).await
    }

    pub async fn ask_within<F>(&self, timeout: Duration, make: F) -> Result<Reply, AskError>
    where
        F: FnOnce(Address) -> EnforcementMessage,
    {
        let (address, mut replies) = Address::new("ask");
        self.tell(make(address)).await?;
        match tokio::time::timeout(timeout, replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(AskError::NoReply),
            Err(_) => Err(AskError::Timeout(timeout)),
        }
    }

    /// Authorize `signal` and wait for the outcome.
    pub async fn ask_signal(&self, signal: Signal) -> Result<Outcome, AskError> {
        let reply = self
            .ask(|sender| EnforcementMessage::Signal { signal, sender })
            .await?;
        Ok(reply.outcome)
    }

    pub async fn shutdown(&self) -> Result<(), AskError> {
        self.tell(EnforcementMessage::Shutdown).await
    }

    /// Resolves once the enforcer's mailbox loop has stopped.
    pub async fn closed(&self) {
        self.mailbox.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }
}
