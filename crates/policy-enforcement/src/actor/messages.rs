//! Mailbox messages and reply addressing

use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;
use twin_telemetry::metrics::MESSAGES_DROPPED;
use twin_types::{CommandResponse, DittoHeaders, Signal};
use uuid::Uuid;

use crate::domain::Outcome;

/// Identity of a reply sender or receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressId(Uuid);

impl AddressId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AddressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where replies go.
#[derive(Debug, Clone)]
pub struct Address {
    id: AddressId,
    label: String,
    tx: mpsc::UnboundedSender<Reply>,
}

impl Address {
    /// Create an address and the receiver its replies arrive on.
    pub fn new(label: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Reply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let address = Self {
            id: AddressId::random(),
            label: label.into(),
            tx,
        };
        (address, rx)
    }

    pub fn id(&self) -> AddressId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Deliver `reply`. Returns `false` when nobody listens anymore.
    pub fn deliver(&self, reply: Reply) -> bool {
        match self.tx.send(reply) {
            Ok(()) => true,
            Err(_) => {
                debug!(address = %self.label, "Reply receiver is gone, discarding reply");
                MESSAGES_DROPPED.with_label_values(&["receiver_gone"]).inc();
                false
            }
        }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// An outcome on its way to a recipient.
#[derive(Debug, Clone)]
pub struct Reply {
    pub outcome: Outcome,
    /// The enforcer that produced the outcome.
    pub from: AddressId,
    /// Who the outcome is ultimately meant for, when it is forwarded
    /// to the parent.
    pub reply_to: Option<Address>,
}

/// Administrative command addressed to an enforcer.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminCommand {
    pub name: String,
    pub headers: DittoHeaders,
}

/// What an enforcer mailbox accepts.
#[derive(Debug)]
pub enum EnforcementMessage {
    /// Authorize a signal and reply to `sender`.
    Signal { signal: Signal, sender: Address },
    /// Filter a response for `sender`; the parent sees the result as well.
    CommandResponse {
        response: CommandResponse,
        sender: Address,
    },
    /// Pub-sub acknowledged a subscription.
    SubscriptionAck { topic: String },
    Admin(AdminCommand),
    /// Anything the enforcer does not understand.
    Unhandled {
        description: String,
        headers: Option<DittoHeaders>,
    },
    /// Stop the mailbox loop. Pipelines already running on a shared pool
    /// still reply; a dedicated pool is shut down with the enforcer.
    Shutdown,
}

impl EnforcementMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Signal { .. } => "signal",
            Self::CommandResponse { .. } => "command_response",
            Self::SubscriptionAck { .. } => "subscription_ack",
            Self::Admin(_) => "admin",
            Self::Unhandled { .. } => "unhandled",
            Self::Shutdown => "shutdown",
        }
    }
}
