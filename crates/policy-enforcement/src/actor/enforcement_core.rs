//! Per-entity enforcer: mailbox loop and dispatch
//!
//! The mailbox loop handles one message at a time and never waits on a
//! pipeline. Every signal or response that needs work is handed to the
//! [`EnforcementPool`] immediately, so several runs for the same entity can
//! be in flight at once and their replies may arrive in any order.
//!
//! | Message            | Action                                        |
//! |--------------------|-----------------------------------------------|
//! | `SubscriptionAck`  | log and ignore                                |
//! | `Admin`            | log an error and drop                         |
//! | `CommandResponse`  | response filtering, or bypass to the parent   |
//! | `Signal`           | authorization, reply to the sender            |
//! | `Unhandled`        | log a warning and drop                        |
//! | `Shutdown`         | stop the loop                                 |

use std::any::Any;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use twin_telemetry::metrics::{MESSAGES_DROPPED, RESPONSES_FILTERED};
use twin_types::{CommandResponse, DittoHeaders, EnforcementError, Signal};

use crate::actor::handle::EnforcerHandle;
use crate::actor::messages::{Address, AddressId, EnforcementMessage, Reply};
use crate::actor::pool::EnforcementPool;
use crate::domain::{EnforcementConfig, Outcome};
use crate::error::{panic_message, PoolError};
use crate::service::filtering::{needs_filtering, record_bypass};
use crate::service::{authorize, filter, EnforcementCollaborators};

/// Enforces policies for one entity.
pub struct EnforcementCore {
    id: AddressId,
    collaborators: EnforcementCollaborators,
    parent: Address,
    pool: EnforcementPool,
    timeout: Option<Duration>,
    mailbox_capacity: usize,
}

impl EnforcementCore {
    /// `parent` is the entity's supervisor; it receives bypassed responses
    /// and a copy of every filtering outcome.
    pub fn new(collaborators: EnforcementCollaborators, parent: Address, pool: EnforcementPool) -> Self {
        Self {
            id: AddressId::random(),
            collaborators,
            parent,
            pool,
            timeout: None,
            mailbox_capacity: EnforcementConfig::default().mailbox_capacity,
        }
    }

    pub fn from_config(
        collaborators: EnforcementCollaborators,
        parent: Address,
        config: &EnforcementConfig,
    ) -> Result<Self, PoolError> {
        let pool = EnforcementPool::from_config(config)?;
        Ok(Self {
            timeout: config.enforcement_timeout,
            mailbox_capacity: config.mailbox_capacity,
            ..Self::new(collaborators, parent, pool)
        })
    }

    /// Bound every pipeline run by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn id(&self) -> AddressId {
        self.id
    }

    /// Start the mailbox loop on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn(self) -> EnforcerHandle {
        let (tx, rx) = mpsc::channel(self.mailbox_capacity.max(1));
        let handle = EnforcerHandle::new(self.id, tx);
        tokio::spawn(self.run(rx));
        handle
    }

    async fn run(self, mut mailbox: mpsc::Receiver<EnforcementMessage>) {
        info!(
            enforcer = %self.id,
            parent = %self.parent.label(),
            dedicated_pool = self.pool.is_dedicated(),
            "Enforcer started"
        );

        while let Some(message) = mailbox.recv().await {
            if self.dispatch(message).is_break() {
                break;
            }
        }

        info!(enforcer = %self.id, "Enforcer stopped");
    }

    fn dispatch(&self, message: EnforcementMessage) -> ControlFlow<()> {
        trace!(enforcer = %self.id, message = message.kind(), "Dispatching");
        match message {
            EnforcementMessage::SubscriptionAck { topic } => {
                debug!(enforcer = %self.id, %topic, "Subscription acknowledged");
            }
            EnforcementMessage::Admin(command) => {
                error!(
                    enforcer = %self.id,
                    command = %command.name,
                    correlation_id = ?command.headers.correlation_id(),
                    "Administrative command reached the enforcer, dropping it"
                );
                MESSAGES_DROPPED.with_label_values(&["admin"]).inc();
            }
            EnforcementMessage::CommandResponse { response, sender } => {
                self.start_filtering(response, sender);
            }
            EnforcementMessage::Signal { signal, sender } => {
                self.start_authorization(signal, sender);
            }
            EnforcementMessage::Unhandled {
                description,
                headers,
            } => {
                warn!(
                    enforcer = %self.id,
                    correlation_id = ?headers.as_ref().and_then(DittoHeaders::correlation_id),
                    %description,
                    "Unhandled message, dropping it"
                );
                MESSAGES_DROPPED.with_label_values(&["unhandled"]).inc();
            }
            EnforcementMessage::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn start_authorization(&self, signal: Signal, sender: Address) {
        let collaborators = self.collaborators.clone();
        let timeout = self.timeout;
        let from = self.id;
        let headers = signal.headers().clone();

        self.pool.spawn(async move {
            let outcome = AssertUnwindSafe(authorize(&collaborators, signal, timeout))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| aborted("authorization", payload, headers));
            sender.deliver(Reply {
                outcome,
                from,
                reply_to: None,
            });
        });
    }

    fn start_filtering(&self, response: CommandResponse, sender: Address) {
        match needs_filtering(&self.collaborators, &response) {
            Ok(false) => {
                record_bypass(&response);
                self.parent.deliver(Reply {
                    outcome: Outcome::FilteredResponse(response),
                    from: self.id,
                    reply_to: Some(sender),
                });
            }
            Ok(true) => {
                let collaborators = self.collaborators.clone();
                let timeout = self.timeout;
                let from = self.id;
                let parent = self.parent.clone();
                let headers = response.headers().clone();

                self.pool.spawn(async move {
                    let outcome = AssertUnwindSafe(filter(&collaborators, response, timeout))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| aborted("filtering", payload, headers));
                    deliver_to_both(&parent, sender, outcome, from);
                });
            }
            Err(error) => {
                RESPONSES_FILTERED.with_label_values(&["failure"]).inc();
                deliver_to_both(&self.parent, sender, Outcome::Rejection(error), self.id);
            }
        }
    }
}

/// Sender and parent both receive the same outcome.
fn deliver_to_both(parent: &Address, sender: Address, outcome: Outcome, from: AddressId) {
    sender.deliver(Reply {
        outcome: outcome.clone(),
        from,
        reply_to: None,
    });
    parent.deliver(Reply {
        outcome,
        from,
        reply_to: Some(sender),
    });
}

/// A run that ended without an outcome still gets a reply.
fn aborted(pipeline: &'static str, payload: Box<dyn Any + Send>, headers: DittoHeaders) -> Outcome {
    let cause = panic_message(payload.as_ref());
    error!(
        pipeline,
        correlation_id = ?headers.correlation_id(),
        %cause,
        "Pipeline ended without an outcome, replying with an internal error"
    );
    Outcome::Rejection(EnforcementError::internal(
        format!("{pipeline} pipeline aborted: {cause}"),
        headers,
    ))
}
