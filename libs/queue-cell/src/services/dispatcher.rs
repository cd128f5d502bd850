use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{DomainEvent, QueueError};

/// A side effect that runs after an appointment write has committed.
#[async_trait]
pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &DomainEvent) -> Result<(), QueueError>;
}

enum Envelope {
    Event(DomainEvent),
    Flush(oneshot::Sender<()>),
}

/// Outbox for domain events. `publish` only enqueues; one background task
/// hands every event to every hook in publication order, making a single
/// attempt per hook and logging failures.
#[derive(Clone)]
pub struct EventDispatcher {
    sender: mpsc::UnboundedSender<Envelope>,
}

impl EventDispatcher {
    /// Spawns the delivery task on the current tokio runtime.
    pub fn start(hooks: Vec<Arc<dyn PostCommitHook>>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Envelope>();

        let handle = tokio::spawn(async move {
            info!("Event dispatcher started with {} hooks", hooks.len());
            while let Some(envelope) = receiver.recv().await {
                match envelope {
                    Envelope::Event(event) => deliver(&hooks, &event).await,
                    Envelope::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            info!("Event dispatcher stopped");
        });

        (Self { sender }, handle)
    }

    pub fn publish(&self, event: DomainEvent) {
        debug!("Publishing {} for appointment {}", event.name(), event.appointment_id());
        if self.sender.send(Envelope::Event(event)).is_err() {
            warn!("Event dispatcher is not running; event dropped");
        }
    }

    /// Resolves once every event published before this call was delivered.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Envelope::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

async fn deliver(hooks: &[Arc<dyn PostCommitHook>], event: &DomainEvent) {
    for hook in hooks {
        if let Err(e) = hook.handle(event).await {
            warn!(
                "Post-commit hook {} failed for {} on appointment {}: {}",
                hook.name(),
                event.name(),
                event.appointment_id(),
                e
            );
        }
    }
}
