//! Per-run event fan-out.

use std::{collections::HashMap, fmt, sync::Arc};

use futures::Stream;
use gleaner_model::{RunEvent, RunEventFrame, RunId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::cancel::CancellationController;

#[derive(Default)]
struct RunTopic {
    next_sequence: u64,
    observers: Vec<mpsc::UnboundedSender<RunEventFrame>>,
}

/// Broadcasts ordered [`RunEvent`]s to the observers of each run.
///
/// Delivery is best-effort and at-most-once. An observer whose receiving
/// side has gone away is dropped on the next publish. Late subscribers only
/// see events published after they subscribed.
///
/// A terminal event closes the run's topic: its observers drain what they
/// were sent and then see the end of the stream.
#[derive(Clone, Default)]
pub struct EventChannel {
    topics: Arc<Mutex<HashMap<RunId, RunTopic>>>,
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topics = self.topics.try_lock().map(|guard| guard.len());
        f.debug_struct("EventChannel")
            .field("topics", &topics)
            .finish()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, run_id: RunId) -> EventSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.topics
            .lock()
            .entry(run_id)
            .or_default()
            .observers
            .push(sender);
        EventSubscription { run_id, receiver }
    }

    /// Publishes `event` and returns its sequence number.
    pub fn publish(&self, run_id: RunId, event: RunEvent) -> u64 {
        let mut topics = self.topics.lock();
        Self::deliver(&mut topics, run_id, event)
    }

    /// Publishes `event` only while `gate` has not been signalled.
    ///
    /// The gate is checked under the channel lock, so nothing published
    /// through this method can follow an event published after the gate
    /// was signalled.
    pub fn publish_unless_cancelled(
        &self,
        run_id: RunId,
        gate: &CancellationController,
        event: RunEvent,
    ) -> Option<u64> {
        let mut topics = self.topics.lock();
        if gate.is_cancelled() {
            trace!(run = %run_id, "dropping event from cancelled attempt");
            return None;
        }
        Some(Self::deliver(&mut topics, run_id, event))
    }

    /// Drops the run's topic and disconnects its observers.
    pub fn close(&self, run_id: &RunId) {
        if let Some(topic) = self.topics.lock().remove(run_id) {
            trace!(
                run = %run_id,
                observers = topic.observers.len(),
                "closed run topic"
            );
        }
    }

    pub fn observer_count(&self, run_id: &RunId) -> usize {
        self.topics
            .lock()
            .get(run_id)
            .map(|topic| topic.observers.len())
            .unwrap_or(0)
    }

    fn deliver(
        topics: &mut HashMap<RunId, RunTopic>,
        run_id: RunId,
        event: RunEvent,
    ) -> u64 {
        let terminal = event.is_terminal();
        let topic = topics.entry(run_id).or_default();
        topic.next_sequence += 1;
        let sequence = topic.next_sequence;
        let frame = RunEventFrame {
            run_id,
            sequence,
            event,
        };

        let before = topic.observers.len();
        topic
            .observers
            .retain(|observer| observer.send(frame.clone()).is_ok());
        let dropped = before - topic.observers.len();
        if dropped > 0 {
            debug!(run = %run_id, dropped, "removed disconnected observers");
        }
        if terminal {
            topics.remove(&run_id);
        }
        sequence
    }
}

/// Live view of one run's events from the moment of subscription.
#[derive(Debug)]
pub struct EventSubscription {
    run_id: RunId,
    receiver: mpsc::UnboundedReceiver<RunEventFrame>,
}

impl EventSubscription {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub async fn recv(&mut self) -> Option<RunEventFrame> {
        self.receiver.recv().await
    }

    /// Stream of frames that ends right after the first terminal event.
    pub fn into_stream(
        self,
    ) -> impl Stream<Item = RunEventFrame> + Send + 'static {
        futures::stream::unfold(
            (self.receiver, false),
            |(mut receiver, finished)| async move {
                if finished {
                    return None;
                }
                let frame = receiver.recv().await?;
                let terminal = frame.event.is_terminal();
                Some((frame, (receiver, terminal)))
            },
        )
    }
}

/// Log line relay handed to extractors.
///
/// Lines written after the attempt's controller is signalled are dropped.
#[derive(Debug, Clone)]
pub struct LogSink {
    channel: EventChannel,
    run_id: RunId,
    gate: CancellationController,
}

impl LogSink {
    pub fn new(
        channel: EventChannel,
        run_id: RunId,
        gate: CancellationController,
    ) -> Self {
        Self {
            channel,
            run_id,
            gate,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(run = %self.run_id, "{message}");
        self.channel.publish_unless_cancelled(
            self.run_id,
            &self.gate,
            RunEvent::Log { message },
        );
    }
}
