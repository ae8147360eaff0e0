//! RabbitMQ consumer for user-update events.
//!
//! The consumer subscribes with manual acknowledgment, runs each delivery as
//! its own task (at most `threads` at once), and acks only after the
//! dispatch outcome is known. Every failure is a nack with requeue.
//!
//! ```text
//! Idle → Subscribed → Draining → Stopped
//!            │  ▲
//!            ▼  │   (one task per delivery)
//!         Processing
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{FutureExt, Stream, StreamExt};
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions},
    types::FieldTable,
    Channel,
};
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use super::types::{InboundMessage, UserUpdateEvent};
use super::ConnectionParameters;
use crate::mail::{DeliveryOutcome, Dispatcher};
use crate::shutdown::Shutdown;

/// Default consumer tag announced to the broker.
pub const CONSUMER_TAG: &str = "notification-worker";

/// Lifecycle of a [`MessageConsumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Subscribed,
    Draining,
    Stopped,
}

/// Fatal consumption errors. These end the run.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to start consumer on '{queue}': {source}")]
    Subscribe {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("delivery stream failed: {0}")]
    Delivery(#[source] lapin::Error),

    #[error("delivery stream closed by the broker")]
    StreamClosed,
}

/// Acknowledgment side of the broker channel.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Acknowledge exactly one delivery.
    async fn ack(&self, delivery_tag: u64) -> Result<(), lapin::Error>;

    /// Negatively acknowledge exactly one delivery.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), lapin::Error>;
}

#[async_trait]
impl Acknowledger for Channel {
    async fn ack(&self, delivery_tag: u64) -> Result<(), lapin::Error> {
        self.basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), lapin::Error> {
        self.basic_nack(
            delivery_tag,
            BasicNackOptions {
                multiple: false,
                requeue,
            },
        )
        .await
    }
}

/// Display ordinal for received messages. Never used for decisions.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    value: AtomicU64,
}

impl SequenceCounter {
    pub fn starting_at(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    /// Increment and return the new value.
    pub fn next(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Consumption settings derived from the connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub queue: String,
    pub consumer_tag: String,
    /// Maximum deliveries processed at once
    pub concurrency: usize,
    /// Pause after each ack/nack, per delivery task
    pub message_delay: Duration,
}

impl From<&ConnectionParameters> for ConsumerSettings {
    fn from(params: &ConnectionParameters) -> Self {
        Self {
            queue: params.queue.clone(),
            consumer_tag: CONSUMER_TAG.to_string(),
            concurrency: usize::from(params.threads.max(1)),
            message_delay: params.message_delay,
        }
    }
}

/// How a single delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    Requeued,
    /// Shutdown arrived while the dispatch was in flight; the message was
    /// requeued
    Cancelled,
    /// The ack or nack call itself failed; the broker will redeliver once the
    /// channel goes away
    Unsettled,
}

/// Counts for one consumer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub received: u64,
    pub acked: u64,
    pub requeued: u64,
    pub cancelled: u64,
    pub unsettled: u64,
}

impl RunSummary {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Acked => self.acked += 1,
            Disposition::Requeued => self.requeued += 1,
            Disposition::Cancelled => self.cancelled += 1,
            Disposition::Unsettled => self.unsettled += 1,
        }
    }
}

/// Why a dispatch produced no outcome.
#[derive(Debug, Error)]
enum DispatchFailure {
    #[error("payload could not be decoded: {0}")]
    Decode(#[from] super::types::DecodeError),

    #[error("dispatch panicked")]
    Panicked,
}

/// Shared by every delivery task.
struct DeliveryContext {
    queue: String,
    dispatcher: Arc<Dispatcher>,
    acker: Arc<dyn Acknowledger>,
    counter: Arc<SequenceCounter>,
    message_delay: Duration,
}

/// Consumes user-update events and settles each one after dispatch.
pub struct MessageConsumer {
    settings: ConsumerSettings,
    context: Arc<DeliveryContext>,
    state: watch::Sender<ConsumerState>,
}

impl MessageConsumer {
    pub fn new(
        settings: ConsumerSettings,
        dispatcher: Arc<Dispatcher>,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self::with_counter(settings, dispatcher, acker, Arc::new(SequenceCounter::default()))
    }

    pub fn with_counter(
        settings: ConsumerSettings,
        dispatcher: Arc<Dispatcher>,
        acker: Arc<dyn Acknowledger>,
        counter: Arc<SequenceCounter>,
    ) -> Self {
        let context = Arc::new(DeliveryContext {
            queue: settings.queue.clone(),
            dispatcher,
            acker,
            counter,
            message_delay: settings.message_delay,
        });
        let (state, _) = watch::channel(ConsumerState::Idle);

        Self {
            settings,
            context,
            state,
        }
    }

    /// Watch the lifecycle state.
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub fn counter(&self) -> Arc<SequenceCounter> {
        Arc::clone(&self.context.counter)
    }

    fn set_state(&self, state: ConsumerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(
                queue = %self.settings.queue,
                from = ?previous,
                to = ?state,
                "consumer_state_changed"
            );
        }
    }

    /// Register with the broker in manual-ack mode.
    ///
    /// Returns the delivery stream to pass to [`run`](Self::run).
    pub async fn subscribe(
        &self,
        channel: &Channel,
    ) -> Result<impl Stream<Item = Result<InboundMessage, lapin::Error>>, ConsumerError> {
        let consumer = channel
            .basic_consume(
                &self.settings.queue,
                &self.settings.consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| ConsumerError::Subscribe {
                queue: self.settings.queue.clone(),
                source,
            })?;

        info!(
            queue = %self.settings.queue,
            consumer_tag = %self.settings.consumer_tag,
            "rabbitmq_consumer_started"
        );
        self.set_state(ConsumerState::Subscribed);

        Ok(consumer.map(|delivery| delivery.map(InboundMessage::from)))
    }

    /// Process deliveries until shutdown or a fatal stream error.
    ///
    /// In-flight deliveries always finish their ack/nack before this returns.
    pub async fn run<S>(&self, deliveries: S, mut shutdown: Shutdown) -> Result<RunSummary, ConsumerError>
    where
        S: Stream<Item = Result<InboundMessage, lapin::Error>>,
    {
        let mut deliveries = std::pin::pin!(deliveries);
        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks: JoinSet<Disposition> = JoinSet::new();
        let mut summary = RunSummary::default();
        let mut fatal = None;

        self.set_state(ConsumerState::Subscribed);
        info!(
            queue = %self.settings.queue,
            concurrency = self.settings.concurrency,
            message_delay_ms = self.settings.message_delay.as_millis() as u64,
            "consumer_ready"
        );

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(message)) => {
                    summary.received += 1;
                    let context = Arc::clone(&self.context);
                    let shutdown = shutdown.clone();

                    tasks.spawn(async move {
                        let disposition = process_delivery(&context, message, shutdown).await;
                        drop(permit);
                        disposition
                    });
                }
                Some(Err(e)) => {
                    error!(queue = %self.settings.queue, error = %e, "rabbitmq_delivery_error");
                    fatal = Some(ConsumerError::Delivery(e));
                    break;
                }
                None => {
                    if !shutdown.is_triggered() {
                        warn!(queue = %self.settings.queue, "rabbitmq_consumer_closed");
                        fatal = Some(ConsumerError::StreamClosed);
                    }
                    break;
                }
            }

            while let Some(joined) = tasks.try_join_next() {
                settle(&mut summary, joined);
            }
        }

        self.set_state(ConsumerState::Draining);
        info!(
            queue = %self.settings.queue,
            in_flight = tasks.len(),
            "consumer_draining"
        );

        while let Some(joined) = tasks.join_next().await {
            settle(&mut summary, joined);
        }

        self.set_state(ConsumerState::Stopped);
        info!(
            queue = %self.settings.queue,
            received = summary.received,
            acked = summary.acked,
            requeued = summary.requeued,
            cancelled = summary.cancelled,
            unsettled = summary.unsettled,
            "consumer_stopped"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

fn settle(summary: &mut RunSummary, joined: Result<Disposition, JoinError>) {
    match joined {
        Ok(Disposition::Cancelled) => {
            warn!("delivery_cancelled");
            summary.record(Disposition::Cancelled);
        }
        Ok(disposition) => summary.record(disposition),
        Err(e) => {
            error!(error = %e, "delivery_task_failed");
            summary.record(Disposition::Unsettled);
        }
    }
}

/// Decode, dispatch and settle one delivery.
async fn process_delivery(
    context: &DeliveryContext,
    message: InboundMessage,
    mut shutdown: Shutdown,
) -> Disposition {
    let sequence = context.counter.next();
    let delivery_tag = message.delivery_tag;

    info!(
        queue = %context.queue,
        sequence = sequence,
        delivery_tag = delivery_tag,
        redelivered = message.redelivered,
        payload_length = message.payload.len(),
        "rabbitmq_message_received"
    );

    let result = dispatch(context, sequence, &message.payload).await;

    let disposition = if shutdown.is_triggered() {
        warn!(
            sequence = sequence,
            delivery_tag = delivery_tag,
            "delivery_interrupted_by_shutdown"
        );
        nack(context, sequence, delivery_tag, Disposition::Cancelled).await
    } else {
        match &result {
            Ok(outcome) if outcome.is_success() => {
                match context.acker.ack(delivery_tag).await {
                    Ok(()) => {
                        info!(
                            sequence = sequence,
                            delivery_tag = delivery_tag,
                            "rabbitmq_message_acked"
                        );
                        Disposition::Acked
                    }
                    Err(e) => {
                        error!(
                            delivery_tag = delivery_tag,
                            error = %e,
                            "rabbitmq_ack_failed"
                        );
                        Disposition::Unsettled
                    }
                }
            }
            Ok(outcome) => {
                error!(
                    sequence = sequence,
                    delivery_tag = delivery_tag,
                    outcome = %outcome.status,
                    code = outcome.code,
                    detail = ?outcome.detail,
                    "delivery_send_failed"
                );
                nack(context, sequence, delivery_tag, Disposition::Requeued).await
            }
            Err(e) => {
                error!(
                    sequence = sequence,
                    delivery_tag = delivery_tag,
                    error = %e,
                    "delivery_processing_failed"
                );
                nack(context, sequence, delivery_tag, Disposition::Requeued).await
            }
        }
    };

    if disposition != Disposition::Cancelled && !context.message_delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(context.message_delay) => {}
            _ = shutdown.triggered() => {}
        }
    }

    disposition
}

async fn dispatch(
    context: &DeliveryContext,
    sequence: u64,
    payload: &[u8],
) -> Result<DeliveryOutcome, DispatchFailure> {
    let event = UserUpdateEvent::decode(payload)?;

    info!(
        sequence = sequence,
        recipient = %event.recipient,
        change_type = %event.change_type,
        "delivery_decoded"
    );

    AssertUnwindSafe(context.dispatcher.dispatch(&event))
        .catch_unwind()
        .await
        .map_err(|_| DispatchFailure::Panicked)
}

async fn nack(
    context: &DeliveryContext,
    sequence: u64,
    delivery_tag: u64,
    settled_as: Disposition,
) -> Disposition {
    match context.acker.nack(delivery_tag, true).await {
        Ok(()) => {
            info!(
                sequence = sequence,
                delivery_tag = delivery_tag,
                requeue = true,
                "rabbitmq_message_nacked"
            );
            settled_as
        }
        Err(e) => {
            error!(
                delivery_tag = delivery_tag,
                error = %e,
                "rabbitmq_nack_failed"
            );
            Disposition::Unsettled
        }
    }
}
