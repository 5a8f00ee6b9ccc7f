use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::webhook::InboundMessage;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageTask {
    pub message: InboundMessage,
    pub received_at: DateTime<Utc>,
}

impl MessageTask {
    pub fn new(message: InboundMessage) -> Self {
        Self { message, received_at: Utc::now() }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("message queue is full; dropped {0}")]
    Full(String),
    #[error("message queue is closed")]
    Closed,
}

/// Producer half handed to the webhook route.
#[derive(Clone)]
pub struct MessageQueue {
    sender: mpsc::Sender<MessageTask>,
}

impl MessageQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<MessageTask>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Never waits; a full queue is reported so the caller can answer fast.
    pub fn enqueue(&self, task: MessageTask) -> Result<(), QueueError> {
        self.sender.try_send(task).map_err(|error| match error {
            mpsc::error::TrySendError::Full(task) => QueueError::Full(task.message.id),
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Tasks waiting for the worker.
    pub fn backlog(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// True once the worker has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerOutcome {
    Replied,
    Skipped,
    AlreadyProcessed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("retryable handler failure: {0}")]
    Retryable(String),
    #[error("handler failure: {0}")]
    Fatal(String),
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, task: &MessageTask) -> Result<HandlerOutcome, HandlerError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 500, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub replied: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub failed: usize,
}

enum TaskOutcome {
    Handled(HandlerOutcome),
    Failed,
}

/// Drains the queue until every producer is dropped.
///
/// Tasks for different senders run concurrently; tasks from the same sender run one
/// at a time in arrival order. A message id already in flight is dropped, and the
/// handler is expected to make redelivery of finished ids a no-op.
pub struct QueueWorker {
    receiver: mpsc::Receiver<MessageTask>,
    handler: Arc<dyn MessageHandler>,
    retry: RetryPolicy,
}

impl QueueWorker {
    pub fn new(
        receiver: mpsc::Receiver<MessageTask>,
        handler: Arc<dyn MessageHandler>,
        retry: RetryPolicy,
    ) -> Self {
        Self { receiver, handler, retry }
    }

    pub async fn run(mut self) -> WorkerStats {
        let in_flight: Arc<Mutex<HashSet<String>>> = Arc::default();
        let mut lanes: HashMap<String, oneshot::Receiver<()>> = HashMap::new();
        let mut tasks = JoinSet::new();
        let mut stats = WorkerStats::default();

        while let Some(task) = self.receiver.recv().await {
            if !in_flight.lock().await.insert(task.message.id.clone()) {
                info!(
                    event_name = "queue.duplicate_dropped",
                    correlation_id = %task.message.id,
                    "message already in flight"
                );
                stats.duplicates += 1;
                continue;
            }

            // Each task waits for the previous task from the same sender to finish.
            let (done, finished) = oneshot::channel::<()>();
            lanes.retain(|_, previous| !matches!(previous.try_recv(), Err(TryRecvError::Closed)));
            let previous = lanes.insert(task.message.from.clone(), finished);
            let handler = self.handler.clone();
            let retry = self.retry.clone();
            let in_flight = in_flight.clone();

            tasks.spawn(async move {
                if let Some(previous) = previous {
                    let _ = previous.await;
                }
                let outcome = process(handler.as_ref(), &retry, &task).await;
                in_flight.lock().await.remove(&task.message.id);
                drop(done);
                outcome
            });

            while let Some(joined) = tasks.try_join_next() {
                tally(&mut stats, joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            tally(&mut stats, joined);
        }
        info!(
            event_name = "queue.worker_stopped",
            replied = stats.replied,
            skipped = stats.skipped,
            duplicates = stats.duplicates,
            failed = stats.failed,
            "message queue drained"
        );
        stats
    }
}

fn tally(stats: &mut WorkerStats, joined: Result<TaskOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(TaskOutcome::Handled(HandlerOutcome::Replied)) => stats.replied += 1,
        Ok(TaskOutcome::Handled(HandlerOutcome::Skipped)) => stats.skipped += 1,
        Ok(TaskOutcome::Handled(HandlerOutcome::AlreadyProcessed)) => stats.duplicates += 1,
        Ok(TaskOutcome::Failed) => stats.failed += 1,
        Err(error) => {
            warn!(event_name = "queue.task_panicked", error = %error, "message task aborted");
            stats.failed += 1;
        }
    }
}

async fn process(handler: &dyn MessageHandler, retry: &RetryPolicy, task: &MessageTask) -> TaskOutcome {
    let mut attempt = 0;
    loop {
        match handler.handle(task).await {
            Ok(outcome) => {
                debug!(
                    event_name = "queue.task_handled",
                    correlation_id = %task.message.id,
                    attempt,
                    outcome = ?outcome,
                    "message handled"
                );
                return TaskOutcome::Handled(outcome);
            }
            Err(HandlerError::Retryable(reason)) if attempt < retry.max_retries => {
                let delay = retry.backoff(attempt);
                warn!(
                    event_name = "queue.task_retry",
                    correlation_id = %task.message.id,
                    attempt,
                    max_retries = retry.max_retries,
                    error = %reason,
                    "retrying message"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(error) => {
                warn!(
                    event_name = "queue.task_failed",
                    correlation_id = %task.message.id,
                    attempt,
                    error = %error,
                    "message processing failed"
                );
                return TaskOutcome::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{
        HandlerError, HandlerOutcome, MessageHandler, MessageQueue, MessageTask, QueueError,
        QueueWorker, RetryPolicy, WorkerStats,
    };
    use crate::webhook::{InboundMessage, MessageContent};

    #[derive(Default)]
    struct ScriptedHandler {
        failures: Mutex<VecDeque<HandlerError>>,
        delays_ms: Vec<(String, u64)>,
        finished: Mutex<Vec<String>>,
        attempts: Mutex<usize>,
    }

    #[async_trait]
    impl MessageHandler for ScriptedHandler {
        async fn handle(&self, task: &MessageTask) -> Result<HandlerOutcome, HandlerError> {
            *self.attempts.lock().await += 1;
            if let Some(failure) = self.failures.lock().await.pop_front() {
                return Err(failure);
            }
            let delay = self
                .delays_ms
                .iter()
                .find(|(id, _)| *id == task.message.id)
                .map_or(0, |(_, delay)| *delay);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.finished.lock().await.push(task.message.id.clone());
            Ok(HandlerOutcome::Replied)
        }
    }

    fn task(id: &str, from: &str) -> MessageTask {
        MessageTask::new(InboundMessage {
            id: id.to_string(),
            from: from.to_string(),
            contact_name: None,
            phone_number_id: None,
            sent_at: None,
            content: MessageContent::Text("hola".to_string()),
        })
    }

    fn no_delay() -> RetryPolicy {
        RetryPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn same_sender_is_processed_in_arrival_order() {
        let handler = Arc::new(ScriptedHandler {
            delays_ms: vec![("m1".to_string(), 50)],
            ..ScriptedHandler::default()
        });
        let (queue, receiver) = MessageQueue::bounded(8);
        queue.enqueue(task("m1", "525500000001")).expect("enqueue");
        queue.enqueue(task("m2", "525500000001")).expect("enqueue");
        queue.enqueue(task("m3", "525500000002")).expect("enqueue");
        drop(queue);

        let stats = QueueWorker::new(receiver, handler.clone(), no_delay()).run().await;

        assert_eq!(stats.replied, 3);
        let finished = handler.finished.lock().await.clone();
        let position = |id: &str| finished.iter().position(|done| done == id);
        assert!(position("m1") < position("m2"));
        assert!(position("m3") < position("m1"), "other senders are not blocked");
    }

    #[tokio::test]
    async fn retries_transient_failures_but_not_fatal_ones() {
        let handler = Arc::new(ScriptedHandler {
            failures: Mutex::new(VecDeque::from([HandlerError::Retryable("503".to_string())])),
            ..ScriptedHandler::default()
        });
        let (queue, receiver) = MessageQueue::bounded(8);
        queue.enqueue(task("m1", "525500000001")).expect("enqueue");
        drop(queue);

        let stats = QueueWorker::new(receiver, handler.clone(), no_delay()).run().await;
        assert_eq!(stats, WorkerStats { replied: 1, ..WorkerStats::default() });
        assert_eq!(*handler.attempts.lock().await, 2);

        let fatal = Arc::new(ScriptedHandler {
            failures: Mutex::new(VecDeque::from([HandlerError::Fatal("bad payload".to_string())])),
            ..ScriptedHandler::default()
        });
        let (queue, receiver) = MessageQueue::bounded(8);
        queue.enqueue(task("m2", "525500000001")).expect("enqueue");
        drop(queue);

        let stats = QueueWorker::new(receiver, fatal.clone(), no_delay()).run().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(*fatal.attempts.lock().await, 1);
    }

    #[tokio::test]
    async fn duplicate_in_flight_ids_are_dropped() {
        let handler = Arc::new(ScriptedHandler {
            delays_ms: vec![("m1".to_string(), 50)],
            ..ScriptedHandler::default()
        });
        let (queue, receiver) = MessageQueue::bounded(8);
        queue.enqueue(task("m1", "525500000001")).expect("enqueue");
        queue.enqueue(task("m1", "525500000001")).expect("enqueue");
        drop(queue);

        let stats = QueueWorker::new(receiver, handler.clone(), no_delay()).run().await;

        assert_eq!(stats.replied, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn full_queue_rejects_without_waiting() {
        let (queue, _receiver) = MessageQueue::bounded(1);
        queue.enqueue(task("m1", "525500000001")).expect("enqueue");
        assert_eq!(queue.enqueue(task("m2", "525500000001")), Err(QueueError::Full("m2".to_string())));
        assert_eq!((queue.backlog(), queue.max_capacity()), (1, 1));
    }

    #[test]
    fn dropped_receiver_closes_the_queue() {
        let (queue, receiver) = MessageQueue::bounded(2);
        assert!(!queue.is_closed());
        drop(receiver);
        assert!(queue.is_closed());
        assert_eq!(queue.enqueue(task("m1", "525500000001")), Err(QueueError::Closed));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: 250, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0), Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(4), Duration::from_millis(1_000));
    }
}
