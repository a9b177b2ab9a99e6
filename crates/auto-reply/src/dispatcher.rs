//! Per-conversation ordering in front of the [`Pipeline`].
//!
//! Each active conversation gets one worker task fed by a bounded queue, so
//! messages in a conversation are processed in arrival order while separate
//! conversations run concurrently. Idle workers exit and are respawned on
//! the next message.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    chatrelay_common::{InboundMessage, MessageIntake},
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::pipeline::Pipeline;

/// Queue and lifetime settings fixed when the dispatcher is built.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Messages buffered per conversation before `dispatch` waits.
    pub queue_capacity: usize,
    /// How long a worker waits for its next message before exiting.
    pub idle_timeout: Duration,
    /// Passed to every pipeline run. Cancelling it aborts in-flight provider
    /// calls.
    pub cancel: CancellationToken,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            idle_timeout: Duration::from_secs(300),
            cancel: CancellationToken::new(),
        }
    }
}

struct Worker {
    generation: u64,
    tx: mpsc::Sender<InboundMessage>,
    handle: JoinHandle<()>,
}

struct Inner {
    pipeline: Arc<Pipeline>,
    workers: Mutex<HashMap<String, Worker>>,
    next_generation: AtomicU64,
    queue_capacity: usize,
    idle_timeout: Duration,
    cancel: CancellationToken,
    closed: AtomicBool,
}

/// Routes inbound messages to per-conversation workers.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self::with_config(pipeline, DispatcherConfig::default())
    }

    pub fn with_config(pipeline: Arc<Pipeline>, config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline,
                workers: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                queue_capacity: config.queue_capacity.max(1),
                idle_timeout: config.idle_timeout,
                cancel: config.cancel,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.inner.pipeline
    }

    /// See [`DispatcherConfig::cancel`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Number of conversations with a live worker.
    pub fn active_conversations(&self) -> usize {
        self.inner
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Queue a message behind earlier messages of the same conversation.
    pub async fn dispatch(&self, message: InboundMessage) -> chatrelay_common::Result<()> {
        let mut message = message;
        for _ in 0..2 {
            let tx = self.sender_for(&message.conversation_id)?;
            match tx.send(message).await {
                Ok(()) => return Ok(()),
                // The worker went idle between lookup and send.
                Err(mpsc::error::SendError(returned)) => message = returned,
            }
        }
        Err(chatrelay_common::Error::message(format!(
            "no worker accepted message for conversation {}",
            message.conversation_id
        )))
    }

    /// Stop accepting messages, let queued ones finish, and wait for every
    /// worker to exit.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let workers: Vec<(String, Worker)> = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        info!(workers = workers.len(), "dispatcher shutting down");
        for (conversation, worker) in workers {
            drop(worker.tx);
            if let Err(e) = worker.handle.await {
                warn!(conversation = %conversation, error = %e, "conversation worker panicked");
            }
        }
    }

    /// Cancel in-flight provider calls, then [`shutdown`](Self::shutdown).
    /// Contexts that were waiting on a provider end as `Failed` with the
    /// `cancelled` category and leave history untouched.
    pub async fn shutdown_now(&self) {
        self.inner.cancel.cancel();
        self.shutdown().await;
    }

    fn sender_for(&self, conversation_id: &str) -> chatrelay_common::Result<mpsc::Sender<InboundMessage>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(chatrelay_common::Error::message("dispatcher is shut down"));
        }
        let mut workers = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(worker) = workers.get(conversation_id)
            && !worker.tx.is_closed()
        {
            return Ok(worker.tx.clone());
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.queue_capacity);
        let handle = tokio::spawn(run_worker(
            Arc::clone(&self.inner),
            conversation_id.to_string(),
            generation,
            rx,
        ));
        debug!(conversation = %conversation_id, generation, "conversation worker started");
        workers.insert(
            conversation_id.to_string(),
            Worker {
                generation,
                tx: tx.clone(),
                handle,
            },
        );
        Ok(tx)
    }
}

#[async_trait]
impl MessageIntake for Dispatcher {
    async fn submit(&self, message: InboundMessage) -> chatrelay_common::Result<()> {
        self.dispatch(message).await
    }
}

async fn run_worker(
    inner: Arc<Inner>,
    conversation_id: String,
    generation: u64,
    mut rx: mpsc::Receiver<InboundMessage>,
) {
    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(message) => {
                    inner.pipeline.process(message, &inner.cancel).await;
                },
                None => break,
            },
            () = tokio::time::sleep(inner.idle_timeout) => {
                let (pending, reopened) = retire(&inner, &conversation_id, generation, &mut rx);
                // Messages that raced in while retiring run before anything
                // sent to the reopened queue.
                for message in pending {
                    inner.pipeline.process(message, &inner.cancel).await;
                }
                match reopened {
                    Some(next) => rx = next,
                    None => {
                        debug!(conversation = %conversation_id, generation, "conversation worker idle, exiting");
                        return;
                    },
                }
            },
        }
    }
    debug!(conversation = %conversation_id, generation, "conversation worker stopped");
}

/// Close the queue of an idle worker and collect what arrived after the
/// idle check. A fresh queue is returned when the worker has to keep
/// running.
fn retire(
    inner: &Inner,
    conversation_id: &str,
    generation: u64,
    rx: &mut mpsc::Receiver<InboundMessage>,
) -> (Vec<InboundMessage>, Option<mpsc::Receiver<InboundMessage>>) {
    let mut workers = inner.workers.lock().unwrap_or_else(|e| e.into_inner());
    rx.close();
    let mut pending = Vec::new();
    while let Ok(message) = rx.try_recv() {
        pending.push(message);
    }

    // Not owned once shutdown has drained the map.
    let owned = workers
        .get(conversation_id)
        .is_some_and(|w| w.generation == generation);
    if !owned {
        return (pending, None);
    }
    if pending.is_empty() {
        workers.remove(conversation_id);
        return (pending, None);
    }

    let (tx, reopened) = mpsc::channel(inner.queue_capacity);
    if let Some(worker) = workers.get_mut(conversation_id) {
        worker.tx = tx;
    }
    (pending, Some(reopened))
}
