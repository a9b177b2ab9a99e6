use std::{collections::HashSet, sync::Arc, time::Duration};

use {
    chatrelay_common::{Event, EventBus, EventKind, InboundMessage, MessageIntake},
    chatrelay_plugins::RegisteredTask,
    chrono::{DateTime, Utc},
    tokio::{task::JoinHandle, time::Instant},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use chatrelay_metrics::{counter, gauge, labels, scheduler as scheduler_metrics};

use crate::{
    error::{Error, Result},
    schedule::compute_next_run,
};

/// Sender id of every synthetic message.
pub const SCHEDULER_SENDER: &str = "scheduler";

/// Wake-up interval when no task has an upcoming run.
const IDLE_POLL: Duration = Duration::from_secs(60);

/// Snapshot of one task for status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub name: String,
    pub schedule: String,
    pub conversations: Vec<String>,
    pub next_run: Option<DateTime<Utc>>,
}

/// Drives the tasks of Scheduled plugins.
pub struct Scheduler {
    tasks: Vec<RegisteredTask>,
    bus: EventBus,
    intake: Arc<dyn MessageIntake>,
    group_conversations: HashSet<String>,
}

impl Scheduler {
    pub fn new(tasks: Vec<RegisteredTask>, bus: EventBus, intake: Arc<dyn MessageIntake>) -> Self {
        #[cfg(feature = "metrics")]
        gauge!(scheduler_metrics::TASKS).set(tasks.len() as f64);
        Self {
            tasks,
            bus,
            intake,
            group_conversations: HashSet::new(),
        }
    }

    /// Conversations that are group chats; their synthetic messages are
    /// marked as group messages.
    #[must_use]
    pub fn with_group_conversations(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.group_conversations = ids.into_iter().collect();
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn status(&self) -> Vec<TaskStatus> {
        let now = Utc::now();
        self.tasks
            .iter()
            .map(|t| TaskStatus {
                name: t.qualified_name(),
                schedule: t.task.schedule.to_string(),
                conversations: t.task.conversations.clone(),
                next_run: compute_next_run(&t.task.schedule, now).ok(),
            })
            .collect()
    }

    /// Spawn the timer loop. It exits when `cancel` fires.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        info!(tasks = self.tasks.len(), "scheduler started");
        tokio::spawn(async move {
            self.timer_loop(cancel).await;
            info!("scheduler stopped");
        })
    }

    /// Fire a task immediately, outside its schedule. Returns the number of
    /// conversations the message was handed to.
    pub async fn trigger(&self, qualified_name: &str) -> Result<usize> {
        let task = self
            .tasks
            .iter()
            .find(|t| t.qualified_name() == qualified_name)
            .ok_or_else(|| Error::task_not_found(qualified_name))?;
        Ok(self.fire(task).await)
    }

    // ── Internal ────────────────────────────────────────────────────────

    async fn timer_loop(&self, cancel: CancellationToken) {
        let mut next: Vec<Option<Instant>> = self.tasks.iter().map(|t| self.next_instant(t)).collect();
        loop {
            let wake = next
                .iter()
                .flatten()
                .min()
                .copied()
                .unwrap_or_else(|| Instant::now() + IDLE_POLL);

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep_until(wake) => {},
            }

            let now = Instant::now();
            for (task, due) in self.tasks.iter().zip(next.iter_mut()) {
                if due.is_some_and(|at| at <= now) {
                    self.fire(task).await;
                    // Recomputed from the current time: no backfill.
                    *due = self.next_instant(task);
                }
            }
        }
    }

    fn next_instant(&self, task: &RegisteredTask) -> Option<Instant> {
        let now = Utc::now();
        match compute_next_run(&task.task.schedule, now) {
            Ok(at) => {
                let delay = (at - now).to_std().unwrap_or_default();
                debug!(task = %task.qualified_name(), next_run = %at, "task scheduled");
                Some(Instant::now() + delay)
            },
            Err(e) => {
                warn!(task = %task.qualified_name(), error = %e, "task has no next run, disabling");
                None
            },
        }
    }

    async fn fire(&self, task: &RegisteredTask) -> usize {
        let name = task.qualified_name();
        info!(task = %name, conversations = task.task.conversations.len(), "scheduled task fired");
        #[cfg(feature = "metrics")]
        counter!(scheduler_metrics::TICKS_TOTAL, labels::TASK => name.clone()).increment(1);

        self.bus
            .publish(
                Event::new(EventKind::ScheduleTriggered)
                    .with_source("scheduler")
                    .with("task", name.as_str())
                    .with("plugin", task.plugin.as_str())
                    .with("conversations", task.task.conversations.clone()),
            )
            .await;

        let mut delivered = 0;
        for conversation in &task.task.conversations {
            let mut message = InboundMessage::new(conversation.as_str(), SCHEDULER_SENDER, task.task.text.as_str())
                .scheduled(name.as_str());
            if self.group_conversations.contains(conversation) {
                message = message.in_group(false);
            }
            match self.intake.submit(message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(task = %name, conversation = %conversation, error = %e, "failed to inject scheduled message");
                    #[cfg(feature = "metrics")]
                    counter!(scheduler_metrics::INJECT_FAILURES_TOTAL, labels::TASK => name.clone())
                        .increment(1);
                },
            }
        }
        delivered
    }
}
