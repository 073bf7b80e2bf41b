//! Sync scheduler: the periodic reconciliation loop for the active topic.
//!
//! DESIGN
//! ======
//! At most one background task exists at a time and it is bound to the
//! active topic. Switching topic or tearing down aborts it before a new one
//! starts, so no timer outlives the topic it was polling. A slow pull that
//! finishes after a switch is rejected by the session's stale check.
//!
//! The task ticks on a `tokio` interval with missed ticks skipped: a pull
//! that overruns the period delays the next one instead of bursting. If the
//! active topic moves outside the scheduler, the task rebinds to it; only
//! `stop` and drop end a task.
//! The latest state is published on a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::ChatError;
use crate::session::{ChatSession, DeleteOutcome, TickOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No task running.
    Idle,
    /// A pull is in flight or about to start.
    Polling,
    /// The last pull was applied.
    Reconciled,
    /// The last pull failed; the view keeps its last good state.
    Degraded,
}

impl From<&TickOutcome> for SyncState {
    fn from(outcome: &TickOutcome) -> Self {
        match outcome {
            TickOutcome::Reconciled { .. } => Self::Reconciled,
            TickOutcome::Degraded => Self::Degraded,
            TickOutcome::Stale => Self::Polling,
        }
    }
}

/// Running poll task. Aborted on drop.
struct SyncTask {
    /// Topic the loop is currently polling; it moves to `general` if its
    /// topic is removed remotely.
    topic: watch::Receiver<String>,
    handle: JoinHandle<()>,
}

impl Drop for SyncTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct SyncScheduler {
    session: ChatSession,
    period: Duration,
    background_every: u32,
    state: Arc<watch::Sender<SyncState>>,
    task: Option<SyncTask>,
}

impl SyncScheduler {
    #[must_use]
    pub fn new(session: ChatSession, config: &SyncConfig) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            session,
            period: config.poll_interval,
            background_every: config.background_refresh_ticks,
            state: Arc::new(state),
            task: None,
        }
    }

    #[must_use]
    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Topic the running task is polling, if any.
    #[must_use]
    pub fn polling_topic(&self) -> Option<String> {
        self.task
            .as_ref()
            .filter(|t| !t.handle.is_finished())
            .map(|t| t.topic.borrow().clone())
    }

    /// Initial load, then start polling the active topic. The first
    /// scheduled tick comes one period later, since mount already pulled.
    pub async fn mount(&mut self) -> TickOutcome {
        self.stop();
        self.state.send_replace(SyncState::Polling);
        let outcome = self.session.mount().await;
        self.state.send_replace(SyncState::from(&outcome));
        let topic_id = self.session.active_topic().await;
        self.start(topic_id, Instant::now() + self.period);
        outcome
    }

    /// Activate `topic_id` and rebind polling to it. The old task is
    /// replaced only once activation succeeded; the new one pulls
    /// immediately.
    ///
    /// # Errors
    ///
    /// `TopicNotFound` for an unknown id; the current task keeps running.
    pub async fn switch_topic(&mut self, topic_id: &str) -> Result<(), ChatError> {
        self.session.activate(topic_id).await?;
        self.stop();
        self.start(topic_id.to_owned(), Instant::now());
        Ok(())
    }

    /// Delete a topic; if it was active, polling moves to `general`.
    ///
    /// # Errors
    ///
    /// See [`ChatSession::delete_topic`].
    pub async fn delete_topic(&mut self, topic_id: &str) -> Result<DeleteOutcome, ChatError> {
        let outcome = self.session.delete_topic(topic_id).await?;
        if outcome.active_reset {
            let active = self.session.active_topic().await;
            self.stop();
            self.start(active, Instant::now());
        }
        Ok(outcome)
    }

    /// # Errors
    ///
    /// `ProtectedTopic` when `general` is active.
    pub async fn delete_active_topic(&mut self) -> Result<DeleteOutcome, ChatError> {
        let active = self.session.active_topic().await;
        self.delete_topic(&active).await
    }

    /// Abort the running task, if any.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            let topic_id = task.topic.borrow().clone();
            info!(topic_id = %topic_id, "sync: polling stopped");
        }
        self.state.send_replace(SyncState::Idle);
    }

    fn start(&mut self, topic_id: String, first_tick: Instant) {
        info!(topic_id = %topic_id, period = ?self.period, "sync: polling started");
        let (topic_tx, topic) = watch::channel(topic_id);
        let handle = tokio::spawn(run_poll_loop(
            self.session.clone(),
            topic_tx,
            first_tick,
            self.period,
            self.background_every,
            Arc::clone(&self.state),
        ));
        self.task = Some(SyncTask { topic, handle });
    }
}

async fn run_poll_loop(
    session: ChatSession,
    topic: watch::Sender<String>,
    first_tick: Instant,
    period: Duration,
    background_every: u32,
    state: Arc<watch::Sender<SyncState>>,
) {
    let mut ticker = tokio::time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut topic_id = topic.borrow().clone();
    let mut ticks: u32 = 0;

    loop {
        ticker.tick().await;
        state.send_replace(SyncState::Polling);

        let outcome = session.tick(&topic_id).await;
        state.send_replace(SyncState::from(&outcome));
        match outcome {
            TickOutcome::Reconciled { active_topic } if active_topic != topic_id => {
                info!(from = %topic_id, to = %active_topic, "sync: active topic removed remotely; following");
                topic.send_replace(active_topic.clone());
                topic_id = active_topic;
            }
            TickOutcome::Reconciled { .. } | TickOutcome::Degraded => {}
            TickOutcome::Stale => {
                let active = session.active_topic().await;
                info!(from = %topic_id, to = %active, "sync: active topic changed elsewhere; following");
                topic.send_replace(active.clone());
                topic_id = active;
                ticker.reset_immediately();
                continue;
            }
        }

        ticks = ticks.wrapping_add(1);
        if background_every > 0 && ticks % background_every == 0 {
            let refreshed = session.refresh_background().await;
            debug!(refreshed, "sync: background refresh");
        }
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
