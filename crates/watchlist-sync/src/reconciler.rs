//! Folds the anonymous local watchlist into the user's remote watchlist after
//! each login or signup.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use stockwatch_core::{
    LocalStore, MergeSummary, RemoteStore, Session, SessionEvent, SyncError, SyncResult,
    TransitionKind,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::session::SessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilerState {
    Idle,
    Merging,
    Clearing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Local watchlist was empty; the remote store was not contacted.
    NothingToMerge,
    Merged,
    /// Merged remotely but the local copy could not be cleared.
    ClearFailed(String),
    MergeFailed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub user_id: String,
    pub trigger: Option<TransitionKind>,
    pub local_entries: usize,
    pub merge: MergeSummary,
    pub outcome: ReconcileOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcilerStatus {
    pub state: ReconcilerState,
    pub runs_completed: u64,
    pub last_report: Option<ReconcileReport>,
}

impl Default for ReconcilerStatus {
    fn default() -> Self {
        Self {
            state: ReconcilerState::Idle,
            runs_completed: 0,
            last_report: None,
        }
    }
}

pub struct Reconciler {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    run_lock: Mutex<()>,
    status: watch::Sender<ReconcilerStatus>,
}

impl Reconciler {
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteStore>) -> Self {
        let (status, _) = watch::channel(ReconcilerStatus::default());
        Self {
            local,
            remote,
            run_lock: Mutex::new(()),
            status,
        }
    }

    pub fn state(&self) -> ReconcilerState {
        self.status.borrow().state
    }

    pub fn status(&self) -> watch::Receiver<ReconcilerStatus> {
        self.status.subscribe()
    }

    /// Run one reconciliation for `session`. Concurrent calls queue on the run
    /// lock and execute one after another.
    ///
    /// Merge failures leave the local store untouched and are returned as
    /// errors. A failed clear after a successful merge is only a warning.
    pub async fn reconcile(&self, session: &Session) -> SyncResult<ReconcileReport> {
        self.run(session, None).await
    }

    async fn run(
        &self,
        session: &Session,
        trigger: Option<TransitionKind>,
    ) -> SyncResult<ReconcileReport> {
        let _guard = self.run_lock.lock().await;
        let started_at = Utc::now();

        let local = self.local.get().await;
        let local_entries = local.len();
        let mut report = ReconcileReport {
            user_id: session.user_id.clone(),
            trigger,
            local_entries,
            merge: MergeSummary::default(),
            outcome: ReconcileOutcome::NothingToMerge,
            started_at,
            finished_at: started_at,
        };

        if local.is_empty() {
            tracing::debug!(user_id = %session.user_id, "Nothing to reconcile");
            report.finished_at = Utc::now();
            self.finish(report.clone());
            return Ok(report);
        }

        self.set_state(ReconcilerState::Merging);
        tracing::info!(
            user_id = %session.user_id,
            entries = local_entries,
            backend = self.remote.backend_name(),
            "Merging local watchlist into remote"
        );

        let merged = local.entries();
        match self
            .remote
            .merge(session, &session.user_id, merged.clone())
            .await
        {
            Ok(summary) => report.merge = summary,
            Err(e) => {
                tracing::error!(user_id = %session.user_id, "Reconciliation merge failed: {}", e);
                report.outcome = ReconcileOutcome::MergeFailed(e.to_string());
                report.finished_at = Utc::now();
                self.finish(report);
                return Err(e);
            }
        }

        self.set_state(ReconcilerState::Clearing);
        // Only the merged snapshot is cleared; tickers added locally since
        // (after a sign-out mid-run) stay for the next login.
        report.outcome = match self.local.remove_merged(&merged).await {
            Ok(()) => ReconcileOutcome::Merged,
            Err(e) => {
                let warning = SyncError::ReconciliationPartialFailure(e.to_string());
                tracing::warn!(user_id = %session.user_id, "{}", warning);
                ReconcileOutcome::ClearFailed(e.to_string())
            }
        };
        report.finished_at = Utc::now();

        tracing::info!(
            user_id = %session.user_id,
            inserted = report.merge.inserted,
            backdated = report.merge.backdated,
            unchanged = report.merge.unchanged,
            "Reconciliation complete"
        );
        self.finish(report.clone());
        Ok(report)
    }

    fn set_state(&self, state: ReconcilerState) {
        self.status.send_modify(|status| status.state = state);
    }

    fn finish(&self, report: ReconcileReport) {
        self.status.send_modify(|status| {
            status.state = ReconcilerState::Idle;
            status.runs_completed += 1;
            status.last_report = Some(report);
        });
    }

    /// Subscribe to session transitions and reconcile once per login or
    /// signup. Events are handled one at a time in arrival order.
    pub fn listen(self: Arc<Self>, sessions: &SessionManager) -> JoinHandle<()> {
        let mut events = sessions.on_session_change();
        let current = sessions.watch();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(session) = event.login_session() else {
                            continue;
                        };
                        if let Err(e) = self.run(session, Some(event.kind())).await {
                            tracing::warn!("Reconciliation failed, continuing local-only: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Session events dropped, reconciling current session");
                        let session = current.borrow().clone();
                        if let Some(session) = session {
                            if let Err(e) = self.run(&session, None).await {
                                tracing::warn!("Reconciliation failed: {}", e);
                            }
                        }
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Session channel closed, reconciler stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// Publish `event` and wait until the reconciler has finished handling it.
///
/// Resolves immediately for transitions that do not trigger a run.
pub async fn publish_and_settle(
    sessions: &SessionManager,
    reconciler: &Reconciler,
    event: SessionEvent,
) -> Option<ReconcileReport> {
    let triggers = event.login_session().is_some();
    let mut status = reconciler.status();
    let before = status.borrow_and_update().runs_completed;
    sessions.publish(event);
    if !triggers {
        return None;
    }
    let done = status
        .wait_for(|s| s.runs_completed > before)
        .await
        .ok()?;
    done.last_report.clone()
}
