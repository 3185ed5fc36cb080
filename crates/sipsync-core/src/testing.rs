//! In-memory remote store for tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::{LogKind, LogPayload, QueuedLogRecord, RecordId};
use crate::remote::{RemoteStore, SubmitError};

/// What to do with the next submission of a given record.
#[derive(Debug, Clone)]
enum Script {
    Fail(SubmitError),
    /// Persist the row but report a retryable failure, as if the ack was lost
    LoseAck,
}

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<RecordId, (LogKind, LogPayload)>,
    once: HashMap<RecordId, VecDeque<Script>>,
    always: HashMap<RecordId, SubmitError>,
    fail_everything: Option<SubmitError>,
    submissions: Vec<RecordId>,
}

/// Remote store that upserts rows by record id.
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    inner: Mutex<Inner>,
    latency: std::sync::Mutex<Duration>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every submission by `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: std::sync::Mutex::new(latency),
            ..Self::default()
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        *self
            .latency
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = latency;
    }

    /// Fail the next submission of `id` with `error`.
    pub async fn fail_once(&self, id: &RecordId, error: SubmitError) {
        let mut inner = self.inner.lock().await;
        inner
            .once
            .entry(id.clone())
            .or_default()
            .push_back(Script::Fail(error));
    }

    /// Fail every submission of `id` with `error`.
    pub async fn fail_always(&self, id: &RecordId, error: SubmitError) {
        self.inner.lock().await.always.insert(id.clone(), error);
    }

    /// Fail every submission, whatever the record.
    pub async fn fail_everything(&self, error: Option<SubmitError>) {
        self.inner.lock().await.fail_everything = error;
    }

    /// Store the next submission of `id` but answer with a retryable error.
    pub async fn lose_ack_once(&self, id: &RecordId) {
        let mut inner = self.inner.lock().await;
        inner
            .once
            .entry(id.clone())
            .or_default()
            .push_back(Script::LoseAck);
    }

    /// Number of submissions received, including failed ones.
    pub async fn submission_count(&self) -> usize {
        self.inner.lock().await.submissions.len()
    }

    /// Record ids in the order they were submitted.
    pub async fn submissions(&self) -> Vec<RecordId> {
        self.inner.lock().await.submissions.clone()
    }

    pub async fn row_count(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    pub async fn row(&self, id: &RecordId) -> Option<(LogKind, LogPayload)> {
        self.inner.lock().await.rows.get(id).cloned()
    }

    /// Number of persisted rows of one kind.
    pub async fn rows_of(&self, kind: LogKind) -> usize {
        self.inner
            .lock()
            .await
            .rows
            .values()
            .filter(|(row_kind, _)| *row_kind == kind)
            .count()
    }

    fn latency(&self) -> Duration {
        *self
            .latency
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn submit(&self, kind: LogKind, record: &QueuedLogRecord) -> Result<(), SubmitError> {
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.inner.lock().await;
        inner.submissions.push(record.id.clone());

        if let Some(error) = inner.fail_everything.clone() {
            return Err(error);
        }
        if let Some(error) = inner.always.get(&record.id).cloned() {
            return Err(error);
        }

        let script = inner
            .once
            .get_mut(&record.id)
            .and_then(VecDeque::pop_front);
        match script {
            Some(Script::Fail(error)) => Err(error),
            Some(Script::LoseAck) => {
                inner
                    .rows
                    .insert(record.id.clone(), (kind, record.payload.clone()));
                Err(SubmitError::retryable("connection reset before acknowledgement"))
            }
            None => {
                inner
                    .rows
                    .insert(record.id.clone(), (kind, record.payload.clone()));
                Ok(())
            }
        }
    }
}
