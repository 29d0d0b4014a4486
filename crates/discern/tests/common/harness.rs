//! Scripted stand-ins for the analysis service and the result cache.
//!
//! `MockBackend` answers per pipeline kind with a scripted result and can
//! hold a kind's calls at a gate until the test releases them, which is how
//! tests interleave resolutions with resets and item changes.
//! `RecordingCache` keeps records in memory, records every write and can be
//! told to fail writes or hold reads.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use discern::backend::{AnalysisBackend, CacheRecord, ResultCache};
use discern::error::{AnalysisError, CacheError};
use discern::PipelineKind;

/// One recorded analysis call.
#[derive(Debug, Clone)]
pub struct AnalyzeCall {
    pub kind: PipelineKind,
    pub body: Value,
}

#[derive(Default)]
pub struct MockBackend {
    responses: Mutex<HashMap<PipelineKind, Vec<Result<Value, AnalysisError>>>>,
    gates: Mutex<HashMap<PipelineKind, Arc<Semaphore>>>,
    calls: Mutex<Vec<AnalyzeCall>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a successful response for the next call of `kind`. The last
    /// queued response is repeated once the queue is down to one.
    pub fn respond(&self, kind: PipelineKind, result: Value) -> &Self {
        self.push(kind, Ok(result))
    }

    /// Queues a failure for the next call of `kind`.
    pub fn fail(&self, kind: PipelineKind, message: &str) -> &Self {
        self.push(
            kind,
            Err(AnalysisError::Request {
                message: message.to_string(),
                status: Some(500),
            }),
        )
    }

    fn push(&self, kind: PipelineKind, response: Result<Value, AnalysisError>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(response);
        self
    }

    /// Holds calls for `kind` until [`Self::release`] is called.
    pub fn gate(&self, kind: PipelineKind) -> &Self {
        self.gates
            .lock()
            .unwrap()
            .insert(kind, Arc::new(Semaphore::new(0)));
        self
    }

    /// Lets one held (or future) call for `kind` through.
    pub fn release(&self, kind: PipelineKind) {
        if let Some(gate) = self.gates.lock().unwrap().get(&kind) {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> Vec<AnalyzeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, kind: PipelineKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.kind == kind)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_response(&self, kind: PipelineKind) -> Result<Value, AnalysisError> {
        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(&kind) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Err(AnalysisError::request(format!(
                "no scripted response for {}",
                kind.as_str()
            ))),
        }
    }
}

#[async_trait]
impl AnalysisBackend for MockBackend {
    async fn analyze(&self, kind: PipelineKind, body: Value) -> Result<Value, AnalysisError> {
        self.calls.lock().unwrap().push(AnalyzeCall { kind, body });

        let gate = self.gates.lock().unwrap().get(&kind).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        self.next_response(kind)
    }
}

/// One recorded cache write.
#[derive(Debug, Clone)]
pub struct CacheWrite {
    pub content_id: String,
    pub kind: PipelineKind,
    pub result: Value,
}

#[derive(Default)]
pub struct RecordingCache {
    records: Mutex<HashMap<String, CacheRecord>>,
    writes: Mutex<Vec<CacheWrite>>,
    fail_writes: AtomicBool,
    read_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl RecordingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, record: CacheRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.content_id.clone(), record);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Holds reads until [`Self::release_read`] is called.
    pub fn gate_reads(&self) {
        *self.read_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_read(&self) {
        if let Some(gate) = self.read_gate.lock().unwrap().as_ref() {
            gate.add_permits(1);
        }
    }

    pub fn writes(&self) -> Vec<CacheWrite> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultCache for RecordingCache {
    async fn read(&self, content_id: &str) -> Result<CacheRecord, CacheError> {
        let gate = self.read_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .get(content_id)
            .cloned()
            .unwrap_or_else(|| CacheRecord::empty(content_id)))
    }

    async fn write(
        &self,
        content_id: &str,
        kind: PipelineKind,
        result: Value,
    ) -> Result<(), CacheError> {
        self.writes.lock().unwrap().push(CacheWrite {
            content_id: content_id.to_string(),
            kind,
            result,
        });

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Request("cache service unavailable".to_string()));
        }
        Ok(())
    }
}
