//! Shared fixtures for scan worker integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use docsafe_core::models::{DeadLetterRecord, DocumentEvent, DocumentVersion, ScanTask};
use docsafe_core::{ContentStream, ScanEngine, ScanVerdict};
use docsafe_storage::{BoxedReader, DocumentStorage, LocalStorage};
use docsafe_worker::{
    DocumentRegistry, EventError, EventPublisher, InMemoryQueueBackend, QueueBackend, QueueError,
    ReceivedMessage, ScanMetrics, ScanTaskQueue, ScanTaskQueueConfig, ScanWorker,
};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// One scripted scanner reaction.
pub enum Step {
    Verdict(ScanVerdict),
    /// Cancel the token, then never return.
    CancelAndHang(CancellationToken),
    /// Signal `started`, wait for `release`, then return the verdict.
    Gate {
        started: Arc<Notify>,
        release: Arc<Notify>,
        verdict: ScanVerdict,
    },
}

/// Scanner that replays a script, falling back to a fixed verdict.
pub struct ScriptedScanner {
    steps: Mutex<VecDeque<Step>>,
    fallback: ScanVerdict,
    calls: AtomicUsize,
    scanned: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedScanner {
    pub fn always(verdict: ScanVerdict) -> Arc<Self> {
        Self::scripted(Vec::new(), verdict)
    }

    pub fn scripted(steps: Vec<Step>, fallback: ScanVerdict) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            fallback,
            calls: AtomicUsize::new(0),
            scanned: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Content of every scan, in call order.
    pub fn scanned(&self) -> Vec<Vec<u8>> {
        self.scanned.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanEngine for ScriptedScanner {
    async fn scan_stream(&self, mut content: ContentStream) -> ScanVerdict {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut body = Vec::new();
        while let Some(chunk) = content.next().await {
            match chunk {
                Ok(bytes) => body.extend_from_slice(&bytes),
                Err(e) => return ScanVerdict::Error(e.to_string()),
            }
        }
        self.scanned.lock().unwrap().push(body);

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => self.fallback.clone(),
            Some(Step::Verdict(verdict)) => verdict,
            Some(Step::CancelAndHang(token)) => {
                token.cancel();
                std::future::pending::<ScanVerdict>().await
            }
            Some(Step::Gate {
                started,
                release,
                verdict,
            }) => {
                started.notify_one();
                release.notified().await;
                verdict
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Publisher that keeps every event, optionally failing after recording it.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DocumentEvent>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn events(&self) -> Vec<DocumentEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DocumentEvent) -> Result<(), EventError> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(EventError::Delivery("subscriber unavailable".into()));
        }
        Ok(())
    }
}

/// Queue backend whose broker is down: every send fails and nothing is received.
pub struct UnavailableBackend;

#[async_trait]
impl QueueBackend for UnavailableBackend {
    async fn send(&self, _body: &str) -> Result<(), QueueError> {
        Err(QueueError::SendFailed("broker unavailable".into()))
    }

    async fn receive(
        &self,
        _max_messages: usize,
        _visibility_timeout: Duration,
        _wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        Ok(Vec::new())
    }

    async fn delete(&self, _receipt_handle: &str) -> Result<(), QueueError> {
        Ok(())
    }

    async fn purge(&self) -> Result<(), QueueError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

pub struct TestPipeline {
    _dir: TempDir,
    pub storage: DocumentStorage,
    pub queue: ScanTaskQueue,
    pub primary: Arc<InMemoryQueueBackend>,
    pub dead_letter: Arc<InMemoryQueueBackend>,
    pub registry: Arc<DocumentRegistry>,
    pub metrics: Arc<ScanMetrics>,
}

impl TestPipeline {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalStorage::new(
            dir.path(),
            "http://localhost:4000/files".to_string(),
            b"worker-test-secret".to_vec(),
        )
        .await
        .unwrap();

        let primary = Arc::new(InMemoryQueueBackend::new());
        let dead_letter = Arc::new(InMemoryQueueBackend::new());
        let queue = ScanTaskQueue::new(
            primary.clone(),
            dead_letter.clone(),
            ScanTaskQueueConfig::default(),
        );

        Self {
            _dir: dir,
            storage: DocumentStorage::new(Arc::new(backend)),
            queue,
            primary,
            dead_letter,
            registry: Arc::new(DocumentRegistry::new()),
            metrics: Arc::new(ScanMetrics::new()),
        }
    }

    pub fn worker(
        &self,
        scanner: Arc<dyn ScanEngine>,
        publisher: Arc<dyn EventPublisher>,
    ) -> ScanWorker {
        ScanWorker::new(
            self.queue.clone(),
            self.storage.clone(),
            scanner,
            publisher,
            self.registry.clone(),
            self.metrics.clone(),
        )
    }

    /// Worker on this pipeline's storage and directory but a different queue.
    pub fn worker_on(
        &self,
        queue: ScanTaskQueue,
        scanner: Arc<dyn ScanEngine>,
        publisher: Arc<dyn EventPublisher>,
    ) -> ScanWorker {
        ScanWorker::new(
            queue,
            self.storage.clone(),
            scanner,
            publisher,
            self.registry.clone(),
            self.metrics.clone(),
        )
    }

    /// Store `content` in the temporary area, register the version as
    /// processing, and queue its first scan.
    pub async fn upload(
        &self,
        tenant_id: &str,
        document_id: &str,
        version_id: &str,
        folder_id: Option<&str>,
        content: &[u8],
    ) -> ScanTask {
        let reader: BoxedReader = Box::pin(std::io::Cursor::new(content.to_vec()));
        let path = self
            .storage
            .store_temporary(
                tenant_id,
                document_id,
                reader,
                content.len() as u64,
                "application/octet-stream",
            )
            .await
            .unwrap();

        let mut version = DocumentVersion::processing(
            tenant_id,
            document_id,
            version_id,
            path.clone(),
            "application/octet-stream",
            content.len() as u64,
        );
        if let Some(folder) = folder_id {
            version = version.with_folder(folder);
        }
        self.registry.register(version).await;

        self.queue
            .queue_for_scanning(document_id, version_id, tenant_id, &path)
            .await
            .unwrap()
    }

    pub async fn queued_tasks(&self) -> Vec<ScanTask> {
        self.primary
            .bodies()
            .await
            .iter()
            .map(|body| serde_json::from_str(body).unwrap())
            .collect()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetterRecord> {
        self.dead_letter
            .bodies()
            .await
            .iter()
            .map(|body| serde_json::from_str(body).unwrap())
            .collect()
    }

    pub async fn exists(&self, tenant_id: &str, path: &str) -> bool {
        self.storage.exists(tenant_id, path).await.unwrap()
    }
}
