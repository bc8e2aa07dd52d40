//! Ingestion pipeline orchestration.
//!
//! Coordinates one run: adapter → filter → extract → id → single writer.
//!
//! ```text
//!  adapter.scan ──▶ items (bounded) ──▶ N workers ──▶ records (bounded) ──▶ writer ──▶ collection
//! ```
//!
//! - Adapters run one after another; each gets its own worker pool.
//! - Heavy extraction (PDF, documents, images) runs on the blocking pool.
//! - Only the writer task touches the collection; upserts are single-record.
//! - A failing adapter is recorded in the run report and the run moves on.
//! - On cancellation (external or deadline) adapters stop before their next
//!   listing or fetch, workers discard items they have not started, and
//!   records already queued for the writer are still upserted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sift_core::filter::ContentFilter;
use sift_core::ids::{content_id, IdAllocator, IdStrategy};
use sift_core::index::{Collection, VectorIndex};
use sift_core::models::{Body, ContentRecord, ContentType, RawItem, SourceKind};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::error::SourceError;
use crate::extract::Extractor;
use crate::traits::{CancelToken, ItemSink, SourceAdapter};

/// Tunables for one coordinator.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub workers: usize,
    pub queue_capacity: usize,
    pub deadline: Option<Duration>,
    pub id_strategy: IdStrategy,
    pub pdf_page_limit: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
            deadline: config.deadline_secs.map(Duration::from_secs),
            id_strategy: config.id_strategy,
            pdf_page_limit: config.pdf_page_limit,
        }
    }
}

/// State owned by a single run. Counters start at zero for every run.
pub struct IngestionRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub collection: String,
    allocator: IdAllocator,
    strategy: IdStrategy,
}

impl IngestionRun {
    pub fn new(collection: &str, strategy: IdStrategy) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            collection: collection.to_string(),
            allocator: IdAllocator::new(),
            strategy,
        }
    }

    /// Id for an extracted item, in its kind/type prefix namespace.
    pub fn allocate(&self, kind: SourceKind, content_type: ContentType, location: &str, body: &Body) -> String {
        let prefix = kind.id_prefix(content_type);
        match self.strategy {
            IdStrategy::Counter => self.allocator.next(prefix),
            IdStrategy::ContentHash => content_id(prefix, location, body.fingerprint_bytes()),
        }
    }
}

#[derive(Debug, Default)]
struct RunCounters {
    filtered: AtomicUsize,
    extraction_skipped: AtomicUsize,
    empty_skipped: AtomicUsize,
    discarded: AtomicUsize,
    upserted: AtomicUsize,
    upsert_failures: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Per-adapter outcome.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterReport {
    pub name: String,
    pub kind: SourceKind,
    /// Items the adapter reported handing to the pipeline.
    pub emitted: usize,
    /// Items the workers received from this adapter.
    pub items_received: usize,
    /// Non-fatal failures: skipped fetches and aborted sub-listings.
    pub failures: Vec<String>,
    /// Set when the adapter as a whole failed.
    pub error: Option<String>,
    pub cancelled: bool,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub collection: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub adapters: Vec<AdapterReport>,
    pub filtered: usize,
    pub extraction_skipped: usize,
    pub empty_skipped: usize,
    /// Items dropped unprocessed after cancellation.
    pub discarded: usize,
    pub upserted: usize,
    pub upsert_failures: usize,
}

impl RunReport {
    pub fn adapter(&self, name: &str) -> Option<&AdapterReport> {
        self.adapters.iter().find(|a| a.name == name)
    }
}

pub struct IngestionCoordinator {
    index: Arc<dyn VectorIndex>,
    options: IngestOptions,
    extractor: Extractor,
}

impl IngestionCoordinator {
    pub fn new(index: Arc<dyn VectorIndex>, options: IngestOptions) -> Self {
        let extractor = Extractor::new(options.pdf_page_limit);
        Self {
            index,
            options,
            extractor,
        }
    }

    /// Run every adapter into `collection`.
    ///
    /// Fails only if the collection cannot be opened; everything else is
    /// reported in the returned [`RunReport`].
    pub async fn run(
        &self,
        collection: &str,
        adapters: &[Arc<dyn SourceAdapter>],
        cancel: CancelToken,
    ) -> Result<RunReport> {
        let run = Arc::new(IngestionRun::new(collection, self.options.id_strategy));
        tracing::info!(run_id = %run.id, collection, adapters = adapters.len(), "ingestion run started");

        let handle = self
            .index
            .get_or_create_collection(collection)
            .await
            .with_context(|| format!("Cannot open collection '{}'", collection))?;

        let deadline = self.options.deadline.map(|limit| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                tracing::warn!(?limit, "ingestion deadline reached; cancelling");
                cancel.cancel();
            })
        });

        let counters = Arc::new(RunCounters::default());
        let (record_tx, record_rx) = mpsc::channel::<ContentRecord>(self.options.queue_capacity);
        let writer = tokio::spawn(write_records(handle, record_rx, Arc::clone(&counters)));

        let mut reports = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            if cancel.is_cancelled() {
                reports.push(AdapterReport {
                    name: adapter.name().to_string(),
                    kind: adapter.kind(),
                    emitted: 0,
                    items_received: 0,
                    failures: Vec::new(),
                    error: None,
                    cancelled: true,
                });
                continue;
            }
            let report = self
                .run_adapter(
                    Arc::clone(adapter),
                    &run,
                    record_tx.clone(),
                    &counters,
                    &cancel,
                )
                .await;
            reports.push(report);
        }

        drop(record_tx);
        writer.await.context("index writer task failed")?;
        if let Some(task) = deadline {
            task.abort();
        }

        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        let report = RunReport {
            run_id: run.id,
            collection: run.collection.clone(),
            started_at: run.started_at,
            finished_at: Utc::now(),
            cancelled: cancel.is_cancelled(),
            adapters: reports,
            filtered: load(&counters.filtered),
            extraction_skipped: load(&counters.extraction_skipped),
            empty_skipped: load(&counters.empty_skipped),
            discarded: load(&counters.discarded),
            upserted: load(&counters.upserted),
            upsert_failures: load(&counters.upsert_failures),
        };
        tracing::info!(
            run_id = %report.run_id,
            upserted = report.upserted,
            upsert_failures = report.upsert_failures,
            cancelled = report.cancelled,
            "ingestion run finished"
        );
        Ok(report)
    }

    async fn run_adapter(
        &self,
        adapter: Arc<dyn SourceAdapter>,
        run: &Arc<IngestionRun>,
        records: mpsc::Sender<ContentRecord>,
        counters: &Arc<RunCounters>,
        cancel: &CancelToken,
    ) -> AdapterReport {
        let name = adapter.name().to_string();
        let kind = adapter.kind();
        tracing::info!(adapter = %name, kind = kind.label(), "scanning source");

        let (item_tx, item_rx) = mpsc::channel::<RawItem>(self.options.workers * 2);
        let sink = ItemSink::new(item_tx, cancel.clone());
        let producer = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.scan(sink).await })
        };

        let item_rx = Arc::new(Mutex::new(item_rx));
        let received = Arc::new(AtomicUsize::new(0));
        let mut workers = JoinSet::new();
        for _ in 0..self.options.workers {
            let worker = Worker {
                items: Arc::clone(&item_rx),
                filter: adapter.filter().clone(),
                extractor: self.extractor,
                run: Arc::clone(run),
                records: records.clone(),
                counters: Arc::clone(counters),
                received: Arc::clone(&received),
                cancel: cancel.clone(),
            };
            workers.spawn(worker.run());
        }
        drop(records);

        let scan = producer.await;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(adapter = %name, error = %e, "ingestion worker failed");
            }
        }

        let mut report = AdapterReport {
            name: name.clone(),
            kind,
            emitted: 0,
            items_received: received.load(Ordering::Relaxed),
            failures: Vec::new(),
            error: None,
            cancelled: false,
        };
        match scan {
            Ok(Ok(scan)) => {
                if !scan.failures.is_empty() {
                    tracing::warn!(adapter = %name, failures = scan.failures.len(), "source finished with skipped items");
                }
                report.emitted = scan.emitted;
                report.failures = scan.failures;
            }
            Ok(Err(SourceError::Cancelled)) => {
                tracing::warn!(adapter = %name, "source scan cancelled");
                report.cancelled = true;
            }
            Ok(Err(e)) => {
                tracing::error!(adapter = %name, error = %e, "source failed");
                report.error = Some(e.to_string());
            }
            Err(e) => {
                tracing::error!(adapter = %name, error = %e, "source task panicked");
                report.error = Some(format!("adapter task failed: {e}"));
            }
        }
        report
    }
}

struct Worker {
    items: Arc<Mutex<mpsc::Receiver<RawItem>>>,
    filter: ContentFilter,
    extractor: Extractor,
    run: Arc<IngestionRun>,
    records: mpsc::Sender<ContentRecord>,
    counters: Arc<RunCounters>,
    received: Arc<AtomicUsize>,
    cancel: CancelToken,
}

impl Worker {
    async fn run(self) {
        loop {
            let next = {
                let mut items = self.items.lock().await;
                items.recv().await
            };
            let Some(item) = next else { break };
            bump(&self.received);

            // Keep draining so a producer blocked on a full channel can observe
            // the cancellation and return.
            if self.cancel.is_cancelled() {
                bump(&self.counters.discarded);
                continue;
            }
            self.process(item).await;
        }
    }

    async fn process(&self, item: RawItem) {
        if !self.filter.eligible(&item.name, &item.extension) {
            tracing::debug!(location = %item.location, "filtered");
            bump(&self.counters.filtered);
            return;
        }

        let extractor = self.extractor;
        let (item, extracted) = match item.content_type {
            ContentType::PlainText => {
                let result = extractor.extract(&item);
                (item, result)
            }
            _ => {
                let joined = tokio::task::spawn_blocking(move || {
                    let result = extractor.extract(&item);
                    (item, result)
                })
                .await;
                match joined {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "extraction task failed");
                        bump(&self.counters.extraction_skipped);
                        return;
                    }
                }
            }
        };

        let body = match extracted {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::debug!(location = %item.location, "empty content; skipped");
                bump(&self.counters.empty_skipped);
                return;
            }
            Err(e) => {
                tracing::warn!(location = %item.location, error = %e, "extraction failed; skipped");
                bump(&self.counters.extraction_skipped);
                return;
            }
        };

        let id = self.run.allocate(item.kind, item.content_type, &item.location, &body);
        let record = ContentRecord {
            id,
            metadata: item.metadata(),
            body,
            source_location: item.location,
            source_kind: item.kind,
        };
        if self.records.send(record).await.is_err() {
            tracing::error!("index writer stopped; record dropped");
        }
    }
}

async fn write_records(
    collection: Arc<dyn Collection>,
    mut records: mpsc::Receiver<ContentRecord>,
    counters: Arc<RunCounters>,
) {
    while let Some(record) = records.recv().await {
        let ContentRecord {
            id,
            body,
            source_location,
            source_kind,
            metadata,
        } = record;
        match collection
            .upsert(std::slice::from_ref(&id), &[body], &[metadata])
            .await
        {
            Ok(()) => {
                tracing::debug!(id = %id, kind = source_kind.label(), location = %source_location, "upserted");
                bump(&counters.upserted);
            }
            Err(e) => {
                tracing::warn!(id = %id, location = %source_location, error = %e, "upsert failed");
                bump(&counters.upsert_failures);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ScanReport;
    use async_trait::async_trait;
    use sift_core::embedding::HashingEmbedder;
    use sift_core::index::memory::InMemoryIndex;

    struct Scripted {
        name: &'static str,
        kind: SourceKind,
        items: Vec<(&'static str, &'static str)>,
        fail: Option<fn() -> SourceError>,
        filter: ContentFilter,
    }

    impl Scripted {
        fn chat(items: Vec<(&'static str, &'static str)>) -> Self {
            Self {
                name: "chat",
                kind: SourceKind::Chat,
                items,
                fail: None,
                filter: ContentFilter::messages(),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn filter(&self) -> &ContentFilter {
            &self.filter
        }

        async fn scan(&self, sink: ItemSink) -> Result<ScanReport, SourceError> {
            if let Some(fail) = self.fail {
                return Err(fail());
            }
            let mut report = ScanReport::default();
            for (name, text) in &self.items {
                let location = format!("https://example.test/{name}");
                sink.emit(RawItem::text(self.kind, *name, location, text.to_string()))
                    .await?;
                report.emitted += 1;
            }
            Ok(report)
        }
    }

    fn index() -> Arc<InMemoryIndex> {
        Arc::new(InMemoryIndex::new(Arc::new(HashingEmbedder::new(64))))
    }

    #[test]
    fn counter_ids_are_namespaced_by_prefix() {
        let run = IngestionRun::new("c", IdStrategy::Counter);
        let body = Body::Text("x".into());
        let a = run.allocate(SourceKind::Local, ContentType::PlainText, "/a", &body);
        let b = run.allocate(SourceKind::Local, ContentType::Pdf, "/b", &body);
        let c = run.allocate(SourceKind::Local, ContentType::PlainText, "/c", &body);
        let d = run.allocate(SourceKind::Chat, ContentType::PlainText, "/d", &body);
        assert_eq!((a.as_str(), b.as_str(), c.as_str(), d.as_str()), ("txt0", "pdf0", "txt1", "slack0"));
    }

    #[test]
    fn content_hash_ids_ignore_order() {
        let body = Body::Text("same".into());
        let first = IngestionRun::new("c", IdStrategy::ContentHash);
        let second = IngestionRun::new("c", IdStrategy::ContentHash);
        let _ = first.allocate(SourceKind::Chat, ContentType::PlainText, "/other", &Body::Text("o".into()));
        assert_eq!(
            first.allocate(SourceKind::Chat, ContentType::PlainText, "/m", &body),
            second.allocate(SourceKind::Chat, ContentType::PlainText, "/m", &body)
        );
    }

    #[tokio::test]
    async fn empty_messages_are_skipped_and_the_rest_upserted() {
        let index = index();
        let coordinator = IngestionCoordinator::new(index.clone(), IngestOptions::default());
        let adapter: Arc<dyn SourceAdapter> =
            Arc::new(Scripted::chat(vec![("m1", "ship it"), ("m2", "   "), ("m3", "lgtm")]));

        let report = coordinator
            .run("chat", &[adapter], CancelToken::new())
            .await
            .unwrap();

        assert_eq!(report.upserted, 2);
        assert_eq!(report.empty_skipped, 1);
        let chat = report.adapter("chat").unwrap();
        assert_eq!(chat.emitted, 3);
        assert_eq!(chat.items_received, 3);
        let collection = index.get_collection("chat").await.unwrap();
        assert_eq!(collection.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failing_adapter_does_not_stop_siblings() {
        let index = index();
        let coordinator = IngestionCoordinator::new(index.clone(), IngestOptions::default());
        let broken = Scripted {
            name: "broken",
            fail: Some(|| SourceError::Auth {
                url: "https://example.test".into(),
                detail: "invalid_auth".into(),
            }),
            ..Scripted::chat(vec![])
        };
        let adapters: Vec<Arc<dyn SourceAdapter>> =
            vec![Arc::new(broken), Arc::new(Scripted::chat(vec![("m1", "hello")]))];

        let report = coordinator.run("c", &adapters, CancelToken::new()).await.unwrap();

        assert!(report.adapter("broken").unwrap().error.is_some());
        assert!(report.adapter("chat").unwrap().error.is_none());
        assert_eq!(report.upserted, 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_writes_nothing() {
        let index = index();
        let coordinator = IngestionCoordinator::new(index.clone(), IngestOptions::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let adapter: Arc<dyn SourceAdapter> = Arc::new(Scripted::chat(vec![("m1", "hello")]));

        let report = coordinator.run("c", &[adapter], cancel).await.unwrap();

        assert!(report.cancelled);
        assert!(report.adapters[0].cancelled);
        assert_eq!(report.upserted, 0);
    }
}
