//! Source adapter trait and the plumbing adapters push items through.
//!
//! Every source (local tree, GitHub, Slack, Notion) implements
//! [`SourceAdapter`]. An adapter does not return a list: it pushes
//! [`RawItem`]s into an [`ItemSink`] backed by a bounded channel, so
//! items are produced lazily and a slow pipeline backpressures the
//! adapter's listing and fetching.
//!
//! ```text
//!  SourceAdapter::scan ──▶ ItemSink (bounded mpsc) ──▶ worker pool
//!          ▲                                             │
//!          └──────────── CancelToken ◀── deadline / ctrl-c
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sift_core::filter::ContentFilter;
use sift_core::models::{RawItem, SourceKind};
use tokio::sync::{mpsc, watch};

use crate::error::SourceError;

/// A data source that produces raw items for ingestion.
///
/// # Contract
///
/// - Items are pushed through [`ItemSink::emit`] as they are discovered.
/// - Failures of individual fetches or sub-listings are logged, recorded
///   in the returned [`ScanReport`], and traversal continues with siblings.
/// - Returning `Err` means the adapter as a whole failed (credentials
///   rejected, root listing unavailable). Sibling adapters are unaffected.
/// - Cancellation is observed before every listing and fetch.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Instance name used in logs and run reports (e.g. `"filesystem"`).
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Eligibility filter for this adapter's items.
    fn filter(&self) -> &ContentFilter;

    async fn scan(&self, sink: ItemSink) -> Result<ScanReport, SourceError>;
}

/// Non-fatal outcome of one adapter scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Items handed to the pipeline.
    pub emitted: usize,
    /// Skipped fetches and aborted sub-listings, one line each.
    pub failures: Vec<String>,
}

impl ScanReport {
    pub fn record_failure(&mut self, what: impl Into<String>) {
        self.failures.push(what.into());
    }
}

/// Run-wide cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|c| *c).await;
    }

    /// `Err(Cancelled)` if the run has been cancelled.
    pub fn check(&self) -> Result<(), SourceError> {
        if self.is_cancelled() {
            Err(SourceError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Where an adapter sends the items it discovers.
#[derive(Clone)]
pub struct ItemSink {
    tx: mpsc::Sender<RawItem>,
    cancel: CancelToken,
}

impl ItemSink {
    pub fn new(tx: mpsc::Sender<RawItem>, cancel: CancelToken) -> Self {
        Self { tx, cancel }
    }

    /// Hand an item to the pipeline, waiting while the channel is full.
    pub async fn emit(&self, item: RawItem) -> Result<(), SourceError> {
        self.cancel.check()?;
        self.tx.send(item).await.map_err(|_| SourceError::Cancelled)
    }

    /// [`emit`](Self::emit) for adapters running on the blocking pool.
    pub fn blocking_emit(&self, item: RawItem) -> Result<(), SourceError> {
        self.cancel.check()?;
        self.tx.blocking_send(item).map_err(|_| SourceError::Cancelled)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::models::RawItem;

    #[tokio::test]
    async fn emit_fails_after_cancel() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancelToken::new();
        let sink = ItemSink::new(tx, cancel.clone());

        let item = RawItem::text(SourceKind::Chat, "a", "loc", "hi".into());
        sink.emit(item.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().name, "a");

        cancel.cancel();
        assert!(sink.is_cancelled());
        assert!(matches!(sink.emit(item).await, Err(SourceError::Cancelled)));
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let cancel = CancelToken::new();
        let waiter = {
            let c = cancel.clone();
            tokio::spawn(async move { c.cancelled().await })
        };
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
