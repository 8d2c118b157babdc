use futures_util::{Stream, StreamExt};
use notification_service::NotificationService;
use social_client::PostBatch;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use ticker_store::{extract_tickers, TickerRepository};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::LedgerError;
use crate::ledger::SeenIdLedger;

/// What happened to one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub posts_received: usize,
    pub posts_processed: usize,
    pub new_symbols: BTreeSet<String>,
    pub failed_symbols: Vec<String>,
}

/// Owns the seen-id working set and turns batches into stored tickers and alerts.
pub struct Orchestrator {
    store: Arc<dyn TickerRepository>,
    ledger: SeenIdLedger,
    seen_ids: HashSet<String>,
    notifier: NotificationService,
    dispatches: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TickerRepository>,
        ledger: SeenIdLedger,
        seen_ids: HashSet<String>,
        notifier: NotificationService,
    ) -> Self {
        Self {
            store,
            ledger,
            seen_ids,
            notifier,
            dispatches: Vec::new(),
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen_ids.len()
    }

    /// Alert dispatch tasks that have not finished yet.
    pub fn pending_alerts(&self) -> usize {
        self.dispatches.iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait up to `timeout` for in-flight alerts. Anything still sending after
    /// that is aborted and logged; returns how many were abandoned.
    pub async fn drain(&mut self, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut abandoned = 0;

        for mut handle in self.dispatches.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Alert dispatch task failed: {}", e),
                Err(_) => {
                    handle.abort();
                    abandoned += 1;
                }
            }
        }

        if abandoned > 0 {
            tracing::error!(
                "Abandoned {} ticker alert(s) still sending after {:?}",
                abandoned,
                timeout
            );
        }
        abandoned
    }

    /// Consume batches until the stream ends. A failed batch is logged and skipped.
    pub async fn run(&mut self, batches: impl Stream<Item = PostBatch>) {
        tokio::pin!(batches);
        while let Some(batch) = batches.next().await {
            if let Err(e) = self.process_batch(&batch).await {
                tracing::error!(
                    account = %batch.account,
                    "An error occurred while processing a batch; continuing: {}",
                    e
                );
            }
        }
    }

    /// Store tickers from unseen posts and record their ids.
    ///
    /// Upserts are independent: a failing symbol is logged and the rest are
    /// still attempted. A ledger failure stops the batch, but symbols found
    /// before it are still reported.
    pub async fn process_batch(&mut self, batch: &PostBatch) -> Result<BatchReport, LedgerError> {
        let mut report = BatchReport {
            posts_received: batch.posts.len(),
            ..BatchReport::default()
        };

        let result = self.process_posts(batch, &mut report).await;

        if report.new_symbols.is_empty() {
            tracing::info!(
                account = %batch.account,
                "Processed batch. No new tickers found."
            );
        } else {
            let symbols: Vec<String> = report.new_symbols.iter().cloned().collect();
            tracing::info!(
                account = %batch.account,
                "Processed batch. Found new unique tickers: {}",
                symbols.join(", ")
            );
            if let Some(handle) = self.notifier.notify(&symbols) {
                self.dispatches.push(handle);
            }
        }
        self.dispatches.retain(|h| !h.is_finished());

        result.map(|()| report)
    }

    async fn process_posts(
        &mut self,
        batch: &PostBatch,
        report: &mut BatchReport,
    ) -> Result<(), LedgerError> {
        for post in &batch.posts {
            if self.seen_ids.contains(&post.id) {
                continue;
            }

            for symbol in extract_tickers(&post.text) {
                match self.store.upsert(&symbol).await {
                    Ok(_) => {
                        report.new_symbols.insert(symbol);
                    }
                    Err(e) => {
                        tracing::error!(
                            account = %batch.account,
                            post_id = %post.id,
                            "Failed to store ticker {}: {}",
                            symbol,
                            e
                        );
                        report.failed_symbols.push(symbol);
                    }
                }
            }

            self.ledger.append(&post.id).await?;
            self.seen_ids.insert(post.id.clone());
            report.posts_processed += 1;
        }
        Ok(())
    }
}

/// Sweep expired tickers every `every`, starting one interval from now, until
/// `shutdown` flips to `true` or its sender is dropped.
pub fn spawn_sweep_task(
    store: Arc<dyn TickerRepository>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match store.sweep().await {
                        Ok(removed) => tracing::debug!("Expiry sweep finished ({} removed)", removed),
                        Err(e) => tracing::error!("Expiry sweep failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Expiry sweep task stopped");
                        break;
                    }
                }
            }
        }
    })
}
