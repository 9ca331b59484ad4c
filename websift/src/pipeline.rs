//! Streaming search → fetch pipeline.
//!
//! A run has two stages connected by a bounded channel:
//!
//! - the producer drives the blocking [`SearchAdapter`] on the blocking pool
//!   and pushes discovered URLs into the URL channel;
//! - the consumer reads URLs and spawns one fetch task per URL, at most
//!   `max_concurrent` at a time, until `fetch_count` fetches were scheduled.
//!
//! Fetch tasks deliver their outcomes into a second bounded channel which
//! backs the [`ResearchStream`]. A task keeps its semaphore permit until its
//! outcome has been accepted by that channel, so a slow reader throttles the
//! fetches, and a full URL channel in turn throttles the search.

use futures::{FutureExt, Stream, StreamExt};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::config::{FetchLimits, RunParameters};
use crate::fetch::{random_user_agent, Fetcher};
use crate::models::{FetchOutcome, RunStatistics};
use crate::search::SearchAdapter;

/// Failure reason for a fetch task that panicked.
pub const UNEXPECTED_ERROR: &str = "Unexpected error";

/// Runs research pipelines over a search adapter and a fetcher.
#[derive(Clone)]
pub struct Pipeline {
    adapter: SearchAdapter,
    fetcher: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(adapter: SearchAdapter, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { adapter, fetcher }
    }

    /// Starts a run and returns the stream of its fetch outcomes.
    ///
    /// Must be called from within a tokio runtime. Outcomes arrive in
    /// completion order.
    #[must_use]
    pub fn stream(&self, params: &RunParameters) -> ResearchStream {
        let concurrency = params.concurrency();
        let (url_tx, url_rx) = mpsc::channel::<String>(params.url_queue_capacity());
        let (result_tx, result_rx) = mpsc::channel::<FetchOutcome>(concurrency);
        let discovered = Arc::new(AtomicUsize::new(0));

        tracing::debug!(
            query = %params.query,
            search_results = params.search_results,
            fetch_count = params.fetch_count,
            max_concurrent = concurrency,
            "Pipeline searching"
        );

        let producer = Producer {
            adapter: self.adapter.clone(),
            query: params.query.clone(),
            count: params.search_results,
            discovered: Arc::clone(&discovered),
        };
        tokio::task::spawn_blocking(move || producer.run(&url_tx));

        let consumer = Consumer {
            fetcher: Arc::clone(&self.fetcher),
            limits: params.fetch_limits(),
            user_agent: Arc::from(random_user_agent()),
            fetch_count: params.fetch_count,
            semaphore: Arc::new(Semaphore::new(concurrency)),
        };
        tokio::spawn(consumer.run(url_rx, result_tx));

        ResearchStream {
            results: result_rx,
            stats: RunStatistics::new(params.query.clone()),
            discovered,
            finished: false,
        }
    }
}

struct Producer {
    adapter: SearchAdapter,
    query: String,
    count: usize,
    discovered: Arc<AtomicUsize>,
}

impl Producer {
    fn run(self, urls: &mpsc::Sender<String>) {
        for hit in self.adapter.search(&self.query, self.count) {
            self.discovered.fetch_add(1, Ordering::SeqCst);
            if urls.blocking_send(hit.url).is_err() {
                tracing::debug!(query = %self.query, "URL consumer gone; stopping search");
                return;
            }
        }
        tracing::debug!(
            query = %self.query,
            discovered = self.discovered.load(Ordering::SeqCst),
            "Search exhausted"
        );
    }
}

struct Consumer {
    fetcher: Arc<dyn Fetcher>,
    limits: FetchLimits,
    user_agent: Arc<str>,
    fetch_count: usize,
    semaphore: Arc<Semaphore>,
}

impl Consumer {
    fn cap_reached(&self, scheduled: usize) -> bool {
        self.fetch_count != 0 && scheduled >= self.fetch_count
    }

    async fn run(self, mut urls: mpsc::Receiver<String>, results: mpsc::Sender<FetchOutcome>) {
        let mut tasks = JoinSet::new();
        let mut scheduled = 0usize;

        loop {
            let url = tokio::select! {
                biased;
                () = results.closed() => {
                    tracing::debug!(scheduled, "Result stream dropped; no further fetches");
                    break;
                }
                next = urls.recv() => match next {
                    Some(url) => url,
                    None => break,
                },
            };

            while let Some(joined) = tasks.try_join_next() {
                log_join_error(joined);
            }

            // Past the cap URLs are still drained so the producer can finish.
            if self.cap_reached(scheduled) {
                continue;
            }

            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                break;
            };
            if results.is_closed() {
                break;
            }

            scheduled += 1;
            let fetcher = Arc::clone(&self.fetcher);
            let limits = self.limits.clone();
            let user_agent = Arc::clone(&self.user_agent);
            let results = results.clone();
            tasks.spawn(async move {
                let outcome = fetch_guarded(fetcher, url, limits, user_agent).await;
                if results.send(outcome).await.is_err() {
                    tracing::debug!("Result stream dropped; discarding outcome");
                }
                drop(permit);
            });
        }

        drop(urls);
        tracing::debug!(scheduled, in_flight = tasks.len(), "Pipeline draining");
        while let Some(joined) = tasks.join_next().await {
            log_join_error(joined);
        }
        tracing::debug!(scheduled, "Pipeline done");
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::warn!(error = %e, "Fetch task did not complete");
    }
}

async fn fetch_guarded(
    fetcher: Arc<dyn Fetcher>,
    url: String,
    limits: FetchLimits,
    user_agent: Arc<str>,
) -> FetchOutcome {
    let fetch = async { fetcher.fetch(&url, &limits, &user_agent).await };
    let result = AssertUnwindSafe(fetch).catch_unwind().await;
    match result {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(url = %url, "Fetch panicked");
            FetchOutcome::failure(url, UNEXPECTED_ERROR)
        }
    }
}

/// The outcomes of one run, in completion order.
///
/// Statistics are updated as outcomes are yielded. Dropping the stream stops
/// further fetches from being scheduled; fetches already running finish in
/// the background.
#[derive(Debug)]
pub struct ResearchStream {
    results: mpsc::Receiver<FetchOutcome>,
    stats: RunStatistics,
    discovered: Arc<AtomicUsize>,
    finished: bool,
}

impl ResearchStream {
    /// Statistics for the outcomes yielded so far.
    #[must_use]
    pub fn stats(&self) -> RunStatistics {
        let mut stats = self.stats.clone();
        stats.urls_searched = self.discovered.load(Ordering::SeqCst);
        stats
    }

    /// Whether the run has completed and every outcome was yielded.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consumes the stream to exhaustion.
    pub async fn collect(mut self) -> (Vec<FetchOutcome>, RunStatistics) {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next().await {
            outcomes.push(outcome);
        }
        let stats = self.stats();
        (outcomes, stats)
    }
}

impl Stream for ResearchStream {
    type Item = FetchOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.results.poll_recv(cx) {
            Poll::Ready(Some(outcome)) => {
                self.stats.record(&outcome);
                Poll::Ready(Some(outcome))
            }
            Poll::Ready(None) => {
                self.finished = true;
                self.stats.urls_searched = self.discovered.load(Ordering::SeqCst);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
