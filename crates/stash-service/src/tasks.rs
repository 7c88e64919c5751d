//! Background task supervisor.
//!
//! Each pass runs on its own interval in its own task. The tasks share
//! nothing but the stores behind the [`StorageService`] and stop together
//! when the supervisor is shut down.

use std::future::Future;
use std::time::Duration;

use stash_types::Clock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::service::StorageService;

/// Handles to the running background tasks.
pub struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    /// Start the import, ref expiry and collection tickers.
    ///
    /// Intervals are read from the configuration current at spawn time.
    pub fn spawn(service: &StorageService) -> Self {
        let cancel = CancellationToken::new();
        let gc = service.registry().snapshot().config.gc.clone();
        let mut handles = Vec::with_capacity(3);

        let imports = service.import_computer().clone();
        handles.push((
            "blob-ticker",
            spawn_ticker("blob-ticker", gc.blob_ticker_interval(), cancel.child_token(), move |cancel| {
                let imports = imports.clone();
                async move {
                    if let Err(e) = imports.tick(&cancel).await {
                        error!(task = "blob-ticker", error = %e, "import pass failed");
                    }
                }
            }),
        ));

        let expirer = service.ref_expirer().clone();
        let cache = service.ref_cache().clone();
        let clock = service.clock();
        handles.push((
            "ref-ticker",
            spawn_ticker("ref-ticker", gc.ref_ticker_interval(), cancel.child_token(), move |cancel| {
                let expirer = expirer.clone();
                let cache = cache.clone();
                let clock = clock.clone();
                async move {
                    if let Err(e) = expirer.tick(&cancel).await {
                        error!(task = "ref-ticker", error = %e, "ref expiry sweep failed");
                    }
                    let purged = cache.purge_idle(clock.now());
                    if purged > 0 {
                        debug!(purged, "idle ref cache entries purged");
                    }
                }
            }),
        ));

        let collector = service.garbage_collector().clone();
        handles.push((
            "gc-ticker",
            spawn_ticker("gc-ticker", gc.gc_ticker_interval(), cancel.child_token(), move |cancel| {
                let collector = collector.clone();
                async move {
                    if let Err(e) = collector.tick(&cancel).await {
                        error!(task = "gc-ticker", error = %e, "gc pass failed");
                    }
                }
            }),
        ));

        Self { cancel, handles }
    }

    /// Token that stops every task when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel every task and wait for in-flight passes to stop.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "background task ended abnormally");
            }
        }
    }
}

fn spawn_ticker<F, Fut>(name: &'static str, period: Duration, cancel: CancellationToken, mut tick: F) -> JoinHandle<()>
where
    F: FnMut(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(task = name, interval_secs = period.as_secs_f64(), "background task started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => tick(cancel.clone()).await,
            }
        }
        info!(task = name, "background task stopped");
    })
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.handles.iter().map(|(name, _)| *name).collect();
        f.debug_struct("BackgroundTasks")
            .field("tasks", &names)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
