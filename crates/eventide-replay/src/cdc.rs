//! CdcStream - Cursor-stable change feed
//!
//! `poll` is a single request against the log's CDC contract. `consumer`
//! turns repeated polls into a lazy, never-ending stream of non-empty
//! batches; the caller stops it by dropping the stream.

use eventide_core::{CdcBatch, CdcOptions, EventLog, Result, DEFAULT_BATCH_SIZE};
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Consumer tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdcConfig {
    /// Batch size for options built by [`CdcStream::options`]
    pub batch_size: usize,
    /// Wait between polls once the feed is caught up
    pub poll_interval: Duration,
}

impl Default for CdcConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// Pollable change feed over an event log
#[derive(Clone)]
pub struct CdcStream {
    log: Arc<dyn EventLog>,
    config: CdcConfig,
}

impl CdcStream {
    /// Create a feed over a log
    #[must_use]
    pub fn new(log: Arc<dyn EventLog>, config: CdcConfig) -> Self {
        Self { log, config }
    }

    /// Feed configuration
    #[must_use]
    pub fn config(&self) -> &CdcConfig {
        &self.config
    }

    /// Options starting at the beginning of the log with the configured
    /// batch size
    #[must_use]
    pub fn options(&self) -> CdcOptions {
        CdcOptions::new().batch_size(self.config.batch_size)
    }

    /// Fetch one batch
    #[instrument(skip(self))]
    pub async fn poll(&self, options: &CdcOptions) -> Result<CdcBatch> {
        let batch = self.log.cdc(options).await?;
        debug!(
            count = batch.events.len(),
            has_more = batch.has_more,
            cursor = %batch.cursor,
            "CDC poll"
        );
        Ok(batch)
    }

    /// Stream of batches resuming from each returned cursor.
    ///
    /// Empty polls are not yielded. After a batch with `has_more == false`
    /// the next poll waits `poll_interval`. A failed poll is yielded as an
    /// error, then retried from the same cursor after the same wait.
    pub fn consumer(
        &self,
        options: CdcOptions,
    ) -> impl Stream<Item = Result<CdcBatch>> + Send + 'static {
        let log = Arc::clone(&self.log);
        let interval = self.config.poll_interval;

        futures::stream::unfold((options, false), move |(mut options, wait)| {
            let log = Arc::clone(&log);
            async move {
                if wait {
                    tokio::time::sleep(interval).await;
                }
                loop {
                    match log.cdc(&options).await {
                        Ok(batch) if batch.is_empty() => {
                            tokio::time::sleep(interval).await;
                        }
                        Ok(batch) => {
                            options.after = Some(batch.cursor.clone());
                            let wait = !batch.has_more;
                            return Some((Ok(batch), (options, wait)));
                        }
                        Err(e) => {
                            warn!("CDC poll failed: {e}");
                            return Some((Err(e), (options, true)));
                        }
                    }
                }
            }
        })
    }
}
