//! CDC feed commands

use super::{parse_time, print_json};
use crate::settings::EventideConfig;
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use eventide_core::{CdcBatch, CdcOptions, EventLog};
use eventide_replay::CdcStream;
use eventide_subscriptions::{NewSubscription, ReqwestTransport, SubscriptionManager};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Args, Debug, Default)]
pub struct FeedFilter {
    /// Resume after this cursor (an event id)
    #[arg(long)]
    pub after: Option<String>,
    /// Only events at or after this time (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    pub since: Option<DateTime<Utc>>,
    /// Entity type allow-list (repeatable)
    #[arg(long = "type")]
    pub types: Vec<String>,
    /// Verb allow-list (repeatable)
    #[arg(long = "verb")]
    pub verbs: Vec<String>,
    /// Events per batch; defaults to `cdc.batch_size`
    #[arg(long)]
    pub batch_size: Option<usize>,
}

impl FeedFilter {
    fn apply(&self, mut options: CdcOptions) -> CdcOptions {
        if let Some(after) = &self.after {
            options = options.after(after);
        }
        if let Some(since) = self.since {
            options = options.since(since);
        }
        if let Some(batch_size) = self.batch_size {
            options = options.batch_size(batch_size);
        }
        options
            .with_types(self.types.iter().cloned())
            .with_verbs(self.verbs.iter().cloned())
    }
}

#[derive(Args, Debug)]
pub struct PollArgs {
    #[command(flatten)]
    pub filter: FeedFilter,
}

#[derive(Args, Debug)]
pub struct TailArgs {
    #[command(flatten)]
    pub filter: FeedFilter,
    /// Also POST each event to this URL
    #[arg(long)]
    pub webhook: Option<String>,
    /// Sign forwarded payloads with this secret
    #[arg(long, requires = "webhook")]
    pub secret: Option<String>,
    /// Only forward events whose type matches this pattern
    #[arg(long, default_value = "*")]
    pub pattern: String,
}

pub async fn poll(log: Arc<dyn EventLog>, config: &EventideConfig, args: PollArgs) -> Result<()> {
    let cdc = CdcStream::new(log, config.cdc.cdc_config());
    let batch = cdc.poll(&args.filter.apply(cdc.options())).await?;
    print_json(&batch)
}

pub async fn tail(log: Arc<dyn EventLog>, config: &EventideConfig, args: TailArgs) -> Result<()> {
    let forwarder = match &args.webhook {
        Some(url) => {
            let manager =
                SubscriptionManager::new(Arc::new(ReqwestTransport::new(&config.webhook)?));
            let mut request = NewSubscription::webhook(&args.pattern, url);
            if let Some(secret) = &args.secret {
                request = request.with_secret(secret);
            }
            manager.subscribe(request)?;
            info!(url = %url, pattern = %args.pattern, "Forwarding events to webhook");
            Some(manager)
        }
        None => None,
    };

    let cdc = CdcStream::new(log, config.cdc.cdc_config());
    let stream = cdc.consumer(args.filter.apply(cdc.options()));
    let start = args.filter.after.clone().unwrap_or_default();
    let cursor = follow(stream, forwarder.as_ref(), start, tokio::signal::ctrl_c()).await?;

    info!(cursor = %cursor, "Stopped; resume with --after {cursor}");
    Ok(())
}

/// Print (and optionally forward) batches until the stream ends or
/// `shutdown` resolves. Returns the last cursor reached.
async fn follow<S, F>(
    stream: S,
    forwarder: Option<&SubscriptionManager>,
    mut cursor: String,
    shutdown: F,
) -> Result<String>
where
    S: Stream<Item = eventide_core::Result<CdcBatch>>,
    F: Future,
{
    tokio::pin!(stream);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            item = stream.next() => match item {
                Some(Ok(batch)) => {
                    for event in &batch.events {
                        print_json(event)?;
                        if let Some(manager) = forwarder {
                            let report = manager.dispatch(event).await;
                            if report.failed > 0 {
                                warn!(event_id = %event.id, "Webhook forward failed");
                            }
                        }
                    }
                    cursor = batch.cursor;
                }
                Some(Err(e)) => warn!("Feed poll failed, retrying: {e}"),
                None => break,
            },
        }
    }

    Ok(cursor)
}
