//! Chain watcher
//!
//! A single long-lived cooperative task that keeps open channels from
//! drifting into their refund window. On a coarse timer it reads the
//! chain height, walks the registry, and force-closes any open channel
//! whose height has reached
//! `block_height + max(policy.soft_timeout, timeout / 2)` — far enough
//! ahead of the CSV timeout that the close can confirm before the
//! sender's refund becomes spendable.
//!
//! Per-channel failures are logged and never abort a tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::chain::ChainBackend;
use crate::channel::Status;
use crate::errors::Result;
use crate::service::receiver::ReceiverService;
use crate::store::{Record, Store};
use crate::wire::CloseRequest;

/// Default pause between watcher ticks
pub const WATCH_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic force-close loop over the channel registry
pub struct ChainWatcher<C, S> {
    service: Arc<ReceiverService<C, S>>,
    interval: Duration,
}

impl<C: ChainBackend, S: Store> ChainWatcher<C, S> {
    /// Creates a watcher over a service with the default interval
    pub fn new(service: Arc<ReceiverService<C, S>>) -> Self {
        Self { service, interval: WATCH_INTERVAL }
    }

    /// Overrides the tick interval (tests, aggressive deployments)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs until the shutdown signal fires
    ///
    /// Tick failures are logged; the loop sleeps and retries.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "chain watcher tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("chain watcher stopping");
                    return;
                }
            }
        }
    }

    /// One pass over the registry
    pub async fn tick(&self) -> Result<()> {
        let block_count = self.service.chain().block_count().await?;
        let records = self.service.list().await?;

        for record in records {
            if let Err(e) = self.check_channel(block_count, &record).await {
                error!(channel = %record.id, error = %e, "failed to force-close channel");
            }
        }

        Ok(())
    }

    /// Force-closes one channel if its timeout is near
    async fn check_channel(&self, block_count: u64, record: &Record) -> Result<()> {
        let state = &record.state;
        if state.status != Status::Open {
            return Ok(());
        }

        let soft_timeout = self.service.policy().soft_timeout;
        let margin = soft_timeout.max((state.timeout / 2) as u64);
        let cutoff = state.block_height + margin;

        if block_count < cutoff {
            return Ok(());
        }

        info!(channel = %record.id, block_count, cutoff, "closing channel nearing its timeout");

        self.service
            .close(CloseRequest {
                txid: state.funding_txid.clone(),
                vout: state.funding_vout,
            })
            .await?;
        Ok(())
    }
}
