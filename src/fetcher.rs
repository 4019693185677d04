use crate::{
    app::chain_source::ChainSource,
    config::PollConfig,
    error::SourceError,
    events::ContractEvent,
};
use std::time::Duration;

pub const DEFAULT_BLOCK_WINDOW: u64 = 5_000;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded historical queries, mapped into typed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventLogFetcher {
    window: u64,
    timeout: Duration,
}

impl Default for EventLogFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_WINDOW, DEFAULT_FETCH_TIMEOUT)
    }
}

impl EventLogFetcher {
    pub fn new(window: u64, timeout: Duration) -> Self {
        Self { window, timeout }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.block_window, config.fetch_timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block range covering the last `window` blocks up to `latest`.
    pub fn recent_range(&self, latest: u64) -> (u64, u64) {
        (latest.saturating_sub(self.window), latest)
    }

    /// Events of type `T` in `from_block..=to_block`. Records that fail to
    /// decode are skipped.
    pub async fn fetch_range<S, T>(
        &self,
        source: &S,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<T>, SourceError>
    where
        S: ChainSource,
        T: ContractEvent,
    {
        let logs = with_timeout(
            self.timeout,
            source.query_events(T::KIND, from_block, to_block),
        )
        .await?;
        let total = logs.len();
        let events: Vec<T> = logs
            .iter()
            .filter_map(|log| match T::from_log(log) {
                Ok(event) => Some(event),
                Err(err) => {
                    tracing::warn!(
                        kind = %T::KIND,
                        block = log.block_number,
                        index = log.log_index,
                        ?err,
                        "skipping undecodable log"
                    );
                    None
                }
            })
            .collect();
        tracing::debug!(
            kind = %T::KIND,
            from_block,
            to_block,
            total,
            decoded = events.len(),
            "fetched event range"
        );
        Ok(events)
    }

    /// Events of type `T` within the configured window behind the head.
    pub async fn fetch_recent<S, T>(&self, source: &S) -> Result<Vec<T>, SourceError>
    where
        S: ChainSource,
        T: ContractEvent,
    {
        let latest = with_timeout(self.timeout, source.latest_block()).await?;
        let (from_block, to_block) = self.recent_range(latest);
        self.fetch_range(source, from_block, to_block).await
    }
}

/// Fails with [`SourceError::Timeout`] when `fut` does not settle in time.
pub async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, SourceError>>,
) -> Result<T, SourceError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| SourceError::Timeout(limit))?
}
