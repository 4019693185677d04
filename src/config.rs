use crate::{
    error::Error,
    events::Address,
    fetcher::{
        DEFAULT_BLOCK_WINDOW,
        DEFAULT_FETCH_TIMEOUT,
    },
    wall::DEFAULT_DISPLAY_LIMIT,
};
use std::time::Duration;
use url::Url;

pub const DEFAULT_RPC_URL: &str = "https://bsc-testnet-rpc.publicnode.com";
pub const DEFAULT_CHAIN_ID: u64 = 97;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Historical message refresh.
    pub message_interval: Duration,
    /// Round and account state refresh.
    pub state_interval: Duration,
    /// Live filter polling in the JSON-RPC adapter.
    pub filter_interval: Duration,
    pub fetch_timeout: Duration,
    pub block_window: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            message_interval: Duration::from_secs(3),
            state_interval: Duration::from_secs(2),
            filter_interval: Duration::from_secs(1),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            block_window: DEFAULT_BLOCK_WINDOW,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rpc_url: Url,
    pub contract: Address,
    pub chain_id: u64,
    /// Enables account reads and writes.
    pub account: Option<Address>,
    pub default_invite_code: String,
    pub poll: PollConfig,
    pub display_limit: usize,
    pub retention: Option<usize>,
}

impl AppConfig {
    pub fn new(rpc_url: Url, contract: Address) -> Self {
        Self {
            rpc_url,
            contract,
            chain_id: DEFAULT_CHAIN_ID,
            account: None,
            default_invite_code: String::new(),
            poll: PollConfig::default(),
            display_limit: DEFAULT_DISPLAY_LIMIT,
            retention: None,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.contract.is_zero() {
            return Err(Error::Config("contract address must not be zero".into()));
        }
        if !matches!(self.rpc_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "unsupported rpc url scheme '{}'",
                self.rpc_url.scheme()
            )));
        }
        let poll = &self.poll;
        if [
            poll.message_interval,
            poll.state_interval,
            poll.filter_interval,
            poll.fetch_timeout,
        ]
        .contains(&Duration::ZERO)
        {
            return Err(Error::Config("poll intervals must be positive".into()));
        }
        if self.display_limit == 0 {
            return Err(Error::Config("display limit must be positive".into()));
        }
        if let Some(retention) = self.retention
            && retention < self.display_limit
        {
            return Err(Error::Config(format!(
                "retention {retention} is smaller than the display limit {}",
                self.display_limit
            )));
        }
        Ok(())
    }
}
