//! Fixtures shared by unit and integration tests.

use crate::{
    app::{
        App,
        RunState,
        chain_source::ChainSource,
    },
    config::{
        AppConfig,
        DEFAULT_RPC_URL,
    },
    events::{
        Address,
        Message,
    },
};
use std::future::pending;
use url::Url;

pub fn alice() -> Address {
    Address::new([0xa1; 20])
}

pub fn bob() -> Address {
    Address::new([0xb0; 20])
}

pub fn contract() -> Address {
    Address::new([0xc0; 20])
}

pub fn message(author: Address, text: &str, timestamp: u64) -> Message {
    Message::new(author, text, timestamp)
}

/// Default configuration pointed at a placeholder node.
pub fn test_config(account: Option<Address>) -> AppConfig {
    let rpc_url = Url::parse(DEFAULT_RPC_URL).expect("default rpc url is valid");
    let mut config = AppConfig::new(rpc_url, contract());
    config.account = account;
    config
}

/// Drives `app` one input at a time until `done` holds. Returns whether it
/// did within `max_steps`.
pub async fn run_until<S>(
    app: &mut App<S>,
    max_steps: usize,
    mut done: impl FnMut(&App<S>) -> bool,
) -> bool
where
    S: ChainSource + Clone + Send + Sync + 'static,
{
    for _ in 0..max_steps {
        if done(app) {
            return true;
        }
        match app.run(pending()).await {
            Ok(RunState::Continue) => {}
            Ok(RunState::Exit) | Err(_) => return done(app),
        }
    }
    done(app)
}
