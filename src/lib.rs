pub mod abi;

pub mod actions;

pub mod app;

pub mod clock;

pub mod codec;

pub mod config;

pub mod error;

pub mod events;

pub mod fetcher;

pub mod logging;

pub mod snapshot;

pub mod status;

pub mod subscriber;

pub mod wall;

pub mod test_helpers;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
