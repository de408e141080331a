//! CLI command implementations.

pub mod auth;
pub mod cart;
pub mod quote;

use std::sync::Arc;

use cartwheel_client::api::HttpApi;
use cartwheel_client::config::{ClientConfig, ConfigError};
use cartwheel_client::storage::{FileStore, StoreError};
use cartwheel_client::{ClientError, Storefront};
use thiserror::Error;

use crate::terminal::{NoGateway, TerminalNavigator};

/// Errors that end a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("{}", .0.user_message())]
    Client(#[from] ClientError),

    #[error("Failed to read password: {0}")]
    Password(#[from] std::io::Error),

    #[error("No email given and none remembered; pass --email")]
    MissingEmail,

    #[error("Not logged in; run `cartwheel login`")]
    NotLoggedIn,
}

/// Build a storefront backed by HTTP and the on-disk store.
///
/// # Errors
///
/// Returns an error if the storage directory cannot be opened.
pub fn storefront(config: ClientConfig) -> Result<Storefront, CommandError> {
    let store = FileStore::open(&config.storage_dir)?;
    let api = HttpApi::new(&config);

    Ok(Storefront::new(
        config,
        Arc::new(api),
        Arc::new(NoGateway),
        Arc::new(TerminalNavigator),
        Arc::new(store),
    ))
}
