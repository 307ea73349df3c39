//! HTTP client for the MizanFlow remote record store.
//!
//! The backend exposes each synced table over a PostgREST-style REST API.
//! [`RemoteClient`] implements the core [`RemoteStore`] contract on top of it.
//!
//! [`RemoteStore`]: mizanflow_core::sync::RemoteStore

mod client;
mod config;
mod error;

pub use client::RemoteClient;
pub use config::{
    RemoteConfig, DEFAULT_TIMEOUT_SECS, ENV_ACCESS_TOKEN, ENV_API_KEY, ENV_API_TIMEOUT_SECS,
    ENV_API_URL,
};
pub use error::{RemoteError, Result};
