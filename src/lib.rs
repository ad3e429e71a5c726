//! Client side of a message relay: binary wire codec, per-peer key
//! exchange, and message encryption.

pub mod client;
pub mod config;
pub mod crypto;
pub mod keys;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use client::{Client, ClientError, Delivery};
pub use config::ClientConfig;
