//! Remote Catalog Client (C1): fetches block/dataset lists and parent
//! edges from any DBS URL over HTTP+JSON.

pub mod client;
pub mod error;
pub mod models;

pub use client::RemoteClient;
pub use error::{RemoteError, Result};
