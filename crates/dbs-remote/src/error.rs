use thiserror::Error;

/// Errors raised by the remote catalog client (C1). Every variant maps to
/// `RemoteUnavailable` at the engine boundary: the resolver treats all of
/// these identically (swallow, log, drop that branch).
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("could not reach {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type Result<T> = std::result::Result<T, RemoteError>;
