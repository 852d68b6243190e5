/// Errors from any of the remote service clients
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("service error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The body did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Could not establish the annotation channel.
    #[error("connection error: {0}")]
    Connection(String),

    /// Failure on an established annotation channel.
    #[error("channel error: {0}")]
    Channel(String),
}
