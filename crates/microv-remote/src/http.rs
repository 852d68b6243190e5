use std::time::Duration;

use crate::error::RemoteError;

/// HTTP client with a request timeout, shareable between the service clients
pub fn client_with_timeout(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Return the body text of a successful response, or an
/// [`RemoteError::Api`] carrying the status and body otherwise.
pub(crate) async fn success_text(response: reqwest::Response) -> Result<String, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(RemoteError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.text().await?)
}
