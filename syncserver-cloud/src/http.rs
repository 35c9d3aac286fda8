use crate::config::CloudConfig;
use crate::error::{CloudError, CloudResult};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

pub(crate) fn build_client(config: &CloudConfig) -> CloudResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(CloudError::Http)
}

/// Converts a non-success response into the shared taxonomy. Every
/// provider reports bad, expired and revoked tokens as 401.
pub(crate) async fn response_error(resp: Response, context: &str) -> CloudError {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return CloudError::AccessTokenRevokedOrExpired;
    }
    let body = resp.text().await.unwrap_or_default();
    CloudError::Failure(format!("{context}: HTTP {status}: {body}"))
}
