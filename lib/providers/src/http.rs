//! Response handling shared by the REST clients.

use crate::error::ProviderError;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

const MAX_ERROR_BODY: usize = 512;

pub(crate) fn transport(provider: &str, err: &reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        provider: provider.to_string(),
        reason: err.to_string(),
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("... [truncated]");
    }
    body
}

/// Turns non-success statuses into errors.
pub(crate) async fn check(provider: &str, response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = truncate(response.text().await.unwrap_or_default());
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::AuthenticationFailed {
            provider: provider.to_string(),
            reason: body,
        });
    }
    Err(ProviderError::Api {
        provider: provider.to_string(),
        status: status.as_u16(),
        message: body,
    })
}

/// Checks the status and decodes a JSON body.
pub(crate) async fn json<T: DeserializeOwned>(
    provider: &str,
    response: Response,
) -> Result<T, ProviderError> {
    check(provider, response)
        .await?
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse {
            provider: provider.to_string(),
            reason: e.to_string(),
        })
}
