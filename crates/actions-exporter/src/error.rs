//! Errors occurring during a scrape.

use actions_client::{BoxError, ClientError};
use hyper::{StatusCode, Uri};

/// Maximum length of a response body quoted in error messages.
const MAX_BODY_EXCERPT_LEN: usize = 512;

/// Error fetching or decoding a GitHub API resource. Any such error aborts the scrape cycle
/// it occurs in; the previously published metric values remain intact.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    /// Request could not be constructed (e.g., the URL is malformed).
    #[error("failed to create request object for `{url}`: {source}")]
    RequestConstruction {
        /// URL the request was targeting.
        url: String,
        /// Underlying error.
        #[source]
        source: http::Error,
    },
    /// Request failed on the transport level, possibly after several retries.
    #[error("failed to request: {0}")]
    Request(#[from] ClientError),
    /// Response body could not be read.
    #[error("failed to read response from `{uri}`: {source}")]
    ReadBody {
        /// Requested URI.
        uri: Uri,
        /// Underlying error.
        #[source]
        source: BoxError,
    },
    /// Server responded with a non-success status code.
    #[error("unexpected response status {status} from `{uri}`: {body}")]
    Status {
        /// Requested URI.
        uri: Uri,
        /// Response status.
        status: StatusCode,
        /// Excerpt of the response body.
        body: String,
    },
    /// Response has an unexpected shape.
    #[error("failed to parse response from `{uri}`: {source}")]
    Decode {
        /// Requested URI.
        uri: Uri,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Response is well-formed but violates the API contract (e.g., a required count is missing).
    #[error("bad response from `{uri}`: {body}")]
    BadResponse {
        /// Requested URI.
        uri: Uri,
        /// Excerpt of the response body.
        body: String,
    },
}

pub(crate) fn body_excerpt(body: &[u8]) -> String {
    let body = String::from_utf8_lossy(body);
    if body.len() <= MAX_BODY_EXCERPT_LEN {
        return body.into_owned();
    }
    let mut end = MAX_BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_excerpt_is_truncated_on_char_boundary() {
        assert_eq!(body_excerpt(b"{}"), "{}");

        let long_body = "я".repeat(MAX_BODY_EXCERPT_LEN);
        let excerpt = body_excerpt(long_body.as_bytes());
        assert!(excerpt.ends_with("..."));
        assert_eq!(excerpt.len(), MAX_BODY_EXCERPT_LEN + 3);
    }
}
