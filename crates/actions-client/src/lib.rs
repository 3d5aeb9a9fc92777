//! HTTP client masking transient network failures with exponential back-off.
//!
//! # Overview
//!
//! - A [`Transport`] sends a single request and classifies its failures as
//!   [temporary](TransportError::is_temporary()) or permanent. [`HyperTransport`] is the default
//!   implementation based on the `hyper` client with TLS support.
//! - A [`RetryStrategy`] decides whether a failed attempt is repeated and after which delay.
//!   Strategies are stateful and are created per logical request from a [`RetryPolicy`].
//! - [`ResilientClient`] combines the two: temporary failures are retried while the strategy
//!   allows it; permanent failures and all received HTTP responses (including ones with error
//!   status codes) are returned immediately.
//!
//! # Examples
//!
//! ```no_run
//! use actions_client::{ExponentialBackOff, ResilientClient, TransportConfig};
//! use hyper::Request;
//! use std::time::Duration;
//!
//! # async fn test() -> Result<(), Box<dyn std::error::Error>> {
//! let retry_policy = ExponentialBackOff::new(Duration::from_millis(10), 3);
//! let client = ResilientClient::from_config(TransportConfig::default(), retry_policy.into());
//! let request = Request::get("https://api.github.com/").body(())?;
//! let response = client.execute(&request).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

// Linter settings.
#![warn(missing_debug_implementations, missing_docs, bare_trait_objects)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

pub use crate::{
    client::{ClientError, ResilientClient},
    retry::{uniform_jitter, Entropy, ExponentialBackOff, NoRetry, RetryPolicy, RetryStrategy},
    transport::{
        BoxError, BoxFuture, HyperTransport, ResponseBody, Transport, TransportConfig,
        TransportError,
    },
};

mod client;
mod retry;
mod transport;
