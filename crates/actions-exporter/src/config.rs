//! Command-line configuration.

use actions_client::{ExponentialBackOff, RetryPolicy, TransportConfig};
use clap::{Parser, Subcommand};
use hyper::Uri;

use std::{fmt, net::SocketAddr, time::Duration};

use crate::github::DEFAULT_API_URL;

/// Prometheus exporter for GitHub Actions.
#[derive(Debug, Parser)]
#[command(name = "github-actions-exporter", version, about, long_about = None)]
pub struct Cli {
    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Exporter commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the exporter server.
    Server(ServerArgs),
}

/// Arguments of the `server` command.
#[derive(Clone, clap::Args)]
pub struct ServerArgs {
    /// Repository to collect metrics for, in the `owner/name` form.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: String,

    /// GitHub token used to authorize API requests.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Base URL of the GitHub REST API.
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Address of the health check listener.
    #[arg(long, env = "API_ADDRESS", default_value = "0.0.0.0:8080")]
    pub api_address: SocketAddr,

    /// Address of the metrics listener.
    #[arg(long, env = "MONITOR_ADDRESS", default_value = "0.0.0.0:9102")]
    pub monitor_address: SocketAddr,

    /// Interval between background scrapes, in seconds.
    #[arg(long, env = "COLLECTOR_LOOP_INTERVAL", default_value_t = 60)]
    pub collector_loop_interval: u64,

    /// Base delay of the exponential back-off for retried requests, in milliseconds.
    #[arg(long, default_value_t = 10)]
    pub retry_base_delay_ms: u64,

    /// Maximum number of retries for a request failing with a temporary error.
    #[arg(long, default_value_t = 3)]
    pub retry_count: u32,

    /// Timeout for receiving a response from GitHub, in seconds.
    #[arg(long, default_value_t = 3)]
    pub request_timeout: u64,

    /// Timeout for connecting to GitHub, in seconds.
    #[arg(long, default_value_t = 1)]
    pub connect_timeout: u64,

    /// Enable debug logs.
    #[arg(long, short)]
    pub verbose: bool,
}

impl fmt::Debug for ServerArgs {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ServerArgs")
            .field("repository", &self.repository)
            .field("api_url", &self.api_url)
            .field("api_address", &self.api_address)
            .field("monitor_address", &self.monitor_address)
            .field("collector_loop_interval", &self.collector_loop_interval)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_count", &self.retry_count)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

/// Invalid configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Repository is not in the `owner/name` form.
    #[error("repository `{0}` is not in the `owner/name` form")]
    InvalidRepository(String),
    /// API URL cannot be parsed or has no scheme.
    #[error("invalid GitHub API URL `{0}`")]
    InvalidApiUrl(String),
    /// Collector loop interval is zero.
    #[error("collector loop interval must be positive")]
    ZeroInterval,
}

/// Validated exporter configuration.
#[derive(Clone)]
pub struct ExporterConfig {
    /// Repository in the `owner/name` form.
    pub repository: String,
    /// GitHub token.
    pub token: String,
    /// Base URL of the GitHub REST API.
    pub api_url: String,
    /// Address of the health check listener.
    pub api_address: SocketAddr,
    /// Address of the metrics listener.
    pub monitor_address: SocketAddr,
    /// Interval between background scrapes.
    pub collector_loop_interval: Duration,
    /// Retry policy for GitHub API requests.
    pub retry_policy: RetryPolicy,
    /// Transport settings for GitHub API requests.
    pub transport: TransportConfig,
}

impl fmt::Debug for ExporterConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ExporterConfig")
            .field("repository", &self.repository)
            .field("api_url", &self.api_url)
            .field("api_address", &self.api_address)
            .field("monitor_address", &self.monitor_address)
            .field("collector_loop_interval", &self.collector_loop_interval)
            .field("retry_policy", &self.retry_policy)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl TryFrom<ServerArgs> for ExporterConfig {
    type Error = ConfigError;

    fn try_from(args: ServerArgs) -> Result<Self, Self::Error> {
        let is_valid_repository = args
            .repository
            .split_once('/')
            .is_some_and(|(owner, name)| {
                !owner.is_empty() && !name.is_empty() && !name.contains('/')
            });
        if !is_valid_repository {
            return Err(ConfigError::InvalidRepository(args.repository));
        }

        let has_scheme = args
            .api_url
            .parse::<Uri>()
            .is_ok_and(|uri| uri.scheme().is_some() && uri.host().is_some());
        if !has_scheme {
            return Err(ConfigError::InvalidApiUrl(args.api_url));
        }

        if args.collector_loop_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }

        let retry_policy = if args.retry_count == 0 {
            RetryPolicy::Never
        } else {
            let base = Duration::from_millis(args.retry_base_delay_ms);
            ExponentialBackOff::new(base, args.retry_count).into()
        };
        let transport = TransportConfig {
            connect_timeout: Duration::from_secs(args.connect_timeout),
            request_timeout: Duration::from_secs(args.request_timeout),
            ..TransportConfig::default()
        };

        Ok(Self {
            repository: args.repository,
            token: args.token,
            api_url: args.api_url,
            api_address: args.api_address,
            monitor_address: args.monitor_address,
            collector_loop_interval: Duration::from_secs(args.collector_loop_interval),
            retry_policy,
            transport,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn parse(args: &[&str]) -> ServerArgs {
        let args = ["github-actions-exporter", "server"].iter().chain(args);
        let Command::Server(args) = Cli::try_parse_from(args).unwrap().command;
        args
    }

    #[test]
    fn parsing_args_with_defaults() {
        let args = parse(&["--repository", "owner/repo", "--token", "secret"]);
        assert_eq!(args.api_url, DEFAULT_API_URL);
        assert_eq!(args.api_address, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(args.monitor_address, "0.0.0.0:9102".parse().unwrap());
        assert!(!args.verbose);

        let config = ExporterConfig::try_from(args).unwrap();
        assert_eq!(config.collector_loop_interval, Duration::from_secs(60));
        assert_eq!(config.transport.request_timeout, Duration::from_secs(3));
        assert_eq!(config.transport.connect_timeout, Duration::from_secs(1));
        assert_matches!(
            &config.retry_policy,
            RetryPolicy::ExponentialBackOff(backoff)
                if backoff.base() == Duration::from_millis(10) && backoff.retry_count() == 3
        );
    }

    #[test]
    fn debug_output_hides_token() {
        let args = parse(&["--repository", "owner/repo", "--token", "secret"]);
        assert!(!format!("{args:?}").contains("secret"));
        let config = ExporterConfig::try_from(args).unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn disabling_retries() {
        let args = parse(&[
            "--repository",
            "owner/repo",
            "--token",
            "secret",
            "--retry-count",
            "0",
            "--verbose",
        ]);
        assert!(args.verbose);
        let config = ExporterConfig::try_from(args).unwrap();
        assert_matches!(config.retry_policy, RetryPolicy::Never);
    }

    #[test]
    fn invalid_configs() {
        for repository in ["repo", "owner/", "/repo", "owner/repo/extra"] {
            let args = parse(&["--repository", repository, "--token", "secret"]);
            let err = ExporterConfig::try_from(args).unwrap_err();
            assert_matches!(err, ConfigError::InvalidRepository(repo) if repo == repository);
        }

        let args = parse(&[
            "--repository",
            "owner/repo",
            "--token",
            "secret",
            "--api-url",
            "api.github.com",
        ]);
        let err = ExporterConfig::try_from(args).unwrap_err();
        assert_matches!(err, ConfigError::InvalidApiUrl(_));

        let args = parse(&[
            "--repository",
            "owner/repo",
            "--token",
            "secret",
            "--collector-loop-interval",
            "0",
        ]);
        let err = ExporterConfig::try_from(args).unwrap_err();
        assert_matches!(err, ConfigError::ZeroInterval);
    }

    #[test]
    fn missing_repository_is_rejected() {
        let args = ["github-actions-exporter", "server", "--token", "secret"];
        if std::env::var_os("GITHUB_REPOSITORY").is_none() {
            Cli::try_parse_from(args).unwrap_err();
        }
    }
}
