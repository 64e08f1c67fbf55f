use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Default request timeout. Registration uploads ride the same client, so
/// this is generous.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Wallet backend configuration.
///
/// The required field (`base_url`) is a constructor parameter — no runtime
/// "missing field" errors. Optional fields use defaults, overridable with
/// `with_*` methods.
///
/// ```rust,ignore
/// use gifticon_wallet::Config;
///
/// let config = Config::new("https://wallet.example.com".parse()?)
///     .with_timeout(std::time::Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    pub(crate) base_url: Url,
    pub(crate) timeout: Duration,
}

impl Config {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `WALLET_BASE_URL`: backend origin (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `WALLET_TIMEOUT_SECS`: request timeout in seconds (default 60)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `WALLET_BASE_URL` is missing or invalid,
    /// or `WALLET_TIMEOUT_SECS` is not an integer.
    pub fn from_env() -> Result<Self, Error> {
        let base_url_str = std::env::var("WALLET_BASE_URL")
            .map_err(|_| Error::Config("WALLET_BASE_URL is required".into()))?;
        let base_url: Url = base_url_str
            .parse()
            .map_err(|e| Error::Config(format!("WALLET_BASE_URL: {e}")))?;

        let mut config = Self::new(base_url);

        if let Ok(secs) = std::env::var("WALLET_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("WALLET_TIMEOUT_SECS: {e}")))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Backend origin.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fixed request timeout applied to the shared HTTP client.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Join an endpoint path onto the base URL.
    pub(crate) fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().expect("base URL cannot be a base");
            segments.pop_if_empty();
            for segment in path.trim_start_matches('/').split('/') {
                segments.push(segment);
            }
        }
        url
    }
}
