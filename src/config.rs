use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::signature::ExpirySignatures;
use crate::types::Credentials;

/// Keep-alive engine configuration.
///
/// The required field (`base_url`) is a constructor parameter — no runtime
/// "missing field" errors. Everything else defaults to the values the legacy
/// deployment uses and can be overridden with `with_*` methods.
///
/// `base_url` should end with a trailing slash: paths are resolved against
/// it, and `…/nsm_query` would drop its last segment on join.
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    pub(crate) base_url: Url,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) keep_alive_enabled: bool,
    pub(crate) login_path: String,
    pub(crate) landing_path: String,
    pub(crate) session_cookie_name: String,
    pub(crate) signatures: ExpirySignatures,
    pub(crate) settle_delay: Duration,
}

impl KeepAliveConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            credentials: None,
            keep_alive_enabled: false,
            login_path: "Login.aspx".into(),
            landing_path: "Index.aspx?isTest=N".into(),
            session_cookie_name: "ASP.NET_SessionId".into(),
            signatures: ExpirySignatures::default(),
            settle_delay: Duration::from_millis(1500),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `MES_BASE_URL`: site base URL (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `MES_USERNAME` / `MES_PASSWORD`: login credentials (both required
    ///   for keep-alive to attempt a login)
    /// - `MES_KEEP_ALIVE`: set to `"1"` or `"true"` to enable automatic
    ///   reauthentication
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `MES_BASE_URL` is missing or invalid.
    pub fn from_env() -> Result<Self, Error> {
        let base_url_str = std::env::var("MES_BASE_URL")
            .map_err(|_| Error::Config("MES_BASE_URL is required".into()))?;
        let base_url: Url = base_url_str
            .parse()
            .map_err(|e| Error::Config(format!("MES_BASE_URL: {e}")))?;

        let mut config = Self::new(base_url);

        if let (Ok(username), Ok(password)) =
            (std::env::var("MES_USERNAME"), std::env::var("MES_PASSWORD"))
        {
            config = config.with_credentials(Credentials::new(username, password));
        }

        let enabled = matches!(
            std::env::var("MES_KEEP_ALIVE").as_deref(),
            Ok("1") | Ok("true")
        );

        Ok(config.with_keep_alive_enabled(enabled))
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_keep_alive_enabled(mut self, enabled: bool) -> Self {
        self.keep_alive_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_landing_path(mut self, path: impl Into<String>) -> Self {
        self.landing_path = path.into();
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_signatures(mut self, signatures: ExpirySignatures) -> Self {
        self.signatures = signatures;
        self
    }

    /// Delay between a post-reload page becoming interactive and the replay
    /// being issued, so the page's own scripting finishes initializing.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn signatures(&self) -> &ExpirySignatures {
        &self.signatures
    }

    /// Resolve a configured path against the base URL.
    pub(crate) fn join(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("cannot resolve {path:?}: {e}")))
    }
}
