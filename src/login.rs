use std::sync::OnceLock;

use regex::Regex;
use reqwest::StatusCode;
use reqwest::header;
use url::Url;

use crate::config::KeepAliveConfig;
use crate::error::Error;
use crate::types::{Credentials, SessionOutcome};

// Field names and fixed values the legacy login form requires. These are
// protocol constants observed from the server's form, not user input.
const FIELD_VIEWSTATE: &str = "__VIEWSTATE";
const FIELD_VIEWSTATE_GENERATOR: &str = "__VIEWSTATEGENERATOR";
const FIELD_USERNAME: &str = "txtUID";
const FIELD_PASSWORD: &str = "txtPWD";
const SUBMIT_BUTTON: (&str, &str) = ("Button1", "Login");
const LOGIN_MODE: (&str, &str) = ("drpType", "FA");
const PRODUCT_TYPE: (&str, &str) = ("hidProductType", "Server");
const CUSTOMER_CODE: (&str, &str) = ("hidCustomer", "NCS");

/// Reauthentication client for the legacy login form.
///
/// The protocol is confirm-then-verify: the server answers HTTP 200 for both
/// successful logins and pages that silently show "login failed", so the
/// POST's apparent success is only trusted after a follow-up GET to the
/// authenticated landing resource returns 200.
pub struct LoginClient {
    http: reqwest::Client,
    login_url: Url,
    landing_url: Url,
    landing_path: String,
    origin: String,
}

impl LoginClient {
    /// Create a client with its own cookie-holding HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured paths do not resolve
    /// against the base URL, or [`Error::Http`] if the client cannot be
    /// built.
    pub fn new(config: &KeepAliveConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Self::with_http_client(config, http)
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    /// The client must keep cookies, or the confirm step always fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured paths do not resolve
    /// against the base URL.
    pub fn with_http_client(
        config: &KeepAliveConfig,
        http: reqwest::Client,
    ) -> Result<Self, Error> {
        Ok(Self {
            http,
            login_url: config.join(&config.login_path)?,
            landing_url: config.join(&config.landing_path)?,
            landing_path: config.landing_path.clone(),
            origin: config.base_url.origin().ascii_serialization(),
        })
    }

    /// Run one full reauthentication attempt.
    ///
    /// Network failures are reported as an unsuccessful outcome with the
    /// error's message, never as an `Err`: the outcome crosses a message
    /// channel, and channels carry data, not exceptions.
    pub async fn login(&self, credentials: &Credentials) -> SessionOutcome {
        match self.try_login(credentials).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "login attempt failed with a network error");
                SessionOutcome::failed(format!("network error: {e}"))
            }
        }
    }

    async fn try_login(&self, credentials: &Credentials) -> Result<SessionOutcome, Error> {
        let page = self
            .http
            .get(self.login_url.clone())
            .send()
            .await?
            .text()
            .await?;
        let anti_forgery = AntiForgeryFields::extract(&page);

        let mut form: Vec<(&str, &str)> = vec![(FIELD_VIEWSTATE, &anti_forgery.view_state)];
        if !anti_forgery.generator.is_empty() {
            form.push((FIELD_VIEWSTATE_GENERATOR, &anti_forgery.generator));
        }
        form.push((FIELD_USERNAME, &credentials.username));
        form.push((FIELD_PASSWORD, &credentials.password));
        form.push(SUBMIT_BUTTON);
        form.push(LOGIN_MODE);
        form.push(PRODUCT_TYPE);
        form.push(CUSTOMER_CODE);

        let response = self
            .http
            .post(self.login_url.clone())
            .header(header::ORIGIN, &self.origin)
            .header(header::REFERER, self.login_url.as_str())
            .form(&form)
            .send()
            .await?;

        if !self.post_accepted(&response) {
            return Ok(SessionOutcome::failed(
                "login rejected, check the configured username and password",
            ));
        }

        // The positive control fetch is the only reliable success signal.
        if self.landing_alive().await? {
            tracing::info!("session cookie refreshed");
            Ok(SessionOutcome::ok(
                "session refreshed, signed in again. Rerun the query",
            ))
        } else {
            Ok(SessionOutcome::failed(
                "login looked successful but the landing page is still unreachable",
            ))
        }
    }

    fn post_accepted(&self, response: &reqwest::Response) -> bool {
        response.status().is_redirection()
            || response.url().as_str().contains(&self.landing_path)
            || response.status() == StatusCode::OK
    }

    /// Probe the authenticated landing resource. 200 means the cookies this
    /// client currently holds carry a live session. Also used by the host to
    /// decide whether a login/root page should bounce back home.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the probe cannot be sent at all.
    pub async fn landing_alive(&self) -> Result<bool, Error> {
        let response = self.http.get(self.landing_url.clone()).send().await?;
        Ok(response.status() == StatusCode::OK)
    }
}

/// The two anti-forgery hidden fields the server's form round-trips.
/// Absent fields yield empty values; the server tolerates an empty
/// viewstate on this form.
struct AntiForgeryFields {
    view_state: String,
    generator: String,
}

impl AntiForgeryFields {
    fn extract(html: &str) -> Self {
        Self {
            view_state: capture(viewstate_re(), html),
            generator: capture(generator_re(), html),
        }
    }
}

fn capture(re: &Regex, html: &str) -> String {
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

// The legacy page is not well-formed enough for an HTML parser; on these
// inputs the id attribute always precedes value.
fn viewstate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"id="__VIEWSTATE".*?value="(.*?)""#).expect("hard-coded pattern is valid")
    })
}

fn generator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"id="__VIEWSTATEGENERATOR".*?value="(.*?)""#)
            .expect("hard-coded pattern is valid")
    })
}
