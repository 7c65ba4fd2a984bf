use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;

use url::Url;

use crate::config::KeepAliveConfig;
use crate::error::Error;
use crate::session::SessionFlags;

/// One cookie as the host browser stores it: exactly the attributes needed
/// to address it again for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
}

impl BrowserCookie {
    /// URL that addresses this cookie for removal, derived from the stored
    /// domain/path/secure attributes rather than guessed from the page URL.
    #[must_use]
    pub fn scoped_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}{}", self.domain, self.path)
    }
}

/// Host cookie-store access. Only the privileged context holds an
/// implementation with real browser reach; [`MemoryCookies`] serves tests
/// and embedded use.
pub trait BrowserCookies: Send + Sync + 'static {
    fn get(
        &self,
        url: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<BrowserCookie>, Error>> + Send;

    fn all_for_domain(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Vec<BrowserCookie>, Error>> + Send;

    /// Remove one cookie. Returns whether anything was deleted.
    fn remove(&self, url: &str, name: &str) -> impl Future<Output = Result<bool, Error>> + Send;
}

impl<T: BrowserCookies> BrowserCookies for Arc<T> {
    fn get(
        &self,
        url: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<BrowserCookie>, Error>> + Send {
        T::get(self, url, name)
    }

    fn all_for_domain(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<Vec<BrowserCookie>, Error>> + Send {
        T::all_for_domain(self, domain)
    }

    fn remove(&self, url: &str, name: &str) -> impl Future<Output = Result<bool, Error>> + Send {
        T::remove(self, url, name)
    }
}

/// Cookie lifecycle operations for the privileged context.
pub struct CookieManager<C, F> {
    cookies: C,
    flags: F,
    session_cookie_name: String,
}

impl<C: BrowserCookies, F: SessionFlags> CookieManager<C, F> {
    #[must_use]
    pub fn new(cookies: C, flags: F, config: &KeepAliveConfig) -> Self {
        Self {
            cookies,
            flags,
            session_cookie_name: config.session_cookie_name.clone(),
        }
    }

    /// Manual logout: mark the flag first. The state machine must already
    /// be paused by the time the cookie disappears, or an in-flight expiry
    /// detection would immediately undo the logout. Then delete only the
    /// session-identifying cookie; other cookies stay untouched so
    /// authenticated-but-unrelated state is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the flag cannot be written, or the cookie
    /// store's error if deletion fails. A missing cookie is not an error.
    pub async fn manual_logout(&self, page_url: &str) -> Result<(), Error> {
        self.flags.set_manual_logout(true).await?;
        tracing::info!("manual logout, automatic keep-alive paused");

        let Some(cookie) = self.cookies.get(page_url, &self.session_cookie_name).await? else {
            tracing::debug!(
                name = %self.session_cookie_name,
                "session cookie already absent"
            );
            return Ok(());
        };

        self.cookies
            .remove(&cookie.scoped_url(), &cookie.name)
            .await?;
        tracing::info!(name = %cookie.name, domain = %cookie.domain, "session cookie removed");
        Ok(())
    }

    /// Full sweep: enumerate every cookie for the page's domain and delete
    /// each one. Used on confirmed logout navigation when a harder reset is
    /// required; independent of the manual-logout flag's semantics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `page_url` is not a parseable URL with a
    /// host, or the cookie store's error if enumeration/deletion fails.
    pub async fn clear_all(&self, page_url: &str) -> Result<usize, Error> {
        let url: Url = page_url
            .parse()
            .map_err(|e| Error::Config(format!("bad page url {page_url:?}: {e}")))?;
        let domain = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("page url {page_url:?} has no host")))?;

        let cookies = self.cookies.all_for_domain(domain).await?;
        let mut removed = 0;
        for cookie in &cookies {
            if self.cookies.remove(&cookie.scoped_url(), &cookie.name).await? {
                removed += 1;
            }
        }
        tracing::info!(domain, removed, "cleared cookies for domain");
        Ok(removed)
    }
}

/// In-memory [`BrowserCookies`].
#[derive(Debug, Default)]
pub struct MemoryCookies {
    cookies: Mutex<Vec<BrowserCookie>>,
}

impl MemoryCookies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cookie: BrowserCookie) {
        let mut cookies = self.cookies.lock().expect("cookie lock");
        cookies.retain(|c| !(c.name == cookie.name && c.domain == cookie.domain));
        cookies.push(cookie);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.lock().expect("cookie lock").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BrowserCookies for MemoryCookies {
    async fn get(&self, url: &str, name: &str) -> Result<Option<BrowserCookie>, Error> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        Ok(self
            .cookies
            .lock()
            .expect("cookie lock")
            .iter()
            .find(|c| c.name == name && host.as_deref().is_none_or(|h| c.domain == h))
            .cloned())
    }

    async fn all_for_domain(&self, domain: &str) -> Result<Vec<BrowserCookie>, Error> {
        Ok(self
            .cookies
            .lock()
            .expect("cookie lock")
            .iter()
            .filter(|c| c.domain == domain)
            .cloned()
            .collect())
    }

    async fn remove(&self, url: &str, name: &str) -> Result<bool, Error> {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        let mut cookies = self.cookies.lock().expect("cookie lock");
        let before = cookies.len();
        cookies.retain(|c| !(c.name == name && host.as_deref().is_none_or(|h| c.domain == h)));
        Ok(cookies.len() != before)
    }
}
