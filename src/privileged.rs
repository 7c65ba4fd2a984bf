use tokio::sync::{mpsc, oneshot};

use crate::cookies::{BrowserCookies, CookieManager};
use crate::login::LoginClient;
use crate::session::SessionFlags;
use crate::types::{Credentials, SessionOutcome};

/// Action requests into the privileged context.
///
/// Every variant carries its own responder: callers get their answer before
/// any follow-up navigation, which is the whole ordering guarantee the
/// cookie operations need.
#[derive(Debug)]
pub enum PrivilegedRequest {
    /// `DO_LOGIN`: run the reauthentication protocol.
    Login {
        credentials: Credentials,
        reply: oneshot::Sender<SessionOutcome>,
    },
    /// `MANUAL_LOGOUT`: flag the logout, delete the session cookie.
    ManualLogout {
        page_url: String,
        reply: oneshot::Sender<bool>,
    },
    /// `CLEAR_COOKIES`: full cookie sweep for the page's domain.
    ClearCookies {
        page_url: String,
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable sender half of the privileged channel.
///
/// A dead channel (privileged task gone) degrades into failure responses;
/// nothing on the calling side panics or hangs.
#[derive(Debug, Clone)]
pub struct PrivilegedHandle {
    tx: mpsc::UnboundedSender<PrivilegedRequest>,
}

impl PrivilegedHandle {
    /// Create the handle and the receiver the service loop drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PrivilegedRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub async fn login(&self, credentials: Credentials) -> SessionOutcome {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(PrivilegedRequest::Login { credentials, reply })
            .is_err()
        {
            return SessionOutcome::failed("privileged context unavailable");
        }
        rx.await
            .unwrap_or_else(|_| SessionOutcome::failed("privileged context dropped the request"))
    }

    pub async fn manual_logout(&self, page_url: impl Into<String>) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(PrivilegedRequest::ManualLogout {
                page_url: page_url.into(),
                reply,
            })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn clear_cookies(&self, page_url: impl Into<String>) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(PrivilegedRequest::ClearCookies {
                page_url: page_url.into(),
                reply,
            })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

/// The privileged task: the only place with unrestricted network and
/// cookie-store reach. Owns the login client and the cookie manager and
/// serves requests one at a time.
pub struct PrivilegedService<C, F> {
    login: LoginClient,
    cookies: CookieManager<C, F>,
}

impl<C: BrowserCookies, F: SessionFlags> PrivilegedService<C, F> {
    #[must_use]
    pub fn new(login: LoginClient, cookies: CookieManager<C, F>) -> Self {
        Self { login, cookies }
    }

    /// Serve until every handle is gone.
    pub async fn serve(self, mut rx: mpsc::UnboundedReceiver<PrivilegedRequest>) {
        while let Some(request) = rx.recv().await {
            self.dispatch(request).await;
        }
        tracing::debug!("privileged channel closed, service stopping");
    }

    async fn dispatch(&self, request: PrivilegedRequest) {
        match request {
            PrivilegedRequest::Login { credentials, reply } => {
                let outcome = self.login.login(&credentials).await;
                let _ = reply.send(outcome);
            }
            PrivilegedRequest::ManualLogout { page_url, reply } => {
                let ok = match self.cookies.manual_logout(&page_url).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "manual logout failed");
                        false
                    }
                };
                let _ = reply.send(ok);
            }
            PrivilegedRequest::ClearCookies { page_url, reply } => {
                let ok = match self.cookies.clear_all(&page_url).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "cookie sweep failed");
                        false
                    }
                };
                let _ = reply.send(ok);
            }
        }
    }
}
