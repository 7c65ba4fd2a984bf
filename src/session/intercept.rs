use std::future::Future;
use std::sync::Arc;

use derive_more::Display;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::Error;
use crate::signature::ExpirySignatures;
use crate::types::{CapturedRequest, ExpiryNotice, ExpirySource, ReplayCommand};

/// Marker the page's rendering layer puts at the front of failed query
/// responses; a replay that comes back with it is abandoned.
const REPLAY_FAILURE_MARKER: &str = "FAIL";

/// The page's own primitives, as an injected proxy object. The interception
/// layer observes through this surface without changing what the page sees.
pub trait PageHooks: Send + Sync + 'static {
    /// The real blocking alert primitive.
    fn alert(&self, message: &str);

    /// Issue a request through the page's own ajax mechanism and return the
    /// textual response body.
    fn send(&self, request: &CapturedRequest)
    -> impl Future<Output = Result<String, Error>> + Send;

    /// The page's native routine that turns a response body into markup.
    fn render(&self, body: &str);
}

impl<T: PageHooks> PageHooks for Arc<T> {
    fn alert(&self, message: &str) {
        T::alert(self, message);
    }

    fn send(
        &self,
        request: &CapturedRequest,
    ) -> impl Future<Output = Result<String, Error>> + Send {
        T::send(self, request)
    }

    fn render(&self, body: &str) {
        T::render(self, body);
    }
}

/// Which network primitive an exchange was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Transport {
    #[display("xhr")]
    Xhr,
    #[display("fetch")]
    Fetch,
}

impl From<Transport> for ExpirySource {
    fn from(transport: Transport) -> Self {
        match transport {
            Transport::Xhr => Self::Xhr,
            Transport::Fetch => Self::Fetch,
        }
    }
}

/// Wraps the page's alert and network primitives: pass-through unless an
/// expiry signature is detected, in which case a notification is emitted
/// toward the state machine.
///
/// Emits at most one notification per observed call and never deduplicates;
/// collapsing overlapping notifications is the state machine's job.
pub struct Interceptor<H> {
    hooks: H,
    signatures: ExpirySignatures,
    expiry_tx: UnboundedSender<ExpiryNotice>,
}

impl<H: PageHooks> Interceptor<H> {
    pub(crate) fn new(
        hooks: H,
        signatures: ExpirySignatures,
        expiry_tx: UnboundedSender<ExpiryNotice>,
    ) -> Self {
        Self {
            hooks,
            signatures,
            expiry_tx,
        }
    }

    /// The wrapped alert. An expiry-marked message is swallowed (the real
    /// primitive never runs, and the caller sees a truthy no-op) and turned
    /// into a notification with no request context. Anything else passes
    /// through unchanged.
    ///
    /// Returns true when the message was swallowed.
    pub fn on_alert(&self, message: &str) -> bool {
        if self.signatures.matches(message) {
            tracing::warn!(message, "alert swallowed, session expired");
            let _ = self.expiry_tx.send(ExpiryNotice::bare(ExpirySource::Alert));
            return true;
        }
        self.hooks.alert(message);
        false
    }

    /// Inspect one completed network exchange. A response body carrying an
    /// expiry signature emits a notification with the request exactly as it
    /// was sent, the only source of replayable context.
    pub fn observe_exchange(
        &self,
        transport: Transport,
        request: &CapturedRequest,
        response_body: &str,
    ) {
        if !self.signatures.matches(response_body) {
            return;
        }
        tracing::warn!(
            transport = %transport,
            url = %request.url,
            "expired session detected in response body"
        );
        let _ = self
            .expiry_tx
            .send(ExpiryNotice::with_request(transport.into(), request));
    }

    /// The replay entry point. The payload already satisfies the descriptor
    /// invariant (a [`ReplayCommand`] cannot be built or deserialized
    /// around a malformed one), so the request is reissued directly through
    /// the page's ajax mechanism and the response fed to the page's renderer.
    ///
    /// A response that still carries an expiry or failure marker abandons
    /// the replay silently: the reload that got us here already reset the
    /// single-flight state, and a second reauthentication from inside the
    /// replay handler would race it.
    pub async fn replay(&self, command: ReplayCommand) {
        let request = CapturedRequest::from(command.payload);
        tracing::info!(url = %request.url, method = %request.method, "replaying request");

        let body = match self.hooks.send(&request).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "replay request failed");
                return;
            }
        };

        if body.contains(REPLAY_FAILURE_MARKER) || self.signatures.matches(&body) {
            tracing::warn!(url = %request.url, "replay response still unauthenticated, abandoning");
            return;
        }

        self.hooks.render(&body);
    }
}
