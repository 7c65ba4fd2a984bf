use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::detect;
use super::intercept::{Interceptor, PageHooks};
use super::machine::{Navigator, SessionMachine, StatusSink};
use super::store::{ReplaySlot, SessionFlags};
use crate::config::KeepAliveConfig;
use crate::privileged::PrivilegedHandle;
use crate::signature::ExpirySignatures;
use crate::types::{ExpiryNotice, ExpirySource, ReplayCommand};

/// What the content task can see of a freshly loaded document.
#[derive(Debug, Clone, Copy)]
pub struct PageView<'a> {
    /// The load landed on the authenticated landing page, which is positive
    /// proof of a live session.
    pub on_landing_page: bool,
    /// Rendered text of the document.
    pub text: &'a str,
    /// Raw markup of the document.
    pub markup: &'a str,
}

/// One page instance's worth of session-continuity wiring.
///
/// A reload used to be the implicit reset of all continuity state; the scope
/// makes that boundary explicit. Channels, interceptor, in-flight guard, and
/// the machine task are all constructed fresh here and die together when the
/// scope is dropped on navigation. The only state that outlives a scope is
/// what the two stores persist.
pub struct SessionScope<H, F, R, S, N>
where
    H: PageHooks,
    F: SessionFlags,
    R: ReplaySlot,
    S: StatusSink,
    N: Navigator,
{
    interceptor: Arc<Interceptor<H>>,
    expiry_tx: mpsc::UnboundedSender<ExpiryNotice>,
    signatures: ExpirySignatures,
    machine: Option<(SessionMachine<F, R, S, N>, mpsc::UnboundedReceiver<ExpiryNotice>)>,
    tasks: Vec<JoinHandle<()>>,
}

impl<H, F, R, S, N> SessionScope<H, F, R, S, N>
where
    H: PageHooks,
    F: SessionFlags,
    R: ReplaySlot,
    S: StatusSink,
    N: Navigator,
{
    #[must_use]
    pub fn new(
        config: &KeepAliveConfig,
        flags: F,
        replay_slot: R,
        status: S,
        navigator: N,
        privileged: PrivilegedHandle,
        hooks: H,
    ) -> Self {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let (replay_tx, mut replay_rx) = mpsc::unbounded_channel::<ReplayCommand>();

        let interceptor = Arc::new(Interceptor::new(
            hooks,
            config.signatures.clone(),
            expiry_tx.clone(),
        ));

        // Page task: executes replay commands through the interception layer.
        let replay_interceptor = Arc::clone(&interceptor);
        let replay_task = tokio::spawn(async move {
            while let Some(command) = replay_rx.recv().await {
                replay_interceptor.replay(command).await;
            }
        });

        let machine = SessionMachine::new(
            config,
            flags,
            replay_slot,
            status,
            navigator,
            privileged,
            replay_tx,
        );

        Self {
            interceptor,
            expiry_tx,
            signatures: config.signatures.clone(),
            machine: Some((machine, expiry_rx)),
            tasks: vec![replay_task],
        }
    }

    /// The interception layer for this scope, to be wired into the page's
    /// alert and network primitives.
    #[must_use]
    pub fn interceptor(&self) -> Arc<Interceptor<H>> {
        Arc::clone(&self.interceptor)
    }

    /// Emit a DOM-sourced expiry notification. No request context, so a
    /// successful reauthentication only refreshes the page; nothing is
    /// replayed.
    pub fn notify_dom_expiry(&self) {
        let _ = self.expiry_tx.send(ExpiryNotice::bare(ExpirySource::Dom));
    }

    /// Page-load sequence, run once when the document is interactive:
    /// landing-page observation, one DOM-detector pass, the post-reload
    /// replay step. The machine task then starts draining notifications.
    ///
    /// Calling it again is a no-op.
    pub async fn start(&mut self, page: &PageView<'_>) {
        let Some((mut machine, expiry_rx)) = self.machine.take() else {
            return;
        };

        if page.on_landing_page {
            machine.observe_landing().await;
        }

        if detect::document_expired(page.text, page.markup, &self.signatures) {
            tracing::warn!("expired session rendered into the document");
            self.notify_dom_expiry();
        }

        machine.resume_after_reload().await;

        self.tasks.push(tokio::spawn(machine.run(expiry_rx)));
    }

    /// Tear the scope down, as navigation destroying the page instance
    /// would. Dropping the scope does the same.
    pub fn shutdown(mut self) {
        self.abort_tasks();
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl<H, F, R, S, N> Drop for SessionScope<H, F, R, S, N>
where
    H: PageHooks,
    F: SessionFlags,
    R: ReplaySlot,
    S: StatusSink,
    N: Navigator,
{
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
