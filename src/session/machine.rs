use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::store::{ReplaySlot, SessionFlags};
use crate::config::KeepAliveConfig;
use crate::error::Error;
use crate::privileged::PrivilegedHandle;
use crate::types::{Credentials, ExpiryNotice, ReplayCommand, ReplayDescriptor};

/// Failure text when keep-alive fires without configured credentials.
const NO_CREDENTIALS_TEXT: &str =
    "no credentials configured. Open the options page and fill in username and password";

/// User-facing status surface. Everything here is an additive DOM insertion
/// on the host side; nothing blocks the page's rendering thread.
pub trait StatusSink: Send + Sync + 'static {
    /// Non-blocking "reauthenticating" indicator.
    fn reauthenticating(&self);

    /// Failure overlay with actionable text and a manual route to the login
    /// page. No automatic retry follows it.
    fn reauth_failed(&self, message: &str);

    /// Transient "restored automatically" banner; the host clears it on a
    /// short timer or explicit dismissal.
    fn restored(&self);
}

/// Page navigation surface.
pub trait Navigator: Send + Sync + 'static {
    /// Full reload of the current page instance.
    fn reload(&self);
}

impl<T: StatusSink> StatusSink for std::sync::Arc<T> {
    fn reauthenticating(&self) {
        T::reauthenticating(self);
    }

    fn reauth_failed(&self, message: &str) {
        T::reauth_failed(self, message);
    }

    fn restored(&self) {
        T::restored(self);
    }
}

impl<T: Navigator> Navigator for std::sync::Arc<T> {
    fn reload(&self) {
        T::reload(self);
    }
}

/// The single-flight coordinator for expiry episodes.
///
/// Lives in the content task; notifications from the interception layer and
/// the DOM detector funnel into [`handle_expiry`](Self::handle_expiry)
/// through one channel, so the guard check is serialized with message
/// receipt; exactly one of two near-simultaneous notifications wins.
///
/// The guard is deliberately NOT released after a successful
/// reauthentication: the page reload that follows tears this machine down
/// with the rest of its session scope, and the next page instance starts
/// with a fresh one.
pub struct SessionMachine<F, R, S, N> {
    flags: F,
    replay_slot: R,
    status: S,
    navigator: N,
    privileged: PrivilegedHandle,
    replay_tx: UnboundedSender<ReplayCommand>,
    credentials: Option<Credentials>,
    keep_alive_enabled: bool,
    settle_delay: Duration,
    handling: bool,
}

impl<F, R, S, N> SessionMachine<F, R, S, N>
where
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
        replay_tx: UnboundedSender<ReplayCommand>,
    ) -> Self {
        Self {
            flags,
            replay_slot,
            status,
            navigator,
            privileged,
            replay_tx,
            credentials: config.credentials.clone(),
            keep_alive_enabled: config.keep_alive_enabled,
            settle_delay: config.settle_delay,
            handling: false,
        }
    }

    /// React to one expiry notification.
    pub async fn handle_expiry(&mut self, notice: ExpiryNotice) {
        if self.handling {
            tracing::debug!(source = %notice.source, "reauthentication already in flight");
            return;
        }

        match self.flags.manual_logout().await {
            Ok(true) => {
                // The user logged out on purpose; reauthenticating now would
                // undo that immediately.
                tracing::info!(source = %notice.source, "manual logout active, staying out");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                // Unreadable flag: assume the logout could be intentional.
                tracing::warn!(error = %e, "manual-logout flag unreadable, not reauthenticating");
                return;
            }
        }

        if !self.keep_alive_enabled {
            tracing::debug!(source = %notice.source, "keep-alive disabled, ignoring expiry");
            return;
        }

        let Some(credentials) = self.credentials.clone() else {
            // Configuration error: surfaced immediately, no network call.
            tracing::warn!(error = %Error::MissingCredentials, "cannot reauthenticate");
            self.status.reauth_failed(NO_CREDENTIALS_TEXT);
            return;
        };

        self.handling = true;
        tracing::info!(source = %notice.source, "session expired, reauthenticating");

        if let Some(raw) = notice.request_data {
            match ReplayDescriptor::try_from(raw) {
                Ok(descriptor) => {
                    if let Err(e) = self.replay_slot.stash(&descriptor).await {
                        // Reauthentication still proceeds; only the replay
                        // is lost.
                        tracing::warn!(error = %e, "could not persist replay descriptor");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "discarding malformed request context");
                }
            }
        }

        self.status.reauthenticating();
        let outcome = self.privileged.login(credentials).await;

        if outcome.success {
            if let Err(e) = self.flags.set_manual_logout(false).await {
                tracing::warn!(error = %e, "could not clear manual-logout flag");
            }
            tracing::info!("reauthenticated, reloading page");
            self.navigator.reload();
        } else {
            tracing::warn!(message = %outcome.message, "reauthentication failed");
            self.status.reauth_failed(&outcome.message);
            self.handling = false;
        }
    }

    /// The post-reload resume step. Consumes the descriptor before acting on
    /// it, so the replay happens at most once even if the replay itself
    /// fails, then waits out the settle delay and hands the request to the
    /// interception layer.
    pub async fn resume_after_reload(&mut self) {
        let descriptor = match self.replay_slot.consume().await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "replay slot unreadable");
                return;
            }
        };

        tracing::info!(url = %descriptor.url(), "resuming the interrupted request");
        tokio::time::sleep(self.settle_delay).await;
        let _ = self.replay_tx.send(ReplayCommand::new(descriptor));
        self.status.restored();
    }

    /// Positive proof of a live session: the client reached the
    /// authenticated landing page, so a past manual logout stops
    /// suppressing keep-alive.
    pub async fn observe_landing(&mut self) {
        if let Err(e) = self.flags.set_manual_logout(false).await {
            tracing::warn!(error = %e, "could not clear manual-logout flag");
        }
    }

    /// Drain expiry notifications until the scope is torn down.
    pub(crate) async fn run(mut self, mut rx: UnboundedReceiver<ExpiryNotice>) {
        while let Some(notice) = rx.recv().await {
            self.handle_expiry(notice).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::mpsc;

    use super::*;
    use crate::privileged::PrivilegedRequest;
    use crate::session::store::{MemoryFlags, MemoryReplaySlot};
    use crate::types::{CapturedRequest, ExpirySource, SessionOutcome};

    #[derive(Default)]
    struct RecordingSink {
        reauthenticating: AtomicUsize,
        failures: Mutex<Vec<String>>,
        restored: AtomicUsize,
    }

    impl StatusSink for RecordingSink {
        fn reauthenticating(&self) {
            self.reauthenticating.fetch_add(1, Ordering::SeqCst);
        }

        fn reauth_failed(&self, message: &str) {
            self.failures.lock().unwrap().push(message.into());
        }

        fn restored(&self) {
            self.restored.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        reloads: AtomicUsize,
    }

    impl Navigator for RecordingNavigator {
        fn reload(&self) {
            self.reloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        machine: SessionMachine<
            Arc<MemoryFlags>,
            Arc<MemoryReplaySlot>,
            Arc<RecordingSink>,
            Arc<RecordingNavigator>,
        >,
        flags: Arc<MemoryFlags>,
        slot: Arc<MemoryReplaySlot>,
        sink: Arc<RecordingSink>,
        navigator: Arc<RecordingNavigator>,
        logins: Arc<AtomicUsize>,
        replay_rx: mpsc::UnboundedReceiver<ReplayCommand>,
    }

    /// Machine wired to an executor stub that answers every login with the
    /// given outcome and counts invocations.
    fn harness(config: KeepAliveConfig, outcome: SessionOutcome) -> Harness {
        let (privileged, mut requests) = PrivilegedHandle::channel();
        let logins = Arc::new(AtomicUsize::new(0));
        let login_count = Arc::clone(&logins);
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                if let PrivilegedRequest::Login { reply, .. } = request {
                    login_count.fetch_add(1, Ordering::SeqCst);
                    let _ = reply.send(outcome.clone());
                }
            }
        });

        let flags = Arc::new(MemoryFlags::default());
        let slot = Arc::new(MemoryReplaySlot::default());
        let sink = Arc::new(RecordingSink::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let (replay_tx, replay_rx) = mpsc::unbounded_channel();

        let machine = SessionMachine::new(
            &config,
            Arc::clone(&flags),
            Arc::clone(&slot),
            Arc::clone(&sink),
            Arc::clone(&navigator),
            privileged,
            replay_tx,
        );

        Harness {
            machine,
            flags,
            slot,
            sink,
            navigator,
            logins,
            replay_rx,
        }
    }

    fn enabled_config() -> KeepAliveConfig {
        KeepAliveConfig::new("http://10.128.100.82/nsm_query/".parse().unwrap())
            .with_credentials(Credentials::new("user", "pw"))
            .with_keep_alive_enabled(true)
            .with_settle_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn success_clears_flag_and_reloads() {
        let mut h = harness(enabled_config(), SessionOutcome::ok("ok"));
        h.flags.set_manual_logout(true).await.unwrap();
        // A live-session observation cleared it beforehand.
        h.machine.observe_landing().await;

        h.machine
            .handle_expiry(ExpiryNotice::bare(ExpirySource::Alert))
            .await;

        assert_eq!(h.logins.load(Ordering::SeqCst), 1);
        assert_eq!(h.navigator.reloads.load(Ordering::SeqCst), 1);
        assert!(!h.flags.manual_logout().await.unwrap());
        assert!(h.sink.failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn success_clears_a_flag_raised_mid_authentication() {
        // A logout that lands while the executor is busy would otherwise
        // leave the flag set against a session we just re-established.
        let (privileged, mut requests) = PrivilegedHandle::channel();
        let flags = Arc::new(MemoryFlags::default());
        let executor_flags = Arc::clone(&flags);
        let logins = Arc::new(AtomicUsize::new(0));
        let login_count = Arc::clone(&logins);
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                if let PrivilegedRequest::Login { reply, .. } = request {
                    login_count.fetch_add(1, Ordering::SeqCst);
                    executor_flags.set_manual_logout(true).await.unwrap();
                    let _ = reply.send(SessionOutcome::ok("ok"));
                }
            }
        });

        let (replay_tx, _replay_rx) = mpsc::unbounded_channel();
        let mut machine = SessionMachine::new(
            &enabled_config(),
            Arc::clone(&flags),
            Arc::new(MemoryReplaySlot::default()),
            Arc::new(RecordingSink::default()),
            Arc::new(RecordingNavigator::default()),
            privileged,
            replay_tx,
        );

        machine
            .handle_expiry(ExpiryNotice::bare(ExpirySource::Alert))
            .await;

        assert_eq!(logins.load(Ordering::SeqCst), 1);
        assert!(!flags.manual_logout().await.unwrap());
    }

    #[tokio::test]
    async fn guard_holds_after_success_until_scope_death() {
        let mut h = harness(enabled_config(), SessionOutcome::ok("ok"));

        h.machine
            .handle_expiry(ExpiryNotice::bare(ExpirySource::Alert))
            .await;
        h.machine
            .handle_expiry(ExpiryNotice::bare(ExpirySource::Dom))
            .await;

        // The second notification lost against the in-flight guard.
        assert_eq!(h.logins.load(Ordering::SeqCst), 1);
        assert_eq!(h.navigator.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_releases_the_guard_and_shows_the_overlay() {
        let mut h = harness(enabled_config(), SessionOutcome::failed("bad password"));

        h.machine
            .handle_expiry(ExpiryNotice::bare(ExpirySource::Xhr))
            .await;

        assert_eq!(h.navigator.reloads.load(Ordering::SeqCst), 0);
        assert_eq!(h.sink.failures.lock().unwrap().as_slice(), ["bad password"]);

        // No automatic retry, but a later, genuinely new episode gets its
        // own attempt.
        h.machine
            .handle_expiry(ExpiryNotice::bare(ExpirySource::Xhr))
            .await;
        assert_eq!(h.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn manual_logout_blocks_reauthentication() {
        let mut h = harness(enabled_config(), SessionOutcome::ok("ok"));
        h.flags.set_manual_logout(true).await.unwrap();

        h.machine
            .handle_expiry(ExpiryNotice::bare(ExpirySource::Dom))
            .await;

        assert_eq!(h.logins.load(Ordering::SeqCst), 0);
        assert_eq!(h.sink.reauthenticating.load(Ordering::SeqCst), 0);
        assert!(h.sink.failures.lock().unwrap().is_empty());
        assert!(h.flags.manual_logout().await.unwrap());
    }

    #[tokio::test]
    async fn disabled_toggle_ignores_expiry() {
        let config = enabled_config().with_keep_alive_enabled(false);
        let mut h = harness(config, SessionOutcome::ok("ok"));

        h.machine
            .handle_expiry(ExpiryNotice::bare(ExpirySource::Alert))
            .await;
        assert_eq!(h.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_a_network_call() {
        let config =
            KeepAliveConfig::new("http://10.128.100.82/nsm_query/".parse().unwrap())
                .with_keep_alive_enabled(true);
        let mut h = harness(config, SessionOutcome::ok("ok"));

        h.machine
            .handle_expiry(ExpiryNotice::bare(ExpirySource::Alert))
            .await;

        assert_eq!(h.logins.load(Ordering::SeqCst), 0);
        assert_eq!(h.sink.failures.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn captured_request_is_persisted_for_replay() {
        let mut h = harness(enabled_config(), SessionOutcome::ok("ok"));
        let request = CapturedRequest::new("/Query.aspx", "POST", Some("id=5".into()));

        h.machine
            .handle_expiry(ExpiryNotice::with_request(ExpirySource::Xhr, &request))
            .await;

        let stashed = h.slot.consume().await.unwrap().unwrap();
        assert_eq!(stashed.url(), "/Query.aspx");
        assert_eq!(stashed.body(), Some("id=5"));
    }

    #[tokio::test]
    async fn malformed_request_context_is_discarded() {
        let mut h = harness(enabled_config(), SessionOutcome::ok("ok"));
        let notice = ExpiryNotice {
            source: ExpirySource::Xhr,
            request_data: Some(serde_json::json!(true)),
        };

        h.machine.handle_expiry(notice).await;

        // Reauthentication still ran; nothing was persisted.
        assert_eq!(h.logins.load(Ordering::SeqCst), 1);
        assert!(h.slot.consume().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resume_replays_once_and_shows_the_banner() {
        let mut h = harness(enabled_config(), SessionOutcome::ok("ok"));
        let descriptor = ReplayDescriptor::new("/Query.aspx", "POST", Some("a=1".into())).unwrap();
        h.slot.stash(&descriptor).await.unwrap();

        h.machine.resume_after_reload().await;

        let command = h.replay_rx.try_recv().unwrap();
        assert_eq!(command.payload, descriptor);
        assert_eq!(h.sink.restored.load(Ordering::SeqCst), 1);

        // The slot was consumed; a second resume is a no-op.
        h.machine.resume_after_reload().await;
        assert!(h.replay_rx.try_recv().is_err());
        assert_eq!(h.sink.restored.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resume_without_a_descriptor_stays_idle() {
        let mut h = harness(enabled_config(), SessionOutcome::ok("ok"));
        h.machine.resume_after_reload().await;

        assert!(h.replay_rx.try_recv().is_err());
        assert_eq!(h.sink.restored.load(Ordering::SeqCst), 0);
    }
}
