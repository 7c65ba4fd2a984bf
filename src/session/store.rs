use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Error;
use crate::types::ReplayDescriptor;

/// Persisted session flags. This scope survives navigation and browser
/// restart (the host's persisted key-value storage).
///
/// Consumers back this with whatever the host offers; [`MemoryFlags`] is the
/// in-process implementation and the test double.
pub trait SessionFlags: Send + Sync + 'static {
    /// Read the manual-logout flag. While true, automatic reauthentication
    /// must not run: a user who logged out on purpose stays logged out.
    fn manual_logout(&self) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Toggle the manual-logout flag. The flag is never destroyed, only
    /// toggled; the first write creates it.
    fn set_manual_logout(&self, on: bool) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Navigation-scoped slot for the pending replay descriptor. This scope
/// survives a same-tab reload but not a new tab or a browser restart.
pub trait ReplaySlot: Send + Sync + 'static {
    /// Store the descriptor. Last write wins: at most one descriptor exists
    /// at a time, and a new detection overwrites the previous one.
    fn stash(&self, descriptor: &ReplayDescriptor)
    -> impl Future<Output = Result<(), Error>> + Send;

    /// Read and delete in one step. The delete happens before the caller can
    /// act on the value, so a failing replay still consumes its descriptor.
    fn consume(&self) -> impl Future<Output = Result<Option<ReplayDescriptor>, Error>> + Send;
}

impl<T: SessionFlags> SessionFlags for Arc<T> {
    fn manual_logout(&self) -> impl Future<Output = Result<bool, Error>> + Send {
        T::manual_logout(self)
    }

    fn set_manual_logout(&self, on: bool) -> impl Future<Output = Result<(), Error>> + Send {
        T::set_manual_logout(self, on)
    }
}

impl<T: ReplaySlot> ReplaySlot for Arc<T> {
    fn stash(
        &self,
        descriptor: &ReplayDescriptor,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        T::stash(self, descriptor)
    }

    fn consume(&self) -> impl Future<Output = Result<Option<ReplayDescriptor>, Error>> + Send {
        T::consume(self)
    }
}

/// In-memory [`SessionFlags`].
#[derive(Debug, Default)]
pub struct MemoryFlags {
    manual_logout: AtomicBool,
}

impl SessionFlags for MemoryFlags {
    async fn manual_logout(&self) -> Result<bool, Error> {
        Ok(self.manual_logout.load(Ordering::SeqCst))
    }

    async fn set_manual_logout(&self, on: bool) -> Result<(), Error> {
        self.manual_logout.store(on, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory [`ReplaySlot`]. Holds the descriptor in its persisted JSON form
/// so the round trip through storage is exercised even without a real
/// backend.
#[derive(Debug, Default)]
pub struct MemoryReplaySlot {
    slot: Mutex<Option<String>>,
}

impl ReplaySlot for MemoryReplaySlot {
    async fn stash(&self, descriptor: &ReplayDescriptor) -> Result<(), Error> {
        let json = serde_json::to_string(descriptor).map_err(|e| Error::Store(e.to_string()))?;
        *self.slot.lock().expect("slot lock") = Some(json);
        Ok(())
    }

    async fn consume(&self) -> Result<Option<ReplayDescriptor>, Error> {
        let Some(json) = self.slot.lock().expect("slot lock").take() else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(descriptor) => Ok(Some(descriptor)),
            Err(e) => {
                // A descriptor that no longer parses is worthless; dropping
                // it here keeps the replay step from choking after reload.
                tracing::warn!(error = %e, "discarding unreadable replay descriptor");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flag_defaults_to_false_and_toggles() {
        let flags = MemoryFlags::default();
        assert!(!flags.manual_logout().await.unwrap());
        flags.set_manual_logout(true).await.unwrap();
        assert!(flags.manual_logout().await.unwrap());
        flags.set_manual_logout(false).await.unwrap();
        assert!(!flags.manual_logout().await.unwrap());
    }

    #[tokio::test]
    async fn consume_reads_once_then_nothing() {
        let slot = MemoryReplaySlot::default();
        let descriptor = ReplayDescriptor::new("X", "POST", Some("a=1".into())).unwrap();
        slot.stash(&descriptor).await.unwrap();

        assert_eq!(slot.consume().await.unwrap(), Some(descriptor));
        assert_eq!(slot.consume().await.unwrap(), None);
    }

    #[tokio::test]
    async fn a_new_stash_overwrites_the_previous_one() {
        let slot = MemoryReplaySlot::default();
        let first = ReplayDescriptor::new("/first", "GET", None).unwrap();
        let second = ReplayDescriptor::new("/second", "POST", None).unwrap();
        slot.stash(&first).await.unwrap();
        slot.stash(&second).await.unwrap();

        assert_eq!(slot.consume().await.unwrap(), Some(second));
        assert_eq!(slot.consume().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_slot_consumes_to_none() {
        let slot = MemoryReplaySlot::default();
        assert_eq!(slot.consume().await.unwrap(), None);
    }
}
