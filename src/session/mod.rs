//! The session continuity engine.
//!
//! One [`SessionScope`] per page instance wires the three pieces together:
//! the [`Interceptor`] observing the page's primitives, the
//! [`SessionMachine`] coordinating single-flight reauthentication, and the
//! replay path that reissues the interrupted request after a reload.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use mes_keepalive::session::{MemoryFlags, MemoryReplaySlot, PageView, SessionScope};
//!
//! // 1. Implement PageHooks, StatusSink and Navigator for your host
//! // 2. Start the privileged service and keep its handle
//! let mut scope = SessionScope::new(
//!     &config, flags, replay_slot, status, navigator, privileged, hooks,
//! );
//!
//! // 3. On document-interactive, run the page-load sequence
//! scope.start(&PageView { on_landing_page, text, markup }).await;
//!
//! // 4. Route the page's alert/network callbacks into scope.interceptor()
//! ```

mod detect;
mod intercept;
mod machine;
mod scope;
mod store;

pub use detect::{document_expired, is_logout_link};
pub use intercept::{Interceptor, PageHooks, Transport};
pub use machine::{Navigator, SessionMachine, StatusSink};
pub use scope::{PageView, SessionScope};
pub use store::{MemoryFlags, MemoryReplaySlot, ReplaySlot, SessionFlags};
