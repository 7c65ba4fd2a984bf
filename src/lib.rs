#![doc = include_str!("../README.md")]

pub mod config;
pub mod cookies;
pub mod error;
pub mod login;
pub mod privileged;
pub mod session;
pub mod signature;
pub mod types;

// Re-exports for convenient access
pub use config::KeepAliveConfig;
pub use error::Error;
pub use login::LoginClient;
pub use privileged::{PrivilegedHandle, PrivilegedRequest, PrivilegedService};
pub use signature::ExpirySignatures;
pub use types::{
    CapturedRequest, Credentials, ExpiryNotice, ExpirySource, ReplayCommand, ReplayDescriptor,
    SessionOutcome,
};
