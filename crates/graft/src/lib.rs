//! graft: remote fragment composition for host documents.
//!
//! A host document loads a separately built remote fragment at runtime and
//! talks to it over a one-way, mutation-observed message channel instead of
//! function calls or shared globals:
//!
//! - [`loader`] fetches the fragment's document, rewrites its resource URLs to
//!   absolute form, and grafts markup, styles, and script into a mount point;
//! - [`channel`] posts JSON envelopes into a single hidden node under the
//!   mount, observed asynchronously by the fragment side;
//! - [`dom`] is the shared retained tree both of them operate on;
//! - [`service`] and [`transport`] expose the host's control surface.

pub mod channel;
pub mod dom;
pub mod loader;
mod markup;
pub mod rewrite;
pub mod service;
pub mod transport;

pub use channel::{Envelope, MESSAGE_NODE_ID, MessageSender, Subscription, subscribe};
pub use dom::{Document, MutationKind, MutationObserver, MutationRecord, NodeId, ObserveOptions};
pub use loader::{
    DEFAULT_MOUNT_ID, FragmentDescriptor, FragmentLoader, LoadError, LoadStatus, MountHandle,
    ScriptActivationHook,
};
pub use service::{HostService, StatusSnapshot};

/// graft version from Cargo.toml
pub const GRAFT_VERSION: &str = env!("CARGO_PKG_VERSION");
