//! Retained document tree with mutation observation.
//!
//! The host application owns a [`Document`]; the loader grafts fragment
//! markup into it and the message channel communicates through it. Observers
//! receive batched [`MutationRecord`]s asynchronously, which is the only
//! signaling primitive the channel relies on.

mod observer;
mod tree;

pub use observer::{MutationKind, MutationObserver, MutationRecord, ObserveOptions};
pub use tree::{Document, NodeId};

pub(crate) use tree::is_void_tag;
