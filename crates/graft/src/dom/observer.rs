//! Mutation observation primitives.
//!
//! Observers subscribe to a subtree of the document and receive
//! `MutationRecord`s in batches. Delivery is asynchronous: records queue on an
//! unbounded channel while the mutating call runs, and the observing task
//! drains everything available in one batch once it is polled. A callback is
//! therefore never invoked synchronously inside the mutating call, and two
//! writes in the same synchronous block coalesce into a single batch.

use tokio::sync::mpsc;

use super::tree::NodeId;

/// What changed on the target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// A child was appended to or removed from the target.
    ChildList,
    /// The text content under the target changed in place.
    CharacterData,
}

/// A single recorded mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
}

/// Which mutations an observer is interested in.
///
/// `subtree` widens the scope from the observed root alone to every
/// descendant. A channel receiver needs `child_list` (to see the message node
/// being created), `character_data` (to see it being rewritten in place), and
/// `subtree`; see [`ObserveOptions::all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub character_data: bool,
    pub subtree: bool,
}

impl ObserveOptions {
    /// Everything, everywhere under the root.
    pub fn all() -> Self {
        Self {
            child_list: true,
            character_data: true,
            subtree: true,
        }
    }

    pub(crate) fn accepts(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::CharacterData => self.character_data,
        }
    }
}

/// Receiving end of a mutation subscription.
///
/// Obtained from [`Document::observe`](super::Document::observe). The
/// registration lives until this observer is dropped; the document prunes
/// closed subscriptions lazily on the next mutation.
pub struct MutationObserver {
    rx: mpsc::UnboundedReceiver<MutationRecord>,
}

impl MutationObserver {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<MutationRecord>) -> Self {
        Self { rx }
    }

    /// Wait for the next batch of records.
    ///
    /// Returns every record queued since the last call, so mutations made in
    /// the same synchronous block arrive together. Returns `None` once the
    /// document side of the subscription is gone.
    pub async fn next_batch(&mut self) -> Option<Vec<MutationRecord>> {
        let first = self.rx.recv().await?;
        let mut batch = vec![first];
        while let Ok(record) = self.rx.try_recv() {
            batch.push(record);
        }
        Some(batch)
    }

    /// Drain whatever is queued right now without waiting.
    pub fn try_drain(&mut self) -> Vec<MutationRecord> {
        let mut batch = Vec::new();
        while let Ok(record) = self.rx.try_recv() {
            batch.push(record);
        }
        batch
    }
}
