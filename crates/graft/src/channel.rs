//! Mutation-based message channel between host and mounted fragment.
//!
//! A one-slot mailbox: the host serializes an [`Envelope`] into the text of a
//! single hidden message node under the mount point, and the fragment side
//! observes the mount subtree for changes. No queue, no acknowledgment, no
//! ordering beyond last-write-wins: two sends in the same synchronous block
//! are observed once, after both writes.
//!
//! Both sides address the tree through a [`MountHandle`] issued by the
//! loader, not by re-deriving identity from global string ids; the message
//! node id below only exists so the receiver can re-locate the node inside
//! the mount subtree after arbitrary mutations.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::dom::ObserveOptions;
use crate::loader::MountHandle;

/// `id` attribute of the message node, unique within the mount subtree.
pub const MESSAGE_NODE_ID: &str = "host-message";

/// The wire format carried by the channel.
///
/// Extra keys round-trip through `extra`; receivers must ignore keys they do
/// not understand, so adding fields is always compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// RFC 3339 timestamp taken when the envelope was built.
    pub time: String,
    pub message: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Envelope {
    /// Envelope stamped with the current time.
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            time: Utc::now().to_rfc3339(),
            message: message.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Host-side sender.
///
/// `send` is synchronous and infallible from the caller's point of view:
/// there is no delivery confirmation, and a send while no fragment observer
/// exists is silently lost, never queued.
#[derive(Clone)]
pub struct MessageSender {
    handle: MountHandle,
}

impl MessageSender {
    pub fn new(handle: MountHandle) -> Self {
        Self { handle }
    }

    /// Post `message` wrapped in a freshly stamped envelope.
    pub fn send(&self, message: &str) {
        self.post(&Envelope::now(message));
    }

    /// Post a prebuilt envelope.
    ///
    /// Looks up the message node inside the mount subtree, creating it on
    /// first use (a hidden element; that creation is itself an observable
    /// mutation). Every later call only rewrites the node's text in place.
    pub fn post(&self, envelope: &Envelope) {
        let json = match serde_json::to_string(envelope) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message envelope");
                return;
            }
        };

        let document = self.handle.document();
        let node = match document.element_by_id_in(self.handle.mount(), MESSAGE_NODE_ID) {
            Some(node) => node,
            None => {
                let node = document.create_element("div");
                document.set_attribute(node, "id", MESSAGE_NODE_ID);
                document.set_attribute(node, "style", "display:none");
                document.append_child(self.handle.mount(), node);
                node
            }
        };
        document.set_text_content(node, &json);
    }
}

/// A live fragment-side subscription. Dropping it stops observation;
/// [`detach`](Subscription::detach) lets it run for the document's lifetime.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Let the observer task run unsupervised until the process exits.
    pub fn detach(mut self) {
        self.task.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Fragment-side receiver: invoke `on_message` for every observed envelope.
///
/// Subscribes to child-list and character-data mutations in the whole mount
/// subtree. On each delivered batch the message node is re-located by id (it
/// may not have existed at subscription time) and its current text parsed:
///
/// - no message node, or one not yet filled in → the batch is ignored
///   (unrelated mutations such as the loader's graft land here too);
/// - malformed JSON → logged and skipped, the subscription stays live;
/// - otherwise `on_message` fires, possibly again with an identical payload
///   when unrelated mutations re-trigger delivery, so consumers must be
///   idempotent.
pub fn subscribe<F>(handle: &MountHandle, on_message: F) -> Subscription
where
    F: Fn(Envelope) + Send + 'static,
{
    let document = handle.document().clone();
    let mount = handle.mount();
    let mut observer = document.observe(mount, ObserveOptions::all());

    let task = tokio::spawn(async move {
        while observer.next_batch().await.is_some() {
            let Some(node) = document.element_by_id_in(mount, MESSAGE_NODE_ID) else {
                continue;
            };
            let text = document.text_content(node);
            if text.trim().is_empty() {
                // Node created but not yet written
                continue;
            }
            match serde_json::from_str::<Envelope>(&text) {
                Ok(envelope) => on_message(envelope),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed message payload");
                }
            }
        }
        tracing::debug!("Message subscription ended");
    });

    Subscription { task: Some(task) }
}
