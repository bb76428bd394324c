//! HostService: transport-agnostic host-side state.
//!
//! Owns the mount handle, the channel sender, the load-status receiver, and
//! shutdown coordination. Transports (HTTP today) delegate here; nothing in
//! this module knows about axum.

use tokio::sync::watch;

use crate::GRAFT_VERSION;
use crate::channel::MessageSender;
use crate::loader::{LoadStatus, MountHandle};

/// Point-in-time view of the host for transports to report.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub status: LoadStatus,
    pub version: &'static str,
}

impl StatusSnapshot {
    pub fn is_mounted(&self) -> bool {
        self.status == LoadStatus::Mounted
    }
}

pub struct HostService {
    handle: MountHandle,
    sender: MessageSender,
    status_rx: watch::Receiver<LoadStatus>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl HostService {
    pub fn new(handle: MountHandle, status_rx: watch::Receiver<LoadStatus>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            sender: MessageSender::new(handle.clone()),
            handle,
            status_rx,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Post a message to the fragment. Best-effort: a send while the fragment
    /// is not mounted (or its observer not registered) is lost silently.
    pub fn send(&self, message: &str) {
        let status = *self.status_rx.borrow();
        if !status.is_terminal() {
            tracing::debug!(?status, "Sending while fragment load is in flight; message may be lost");
        } else if status != LoadStatus::Mounted {
            tracing::debug!(?status, "Sending after failed load; message will not be observed");
        }
        self.sender.send(message);
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: *self.status_rx.borrow(),
            version: GRAFT_VERSION,
        }
    }

    pub fn handle(&self) -> &MountHandle {
        &self.handle
    }

    /// Request graceful shutdown of the transport.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MESSAGE_NODE_ID;
    use crate::dom::Document;
    use crate::loader::{DEFAULT_MOUNT_ID, FragmentDescriptor, FragmentLoader};

    fn test_service(status: LoadStatus) -> (Document, HostService) {
        let document = Document::new();
        let loader = FragmentLoader::new(FragmentDescriptor::new("http://localhost:5003"));
        let handle = loader.mount(&document, DEFAULT_MOUNT_ID);
        let (_tx, rx) = watch::channel(status);
        (document, HostService::new(handle, rx))
    }

    #[tokio::test]
    async fn send_before_mount_does_not_panic() {
        let (document, service) = test_service(LoadStatus::Loading);
        service.send("early");

        // The write happened, it is just unobserved
        let node = document.element_by_id(MESSAGE_NODE_ID).unwrap();
        assert!(document.text_content(node).contains("early"));
    }

    #[tokio::test]
    async fn send_after_failed_load_still_writes() {
        let (document, service) = test_service(LoadStatus::Failed);
        service.send("into the void");

        let node = document.element_by_id(MESSAGE_NODE_ID).unwrap();
        assert!(document.text_content(node).contains("into the void"));
    }

    #[tokio::test]
    async fn status_reflects_watch_channel() {
        let (_document, service) = test_service(LoadStatus::Mounted);
        assert!(service.status().is_mounted());
        assert_eq!(service.status().version, GRAFT_VERSION);
    }

    #[tokio::test]
    async fn shutdown_flips_the_watch() {
        let (_document, service) = test_service(LoadStatus::Mounted);
        let mut rx = service.shutdown_rx();
        assert!(!*rx.borrow());
        service.shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
