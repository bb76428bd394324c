//! Remote fragment loader.
//!
//! Fetches a fragment's `index.html` from its own origin, rewrites resource
//! references against that origin, parses the result into a detached subtree,
//! and grafts it into the host document:
//!
//! 1. single GET of `{base_url}/index.html`, the only request the loader
//!    issues itself; stylesheet/script bodies are fetched by whatever consumes
//!    the grafted references;
//! 2. URL rewrite ([`crate::rewrite`]);
//! 3. detached parse ([`crate::markup`]), never straight into the live tree;
//! 4. same-origin stylesheet links cloned into the document head;
//! 5. one `append_child` under the mount point makes the markup live;
//! 6. the first script reference is re-created as a fresh node appended to the
//!    mount and the activation hook fires for it. Parsed-in script nodes are
//!    inert by construction; only this created node counts as executed.
//!
//! Failures are logged and terminal: no retry, no rollback of partial grafts.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::GRAFT_VERSION;
use crate::dom::{Document, NodeId};
use crate::{markup, rewrite};

/// Default `id` of the mount point element.
pub const DEFAULT_MOUNT_ID: &str = "remote-fragment-root";

/// Where a fragment and all of its resources are served from.
///
/// One base per fragment; every relative reference in the fragment's markup
/// resolves against it, with no per-resource override.
#[derive(Debug, Clone)]
pub struct FragmentDescriptor {
    base_url: String,
}

impl FragmentDescriptor {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn index_url(&self) -> String {
        format!("{}/index.html", self.base_url)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to fetch fragment document: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("fragment server returned status {status} for {url}")]
    Status { status: u16, url: String },
}

/// Outcome of the fire-and-forget load, published on a watch channel so
/// dependent UI (e.g. the send control) can gate on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Loading,
    Mounted,
    Failed,
}

impl LoadStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// Capability to address the mount point: the document plus the mount node.
///
/// Issued once by [`FragmentLoader::mount`] and passed explicitly to both
/// channel sides, instead of each side re-deriving the mount from a global
/// string id (which is where id-collision bugs live).
#[derive(Clone)]
pub struct MountHandle {
    document: Document,
    mount: NodeId,
}

impl MountHandle {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn mount(&self) -> NodeId {
        self.mount
    }
}

/// Invoked when the loader activates the fragment's script node.
///
/// This is where the embedder starts the fragment's runtime, typically a
/// [`crate::channel::subscribe`] call registering the fragment's observer.
/// Receives the mount handle and the script's resolved source URL.
pub type ScriptActivationHook = Arc<dyn Fn(&MountHandle, &str) + Send + Sync>;

pub struct FragmentLoader {
    descriptor: FragmentDescriptor,
    client: reqwest::Client,
    on_activate: Option<ScriptActivationHook>,
}

impl FragmentLoader {
    pub fn new(descriptor: FragmentDescriptor) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        let user_agent = format!("graftd/{}", GRAFT_VERSION);
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&user_agent) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            descriptor,
            client,
            on_activate: None,
        }
    }

    pub fn with_activation_hook(mut self, hook: ScriptActivationHook) -> Self {
        self.on_activate = Some(hook);
        self
    }

    pub fn descriptor(&self) -> &FragmentDescriptor {
        &self.descriptor
    }

    /// Resolve or create the mount point and wrap it in a handle.
    ///
    /// Reuses a pre-existing element carrying `mount_id` (first match wins),
    /// otherwise appends a fresh one under `body`. The mount lives for the
    /// document's lifetime; this runs synchronously before any fetch so a
    /// handle exists even while the load is still in flight.
    pub fn mount(&self, document: &Document, mount_id: &str) -> MountHandle {
        let mount = match document.element_by_id(mount_id) {
            Some(existing) => {
                tracing::debug!(mount_id, "Reusing pre-existing mount point");
                existing
            }
            None => {
                let node = document.create_element("div");
                document.set_attribute(node, "id", mount_id);
                document.append_child(document.body(), node);
                node
            }
        };
        MountHandle {
            document: document.clone(),
            mount,
        }
    }

    /// Fetch, rewrite, parse, and graft the fragment.
    pub async fn load(&self, handle: &MountHandle) -> Result<(), LoadError> {
        let url = self.descriptor.index_url();
        tracing::info!(%url, "Fetching remote fragment");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let body = response.text().await?;

        let rewritten = rewrite::rewrite_urls(&body, self.descriptor.base_url());
        let document = handle.document();
        let container = markup::parse_fragment(document, &rewritten);

        let promoted = self.promote_stylesheets(document, container);

        // The single live write: everything parsed above becomes visible at once
        document.append_child(handle.mount(), container);
        tracing::info!(stylesheets = promoted, "Fragment grafted under mount point");

        self.activate_script(handle, container);
        Ok(())
    }

    /// Clone same-origin stylesheet links into the document head.
    ///
    /// Stylesheets only take document-wide effect from the head; cloning
    /// rather than moving keeps the grafted markup intact.
    fn promote_stylesheets(&self, document: &Document, container: NodeId) -> usize {
        let mut promoted = 0;
        for link in document.elements_by_tag_in(container, "link") {
            let is_stylesheet = document
                .attribute(link, "rel")
                .is_some_and(|rel| rel.eq_ignore_ascii_case("stylesheet"));
            if !is_stylesheet {
                continue;
            }
            let Some(href) = document.attribute(link, "href") else {
                continue;
            };
            if !href.starts_with(self.descriptor.base_url()) {
                tracing::debug!(%href, "Skipping foreign stylesheet");
                continue;
            }
            let clone = document.clone_element(link);
            document.append_child(document.head(), clone);
            promoted += 1;
        }
        promoted
    }

    /// Re-create the fragment's first script reference as a live node.
    ///
    /// Only the first reference is activated; a fragment is assumed to ship a
    /// single bundled payload. Additional scripts are reported and skipped.
    fn activate_script(&self, handle: &MountHandle, container: NodeId) {
        let document = handle.document();
        let mut sources = document
            .elements_by_tag_in(container, "script")
            .into_iter()
            .filter_map(|script| document.attribute(script, "src"));

        let Some(src) = sources.next() else {
            tracing::warn!("Fragment contained no script reference; skipping activation");
            return;
        };
        let skipped = sources.count();
        if skipped > 0 {
            tracing::warn!(skipped, "Fragment listed multiple scripts; activating only the first");
        }

        let script = document.create_element("script");
        document.set_attribute(script, "src", &src);
        document.append_child(handle.mount(), script);
        tracing::info!(%src, "Activated fragment script");

        if let Some(hook) = &self.on_activate {
            hook(handle, &src);
        }
    }

    /// Fire-and-forget load: run in the background, publish the outcome.
    ///
    /// The host application continues regardless; a failed load just means no
    /// fragment observer ever registers and sends go unobserved.
    pub fn spawn(self: Arc<Self>, handle: MountHandle, status_tx: watch::Sender<LoadStatus>) {
        tokio::spawn(async move {
            let status = match self.load(&handle).await {
                Ok(()) => LoadStatus::Mounted,
                Err(e) => {
                    tracing::error!(error = %e, "Fragment load failed");
                    LoadStatus::Failed
                }
            };
            let _ = status_tx.send(status);
        });
    }
}
