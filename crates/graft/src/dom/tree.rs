//! Arena-backed retained node tree.
//!
//! `Document` is the host-owned tree the fragment is grafted into. It is a
//! cheap-to-clone handle; all tree state lives behind a single lock, so a
//! reader can never observe a half-written text node.
//!
//! Mutations on *connected* nodes (reachable from the document root) emit
//! `MutationRecord`s to matching observers. Building a subtree detached is
//! silent; that is what makes "parse into a detached fragment, then graft
//! with one live write" observable as a single child-list mutation.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::observer::{MutationKind, MutationObserver, MutationRecord, ObserveOptions};

/// Handle to a node in a [`Document`].
///
/// Only meaningful for the document that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Tags that never carry children and serialize without a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub(crate) fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct ObserverEntry {
    root: NodeId,
    options: ObserveOptions,
    tx: mpsc::UnboundedSender<MutationRecord>,
}

struct DocumentInner {
    nodes: Vec<Node>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    observers: Vec<ObserverEntry>,
}

/// The host document tree.
#[derive(Clone)]
pub struct Document {
    inner: Arc<Mutex<DocumentInner>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document with an `html` root holding `head` and `body`.
    pub fn new() -> Self {
        let mut nodes = Vec::new();
        let root = push_element(&mut nodes, "html");
        let head = push_element(&mut nodes, "head");
        let body = push_element(&mut nodes, "body");
        nodes[head.0].parent = Some(root);
        nodes[body.0].parent = Some(root);
        nodes[root.0].children = vec![head, body];

        Self {
            inner: Arc::new(Mutex::new(DocumentInner {
                nodes,
                root,
                head,
                body,
                observers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DocumentInner> {
        // A panicked writer leaves the tree in a consistent-enough state for
        // logging and teardown; recover rather than cascade the panic.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn root(&self) -> NodeId {
        self.lock().root
    }

    pub fn head(&self) -> NodeId {
        self.lock().head
    }

    pub fn body(&self) -> NodeId {
        self.lock().body
    }

    /// Create a detached element. Tag names are normalized to lowercase.
    pub fn create_element(&self, tag: &str) -> NodeId {
        let mut inner = self.lock();
        push_element(&mut inner.nodes, tag)
    }

    /// Create a detached text node.
    pub fn create_text(&self, data: &str) -> NodeId {
        let mut inner = self.lock();
        let id = NodeId(inner.nodes.len());
        inner.nodes.push(Node {
            kind: NodeKind::Text(data.to_string()),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Append `child` (and its whole subtree) under `parent`.
    ///
    /// Detaches the child from any previous parent first. Emits a single
    /// child-list record on `parent` if `parent` is connected.
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut inner = self.lock();
        if let Some(old_parent) = inner.nodes[child.0].parent {
            inner.nodes[old_parent.0].children.retain(|c| *c != child);
        }
        inner.nodes[child.0].parent = Some(parent);
        inner.nodes[parent.0].children.push(child);

        if is_connected(&inner, parent) {
            emit(&mut inner, MutationRecord {
                kind: MutationKind::ChildList,
                target: parent,
            });
        }
    }

    /// Set (or replace) an attribute. Attribute names are stored lowercase.
    pub fn set_attribute(&self, id: NodeId, name: &str, value: &str) {
        let mut inner = self.lock();
        let name = name.to_ascii_lowercase();
        if let NodeKind::Element { attrs, .. } = &mut inner.nodes[id.0].kind {
            match attrs.iter_mut().find(|(n, _)| *n == name) {
                Some((_, v)) => *v = value.to_string(),
                None => attrs.push((name, value.to_string())),
            }
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        let inner = self.lock();
        let name = name.to_ascii_lowercase();
        match &inner.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<String> {
        let inner = self.lock();
        match &inner.nodes[id.0].kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.lock().nodes[id.0].children.clone()
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        let inner = self.lock();
        is_connected(&inner, id)
    }

    /// Replace the text under `id`.
    ///
    /// When the node already holds a single text child the text is rewritten
    /// in place and a character-data record is emitted; the node itself is
    /// not recreated. Otherwise existing children are dropped and a fresh text
    /// child is installed (a child-list mutation).
    pub fn set_text_content(&self, id: NodeId, text: &str) {
        let mut inner = self.lock();

        let single_text_child = match inner.nodes[id.0].children.as_slice() {
            &[only] if matches!(inner.nodes[only.0].kind, NodeKind::Text(_)) => Some(only),
            _ => None,
        };

        let kind = match single_text_child {
            Some(only) => {
                inner.nodes[only.0].kind = NodeKind::Text(text.to_string());
                MutationKind::CharacterData
            }
            None => {
                let old = std::mem::take(&mut inner.nodes[id.0].children);
                for child in old {
                    inner.nodes[child.0].parent = None;
                }
                let text_id = NodeId(inner.nodes.len());
                inner.nodes.push(Node {
                    kind: NodeKind::Text(text.to_string()),
                    parent: Some(id),
                    children: Vec::new(),
                });
                inner.nodes[id.0].children.push(text_id);
                MutationKind::ChildList
            }
        };

        if is_connected(&inner, id) {
            emit(&mut inner, MutationRecord { kind, target: id });
        }
    }

    /// Concatenated text of all text descendants (or the node's own data).
    pub fn text_content(&self, id: NodeId) -> String {
        let inner = self.lock();
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match &inner.nodes[current.0].kind {
                NodeKind::Text(data) => out.push_str(data),
                NodeKind::Element { .. } => {
                    for child in inner.nodes[current.0].children.iter().rev() {
                        stack.push(*child);
                    }
                }
            }
        }
        out
    }

    /// First connected element whose `id` attribute equals `value`.
    ///
    /// First match in document order wins; a colliding id elsewhere in the
    /// tree is never reached. This is the lookup `send`-side creation relies
    /// on being idempotent.
    pub fn element_by_id(&self, value: &str) -> Option<NodeId> {
        let inner = self.lock();
        let root = inner.root;
        find_by_id(&inner, root, value)
    }

    /// Like [`element_by_id`](Self::element_by_id) but scoped to a subtree.
    pub fn element_by_id_in(&self, scope: NodeId, value: &str) -> Option<NodeId> {
        let inner = self.lock();
        find_by_id(&inner, scope, value)
    }

    /// All elements with the given tag in a subtree, document order,
    /// including `scope` itself.
    pub fn elements_by_tag_in(&self, scope: NodeId, tag: &str) -> Vec<NodeId> {
        let inner = self.lock();
        let tag = tag.to_ascii_lowercase();
        let mut found = Vec::new();
        let mut stack = vec![scope];
        while let Some(current) = stack.pop() {
            if let NodeKind::Element { tag: t, .. } = &inner.nodes[current.0].kind
                && *t == tag
            {
                found.push(current);
            }
            for child in inner.nodes[current.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        found
    }

    /// Shallow clone of an element: same tag and attributes, no children.
    pub fn clone_element(&self, id: NodeId) -> NodeId {
        let mut inner = self.lock();
        let kind = match &inner.nodes[id.0].kind {
            NodeKind::Element { tag, attrs } => NodeKind::Element {
                tag: tag.clone(),
                attrs: attrs.clone(),
            },
            NodeKind::Text(data) => NodeKind::Text(data.clone()),
        };
        let clone = NodeId(inner.nodes.len());
        inner.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        clone
    }

    /// Subscribe to mutations under `root`.
    pub fn observe(&self, root: NodeId, options: ObserveOptions) -> MutationObserver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().observers.push(ObserverEntry { root, options, tx });
        MutationObserver::new(rx)
    }

    /// Serialize a subtree back to markup (mainly for diagnostics and tests).
    pub fn outer_html(&self, id: NodeId) -> String {
        let inner = self.lock();
        let mut out = String::new();
        write_html(&inner, id, &mut out);
        out
    }
}

fn push_element(nodes: &mut Vec<Node>, tag: &str) -> NodeId {
    let id = NodeId(nodes.len());
    nodes.push(Node {
        kind: NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        },
        parent: None,
        children: Vec::new(),
    });
    id
}

fn is_connected(inner: &DocumentInner, id: NodeId) -> bool {
    let mut current = id;
    loop {
        if current == inner.root {
            return true;
        }
        match inner.nodes[current.0].parent {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

fn is_ancestor_of(nodes: &[Node], ancestor: NodeId, node: NodeId) -> bool {
    let mut current = nodes[node.0].parent;
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = nodes[id.0].parent;
    }
    false
}

fn emit(inner: &mut DocumentInner, record: MutationRecord) {
    let DocumentInner {
        nodes, observers, ..
    } = inner;
    observers.retain(|entry| {
        if entry.tx.is_closed() {
            return false;
        }
        if entry.options.accepts(record.kind) {
            let in_scope = record.target == entry.root
                || (entry.options.subtree && is_ancestor_of(nodes, entry.root, record.target));
            if in_scope {
                let _ = entry.tx.send(record);
            }
        }
        true
    });
}

fn find_by_id(inner: &DocumentInner, scope: NodeId, value: &str) -> Option<NodeId> {
    let mut stack = vec![scope];
    while let Some(current) = stack.pop() {
        if let NodeKind::Element { attrs, .. } = &inner.nodes[current.0].kind
            && attrs.iter().any(|(n, v)| n == "id" && v == value)
        {
            return Some(current);
        }
        for child in inner.nodes[current.0].children.iter().rev() {
            stack.push(*child);
        }
    }
    None
}

fn write_html(inner: &DocumentInner, id: NodeId, out: &mut String) {
    match &inner.nodes[id.0].kind {
        NodeKind::Text(data) => out.push_str(data),
        NodeKind::Element { tag, attrs } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(value);
                out.push('"');
            }
            out.push('>');
            if is_void_tag(tag) {
                return;
            }
            for child in &inner.nodes[id.0].children {
                write_html(inner, *child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}
