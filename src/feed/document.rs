//! Navigable node tree for raw feed markup.
//!
//! The tree is built the way an HTML-style parser would build it rather than
//! a strict XML one: tag names are lower-cased, mismatched end tags are
//! tolerated, and `link` is a void element. That last rule matters for the
//! feeds we consume, where `<link>http://...</link>` yields an empty `link`
//! element followed by the URL as a sibling text node.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Maximum element nesting depth.
const MAX_DEPTH: usize = 256;

/// Elements that never have children.
const VOID_ELEMENTS: &[&str] = &["link"];

#[derive(Debug, Error)]
pub enum DocumentError {
    /// Markup could not be tokenized
    #[error("Malformed markup at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    /// SEC-003: Nesting exceeds safety limit
    #[error("Markup nesting depth exceeds maximum of {0} levels")]
    TooDeep(usize),
}

/// Index of a node inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
enum NodeKind {
    Element(String),
    Text(String),
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed document tree. Node 0 is a synthetic root.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_reader(bytes);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut doc = Document {
            nodes: vec![Node {
                kind: NodeKind::Element(String::from("#document")),
                parent: None,
                children: Vec::new(),
            }],
        };
        let mut open: Vec<NodeId> = vec![doc.root()];
        let mut buf = Vec::new();

        loop {
            let parent = *open.last().unwrap_or(&NodeId(0));
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let name = lower_name(e.name().as_ref());
                    let is_void = VOID_ELEMENTS.contains(&name.as_str());
                    let id = doc.push(parent, NodeKind::Element(name));
                    if !is_void {
                        if open.len() > MAX_DEPTH {
                            return Err(DocumentError::TooDeep(MAX_DEPTH));
                        }
                        open.push(id);
                    }
                }
                Ok(Event::Empty(e)) => {
                    let name = lower_name(e.name().as_ref());
                    doc.push(parent, NodeKind::Element(name));
                }
                Ok(Event::End(e)) => {
                    // Close up to the nearest open element with this name;
                    // a stray end tag (or a void one) is ignored.
                    let name = lower_name(e.name().as_ref());
                    if !VOID_ELEMENTS.contains(&name.as_str()) {
                        let pos = open
                            .iter()
                            .rposition(|id| doc.name(*id) == Some(name.as_str()));
                        if let Some(pos) = pos.filter(|p| *p > 0) {
                            open.truncate(pos);
                        }
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = match e.unescape() {
                        Ok(t) => t.into_owned(),
                        // Unknown entities (&nbsp; and friends) stay literal
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    doc.push_text(parent, text);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    doc.push_text(parent, text);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(DocumentError::Malformed {
                        position: reader.error_position(),
                        message: e.to_string(),
                    })
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(doc)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Every `item` element in document order.
    pub fn items(&self) -> Vec<NodeId> {
        self.find_all(self.root(), "item")
    }

    /// Lower-cased tag name, `None` for text nodes.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(name) => Some(name),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Text(_))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// The node right after `id` under the same parent.
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes[id.0].parent?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|s| *s == id)?;
        siblings.get(pos + 1).copied()
    }

    /// First descendant element of `id` named `tag`, in document order.
    pub fn find_first(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        self.descendants(id).find(|n| self.name(*n) == Some(tag))
    }

    /// All descendant elements of `id` named `tag`, in document order.
    pub fn find_all(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(id)
            .filter(|n| self.name(*n) == Some(tag))
            .collect()
    }

    /// Concatenated text of a node and everything beneath it.
    pub fn text(&self, id: NodeId) -> String {
        if let NodeKind::Text(text) = &self.nodes[id.0].kind {
            return text.clone();
        }
        let mut out = String::new();
        for n in self.descendants(id) {
            if let NodeKind::Text(text) = &self.nodes[n.0].kind {
                out.push_str(text);
            }
        }
        out
    }

    /// Pre-order walk below `id` (excluding `id`), without recursion.
    fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(self.children(next).iter().rev().copied());
            Some(next)
        })
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Append text, merging with an immediately preceding text node.
    fn push_text(&mut self, parent: NodeId, text: String) {
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(&text);
                return;
            }
        }
        self.push(parent, NodeKind::Text(text));
    }
}

fn lower_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_lowercase()
}
