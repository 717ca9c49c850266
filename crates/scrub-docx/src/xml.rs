//! Indexed XML DOM for WordprocessingML parts.
//!
//! Nodes live in one flat vector per part and are addressed by [`NodeId`],
//! so blocks and plans can carry plain indices instead of borrowing the
//! document model. Parsing goes through quick-xml events; serialisation
//! re-emits the standard XML declaration and escapes through quick-xml's
//! escape table, so untouched markup round-trips.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use scrub_core::{NodeId, Result, ScrubError};

// ---------------------------------------------------------------------------
// XmlNode / XmlElement
// ---------------------------------------------------------------------------

/// An element with its qualified name (prefix kept, e.g. `w:p`), attributes
/// in source order, and ordered children.
#[derive(Debug, Clone)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

// ---------------------------------------------------------------------------
// XmlTree
// ---------------------------------------------------------------------------

/// One parsed XML part: a node arena plus parent links and the root id.
#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<XmlNode>,
    parents: Vec<Option<NodeId>>,
    root: NodeId,
}

impl XmlTree {
    /// Parse `content` into a tree. `part` names the archive entry for error
    /// reporting only.
    pub fn parse(content: &str, part: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;

        let mut nodes: Vec<XmlNode> = Vec::new();
        let mut parents: Vec<Option<NodeId>> = Vec::new();
        // Stack of open element ids.
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        let syntax = |message: String| ScrubError::InvalidDocument {
            part: part.to_string(),
            message,
        };

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = push_element(&mut nodes, &mut parents, &e, part, stack.last().copied())?;
                    attach(&mut nodes, &stack, id, &mut root, part)?;
                    stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    let id = push_element(&mut nodes, &mut parents, &e, part, stack.last().copied())?;
                    attach(&mut nodes, &stack, id, &mut root, part)?;
                }
                Ok(Event::End(_)) => {
                    if stack.pop().is_none() {
                        return Err(syntax("unexpected closing tag".to_string()));
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| syntax(format!("invalid text content: {err}")))?
                        .into_owned();
                    if let Some(&parent) = stack.last() {
                        let id = NodeId(nodes.len());
                        nodes.push(XmlNode::Text(text));
                        parents.push(Some(parent));
                        if let XmlNode::Element(el) = &mut nodes[parent.0] {
                            el.children.push(id);
                        }
                    }
                    // Top-level text (whitespace around the root) is dropped.
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    if let Some(&parent) = stack.last() {
                        let id = NodeId(nodes.len());
                        nodes.push(XmlNode::Text(text));
                        parents.push(Some(parent));
                        if let XmlNode::Element(el) = &mut nodes[parent.0] {
                            el.children.push(id);
                        }
                    }
                }
                Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(err) => return Err(syntax(err.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(syntax("unclosed element at end of input".to_string()));
        }
        let root = root.ok_or_else(|| syntax("document has no root element".to_string()))?;

        Ok(Self {
            nodes,
            parents,
            root,
        })
    }

    /// Serialise back to XML with the standard declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(self.nodes.len() * 16);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>");
        self.write_node(self.root, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0] {
            XmlNode::Text(text) => out.push_str(&escape(text.as_str())),
            XmlNode::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for (key, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape(value.as_str()));
                    out.push('"');
                }
                if el.children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in &el.children {
                        self.write_node(child, out);
                    }
                    out.push_str("</");
                    out.push_str(&el.name);
                    out.push('>');
                }
            }
        }
    }

    // -- navigation ---------------------------------------------------------

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &XmlNode {
        &self.nodes[id.0]
    }

    pub fn element(&self, id: NodeId) -> Option<&XmlElement> {
        match &self.nodes[id.0] {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents[id.0]
    }

    /// Local part of an element's qualified name (`w:tbl` → `tbl`).
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.element(id)
            .map(|el| el.name.rsplit(':').next().unwrap_or(&el.name))
    }

    /// True when `id` is an element whose local name is `local`.
    pub fn is_named(&self, id: NodeId, local: &str) -> bool {
        self.local_name(id) == Some(local)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.0] {
            XmlNode::Element(el) => &el.children,
            XmlNode::Text(_) => &[],
        }
    }

    /// Direct element children with the given local name, in order.
    pub fn child_elements_named(&self, id: NodeId, local: &str) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.is_named(c, local))
            .collect()
    }

    /// All descendants of `id` in document (pre-) order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut work: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = work.pop() {
            out.push(next);
            for &child in self.children(next).iter().rev() {
                work.push(child);
            }
        }
        out
    }

    /// Descendant elements named `local`, in document order.
    pub fn descendant_elements_named(&self, id: NodeId, local: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_named(n, local))
            .collect()
    }

    /// True when some ancestor of `id` (excluding `id`) is named `local`.
    pub fn has_ancestor_named(&self, id: NodeId, local: &str) -> bool {
        let mut cursor = self.parent(id);
        while let Some(node) = cursor {
            if self.is_named(node, local) {
                return true;
            }
            cursor = self.parent(node);
        }
        false
    }

    /// Nearest ancestor (excluding `id`) named `local`.
    pub fn ancestor_named(&self, id: NodeId, local: &str) -> Option<NodeId> {
        let mut cursor = self.parent(id);
        while let Some(node) = cursor {
            if self.is_named(node, local) {
                return Some(node);
            }
            cursor = self.parent(node);
        }
        None
    }

    /// Concatenated direct text children of an element (for `w:t` nodes).
    pub fn element_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            if let XmlNode::Text(t) = &self.nodes[child.0] {
                out.push_str(t);
            }
        }
        out
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        self.element(id)
            .and_then(|el| el.attrs.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.as_str())
    }

    // -- mutation -----------------------------------------------------------

    /// Replace the text content of an element with a single text node.
    ///
    /// For `w:t` elements, `xml:space="preserve"` is added when the new value
    /// has boundary whitespace, so word processors keep it on display.
    pub fn set_element_text(&mut self, id: NodeId, text: &str) {
        let text_id = NodeId(self.nodes.len());
        self.nodes.push(XmlNode::Text(text.to_string()));
        self.parents.push(Some(id));
        if let XmlNode::Element(el) = &mut self.nodes[id.0] {
            el.children = vec![text_id];
        }
        let needs_preserve = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
        if needs_preserve && self.is_named(id, "t") {
            self.set_attr(id, "xml:space", "preserve");
        }
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: &str) {
        if let XmlNode::Element(el) = &mut self.nodes[id.0] {
            if let Some(slot) = el.attrs.iter_mut().find(|(k, _)| k == key) {
                slot.1 = value.to_string();
            } else {
                el.attrs.push((key.to_string(), value.to_string()));
            }
        }
    }

    /// Create a new detached element; attach it with [`XmlTree::insert_child`].
    pub fn new_element(&mut self, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(XmlNode::Element(XmlElement {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }));
        self.parents.push(None);
        id
    }

    /// Insert `child` into `parent`'s child list at `index` (clamped).
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.parents[child.0] = Some(parent);
        if let XmlNode::Element(el) = &mut self.nodes[parent.0] {
            let at = index.min(el.children.len());
            el.children.insert(at, child);
        }
    }
}

fn push_element(
    nodes: &mut Vec<XmlNode>,
    parents: &mut Vec<Option<NodeId>>,
    e: &quick_xml::events::BytesStart<'_>,
    part: &str,
    parent: Option<NodeId>,
) -> Result<NodeId> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ScrubError::InvalidDocument {
            part: part.to_string(),
            message: format!("invalid attribute: {err}"),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| ScrubError::InvalidDocument {
                part: part.to_string(),
                message: format!("invalid attribute value: {err}"),
            })?
            .into_owned();
        attrs.push((key, value));
    }
    let id = NodeId(nodes.len());
    nodes.push(XmlNode::Element(XmlElement {
        name,
        attrs,
        children: Vec::new(),
    }));
    parents.push(parent);
    Ok(id)
}

fn attach(
    nodes: &mut [XmlNode],
    stack: &[NodeId],
    id: NodeId,
    root: &mut Option<NodeId>,
    part: &str,
) -> Result<()> {
    match stack.last() {
        Some(&parent) => {
            if let XmlNode::Element(el) = &mut nodes[parent.0] {
                el.children.push(id);
            }
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(ScrubError::InvalidDocument {
                    part: part.to_string(),
                    message: "multiple root elements".to_string(),
                });
            }
            *root = Some(id);
            Ok(())
        }
    }
}
