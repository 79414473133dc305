//! Lexical-style rich-text tree model and immutable tree transforms.
//!
//! Nodes keep every attribute they were loaded with (formatting bits, indent,
//! version, link fields) so a tree written back to the store differs from the
//! one read only where a transform changed it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::LinkTarget;

/// `rel` value attached to sponsored links.
pub const SPONSORED_REL: &str = "nofollow sponsored";

/// Errors raised while reading a rich-text tree.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// The document has no rich-text field at all.
    #[error("document has no rich-text content")]
    MissingContent,
    /// The content object lacks a `root` node.
    #[error("rich-text content has no root node")]
    MissingRoot,
    /// A node could not be decoded.
    #[error("malformed rich-text tree: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Node type tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    /// Tree root.
    Root,
    /// Paragraph block.
    Paragraph,
    /// Heading block.
    Heading,
    /// Ordered or unordered list.
    List,
    /// List item.
    ListItem,
    /// Block quote.
    Quote,
    /// Table block.
    Table,
    /// Table row.
    TableRow,
    /// Table cell.
    TableCell,
    /// Text leaf.
    Text,
    /// Explicit link.
    Link,
    /// Auto-detected link.
    AutoLink,
    /// Hard line break.
    LineBreak,
    /// Any node type this crate does not interpret; treated as a block.
    Other(String),
}

impl NodeKind {
    /// Wire name of the node type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Root => "root",
            Self::Paragraph => "paragraph",
            Self::Heading => "heading",
            Self::List => "list",
            Self::ListItem => "listitem",
            Self::Quote => "quote",
            Self::Table => "table",
            Self::TableRow => "tablerow",
            Self::TableCell => "tablecell",
            Self::Text => "text",
            Self::Link => "link",
            Self::AutoLink => "autolink",
            Self::LineBreak => "linebreak",
            Self::Other(name) => name,
        }
    }

    /// Inline nodes live inside blocks and do not separate text.
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Self::Text | Self::Link | Self::AutoLink | Self::LineBreak
        )
    }

    /// Link-like node.
    pub fn is_link(&self) -> bool {
        matches!(self, Self::Link | Self::AutoLink)
    }
}

impl From<String> for NodeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "root" => Self::Root,
            "paragraph" => Self::Paragraph,
            "heading" => Self::Heading,
            "list" => Self::List,
            "listitem" => Self::ListItem,
            "quote" => Self::Quote,
            "table" => Self::Table,
            "tablerow" => Self::TableRow,
            "tablecell" => Self::TableCell,
            "text" => Self::Text,
            "link" => Self::Link,
            "autolink" => Self::AutoLink,
            "linebreak" => Self::LineBreak,
            _ => Self::Other(value),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Other(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node type.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Visible text (text leaves only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Child nodes, absent on leaves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
    /// Every other attribute, preserved verbatim.
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl Node {
    /// Plain text leaf with default formatting.
    pub fn text(text: impl Into<String>) -> Self {
        let mut attrs = Map::new();
        attrs.insert("detail".into(), Value::from(0));
        attrs.insert("format".into(), Value::from(0));
        attrs.insert("mode".into(), Value::from("normal"));
        attrs.insert("style".into(), Value::from(""));
        attrs.insert("version".into(), Value::from(1));
        Self::text_with_attrs(text, attrs)
    }

    /// Text leaf carrying the given formatting attributes.
    pub fn text_with_attrs(text: impl Into<String>, attrs: Map<String, Value>) -> Self {
        Self {
            kind: NodeKind::Text,
            text: Some(text.into()),
            children: None,
            attrs,
        }
    }

    /// Block node with the given children.
    pub fn block(kind: NodeKind, children: Vec<Node>) -> Self {
        let mut attrs = Map::new();
        attrs.insert("direction".into(), Value::from("ltr"));
        attrs.insert("format".into(), Value::from(""));
        attrs.insert("indent".into(), Value::from(0));
        attrs.insert("version".into(), Value::from(1));
        Self {
            kind,
            text: None,
            children: Some(children),
            attrs,
        }
    }

    /// Link node wrapping `child`.
    pub fn link(target: &LinkTarget, child: Node) -> Self {
        let mut fields = Map::new();
        fields.insert("linkType".into(), Value::from("custom"));
        fields.insert("url".into(), Value::from(target.url.clone()));
        fields.insert("newTab".into(), Value::from(target.new_tab));
        if target.sponsored {
            fields.insert("rel".into(), Value::from(SPONSORED_REL));
        }
        let mut attrs = Map::new();
        attrs.insert("direction".into(), Value::Null);
        attrs.insert("format".into(), Value::from(""));
        attrs.insert("indent".into(), Value::from(0));
        attrs.insert("version".into(), Value::from(2));
        attrs.insert("fields".into(), Value::Object(fields));
        Self {
            kind: NodeKind::Link,
            text: None,
            children: Some(vec![child]),
            attrs,
        }
    }

    /// Children, or an empty slice on leaves.
    pub fn children(&self) -> &[Node] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Text leaf check.
    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }

    /// Destination of a link node.
    pub fn link_url(&self) -> Option<&str> {
        if !self.kind.is_link() {
            return None;
        }
        self.attrs
            .get("fields")
            .and_then(|fields| fields.get("url"))
            .and_then(Value::as_str)
            .or_else(|| self.attrs.get("url").and_then(Value::as_str))
    }

    /// True for links marked `rel=sponsored`.
    pub fn is_sponsored_link(&self) -> bool {
        if !self.kind.is_link() {
            return false;
        }
        self.attrs
            .get("fields")
            .and_then(|fields| fields.get("rel"))
            .or_else(|| self.attrs.get("rel"))
            .and_then(Value::as_str)
            .map(|rel| rel.contains("sponsored"))
            .unwrap_or(false)
    }

    /// Concatenation of every text leaf below this node, in document order.
    pub fn visible_text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Rebuilds this node bottom-up.
    ///
    /// Each rebuilt child is handed to `f` together with its path in the
    /// original tree; `f` returns the nodes that take its place (an empty vec
    /// removes it). The receiver is never modified.
    pub fn rewrite<F>(&self, f: &mut F) -> Node
    where
        F: FnMut(&[usize], Node) -> Vec<Node>,
    {
        let mut path = Vec::new();
        rewrite_node(self, &mut path, f)
    }

    /// Copy of this node where runs of adjacent, identically formatted text
    /// leaves are merged into one leaf.
    pub fn merge_adjacent_text(&self) -> Node {
        let children = self.children.as_ref().map(|children| {
            let mut merged: Vec<Node> = Vec::with_capacity(children.len());
            for child in children {
                let child = child.merge_adjacent_text();
                if let Some(last) = merged.last_mut() {
                    if last.can_merge_with(&child) {
                        let tail = child.text.unwrap_or_default();
                        last.text.get_or_insert_with(String::new).push_str(&tail);
                        continue;
                    }
                }
                merged.push(child);
            }
            merged
        });
        Node {
            kind: self.kind.clone(),
            text: self.text.clone(),
            children,
            attrs: self.attrs.clone(),
        }
    }

    fn can_merge_with(&self, other: &Node) -> bool {
        self.is_text()
            && other.is_text()
            && self.children.is_none()
            && other.children.is_none()
            && self.attrs == other.attrs
    }
}

fn collect_text(node: &Node, out: &mut String) {
    if node.is_text() {
        if let Some(text) = &node.text {
            out.push_str(text);
        }
        return;
    }
    for child in node.children() {
        collect_text(child, out);
    }
}

fn rewrite_node<F>(node: &Node, path: &mut Vec<usize>, f: &mut F) -> Node
where
    F: FnMut(&[usize], Node) -> Vec<Node>,
{
    let children = node.children.as_ref().map(|children| {
        let mut out = Vec::with_capacity(children.len());
        for (idx, child) in children.iter().enumerate() {
            path.push(idx);
            let rebuilt = rewrite_node(child, path, &mut *f);
            out.extend(f(path.as_slice(), rebuilt));
            path.pop();
        }
        out
    });
    Node {
        kind: node.kind.clone(),
        text: node.text.clone(),
        children,
        attrs: node.attrs.clone(),
    }
}

/// An existing link found in a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    /// Link destination, when the node carries one.
    pub url: Option<String>,
    /// Visible anchor text.
    pub text: String,
    /// Sponsored flag.
    pub sponsored: bool,
}

/// Rich-text document body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    /// Root node.
    pub root: Node,
}

impl RichText {
    /// Wraps block nodes in a fresh root.
    pub fn from_blocks(blocks: Vec<Node>) -> Self {
        Self {
            root: Node::block(NodeKind::Root, blocks),
        }
    }

    /// Decodes a stored content value.
    pub fn from_value(value: &Value) -> Result<Self, TreeError> {
        let root = value.get("root").ok_or(TreeError::MissingRoot)?;
        if root.is_null() {
            return Err(TreeError::MissingRoot);
        }
        Ok(Self {
            root: serde_json::from_value(root.clone())?,
        })
    }

    /// Encodes the tree for the store.
    pub fn to_value(&self) -> Result<Value, TreeError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Plain text with block nodes separated by a single space.
    pub fn flatten(&self) -> String {
        let mut out = String::new();
        flatten_into(&self.root, &mut out, &mut false);
        out
    }

    /// Concatenated text leaves without any separators.
    pub fn visible_text(&self) -> String {
        self.root.visible_text()
    }

    /// Every link node in document order (nested links are not descended).
    pub fn links(&self) -> Vec<LinkRef> {
        let mut out = Vec::new();
        collect_links(&self.root, &mut out);
        out
    }

    /// Applies [`Node::rewrite`] to the root.
    pub fn rewrite<F>(&self, f: &mut F) -> RichText
    where
        F: FnMut(&[usize], Node) -> Vec<Node>,
    {
        RichText {
            root: self.root.rewrite(f),
        }
    }

    /// Applies [`Node::merge_adjacent_text`] to the root.
    pub fn merge_adjacent_text(&self) -> RichText {
        RichText {
            root: self.root.merge_adjacent_text(),
        }
    }
}

fn flatten_into(node: &Node, out: &mut String, at_boundary: &mut bool) {
    if node.is_text() {
        if let Some(text) = node.text.as_deref().filter(|text| !text.is_empty()) {
            if *at_boundary && !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            *at_boundary = false;
            out.push_str(text);
        }
        return;
    }
    let block = !node.kind.is_inline();
    if block {
        *at_boundary = true;
    }
    for child in node.children() {
        flatten_into(child, out, at_boundary);
    }
    if block {
        *at_boundary = true;
    }
}

fn collect_links(node: &Node, out: &mut Vec<LinkRef>) {
    if node.kind.is_link() {
        out.push(LinkRef {
            url: node.link_url().map(str::to_string),
            text: node.visible_text(),
            sponsored: node.is_sponsored_link(),
        });
        return;
    }
    for child in node.children() {
        collect_links(child, out);
    }
}
