//! Element tree with attribute bags, addressed by child-index paths.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Ordered attribute map of one element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeBag(BTreeMap<String, String>);

impl AttributeBag {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Set an attribute, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether the space-separated `class` attribute contains `class`.
    pub fn has_class(&self, class: &str) -> bool {
        self.get("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let joined = match self.get("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set("class", joined);
    }

    pub fn remove_class(&mut self, class: &str) {
        let Some(existing) = self.get("class") else {
            return;
        };
        let kept: Vec<&str> = existing.split_whitespace().filter(|c| *c != class).collect();
        if kept.is_empty() {
            self.remove("class");
        } else {
            let joined = kept.join(" ");
            self.set("class", joined);
        }
    }
}

/// One node of the document tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,

    #[serde(default, skip_serializing_if = "AttributeBag::is_empty")]
    pub attrs: AttributeBag,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: AttributeBag::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.set(name, value);
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.attrs.add_class(class);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attrs.has_class(class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name)
    }
}

/// Position of an element: child indices from the root.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_indices(indices: impl Into<Vec<usize>>) -> Self {
        Self(indices.into())
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn last_index(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePath({self})")
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for index in &self.0 {
            write!(f, "/{index}")?;
        }
        Ok(())
    }
}

/// A whole review document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub root: Element,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    pub fn get(&self, path: &NodePath) -> Option<&Element> {
        let mut node = &self.root;
        for &index in path.indices() {
            node = node.children.get(index)?;
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &NodePath) -> Option<&mut Element> {
        let mut node = &mut self.root;
        for &index in path.indices() {
            node = node.children.get_mut(index)?;
        }
        Some(node)
    }

    /// Like `get`, with a `NodeNotFound` error for a dangling path.
    pub fn require(&self, path: &NodePath) -> Result<&Element> {
        self.get(path)
            .ok_or_else(|| StoreError::NodeNotFound(path.to_string()))
    }

    pub fn require_mut(&mut self, path: &NodePath) -> Result<&mut Element> {
        self.get_mut(path)
            .ok_or_else(|| StoreError::NodeNotFound(path.to_string()))
    }

    /// All elements in document (pre-)order, root included.
    pub fn walk(&self) -> Vec<(NodePath, &Element)> {
        let mut out = Vec::new();
        Self::walk_into(&self.root, NodePath::root(), &mut out);
        out
    }

    /// Elements strictly below `path`, in document order.
    pub fn descendants(&self, path: &NodePath) -> Vec<(NodePath, &Element)> {
        let Some(start) = self.get(path) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (i, child) in start.children.iter().enumerate() {
            Self::walk_into(child, path.child(i), &mut out);
        }
        out
    }

    fn walk_into<'a>(node: &'a Element, path: NodePath, out: &mut Vec<(NodePath, &'a Element)>) {
        let mut stack = vec![(path, node)];
        while let Some((path, node)) = stack.pop() {
            for (i, child) in node.children.iter().enumerate().rev() {
                stack.push((path.child(i), child));
            }
            out.push((path, node));
        }
    }

    /// Nearest element at or above `path` matching `pred`.
    pub fn closest(&self, path: &NodePath, pred: impl Fn(&Element) -> bool) -> Option<NodePath> {
        let mut current = Some(path.clone());
        while let Some(p) = current {
            if let Some(element) = self.get(&p) {
                if pred(element) {
                    return Some(p);
                }
            }
            current = p.parent();
        }
        None
    }

    /// Every element matching `pred`, in document order.
    pub fn find_all(&self, pred: impl Fn(&Element) -> bool) -> Vec<NodePath> {
        self.walk()
            .into_iter()
            .filter(|(_, element)| pred(element))
            .map(|(path, _)| path)
            .collect()
    }

    /// Append `element` as the last child of `parent`.
    pub fn insert_child(&mut self, parent: &NodePath, element: Element) -> Result<NodePath> {
        let node = self.require_mut(parent)?;
        node.children.push(element);
        Ok(parent.child(node.children.len() - 1))
    }

    /// Detach the element at `path`. Paths of later siblings shift down.
    pub fn remove(&mut self, path: &NodePath) -> Result<Element> {
        let (Some(parent), Some(index)) = (path.parent(), path.last_index()) else {
            return Err(StoreError::InvalidOperation(
                "cannot remove the document root".into(),
            ));
        };
        let node = self.require_mut(&parent)?;
        if index >= node.children.len() {
            return Err(StoreError::NodeNotFound(path.to_string()));
        }
        Ok(node.children.remove(index))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a document file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Write the document atomically (temp file, fsync, rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let json = self.to_json()?;
        let tmp = temp_sibling(path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Document {
        Document::new(
            Element::new("body").with_children([
                Element::new("section")
                    .with_class("a")
                    .with_child(Element::new("p").with_text("one"))
                    .with_child(Element::new("p").with_text("two")),
                Element::new("section").with_class("b"),
            ]),
        )
    }

    #[test]
    fn test_walk_is_document_order() {
        let doc = sample();
        let paths: Vec<String> = doc.walk().iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(paths, vec!["/", "/0", "/0/0", "/0/1", "/1"]);
    }

    #[test]
    fn test_closest_includes_self() {
        let doc = sample();
        let p = NodePath::from_indices([0, 1]);
        assert_eq!(doc.closest(&p, |e| e.tag == "p"), Some(p.clone()));
        assert_eq!(
            doc.closest(&p, |e| e.has_class("a")),
            Some(NodePath::from_indices([0]))
        );
        assert_eq!(doc.closest(&p, |e| e.has_class("b")), None);
    }

    #[test]
    fn test_remove_shifts_siblings() {
        let mut doc = sample();
        let removed = doc.remove(&NodePath::from_indices([0, 0])).unwrap();
        assert_eq!(removed.text.as_deref(), Some("one"));
        let shifted = doc.get(&NodePath::from_indices([0, 0])).unwrap();
        assert_eq!(shifted.text.as_deref(), Some("two"));
        assert!(doc.remove(&NodePath::root()).is_err());
    }

    #[test]
    fn test_class_helpers() {
        let mut attrs = AttributeBag::new();
        attrs.add_class("tab");
        attrs.add_class("active");
        attrs.add_class("active");
        assert_eq!(attrs.get("class"), Some("tab active"));
        attrs.remove_class("tab");
        assert!(attrs.has_class("active"));
        assert!(!attrs.has_class("tab"));
        attrs.remove_class("active");
        assert!(!attrs.has("class"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("review.json");
        let doc = sample();
        doc.save(&path).unwrap();
        assert_eq!(Document::load(&path).unwrap(), doc);
    }
}
