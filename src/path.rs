//! Path conventions and the flattened directory tree
//!
//! A remote shell may use a different path convention from the machine the
//! engine runs on, so path handling is selected by [`PathKind`] instead of
//! `std::path`. [`FlattenedPathTree`] keeps a lazily expanded directory tree
//! as a flat, render-ready list.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Path convention of the shell's host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    #[default]
    Posix,
    Win32,
}

impl PathKind {
    /// Convention of the machine running the engine
    pub fn native() -> Self {
        if cfg!(windows) {
            PathKind::Win32
        } else {
            PathKind::Posix
        }
    }

    /// Preferred separator
    pub fn separator(&self) -> char {
        match self {
            PathKind::Posix => '/',
            PathKind::Win32 => '\\',
        }
    }

    pub fn is_separator(&self, c: char) -> bool {
        match self {
            PathKind::Posix => c == '/',
            PathKind::Win32 => c == '\\' || c == '/',
        }
    }

    pub fn is_absolute(&self, path: &str) -> bool {
        match self {
            PathKind::Posix => path.starts_with('/'),
            PathKind::Win32 => {
                let mut chars = path.chars();
                match (chars.next(), chars.next(), chars.next()) {
                    (Some(c), _, _) if self.is_separator(c) => true,
                    (Some(d), Some(':'), Some(s)) => d.is_ascii_alphabetic() && self.is_separator(s),
                    _ => false,
                }
            }
        }
    }

    /// Append `child` to `base`; an absolute `child` replaces `base`
    pub fn join(&self, base: &str, child: &str) -> String {
        if child.is_empty() {
            return base.to_string();
        }
        if base.is_empty() || self.is_absolute(child) {
            return child.to_string();
        }
        if base.ends_with(|c| self.is_separator(c)) {
            format!("{}{}", base, child)
        } else {
            format!("{}{}{}", base, self.separator(), child)
        }
    }

    /// Normalized components; an absolute path starts with its root
    /// (`/`, `C:\`, `\`)
    pub fn split(&self, path: &str) -> Vec<String> {
        let normalized = self.normalize(path);
        let (root, rest) = normalized.split_at(self.root_len(&normalized));
        let mut parts = Vec::new();
        if !root.is_empty() {
            parts.push(root.to_string());
        }
        parts.extend(
            rest.split(self.separator())
                .filter(|s| !s.is_empty() && *s != ".")
                .map(str::to_string),
        );
        parts
    }

    /// Containing directory; `None` for roots and single relative names
    pub fn parent(&self, path: &str) -> Option<String> {
        let normalized = self.normalize(path);
        let (root, rest) = normalized.split_at(self.root_len(&normalized));
        match rest.rfind(self.separator()) {
            Some(i) => Some(format!("{}{}", root, &rest[..i])),
            None if !root.is_empty() && !rest.is_empty() => Some(root.to_string()),
            None => None,
        }
    }

    /// Last component
    pub fn file_name(&self, path: &str) -> Option<String> {
        let normalized = self.normalize(path);
        let rest = &normalized[self.root_len(&normalized)..];
        rest.rsplit(self.separator())
            .next()
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .map(str::to_string)
    }

    /// Collapse separators, resolve `.` and `..` lexically and use the
    /// preferred separator. `..` above an absolute root is dropped.
    pub fn normalize(&self, path: &str) -> String {
        let root_len = self.root_len(path);
        let absolute = self.is_absolute(path);
        let root: String = path[..root_len]
            .chars()
            .map(|c| {
                if self.is_separator(c) {
                    self.separator()
                } else {
                    c
                }
            })
            .collect();

        let mut parts: Vec<&str> = Vec::new();
        for segment in path[root_len..].split(|c| self.is_separator(c)) {
            match segment {
                "" | "." => {}
                ".." => {
                    if parts.last().is_some_and(|p| *p != "..") {
                        parts.pop();
                    } else if !absolute {
                        parts.push("..");
                    }
                }
                s => parts.push(s),
            }
        }

        let body = parts.join(&self.separator().to_string());
        if root.is_empty() && body.is_empty() {
            ".".to_string()
        } else {
            format!("{}{}", root, body)
        }
    }

    /// Byte length of the root prefix (`/`, `C:\`, `C:`, `\\`, `\`)
    fn root_len(&self, path: &str) -> usize {
        match self {
            PathKind::Posix => usize::from(path.starts_with('/')),
            PathKind::Win32 => {
                let bytes = path.as_bytes();
                let sep = |i: usize| bytes.get(i).is_some_and(|b| *b == b'\\' || *b == b'/');
                if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
                    if sep(2) {
                        3
                    } else {
                        2
                    }
                } else if sep(0) && sep(1) {
                    2
                } else if sep(0) {
                    1
                } else {
                    0
                }
            }
        }
    }
}

/// One visible row of a flattened tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatPathNode {
    pub path: String,
    pub is_expanded: bool,
    /// Visible descendants below this node
    pub num_expanded_children: usize,
    /// Visible direct children
    pub num_expanded_direct_children: usize,
    pub depth: usize,
    pub parent: Option<String>,
}

impl FlatPathNode {
    fn new(path: String, depth: usize, parent: Option<String>) -> Self {
        Self {
            path,
            is_expanded: false,
            num_expanded_children: 0,
            num_expanded_direct_children: 0,
            depth,
            parent,
        }
    }
}

/// Lazily expanded directory tree kept as a flat list in display order.
///
/// A node's visible descendants are the `num_expanded_children` rows right
/// after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenedPathTree {
    kind: PathKind,
    nodes: Vec<FlatPathNode>,
}

impl FlattenedPathTree {
    /// Tree showing only `roots`, all collapsed
    pub fn new(kind: PathKind, roots: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind,
            nodes: roots
                .into_iter()
                .map(|root| FlatPathNode::new(root.into(), 0, None))
                .collect(),
        }
    }

    pub fn kind(&self) -> PathKind {
        self.kind
    }

    /// Visible rows in display order
    pub fn nodes(&self) -> &[FlatPathNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&FlatPathNode> {
        self.nodes.iter().find(|node| node.path == path)
    }

    fn index_of(&self, path: &str) -> Result<usize> {
        self.nodes
            .iter()
            .position(|node| node.path == path)
            .ok_or_else(|| Error::PathNotFound {
                path: path.to_string(),
            })
    }

    /// Show `children` (names or paths) under `path`. Expanding an expanded
    /// node replaces its children.
    pub fn expand<I, S>(&mut self, path: &str, children: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let index = self.index_of(path)?;
        self.collapse_at(index);

        let depth = self.nodes[index].depth + 1;
        let parent_path = self.nodes[index].path.clone();
        let new_nodes: Vec<FlatPathNode> = children
            .into_iter()
            .map(|child| {
                FlatPathNode::new(
                    self.kind.join(&parent_path, child.as_ref()),
                    depth,
                    Some(parent_path.clone()),
                )
            })
            .collect();
        let added = new_nodes.len();
        self.nodes.splice(index + 1..index + 1, new_nodes);

        let node = &mut self.nodes[index];
        node.is_expanded = true;
        node.num_expanded_children = added;
        node.num_expanded_direct_children = added;
        self.adjust_ancestors(index, added as isize);
        trace!("Expanded {} with {} children", parent_path, added);
        Ok(())
    }

    /// Hide everything below `path`
    pub fn collapse(&mut self, path: &str) -> Result<()> {
        let index = self.index_of(path)?;
        self.collapse_at(index);
        Ok(())
    }

    /// Collapse an expanded node or expand a collapsed one; returns the new
    /// expansion state
    pub fn toggle<I, S>(&mut self, path: &str, children: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let index = self.index_of(path)?;
        if self.nodes[index].is_expanded {
            self.collapse_at(index);
            Ok(false)
        } else {
            self.expand(path, children)?;
            Ok(true)
        }
    }

    fn collapse_at(&mut self, index: usize) {
        let removed = self.nodes[index].num_expanded_children;
        self.nodes.drain(index + 1..index + 1 + removed);

        let node = &mut self.nodes[index];
        node.is_expanded = false;
        node.num_expanded_children = 0;
        node.num_expanded_direct_children = 0;
        self.adjust_ancestors(index, -(removed as isize));
    }

    /// Ancestors are the nearest preceding rows of each smaller depth
    fn adjust_ancestors(&mut self, index: usize, delta: isize) {
        let mut depth = self.nodes[index].depth;
        for i in (0..index).rev() {
            if depth == 0 {
                break;
            }
            if self.nodes[i].depth < depth {
                depth = self.nodes[i].depth;
                let count = &mut self.nodes[i].num_expanded_children;
                *count = count.saturating_add_signed(delta);
            }
        }
    }
}
