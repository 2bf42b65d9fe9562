//! A thread-safe, path-addressable tree of [`Node`]s.
//!
//! A [`PathMap`] handle is cheap to clone: clones share the same storage.
//! Every operation locks the root for its whole duration, and sub-views
//! obtained with [`PathMap::view`] share that same root lock, so the root is
//! the only unit of atomicity. For multi-step updates that must not
//! interleave with other writers use [`PathMap::with_lock`].
//!
//! Writes auto-vivify: intermediate mappings are created as needed, and
//! writing a sequence index past the end pads the gap. Padded slots hold an
//! empty mapping when more path follows the index, otherwise the zero value
//! of the written node's kind.
//!
//! ```ignore
//! let settings = PathMap::new();
//! settings.set("sl[5]", 9, SetOptions::default());
//! assert_eq!(settings.get("sl[0]"), Some(Node::Int(0)));
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::PathMapError;
use crate::node::{Mapping, Node};
use crate::path::{Path, Segment};

/// Options for [`PathMap::set`] and [`PathMap::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Leave values that are already present untouched.
    pub skip_existing: bool,
}

impl SetOptions {
    pub fn skip_existing() -> Self {
        Self {
            skip_existing: true,
        }
    }
}

pub type MergeOptions = SetOptions;

#[derive(Clone)]
pub struct PathMap {
    root: Arc<Mutex<Node>>,
    prefix: Path,
}

impl Default for PathMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PathMap {
    pub fn new() -> Self {
        Self::from_node(Node::empty_mapping())
    }

    pub fn from_node(node: Node) -> Self {
        Self {
            root: Arc::new(Mutex::new(node)),
            prefix: Path::root(),
        }
    }

    /// Where this view is anchored inside the shared root.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Snapshot of the value at `path`. `None` when any segment is missing,
    /// an index is out of range, or the stored value is null.
    pub fn get(&self, path: impl Into<Path>) -> Option<Node> {
        let full = self.prefix.concat(&path.into());
        let root = self.root.lock();
        locate(&root, full.segments()).cloned()
    }

    pub fn has(&self, path: impl Into<Path>) -> bool {
        let full = self.prefix.concat(&path.into());
        let root = self.root.lock();
        locate(&root, full.segments()).is_some()
    }

    pub fn set(&self, path: impl Into<Path>, value: impl Into<Node>, options: SetOptions) {
        let full = self.prefix.concat(&path.into());
        let value = value.into();
        let mut root = self.root.lock();
        let slot = vivify(&mut root, full.segments(), &value);
        if options.skip_existing && !slot.is_null() {
            return;
        }
        *slot = value;
    }

    /// Recursively merge `source` into `path`.
    ///
    /// Mappings merge key by key and sequences merge index by index; any
    /// other value is written like [`set`](Self::set). Merging an empty
    /// mapping into the root is a no-op, while merging one into an unset
    /// path records that path as an empty mapping.
    pub fn merge(&self, path: impl Into<Path>, source: impl Into<Node>, options: MergeOptions) {
        let full = self.prefix.concat(&path.into());
        let source = source.into();

        if full.is_root() && matches!(&source, Node::Mapping(m) if m.is_empty()) {
            return;
        }

        let mut root = self.root.lock();
        let slot = vivify(&mut root, full.segments(), &source);
        merge_into(slot, source, options);
    }

    /// Extend the sequence at `path`, creating it when absent.
    pub fn append(&self, path: impl Into<Path>, values: Vec<Node>) -> Result<(), PathMapError> {
        let full = self.prefix.concat(&path.into());
        let mut root = self.root.lock();
        let slot = vivify(&mut root, full.segments(), &Node::Null);

        match slot {
            Node::Null => *slot = Node::Sequence(values),
            Node::Sequence(items) => items.extend(values),
            other => {
                return Err(PathMapError::AppendOntoNonSequence {
                    path: full.to_string(),
                    found: other.kind_name(),
                });
            }
        }
        Ok(())
    }

    /// Sorted keys of the mapping this handle points at. Empty when the
    /// value is not a mapping.
    pub fn keys(&self) -> Vec<String> {
        let root = self.root.lock();
        match locate(&root, self.prefix.segments()) {
            Some(Node::Mapping(m)) => m.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Deep copy of everything below this handle.
    pub fn data(&self) -> Node {
        self.get(Path::root()).unwrap_or_default()
    }

    pub fn mapping(&self) -> Result<Mapping, PathMapError> {
        match self.data() {
            Node::Mapping(m) => Ok(m),
            Node::Null => Ok(Mapping::new()),
            other => Err(PathMapError::NotAMapping {
                path: self.prefix.to_string(),
                found: other.kind_name(),
            }),
        }
    }

    pub fn sequence(&self) -> Result<Vec<Node>, PathMapError> {
        match self.data() {
            Node::Sequence(items) => Ok(items),
            Node::Null => Ok(Vec::new()),
            other => Err(PathMapError::NotASequence {
                path: self.prefix.to_string(),
                found: other.kind_name(),
            }),
        }
    }

    /// A live view of the mapping at `path`.
    ///
    /// The view shares storage and lock with this handle: writes through it
    /// show up here, and vice versa.
    pub fn view(&self, path: impl Into<Path>) -> Result<PathMap, PathMapError> {
        let full = self.prefix.concat(&path.into());
        let root = self.root.lock();
        match locate(&root, full.segments()) {
            Some(Node::Mapping(_)) => Ok(PathMap {
                root: Arc::clone(&self.root),
                prefix: full,
            }),
            found => Err(PathMapError::NotAMapping {
                path: full.to_string(),
                found: found.map_or("null", Node::kind_name),
            }),
        }
    }

    /// Run `f` with exclusive access to the node under this handle.
    ///
    /// The root lock is held while `f` runs, so `f` must not call back into
    /// any handle sharing this storage.
    pub fn with_lock<T>(&self, f: impl FnOnce(&mut Node) -> T) -> T {
        let mut root = self.root.lock();
        let slot = vivify(&mut root, self.prefix.segments(), &Node::empty_mapping());
        f(slot)
    }

    /// An independent copy that shares nothing with this handle.
    pub fn deep_clone(&self) -> PathMap {
        PathMap::from_node(self.data())
    }
}

impl From<Node> for PathMap {
    fn from(node: Node) -> Self {
        PathMap::from_node(node)
    }
}

impl From<Mapping> for PathMap {
    fn from(mapping: Mapping) -> Self {
        PathMap::from_node(Node::Mapping(mapping))
    }
}

impl fmt::Debug for PathMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMap")
            .field("prefix", &self.prefix.to_string())
            .field("data", &self.data())
            .finish()
    }
}

// -- tree walking -------------------------------------------------------------

fn locate<'a>(mut node: &'a Node, segments: &[Segment]) -> Option<&'a Node> {
    for segment in segments {
        node = node.as_mapping()?.get(&segment.key)?;
        for &index in &segment.indices {
            node = node.as_sequence()?.get(index)?;
        }
    }
    if node.is_null() { None } else { Some(node) }
}

/// Walk to `segments`, creating whatever is missing on the way. `leaf` is the
/// value about to be written; it decides the padding of a trailing index.
fn vivify<'a>(mut node: &'a mut Node, segments: &[Segment], leaf: &Node) -> &'a mut Node {
    for (s, segment) in segments.iter().enumerate() {
        let last_segment = s + 1 == segments.len();
        node = ensure_mapping(node)
            .entry(segment.key.clone())
            .or_insert(Node::Null);

        for (i, &index) in segment.indices.iter().enumerate() {
            let filler = if i + 1 < segment.indices.len() {
                Node::empty_sequence()
            } else if !last_segment {
                Node::empty_mapping()
            } else {
                leaf.zero_like()
            };
            node = sequence_slot(node, index, filler);
        }
    }
    node
}

fn merge_into(node: &mut Node, source: Node, options: MergeOptions) {
    match source {
        Node::Mapping(entries) => {
            if node.is_null() && entries.is_empty() {
                *node = Node::empty_mapping();
                return;
            }
            if options.skip_existing && !node.is_null() && !node.is_mapping() {
                return;
            }
            let target = ensure_mapping(node);
            for (key, value) in entries {
                let child = target.entry(key).or_insert(Node::Null);
                merge_into(child, value, options);
            }
        }
        Node::Sequence(items) => {
            if node.is_null() && items.is_empty() {
                *node = Node::empty_sequence();
                return;
            }
            if options.skip_existing && !node.is_null() && !node.is_sequence() {
                return;
            }
            for (index, item) in items.into_iter().enumerate() {
                let slot = sequence_slot(node, index, item.zero_like());
                merge_into(slot, item, options);
            }
        }
        scalar => {
            if options.skip_existing && !node.is_null() {
                return;
            }
            *node = scalar;
        }
    }
}

fn ensure_mapping(node: &mut Node) -> &mut Mapping {
    if !node.is_mapping() {
        *node = Node::empty_mapping();
    }
    match node {
        Node::Mapping(m) => m,
        _ => unreachable!("node was just replaced by a mapping"),
    }
}

/// Slot `index` of the sequence at `node`, turning `node` into a sequence
/// and padding with `filler` as needed. A freshly created slot is null.
fn sequence_slot(node: &mut Node, index: usize, filler: Node) -> &mut Node {
    if !node.is_sequence() {
        *node = Node::empty_sequence();
    }
    let Node::Sequence(items) = node else {
        unreachable!("node was just replaced by a sequence")
    };
    if items.len() <= index {
        items.resize(index, filler);
        items.push(Node::Null);
    }
    &mut items[index]
}
