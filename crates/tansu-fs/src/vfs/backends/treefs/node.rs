//! Node store: the tree of filesystem objects.
//!
//! Nodes live in a slot arena addressed by generational [`NodeId`]s.
//! Parent/child relations are ids, never owning pointers; freeing a slot
//! bumps its generation so descriptors left pointing at a removed node fail
//! cleanly instead of touching a recycled slot.

use std::sync::Arc;
use std::time::SystemTime;

use crate::vfs::device::{DeviceDriver, Pipe};
use crate::vfs::error::FsResult;
use crate::vfs::types::{DeviceId, DirEntry, FileAttr, FileType};

/// Stable handle to a node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Pack into an opaque u64 for directory cursors.
    pub(crate) fn to_token(self) -> u64 {
        (u64::from(self.index) << 32) | u64::from(self.generation)
    }

    /// Unpack a cursor token.
    pub(crate) fn from_token(token: u64) -> Self {
        Self {
            index: (token >> 32) as u32,
            generation: token as u32,
        }
    }
}

/// Kind-specific node payload; ownership is exclusive to the node.
pub(crate) enum NodePayload {
    /// Ordered child list. Insertion order is significant for iteration,
    /// not for lookup.
    Directory { children: Vec<NodeId> },
    /// Contiguous byte buffer, reallocated on growth.
    File { data: Vec<u8> },
    /// Delegated device; no locally-owned data.
    Device {
        id: DeviceId,
        driver: Arc<dyn DeviceDriver>,
    },
    /// Delegated pipe object.
    Fifo { pipe: Arc<dyn Pipe> },
    /// Target path stored as metadata only; never followed.
    Link { target: String },
}

impl std::fmt::Debug for NodePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Directory { children } => {
                f.debug_struct("Directory").field("children", &children.len()).finish()
            }
            Self::File { data } => f.debug_struct("File").field("len", &data.len()).finish(),
            Self::Device { id, .. } => f.debug_struct("Device").field("id", id).finish(),
            Self::Fifo { .. } => f.debug_struct("Fifo").finish(),
            Self::Link { target } => f.debug_struct("Link").field("target", target).finish(),
        }
    }
}

/// One filesystem object.
#[derive(Debug)]
pub(crate) struct Node {
    /// Name, unique among siblings.
    pub name: String,
    /// Permission bits.
    pub mode: u32,
    /// Owner user ID.
    pub uid: u32,
    /// Owner group ID.
    pub gid: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    pub payload: NodePayload,
}

impl Node {
    pub fn directory(name: String, mode: u32) -> Self {
        Self::new(name, mode, NodePayload::Directory { children: Vec::new() })
    }

    pub fn file(name: String, mode: u32) -> Self {
        Self::new(name, mode, NodePayload::File { data: Vec::new() })
    }

    pub fn device(name: String, driver: Arc<dyn DeviceDriver>) -> Self {
        let id = driver.id();
        Self::new(name, 0o666, NodePayload::Device { id, driver })
    }

    pub fn fifo(name: String, mode: u32, pipe: Arc<dyn Pipe>) -> Self {
        Self::new(name, mode, NodePayload::Fifo { pipe })
    }

    pub fn link(name: String, target: String) -> Self {
        Self::new(name, 0o777, NodePayload::Link { target })
    }

    fn new(name: String, mode: u32, payload: NodePayload) -> Self {
        Self {
            name,
            mode,
            uid: 0,
            gid: 0,
            mtime: SystemTime::now(),
            payload,
        }
    }

    pub fn kind(&self) -> FileType {
        match &self.payload {
            NodePayload::Directory { .. } => FileType::Directory,
            NodePayload::File { .. } => FileType::Regular,
            NodePayload::Device { .. } => FileType::Device,
            NodePayload::Fifo { .. } => FileType::Fifo,
            NodePayload::Link { .. } => FileType::Link,
        }
    }

    /// Byte length: content size for files and links, metadata overhead
    /// for everything else.
    pub fn size(&self) -> u64 {
        match &self.payload {
            NodePayload::File { data } => data.len() as u64,
            NodePayload::Link { target } => target.len() as u64,
            _ => (std::mem::size_of::<Node>() + self.name.len()) as u64,
        }
    }

    pub fn children(&self) -> Option<&Vec<NodeId>> {
        match &self.payload {
            NodePayload::Directory { children } => Some(children),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match &mut self.payload {
            NodePayload::Directory { children } => Some(children),
            _ => None,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.payload, NodePayload::Directory { .. })
    }

    /// Metadata snapshot.
    pub fn attr(&self) -> FileAttr {
        let dev = match &self.payload {
            NodePayload::Device { id, .. } => Some(*id),
            _ => None,
        };
        FileAttr {
            size: self.size(),
            kind: self.kind(),
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            mtime: self.mtime,
            dev,
        }
    }

    /// Snapshot as a directory entry.
    pub fn dir_entry(&self) -> DirEntry {
        DirEntry {
            name: self.name.clone(),
            kind: self.kind(),
            size: self.size(),
        }
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Slot arena holding every node of one filesystem instance.
#[derive(Default)]
pub(crate) struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a node in a slot, reusing a freed one if available.
    pub fn alloc(&mut self, node: Node) -> FsResult<NodeId> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return Ok(NodeId {
                index,
                generation: slot.generation,
            });
        }
        self.slots.try_reserve(1)?;
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        Ok(NodeId {
            index,
            generation: 0,
        })
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Free a slot, bumping its generation. Returns the node, or `None`
    /// if the id was stale.
    pub fn free(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    /// Free a node and everything below it.
    ///
    /// Iterative worklist rather than recursion: tree depth is caller
    /// data and must not translate into stack depth.
    pub fn release_subtree(&mut self, root: NodeId) {
        let mut worklist = vec![root];
        while let Some(id) = worklist.pop() {
            if let Some(node) = self.free(id) {
                if let NodePayload::Directory { children } = node.payload {
                    worklist.extend(children);
                }
            }
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of reusable slots.
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Total bytes held in file buffers.
    pub fn bytes_used(&self) -> u64 {
        self.slots
            .iter()
            .filter_map(|s| s.node.as_ref())
            .map(Node::size)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_get_free() {
        let mut arena = NodeArena::new();
        let id = arena.alloc(Node::file("a.txt".into(), 0o644)).unwrap();
        assert_eq!(arena.get(id).unwrap().name, "a.txt");
        assert_eq!(arena.len(), 1);

        let node = arena.free(id).unwrap();
        assert_eq!(node.name, "a.txt");
        assert_eq!(arena.len(), 0);
        assert!(arena.get(id).is_none());
    }

    #[test]
    fn stale_id_after_slot_reuse() {
        let mut arena = NodeArena::new();
        let first = arena.alloc(Node::file("one".into(), 0o644)).unwrap();
        arena.free(first);

        // Same slot, new generation.
        let second = arena.alloc(Node::file("two".into(), 0o644)).unwrap();
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second).unwrap().name, "two");
        assert!(arena.free(first).is_none());
    }

    #[test]
    fn double_free_is_rejected() {
        let mut arena = NodeArena::new();
        let id = arena.alloc(Node::file("f".into(), 0o644)).unwrap();
        assert!(arena.free(id).is_some());
        assert!(arena.free(id).is_none());
    }

    #[test]
    fn release_subtree_frees_descendants() {
        let mut arena = NodeArena::new();
        let root = arena.alloc(Node::directory("/".into(), 0o755)).unwrap();
        let dir = arena.alloc(Node::directory("d".into(), 0o755)).unwrap();
        let file = arena.alloc(Node::file("f".into(), 0o644)).unwrap();

        arena.get_mut(root).unwrap().children_mut().unwrap().push(dir);
        arena.get_mut(dir).unwrap().children_mut().unwrap().push(file);

        arena.release_subtree(root);
        assert_eq!(arena.len(), 0);
        assert!(arena.get(dir).is_none());
        assert!(arena.get(file).is_none());
    }

    #[test]
    fn release_subtree_survives_deep_trees() {
        let mut arena = NodeArena::new();
        let root = arena.alloc(Node::directory("/".into(), 0o755)).unwrap();
        let mut parent = root;
        for i in 0..10_000 {
            let child = arena
                .alloc(Node::directory(format!("d{i}"), 0o755))
                .unwrap();
            arena
                .get_mut(parent)
                .unwrap()
                .children_mut()
                .unwrap()
                .push(child);
            parent = child;
        }
        arena.release_subtree(root);
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn token_roundtrip() {
        let mut arena = NodeArena::new();
        let id = arena.alloc(Node::directory("/".into(), 0o755)).unwrap();
        arena.free(id);
        let id2 = arena.alloc(Node::directory("/".into(), 0o755)).unwrap();
        assert_eq!(NodeId::from_token(id2.to_token()), id2);
        assert_ne!(NodeId::from_token(id.to_token()), id2);
    }

    #[test]
    fn directory_size_is_metadata_overhead() {
        let dir = Node::directory("spool".into(), 0o755);
        assert_eq!(
            dir.size(),
            (std::mem::size_of::<Node>() + "spool".len()) as u64
        );

        let mut file = Node::file("f".into(), 0o644);
        if let NodePayload::File { data } = &mut file.payload {
            data.extend_from_slice(b"hello");
        }
        assert_eq!(file.size(), 5);
    }
}
