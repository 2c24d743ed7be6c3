//! Fixed-capacity node storage.
//!
//! Nodes live in a slab allocated on `reserve` and never relocated, so
//! internal ids stay valid for the life of the index. Each owned slot is
//! guarded by its own `RwLock`; traversals copy a neighbor list out under
//! a short read guard, writers lock exactly one node at a time. A viewed
//! index replaces the slab with per-node record offsets into the mapped
//! file image and decodes lists on demand.

use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::{RwLock, RwLockWriteGuard};

/// One graph node: external label, top layer, and per-layer neighbor ids.
///
/// `neighbors` holds `top_layer + 1` lists once the node is initialized;
/// layer 0 is capped at `2 * M` ids, higher layers at `M`.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub label: i64,
    pub top_layer: u32,
    pub neighbors: Vec<Vec<u32>>,
}

enum Backing {
    Owned(Vec<RwLock<Node>>),
    Mapped(MappedNodes),
}

/// Node slab, either mutable in memory or read-only over a file mapping.
pub struct NodeStore {
    backing: Backing,
}

impl NodeStore {
    /// Allocates an owned slab of `capacity` empty slots.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || RwLock::new(Node::default()));
        Self {
            backing: Backing::Owned(slots),
        }
    }

    /// Builds an owned slab from fully decoded nodes, padded with empty
    /// slots up to `capacity`.
    pub(crate) fn from_nodes(nodes: Vec<Node>, capacity: usize) -> Self {
        let mut slots: Vec<RwLock<Node>> = nodes.into_iter().map(RwLock::new).collect();
        slots.resize_with(capacity.max(slots.len()), || RwLock::new(Node::default()));
        Self {
            backing: Backing::Owned(slots),
        }
    }

    /// Wraps a mapped file image; `offsets[id]` is the byte offset of the
    /// node record. Offsets are bounds-checked when the view is opened.
    pub(crate) fn mapped(map: Arc<Mmap>, offsets: Vec<usize>) -> Self {
        Self {
            backing: Backing::Mapped(MappedNodes { map, offsets }),
        }
    }

    pub fn capacity(&self) -> usize {
        match &self.backing {
            Backing::Owned(slots) => slots.len(),
            Backing::Mapped(m) => m.offsets.len(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    /// Grows the owned slab to `capacity` slots. Requires exclusive access.
    pub fn grow(&mut self, capacity: usize) {
        match &mut self.backing {
            Backing::Owned(slots) => {
                if capacity > slots.len() {
                    slots.resize_with(capacity, || RwLock::new(Node::default()));
                }
            }
            Backing::Mapped(_) => unreachable!("growth is rejected on mapped indexes"),
        }
    }

    /// Initializes a freshly reserved slot with empty neighbor lists.
    ///
    /// Must complete before the node is published through any back-link;
    /// the publishing lock release makes these writes visible to readers.
    pub fn init(&self, id: u32, label: i64, top_layer: u32) {
        match &self.backing {
            Backing::Owned(slots) => {
                let mut node = slots[id as usize].write();
                node.label = label;
                node.top_layer = top_layer;
                node.neighbors.clear();
                node.neighbors
                    .resize_with(top_layer as usize + 1, Vec::new);
            }
            Backing::Mapped(_) => unreachable!("mutation is rejected on mapped indexes"),
        }
    }

    pub fn label(&self, id: u32) -> i64 {
        match &self.backing {
            Backing::Owned(slots) => slots[id as usize].read().label,
            Backing::Mapped(m) => m.label(id),
        }
    }

    pub fn top_layer(&self, id: u32) -> u32 {
        match &self.backing {
            Backing::Owned(slots) => slots[id as usize].read().top_layer,
            Backing::Mapped(m) => m.top_layer(id),
        }
    }

    /// Copies the node's layer-`layer` neighbor list into `out`.
    ///
    /// Traversals work on the copy so the read guard is held only for the
    /// duration of a memcpy. A node found at `layer` always carries that
    /// layer, but a missing list is treated as empty rather than trusted.
    pub fn copy_neighbors(&self, id: u32, layer: usize, out: &mut Vec<u32>) {
        out.clear();
        match &self.backing {
            Backing::Owned(slots) => {
                let node = slots[id as usize].read();
                if let Some(list) = node.neighbors.get(layer) {
                    out.extend_from_slice(list);
                }
            }
            Backing::Mapped(m) => m.copy_neighbors(id, layer, out),
        }
    }

    /// Exclusive access to one owned node for link stitching.
    pub(crate) fn write_guard(&self, id: u32) -> RwLockWriteGuard<'_, Node> {
        match &self.backing {
            Backing::Owned(slots) => slots[id as usize].write(),
            Backing::Mapped(_) => unreachable!("mutation is rejected on mapped indexes"),
        }
    }

    /// Full decoded copy of one node, for serialization and validation.
    pub fn clone_node(&self, id: u32) -> Node {
        match &self.backing {
            Backing::Owned(slots) => slots[id as usize].read().clone(),
            Backing::Mapped(m) => m.clone_node(id),
        }
    }
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.is_mapped() { "mapped" } else { "owned" };
        f.debug_struct("NodeStore")
            .field("mode", &mode)
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Read-only node records inside a mapped file image.
///
/// Record layout (little-endian): label i64, top_layer u32, then for each
/// layer a u32 count followed by that many u32 ids.
struct MappedNodes {
    map: Arc<Mmap>,
    offsets: Vec<usize>,
}

impl MappedNodes {
    fn label(&self, id: u32) -> i64 {
        read_i64(&self.map, self.offsets[id as usize])
    }

    fn top_layer(&self, id: u32) -> u32 {
        read_u32(&self.map, self.offsets[id as usize] + 8)
    }

    fn copy_neighbors(&self, id: u32, layer: usize, out: &mut Vec<u32>) {
        let base = self.offsets[id as usize];
        let top = read_u32(&self.map, base + 8) as usize;
        if layer > top {
            return;
        }
        let mut off = base + 12;
        for current in 0..=top {
            let count = read_u32(&self.map, off) as usize;
            off += 4;
            if current == layer {
                out.reserve(count);
                for i in 0..count {
                    out.push(read_u32(&self.map, off + i * 4));
                }
                return;
            }
            off += count * 4;
        }
    }

    fn clone_node(&self, id: u32) -> Node {
        let base = self.offsets[id as usize];
        let label = read_i64(&self.map, base);
        let top = read_u32(&self.map, base + 8);
        let mut neighbors = Vec::with_capacity(top as usize + 1);
        let mut off = base + 12;
        for _ in 0..=top {
            let count = read_u32(&self.map, off) as usize;
            off += 4;
            let mut list = Vec::with_capacity(count);
            for i in 0..count {
                list.push(read_u32(&self.map, off + i * 4));
            }
            off += count * 4;
            neighbors.push(list);
        }
        Node {
            label,
            top_layer: top,
            neighbors,
        }
    }
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

fn read_i64(buf: &[u8], off: usize) -> i64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    i64::from_le_bytes(b)
}
