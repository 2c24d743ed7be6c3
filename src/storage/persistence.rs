//! The single-file index format: save, load, and memory-mapped view.
//!
//! Layout (little-endian throughout):
//!
//! ```text
//! magic "USEARCH\0" | version u32 | dim u32 | element_type u32 | metric_id u32
//! M u32 | M0 u32 | ef_construction u32 | ef_search u32 | size u64 | capacity u64
//! entry_id u32 (0xFFFFFFFF if empty) | max_level u32 | level_lambda f64
//! per node: label i64, top_layer u32, per layer: count u32 + ids u32 * count
//! zero padding to the next 64-byte boundary
//! vector arena: size * stride raw bytes
//! ```
//!
//! `save` writes atomically (temp file + rename). `load` reads the whole
//! file into owned storage. `view` maps it read-only and serves node lists
//! and vectors straight from the mapping. The magic string, version, and
//! enum ids are a stable contract; `metric_id` 0 marks a user callback and
//! makes the file non-portable.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use memmap2::MmapOptions;

use crate::config::{MAX_LAYERS, VECTOR_ALIGN};
use crate::error::{IndexError, Result};
use crate::hnsw::distance::{Metric, MetricKind};
use crate::hnsw::graph::{GraphConfig, ProximityGraph, NO_ENTRY};
use crate::hnsw::node::{Node, NodeStore};
use crate::hnsw::vector::VectorStore;
use crate::scalar::ScalarKind;

const MAGIC: &[u8; 8] = b"USEARCH\0";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 72;
const ZEROS: [u8; VECTOR_ALIGN] = [0; VECTOR_ALIGN];

/// Writes the index to `path` atomically (temp file + rename).
pub fn save(graph: &ProximityGraph, path: &Path) -> Result<()> {
    let size = graph.len();
    let metric = graph.metric();
    let config = graph.config();

    let tmp = tmp_path(path);
    let file = File::create(&tmp)?;
    let mut w = BufWriter::new(file);

    w.write_all(MAGIC)?;
    w.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    w.write_u32::<LittleEndian>(metric.dims() as u32)?;
    w.write_u32::<LittleEndian>(metric.scalar().to_wire())?;
    w.write_u32::<LittleEndian>(metric.wire_id())?;
    w.write_u32::<LittleEndian>(config.connectivity as u32)?;
    w.write_u32::<LittleEndian>(config.connectivity_base as u32)?;
    w.write_u32::<LittleEndian>(config.expansion_add as u32)?;
    w.write_u32::<LittleEndian>(config.expansion_search as u32)?;
    w.write_u64::<LittleEndian>(size as u64)?;
    w.write_u64::<LittleEndian>(graph.capacity() as u64)?;
    let (entry, max_level) = graph.entry_snapshot().unwrap_or((NO_ENTRY, 0));
    w.write_u32::<LittleEndian>(entry)?;
    w.write_u32::<LittleEndian>(max_level)?;
    w.write_f64::<LittleEndian>(config.level_lambda)?;

    let mut written = HEADER_LEN;
    for id in 0..size as u32 {
        let node = graph.nodes().clone_node(id);
        w.write_i64::<LittleEndian>(node.label)?;
        w.write_u32::<LittleEndian>(node.top_layer)?;
        written += 12;
        for list in &node.neighbors {
            w.write_u32::<LittleEndian>(list.len() as u32)?;
            for &m in list {
                w.write_u32::<LittleEndian>(m)?;
            }
            written += 4 + list.len() * 4;
        }
    }

    let padding = written.next_multiple_of(VECTOR_ALIGN) - written;
    w.write_all(&ZEROS[..padding])?;
    w.write_all(graph.vectors().raw(size))?;
    w.flush()?;
    let file = w.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;

    let total = written + padding + size * graph.vectors().stride();
    tracing::info!("saved index to {:?} ({size} nodes, {total} bytes)", path);
    Ok(())
}

/// Reads an index file fully into owned storage.
///
/// The file must agree with the constructed index on dimension, element
/// type, and metric; graph shape (connectivity, beam widths, capacity,
/// entry point) is adopted from the file.
pub fn load(path: &Path, metric: Metric, seed: u64) -> Result<ProximityGraph> {
    let bytes = fs::read(path)?;
    let mut r = Reader::new(&bytes);
    let header = parse_header(&mut r)?;
    check_identity(&header, &metric)?;

    let mut nodes = Vec::with_capacity(header.size);
    for _ in 0..header.size {
        let label = r.i64()?;
        let top_layer = r.u32()?;
        if top_layer as usize >= MAX_LAYERS {
            return Err(IndexError::IncompatibleFile(
                "node exceeds the layer ceiling".into(),
            ));
        }
        let mut neighbors = Vec::with_capacity(top_layer as usize + 1);
        for _ in 0..=top_layer {
            let count = r.u32()? as usize;
            if count > header.size {
                return Err(IndexError::IncompatibleFile(
                    "neighbor count exceeds node count".into(),
                ));
            }
            let mut list = Vec::with_capacity(count);
            for _ in 0..count {
                list.push(r.u32()?);
            }
            neighbors.push(list);
        }
        nodes.push(Node {
            label,
            top_layer,
            neighbors,
        });
    }

    r.align_to(VECTOR_ALIGN)?;
    let stride = VectorStore::stride_for(metric.dims_bytes());
    let arena = r.bytes(header.size * stride)?;

    let node_store = NodeStore::from_nodes(nodes, header.capacity);
    let mut vectors = VectorStore::with_capacity(metric.dims_bytes(), header.capacity);
    vectors.fill_from(arena);

    let graph = ProximityGraph::from_parts(
        header.config(seed),
        metric,
        node_store,
        vectors,
        header.capacity,
        header.size as u32,
        header.entry(),
    );
    graph
        .validate()
        .map_err(IndexError::IncompatibleFile)?;
    tracing::info!("loaded index from {:?} ({} nodes)", path, header.size);
    Ok(graph)
}

/// Maps an index file read-only and serves it without copying.
///
/// Node records and the vector arena are read straight from the mapping;
/// every mutation of the resulting index is rejected.
pub fn view(path: &Path, metric: Metric, seed: u64) -> Result<ProximityGraph> {
    let file = File::open(path)?;
    // Read-only mapping; the caller promises the file is not truncated or
    // rewritten while mapped.
    let map = Arc::new(unsafe { MmapOptions::new().map(&file)? });

    let (header, offsets, arena_offset) = {
        let mut r = Reader::new(&map);
        let header = parse_header(&mut r)?;
        check_identity(&header, &metric)?;

        let mut offsets = Vec::with_capacity(header.size);
        for _ in 0..header.size {
            offsets.push(r.pos());
            r.skip(8)?; // label
            let top_layer = r.u32()?;
            if top_layer as usize >= MAX_LAYERS {
                return Err(IndexError::IncompatibleFile(
                    "node exceeds the layer ceiling".into(),
                ));
            }
            for _ in 0..=top_layer {
                let count = r.u32()? as usize;
                r.skip(count * 4)?;
            }
        }
        r.align_to(VECTOR_ALIGN)?;
        let arena_offset = r.pos();
        let stride = VectorStore::stride_for(metric.dims_bytes());
        r.bytes(header.size * stride)?;
        (header, offsets, arena_offset)
    };

    let node_store = NodeStore::mapped(map.clone(), offsets);
    let vectors = VectorStore::mapped(map, arena_offset, metric.dims_bytes(), header.size);
    let graph = ProximityGraph::from_parts(
        header.config(seed),
        metric,
        node_store,
        vectors,
        header.capacity,
        header.size as u32,
        header.entry(),
    );
    graph
        .validate()
        .map_err(IndexError::IncompatibleFile)?;
    tracing::info!("mapped index from {:?} ({} nodes)", path, header.size);
    Ok(graph)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

struct Header {
    dims: usize,
    scalar: ScalarKind,
    metric_wire: u32,
    connectivity: usize,
    connectivity_base: usize,
    expansion_add: usize,
    expansion_search: usize,
    size: usize,
    capacity: usize,
    entry_id: u32,
    max_level: u32,
    level_lambda: f64,
}

impl Header {
    fn config(&self, seed: u64) -> GraphConfig {
        GraphConfig {
            connectivity: self.connectivity,
            connectivity_base: self.connectivity_base,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            level_lambda: self.level_lambda,
            seed,
        }
    }

    fn entry(&self) -> Option<(u32, u32)> {
        (self.entry_id != NO_ENTRY).then_some((self.entry_id, self.max_level))
    }
}

fn parse_header(r: &mut Reader<'_>) -> Result<Header> {
    let magic = r.bytes(8)?;
    if magic != MAGIC {
        return Err(IndexError::IncompatibleFile(
            "bad magic, not an index file".into(),
        ));
    }
    let version = r.u32()?;
    if version != FORMAT_VERSION {
        return Err(IndexError::IncompatibleFile(format!(
            "unsupported format version {version} (this build reads {FORMAT_VERSION})"
        )));
    }
    let dims = r.u32()? as usize;
    let scalar_wire = r.u32()?;
    let scalar = ScalarKind::from_wire(scalar_wire).ok_or_else(|| {
        IndexError::IncompatibleFile(format!("unknown element type id {scalar_wire}"))
    })?;
    let metric_wire = r.u32()?;
    if metric_wire != 0 && MetricKind::from_wire(metric_wire).is_none() {
        return Err(IndexError::IncompatibleFile(format!(
            "unknown metric id {metric_wire}"
        )));
    }
    let connectivity = r.u32()? as usize;
    let connectivity_base = r.u32()? as usize;
    let expansion_add = r.u32()? as usize;
    let expansion_search = r.u32()? as usize;
    let size = r.u64()? as usize;
    let capacity = r.u64()? as usize;
    let entry_id = r.u32()?;
    let max_level = r.u32()?;
    let level_lambda = r.f64()?;

    if size > capacity {
        return Err(IndexError::IncompatibleFile(format!(
            "size {size} exceeds capacity {capacity}"
        )));
    }
    if connectivity == 0 || max_level as usize >= MAX_LAYERS {
        return Err(IndexError::IncompatibleFile(
            "corrupt graph parameters".into(),
        ));
    }
    Ok(Header {
        dims,
        scalar,
        metric_wire,
        connectivity,
        connectivity_base,
        expansion_add,
        expansion_search,
        size,
        capacity,
        entry_id,
        max_level,
        level_lambda,
    })
}

fn check_identity(header: &Header, metric: &Metric) -> Result<()> {
    if header.dims != metric.dims() {
        return Err(IndexError::IncompatibleFile(format!(
            "file holds {}-dimensional vectors, index expects {}",
            header.dims,
            metric.dims()
        )));
    }
    if header.scalar != metric.scalar() {
        return Err(IndexError::IncompatibleFile(format!(
            "file holds {} elements, index expects {}",
            header.scalar.name(),
            metric.scalar().name()
        )));
    }
    if header.metric_wire != metric.wire_id() {
        let found = MetricKind::from_wire(header.metric_wire)
            .map(MetricKind::name)
            .unwrap_or("a user-defined metric");
        let expected = metric
            .kind()
            .map(MetricKind::name)
            .unwrap_or("a user-defined metric");
        return Err(IndexError::IncompatibleFile(format!(
            "file was saved with {found}, index uses {expected}"
        )));
    }
    Ok(())
}

/// Bounds-checked little-endian reader over a file image.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(IndexError::IncompatibleFile(
                "unexpected end of index file".into(),
            ));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.bytes(n).map(|_| ())
    }

    fn align_to(&mut self, align: usize) -> Result<()> {
        let target = self.pos.next_multiple_of(align);
        self.skip(target - self.pos)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.bytes(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn i64(&mut self) -> Result<i64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.bytes(8)?);
        Ok(i64::from_le_bytes(b))
    }

    fn f64(&mut self) -> Result<f64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.bytes(8)?);
        Ok(f64::from_le_bytes(b))
    }
}
