// CPU side vertex storage for one frame
//
// The widget layer appends vertices here while building a frame and
// the pipelines copy the written prefix into their vertex buffers.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Vertices per pipeline and frame. Limited by the u16 quad index buffer.
pub const MAX_VERTICES: usize = 65536;
pub const MAX_QUADS: usize = MAX_VERTICES / 4;

/// Vertices dropped by every span of the process
static DROPPED_VERTICES: AtomicUsize = AtomicUsize::new(0);

/// The number of vertices dropped by full spans since the process started
pub fn dropped_vertices() -> usize {
    DROPPED_VERTICES.load(Ordering::Relaxed)
}

fn record_dropped(count: usize) {
    DROPPED_VERTICES.fetch_add(count, Ordering::Relaxed);
}

/// A fixed capacity list of vertices
///
/// Appending to a full span silently drops the vertices and counts
/// them. The count survives `clear` so overruns stay observable
/// across frames.
#[derive(Debug)]
pub struct VertexSpan<V: Copy> {
    vs_vertices: Vec<V>,
    vs_capacity: usize,
    vs_overflow: usize,
}

impl<V: Copy> VertexSpan<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            vs_vertices: Vec::with_capacity(capacity),
            vs_capacity: capacity,
            vs_overflow: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.vs_vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vs_vertices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.vs_capacity
    }

    pub fn remaining(&self) -> usize {
        self.vs_capacity - self.vs_vertices.len()
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// The number of vertices dropped because the span was full
    pub fn overflow_count(&self) -> usize {
        self.vs_overflow
    }

    /// Count `count` vertices as dropped without appending anything
    pub fn count_dropped(&mut self, count: usize) {
        self.vs_overflow += count;
        record_dropped(count);
    }

    pub fn as_slice(&self) -> &[V] {
        self.vs_vertices.as_slice()
    }

    /// Append one vertex, returns false if it was dropped
    pub fn push(&mut self, vertex: V) -> bool {
        if self.is_full() {
            self.count_dropped(1);
            return false;
        }
        self.vs_vertices.push(vertex);
        true
    }

    /// Append the four corners of a quad, or none of them
    pub fn push_quad(&mut self, quad: [V; 4]) -> bool {
        if self.remaining() < 4 {
            self.count_dropped(4);
            return false;
        }
        self.vs_vertices.extend_from_slice(&quad);
        true
    }

    pub fn clear(&mut self) {
        self.vs_vertices.clear();
    }
}

impl<V: Copy> Default for VertexSpan<V> {
    fn default() -> Self {
        Self::new(MAX_VERTICES)
    }
}
