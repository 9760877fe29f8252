//! Range planning.
//!
//! Splits a requested byte range into an ordered list of local reads and
//! remote fetches, given the chunk records already on disk for the
//! resource. Planning is pure: no I/O, no clock.
//!
//! ```text
//! request    [0 ................................. 100)
//! chunks            [20 ..... 40)        [60 .. 80)
//! plan       Fetch  Local          Fetch  Local   Fetch
//!            [0,20) [20,40)        [40,60)[60,80) [80,100)
//! ```
//!
//! A fetch that fills the gap in front of a chunk asks the origin for one
//! byte more than it delivers. That byte is persisted with the fetched
//! chunk so adjacent chunks on disk always overlap instead of leaving a
//! hole when an origin rounds a range short.

use core_index::{ByteRange, ChunkRecord};
use tracing::warn;

/// Extra bytes requested past a gap that ends at a cached chunk.
pub const GAP_FETCH_OVERLAP: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// Serve `range` (absolute offsets) from `chunk`'s file.
    LocalRead { chunk: ChunkRecord, range: ByteRange },

    /// Fetch `range` from the origin. The request extends `overlap` bytes
    /// past `range.end`; those bytes are stored but never delivered.
    RemoteFetch { range: ByteRange, overlap: u64 },
}

impl PlanStep {
    /// Absolute range delivered to the consumer by this step.
    pub fn range(&self) -> ByteRange {
        match self {
            PlanStep::LocalRead { range, .. } | PlanStep::RemoteFetch { range, .. } => *range,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, PlanStep::RemoteFetch { .. })
    }

    /// Range requested from the origin, overlap included.
    pub fn fetch_range(&self) -> Option<ByteRange> {
        match self {
            PlanStep::RemoteFetch { range, overlap } => {
                Some(ByteRange::new(range.start, range.end + overlap))
            }
            PlanStep::LocalRead { .. } => None,
        }
    }
}

/// Ordered steps covering `requested`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub requested: ByteRange,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn remote_fetches(&self) -> usize {
        self.steps.iter().filter(|step| step.is_remote()).count()
    }

    pub fn is_fully_local(&self) -> bool {
        self.remote_fetches() == 0
    }
}

/// True when `chunk` has nothing to offer for `[cursor, end)`.
///
/// Chunks are not guaranteed to be gapless, so an irrelevant chunk is
/// skipped and the walk goes on; a later chunk may still intersect.
pub fn is_out_of_range(chunk: &ChunkRecord, cursor: u64, end: u64) -> bool {
    let chunk_end = chunk.end_offset();
    let intersects = chunk.start_offset < end && chunk_end > cursor;
    let contains = chunk.start_offset <= cursor && chunk_end >= end;
    !(intersects || contains)
}

/// Plan `requested` against `chunks`, which must be sorted by start offset.
pub fn plan(requested: ByteRange, chunks: &[ChunkRecord]) -> Plan {
    let end = requested.end;
    let mut cursor = requested.start;
    let mut steps = Vec::new();

    for chunk in chunks {
        if cursor >= end {
            break;
        }

        if chunk.length == 0 {
            warn!(
                resource_id = %chunk.resource_id,
                start = chunk.start_offset,
                file = %chunk.file_name,
                "Skipping zero-length chunk record"
            );
            continue;
        }

        if is_out_of_range(chunk, cursor, end) {
            continue;
        }

        if cursor < chunk.start_offset {
            steps.push(PlanStep::RemoteFetch {
                range: ByteRange::new(cursor, chunk.start_offset),
                overlap: GAP_FETCH_OVERLAP,
            });
            cursor = chunk.start_offset;
        }

        let local_start = cursor - chunk.start_offset;
        let useful = (chunk.length - local_start).min(end - cursor);
        if useful == 0 {
            continue;
        }

        steps.push(PlanStep::LocalRead {
            chunk: chunk.clone(),
            range: ByteRange::new(cursor, cursor + useful),
        });
        cursor += useful;
    }

    if cursor < end {
        steps.push(PlanStep::RemoteFetch {
            range: ByteRange::new(cursor, end),
            overlap: 0,
        });
    }

    Plan { requested, steps }
}

/// True when `chunks` cover `[0, content_length)` with no fetch needed.
pub fn is_fully_covered(content_length: u64, chunks: &[ChunkRecord]) -> bool {
    if content_length == 0 || chunks.is_empty() {
        return false;
    }
    plan(ByteRange::new(0, content_length), chunks).is_fully_local()
}
