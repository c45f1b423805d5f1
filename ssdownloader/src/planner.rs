//! Segment request planning.
//!
//! The download-urls endpoint hands out at most 25 pre-signed URLs per call
//! and misbehaves silently above that, so a file's parts are requested in
//! consecutive 1-indexed batches of that width.

/// Maximum number of segments requested in one download-urls call.
pub const MAX_SEGMENTS_PER_REQUEST: u32 = 25;

/// A contiguous, inclusive range of segment numbers for one API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRequestBatch {
    pub start_segment: u32,
    pub end_segment: u32,
}

impl PartRequestBatch {
    /// Number of segments covered by this batch.
    pub fn len(&self) -> u32 {
        self.end_segment - self.start_segment + 1
    }

    /// Batches always cover at least one segment.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Partition `part_count` segments into request batches.
///
/// Returns an empty plan for zero parts.
pub fn plan(part_count: u32) -> Vec<PartRequestBatch> {
    (1..=part_count)
        .step_by(MAX_SEGMENTS_PER_REQUEST as usize)
        .map(|start| PartRequestBatch {
            start_segment: start,
            end_segment: (start + MAX_SEGMENTS_PER_REQUEST - 1).min(part_count),
        })
        .collect()
}
