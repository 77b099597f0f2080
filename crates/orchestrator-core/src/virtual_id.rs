//! Encode/decode virtual block ids for parallel iterations.
//!
//! Format: `{originalId}_parallel_{parallelId}_iteration_{N}`.

use crate::model::BlockId;

const PARALLEL_MARKER: &str = "_parallel_";
const ITERATION_MARKER: &str = "_iteration_";

pub fn build_virtual_id(original_id: &BlockId, parallel_id: &BlockId, iteration: u32) -> BlockId {
    BlockId::new(format!(
        "{original_id}{PARALLEL_MARKER}{parallel_id}{ITERATION_MARKER}{iteration}"
    ))
}

pub fn is_virtual(id: &BlockId) -> bool {
    id.as_str().contains(PARALLEL_MARKER) && id.as_str().contains(ITERATION_MARKER)
}

/// Returns the id a block would have outside any parallel iteration.
pub fn extract_original_id(id: &BlockId) -> BlockId {
    match id.as_str().find(PARALLEL_MARKER) {
        Some(idx) => BlockId::new(&id.as_str()[..idx]),
        None => id.clone(),
    }
}

/// Fully decomposes a virtual id into `(original, parallel_id, iteration)`.
pub fn decode(id: &BlockId) -> Option<(BlockId, BlockId, u32)> {
    let s = id.as_str();
    let parallel_idx = s.find(PARALLEL_MARKER)?;
    let after_parallel = &s[parallel_idx + PARALLEL_MARKER.len()..];
    let iteration_idx = after_parallel.find(ITERATION_MARKER)?;
    let parallel_id = &after_parallel[..iteration_idx];
    let iteration_str = &after_parallel[iteration_idx + ITERATION_MARKER.len()..];
    let iteration: u32 = iteration_str.parse().ok()?;
    Some((
        BlockId::new(&s[..parallel_idx]),
        BlockId::new(parallel_id),
        iteration,
    ))
}
