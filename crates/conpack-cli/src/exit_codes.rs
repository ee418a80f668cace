//! Exit codes of the `conpack` binary. Part of the public contract: the
//! orchestrating workflow branches on them.

use conpack_core::GenerationOutcome;

pub const SUCCESS: i32 = 0; // Every selected rule packed
pub const PARTIAL: i32 = 1; // Packs written, but some rules failed or batches are missing
pub const CONFIG_ERROR: i32 = 2; // Bad flags, config file, or unreadable inputs
pub const UNAVAILABLE: i32 = 3; // No packs could be generated, or a batch failed outright

pub fn for_outcome(outcome: &GenerationOutcome) -> i32 {
    match outcome {
        GenerationOutcome::Generated { .. } => SUCCESS,
        GenerationOutcome::PartiallyGenerated { .. } => PARTIAL,
        GenerationOutcome::Unavailable { .. } => UNAVAILABLE,
    }
}
