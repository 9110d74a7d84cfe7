//! Trace buffer size negotiation
//!
//! The buffer actually allocated is the configured request, bounded to the
//! supported range, then capped by the backing memory bank and finally by
//! the platform.

use tracedrain_common::{TS2MM_MAX_BUF_SIZE, TS2MM_MIN_BUF_SIZE};

use super::Diagnostic;
use crate::device::MemoryResource;
use crate::domain::{ByteSize, DeviceId};

/// Bound the configured request to the range the datamover supports
#[must_use]
pub fn bound_request(requested: ByteSize) -> (u64, Option<Diagnostic>) {
    let requested = requested.bytes();
    if requested < TS2MM_MIN_BUF_SIZE {
        (TS2MM_MIN_BUF_SIZE, Some(Diagnostic::RequestBelowMinimum { requested, minimum: TS2MM_MIN_BUF_SIZE }))
    } else if requested > TS2MM_MAX_BUF_SIZE {
        (TS2MM_MAX_BUF_SIZE, Some(Diagnostic::RequestAboveMaximum { requested, maximum: TS2MM_MAX_BUF_SIZE }))
    } else {
        (requested, None)
    }
}

/// Cap `requested` to the capacity of `memory`.
///
/// A missing bank or one reporting zero capacity leaves the request as is.
/// A diagnostic is returned exactly when the request is lowered.
#[must_use]
pub fn cap_to_memory(
    device: DeviceId,
    requested: u64,
    memory: Option<&MemoryResource>,
) -> (u64, Option<Diagnostic>) {
    match memory {
        Some(memory) if memory.capacity > 0 && requested > memory.capacity => {
            (memory.capacity, Some(Diagnostic::BufferClamped { device, limit: memory.capacity }))
        }
        _ => (requested, None),
    }
}
