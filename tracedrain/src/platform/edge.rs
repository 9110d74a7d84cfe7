//! Embedded SoC platform
//!
//! Trace buffers are allocated from the processing system's contiguous
//! memory pool, which the application needs too. Requests reaching
//! [`PS_MEMORY_MAX_PERCENT`] of that pool are limited to it.

use tracedrain_common::PS_MEMORY_MAX_PERCENT;

use super::{PlatformAccess, PlatformSettings};
use crate::device::DeviceMetadata;

pub struct EdgePlatform {
    settings: PlatformSettings,
}

impl EdgePlatform {
    #[must_use]
    pub fn new(settings: PlatformSettings) -> Self {
        Self { settings }
    }
}

impl PlatformAccess for EdgePlatform {
    fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut PlatformSettings {
        &mut self.settings
    }

    fn is_edge(&self) -> bool {
        true
    }

    fn check_trace_buf_size(&self, requested: u64, metadata: &DeviceMetadata) -> u64 {
        let ps_memory = metadata.ps_memory_size;
        if ps_memory == 0 {
            return requested;
        }

        let percent = u128::from(requested) * 100 / u128::from(ps_memory);
        if percent < u128::from(PS_MEMORY_MAX_PERCENT) {
            return requested;
        }

        let limit = u128::from(ps_memory) * u128::from(PS_MEMORY_MAX_PERCENT) / 100;
        u64::try_from(limit).unwrap_or(requested).min(requested)
    }
}
