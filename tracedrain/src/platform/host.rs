//! x86 host platform
//!
//! Trace buffers live in card memory, so the only cap is the memory bank
//! check the Session Manager already performs.

use super::{PlatformAccess, PlatformSettings};
use crate::device::DeviceMetadata;

pub struct HostPlatform {
    settings: PlatformSettings,
}

impl HostPlatform {
    #[must_use]
    pub fn new(settings: PlatformSettings) -> Self {
        Self { settings }
    }
}

impl PlatformAccess for HostPlatform {
    fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut PlatformSettings {
        &mut self.settings
    }

    fn is_edge(&self) -> bool {
        false
    }

    fn check_trace_buf_size(&self, requested: u64, _metadata: &DeviceMetadata) -> u64 {
        requested
    }
}
