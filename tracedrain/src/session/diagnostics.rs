//! Non-fatal conditions reported during a session's life
//!
//! None of these stop other devices from being traced. Each one is logged as
//! a warning when reported and kept by the Session Manager for inspection.

use log::warn;
use std::fmt;

use crate::domain::{DeviceId, FlowKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Configured size raised to the smallest usable buffer
    RequestBelowMinimum { requested: u64, minimum: u64 },
    /// Configured size lowered to the largest supported buffer
    RequestAboveMaximum { requested: u64, maximum: u64 },
    /// Request exceeded the capacity of the memory bank backing the buffer
    BufferClamped { device: DeviceId, limit: u64 },
    /// Request reached `max_percent` of the device's PS memory and was
    /// lowered to that share
    PlatformCapped { device: DeviceId, requested: u64, max_percent: u64, limit: u64 },
    ZeroStreams { device: DeviceId },
    ContinuousUnsupported { device: DeviceId, flow: FlowKind },
    AllocationFailed { device: DeviceId, reason: String },
    DeviceInterfaceUnavailable { device: DeviceId, reason: String },
    OutputUnavailable { device: DeviceId, reason: String },
    /// Sticky overflow seen on at least one stream before finish
    BufferFull { device: DeviceId },
}

impl Diagnostic {
    /// Device the diagnostic concerns, if any
    #[must_use]
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            Self::RequestBelowMinimum { .. } | Self::RequestAboveMaximum { .. } => None,
            Self::BufferClamped { device, .. }
            | Self::PlatformCapped { device, .. }
            | Self::ZeroStreams { device }
            | Self::ContinuousUnsupported { device, .. }
            | Self::AllocationFailed { device, .. }
            | Self::DeviceInterfaceUnavailable { device, .. }
            | Self::OutputUnavailable { device, .. }
            | Self::BufferFull { device } => Some(*device),
        }
    }

    /// Log the diagnostic
    pub fn report(&self) {
        warn!("{self}");
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestBelowMinimum { requested, minimum } => write!(
                f,
                "Requested AIE trace buffer of {requested} bytes is below the minimum. Using {minimum}."
            ),
            Self::RequestAboveMaximum { requested, maximum } => write!(
                f,
                "Requested AIE trace buffer of {requested} bytes is above the maximum. Using {maximum}."
            ),
            Self::BufferClamped { limit, .. } => {
                write!(f, "Requested AIE trace buffer is too big for memory resource. Limiting to {limit}.")
            }
            Self::PlatformCapped { requested, max_percent, limit, .. } => write!(
                f,
                "Requested AIE trace buffer of {requested} bytes is {max_percent}% or more of device memory. \
                 Limiting to {limit}."
            ),
            Self::ZeroStreams { .. } => write!(
                f,
                "Neither PLIO nor GMIO trace infrastructure is found in the given design. \
                 So, AIE event trace will not be available."
            ),
            Self::ContinuousUnsupported { flow, .. } => write!(
                f,
                "Continuous offload of AIE Trace is not supported for {flow} mode. \
                 So, AIE Trace for {flow} mode will be offloaded only at the end of application."
            ),
            Self::AllocationFailed { device, reason } => write!(
                f,
                "Allocation of buffer for AIE trace failed. AIE trace will not be available. \
                 (device {device}: {reason})"
            ),
            Self::DeviceInterfaceUnavailable { device, reason } => {
                write!(f, "Unable to read debug IP layout for device {device}: {reason}")
            }
            Self::OutputUnavailable { device, reason } => {
                write!(f, "Unable to create AIE trace output for device {device}: {reason}")
            }
            Self::BufferFull { .. } => write!(
                f,
                "AIE Trace Buffer is full. Device trace could be incomplete. \
                 Please increase trace buffer size and/or offload rate."
            ),
        }
    }
}
