//! # tracedrain - Per-device AIE trace offload
//!
//! tracedrain moves trace data out of small on-device trace buffers into
//! trace files while the device keeps running. One session exists per
//! activated device; it decides the buffer size, allocates one buffer per
//! trace stream, optionally drains them continuously from a background
//! thread, and tears everything down exactly once.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                Host runtime (device load / unload)              │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ activated / flush / finish / shutdown
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Session Manager                            │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Platform   │   │   Device     │   │   Buffer     │         │
//! │  │  (host/edge) │   │  Registry    │   │   sizing     │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │                         │ one per device                        │
//! │                         ▼                                       │
//! │                ┌──────────────────┐                             │
//! │                │ Offload          │──▶ offload thread           │
//! │                │ Coordinator      │    (continuous mode)        │
//! │                └────────┬─────────┘                             │
//! └─────────────────────────┼───────────────────────────────────────┘
//!            read / release │                 │ TracePacket
//!                           ▼                 ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │   Device Interface           │  │  Trace Sink / Writers        │
//! │   (TS2MM buffers)            │  │  aie_trace_<dev>_<n>.txt     │
//! └──────────────────────────────┘  └──────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`session`]: Session Manager, device sessions, buffer sizing, diagnostics
//! - [`offload`]: Offload Coordinator and its background thread
//! - [`platform`]: platform capability variants (`host`, `edge`)
//! - [`device`]: device handle and Device Interface traits, registry,
//!   simulated device
//! - [`sink`]: the [`sink::TraceSink`] trait and an in-memory sink
//! - [`writer`]: trace and config files, file registry, periodic dump
//! - [`config`]: TOML configuration
//! - [`cli`]: command-line arguments of the `tracedrain` binary
//! - [`domain`]: core types and errors
//!
//! ## Offload state machine
//!
//! ```text
//! Idle ──start_offload──▶ Running ──stop_offload──▶ Stopped
//! ```
//!
//! `Stopped` is terminal. The final drain and buffer release only happen
//! once the background thread has been observed `Stopped` and joined.

pub mod cli;
pub mod config;
pub mod device;
pub mod domain;
pub mod offload;
pub mod platform;
pub mod session;
pub mod sink;
pub mod writer;
