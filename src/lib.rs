#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # Waycapture: screen capture arbitration for Wayland compositors
//!
//! This crate implements the compositor-side negotiation logic for a screen
//! capture protocol extension: clients ask to capture pixel content (a whole
//! output, a window, a surface, or an arbitrary screen region), and the
//! compositor decides what they may capture, serializes the interactive
//! "pick a source" step, and hands captured pixel buffers back.
//!
//! ## Structure of the crate
//!
//! - [`capture`] contains the core: the [`CaptureState`](capture::CaptureState)
//!   arbiter, the [`CaptureHandler`](capture::CaptureHandler) trait your
//!   compositor state implements, and the capture context and source types.
//! - [`output`] and [`surface`] provide the entity handles capture sources are
//!   backed by. If your compositor already tracks outputs and surfaces, these
//!   are the capture-facing views you create for them.
//! - [`buffer`] provides the CPU pixel buffer used at this boundary and the
//!   [`FrameSource`](buffer::FrameSource) trait connecting the arbiter to your
//!   renderer's most recent composited frame.
//! - [`utils`] contains geometry and lifetime plumbing shared by the above.
//!
//! The wire protocol is deliberately not part of this crate: incoming client
//! requests are delivered by calling the entry points on
//! [`CaptureState`](capture::CaptureState), and outgoing events are delivered
//! through the [`ContextClient`](capture::ContextClient) sink you supply per
//! connection. Any serialization layer can drive this interface.
//!
//! ## Logging
//!
//! Waycapture uses [`tracing`] for its internal logging. Compositors that want
//! log output only need to install a subscriber.

pub mod buffer;
pub mod capture;
pub mod output;
pub mod surface;
pub mod utils;
