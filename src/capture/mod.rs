//! Screen capture arbitration
//!
//! This module implements the compositor-side core of a screen capture
//! protocol extension: it tracks every outstanding capture request as a
//! [`CaptureContext`], guarantees that at most one request is in the
//! interactive source-selection step at any time, associates a request with a
//! concrete [`CaptureSource`] once one is chosen, and reports the outcome
//! back to the requesting client.
//!
//! ## Overview
//!
//! 1. The transport reports a new capture request; the compositor registers a
//!    context with [`CaptureState::register_context`], supplying the
//!    [`ContextClient`] sink outcome events are delivered through.
//! 2. The client asks to pick a source; the compositor forwards this as
//!    [`CaptureState::select_requested`]. The context is either granted the
//!    selection, becoming [`CaptureState::active_selection`], or failed
//!    immediately with [`SourceFailure::SelectorBusy`]. There is no queue: a
//!    rejected client issues a fresh request once the selection is free.
//! 3. If the request asked to freeze, the current frame is snapshotted
//!    before any listener can put a selector on screen, and
//!    [`CaptureState::selection_frames`] hands that snapshot out for source
//!    construction during this selection episode.
//! 4. The selection UI (or automation) picks a source and calls
//!    [`CaptureState::bind_source`]; the context reports `source_ready` to
//!    its client and the selection is released in the same step. Failure
//!    ([`CaptureState::fail_selection`]) releases it the same way.
//! 5. The transport later copies pixels through
//!    [`CaptureContext::copy_into`] against the bound source.
//!
//! Destroying a context at any point ([`CaptureState::unregister_context`])
//! drops it from arbitration and releases the selection if it held it.
//!
//! ## How to use it
//!
//! ```
//! use std::sync::Arc;
//! use waycapture::buffer::{FrameSource, PixelBuffer};
//! use waycapture::capture::{
//!     CaptureHandler, CaptureSource, CaptureSourceType, CaptureState, ContextClient,
//!     OutputSource, SelectInfo, SourceFailure,
//! };
//! use waycapture::output::Output;
//! use waycapture::utils::{Logical, Rectangle};
//!
//! struct State {
//!     capture: CaptureState,
//! }
//!
//! impl CaptureHandler for State {
//!     fn capture_state(&mut self) -> &mut CaptureState {
//!         &mut self.capture
//!     }
//! }
//!
//! // The transport half of one client connection.
//! #[derive(Debug)]
//! struct Connection;
//!
//! impl ContextClient for Connection {
//!     fn source_ready(&self, region: Rectangle<i32, Logical>, source_type: CaptureSourceType) {
//!         // serialize the ready event onto the wire
//!         let _ = (region, source_type);
//!     }
//!
//!     fn source_failed(&self, failure: SourceFailure) {
//!         let _ = failure;
//!     }
//! }
//!
//! // The renderer half: hands out the most recent composited frame.
//! #[derive(Debug)]
//! struct Renderer;
//!
//! impl FrameSource for Renderer {
//!     fn current_frame(&self) -> Option<Arc<PixelBuffer>> {
//!         None // nothing rendered yet
//!     }
//! }
//!
//! let mut state = State { capture: CaptureState::new() };
//! state.capture.set_frame_source(Arc::new(Renderer));
//!
//! // a client opened a capture context and asked to pick a source
//! let context = CaptureState::register_context(&mut state, Box::new(Connection));
//! CaptureState::select_requested(
//!     &mut state,
//!     &context,
//!     SelectInfo {
//!         source_hint: CaptureSourceType::OUTPUT,
//!         ..Default::default()
//!     },
//! );
//! assert_eq!(state.capture.active_selection(), Some(&context));
//!
//! // the selection UI picked an output
//! let output = Output::new(
//!     "eDP-1".into(),
//!     "Built-in display".into(),
//!     Rectangle::from(((0, 0), (1920, 1080))),
//! );
//! let frames = state.capture.selection_frames().unwrap();
//! CaptureState::bind_source(
//!     &mut state,
//!     &context,
//!     CaptureSource::Output(OutputSource::new(output, frames)),
//! );
//!
//! // the selection is free again
//! assert_eq!(state.capture.active_selection(), None);
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use crate::buffer::{FrameHandle, FrameSource, PixelBuffer};

pub mod context;
pub mod source;

use self::context::BindOutcome;
pub use self::context::{CaptureContext, ContextClient, ContextPhase, SelectInfo, SourceFailure};
pub use self::source::{
    CaptureSource, CaptureSourceType, OutputSource, RegionSource, SourceError, SurfaceSource,
    WindowSource,
};

/// Handler trait for capture arbitration
///
/// Implement this on your compositor state. Everything besides
/// [`capture_state`](CaptureHandler::capture_state) is a read-only
/// notification sink for projecting arbitration state into a UI; the
/// defaults do nothing, and implementations must not call back into the
/// arbitration entry points.
pub trait CaptureHandler: 'static {
    /// Returns a mutable reference to the [`CaptureState`] delegate type
    fn capture_state(&mut self) -> &mut CaptureState;

    /// A new capture context was registered
    fn new_context(&mut self, context: &CaptureContext) {
        let _ = context;
    }

    /// The set of live capture contexts changed
    ///
    /// Query [`CaptureState::contexts`] for the current list.
    fn contexts_changed(&mut self) {}

    /// A different context (or none) is now in interactive selection
    fn selection_changed(&mut self, context: Option<&CaptureContext>) {
        let _ = context;
    }
}

/// Tracks all live capture contexts and the interactive selection
///
/// All entry points are driven by the compositor's event processing, one
/// transport event at a time; the state never blocks and never calls back
/// into itself.
#[derive(Debug, Default)]
pub struct CaptureState {
    contexts: Vec<CaptureContext>,
    active_selection: Option<CaptureContext>,
    frozen_frame: Option<Arc<PixelBuffer>>,
    frames: Option<Arc<dyn FrameSource>>,
}

impl CaptureState {
    /// Create a new capture arbitration state
    pub fn new() -> CaptureState {
        Default::default()
    }

    /// Connect the renderer that serves freeze snapshots and live
    /// Output/Region captures
    pub fn set_frame_source(&mut self, frames: Arc<dyn FrameSource>) {
        self.frames = Some(frames);
    }

    /// The connected frame renderer, if any
    pub fn frame_source(&self) -> Option<&Arc<dyn FrameSource>> {
        self.frames.as_ref()
    }

    /// All live capture contexts, in request order
    pub fn contexts(&self) -> &[CaptureContext] {
        &self.contexts
    }

    /// The context currently in interactive source selection, if any
    pub fn active_selection(&self) -> Option<&CaptureContext> {
        self.active_selection.as_ref()
    }

    /// The frame frozen for the running selection episode, if any
    ///
    /// Only set while a freeze-requesting context holds the selection;
    /// discarded as soon as the episode ends.
    pub fn frozen_frame(&self) -> Option<Arc<PixelBuffer>> {
        self.frozen_frame.clone()
    }

    /// The frames Output/Region sources built for the running selection
    /// episode should capture from
    ///
    /// The frozen snapshot if the current selection froze the scene, the
    /// live renderer otherwise, `None` if no renderer is connected.
    pub fn selection_frames(&self) -> Option<FrameHandle> {
        if let Some(frozen) = self.frozen_frame.as_ref() {
            return Some(FrameHandle::Frozen(frozen.clone()));
        }
        self.frames.clone().map(FrameHandle::Live)
    }

    /// A client opened a new capture request
    ///
    /// Registers a context delivering its outcome events through `client`
    /// and returns the handle the transport uses for the follow-up requests.
    pub fn register_context<D: CaptureHandler>(
        state: &mut D,
        client: Box<dyn ContextClient>,
    ) -> CaptureContext {
        let context = CaptureContext::new(client);
        debug!(id = context.id(), "New capture context");

        state.capture_state().contexts.push(context.clone());
        state.new_context(&context);
        state.contexts_changed();
        context
    }

    /// The client of `context` asked to select a capture source
    ///
    /// Makes the selection parameters readable, then either grants the
    /// selection or rejects the attempt with
    /// [`SourceFailure::SelectorBusy`] if a different context holds it.
    /// Rejection is immediate and never queues; `active_selection` is left
    /// untouched by it.
    pub fn select_requested<D: CaptureHandler>(
        state: &mut D,
        context: &CaptureContext,
        info: SelectInfo,
    ) {
        if !state.capture_state().contexts.contains(context) {
            warn!(id = context.id(), "Select request from an unregistered context");
            return;
        }

        let freeze = info.freeze;
        if !context.start_select(info) {
            return;
        }

        let cap = state.capture_state();
        if let Some(holder) = cap.active_selection.as_ref() {
            debug!(
                id = context.id(),
                holder = holder.id(),
                "Selection already in progress, rejecting"
            );
            context.reject_busy();
            return;
        }

        context.enter_selecting();
        cap.active_selection = Some(context.clone());
        debug!(id = context.id(), "Granted selection");

        if freeze {
            // Snapshot before anyone can put a selector on screen; later
            // frames will already contain the selection UI.
            cap.frozen_frame = match cap.frames.as_ref() {
                Some(frames) => {
                    let frame = frames.current_frame();
                    if frame.is_none() {
                        warn!(id = context.id(), "Freeze requested but the renderer has no frame yet");
                    } else {
                        debug!(id = context.id(), "Froze current frame for selection");
                    }
                    frame
                }
                None => {
                    warn!(id = context.id(), "Freeze requested but no frame source is connected");
                    None
                }
            };
        }

        state.selection_changed(Some(context));
    }

    /// A source was chosen for `context`
    ///
    /// Binds the source, delivers `source_ready` to the client and releases
    /// the selection, all as one step. Binding the identical source again is
    /// a no-op; calling this for a context that does not hold the selection
    /// is refused without touching arbitration state.
    pub fn bind_source<D: CaptureHandler>(
        state: &mut D,
        context: &CaptureContext,
        source: CaptureSource,
    ) {
        let holds = state.capture_state().active_selection.as_ref() == Some(context);
        match context.finish_bind(source) {
            BindOutcome::Bound => {
                debug_assert!(holds, "a context resolved without holding the selection");
                Self::finish_selection(state, context);
            }
            BindOutcome::AlreadyBound | BindOutcome::Rejected => {}
        }
    }

    /// The selection attempt of `context` failed
    ///
    /// Delivers `source_failed` to the client and releases the selection
    /// exactly like a successful bind would.
    pub fn fail_selection<D: CaptureHandler>(
        state: &mut D,
        context: &CaptureContext,
        failure: SourceFailure,
    ) {
        if context.finish_fail(failure) {
            Self::finish_selection(state, context);
        }
    }

    /// The connection resource behind `context` was torn down
    ///
    /// Removes the context from arbitration in the same step; if it held the
    /// selection, the selection is released. No events are delivered for a
    /// destroyed context.
    pub fn unregister_context<D: CaptureHandler>(state: &mut D, context: &CaptureContext) {
        let cap = state.capture_state();
        let Some(index) = cap.contexts.iter().position(|c| c == context) else {
            return;
        };
        cap.contexts.remove(index);
        context.mark_destroyed();
        debug!(id = context.id(), "Capture context destroyed");

        let held = cap.active_selection.as_ref() == Some(context);
        if held {
            cap.active_selection = None;
            cap.frozen_frame = None;
        }

        state.contexts_changed();
        if held {
            state.selection_changed(None);
        }
    }

    /// Clear the selection if `context` still holds it
    ///
    /// Idempotent; a context that never held the selection clears nothing.
    fn finish_selection<D: CaptureHandler>(state: &mut D, context: &CaptureContext) {
        let cap = state.capture_state();
        if cap.active_selection.as_ref() == Some(context) {
            cap.active_selection = None;
            // the frozen frame is scoped to this episode
            cap.frozen_frame = None;
            state.selection_changed(None);
        }
    }
}
