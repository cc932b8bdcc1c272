//! Capture contexts
//!
//! A [`CaptureContext`] represents one client's in-flight request to capture
//! screen content: the selection parameters the client sent, the phase the
//! request is in, and, once selection resolved, the bound capture source.
//!
//! Contexts are handles; the [`CaptureState`](super::CaptureState) keeps one
//! clone per live context and the transport glue keeps another for routing
//! incoming requests. Outcome events travel to the owning client through the
//! [`ContextClient`] sink supplied at registration.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::buffer::PixelBuffer;
use crate::capture::source::{CaptureSource, CaptureSourceType, SourceError};
use crate::surface::WeakSurface;
use crate::utils::ids::id_gen;
use crate::utils::{IsAlive, Logical, Rectangle};

id_gen!(context_ids);

/// Why a selection attempt could not produce a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFailure {
    /// Another context already holds the interactive selection
    SelectorBusy,
    /// The selection failed for a reason unrelated to lock contention, e.g.
    /// the user dismissed the selector or no eligible source existed
    Other,
}

/// The transport-side event sink of one capture context
///
/// One boxed instance is supplied per context at registration; this is how
/// outcome events reach the owning client connection. Implementations
/// serialize these into whatever wire protocol they speak. Both events are
/// one-way notifications and must not call back into the arbiter.
pub trait ContextClient: fmt::Debug + Send {
    /// The context was bound to a source
    ///
    /// Carries the source's capture rectangle and type tag, which is all a
    /// client needs to allocate a matching buffer for the later copy.
    fn source_ready(&self, region: Rectangle<i32, Logical>, source_type: CaptureSourceType);

    /// The selection attempt failed
    fn source_failed(&self, failure: SourceFailure);
}

/// Selection parameters, fixed at the moment the client requests selection
#[derive(Debug, Clone, Default)]
pub struct SelectInfo {
    /// Surface to exclude from (or overlay during) the selection UI
    ///
    /// Held weakly; the context never owns the mask surface.
    pub mask: Option<WeakSurface>,
    /// Snapshot the current frame before any selection UI is shown, so the
    /// UI is not part of the captured contents
    pub freeze: bool,
    /// Whether cursor pixels are included in the eventual capture
    pub with_cursor: bool,
    /// The set of source types the client will accept
    pub source_hint: CaptureSourceType,
}

/// Lifecycle phase of a capture context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPhase {
    /// Registered, waiting for the client to request source selection
    AwaitingSelect,
    /// Holding the interactive selection, waiting for a source to be chosen
    Selecting,
    /// Bound to a source; the ready event has been delivered. Final.
    Resolved,
    /// The last selection attempt failed; the client may request again
    Failed,
    /// The owning connection resource is gone
    Destroyed,
}

pub(super) enum BindOutcome {
    /// The source was bound and the ready event delivered
    Bound,
    /// The identical source was already bound; nothing was sent
    AlreadyBound,
    /// The context is in no phase that can accept a source
    Rejected,
}

#[derive(Debug)]
struct State {
    phase: ContextPhase,
    info: Option<SelectInfo>,
    source: Option<CaptureSource>,
}

#[derive(Debug)]
struct Inner {
    id: usize,
    client: Box<dyn ContextClient>,
    state: Mutex<State>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        context_ids::remove(self.id);
    }
}

/// One client's in-flight capture request
///
/// Cheap to clone; all clones refer to the same request. Equality and hashing
/// go by the context's unique id.
#[derive(Debug, Clone)]
pub struct CaptureContext {
    inner: Arc<Inner>,
}

impl CaptureContext {
    pub(super) fn new(client: Box<dyn ContextClient>) -> CaptureContext {
        CaptureContext {
            inner: Arc::new(Inner {
                id: context_ids::next(),
                client,
                state: Mutex::new(State {
                    phase: ContextPhase::AwaitingSelect,
                    info: None,
                    source: None,
                }),
            }),
        }
    }

    /// Opaque id correlating this context to its originating connection
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// The phase this request is currently in
    pub fn phase(&self) -> ContextPhase {
        self.inner.state.lock().unwrap().phase
    }

    /// The selection parameters, once the client has requested selection
    ///
    /// `None` until the first select request; parameters must not be assumed
    /// valid before that.
    pub fn select_info(&self) -> Option<SelectInfo> {
        self.inner.state.lock().unwrap().info.clone()
    }

    /// The mask surface of this request, if any
    pub fn mask(&self) -> Option<WeakSurface> {
        self.inner.state.lock().unwrap().info.as_ref().and_then(|i| i.mask.clone())
    }

    /// Whether this request asked for a pre-selection frame snapshot
    pub fn freeze(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap()
            .info
            .as_ref()
            .map(|i| i.freeze)
            .unwrap_or(false)
    }

    /// Whether cursor pixels are included in the eventual capture
    pub fn with_cursor(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap()
            .info
            .as_ref()
            .map(|i| i.with_cursor)
            .unwrap_or(false)
    }

    /// The source types the client will accept
    ///
    /// Empty until the client has requested selection.
    pub fn source_hint(&self) -> CaptureSourceType {
        self.inner
            .state
            .lock()
            .unwrap()
            .info
            .as_ref()
            .map(|i| i.source_hint)
            .unwrap_or(CaptureSourceType::empty())
    }

    /// Whether the given source type is in the client's hint set
    pub fn hint_allows(&self, source_type: CaptureSourceType) -> bool {
        self.source_hint().contains(source_type)
    }

    /// The capture source this context resolved to, if any
    pub fn source(&self) -> Option<CaptureSource> {
        self.inner.state.lock().unwrap().source.clone()
    }

    /// Copy the bound source's current contents into a client-supplied buffer
    ///
    /// Fails with [`SourceError::Unavailable`] when the context never
    /// resolved or the backing entity is gone.
    pub fn copy_into(&self, target: &mut PixelBuffer) -> Result<(), SourceError> {
        let source = self.source().ok_or(SourceError::Unavailable)?;
        source.copy_into(target)
    }

    /// Store the parameters of a new selection attempt
    ///
    /// Only legal while waiting for a select request or after a failed
    /// attempt; returns whether the attempt may proceed.
    pub(super) fn start_select(&self, info: SelectInfo) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        match state.phase {
            ContextPhase::AwaitingSelect | ContextPhase::Failed => {
                state.info = Some(info);
                true
            }
            phase => {
                drop(state);
                warn!(id = self.inner.id, ?phase, "Ignoring select request in this phase");
                false
            }
        }
    }

    /// The selection lock was granted to this context
    pub(super) fn enter_selecting(&self) {
        self.inner.state.lock().unwrap().phase = ContextPhase::Selecting;
    }

    /// Reject this attempt because another context holds the selection
    ///
    /// Sends the busy failure; the context stays eligible for a later fresh
    /// select request.
    pub(super) fn reject_busy(&self) {
        self.inner.state.lock().unwrap().phase = ContextPhase::Failed;
        self.inner.client.source_failed(SourceFailure::SelectorBusy);
    }

    /// Bind the chosen source and notify the client
    pub(super) fn finish_bind(&self, source: CaptureSource) -> BindOutcome {
        let mut state = self.inner.state.lock().unwrap();
        match state.phase {
            ContextPhase::Selecting => {
                let region = source.capture_region();
                let source_type = source.source_type();
                state.source = Some(source);
                state.phase = ContextPhase::Resolved;
                drop(state);
                debug!(id = self.inner.id, ?source_type, "Capture context resolved");
                self.inner.client.source_ready(region, source_type);
                BindOutcome::Bound
            }
            ContextPhase::Resolved if state.source.as_ref() == Some(&source) => BindOutcome::AlreadyBound,
            phase => {
                drop(state);
                warn!(
                    id = self.inner.id,
                    ?phase,
                    "Refusing to bind a source to a context outside selection"
                );
                BindOutcome::Rejected
            }
        }
    }

    /// Fail the running selection attempt and notify the client
    pub(super) fn finish_fail(&self, failure: SourceFailure) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        match state.phase {
            ContextPhase::Selecting => {
                state.phase = ContextPhase::Failed;
                drop(state);
                debug!(id = self.inner.id, ?failure, "Capture context selection failed");
                self.inner.client.source_failed(failure);
                true
            }
            phase => {
                drop(state);
                warn!(id = self.inner.id, ?phase, "No selection attempt to fail");
                false
            }
        }
    }

    /// The owning connection resource went away; no further events may be
    /// delivered for this context
    pub(super) fn mark_destroyed(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.phase = ContextPhase::Destroyed;
        // release the bound source along with the context
        state.source = None;
    }
}

impl IsAlive for CaptureContext {
    #[inline]
    fn alive(&self) -> bool {
        self.phase() != ContextPhase::Destroyed
    }
}

impl PartialEq for CaptureContext {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for CaptureContext {}

impl Hash for CaptureContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{FrameHandle, PixelBuffer};
    use crate::capture::source::RegionSource;
    use drm_fourcc::DrmFourcc;

    #[derive(Debug, Clone, PartialEq)]
    enum ClientEvent {
        Ready(Rectangle<i32, Logical>, CaptureSourceType),
        Failed(SourceFailure),
    }

    #[derive(Debug, Default)]
    struct Recorder(Arc<Mutex<Vec<ClientEvent>>>);

    impl ContextClient for Recorder {
        fn source_ready(&self, region: Rectangle<i32, Logical>, source_type: CaptureSourceType) {
            self.0.lock().unwrap().push(ClientEvent::Ready(region, source_type));
        }

        fn source_failed(&self, failure: SourceFailure) {
            self.0.lock().unwrap().push(ClientEvent::Failed(failure));
        }
    }

    fn recorded_context() -> (CaptureContext, Arc<Mutex<Vec<ClientEvent>>>) {
        let recorder = Recorder::default();
        let events = recorder.0.clone();
        (CaptureContext::new(Box::new(recorder)), events)
    }

    fn region_source() -> CaptureSource {
        let frame = Arc::new(PixelBuffer::new((64, 64).into(), DrmFourcc::Argb8888).unwrap());
        CaptureSource::Region(RegionSource::new(
            FrameHandle::Frozen(frame),
            Rectangle::from(((0, 0), (32, 32))),
        ))
    }

    #[test]
    fn parameters_are_unset_before_select() {
        let (context, _) = recorded_context();
        assert!(context.select_info().is_none());
        assert!(!context.freeze());
        assert!(!context.with_cursor());
        assert_eq!(context.source_hint(), CaptureSourceType::empty());
        assert!(!context.hint_allows(CaptureSourceType::OUTPUT));
    }

    #[test]
    fn hint_allows_is_strict_membership() {
        let (context, _) = recorded_context();
        assert!(context.start_select(SelectInfo {
            source_hint: CaptureSourceType::OUTPUT | CaptureSourceType::REGION,
            ..Default::default()
        }));
        assert!(context.hint_allows(CaptureSourceType::OUTPUT));
        assert!(context.hint_allows(CaptureSourceType::REGION));
        assert!(!context.hint_allows(CaptureSourceType::WINDOW));
    }

    #[test]
    fn bind_outside_selection_is_rejected() {
        let (context, events) = recorded_context();
        assert!(matches!(context.finish_bind(region_source()), BindOutcome::Rejected));
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn bind_delivers_exactly_one_ready_event() {
        let (context, events) = recorded_context();
        assert!(context.start_select(SelectInfo::default()));
        context.enter_selecting();

        let source = region_source();
        assert!(matches!(context.finish_bind(source.clone()), BindOutcome::Bound));
        assert!(matches!(context.finish_bind(source), BindOutcome::AlreadyBound));

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![ClientEvent::Ready(
                Rectangle::from(((0, 0), (32, 32))),
                CaptureSourceType::REGION
            )]
        );
    }

    #[test]
    fn resolved_context_is_final() {
        let (context, events) = recorded_context();
        assert!(context.start_select(SelectInfo::default()));
        context.enter_selecting();
        assert!(matches!(context.finish_bind(region_source()), BindOutcome::Bound));

        // a second select attempt on a resolved context is refused
        assert!(!context.start_select(SelectInfo::default()));
        assert!(!context.finish_fail(SourceFailure::Other));
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn destroyed_context_drops_its_source() {
        let (context, _) = recorded_context();
        assert!(context.start_select(SelectInfo::default()));
        context.enter_selecting();
        assert!(matches!(context.finish_bind(region_source()), BindOutcome::Bound));

        context.mark_destroyed();
        assert!(!context.alive());
        assert!(context.source().is_none());

        let mut target = PixelBuffer::new((32, 32).into(), DrmFourcc::Argb8888).unwrap();
        assert!(matches!(context.copy_into(&mut target), Err(SourceError::Unavailable)));
    }
}
