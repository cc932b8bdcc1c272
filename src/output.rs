//! Output
//!
//! This module provides a type helping you to abstract over the display
//! outputs of your compositor, as far as screen capture is concerned: a name,
//! a description and a position in the global logical space. If your
//! compositor already has a richer output representation, create one
//! [`Output`] handle per display and keep its geometry in sync.
//!
//! Outputs are the backing entities of whole-output capture sources; once an
//! output is [destroyed](Output::destroy), every source backed by it reports
//! the backing entity as gone.

use std::{
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, Weak},
};

use tracing::{info, instrument};

use crate::utils::{AliveTracker, IsAlive, Logical, Rectangle};

#[derive(Debug)]
struct Inner {
    name: String,
    description: String,
    geometry: Rectangle<i32, Logical>,
}

/// An abstract display output
///
/// This handle is cheap to clone; all clones refer to the same output.
#[derive(Debug, Clone)]
pub struct Output {
    inner: Arc<(Mutex<Inner>, AliveTracker)>,
}

/// Weak variant of an [`Output`]
///
/// Can be used to refer to a potentially already destroyed output.
#[derive(Debug, Clone)]
pub struct WeakOutput {
    inner: Weak<(Mutex<Inner>, AliveTracker)>,
}

impl Output {
    /// Create a new output with the given name, description and position in
    /// the global space
    #[instrument(skip(geometry))]
    pub fn new(name: String, description: String, geometry: Rectangle<i32, Logical>) -> Output {
        info!(name, "Creating new output");

        Output {
            inner: Arc::new((
                Mutex::new(Inner {
                    name,
                    description,
                    geometry,
                }),
                AliveTracker::default(),
            )),
        }
    }

    /// The name of this output
    pub fn name(&self) -> String {
        self.inner.0.lock().unwrap().name.clone()
    }

    /// The description of this output
    pub fn description(&self) -> String {
        self.inner.0.lock().unwrap().description.clone()
    }

    /// The rectangle this output occupies in the global space
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        self.inner.0.lock().unwrap().geometry
    }

    /// Update the rectangle this output occupies in the global space
    pub fn change_geometry(&self, geometry: Rectangle<i32, Logical>) {
        self.inner.0.lock().unwrap().geometry = geometry;
    }

    /// Mark this output as gone
    ///
    /// Capture sources backed by this output keep existing but fail all
    /// further buffer operations.
    pub fn destroy(&self) {
        info!(name = %self.inner.0.lock().unwrap().name, "Destroying output");
        self.inner.1.destroy_notify();
    }

    /// Create a weak reference to this output
    pub fn downgrade(&self) -> WeakOutput {
        WeakOutput {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl IsAlive for Output {
    #[inline]
    fn alive(&self) -> bool {
        self.inner.1.alive()
    }
}

impl PartialEq for Output {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Output {}

impl Hash for Output {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl WeakOutput {
    /// Try to retrieve the original [`Output`], if it still exists
    pub fn upgrade(&self) -> Option<Output> {
        self.inner.upgrade().map(|inner| Output { inner })
    }
}

impl PartialEq for WeakOutput {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for WeakOutput {}
