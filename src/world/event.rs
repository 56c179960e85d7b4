use crate::collision::ContactPoint;
use crate::dynamics::{BodyHandle, BodyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionEventKind {
    /// The pair touches this step but did not last step.
    Begin,
    /// The pair touched last step but no longer does.
    End,
}

/// A change in whether two bodies are touching.
///
/// `id_a < id_b`. `contacts` holds the points of the first touching step for
/// `Begin` and is empty for `End`.
#[derive(Debug, Clone)]
pub struct CollisionEvent {
    pub kind: CollisionEventKind,
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub id_a: BodyId,
    pub id_b: BodyId,
    pub contacts: Vec<ContactPoint>,
}

/// Callback invoked for every collision event at the end of a step.
pub type CollisionListener = Box<dyn FnMut(&CollisionEvent) + Send>;
