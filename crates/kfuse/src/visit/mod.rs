//! tree walkers
//!
//! Rewriters in [crate::util] implement [VisitMut] for the node type they edit and are
//! driven over a document tree by a walker such as [VisitStringsMut].
mod visit_strings;
pub use visit_strings::VisitStringsMut;

/// Edits one node in place
pub trait VisitMut<N> {
    fn visit_mut(&mut self, node: &mut N);
}

impl<N, F> VisitMut<N> for F
where
    F: FnMut(&mut N),
{
    fn visit_mut(&mut self, node: &mut N) {
        self(node)
    }
}
