//! Input handles.

use super::typed_handle;

typed_handle! {
    /// Handle to an input node holding a `T`.
    ///
    /// Inputs are the roots of the graph. Their values change only through
    /// [`Session::set`](crate::Session::set) or a dispatched
    /// [`Event::Set`](crate::Event::Set); every transitive dependent is then
    /// marked maybe dirty and nothing recomputes until it is next read.
    Input
}
