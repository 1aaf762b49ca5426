use core::fmt;

/// The ways a keyed tree operation can fail.
///
/// A failed operation never mutates the tree, so repeating it with the same arguments fails the
/// same way.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// An element with an equal key is already in the tree.
    #[error("key already exists")]
    KeyAlreadyExists,

    /// No element with the requested key is in the tree.
    #[error("key not found")]
    KeyNotFound,
}

/// Returned by [`AvlTree::insert`] when the tree already holds an element with the same key.
///
/// The rejected item is handed back to the caller unchanged.
///
/// [`AvlTree::insert`]: crate::AvlTree::insert
#[derive(thiserror::Error)]
#[error("key already exists")]
pub struct InsertError<H> {
    item: H,
}

impl<H> InsertError<H> {
    pub(crate) fn new(item: H) -> Self {
        InsertError { item }
    }

    /// Returns the kind of this error, which is always [`Error::KeyAlreadyExists`].
    pub fn kind(&self) -> Error {
        Error::KeyAlreadyExists
    }

    /// Returns a reference to the rejected item.
    pub fn item(&self) -> &H {
        &self.item
    }

    /// Consumes the error, returning the rejected item.
    pub fn into_inner(self) -> H {
        self.item
    }
}

impl<H> fmt::Debug for InsertError<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertError")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

impl<H> From<InsertError<H>> for Error {
    fn from(err: InsertError<H>) -> Self {
        err.kind()
    }
}
