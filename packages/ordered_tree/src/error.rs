use block_alloc::AllocError;
use thiserror::Error;

/// Errors that can occur when operating on an ordered tree, map or set.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The allocator could not provide memory for a tree node. The tree was left unmodified.
    #[error("failed to allocate a tree node")]
    Alloc(#[from] AllocError),

    /// The operation is not valid at the current position, e.g. erasing at the end position.
    /// The tree was left unmodified.
    #[error("invalid operation: cannot {operation} at the end position")]
    InvalidOperation {
        /// The operation that was attempted.
        operation: &'static str,
    },
}

/// A specialized `Result` type for ordered tree operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn alloc_error_converts() {
        let error: Error = AllocError::ZeroSized.into();

        assert_eq!(error, Error::Alloc(AllocError::ZeroSized));
    }

    #[test]
    fn invalid_operation_names_operation() {
        let error = Error::InvalidOperation { operation: "erase" };

        assert_eq!(
            error.to_string(),
            "invalid operation: cannot erase at the end position"
        );
    }
}
