/// Provide interoperability with C return values.
pub(crate) mod interop;

/// Provide a `select` method for [`bool`] and integer primitives.
pub(crate) mod select;

/// Fatal-error reporting.
pub(crate) mod fatal;
