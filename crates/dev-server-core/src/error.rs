use thiserror::Error;

/// Errors surfaced by [`crate::transform`].
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to read source file {path}")]
    Read {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{backend} failed to transform {path}: {message}")]
    Backend {
        backend: &'static str,
        path: String,
        message: String,
    },
    #[error("no transform backend is available for {path}, which requires JSX/TypeScript syntax")]
    BackendUnavailable { path: String },
    #[error("failed to parse CSS module {path}: {message}")]
    CssModule { path: String, message: String },
}

/// Errors surfaced by [`crate::dispatcher::Dispatcher::handle_request`] and friends.
///
/// Per the dispatch contract, none of these ever escape as a Rust `Err` all
/// the way to a caller of `handle_request`/`handle_streaming_request` -- the
/// dispatcher converts every one of them into a well-formed [`crate::dispatcher::Response`].
/// The type exists so internal plumbing can use `?` and so tests can assert
/// on *why* a response took the shape it did.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no route matches {path}")]
    RouteNotFound { path: String },
    #[error("method {method} is not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("handler for {path} threw: {message}")]
    HandlerError { path: String, message: String },
    #[error("handler for {path} did not complete within the timeout")]
    HandlerTimeout { path: String },
}

/// Errors surfaced by [`crate::config::Config::load`].
///
/// Construction of [`crate::config::Config`] never actually fails -- a
/// malformed or unrecognized config file is logged and treated as absent --
/// but each ignored file is recorded as one of these in
/// [`crate::config::Config::warnings`] so call sites that do want to observe
/// "this file was ignored" can inspect why.
#[derive(Debug, Error)]
pub enum ConfigParseError {
    #[error("{path} could not be parsed as JSON: {message}")]
    InvalidJson { path: String, message: String },
    #[error("{path} did not contain any recognizable next.config keys")]
    NoRecognizedKeys { path: String },
}

/// Errors surfaced by [`crate::hmr`].
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("could not watch {path}: {message}")]
    AttachFailed { path: String, message: String },
}
