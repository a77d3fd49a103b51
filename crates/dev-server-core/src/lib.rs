//! Core engine for a browser-resident dev server that emulates a file-based
//! React meta-framework: route resolution (Pages and App Router), module
//! transformation with content-addressed caching, HTML shell synthesis,
//! request dispatch, and hot module replacement notification.
//!
//! The crate has no opinion on how requests physically arrive -- a service
//! worker, a `postMessage` bridge, or a test harness all drive
//! [`dispatcher::Dispatcher`] the same way, through [`dispatcher::Request`]
//! and either [`dispatcher::Dispatcher::handle_request`] or
//! [`dispatcher::Dispatcher::handle_streaming_request`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod eval;
pub mod hmr;
pub mod router;
pub mod shell;
pub mod transform;
pub mod vfs;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::Config;
pub use dispatcher::{Dispatcher, Request, Response};
pub use error::{ConfigParseError, DispatchError, TransformError, WatcherError};
pub use transform::Transformer;
pub use vfs::{Vfs, VirtualPath};
