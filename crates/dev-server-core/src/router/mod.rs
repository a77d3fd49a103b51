//! Route Resolver (spec §4.B).
//!
//! Two modes, auto-selected (or forced) at construction: Pages mode walks a
//! flat `pages/` tree; App mode walks a nested `app/` tree collecting
//! layouts and convention files as it descends. Both share segment
//! classification (`segment.rs`).

mod app;
mod pages;
pub mod segment;

use crate::config::Config;
use crate::vfs::{VirtualPath, Vfs};
pub use segment::{ParamValue, Params};

/// Result of resolving a pathname to a page (or, with `conventions` empty
/// and `layouts` empty, a route handler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub handler_file: VirtualPath,
    pub layouts: Vec<VirtualPath>,
    pub params: Params,
    pub conventions: Conventions,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conventions {
    pub loading: Option<VirtualPath>,
    pub error: Option<VirtualPath>,
    pub not_found: Option<VirtualPath>,
}

/// Resolves pathnames to [`RouteEntry`] values against a project's VFS,
/// according to whichever router mode `config` selects.
pub struct RouteResolver<'a> {
    vfs: &'a dyn Vfs,
    config: &'a Config,
}

impl<'a> RouteResolver<'a> {
    pub fn new(vfs: &'a dyn Vfs, config: &'a Config) -> Self {
        RouteResolver { vfs, config }
    }

    /// Resolves `pathname` to a page route. Returns `None` if no page,
    /// static file, or dynamic match exists (spec §4.B "Failure").
    pub async fn resolve_page(&self, pathname: &str) -> Option<RouteEntry> {
        if self.config.is_app_router() {
            app::resolve_page(self.vfs, self.config, pathname).await
        } else {
            pages::resolve_page(self.vfs, self.config, pathname).await
        }
    }

    /// Resolves `pathname` to an App Router `route.<ext>` request handler.
    /// Only meaningful in App mode; returns `None` in Pages mode.
    pub async fn resolve_route_handler(&self, pathname: &str) -> Option<RouteEntry> {
        if self.config.is_app_router() {
            app::resolve_route_handler(self.vfs, self.config, pathname).await
        } else {
            None
        }
    }

    /// Resolves `pathname` to a Pages mode `pages/api/*` handler.
    pub async fn resolve_api_handler(&self, pathname: &str) -> Option<RouteEntry> {
        pages::resolve_page(self.vfs, self.config, pathname).await
    }
}
