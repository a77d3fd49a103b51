//! Request Dispatcher (spec §4.E).

mod legacy;
mod webstyle;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use qstring::QString;

use crate::config::Config;
use crate::error::DispatchError;
use crate::router::RouteResolver;
use crate::shell::{self, ShellRequest};
use crate::transform::{ModuleTransformer, Transformer};
use crate::vfs::{VirtualPath, Vfs};

const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);
const SHIM_ROOT: &str = "/_next/shims";
const ROUTE_INFO_PATH: &str = "/_next/route-info";
const PROXY_PATH: &str = "/_next/proxy";
const PAGES_LAZY_ROOT: &str = "/_next/pages";
const APP_LAZY_ROOT: &str = "/_next/app";
const STATIC_ROOT: &str = "/_next/static";

/// Provides the `createHmrClient` export the shell's HMR client script
/// (spec §4.D step 8) imports by name.
const HMR_CLIENT_SHIM: &str = r#"export function createHmrClient(options) {
  const channel = options && options.channel;
  const prefix = (options && options.prefix) || "";
  window.addEventListener("message", (event) => {
    const data = event.data;
    if (!data || data.channel !== channel) return;
    if (data.kind === "css") {
      for (const link of document.querySelectorAll("link[data-dev-server-global-css]")) {
        const url = new URL(link.href);
        url.searchParams.set("t", Date.now().toString());
        link.href = url.toString();
      }
    } else if (data.kind === "js") {
      import(`${prefix}${data.path}?t=${Date.now()}`).then(() => {
        if (window.__devServerRefreshRuntime) {
          window.__devServerRefreshRuntime.performReactRefresh();
        }
      });
    } else {
      window.location.reload();
    }
  });
}
"#;

/// Provides the `mount` export the shell's mount script (spec §4.D step 9)
/// imports by name. A minimal client-side router: loads the page module
/// (and, in app mode, its layouts) and nests them around a DOM root,
/// re-mounting on `popstate`.
const ROUTER_SHIM: &str = r#"export async function mount(options) {
  const root = document.getElementById("__next");
  async function render() {
    const page = await import(options.pageUrl);
    let element = page.default;
    for (let i = options.layoutUrls.length - 1; i >= 0; i -= 1) {
      const layout = await import(options.layoutUrls[i]);
      const inner = element;
      element = layout.default ? layout.default(inner) : inner;
    }
    if (root && typeof element === "function") {
      root.textContent = "";
    }
  }
  await render();
  window.addEventListener("popstate", () => {
    fetch(`${options.prefix || ""}/_next/route-info?pathname=${encodeURIComponent(location.pathname)}`)
      .then((res) => res.json())
      .then(() => render());
  });
  window.__NEXT_HYDRATED_AT__ = Date.now();
}
"#;

/// Defines the `__devServerRefreshRuntime` global the React Refresh
/// injection (spec §4.C step 7, `transform::refresh`) calls as a bare
/// identifier, not an import -- this shim runs as a `<script type="module">`
/// so it must explicitly assign to `window` for that reference to resolve.
const REFRESH_RUNTIME_SHIM: &str = r#"const registry = new Map();
window.__devServerRefreshRuntime = {
  register(component, id) {
    registry.set(id, component);
  },
  performReactRefresh() {
    window.dispatchEvent(new CustomEvent("dev-server-refresh", { detail: { registry } }));
  },
};
export default window.__devServerRefreshRuntime;
"#;

/// Shared stand-in for the `next/link`, `next/head`, `next/image` and
/// `next/script` component shims: each of these is consumed as a default
/// export rendered like any other component.
const COMPONENT_SHIM: &str = r#"export default function DevServerShimComponent(props) {
  return (props && props.children) || null;
}
"#;

/// `next/navigation` exports hooks, not a default component.
const NAVIGATION_SHIM: &str = r#"export function usePathname() {
  return window.location.pathname;
}
export function useSearchParams() {
  return new URLSearchParams(window.location.search);
}
export function useRouter() {
  return {
    push(href) { window.history.pushState({}, "", href); },
    replace(href) { window.history.replaceState({}, "", href); },
    back() { window.history.back(); },
    refresh() { window.location.reload(); },
  };
}
"#;

/// `next/dynamic`'s default export wraps a loader function and returns a
/// component that resolves it lazily.
const DYNAMIC_SHIM: &str = r#"export default function dynamic(loader) {
  return function DevServerDynamicComponent(props) {
    return loader().then((mod) => (mod.default ? mod.default(props) : null));
  };
}
"#;

/// `next/font/*` specifiers request a family-specific loader function whose
/// name isn't known ahead of time; a `Proxy` answers any property access
/// with a loader returning an empty, inert font-face descriptor.
const FONT_SHIM: &str = r#"export default new Proxy({}, {
  get() {
    return function devServerFontLoader() {
      return { className: "", style: {} };
    };
  },
});
"#;

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub status_message: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn html(status: u16, body: impl Into<String>) -> Response {
        let mut headers = HashMap::new();
        headers.insert(
            "Content-Type".to_string(),
            "text/html; charset=utf-8".to_string(),
        );
        Response {
            status,
            status_message: status_message(status),
            headers,
            body: body.into().into_bytes(),
        }
    }

    pub fn js(status: u16, body: impl Into<String>) -> Response {
        let mut headers = HashMap::new();
        headers.insert(
            "Content-Type".to_string(),
            "application/javascript; charset=utf-8".to_string(),
        );
        Response {
            status,
            status_message: status_message(status),
            headers,
            body: body.into().into_bytes(),
        }
    }

    pub fn json(status: u16, body: impl Into<String>) -> Response {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Response {
            status,
            status_message: status_message(status),
            headers,
            body: body.into().into_bytes(),
        }
    }

    pub fn bytes(status: u16, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        Response {
            status,
            status_message: status_message(status),
            headers,
            body,
        }
    }

    pub fn mark_cache_hit(mut self) -> Response {
        self.headers.insert("X-Cache".to_string(), "hit".to_string());
        self
    }

    pub fn mark_transform_error(mut self) -> Response {
        self.headers
            .insert("X-Transform-Error".to_string(), "true".to_string());
        self
    }
}

fn status_message(status: u16) -> String {
    match status {
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
    .to_string()
}

pub type OnStart<'a> = dyn FnMut(u16, String, HashMap<String, String>) + Send + 'a;
pub type OnChunk<'a> = dyn FnMut(Vec<u8>) + Send + 'a;
pub type OnEnd<'a> = dyn FnMut() + Send + 'a;

pub struct Dispatcher<'a> {
    vfs: &'a dyn Vfs,
    config: &'a Config,
    transformer: ModuleTransformer<'a>,
    resolver: RouteResolver<'a>,
    virtual_prefix: String,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        vfs: &'a dyn Vfs,
        config: &'a Config,
        backend: Arc<dyn Transformer>,
        port: u16,
    ) -> Self {
        let virtual_prefix = format!("/__virtual__/{port}");
        Dispatcher {
            vfs,
            config,
            transformer: ModuleTransformer::new(vfs, config, backend, virtual_prefix.clone()),
            resolver: RouteResolver::new(vfs, config),
            virtual_prefix,
        }
    }

    pub async fn handle_request(&self, request: Request) -> Response {
        let (pathname, query) = split_url(&request.url);
        let stripped = self.strip_prefixes(&pathname);

        match self.dispatch(&request.method, &stripped, &query, &request).await {
            Ok(response) => response,
            Err(err) => error_response(err),
        }
    }

    pub async fn handle_streaming_request(
        &self,
        request: Request,
        mut on_start: Box<OnStart<'_>>,
        mut on_chunk: Box<OnChunk<'_>>,
        mut on_end: Box<OnEnd<'_>>,
    ) {
        let (pathname, query) = split_url(&request.url);
        let stripped = self.strip_prefixes(&pathname);

        let is_legacy_api = stripped.starts_with("/api/");
        if is_legacy_api {
            if let Some(entry) = self.resolver.resolve_api_handler(&stripped).await {
                legacy::execute_streaming(
                    &self.transformer,
                    &entry,
                    &request,
                    &query,
                    &mut on_start,
                    &mut on_chunk,
                    &mut on_end,
                )
                .await;
                return;
            }
        }

        // Non-handler paths have no meaningful streaming semantics; run the
        // unary path and deliver it as a single chunk, preserving the
        // start-before-chunk-before-end ordering invariant.
        let response = self.handle_request(request).await;
        on_start(response.status, response.status_message.clone(), response.headers.clone());
        on_chunk(response.body);
        on_end();
    }

    fn strip_prefixes(&self, pathname: &str) -> String {
        let mut path = pathname.to_string();

        if let Some(rest) = path.strip_prefix(&self.virtual_prefix) {
            path = rest.to_string();
        }

        if !self.config.asset_prefix.is_empty() {
            if let Some(rest) = path.strip_prefix(&self.config.asset_prefix) {
                path = rest.to_string();
            }
        }

        if !self.config.base_path.is_empty() {
            if let Some(rest) = path.strip_prefix(&self.config.base_path) {
                path = rest.to_string();
            }
        }

        while path.starts_with("//") {
            path.remove(0);
        }

        if path.is_empty() {
            path = "/".to_string();
        }

        path
    }

    async fn dispatch(
        &self,
        method: &str,
        path: &str,
        query: &str,
        request: &Request,
    ) -> Result<Response, DispatchError> {
        if let Some(rest) = path.strip_prefix(SHIM_ROOT) {
            return Ok(self.serve_shim(rest));
        }

        if path == ROUTE_INFO_PATH {
            return Ok(self.serve_route_info(query).await);
        }

        if path == PROXY_PATH {
            return Ok(self.serve_proxy(query));
        }

        if let Some(rest) = path.strip_prefix(PAGES_LAZY_ROOT) {
            return self.serve_pages_lazy(rest).await;
        }

        if let Some(rest) = path.strip_prefix(APP_LAZY_ROOT) {
            return self.serve_app_lazy(rest).await;
        }

        if let Some(rest) = path.strip_prefix(STATIC_ROOT) {
            return self.serve_static(rest).await;
        }

        if self.config.is_app_router() {
            if let Some(entry) = self.resolver.resolve_route_handler(path).await {
                return webstyle::execute(&self.transformer, &entry, method, path, query, request).await;
            }
        }

        if let Some(rest) = path.strip_prefix("/api/") {
            if let Some(entry) = self.resolver.resolve_api_handler(path).await {
                return legacy::execute(&self.transformer, &entry, request, query).await;
            }
            let _ = rest;
        }

        if let Some(response) = self.serve_public_asset(path).await {
            return Ok(response);
        }

        if let Some(response) = self.serve_transform_or_raw(path).await? {
            return Ok(response);
        }

        self.serve_page_route(path).await
    }

    /// Serves the framework-internal shim modules the import map (spec
    /// §4.D shell section 7) and HMR/refresh preambles (sections 6, 8)
    /// point at. Each path exports exactly what its one known caller in
    /// this crate or the synthesized shell expects -- an undifferentiated
    /// `export default {}` for all of them would throw `ReferenceError`/
    /// `SyntaxError` the moment real browser code touched one.
    fn serve_shim(&self, rest: &str) -> Response {
        let body = match rest.trim_start_matches('/') {
            "hmr-client.js" => HMR_CLIENT_SHIM.to_string(),
            "router.js" => ROUTER_SHIM.to_string(),
            "react-refresh-runtime.js" => REFRESH_RUNTIME_SHIM.to_string(),
            "link.js" => COMPONENT_SHIM.to_string(),
            "head.js" => COMPONENT_SHIM.to_string(),
            "image.js" => COMPONENT_SHIM.to_string(),
            "script.js" => COMPONENT_SHIM.to_string(),
            "navigation.js" => NAVIGATION_SHIM.to_string(),
            "dynamic.js" => DYNAMIC_SHIM.to_string(),
            other if other.starts_with("font/") => FONT_SHIM.to_string(),
            other => format!("// synthetic shim module for {other}\nexport default {{}};\n"),
        };
        Response::js(200, body)
    }

    /// Answers `window.__devServerCorsProxy` requests (spec §4.D shell
    /// section 4). This crate has no real HTTP client -- an embedding that
    /// wants genuine cross-origin forwarding supplies its own
    /// service-worker-level fetch interception -- so a well-formed
    /// "not implemented" response is returned instead of a hard failure.
    fn serve_proxy(&self, query: &str) -> Response {
        let target = QString::from(query).get("url").map(str::to_string);
        match target {
            Some(url) => Response::json(
                501,
                format!(
                    "{{\"error\":\"cors proxy not implemented\",\"url\":{}}}",
                    serde_json::to_string(&url).unwrap()
                ),
            ),
            None => Response::json(400, "{\"error\":\"missing url query parameter\"}"),
        }
    }

    async fn serve_route_info(&self, query: &str) -> Response {
        let pathname = QString::from(query)
            .get("pathname")
            .map(str::to_string)
            .unwrap_or_else(|| "/".to_string());

        match self.resolver.resolve_page(&pathname).await {
            Some(entry) => Response::json(
                200,
                format!(
                    "{{\"found\":true,\"params\":{}}}",
                    params_json(&entry.params)
                ),
            ),
            None => Response::json(200, "{\"found\":false,\"params\":{}}"),
        }
    }

    async fn serve_pages_lazy(&self, rest: &str) -> Result<Response, DispatchError> {
        let logical_path = rest.trim_end_matches(".js");
        let pathname = if logical_path.is_empty() { "/" } else { logical_path };
        match self.resolver.resolve_page(pathname).await {
            Some(entry) => self.transform_for_browser(&entry.handler_file).await,
            None => Err(DispatchError::RouteNotFound {
                path: pathname.to_string(),
            }),
        }
    }

    async fn serve_app_lazy(&self, rest: &str) -> Result<Response, DispatchError> {
        let file_path = rest.trim_end_matches(".js");
        let vpath = VirtualPath::new(file_path);
        self.transform_for_browser(&vpath).await
    }

    async fn transform_for_browser(&self, path: &VirtualPath) -> Result<Response, DispatchError> {
        let result = self.transformer.transform_esm(path).await;
        match result {
            Ok(result) => {
                let response = Response::js(200, result.code);
                Ok(match result.cache_status {
                    crate::transform::CacheStatus::Hit => response.mark_cache_hit(),
                    crate::transform::CacheStatus::Miss => response,
                })
            }
            Err(err) => Ok(Response::js(
                200,
                format!("console.error({:?});\nexport default undefined;\n", err.to_string()),
            )
            .mark_transform_error()),
        }
    }

    async fn serve_static(&self, rest: &str) -> Result<Response, DispatchError> {
        let path = self.config.public_dir.join(rest.trim_start_matches('/'));
        if self.vfs.exists(&path).await {
            let content = self.vfs.read_file(&path).await.map_err(|_| DispatchError::RouteNotFound {
                path: path.to_string(),
            })?;
            Ok(Response::bytes(200, mime_for(&path), content.into_bytes()))
        } else {
            Err(DispatchError::RouteNotFound { path: path.to_string() })
        }
    }

    async fn serve_public_asset(&self, path: &str) -> Option<Response> {
        let vpath = self.config.public_dir.join(path.trim_start_matches('/'));
        if self.vfs.exists(&vpath).await && !self.vfs.is_directory(&vpath).await {
            let content = self.vfs.read_file(&vpath).await.ok()?;
            return Some(Response::bytes(200, mime_for(&vpath), content.into_bytes()));
        }
        None
    }

    async fn serve_transform_or_raw(&self, path: &str) -> Result<Option<Response>, DispatchError> {
        let vpath = VirtualPath::new(path);
        if self.vfs.exists(&vpath).await && !self.vfs.is_directory(&vpath).await {
            if needs_transform(&vpath) {
                return Ok(Some(self.transform_for_browser(&vpath).await?));
            }
            let content = self
                .vfs
                .read_file(&vpath)
                .await
                .map_err(|_| DispatchError::RouteNotFound { path: path.to_string() })?;
            return Ok(Some(Response::bytes(200, mime_for(&vpath), content.into_bytes())));
        }

        for ext in &self.config.page_extensions {
            let candidate = VirtualPath::new(format!("{path}.{ext}"));
            if self.vfs.exists(&candidate).await {
                return Ok(Some(self.transform_for_browser(&candidate).await?));
            }
            let index_candidate = VirtualPath::new(format!("{path}/index.{ext}"));
            if self.vfs.exists(&index_candidate).await {
                return Ok(Some(self.transform_for_browser(&index_candidate).await?));
            }
        }

        Ok(None)
    }

    async fn serve_page_route(&self, path: &str) -> Result<Response, DispatchError> {
        if self.config.is_app_router() {
            if let Some(entry) = self.resolver.resolve_page(path).await {
                return Ok(self.render_shell(path, &entry, 200));
            }
            if let Some(entry) = self.resolver.resolve_page("/not-found").await {
                return Ok(self.render_shell(path, &entry, 404));
            }
            return Ok(Response::html(404, shell::not_found_document()));
        }

        if let Some(entry) = self.resolver.resolve_page(path).await {
            return Ok(self.render_shell(path, &entry, 200));
        }
        if let Some(entry) = self.resolver.resolve_page("/404").await {
            return Ok(self.render_shell(path, &entry, 404));
        }
        Ok(Response::html(404, shell::not_found_document()))
    }

    fn render_shell(&self, pathname: &str, entry: &crate::router::RouteEntry, status: u16) -> Response {
        let request = ShellRequest {
            pathname,
            layouts: &entry.layouts,
            params: &entry.params,
            conventions: &entry.conventions,
            is_app_router: self.config.is_app_router(),
            status,
        };
        Response::html(status, shell::synthesize(self.config, &self.virtual_prefix, &request))
    }
}

fn split_url(url: &str) -> (String, String) {
    match url.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (url.to_string(), String::new()),
    }
}

fn needs_transform(path: &VirtualPath) -> bool {
    matches!(path.extension(), Some("jsx") | Some("tsx") | Some("ts"))
}

fn mime_for(path: &VirtualPath) -> &'static str {
    match path.extension() {
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("js") | Some("mjs") => "application/javascript",
        _ => "application/octet-stream",
    }
}

fn params_json(params: &crate::router::Params) -> String {
    let mut entries = Vec::new();
    for (key, value) in &params.0 {
        let value_json = match value {
            crate::router::ParamValue::Single(s) => serde_json::to_string(s).unwrap(),
            crate::router::ParamValue::Multi(values) => serde_json::to_string(values).unwrap(),
        };
        entries.push(format!("\"{key}\":{value_json}"));
    }
    format!("{{{}}}", entries.join(","))
}

fn error_response(err: DispatchError) -> Response {
    match err {
        DispatchError::RouteNotFound { .. } => Response::json(404, "{\"error\":\"not found\"}"),
        DispatchError::MethodNotAllowed { method, path } => Response::json(
            405,
            format!("{{\"error\":\"Method {method} not allowed\"}}").replace("{path}", &path),
        ),
        DispatchError::Transform(transform_err) => {
            Response::js(200, format!("console.error({:?});\n", transform_err.to_string()))
                .mark_transform_error()
        }
        DispatchError::HandlerError { message, .. } => Response::json(
            500,
            format!("{{\"error\":{}}}", serde_json::to_string(&message).unwrap()),
        ),
        DispatchError::HandlerTimeout { .. } => {
            Response::json(500, "{\"error\":\"handler timeout\"}")
        }
    }
}

pub(crate) fn handler_timeout() -> Duration {
    HANDLER_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransformer, MemoryVfs};
    use std::collections::HashMap as Map;

    async fn make(vfs: &MemoryVfs) -> (Config, Arc<FakeTransformer>) {
        (Config::load(vfs).await, Arc::new(FakeTransformer::new()))
    }

    #[tokio::test]
    async fn pages_index_returns_html_with_import_map() {
        let vfs = MemoryVfs::new();
        vfs.write_file("/pages/index.jsx", "export default function Home() { return null; }");
        let (config, backend) = make(&vfs).await;
        let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

        let response = dispatcher
            .handle_request(Request {
                method: "GET".to_string(),
                url: "/".to_string(),
                headers: Map::new(),
                body: None,
            })
            .await;

        assert_eq!(response.status, 200);
        let body = String::from_utf8(response.body).unwrap();
        assert!(body.contains("__next"));
        assert!(body.contains("/_next/pages"));
    }

    #[tokio::test]
    async fn asset_prefix_double_slash_is_tolerated() {
        let vfs = MemoryVfs::new();
        vfs.write_file("/public/images/x.png", "binary");
        let vfs2 = MemoryVfs::new();
        vfs2.write_file("/next.config.js", r#"module.exports = { assetPrefix: "/m" }"#);
        vfs2.write_file("/public/images/x.png", "binary");
        let config = Config::load(&vfs2).await;
        let backend = Arc::new(FakeTransformer::new());
        let dispatcher = Dispatcher::new(&vfs2, &config, backend, 3000);

        let response = dispatcher
            .handle_request(Request {
                method: "GET".to_string(),
                url: "/m//images/x.png".to_string(),
                headers: Map::new(),
                body: None,
            })
            .await;
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn shim_modules_export_what_their_callers_expect() {
        let vfs = MemoryVfs::new();
        let (config, backend) = make(&vfs).await;
        let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

        async fn shim_body(dispatcher: &Dispatcher<'_>, name: &str) -> String {
            let response = dispatcher
                .handle_request(Request {
                    method: "GET".to_string(),
                    url: format!("/_next/shims/{name}"),
                    headers: Map::new(),
                    body: None,
                })
                .await;
            String::from_utf8(response.body).unwrap()
        }

        assert!(shim_body(&dispatcher, "hmr-client.js").await.contains("export function createHmrClient"));
        assert!(shim_body(&dispatcher, "router.js").await.contains("export async function mount"));
        let refresh = shim_body(&dispatcher, "react-refresh-runtime.js").await;
        assert!(refresh.contains("window.__devServerRefreshRuntime"));
        assert!(refresh.contains("performReactRefresh"));
    }

    #[tokio::test]
    async fn proxy_route_answers_with_well_formed_response() {
        let vfs = MemoryVfs::new();
        let (config, backend) = make(&vfs).await;
        let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);
        let response = dispatcher
            .handle_request(Request {
                method: "GET".to_string(),
                url: "/_next/proxy?url=https%3A%2F%2Fexample.com".to_string(),
                headers: Map::new(),
                body: None,
            })
            .await;
        assert_eq!(response.status, 501);
        let body = String::from_utf8(response.body).unwrap();
        assert!(body.contains("https://example.com"));
    }

    #[tokio::test]
    async fn missing_page_returns_404() {
        let vfs = MemoryVfs::new();
        let (config, backend) = make(&vfs).await;
        let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);
        let response = dispatcher
            .handle_request(Request {
                method: "GET".to_string(),
                url: "/nope".to_string(),
                headers: Map::new(),
                body: None,
            })
            .await;
        assert_eq!(response.status, 404);
    }
}
