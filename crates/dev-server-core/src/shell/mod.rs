//! HTML Shell Synthesizer (spec §4.D).
//!
//! Every fragment below is produced by plain string templating -- no
//! templating engine dependency -- consistent with the design note that the
//! client-side Suspense-like wrapper is server-synthesized text the server
//! never evaluates.

use crate::config::Config;
use crate::router::{Conventions, Params};
use crate::vfs::VirtualPath;

pub struct ShellRequest<'a> {
    pub pathname: &'a str,
    pub layouts: &'a [VirtualPath],
    pub params: &'a Params,
    pub conventions: &'a Conventions,
    pub is_app_router: bool,
    pub status: u16,
}

/// Synthesizes the bootstrap HTML document for a page-route request.
pub fn synthesize(config: &Config, virtual_prefix: &str, request: &ShellRequest<'_>) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str(&format!(
        "<base href=\"{virtual_prefix}{base_path}/\">\n",
        base_path = config.base_path
    ));
    html.push_str(&env_script(config, virtual_prefix));
    html.push_str(&style_framework_script(config));
    html.push_str(&cors_proxy_helpers(virtual_prefix));
    html.push_str(&global_css_links(config, virtual_prefix));
    html.push_str(&refresh_preamble(virtual_prefix));
    html.push_str(&import_map(virtual_prefix));
    html.push_str(&hmr_client_script(virtual_prefix));
    html.push_str("</head>\n<body>\n<div id=\"__next\"></div>\n");
    html.push_str(&mount_script(config, virtual_prefix, request));
    html.push_str("</body>\n</html>\n");

    html
}

fn env_script(config: &Config, virtual_prefix: &str) -> String {
    let mut entries = config
        .public_env()
        .map(|(k, v)| format!("\"{}\":{}", escape_js_string(k), serde_json::to_string(v).unwrap()))
        .collect::<Vec<_>>();
    entries.sort();

    format!(
        "<script>\nwindow.process = {{ env: {{ {env} }} }};\nwindow.__NEXT_BASE_PATH__ = {base_path};\n</script>\n",
        env = entries.join(","),
        base_path = serde_json::to_string(&config.base_path).unwrap(),
    ) + &format!("<script>window.__NEXT_VIRTUAL_PREFIX__ = {};</script>\n", serde_json::to_string(virtual_prefix).unwrap())
}

/// Style CDN + user's style-framework config script (spec §4.D shell
/// section 3). Renders nothing when no style-framework config file was
/// discoverable in the VFS at config-load time.
fn style_framework_script(config: &Config) -> String {
    match &config.style_framework_config {
        Some(script) => format!(
            "<script src=\"https://cdn.tailwindcss.com\"></script>\n<script>{script}</script>\n"
        ),
        None => String::new(),
    }
}

/// CORS-proxy helpers (spec §4.D shell section 4). Unlike the style CDN
/// block above, this section has no "optional" qualifier in the spec and is
/// always emitted: it defines a client helper that user code can route
/// cross-origin `fetch` calls through, rewriting them to a same-origin URL
/// the dispatcher answers.
fn cors_proxy_helpers(virtual_prefix: &str) -> String {
    format!(
        r#"<script>
window.__devServerCorsProxy = function(url) {{
  return "{virtual_prefix}/_next/proxy?url=" + encodeURIComponent(url);
}};
</script>
"#
    )
}

fn global_css_links(_config: &Config, virtual_prefix: &str) -> String {
    format!("<link rel=\"stylesheet\" href=\"{virtual_prefix}/_next/static/globals.css\" data-dev-server-global-css>\n")
}

fn refresh_preamble(virtual_prefix: &str) -> String {
    format!(
        "<script type=\"module\" src=\"{virtual_prefix}/_next/shims/react-refresh-runtime.js\"></script>\n"
    )
}

fn import_map(virtual_prefix: &str) -> String {
    let shims = [
        "link", "router", "head", "navigation", "image", "dynamic", "script",
    ];
    let mut imports = vec![
        "\"react\":\"https://esm.sh/react\"".to_string(),
        "\"react-dom\":\"https://esm.sh/react-dom\"".to_string(),
        "\"react-dom/client\":\"https://esm.sh/react-dom/client\"".to_string(),
    ];
    for shim in shims {
        imports.push(format!(
            "\"next/{shim}\":\"{virtual_prefix}/_next/shims/{shim}.js\""
        ));
    }
    imports.push(format!(
        "\"next/font/\":\"{virtual_prefix}/_next/shims/font/\""
    ));

    format!(
        "<script type=\"importmap\">{{\"imports\":{{{}}}}}</script>\n",
        imports.join(",")
    )
}

fn hmr_client_script(virtual_prefix: &str) -> String {
    format!(
        r#"<script type="module">
import {{ createHmrClient }} from "{virtual_prefix}/_next/shims/hmr-client.js";
createHmrClient({{ channel: "dev-server-hmr", prefix: "{virtual_prefix}" }});
</script>
"#
    )
}

fn mount_script(config: &Config, virtual_prefix: &str, request: &ShellRequest<'_>) -> String {
    let page_url = if request.is_app_router {
        format!("{virtual_prefix}/_next/app/app{path}/page.js", path = asset_path(request.pathname))
    } else {
        format!("{virtual_prefix}/_next/pages{path}.js", path = asset_path(request.pathname))
    };

    let layout_urls: Vec<String> = request
        .layouts
        .iter()
        .map(|l| format!("\"{virtual_prefix}/_next/app{l}.js\""))
        .collect();

    let params_json = params_to_json(request.params);
    let conventions_json = conventions_to_json(virtual_prefix, request.conventions);

    format!(
        r#"<script type="module">
import {{ mount }} from "{virtual_prefix}/_next/shims/router.js";
mount({{
  pageUrl: "{page_url}",
  layoutUrls: [{layout_urls}],
  params: {params_json},
  conventions: {conventions_json},
  appRouter: {is_app_router},
  basePath: {base_path},
  status: {status}
}});
window.__NEXT_HYDRATED_AT__ = window.__NEXT_HYDRATED_AT__ || "pending";
</script>
"#,
        layout_urls = layout_urls.join(","),
        is_app_router = request.is_app_router,
        base_path = serde_json::to_string(&config.base_path).unwrap(),
        status = request.status,
    )
}

fn asset_path(pathname: &str) -> String {
    if pathname == "/" {
        "/index".to_string()
    } else if pathname == "/index" || pathname.starts_with("/index/") {
        format!("/index{pathname}")
    } else {
        pathname.to_string()
    }
}

fn params_to_json(params: &Params) -> String {
    let mut entries = Vec::new();
    for (key, value) in &params.0 {
        let value_json = match value {
            crate::router::ParamValue::Single(s) => serde_json::to_string(s).unwrap(),
            crate::router::ParamValue::Multi(values) => serde_json::to_string(values).unwrap(),
        };
        entries.push(format!("\"{}\":{}", escape_js_string(key), value_json));
    }
    format!("{{{}}}", entries.join(","))
}

fn conventions_to_json(virtual_prefix: &str, conventions: &Conventions) -> String {
    let field = |path: &Option<crate::vfs::VirtualPath>| match path {
        Some(p) => serde_json::to_string(&format!("{virtual_prefix}/_next/app{p}.js")).unwrap(),
        None => "null".to_string(),
    };
    format!(
        "{{\"loading\":{},\"error\":{},\"notFound\":{}}}",
        field(&conventions.loading),
        field(&conventions.error),
        field(&conventions.not_found),
    )
}

fn escape_js_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Built-in 404 document used when no user-defined not-found page resolves.
pub fn not_found_document() -> String {
    "<!DOCTYPE html>\n<html><body><h1>404 - Not Found</h1></body></html>\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryVfs;

    #[tokio::test]
    async fn env_script_excludes_non_public_vars() {
        let vfs = MemoryVfs::new();
        let mut config = Config::load(&vfs).await;
        config.set_env("NEXT_PUBLIC_A", "x");
        config.set_env("SECRET", "s");

        let request = ShellRequest {
            pathname: "/",
            layouts: &[],
            params: &Params::default(),
            conventions: &Conventions::default(),
            is_app_router: false,
            status: 200,
        };
        let html = synthesize(&config, "/__virtual__/3000", &request);
        assert!(html.contains("NEXT_PUBLIC_A"));
        assert!(!html.contains("SECRET"));
    }

    #[tokio::test]
    async fn document_always_includes_cors_proxy_helper() {
        let vfs = MemoryVfs::new();
        let config = Config::load(&vfs).await;
        let request = ShellRequest {
            pathname: "/",
            layouts: &[],
            params: &Params::default(),
            conventions: &Conventions::default(),
            is_app_router: false,
            status: 200,
        };
        let html = synthesize(&config, "/__virtual__/3000", &request);
        assert!(html.contains("__devServerCorsProxy"));
        assert!(html.contains("/_next/proxy?url="));
    }

    #[tokio::test]
    async fn document_includes_style_framework_script_when_discoverable() {
        let vfs = MemoryVfs::new();
        vfs.write_file("/tailwind.config.js", "module.exports = { theme: {} }");
        let config = Config::load(&vfs).await;
        let request = ShellRequest {
            pathname: "/",
            layouts: &[],
            params: &Params::default(),
            conventions: &Conventions::default(),
            is_app_router: false,
            status: 200,
        };
        let html = synthesize(&config, "/__virtual__/3000", &request);
        assert!(html.contains("cdn.tailwindcss.com"));
        assert!(html.contains("tailwind.config ="));
    }

    #[tokio::test]
    async fn style_framework_script_omitted_when_no_config_found() {
        let vfs = MemoryVfs::new();
        let config = Config::load(&vfs).await;
        let request = ShellRequest {
            pathname: "/",
            layouts: &[],
            params: &Params::default(),
            conventions: &Conventions::default(),
            is_app_router: false,
            status: 200,
        };
        let html = synthesize(&config, "/__virtual__/3000", &request);
        assert!(!html.contains("cdn.tailwindcss.com"));
    }

    #[tokio::test]
    async fn document_includes_import_map_and_hmr_client() {
        let vfs = MemoryVfs::new();
        let config = Config::load(&vfs).await;
        let request = ShellRequest {
            pathname: "/",
            layouts: &[],
            params: &Params::default(),
            conventions: &Conventions::default(),
            is_app_router: false,
            status: 200,
        };
        let html = synthesize(&config, "/__virtual__/3000", &request);
        assert!(html.contains("importmap"));
        assert!(html.contains("createHmrClient"));
        assert!(html.contains("/_next/pages"));
    }
}
