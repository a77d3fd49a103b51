//! End-to-end scenarios seeding the test suite (spec §8).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dev_server_core::config::Config;
use dev_server_core::dispatcher::{Dispatcher, OnChunk, OnEnd, OnStart, Request};
use dev_server_core::testing::{FakeTransformer, MemoryVfs};

async fn dispatcher_for(vfs: &MemoryVfs) -> (Config, Arc<FakeTransformer>) {
    (Config::load(vfs).await, Arc::new(FakeTransformer::new()))
}

fn get(path: &str) -> Request {
    Request {
        method: "GET".to_string(),
        url: path.to_string(),
        headers: HashMap::new(),
        body: None,
    }
}

#[tokio::test]
async fn scenario_pages_index() {
    let vfs = MemoryVfs::new();
    vfs.write_file("/pages/index.jsx", "export default function Home() { return null; }");
    let (config, backend) = dispatcher_for(&vfs).await;
    let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

    let response = dispatcher.handle_request(get("/")).await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.headers.get("Content-Type").map(String::as_str),
        Some("text/html; charset=utf-8")
    );
    let body = String::from_utf8(response.body).unwrap();
    assert!(body.contains("<div id=\"__next\">"));
    assert!(body.contains("/_next/pages"));
}

#[tokio::test]
async fn scenario_dynamic_segment_route_info() {
    let vfs = MemoryVfs::new();
    vfs.write_file("/app/layout.tsx", "export default function RootLayout() {}");
    vfs.write_file(
        "/app/users/[id]/page.tsx",
        "export default function User() { return null; }",
    );
    let (config, backend) = dispatcher_for(&vfs).await;
    let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

    let response = dispatcher
        .handle_request(get("/_next/route-info?pathname=/users/42"))
        .await;
    assert_eq!(response.status, 200);
    let body = String::from_utf8(response.body).unwrap();
    assert!(body.contains("\"found\":true"));
    assert!(body.contains("\"id\":\"42\""));
}

#[tokio::test]
async fn scenario_route_group_with_layout() {
    let vfs = MemoryVfs::new();
    vfs.write_file("/app/layout.tsx", "export default function RootLayout() {}");
    vfs.write_file(
        "/app/(marketing)/layout.tsx",
        "export default function MarketingLayout() {}",
    );
    vfs.write_file(
        "/app/(marketing)/about/page.tsx",
        "export default function About() { return null; }",
    );
    let (config, backend) = dispatcher_for(&vfs).await;
    let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

    let response = dispatcher.handle_request(get("/about")).await;
    assert_eq!(response.status, 200);
    let body = String::from_utf8(response.body).unwrap();
    assert!(body.contains("layoutUrls"));
}

#[tokio::test]
async fn scenario_catch_all_route() {
    let vfs = MemoryVfs::new();
    vfs.write_file(
        "/app/docs/[...slug]/page.tsx",
        "export default function Docs() { return null; }",
    );
    let (config, backend) = dispatcher_for(&vfs).await;
    let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

    let response = dispatcher.handle_request(get("/docs/a/b/c")).await;
    assert_eq!(response.status, 200);
    let body = String::from_utf8(response.body).unwrap();
    assert!(body.contains("\"slug\":[\"a\",\"b\",\"c\"]"));
}

#[tokio::test]
async fn scenario_legacy_handler_streaming_order() {
    let vfs = MemoryVfs::new();
    vfs.write_file(
        "/pages/api/stream.js",
        "module.exports = function handler(req, res) { res.write('A'); res.write('B'); res.end('C'); };",
    );
    let (config, backend) = dispatcher_for(&vfs).await;
    let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let e1 = events.clone();
    let mut on_start: Box<OnStart<'_>> = Box::new(move |status, _msg, _headers| {
        e1.lock().unwrap().push(format!("start:{status}"));
    });
    let e2 = events.clone();
    let mut on_chunk: Box<OnChunk<'_>> = Box::new(move |chunk| {
        e2.lock().unwrap().push(format!("chunk:{}", String::from_utf8_lossy(&chunk)));
    });
    let e3 = events.clone();
    let mut on_end: Box<OnEnd<'_>> = Box::new(move || e3.lock().unwrap().push("end".to_string()));

    dispatcher
        .handle_streaming_request(
            Request {
                method: "GET".to_string(),
                url: "/api/stream".to_string(),
                headers: HashMap::new(),
                body: None,
            },
            on_start,
            on_chunk,
            on_end,
        )
        .await;

    let events = events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start:200".to_string(),
            "chunk:A".to_string(),
            "chunk:B".to_string(),
            "chunk:C".to_string(),
            "end".to_string(),
        ]
    );
}

#[tokio::test]
async fn scenario_transform_caching() {
    let vfs = MemoryVfs::new();
    vfs.write_file("/pages/index.jsx", "export default function Home() { return 1; }");
    let (config, backend) = dispatcher_for(&vfs).await;
    let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

    let first = dispatcher.handle_request(get("/_next/pages/index.js")).await;
    assert!(!first.headers.contains_key("X-Cache"));

    let second = dispatcher.handle_request(get("/_next/pages/index.js")).await;
    assert_eq!(second.headers.get("X-Cache").map(String::as_str), Some("hit"));

    vfs.write_file("/pages/index.jsx", "export default function Home() { return 2; }");
    let after_edit = dispatcher.handle_request(get("/_next/pages/index.js")).await;
    assert!(!after_edit.headers.contains_key("X-Cache"));

    let repeat = dispatcher.handle_request(get("/_next/pages/index.js")).await;
    assert_eq!(repeat.headers.get("X-Cache").map(String::as_str), Some("hit"));
}

#[tokio::test]
async fn scenario_env_isolation() {
    let vfs = MemoryVfs::new();
    vfs.write_file("/pages/index.jsx", "export default function Home() { return null; }");
    let (mut config, backend) = dispatcher_for(&vfs).await;
    config.set_env("NEXT_PUBLIC_A", "x");
    config.set_env("SECRET", "s");
    let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

    let response = dispatcher.handle_request(get("/")).await;
    let body = String::from_utf8(response.body).unwrap();
    assert!(body.contains("\"NEXT_PUBLIC_A\":\"x\""));
    assert!(!body.contains("SECRET"));
}

#[tokio::test]
async fn scenario_asset_prefix_double_slash() {
    let vfs = MemoryVfs::new();
    vfs.write_file("/next.config.js", r#"module.exports = { assetPrefix: "/m" }"#);
    vfs.write_file("/public/images/x.png", "binary-data");
    let config = Config::load(&vfs).await;
    let backend = Arc::new(FakeTransformer::new());
    let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

    let response = dispatcher.handle_request(get("/m//images/x.png")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"binary-data");
}

#[tokio::test]
async fn scenario_method_not_allowed() {
    let vfs = MemoryVfs::new();
    vfs.write_file("/app/layout.tsx", "export default function RootLayout() {}");
    vfs.write_file(
        "/app/items/route.ts",
        "export async function GET(request) { return new Response('ok'); }",
    );
    let (config, backend) = dispatcher_for(&vfs).await;
    let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

    let response = dispatcher
        .handle_request(Request {
            method: "POST".to_string(),
            url: "/items".to_string(),
            headers: HashMap::new(),
            body: None,
        })
        .await;
    assert_eq!(response.status, 405);
}

#[tokio::test(start_paused = true)]
async fn scenario_handler_timeout() {
    let vfs = MemoryVfs::new();
    vfs.write_file(
        "/pages/api/hangs.js",
        "module.exports = function handler(req, res) { /* never calls res.end */ };",
    );
    let (config, backend) = dispatcher_for(&vfs).await;
    let dispatcher = Dispatcher::new(&vfs, &config, backend, 3000);

    // No res.end/json/send/redirect call is ever observed, so the handler's
    // response genuinely never completes -- the dispatcher's 30s handler
    // timeout is the only thing that ends the request.
    let response = dispatcher.handle_request(get("/api/hangs")).await;
    assert_eq!(response.status, 500);
}
