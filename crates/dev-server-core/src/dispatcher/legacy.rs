//! Legacy-style handler execution (spec §4.E.2): `pages/api/*` handlers.
//!
//! Streaming semantics: headers go to `on_start` on the *first* of
//! write/json/send/end/redirect; subsequent writes stream to `on_chunk`;
//! `on_end` fires once, after the last chunk (spec invariant 5).

use std::collections::HashMap;

use crate::error::DispatchError;
use crate::eval::{EvalContext, LegacyAction, MiniEvaluator, ModuleEvaluator};
use crate::router::RouteEntry;
use crate::transform::ModuleTransformer;

use super::{handler_timeout, OnChunk, OnEnd, OnStart, Request, Response};

pub async fn execute(
    transformer: &ModuleTransformer<'_>,
    entry: &RouteEntry,
    request: &Request,
    query: &str,
) -> Result<Response, DispatchError> {
    let actions = run(transformer, entry, request, query).await?;

    let mut status = 200u16;
    let mut headers = HashMap::new();
    let mut body = Vec::new();

    for action in actions {
        match action {
            LegacyAction::Status(code) => status = code,
            LegacyAction::Write(bytes) => body.extend(bytes),
            LegacyAction::Json(json) => {
                headers.insert("Content-Type".to_string(), "application/json".to_string());
                body = json.into_bytes();
            }
            LegacyAction::Send(bytes) => body = bytes,
            LegacyAction::Redirect(code, location) => {
                status = code;
                headers.insert("Location".to_string(), location);
            }
            LegacyAction::End(Some(bytes)) => body.extend(bytes),
            LegacyAction::End(None) => {}
        }
    }

    Ok(Response {
        status,
        status_message: status_message(status),
        headers,
        body,
    })
}

pub async fn execute_streaming(
    transformer: &ModuleTransformer<'_>,
    entry: &RouteEntry,
    request: &Request,
    query: &str,
    on_start: &mut Box<OnStart<'_>>,
    on_chunk: &mut Box<OnChunk<'_>>,
    on_end: &mut Box<OnEnd<'_>>,
) {
    let actions = match run(transformer, entry, request, query).await {
        Ok(actions) => actions,
        Err(err) => {
            let response = super::error_response(err);
            on_start(response.status, response.status_message, response.headers);
            on_chunk(response.body);
            on_end();
            return;
        }
    };

    let mut status = 200u16;
    let mut headers = HashMap::new();
    let mut started = false;

    for action in actions {
        match action {
            LegacyAction::Status(code) => status = code,
            LegacyAction::Redirect(code, location) => {
                status = code;
                headers.insert("Location".to_string(), location);
                ensure_started(&mut started, on_start, status, &headers);
            }
            LegacyAction::Write(bytes) => {
                ensure_started(&mut started, on_start, status, &headers);
                on_chunk(bytes);
            }
            LegacyAction::Json(json) => {
                headers.insert("Content-Type".to_string(), "application/json".to_string());
                ensure_started(&mut started, on_start, status, &headers);
                on_chunk(json.into_bytes());
            }
            LegacyAction::Send(bytes) => {
                ensure_started(&mut started, on_start, status, &headers);
                on_chunk(bytes);
            }
            LegacyAction::End(chunk) => {
                ensure_started(&mut started, on_start, status, &headers);
                if let Some(chunk) = chunk {
                    on_chunk(chunk);
                }
            }
        }
    }

    ensure_started(&mut started, on_start, status, &headers);
    on_end();
}

fn ensure_started(
    started: &mut bool,
    on_start: &mut Box<OnStart<'_>>,
    status: u16,
    headers: &HashMap<String, String>,
) {
    if !*started {
        on_start(status, status_message(status), headers.clone());
        *started = true;
    }
}

async fn run(
    transformer: &ModuleTransformer<'_>,
    entry: &RouteEntry,
    request: &Request,
    query: &str,
) -> Result<Vec<LegacyAction>, DispatchError> {
    let transform_result = transformer
        .transform_cjs(&entry.handler_file)
        .await
        .map_err(DispatchError::from)?;

    let ctx = EvalContext {
        method: request.method.clone(),
        url: request.url.clone(),
        query: query.to_string(),
        headers: request.headers.clone(),
        body: request.body.clone(),
        env: HashMap::new(),
        params_json: super::params_json(&entry.params),
    };

    let evaluator = MiniEvaluator::new();
    let path = entry.handler_file.to_string();

    match tokio::time::timeout(handler_timeout(), evaluator.evaluate_legacy(&transform_result.code, &ctx)).await {
        Ok(Ok(actions)) => Ok(actions),
        Ok(Err(err)) => Err(DispatchError::HandlerError {
            path,
            message: err.to_string(),
        }),
        Err(_) => Err(DispatchError::HandlerTimeout { path }),
    }
}

fn status_message(status: u16) -> String {
    match status {
        200 => "OK",
        302 => "Found",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::router::{Conventions, Params};
    use crate::testing::{FakeTransformer, MemoryVfs};
    use crate::vfs::VirtualPath;
    use std::collections::HashMap as Map;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn streaming_handler_preserves_order() {
        let vfs = MemoryVfs::new();
        vfs.write_file(
            "/pages/api/stream.js",
            "module.exports = function handler(req, res) { res.write('A'); res.write('B'); res.end('C'); };",
        );
        let config = Config::load(&vfs).await;
        let backend = Arc::new(FakeTransformer::new());
        let transformer = ModuleTransformer::new(&vfs, &config, backend, "/__virtual__/3000");

        let entry = RouteEntry {
            handler_file: VirtualPath::new("/pages/api/stream.js"),
            layouts: Vec::new(),
            params: Params::default(),
            conventions: Conventions::default(),
        };
        let request = Request {
            method: "GET".to_string(),
            url: "/api/stream".to_string(),
            headers: Map::new(),
            body: None,
        };

        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let events_start = events.clone();
        let mut on_start: Box<OnStart<'_>> = Box::new(move |_status, _msg, _headers| {
            events_start.lock().unwrap().push("start".to_string());
        });
        let events_chunk = events.clone();
        let mut on_chunk: Box<OnChunk<'_>> = Box::new(move |chunk| {
            events_chunk
                .lock()
                .unwrap()
                .push(format!("chunk:{}", String::from_utf8_lossy(&chunk)));
        });
        let events_end = events.clone();
        let mut on_end: Box<OnEnd<'_>> = Box::new(move || {
            events_end.lock().unwrap().push("end".to_string());
        });

        execute_streaming(&transformer, &entry, &request, "", &mut on_start, &mut on_chunk, &mut on_end).await;

        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start".to_string(),
                "chunk:A".to_string(),
                "chunk:B".to_string(),
                "chunk:C".to_string(),
                "end".to_string(),
            ]
        );
    }
}
