//! Web-style handler execution (spec §4.E.1): App Router `route.<ext>` modules.

use std::collections::HashMap;

use crate::error::DispatchError;
use crate::eval::{EvalContext, MiniEvaluator, ModuleEvaluator};
use crate::router::RouteEntry;
use crate::transform::ModuleTransformer;

use super::{handler_timeout, Request, Response};

pub async fn execute(
    transformer: &ModuleTransformer<'_>,
    entry: &RouteEntry,
    method: &str,
    path: &str,
    query: &str,
    request: &Request,
) -> Result<Response, DispatchError> {
    let transform_result = transformer
        .transform_cjs(&entry.handler_file)
        .await
        .map_err(DispatchError::from)?;

    let ctx = EvalContext {
        method: method.to_string(),
        url: request.url.clone(),
        query: query.to_string(),
        headers: request.headers.clone(),
        body: request.body.clone(),
        env: HashMap::new(),
        params_json: super::params_json(&entry.params),
    };

    let evaluator = MiniEvaluator::new();
    let outcome = tokio::time::timeout(
        handler_timeout(),
        evaluator.evaluate_web(&transform_result.code, method, &ctx),
    )
    .await;

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            return Err(DispatchError::HandlerError {
                path: path.to_string(),
                message: err.to_string(),
            })
        }
        Err(_) => {
            return Err(DispatchError::HandlerTimeout {
                path: path.to_string(),
            })
        }
    };

    match result {
        Some(web_result) => Ok(Response {
            status: web_result.status,
            status_message: status_message(web_result.status),
            headers: web_result.headers,
            body: web_result.body,
        }),
        None => Err(DispatchError::MethodNotAllowed {
            method: method.to_string(),
            path: path.to_string(),
        }),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::router::{Conventions, Params};
    use crate::testing::{FakeTransformer, MemoryVfs};
    use crate::vfs::VirtualPath;
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    #[tokio::test]
    async fn method_not_exported_yields_method_not_allowed() {
        let vfs = MemoryVfs::new();
        vfs.write_file(
            "/app/items/route.ts",
            "export async function GET(request) { return new Response('ok'); }",
        );
        let config = Config::load(&vfs).await;
        let backend = Arc::new(FakeTransformer::new());
        let transformer = ModuleTransformer::new(&vfs, &config, backend, "/__virtual__/3000");

        let entry = RouteEntry {
            handler_file: VirtualPath::new("/app/items/route.ts"),
            layouts: Vec::new(),
            params: Params::default(),
            conventions: Conventions::default(),
        };

        let request = Request {
            method: "POST".to_string(),
            url: "/items".to_string(),
            headers: Map::new(),
            body: None,
        };

        let err = execute(&transformer, &entry, "POST", "/items", "", &request)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MethodNotAllowed { .. }));
    }
}
