//! The in-process module-evaluation boundary (spec §9 "Dynamic require/import").
//!
//! The dispatcher never assumes a particular execution mechanism for
//! transformed CJS handler code -- it depends only on [`ModuleEvaluator`].
//! [`MiniEvaluator`] is the default, minimal implementation shipped with
//! this crate: it recognizes the fixed, small vocabulary of calls a
//! file-based request handler makes (`res.write`, `res.end`, `res.json`,
//! `res.send`, `res.status`, `res.redirect`, and `export function GET`-style
//! method exports) via pattern matching on the transformed source, in the
//! order they appear. A production embedding (a real JS engine) swaps in
//! behind the same trait without the dispatcher changing.

use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

/// Context supplied to a handler invocation: everything a `req`/`Request`
/// object in the sandboxed module would read.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub method: String,
    pub url: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub env: HashMap<String, String>,
    pub params_json: String,
}

#[derive(Debug, Clone)]
pub struct WebResult {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// One action a legacy-style (`pages/api`) handler performed against `res`,
/// in call order.
#[derive(Debug, Clone)]
pub enum LegacyAction {
    Status(u16),
    Write(Vec<u8>),
    Json(String),
    Send(Vec<u8>),
    Redirect(u16, String),
    End(Option<Vec<u8>>),
}

#[async_trait]
pub trait ModuleEvaluator: Send + Sync {
    /// Evaluates an App Router `route.<ext>` module and invokes the export
    /// matching `method` (case-insensitively). `Ok(None)` means the module
    /// does not export that method (spec §7 `MethodNotAllowed`).
    async fn evaluate_web(
        &self,
        code: &str,
        method: &str,
        ctx: &EvalContext,
    ) -> anyhow::Result<Option<WebResult>>;

    /// Evaluates a legacy (`pages/api`) handler module's default export and
    /// returns the ordered sequence of `res` actions it performed.
    async fn evaluate_legacy(
        &self,
        code: &str,
        ctx: &EvalContext,
    ) -> anyhow::Result<Vec<LegacyAction>>;
}

static EXPORTED_METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"exports\.(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)\s*=").unwrap()
});

static RESPONSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"new Response\((?:(["'`])((?:[^"'`\\]|\\.)*)\1)?(?:,\s*\{\s*status:\s*(\d+)\s*\})?\)"#).unwrap()
});

static RES_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"res\.(write|end|json|send|status|redirect)\((?:(\d+)\s*,\s*)?(?:(["'`])((?:[^"'`\\]|\\.)*)\3)?\)"#,
    )
    .unwrap()
});

/// The crate's default [`ModuleEvaluator`]. See the module docs for scope.
pub struct MiniEvaluator;

impl MiniEvaluator {
    pub fn new() -> Self {
        MiniEvaluator
    }
}

impl Default for MiniEvaluator {
    fn default() -> Self {
        MiniEvaluator::new()
    }
}

#[async_trait]
impl ModuleEvaluator for MiniEvaluator {
    async fn evaluate_web(
        &self,
        code: &str,
        method: &str,
        _ctx: &EvalContext,
    ) -> anyhow::Result<Option<WebResult>> {
        let exported: Vec<String> = EXPORTED_METHOD_RE
            .captures_iter(code)
            .map(|c| c[1].to_string())
            .collect();

        if !exported.iter().any(|m| m.eq_ignore_ascii_case(method)) {
            return Ok(None);
        }

        let response = RESPONSE_RE.captures(code);
        if response.is_none() {
            // The handler exports the method but its body never constructs a
            // `Response`. A real embedding would leave the returned promise
            // unsettled forever (nothing ever resolves the route's fetch
            // handler); modeled here by never resolving this future so the
            // dispatcher's handler timeout is the only thing that ends it.
            std::future::pending::<()>().await;
            unreachable!("pending future never resolves");
        }
        let caps = response.unwrap();

        let body = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        let status = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .unwrap_or(200);

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "text/plain".to_string());

        Ok(Some(WebResult {
            status,
            headers,
            body: body.into_bytes(),
        }))
    }

    async fn evaluate_legacy(&self, code: &str, _ctx: &EvalContext) -> anyhow::Result<Vec<LegacyAction>> {
        let mut actions = Vec::new();
        for caps in RES_CALL_RE.captures_iter(code) {
            let call = &caps[1];
            let string_arg = caps.get(4).map(|m| m.as_str().to_string());
            let num_arg = caps.get(2).and_then(|m| m.as_str().parse::<u16>().ok());

            let action = match call {
                "status" => num_arg.map(LegacyAction::Status),
                "write" => string_arg.map(|s| LegacyAction::Write(s.into_bytes())),
                "json" => string_arg.map(LegacyAction::Json),
                "send" => string_arg.map(|s| LegacyAction::Send(s.into_bytes())),
                "redirect" => string_arg.map(|s| LegacyAction::Redirect(num_arg.unwrap_or(302), s)),
                "end" => Some(LegacyAction::End(string_arg.map(|s| s.into_bytes()))),
                _ => None,
            };
            if let Some(action) = action {
                actions.push(action);
            }
        }

        let completes_response = actions
            .iter()
            .any(|a| matches!(a, LegacyAction::End(_) | LegacyAction::Json(_) | LegacyAction::Send(_) | LegacyAction::Redirect(..)));
        if !completes_response {
            // Express/Next's legacy API routes only finish a response when
            // one of res.end/json/send/redirect is called. A handler that
            // never calls any of them leaves the real response hanging
            // indefinitely -- modeled the same way as the web-style path
            // above, by never resolving.
            std::future::pending::<()>().await;
            unreachable!("pending future never resolves");
        }

        Ok(actions)
    }
}
