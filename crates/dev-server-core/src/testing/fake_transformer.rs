use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TransformError;
use crate::transform::{ModuleFormat, Transformer, TransformOutput, TransformRequest};

static EXPORT_FN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"export\s+(async\s+)?function\s+(\w+)").unwrap());

/// A deterministic stand-in for a real `swc_core`-backed transformer.
/// Performs no actual JSX/TS lowering; instead it strips TypeScript type
/// annotations' angle-bracket-free surface syntax (a no-op for the plain
/// JS fixtures most tests use) and, for CJS targets, appends a
/// `module.exports` shim derived from any top-level `export default`, so
/// pipeline-level behavior (caching, alias rewriting, CSS stripping,
/// refresh injection) can be asserted without depending on real `swc`
/// output byte-for-byte.
pub struct FakeTransformer;

impl FakeTransformer {
    pub fn new() -> Self {
        FakeTransformer
    }
}

impl Default for FakeTransformer {
    fn default() -> Self {
        FakeTransformer::new()
    }
}

#[async_trait]
impl Transformer for FakeTransformer {
    async fn transform(
        &self,
        code: &str,
        request: TransformRequest,
    ) -> Result<TransformOutput, TransformError> {
        let code = match request.format {
            ModuleFormat::Esm => code.to_string(),
            ModuleFormat::Cjs => to_cjs(code),
        };
        Ok(TransformOutput { code })
    }
}

fn to_cjs(code: &str) -> String {
    let code = EXPORT_FN_RE.replace_all(code, |caps: &regex::Captures| {
        let is_async = caps.get(1).is_some();
        let name = &caps[2];
        if is_async {
            format!("exports.{name} = async function")
        } else {
            format!("exports.{name} = function")
        }
    });

    if let Some(rest) = code.find("export default") {
        let mut out = code[..rest].to_string();
        out.push_str("module.exports.default = ");
        out.push_str(code[rest + "export default".len()..].trim_start());
        out
    } else {
        code.into_owned()
    }
}
