//! CSS import stripping and CSS Modules scoping (spec §4.C step 3).

use lightningcss::css_modules::Config as CssModulesConfig;
use lightningcss::printer::PrinterOptions;
use lightningcss::stylesheet::{ParserOptions, StyleSheet};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::transform::cache::fnv1a_32;
use crate::vfs::{VirtualPath, Vfs};

static CSS_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+(\w+)\s+from\s+["']([^"']+\.(?:module\.)?css)["'];?\s*$"#).unwrap()
});

static CLASS_SELECTOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.([a-zA-Z_][a-zA-Z0-9_-]*)").unwrap());

/// Rewrites every top-level `import X from "*.css"` in `code`.
///
/// Plain `*.css` imports are stripped outright (global styles are loaded via
/// `<link>` tags in the shell). `*.module.css` imports are replaced inline
/// with the class map and scoped CSS text [`compile_css_module`] produced
/// for that file, plus a self-contained `<style>`-injection snippet -- no
/// runtime helper global is assumed to exist.
pub async fn strip_css_imports(code: &str, module_path: &str, vfs: &dyn Vfs) -> String {
    let module_dir = parent_dir(module_path);

    let mut out = String::with_capacity(code.len());
    let mut last_end = 0;

    for caps in CSS_IMPORT_RE.captures_iter(code) {
        let whole = caps.get(0).unwrap();
        out.push_str(&code[last_end..whole.start()]);
        last_end = whole.end();

        let binding = &caps[1];
        let import_path = &caps[2];

        if import_path.ends_with(".module.css") {
            let css_path = resolve_relative_import(&module_dir, import_path);
            let source = vfs.read_file(&css_path).await.unwrap_or_default();
            let output = compile_css_module(&source, css_path.as_str());
            out.push_str(&rewrite_css_module_import(binding, &output, css_path.as_str()));
        }
        // Plain CSS imports are dropped entirely (replaced with nothing).
    }

    out.push_str(&code[last_end..]);
    out
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => "/".to_string(),
    }
}

/// Resolves a relative (`./`, `../`) import specifier against the importing
/// module's directory. Non-relative specifiers are returned as-is rooted at
/// `/`, since this crate only ever calls this with specifiers already
/// confirmed to end in `.css`/`.module.css`.
fn resolve_relative_import(module_dir: &str, import_path: &str) -> VirtualPath {
    let mut segments: Vec<&str> = module_dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in import_path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    VirtualPath::new(format!("/{}", segments.join("/")))
}

fn rewrite_css_module_import(binding: &str, output: &CssModuleOutput, css_path: &str) -> String {
    let entries = output
        .classes
        .iter()
        .map(|(original, scoped)| format!("{:?}:{:?}", original, scoped))
        .collect::<Vec<_>>()
        .join(",");

    let style_id = format!("css-module-{:x}", fnv1a_32(css_path.as_bytes()));

    format!(
        "const {binding} = {{{entries}}};\n\
         if (typeof document !== \"undefined\" && !document.getElementById({style_id:?})) {{\n\
         \u{20}\u{20}const __cssModuleStyleEl = document.createElement(\"style\");\n\
         \u{20}\u{20}__cssModuleStyleEl.id = {style_id:?};\n\
         \u{20}\u{20}__cssModuleStyleEl.textContent = {css:?};\n\
         \u{20}\u{20}document.head.appendChild(__cssModuleStyleEl);\n\
         }}\n",
        css = output.scoped_css,
    )
}

/// Parses a CSS module's source with `lightningcss`'s built-in CSS Modules
/// support and returns the real class map (`original -> scoped`) it
/// generates, plus the rewritten CSS text. Falls back to a regex-based class
/// extraction (no real selector rewriting) only when the parser itself
/// errors, matching the "fallback to regex extraction permitted when the
/// parser errors" allowance in the spec.
pub fn compile_css_module(source: &str, module_path: &str) -> CssModuleOutput {
    let options = ParserOptions {
        css_modules: Some(CssModulesConfig::default()),
        ..ParserOptions::default()
    };

    let stylesheet = match StyleSheet::parse(source, options) {
        Ok(stylesheet) => stylesheet,
        Err(_) => return extract_with_regex(source, module_path),
    };

    match stylesheet.to_css(PrinterOptions::default()) {
        Ok(result) => {
            let classes = result
                .exports
                .map(|exports| {
                    exports
                        .into_iter()
                        .map(|(original, export)| (original, export.name))
                        .collect()
                })
                .unwrap_or_default();
            CssModuleOutput {
                classes,
                scoped_css: result.code,
            }
        }
        Err(_) => extract_with_regex(source, module_path),
    }
}

pub struct CssModuleOutput {
    pub classes: Vec<(String, String)>,
    pub scoped_css: String,
}

fn extract_with_regex(source: &str, module_path: &str) -> CssModuleOutput {
    let file_hash = format!("{:x}", fnv1a_32(module_path.as_bytes()) & 0xffff);
    let mut classes = Vec::new();
    let mut scoped_css = source.to_string();

    let mut seen = std::collections::HashSet::new();
    for caps in CLASS_SELECTOR_RE.captures_iter(source) {
        let original = caps[1].to_string();
        if !seen.insert(original.clone()) {
            continue;
        }
        let scoped = format!("{original}__{file_hash}");
        scoped_css = scoped_css.replace(&format!(".{original}"), &format!(".{scoped}"));
        classes.push((original, scoped));
    }

    CssModuleOutput { classes, scoped_css }
}
