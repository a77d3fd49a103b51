//! Path alias resolution and bare-import CDN rewriting (spec §4.C steps 4, 6).
//!
//! Specifier rewriting is done at the AST level with `swc_core`'s
//! ECMAScript parser, mutating only string literals that sit in `import`,
//! `export ... from`, and dynamic `import()` position -- never ordinary
//! string literals or comments.

use std::sync::Arc;

use swc_core::common::{sync::Lrc, FileName, SourceMap};
use swc_core::ecma::ast::{CallExpr, Callee, Expr, Lit, Module, Str};
use swc_core::ecma::codegen::{text_writer::JsWriter, Emitter};
use swc_core::ecma::parser::{lexer::Lexer, Parser, StringInput, Syntax, TsSyntax};
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

const CDN_BASE: &str = "https://esm.sh";
const NEXT_INTERNAL_PREFIX: &str = "next/";

/// Rewrites every `from "alias/..."` specifier whose prefix matches a
/// configured alias to `<virtual_prefix><target><remainder>`.
pub fn resolve_aliases(code: &str, alias_map: &[(String, String)], virtual_prefix: &str) -> String {
    let mut rewritten = code.to_string();
    rewrite_specifiers(&mut rewritten, |specifier| {
        for (prefix, target) in alias_map {
            if let Some(remainder) = specifier.strip_prefix(prefix.as_str()) {
                return Some(format!("{virtual_prefix}{target}{remainder}"));
            }
        }
        None
    })
}

/// Rewrites bare specifiers (not starting with `.`, `/`, or the reserved
/// `next/` family) to a CDN URL, preserving relative/absolute/internal
/// imports untouched.
pub fn rewrite_bare_imports_to_cdn(code: &str) -> String {
    rewrite_specifiers(code, |specifier| {
        if specifier.starts_with('.')
            || specifier.starts_with('/')
            || specifier.starts_with(NEXT_INTERNAL_PREFIX)
            || specifier.starts_with("http://")
            || specifier.starts_with("https://")
        {
            None
        } else {
            Some(format!("{CDN_BASE}/{specifier}"))
        }
    })
}

fn rewrite_specifiers(code: &str, rewrite: impl Fn(&str) -> Option<String>) -> String {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(Arc::new(FileName::Anon), code.to_string());

    let lexer = Lexer::new(
        Syntax::Typescript(TsSyntax {
            tsx: true,
            ..Default::default()
        }),
        Default::default(),
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);
    let module = match parser.parse_module() {
        Ok(module) => module,
        Err(_) => return code.to_string(),
    };

    let mut module = module;
    let mut visitor = SpecifierRewriter { rewrite: &rewrite };
    module.visit_mut_with(&mut visitor);

    print_module(&cm, &module).unwrap_or_else(|| code.to_string())
}

struct SpecifierRewriter<'a> {
    rewrite: &'a dyn Fn(&str) -> Option<String>,
}

impl VisitMut for SpecifierRewriter<'_> {
    fn visit_mut_module(&mut self, module: &mut Module) {
        use swc_core::ecma::ast::ModuleDecl;
        use swc_core::ecma::ast::ModuleItem;

        for item in &mut module.body {
            if let ModuleItem::ModuleDecl(decl) = item {
                match decl {
                    ModuleDecl::Import(import) => {
                        self.apply(&mut import.src);
                    }
                    ModuleDecl::ExportAll(export) => {
                        self.apply(&mut export.src);
                    }
                    ModuleDecl::ExportNamed(export) => {
                        if let Some(src) = &mut export.src {
                            self.apply(src);
                        }
                    }
                    _ => {}
                }
            }
        }

        module.visit_mut_children_with(self);
    }

    fn visit_mut_call_expr(&mut self, call: &mut CallExpr) {
        if let Callee::Import(_) = &call.callee {
            if let Some(arg) = call.args.first_mut() {
                if let Expr::Lit(Lit::Str(s)) = &mut *arg.expr {
                    self.apply(s);
                }
            }
        }
        call.visit_mut_children_with(self);
    }
}

impl SpecifierRewriter<'_> {
    fn apply(&self, src: &mut Str) {
        if let Some(rewritten) = (self.rewrite)(src.value.as_ref()) {
            src.value = rewritten.into();
            src.raw = None;
        }
    }
}

fn print_module(cm: &Lrc<SourceMap>, module: &Module) -> Option<String> {
    let mut buf = Vec::new();
    {
        let writer = JsWriter::new(cm.clone(), "\n", &mut buf, None);
        let mut emitter = Emitter {
            cfg: Default::default(),
            cm: cm.clone(),
            comments: None,
            wr: writer,
        };
        emitter.emit_module(module).ok()?;
    }
    String::from_utf8(buf).ok()
}
