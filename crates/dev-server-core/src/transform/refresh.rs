//! React Refresh registration injection (spec §4.C step 7).
//!
//! Detects top-level bindings that look like components -- a function
//! declaration, function expression, or arrow function bound to a
//! const/let/var whose name begins with an uppercase letter -- and appends
//! registration calls for each, matching the convention this codebase's
//! `swc_core`-based transforms use to drive React Fast Refresh.

use swc_core::ecma::ast::{Decl, ModuleItem, Pat, Stmt, VarDeclarator};
use swc_core::ecma::visit::{Visit, VisitWith};

/// Returns the names of top-level bindings that look like component
/// definitions: an uppercase-leading identifier bound to a function
/// declaration, function expression, or arrow function.
pub fn find_component_bindings(module: &swc_core::ecma::ast::Module) -> Vec<String> {
    let mut finder = ComponentFinder { names: Vec::new() };
    for item in &module.body {
        match item {
            ModuleItem::Stmt(Stmt::Decl(decl)) => finder.visit_decl(decl),
            ModuleItem::ModuleDecl(swc_core::ecma::ast::ModuleDecl::ExportDecl(export)) => {
                finder.visit_decl(&export.decl)
            }
            ModuleItem::ModuleDecl(swc_core::ecma::ast::ModuleDecl::ExportDefaultDecl(export)) => {
                if let swc_core::ecma::ast::DefaultDecl::Fn(f) = &export.decl {
                    if let Some(ident) = &f.ident {
                        if starts_uppercase(ident.sym.as_ref()) {
                            finder.names.push(ident.sym.to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    finder.names
}

struct ComponentFinder {
    names: Vec<String>,
}

impl Visit for ComponentFinder {
    fn visit_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Fn(f) if starts_uppercase(f.ident.sym.as_ref()) => {
                self.names.push(f.ident.sym.to_string());
            }
            Decl::Var(var) => {
                for declarator in &var.decls {
                    self.visit_var_declarator(declarator);
                }
            }
            _ => {}
        }
    }

    fn visit_var_declarator(&mut self, declarator: &VarDeclarator) {
        if let Pat::Ident(ident) = &declarator.name {
            if starts_uppercase(ident.id.sym.as_ref()) {
                if let Some(init) = &declarator.init {
                    if is_component_init(init) {
                        self.names.push(ident.id.sym.to_string());
                    }
                }
            }
        }
    }
}

fn is_component_init(expr: &swc_core::ecma::ast::Expr) -> bool {
    use swc_core::ecma::ast::Expr;
    matches!(expr, Expr::Fn(_) | Expr::Arrow(_))
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

/// Appends React Refresh registration calls, one per component binding, in
/// the format the injected HMR client (spec §4.D step 8) expects to see.
pub fn inject_refresh_registrations(code: &str, module: &swc_core::ecma::ast::Module, module_id: &str) -> String {
    let names = find_component_bindings(module);
    if names.is_empty() {
        return code.to_string();
    }

    let mut out = String::from(code);
    out.push('\n');
    for name in names {
        out.push_str(&format!(
            "__devServerRefreshRuntime.register({name}, \"{module_id} {name}\");\n"
        ));
    }
    out.push_str("__devServerRefreshRuntime.performReactRefresh();\n");
    out
}

/// Parses `code` and injects refresh registrations if it contains any
/// component-shaped bindings. Parse failures leave `code` untouched -- by
/// this point the backend has already produced valid ESM, so a failure here
/// means the output uses syntax this crate's parser doesn't recognize, and
/// refresh injection is best-effort.
pub fn inject_refresh_if_applicable(code: &str, module_id: &str) -> String {
    use std::sync::Arc;
    use swc_core::common::{sync::Lrc, FileName, SourceMap};
    use swc_core::ecma::parser::{lexer::Lexer, Parser, StringInput, Syntax, TsSyntax};

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
    let module = match Parser::new_from(lexer).parse_module() {
        Ok(module) => module,
        Err(_) => return code.to_string(),
    };

    inject_refresh_registrations(code, &module, module_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swc_core::common::{sync::Lrc, FileName, SourceMap};
    use swc_core::ecma::parser::{lexer::Lexer, Parser, StringInput, Syntax, TsSyntax};
    use std::sync::Arc;

    fn parse(code: &str) -> swc_core::ecma::ast::Module {
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
        Parser::new_from(lexer).parse_module().unwrap()
    }

    #[test]
    fn detects_uppercase_function_component() {
        let module = parse("export default function Home() { return null; }");
        let names = find_component_bindings(&module);
        assert_eq!(names, vec!["Home".to_string()]);
    }

    #[test]
    fn detects_uppercase_arrow_component() {
        let module = parse("const Button = () => null;\nexport default Button;\n");
        let names = find_component_bindings(&module);
        assert_eq!(names, vec!["Button".to_string()]);
    }

    #[test]
    fn ignores_lowercase_helper_bindings() {
        let module = parse("const formatDate = (d) => d.toString();\n");
        let names = find_component_bindings(&module);
        assert!(names.is_empty());
    }
}
