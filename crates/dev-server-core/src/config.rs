//! Config Resolver (spec §4.A).
//!
//! Scans the virtual filesystem for a framework config file and a
//! TypeScript-style path-alias file, extracting only the handful of keys
//! this server cares about. Neither file is ever evaluated as JavaScript;
//! `next.config.*` is scanned with a regex, matching the constraint that the
//! module transformer is never invoked during config resolution.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigParseError;
use crate::vfs::{first_existing_file, VirtualPath, Vfs};

/// Whether App Router or Pages Router resolution is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterPreference {
    Forced(bool),
    Auto,
}

/// Layered configuration for a project, loaded once at server construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub pages_dir: VirtualPath,
    pub app_dir: VirtualPath,
    pub public_dir: VirtualPath,
    pub page_extensions: Vec<String>,
    pub prefer_app_router: RouterPreference,
    pub public_env_prefix: String,

    pub base_path: String,
    pub asset_prefix: String,
    pub alias_map: Vec<(String, String)>,
    /// An inline script body for a discovered style-framework config
    /// (spec §4.D shell section 3), already rewritten from the file's
    /// module-export form to a bare global assignment the style CDN script
    /// expects. `None` when no such file exists in the VFS.
    pub style_framework_config: Option<String>,
    /// Config files that were present but ignored because they could not be
    /// parsed or had no recognizable keys (spec §7 `ConfigParseError`).
    pub warnings: Vec<ConfigParseError>,
    env: HashMap<String, String>,
}

const NEXT_CONFIG_CANDIDATES: &[&str] = &["next.config.js", "next.config.mjs", "next.config.ts"];
const TAILWIND_CONFIG_CANDIDATES: &[&str] =
    &["tailwind.config.js", "tailwind.config.cjs", "tailwind.config.ts"];

static BASE_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"basePath\s*:\s*["']([^"']*)["']"#).unwrap());
static ASSET_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"assetPrefix\s*:\s*["']([^"']*)["']"#).unwrap());

#[derive(Debug, Deserialize, Default)]
struct TsPathsFile {
    #[serde(rename = "compilerOptions", default)]
    compiler_options: CompilerOptions,
}

#[derive(Debug, Deserialize, Default)]
struct CompilerOptions {
    #[serde(rename = "baseUrl", default)]
    base_url: Option<String>,
    #[serde(default)]
    paths: HashMap<String, Vec<String>>,
}

impl Config {
    /// Loads configuration from `vfs`. Never fails: a malformed or absent
    /// config file degrades to defaults, with a `tracing::warn!` per file
    /// that was ignored (spec §7, `ConfigParseError`).
    pub async fn load(vfs: &dyn Vfs) -> Config {
        let mut config = Config::defaults();

        if let Some((path, contents)) = Self::read_first_existing(vfs, NEXT_CONFIG_CANDIDATES).await {
            if let Err(err) = Self::apply_next_config(&mut config, &path, &contents) {
                config.warnings.push(err);
            }
        }

        for candidate in ["tsconfig.json", "jsconfig.json"] {
            let path = VirtualPath::new(format!("/{candidate}"));
            if vfs.exists(&path).await {
                if let Ok(contents) = vfs.read_file(&path).await {
                    if let Err(err) = Self::apply_ts_paths(&mut config, path.as_str(), &contents) {
                        config.warnings.push(err);
                    }
                }
                break;
            }
        }

        if let Some((_, contents)) = Self::read_first_existing(vfs, TAILWIND_CONFIG_CANDIDATES).await {
            config.style_framework_config = Some(rewrite_style_framework_config(&contents));
        }

        if config.prefer_app_router == RouterPreference::Auto {
            let (layout, page) = futures::future::join(
                first_existing_file(vfs, &config.app_dir, "layout", &config.page_extensions),
                first_existing_file(vfs, &config.app_dir, "page", &config.page_extensions),
            )
            .await;
            config.prefer_app_router = RouterPreference::Forced(layout.is_some() || page.is_some());
        }

        config
    }

    fn defaults() -> Config {
        Config {
            pages_dir: VirtualPath::new("/pages"),
            app_dir: VirtualPath::new("/app"),
            public_dir: VirtualPath::new("/public"),
            page_extensions: vec!["tsx", "ts", "jsx", "js"]
                .into_iter()
                .map(String::from)
                .collect(),
            prefer_app_router: RouterPreference::Auto,
            public_env_prefix: "NEXT_PUBLIC_".to_string(),
            base_path: String::new(),
            asset_prefix: String::new(),
            alias_map: Vec::new(),
            style_framework_config: None,
            warnings: Vec::new(),
            env: HashMap::new(),
        }
    }

    async fn read_first_existing(
        vfs: &dyn Vfs,
        candidates: &[&str],
    ) -> Option<(VirtualPath, String)> {
        for candidate in candidates {
            let path = VirtualPath::new(format!("/{candidate}"));
            if vfs.exists(&path).await {
                match vfs.read_file(&path).await {
                    Ok(contents) => return Some((path, contents)),
                    Err(err) => {
                        tracing::warn!(path = %path, error = %err, "failed to read config file");
                        return None;
                    }
                }
            }
        }
        None
    }

    fn apply_next_config(
        config: &mut Config,
        path: &VirtualPath,
        contents: &str,
    ) -> Result<(), ConfigParseError> {
        let base_path = BASE_PATH_RE
            .captures(contents)
            .map(|c| c[1].to_string());
        let asset_prefix = ASSET_PREFIX_RE
            .captures(contents)
            .map(|c| c[1].to_string());

        if base_path.is_none() && asset_prefix.is_none() {
            tracing::warn!(path = %path, "next.config file had no recognizable keys, ignoring");
            return Err(ConfigParseError::NoRecognizedKeys {
                path: path.to_string(),
            });
        }

        if let Some(mut base_path) = base_path {
            normalize_prefix(&mut base_path);
            config.base_path = base_path;
        }
        if let Some(mut asset_prefix) = asset_prefix {
            normalize_prefix(&mut asset_prefix);
            config.asset_prefix = asset_prefix;
        }
        Ok(())
    }

    fn apply_ts_paths(config: &mut Config, path: &str, contents: &str) -> Result<(), ConfigParseError> {
        let parsed: TsPathsFile = match serde_json::from_str(contents) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(path, error = %err, "failed to parse tsconfig/jsconfig paths, ignoring");
                return Err(ConfigParseError::InvalidJson {
                    path: path.to_string(),
                    message: err.to_string(),
                });
            }
        };

        let base_url = parsed
            .compiler_options
            .base_url
            .unwrap_or_else(|| ".".to_string());

        for (alias, targets) in parsed.compiler_options.paths {
            let Some(target) = targets.first() else {
                continue;
            };
            let Some(alias_prefix) = alias.strip_suffix('*') else {
                continue;
            };
            let Some(target_suffix) = target.strip_suffix('*') else {
                continue;
            };
            let resolved = join_relative(&base_url, target_suffix);
            config.alias_map.push((alias_prefix.to_string(), resolved));
        }
        Ok(())
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn all_env(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Env vars safe to inline into HTML: those whose key begins with
    /// [`Config::public_env_prefix`] (spec §7 "Env isolation").
    pub fn public_env(&self) -> impl Iterator<Item = (&str, &str)> {
        self.all_env()
            .filter(move |(k, _)| k.starts_with(self.public_env_prefix.as_str()))
    }

    pub fn is_app_router(&self) -> bool {
        matches!(self.prefer_app_router, RouterPreference::Forced(true))
    }
}

/// Rewrites a `tailwind.config.*` file's module-export form into a bare
/// global assignment, the shape the Tailwind Play CDN script expects on
/// `window.tailwind.config`.
fn rewrite_style_framework_config(contents: &str) -> String {
    if let Some(idx) = contents.find("module.exports") {
        let mut rewritten = contents.to_string();
        rewritten.replace_range(idx..idx + "module.exports".len(), "tailwind.config");
        rewritten
    } else if let Some(idx) = contents.find("export default") {
        let mut rewritten = contents.to_string();
        rewritten.replace_range(idx..idx + "export default".len(), "tailwind.config =");
        rewritten
    } else {
        contents.to_string()
    }
}

fn normalize_prefix(prefix: &mut String) {
    if !prefix.is_empty() && !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.len() > 1 && prefix.ends_with('/') {
        prefix.pop();
    }
}

fn join_relative(base: &str, suffix: &str) -> String {
    let base = base.trim_start_matches("./").trim_end_matches('/');
    let suffix = suffix.trim_start_matches("./").trim_start_matches('/');
    if base.is_empty() || base == "." {
        format!("/{suffix}")
    } else {
        format!("/{base}/{suffix}")
    }
}
