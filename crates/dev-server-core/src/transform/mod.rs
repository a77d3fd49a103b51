//! Module Transformer (spec §4.C).

pub mod alias;
pub mod cache;
pub mod css_modules;
pub mod refresh;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::TransformError;
use crate::vfs::{VirtualPath, Vfs};

use cache::{fnv1a_32, TargetFormat, TransformCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFormat {
    Esm,
    Cjs,
}

/// Parameters handed to a [`Transformer`] backend.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub loader: Loader,
    pub format: ModuleFormat,
    pub jsx_automatic: bool,
    pub jsx_import_source: Option<String>,
    pub sourcefile: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Js,
    Jsx,
    Ts,
    Tsx,
}

impl Loader {
    pub fn from_extension(ext: &str) -> Loader {
        match ext {
            "tsx" => Loader::Tsx,
            "ts" => Loader::Ts,
            "jsx" => Loader::Jsx,
            _ => Loader::Js,
        }
    }

    pub fn requires_js_transform(self) -> bool {
        matches!(self, Loader::Jsx | Loader::Tsx | Loader::Ts)
    }
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
}

/// The transform backend boundary (spec §6). A real implementation shells
/// out to `swc_core`; [`crate::testing::FakeTransformer`] provides a
/// deterministic stand-in for tests that don't need byte-for-byte `swc`
/// fidelity.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        code: &str,
        request: TransformRequest,
    ) -> Result<TransformOutput, TransformError>;
}

/// Whether a cache lookup/store was satisfied ("hit") or recomputed ("miss").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub code: String,
    pub cache_status: CacheStatus,
}

pub struct ModuleTransformer<'a> {
    vfs: &'a dyn Vfs,
    config: &'a Config,
    backend: Arc<dyn Transformer>,
    cache: TransformCache,
    virtual_prefix: String,
}

impl<'a> ModuleTransformer<'a> {
    pub fn new(vfs: &'a dyn Vfs, config: &'a Config, backend: Arc<dyn Transformer>, virtual_prefix: impl Into<String>) -> Self {
        ModuleTransformer {
            vfs,
            config,
            backend,
            cache: TransformCache::new(),
            virtual_prefix: virtual_prefix.into(),
        }
    }

    /// Browser ESM path (spec §4.C "Browser ESM path").
    pub async fn transform_esm(&self, path: &VirtualPath) -> Result<TransformResult, TransformError> {
        self.transform(path, ModuleFormat::Esm).await
    }

    /// Handler CJS path (spec §4.C "Handler CJS path").
    pub async fn transform_cjs(&self, path: &VirtualPath) -> Result<TransformResult, TransformError> {
        self.transform(path, ModuleFormat::Cjs).await
    }

    async fn transform(
        &self,
        path: &VirtualPath,
        format: ModuleFormat,
    ) -> Result<TransformResult, TransformError> {
        let source = self.vfs.read_file(path).await.map_err(|source| TransformError::Read {
            path: path.to_string(),
            source,
        })?;

        let source_hash = fnv1a_32(source.as_bytes());
        let target_format = match format {
            ModuleFormat::Esm => TargetFormat::Esm,
            ModuleFormat::Cjs => TargetFormat::Cjs,
        };

        if let Some(cached) = self.cache.get(path, target_format, source_hash) {
            return Ok(TransformResult {
                code: cached,
                cache_status: CacheStatus::Hit,
            });
        }

        let ext = path.extension().unwrap_or("js");
        let loader = Loader::from_extension(ext);

        let mut code = css_modules::strip_css_imports(&source, path.as_str(), self.vfs).await;
        code = alias::resolve_aliases(&code, &self.config.alias_map, &self.virtual_prefix);

        let transformed = if loader.requires_js_transform() {
            match self
                .backend
                .transform(
                    &code,
                    TransformRequest {
                        loader,
                        format,
                        jsx_automatic: true,
                        jsx_import_source: Some("react".to_string()),
                        sourcefile: path.to_string(),
                    },
                )
                .await
            {
                Ok(output) => output.code,
                Err(err) => return Err(err),
            }
        } else {
            code
        };

        let final_code = match format {
            ModuleFormat::Esm => {
                let rewritten = alias::rewrite_bare_imports_to_cdn(&transformed);
                if matches!(loader, Loader::Jsx | Loader::Tsx) {
                    refresh::inject_refresh_if_applicable(&rewritten, path.as_str())
                } else {
                    rewritten
                }
            }
            ModuleFormat::Cjs => transformed,
        };

        self.cache
            .insert(path.clone(), target_format, source_hash, final_code.clone());

        Ok(TransformResult {
            code: final_code,
            cache_status: CacheStatus::Miss,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransformer, MemoryVfs};

    async fn make_config(vfs: &MemoryVfs) -> Config {
        Config::load(vfs).await
    }

    #[tokio::test]
    async fn second_transform_of_unchanged_file_is_a_cache_hit() {
        let vfs = MemoryVfs::new();
        vfs.write_file("/pages/index.jsx", "export default function Home() { return null; }");
        let config = make_config(&vfs).await;
        let backend = Arc::new(FakeTransformer::new());
        let transformer = ModuleTransformer::new(&vfs, &config, backend, "/__virtual__/3000");

        let path = VirtualPath::new("/pages/index.jsx");
        let first = transformer.transform_esm(&path).await.unwrap();
        assert_eq!(first.cache_status, CacheStatus::Miss);

        let second = transformer.transform_esm(&path).await.unwrap();
        assert_eq!(second.cache_status, CacheStatus::Hit);
        assert_eq!(first.code, second.code);
    }

    #[tokio::test]
    async fn edit_invalidates_cache() {
        let vfs = MemoryVfs::new();
        vfs.write_file("/pages/index.jsx", "export default function Home() { return 1; }");
        let config = make_config(&vfs).await;
        let backend = Arc::new(FakeTransformer::new());
        let transformer = ModuleTransformer::new(&vfs, &config, backend, "/__virtual__/3000");
        let path = VirtualPath::new("/pages/index.jsx");

        transformer.transform_esm(&path).await.unwrap();
        vfs.write_file("/pages/index.jsx", "export default function Home() { return 2; }");
        let after_edit = transformer.transform_esm(&path).await.unwrap();
        assert_eq!(after_edit.cache_status, CacheStatus::Miss);

        let repeat = transformer.transform_esm(&path).await.unwrap();
        assert_eq!(repeat.cache_status, CacheStatus::Hit);
    }

    #[tokio::test]
    async fn strips_css_module_import() {
        let vfs = MemoryVfs::new();
        vfs.write_file("/components/button.module.css", ".root { color: red; }\n");
        vfs.write_file(
            "/components/button.jsx",
            "import styles from \"./button.module.css\";\nexport default () => styles.root;\n",
        );
        let config = make_config(&vfs).await;
        let backend = Arc::new(FakeTransformer::new());
        let transformer = ModuleTransformer::new(&vfs, &config, backend, "/__virtual__/3000");
        let result = transformer
            .transform_esm(&VirtualPath::new("/components/button.jsx"))
            .await
            .unwrap();
        assert!(result.code.contains("const styles ="));
        assert!(result.code.contains("document.head.appendChild"));
    }
}
