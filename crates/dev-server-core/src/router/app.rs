//! App mode resolution (spec §4.B "App mode resolution").
//!
//! Grounded on the segment-by-segment matcher and nearest-ancestor
//! convention lookup pattern used by file-based App Router implementations
//! in this codebase's lineage, generalized here to walk a live VFS tree
//! instead of a pre-built manifest.

use std::future::Future;
use std::pin::Pin;

use crate::config::Config;
use crate::vfs::{DirectoryEntry, VirtualPath, Vfs};

use super::segment::{split_segments, Params, SegmentKind};
use super::{Conventions, RouteEntry};

pub async fn resolve_page(vfs: &dyn Vfs, config: &Config, pathname: &str) -> Option<RouteEntry> {
    let segments = split_segments(pathname);
    let mut ctx = Walk {
        vfs,
        config,
        layouts: Vec::new(),
        params: Params::default(),
    };
    let (dir, path_so_far) = ctx.descend(&config.app_dir, &segments, Vec::new()).await?;

    let page = find_convention_file(vfs, config, &dir, "page").await?;
    let conventions = resolve_conventions(vfs, config, &path_so_far).await;

    Some(RouteEntry {
        handler_file: page,
        layouts: ctx.layouts,
        params: ctx.params,
        conventions,
    })
}

pub async fn resolve_route_handler(
    vfs: &dyn Vfs,
    config: &Config,
    pathname: &str,
) -> Option<RouteEntry> {
    let segments = split_segments(pathname);
    let mut ctx = Walk {
        vfs,
        config,
        layouts: Vec::new(),
        params: Params::default(),
    };
    let (dir, _) = ctx.descend(&config.app_dir, &segments, Vec::new()).await?;
    let route = find_convention_file(vfs, config, &dir, "route").await?;

    Some(RouteEntry {
        handler_file: route,
        layouts: Vec::new(),
        params: ctx.params,
        conventions: Conventions::default(),
    })
}

struct Walk<'a> {
    vfs: &'a dyn Vfs,
    config: &'a Config,
    layouts: Vec<VirtualPath>,
    params: Params,
}

impl<'a> Walk<'a> {
    /// Descends from `dir` consuming `remaining` segments. Returns the
    /// directory the walk terminated in along with the directory path
    /// (outermost-first) visited, once all segments are consumed. Records a
    /// layout at every directory visited, including transparent route-group
    /// directories traversed along the way.
    fn descend<'b>(
        &'b mut self,
        dir: &'b VirtualPath,
        remaining: &'b [&'b str],
        mut visited: Vec<VirtualPath>,
    ) -> Pin<Box<dyn Future<Output = Option<(VirtualPath, Vec<VirtualPath>)>> + 'b>> {
        Box::pin(async move {
            self.record_layout(dir).await;
            visited.push(dir.clone());

            if remaining.is_empty() {
                if self.find_convention_direct(dir, "page").await.is_some() {
                    return Some((dir.clone(), visited));
                }
                if let Some(resolved) = self.try_enter_groups_for_terminal(dir, &visited).await {
                    return Some(resolved);
                }
                return Some((dir.clone(), visited));
            }

            let segment = remaining[0];
            let rest = &remaining[1..];

            // Exact-named child first.
            let exact = dir.join(segment);
            if self.vfs.is_directory(&exact).await {
                if let Some(result) = self.descend(&exact, rest, visited.clone()).await {
                    return Some(result);
                }
            }

            // Route-group children re-try the same segment inside the group.
            if let Ok(entries) = self.vfs.read_dir(dir).await {
                for entry in entries {
                    if let DirectoryEntry::Directory(path) = &entry {
                        let name = path.as_str().rsplit('/').next().unwrap_or_default();
                        if let SegmentKind::Group(_) = SegmentKind::classify(name) {
                            if let Some(result) =
                                self.descend(path, remaining, visited.clone()).await
                            {
                                return Some(result);
                            }
                        }
                    }
                }
            }

            // Single-dynamic `[name]` child.
            if let Some(dynamic_dir) = self
                .find_child(dir, |kind| matches!(kind, SegmentKind::Dynamic(_)))
                .await
            {
                if let SegmentKind::Dynamic(name) = SegmentKind::classify(
                    dynamic_dir.as_str().rsplit('/').next().unwrap_or_default(),
                ) {
                    let mut next_params = self.params.clone();
                    next_params.insert_single(name, segment);
                    let saved = std::mem::replace(&mut self.params, next_params);
                    if let Some(result) = self.descend(&dynamic_dir, rest, visited.clone()).await {
                        return Some(result);
                    }
                    self.params = saved;
                }
            }

            // Catch-all `[...name]` child: binds all remaining segments, terminates walk.
            if let Some(catch_dir) = self
                .find_child(dir, |kind| matches!(kind, SegmentKind::CatchAll(_)))
                .await
            {
                if let SegmentKind::CatchAll(name) = SegmentKind::classify(
                    catch_dir.as_str().rsplit('/').next().unwrap_or_default(),
                ) {
                    self.record_layout(&catch_dir).await;
                    visited.push(catch_dir.clone());
                    self.params
                        .insert_multi(name, remaining.iter().map(|s| s.to_string()).collect());
                    return Some((catch_dir, visited));
                }
            }

            // Optional catch-all `[[...name]]`: same, also matches when remaining is empty.
            if let Some(opt_dir) = self
                .find_child(dir, |kind| matches!(kind, SegmentKind::OptionalCatchAll(_)))
                .await
            {
                if let SegmentKind::OptionalCatchAll(name) = SegmentKind::classify(
                    opt_dir.as_str().rsplit('/').next().unwrap_or_default(),
                ) {
                    self.record_layout(&opt_dir).await;
                    visited.push(opt_dir.clone());
                    self.params
                        .insert_multi(name, remaining.iter().map(|s| s.to_string()).collect());
                    return Some((opt_dir, visited));
                }
            }

            None
        })
    }

    /// Only reached once `dir` itself has no `page` convention: when segments
    /// are exhausted but the page lives inside a route-group child directly
    /// beneath us (no further URL segments to traverse), try each group
    /// child in turn.
    async fn try_enter_groups_for_terminal(
        &mut self,
        dir: &VirtualPath,
        visited: &[VirtualPath],
    ) -> Option<(VirtualPath, Vec<VirtualPath>)> {
        let entries = self.vfs.read_dir(dir).await.ok()?;
        for entry in entries {
            if let DirectoryEntry::Directory(path) = &entry {
                let name = path.as_str().rsplit('/').next().unwrap_or_default();
                if let SegmentKind::Group(_) = SegmentKind::classify(name) {
                    if self
                        .find_convention_direct(path, "page")
                        .await
                        .is_some()
                    {
                        self.record_layout(path).await;
                        let mut visited = visited.to_vec();
                        visited.push(path.clone());
                        return Some((path.clone(), visited));
                    }
                }
            }
        }
        None
    }

    async fn find_child(
        &self,
        dir: &VirtualPath,
        predicate: impl Fn(&SegmentKind) -> bool,
    ) -> Option<VirtualPath> {
        let entries = self.vfs.read_dir(dir).await.ok()?;
        for entry in entries {
            if let DirectoryEntry::Directory(path) = &entry {
                let name = path.as_str().rsplit('/').next().unwrap_or_default();
                let kind = SegmentKind::classify(name);
                if predicate(&kind) {
                    return Some(path.clone());
                }
            }
        }
        None
    }

    async fn find_convention_direct(&self, dir: &VirtualPath, name: &str) -> Option<VirtualPath> {
        find_convention_file(self.vfs, self.config, dir, name).await
    }

    async fn record_layout(&mut self, dir: &VirtualPath) {
        if let Some(layout) = find_convention_file(self.vfs, self.config, dir, "layout").await {
            if !self.layouts.contains(&layout) {
                self.layouts.push(layout);
            }
        }
    }
}

async fn find_convention_file(
    vfs: &dyn Vfs,
    config: &Config,
    dir: &VirtualPath,
    name: &str,
) -> Option<VirtualPath> {
    crate::vfs::first_existing_file(vfs, dir, name, &config.page_extensions).await
}

/// Walks from the app root down `path_so_far` (outermost first) recording
/// the nearest (innermost, i.e. last-seen) `loading`/`error`/`not-found`
/// file at each level -- equivalent to walking in reverse from the page.
async fn resolve_conventions(
    vfs: &dyn Vfs,
    config: &Config,
    path_so_far: &[VirtualPath],
) -> Conventions {
    let mut conventions = Conventions::default();
    for dir in path_so_far {
        if let Some(loading) = find_convention_file(vfs, config, dir, "loading").await {
            conventions.loading = Some(loading);
        }
        if let Some(error) = find_convention_file(vfs, config, dir, "error").await {
            conventions.error = Some(error);
        }
        if let Some(not_found) = find_convention_file(vfs, config, dir, "not-found").await {
            conventions.not_found = Some(not_found);
        }
    }
    conventions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryVfs;

    async fn config_for(vfs: &MemoryVfs) -> Config {
        Config::load(vfs).await
    }

    #[tokio::test]
    async fn resolves_root_page() {
        let vfs = MemoryVfs::new();
        vfs.write_file("/app/layout.tsx", "export default function RootLayout() {}");
        vfs.write_file("/app/page.tsx", "export default function Home() {}");
        let config = config_for(&vfs).await;
        let resolver = super::super::RouteResolver::new(&vfs, &config);
        let entry = resolver.resolve_page("/").await.unwrap();
        assert_eq!(entry.handler_file.as_str(), "/app/page.tsx");
        assert_eq!(entry.layouts, vec![VirtualPath::new("/app/layout.tsx")]);
    }

    #[tokio::test]
    async fn route_group_layout_is_collected() {
        let vfs = MemoryVfs::new();
        vfs.write_file("/app/layout.tsx", "export default function RootLayout() {}");
        vfs.write_file(
            "/app/(marketing)/layout.tsx",
            "export default function MarketingLayout() {}",
        );
        vfs.write_file(
            "/app/(marketing)/about/page.tsx",
            "export default function About() {}",
        );
        let config = config_for(&vfs).await;
        let resolver = super::super::RouteResolver::new(&vfs, &config);
        let entry = resolver.resolve_page("/about").await.unwrap();
        assert_eq!(entry.handler_file.as_str(), "/app/(marketing)/about/page.tsx");
        assert_eq!(
            entry.layouts,
            vec![
                VirtualPath::new("/app/layout.tsx"),
                VirtualPath::new("/app/(marketing)/layout.tsx"),
            ]
        );
    }

    #[tokio::test]
    async fn catch_all_binds_remaining_segments() {
        let vfs = MemoryVfs::new();
        vfs.write_file(
            "/app/docs/[...slug]/page.tsx",
            "export default function Docs() {}",
        );
        let config = config_for(&vfs).await;
        let resolver = super::super::RouteResolver::new(&vfs, &config);
        let entry = resolver.resolve_page("/docs/a/b/c").await.unwrap();
        assert_eq!(
            entry.params.get_multi("slug"),
            Some(&["a".to_string(), "b".to_string(), "c".to_string()][..])
        );
    }

    #[tokio::test]
    async fn own_directory_page_wins_over_route_group_sibling() {
        let vfs = MemoryVfs::new();
        vfs.write_file(
            "/app/dashboard/page.tsx",
            "export default function Dashboard() {}",
        );
        vfs.write_file(
            "/app/dashboard/(overlay)/page.tsx",
            "export default function DashboardOverlay() {}",
        );
        let config = config_for(&vfs).await;
        let resolver = super::super::RouteResolver::new(&vfs, &config);
        let entry = resolver.resolve_page("/dashboard").await.unwrap();
        assert_eq!(entry.handler_file.as_str(), "/app/dashboard/page.tsx");
    }

    #[tokio::test]
    async fn nearest_ancestor_conventions_win() {
        let vfs = MemoryVfs::new();
        vfs.write_file("/app/error.tsx", "export default function RootError() {}");
        vfs.write_file(
            "/app/dashboard/error.tsx",
            "export default function DashboardError() {}",
        );
        vfs.write_file(
            "/app/dashboard/settings/page.tsx",
            "export default function Settings() {}",
        );
        let config = config_for(&vfs).await;
        let resolver = super::super::RouteResolver::new(&vfs, &config);
        let entry = resolver.resolve_page("/dashboard/settings").await.unwrap();
        assert_eq!(
            entry.conventions.error,
            Some(VirtualPath::new("/app/dashboard/error.tsx"))
        );
    }
}
