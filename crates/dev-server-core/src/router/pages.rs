//! Pages mode resolution (spec §4.B "Pages mode resolution").

use crate::config::Config;
use crate::vfs::{first_existing_file, VirtualPath, Vfs};

use super::segment::{split_segments, Params, SegmentKind};
use super::{Conventions, RouteEntry};

pub async fn resolve_page(vfs: &dyn Vfs, config: &Config, pathname: &str) -> Option<RouteEntry> {
    let normalized = if pathname == "/" { "/index" } else { pathname };

    if let Some(file) = first_existing_file(
        vfs,
        &config.pages_dir,
        normalized.trim_start_matches('/'),
        &config.page_extensions,
    )
    .await
    {
        return Some(RouteEntry {
            handler_file: file,
            layouts: Vec::new(),
            params: Params::default(),
            conventions: Conventions::default(),
        });
    }

    let segments = split_segments(normalized);
    if let Some((file, dir)) = first_existing_file_in_subdir(vfs, config, &segments).await {
        let _ = dir;
        return Some(RouteEntry {
            handler_file: file,
            layouts: Vec::new(),
            params: Params::default(),
            conventions: Conventions::default(),
        });
    }

    resolve_dynamic(vfs, config, &segments).await
}

async fn first_existing_file_in_subdir(
    vfs: &dyn Vfs,
    config: &Config,
    segments: &[&str],
) -> Option<(VirtualPath, VirtualPath)> {
    let mut dir = config.pages_dir.clone();
    for segment in segments {
        dir = dir.join(segment);
    }
    first_existing_file(vfs, &dir, "index", &config.page_extensions)
        .await
        .map(|file| (file, dir))
}

/// Walks the directory tree segment by segment, trying at each level: an
/// exact-named child, then a `[name]` dynamic file/directory, then a
/// `[...name]` catch-all file. First success wins.
async fn resolve_dynamic(vfs: &dyn Vfs, config: &Config, segments: &[&str]) -> Option<RouteEntry> {
    let mut params = Params::default();
    let mut dir = config.pages_dir.clone();

    for (index, segment) in segments.iter().enumerate() {
        let remaining_is_last = index == segments.len() - 1;

        // Exact-named directory, only useful if more segments follow.
        let exact_dir = dir.join(segment);
        if !remaining_is_last && vfs.is_directory(&exact_dir).await {
            dir = exact_dir;
            continue;
        }

        if remaining_is_last {
            if let Some(file) =
                first_existing_file(vfs, &dir, segment, &config.page_extensions).await
            {
                return Some(RouteEntry {
                    handler_file: file,
                    layouts: Vec::new(),
                    params,
                    conventions: Conventions::default(),
                });
            }
            if vfs.is_directory(&exact_dir).await {
                if let Some(file) =
                    first_existing_file(vfs, &exact_dir, "index", &config.page_extensions).await
                {
                    return Some(RouteEntry {
                        handler_file: file,
                        layouts: Vec::new(),
                        params,
                        conventions: Conventions::default(),
                    });
                }
            }
        }

        if let Some((name, new_dir)) = find_dynamic_dir(vfs, &dir, segment).await {
            params.insert_single(name, *segment);
            dir = new_dir;
            if remaining_is_last {
                if let Some(file) =
                    first_existing_file(vfs, &dir, "index", &config.page_extensions).await
                {
                    return Some(RouteEntry {
                        handler_file: file,
                        layouts: Vec::new(),
                        params,
                        conventions: Conventions::default(),
                    });
                }
            }
            continue;
        }

        if remaining_is_last {
            if let Some((name, file)) = find_dynamic_file(vfs, &dir, segment, config).await {
                params.insert_single(name, *segment);
                return Some(RouteEntry {
                    handler_file: file,
                    layouts: Vec::new(),
                    params,
                    conventions: Conventions::default(),
                });
            }
        }

        if remaining_is_last {
            if let Some((name, values, file)) =
                find_catch_all(vfs, &dir, &segments[index..], config).await
            {
                params.insert_multi(name, values);
                return Some(RouteEntry {
                    handler_file: file,
                    layouts: Vec::new(),
                    params,
                    conventions: Conventions::default(),
                });
            }
        } else if let Some((name, values, file)) =
            find_catch_all(vfs, &dir, &segments[index..], config).await
        {
            params.insert_multi(name, values);
            return Some(RouteEntry {
                handler_file: file,
                layouts: Vec::new(),
                params,
                conventions: Conventions::default(),
            });
        }

        return None;
    }

    None
}

async fn find_dynamic_dir(
    vfs: &dyn Vfs,
    dir: &VirtualPath,
    segment: &str,
) -> Option<(String, VirtualPath)> {
    let entries = vfs.read_dir(dir).await.ok()?;
    for entry in entries {
        if let crate::vfs::DirectoryEntry::Directory(path) = &entry {
            let name = path.as_str().rsplit('/').next().unwrap_or_default();
            if let SegmentKind::Dynamic(bound) = SegmentKind::classify(name) {
                let _ = segment;
                return Some((bound, path.clone()));
            }
        }
    }
    None
}

async fn find_dynamic_file(
    vfs: &dyn Vfs,
    dir: &VirtualPath,
    _segment: &str,
    config: &Config,
) -> Option<(String, VirtualPath)> {
    let entries = vfs.read_dir(dir).await.ok()?;
    for entry in entries {
        if let crate::vfs::DirectoryEntry::File(path) = &entry {
            let stem = path.file_stem().unwrap_or_default();
            let ext = path.extension().unwrap_or_default();
            if !config.page_extensions.iter().any(|e| e == ext) {
                continue;
            }
            if let SegmentKind::Dynamic(bound) = SegmentKind::classify(stem) {
                return Some((bound, path.clone()));
            }
        }
    }
    None
}

async fn find_catch_all(
    vfs: &dyn Vfs,
    dir: &VirtualPath,
    remaining_segments: &[&str],
    config: &Config,
) -> Option<(String, Vec<String>, VirtualPath)> {
    let entries = vfs.read_dir(dir).await.ok()?;
    for entry in entries {
        if let crate::vfs::DirectoryEntry::File(path) = &entry {
            let stem = path.file_stem().unwrap_or_default();
            let ext = path.extension().unwrap_or_default();
            if !config.page_extensions.iter().any(|e| e == ext) {
                continue;
            }
            if let SegmentKind::CatchAll(bound) = SegmentKind::classify(stem) {
                let values = remaining_segments.iter().map(|s| s.to_string()).collect();
                return Some((bound, values, path.clone()));
            }
        }
    }
    None
}
