use super::{RawWindow, TargetDescriptor, WindowControl, WindowId};
use crate::config::AppConfig;
use crate::lock_or_recover;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};

/// Rules deciding which host windows make it into the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFilter {
    pub ignored_titles: Vec<String>,
    pub ignored_executables: Vec<String>,
    pub min_width: u32,
    pub min_height: u32,
}

impl CatalogFilter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ignored_titles: config.title_denylist(),
            ignored_executables: config.executable_denylist(),
            min_width: config.min_window_width,
            min_height: config.min_window_height,
        }
    }

    pub fn admits(&self, window: &RawWindow) -> bool {
        if window.title.is_empty() || !window.visible {
            return false;
        }
        if window.bounds.width < self.min_width || window.bounds.height < self.min_height {
            return false;
        }
        if self.ignored_titles.iter().any(|t| *t == window.title) {
            return false;
        }
        let exe = window.path.as_deref().map(executable_basename).unwrap_or("");
        !self.ignored_executables.iter().any(|e| e == exe)
    }
}

/// Last path component, accepting either separator.
pub fn executable_basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Icon lookups keyed by executable path. Misses are cached too.
#[derive(Debug, Default)]
pub struct IconCache {
    entries: Mutex<HashMap<String, Option<String>>>,
}

impl IconCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&self, exe_path: &str, load: impl FnOnce() -> Option<String>) -> Option<String> {
        if let Some(hit) = lock_or_recover(&self.entries, "icon cache").get(exe_path) {
            return hit.clone();
        }
        // Loaded outside the lock; a concurrent miss just loads twice.
        let loaded = load();
        lock_or_recover(&self.entries, "icon cache")
            .entry(exe_path.to_string())
            .or_insert(loaded)
            .clone()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.entries, "icon cache").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static ICON_CACHE: OnceLock<IconCache> = OnceLock::new();

/// Process-wide icon cache shared by every connection.
pub fn icon_cache() -> &'static IconCache {
    ICON_CACHE.get_or_init(IconCache::new)
}

/// Fresh, filtered snapshot of controllable windows.
pub fn list_targets(
    control: &dyn WindowControl,
    filter: &CatalogFilter,
    icons: &IconCache,
) -> Result<Vec<TargetDescriptor>> {
    let windows = control.list_windows()?;
    Ok(windows
        .into_iter()
        .filter(|window| filter.admits(window))
        .map(|window| {
            let icon = window
                .path
                .as_deref()
                .filter(|path| !path.is_empty())
                .and_then(|path| icons.get_or_load(path, || control.icon_for(path)));
            TargetDescriptor {
                id: window.id,
                title: window.title,
                path: window.path,
                process_id: window.process_id,
                bounds: window.bounds,
                icon,
            }
        })
        .collect())
}

/// Merge a fresh snapshot into the previous one.
///
/// Surviving ids keep their previous position but take the fresh record; ids missing
/// from `fresh` are dropped; new ids are appended in their fresh order. When `fresh`
/// repeats an id, its first record is the one kept.
pub fn merge_targets(
    previous: &[TargetDescriptor],
    fresh: &[TargetDescriptor],
) -> Vec<TargetDescriptor> {
    let mut by_id: HashMap<&WindowId, &TargetDescriptor> = HashMap::with_capacity(fresh.len());
    for target in fresh {
        by_id.entry(&target.id).or_insert(target);
    }
    let mut placed: HashSet<&WindowId> = HashSet::with_capacity(fresh.len());
    let mut merged = Vec::with_capacity(fresh.len());

    for old in previous {
        if let Some(current) = by_id.get(&old.id) {
            if placed.insert(&old.id) {
                merged.push((*current).clone());
            }
        }
    }
    for target in fresh {
        if placed.insert(&target.id) {
            merged.push(target.clone());
        }
    }
    merged
}
