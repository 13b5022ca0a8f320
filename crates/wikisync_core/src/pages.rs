use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use walkdir::WalkDir;

use crate::runtime::{ResolvedPaths, normalize_for_display};

pub const MAIN_FOLDER: &str = "Main";
const PAGE_EXTENSION: &str = "wiki";
const REDIRECTS_FOLDER: &str = "_redirects";

/// A local `.wiki` file and the page title it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFile {
    pub title: String,
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// Lists every page under `wiki_content/`, sorted by relative path.
/// Redirect folders are not pages.
pub fn scan_pages(paths: &ResolvedPaths) -> Result<Vec<PageFile>> {
    let mut pages = Vec::new();
    if !paths.wiki_content_dir.exists() {
        return Ok(pages);
    }

    for entry in WalkDir::new(&paths.wiki_content_dir).follow_links(false) {
        let entry = entry
            .with_context(|| format!("failed to walk {}", paths.wiki_content_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(PAGE_EXTENSION) {
            continue;
        }
        let content_relative = path
            .strip_prefix(&paths.wiki_content_dir)
            .with_context(|| format!("failed to relativize {}", path.display()))?;
        let content_relative = normalize_separators(&content_relative.to_string_lossy());
        if content_relative.split('/').any(|segment| segment == REDIRECTS_FOLDER) {
            continue;
        }
        // Files directly under wiki_content/ have no namespace folder.
        if !content_relative.contains('/') {
            continue;
        }
        pages.push(PageFile {
            title: content_path_to_title(&content_relative),
            relative_path: relative_from_root(paths, path),
            absolute_path: path.to_path_buf(),
        });
    }
    pages.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
    Ok(pages)
}

/// `Main/Bushi_Noct.wiki` -> `Bushi Noct`, `Category/Pals.wiki` -> `Category:Pals`.
pub fn content_path_to_title(content_rel_path: &str) -> String {
    let normalized = normalize_separators(content_rel_path);
    let mut segments: Vec<&str> = normalized
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        return String::new();
    }
    let folder = segments.remove(0);
    let filename = segments.last().copied().unwrap_or(folder);
    let name = decode_segment(strip_page_extension(filename));
    if folder == MAIN_FOLDER || segments.is_empty() {
        name
    } else {
        format!("{folder}:{name}")
    }
}

/// Page location for a title, relative to the project root. A `Ns:` prefix
/// maps to a namespace folder only when that folder exists.
pub fn title_to_relative_path(paths: &ResolvedPaths, title: &str) -> String {
    let content_rel = relative_from_root(paths, &paths.wiki_content_dir);
    let (folder, bare) = match title.split_once(':') {
        Some((namespace, rest))
            if !namespace.trim().is_empty()
                && paths.wiki_content_dir.join(namespace.trim()).is_dir() =>
        {
            (namespace.trim(), rest.trim())
        }
        _ => (MAIN_FOLDER, title.trim()),
    };
    format!(
        "{content_rel}/{folder}/{}.{PAGE_EXTENSION}",
        title_to_filename(bare)
    )
}

pub fn page_for_title(paths: &ResolvedPaths, title: &str) -> PageFile {
    let relative_path = title_to_relative_path(paths, title);
    PageFile {
        title: title.trim().to_string(),
        absolute_path: paths.project_root.join(&relative_path),
        relative_path,
    }
}

pub fn read_page(page: &PageFile) -> Result<String> {
    fs::read_to_string(&page.absolute_path)
        .with_context(|| format!("failed to read {}", page.absolute_path.display()))
}

pub fn write_page(paths: &ResolvedPaths, page: &PageFile, content: &str) -> Result<()> {
    validate_scoped_path(paths, &page.absolute_path)?;
    if let Some(parent) = page.absolute_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&page.absolute_path, content)
        .with_context(|| format!("failed to write {}", page.absolute_path.display()))
}

pub fn validate_scoped_path(paths: &ResolvedPaths, candidate: &Path) -> Result<()> {
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        paths.project_root.join(candidate)
    };
    let normalized = normalize_pathbuf(&absolute);
    let allowed = normalize_pathbuf(&paths.wiki_content_dir);
    if normalized.starts_with(&allowed) {
        return Ok(());
    }
    bail!(
        "path escapes wiki_content/: {}\nallowed root: {}",
        normalize_for_display(&normalized),
        normalize_for_display(&allowed)
    )
}

fn relative_from_root(paths: &ResolvedPaths, path: &Path) -> String {
    match path.strip_prefix(&paths.project_root) {
        Ok(rel) => normalize_for_display(rel),
        Err(_) => normalize_for_display(path),
    }
}

fn title_to_filename(title: &str) -> String {
    title
        .replace(' ', "_")
        .replace('/', "___")
        .replace(':', "--")
}

fn decode_segment(value: &str) -> String {
    value
        .replace("___", "/")
        .replace("--", ":")
        .replace('_', " ")
}

fn strip_page_extension(value: &str) -> &str {
    value
        .strip_suffix(".wiki")
        .unwrap_or(value)
}

pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

fn normalize_pathbuf(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Path::new(std::path::MAIN_SEPARATOR_STR)),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
