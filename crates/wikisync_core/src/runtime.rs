use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::render_default_config;

pub const STATE_DIR_NAME: &str = ".wikisync";
pub const EXPECTED_FILENAME: &str = "expected.json";
pub const REPORT_FILENAME: &str = "compare.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub expected: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
    pub executable_dir: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        let executable_dir = env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(Path::to_path_buf));
        Ok(Self {
            cwd,
            executable_dir,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub wiki_content_dir: PathBuf,
    pub state_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub config_path: PathBuf,
    pub expected_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
    pub expected_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nwiki_content_dir={}\nstate_dir={}\nreports_dir={}\nconfig_path={} ({})\nexpected_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.wiki_content_dir),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.reports_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            normalize_for_display(&self.expected_path),
            self.expected_source.as_str(),
        )
    }

    pub fn default_report_path(&self) -> PathBuf {
        self.reports_dir.join(REPORT_FILENAME)
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub project_root_exists: bool,
    pub wiki_content_exists: bool,
    pub state_dir_exists: bool,
    pub config_exists: bool,
    pub expected_exists: bool,
    pub warnings: Vec<String>,
}

pub fn inspect_runtime(paths: &ResolvedPaths) -> RuntimeStatus {
    let wiki_content_exists = paths.wiki_content_dir.exists();
    let state_dir_exists = paths.state_dir.exists();
    let config_exists = paths.config_path.exists();
    let expected_exists = paths.expected_path.exists();

    let mut warnings = Vec::new();
    if !wiki_content_exists {
        warnings.push("wiki_content/ is missing; run `wikisync init` first".to_string());
    }
    if !config_exists {
        warnings.push("config file is missing; built-in template checks apply".to_string());
    }
    if !expected_exists {
        warnings.push(format!(
            "expected data is missing at {}",
            normalize_for_display(&paths.expected_path)
        ));
    }

    RuntimeStatus {
        project_root_exists: paths.project_root.exists(),
        wiki_content_exists,
        state_dir_exists,
        config_exists,
        expected_exists,
        warnings,
    }
}

pub fn ensure_runtime_ready_for_compare(paths: &ResolvedPaths, status: &RuntimeStatus) -> Result<()> {
    if !status.wiki_content_exists || !status.expected_exists {
        bail!(
            "Runtime layout is not ready for compare.\nMissing required paths:\n  - {}\n  - {}\nRun: wikisync init --project-root {}",
            if status.wiki_content_exists {
                "wiki_content/ (ok)"
            } else {
                "wiki_content/ (missing)"
            },
            if status.expected_exists {
                "expected data (ok)"
            } else {
                "expected data (missing)"
            },
            normalize_for_display(&paths.project_root)
        );
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub materialize_config: bool,
    pub force: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            materialize_config: true,
            force: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env);
    let state_dir = project_root.join(STATE_DIR_NAME);

    let (config_path, config_source) = resolve_file(
        overrides.config.as_deref(),
        lookup_env("WIKISYNC_CONFIG"),
        &project_root,
        state_dir.join("config.toml"),
    );
    let (expected_path, expected_source) = resolve_file(
        overrides.expected.as_deref(),
        lookup_env("WIKISYNC_EXPECTED"),
        &project_root,
        state_dir.join(EXPECTED_FILENAME),
    );

    Ok(ResolvedPaths {
        wiki_content_dir: project_root.join("wiki_content"),
        reports_dir: state_dir.join("reports"),
        project_root,
        state_dir,
        config_path,
        expected_path,
        root_source,
        config_source,
        expected_source,
    })
}

fn resolve_file(
    flag: Option<&Path>,
    env_value: Option<String>,
    project_root: &Path,
    default: PathBuf,
) -> (PathBuf, ValueSource) {
    if let Some(path) = flag {
        return (absolutize(path, project_root), ValueSource::Flag);
    }
    match env_value.filter(|value| !value.trim().is_empty()) {
        Some(value) => (
            absolutize(Path::new(value.trim()), project_root),
            ValueSource::Env,
        ),
        None => (default, ValueSource::Default),
    }
}

pub fn init_layout(paths: &ResolvedPaths, options: &InitOptions) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    let required_dirs = [
        paths.wiki_content_dir.join("Main"),
        paths.state_dir.clone(),
        paths.reports_dir.clone(),
    ];
    for dir in &required_dirs {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            created_dirs.push(dir.clone());
        }
    }

    let wrote_config = if options.materialize_config {
        write_text_file(&paths.config_path, &render_default_config()?, options.force)?
    } else {
        false
    };

    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }
    if let Some(value) = lookup_env("WIKISYNC_PROJECT_ROOT").filter(|value| !value.trim().is_empty()) {
        return (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        );
    }
    let root = detect_project_root_heuristic(&context.cwd, context.executable_dir.as_deref());
    (root, ValueSource::Heuristic)
}

fn detect_project_root_heuristic(cwd: &Path, executable_dir: Option<&Path>) -> PathBuf {
    let mut seen = HashSet::new();
    let candidates = cwd
        .ancestors()
        .chain(executable_dir.into_iter().flat_map(Path::ancestors));
    for candidate in candidates {
        if !seen.insert(normalize_for_display(candidate)) {
            continue;
        }
        if candidate.join("wiki_content").is_dir() || candidate.join(STATE_DIR_NAME).is_dir() {
            return candidate.to_path_buf();
        }
    }
    cwd.to_path_buf()
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub(crate) fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub(crate) fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
