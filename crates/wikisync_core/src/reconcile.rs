use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::SyncConfig;
use crate::expected::ExpectedPages;
use crate::normalize::{fold_key, normalize_title};
use crate::page::{PageOutcome, compare_page};
use crate::pages::{PageFile, read_page, scan_pages, write_page};
use crate::report::render_report;
use crate::runtime::{ResolvedPaths, write_text_file};

#[derive(Debug, Clone, Default)]
pub struct CompareRunOptions {
    /// Overrides `compare.pages` from the config when non-empty.
    pub titles: Vec<String>,
    pub write: bool,
    pub include_diffs: bool,
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub include_diffs: bool,
    pub checks: Vec<String>,
    pub pages_scanned: usize,
    pub pages_written: usize,
    pub outcomes: Vec<PageOutcome>,
    pub report_path: Option<PathBuf>,
}

impl RunReport {
    pub fn pages_with_mismatches(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.has_mismatches())
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.outcomes
            .iter()
            .map(|outcome| outcome.warnings.len())
            .sum()
    }
}

/// Compares every selected page with its expected data and, outside dry-run,
/// writes changed pages back.
pub fn run_compare(
    paths: &ResolvedPaths,
    config: &SyncConfig,
    expected: &ExpectedPages,
    options: &CompareRunOptions,
) -> Result<RunReport> {
    let dry_run = !options.write && config.dry_run();
    let include_diffs = options.include_diffs || config.compare.include_diffs;

    let filter = if options.titles.is_empty() {
        &config.compare.pages
    } else {
        &options.titles
    };
    let wanted = filter
        .iter()
        .map(|title| fold_key(&normalize_title(title)))
        .filter(|title| !title.is_empty())
        .collect::<HashSet<_>>();

    let pages = scan_pages(paths)?
        .into_iter()
        .filter(|page| wanted.is_empty() || wanted.contains(&fold_key(&normalize_title(&page.title))))
        .collect::<Vec<_>>();
    info!(
        "comparing {} page(s) against {} expected page(s)",
        pages.len(),
        expected.len()
    );

    let mut results = pages
        .par_iter()
        .map(|page| (page, compare_one(page, config, expected)))
        .collect::<Vec<_>>();
    results.sort_by(|left, right| left.1.title.cmp(&right.1.title));

    let mut pages_written = 0usize;
    for (page, outcome) in &results {
        for warning in &outcome.warnings {
            warn!("{}: {warning}", outcome.title);
        }
        if dry_run || !outcome.has_mismatches() || !outcome.changed() {
            continue;
        }
        write_page(paths, page, &outcome.patched)?;
        pages_written += 1;
        info!("wrote {}", page.relative_path);
    }

    let report = RunReport {
        dry_run,
        include_diffs,
        checks: config.check_names(),
        pages_scanned: results.len(),
        pages_written,
        outcomes: results.into_iter().map(|(_, outcome)| outcome).collect(),
        report_path: options.report_path.clone(),
    };
    info!(
        "compared {} page(s): {} with mismatches, {} written",
        report.pages_scanned,
        report.pages_with_mismatches(),
        report.pages_written
    );

    if let Some(path) = &report.report_path {
        write_text_file(path, &render_report(&report), true)?;
    }
    Ok(report)
}

fn compare_one(page: &PageFile, config: &SyncConfig, expected: &ExpectedPages) -> PageOutcome {
    let text = match read_page(page) {
        Ok(text) => text,
        Err(error) => {
            return PageOutcome::skipped(
                &page.title,
                String::new(),
                format!("Failed to read page: {error:#}"),
            );
        }
    };
    match expected.page(&page.title) {
        Some(entry) => compare_page(&page.title, &text, &entry.templates, &config.checks),
        None => PageOutcome::skipped(
            &page.title,
            text,
            "Could not resolve expected data for page title. Skipping.".to_string(),
        ),
    }
}
