use similar::TextDiff;

use crate::normalize::normalize_newlines;
use crate::reconcile::RunReport;

const NONE: &str = "(none)";

/// Plain-text run report: mismatches grouped per page, then warnings, then
/// optional unified diffs of every changed page.
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::from("# Page Compare Output\n\n");
    out.push_str(&format!("DRY_RUN: {}\n", report.dry_run));
    out.push_str(&format!("CHECKS: {}\n", report.checks.join(", ")));

    out.push_str("\n# Parameter Mismatches\n\n");
    let mut any = false;
    for outcome in report.outcomes.iter().filter(|outcome| outcome.has_mismatches()) {
        any = true;
        out.push_str(&format!("- {}\n", outcome.title));
        for line in &outcome.mismatches {
            out.push_str(&format!("  {line}\n"));
        }
    }
    if !any {
        out.push_str(NONE);
        out.push('\n');
    }

    out.push_str("\n# Warnings\n\n");
    let mut any = false;
    for outcome in report.outcomes.iter().filter(|outcome| !outcome.warnings.is_empty()) {
        if any {
            out.push('\n');
        }
        any = true;
        out.push_str(&format!("## {}\n", outcome.title));
        for warning in &outcome.warnings {
            out.push_str(&format!("- {warning}\n"));
        }
    }
    if !any {
        out.push_str(NONE);
        out.push('\n');
    }

    if report.include_diffs {
        out.push_str("\n# Diffs\n\n");
        let mut any = false;
        for outcome in report.outcomes.iter().filter(|outcome| outcome.changed()) {
            any = true;
            out.push_str(&render_diff(&outcome.title, &outcome.original, &outcome.patched));
        }
        if !any {
            out.push_str(NONE);
            out.push('\n');
        }
    }
    out
}

pub fn render_diff(title: &str, wiki_text: &str, data_text: &str) -> String {
    let old = diff_input(wiki_text);
    let new = diff_input(data_text);
    let diff = TextDiff::from_lines(&old, &new);
    diff.unified_diff()
        .context_radius(3)
        .header(&format!("{title} - wiki"), &format!("{title} - data"))
        .to_string()
}

fn diff_input(text: &str) -> String {
    let mut normalized = normalize_newlines(text).trim().to_string();
    normalized.push('\n');
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageOutcome;

    fn outcome(title: &str, original: &str, patched: &str, mismatches: &[&str], warnings: &[&str]) -> PageOutcome {
        PageOutcome {
            title: title.to_string(),
            original: original.to_string(),
            patched: patched.to_string(),
            mismatches: mismatches.iter().map(ToString::to_string).collect(),
            warnings: warnings.iter().map(ToString::to_string).collect(),
        }
    }

    fn run(outcomes: Vec<PageOutcome>, include_diffs: bool) -> RunReport {
        RunReport {
            dry_run: true,
            include_diffs,
            checks: vec!["Item".to_string(), "Crafting Recipe".to_string()],
            pages_scanned: outcomes.len(),
            pages_written: 0,
            outcomes,
            report_path: None,
        }
    }

    #[test]
    fn report_groups_mismatches_and_warnings_per_page() {
        let rendered = render_report(&run(
            vec![
                outcome(
                    "Wood",
                    "{{Item\n|rarity = 1\n}}",
                    "{{Item\n|rarity = 2\n}}",
                    &["- rarity Expected '2' - Found '1'"],
                    &[],
                ),
                outcome("Stone", "", "", &[], &["No {{Item}} template found on page."]),
                outcome("Lamball", "", "", &[], &["first", "second"]),
            ],
            false,
        ));
        assert_eq!(
            rendered,
            "# Page Compare Output\n\nDRY_RUN: true\nCHECKS: Item, Crafting Recipe\n\n\
# Parameter Mismatches\n\n- Wood\n  - rarity Expected '2' - Found '1'\n\n\
# Warnings\n\n## Stone\n- No {{Item}} template found on page.\n\n## Lamball\n- first\n- second\n"
        );
    }

    #[test]
    fn empty_sections_say_none() {
        let rendered = render_report(&run(Vec::new(), true));
        assert!(rendered.contains("# Parameter Mismatches\n\n(none)\n"));
        assert!(rendered.contains("# Warnings\n\n(none)\n"));
        assert!(rendered.ends_with("# Diffs\n\n(none)\n"));
    }

    #[test]
    fn diffs_cover_changed_pages_only() {
        let rendered = render_report(&run(
            vec![
                outcome("Wood", "{{Item\r\n|rarity = 1\r\n}}", "{{Item\n|rarity = 2\n}}", &["x"], &[]),
                outcome("Stone", "{{Item}}\n", "{{Item}}", &[], &[]),
            ],
            true,
        ));
        assert!(rendered.contains("--- Wood - wiki\n+++ Wood - data\n"));
        assert!(rendered.contains("-|rarity = 1\n+|rarity = 2\n"));
        assert!(!rendered.contains("Stone - wiki"));
    }
}
