use log::debug;
use serde::{Deserialize, Serialize};

use crate::compare::{CompareOptions, compare_param_dicts, mismatch_lines};
use crate::expected::{TemplateParams, template_params};
use crate::normalize::{KeySet, fold_key, normalize_param_value_for_compare};
use crate::params::{ParamMap, param_value, parse_template_params};
use crate::patch::{PatchOptions, patch_template_params_in_place};
use crate::template::{
    TemplateBlock, extract_param_value_single_line, find_template_blocks, replace_span,
};

/// Two parameter names carrying the same value; a blank side is filled from
/// the other before comparing.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AliasPair {
    pub primary: String,
    pub alias: String,
}

/// How one template on a page is compared and patched.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TemplateCheck {
    pub template: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub skip: Vec<String>,
    #[serde(default)]
    pub multiline: Vec<String>,
    #[serde(default)]
    pub qty_suffixes: Vec<String>,
    /// Picks among several blocks by this parameter's expected value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_by: Option<String>,
    #[serde(default)]
    pub add_missing: bool,
    #[serde(default)]
    pub aliases: Vec<AliasPair>,
}

impl TemplateCheck {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
            ..Self::default()
        }
    }

    pub fn skip_keys(&self) -> KeySet {
        KeySet::new(&self.skip)
    }

    pub fn multiline_keys(&self) -> KeySet {
        KeySet::new(&self.multiline)
    }

    pub fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            prefix: self.prefix.clone(),
            skip_keys: self.skip_keys(),
            qty_assume_one_suffixes: KeySet::new(&self.qty_suffixes),
        }
    }

    pub fn patch_options(&self) -> PatchOptions {
        PatchOptions {
            prefix: self.prefix.clone(),
            skip_keys: self.skip_keys(),
            allow_multiline_keys: self.multiline_keys(),
            qty_assume_one_suffixes: KeySet::new(&self.qty_suffixes),
            add_missing_params: self.add_missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSelection {
    Selected(TemplateBlock),
    Missing,
    Ambiguous(String),
}

/// Picks the block to compare: the first one, or with `select_by` the only
/// block whose value for that key matches the expected one.
pub fn select_block(
    text: &str,
    template: &str,
    select_by: Option<&str>,
    expected: &ParamMap,
) -> BlockSelection {
    let mut blocks = find_template_blocks(text, template);
    let select_by = select_by.map(str::trim).filter(|key| !key.is_empty());
    let Some(key) = select_by else {
        return match blocks.into_iter().next() {
            Some(block) => BlockSelection::Selected(block),
            None => BlockSelection::Missing,
        };
    };
    match blocks.len() {
        0 => return BlockSelection::Missing,
        1 => return BlockSelection::Selected(blocks.remove(0)),
        _ => {}
    }

    let template = template.trim();
    let found = blocks
        .iter()
        .map(|block| extract_param_value_single_line(&block.text, key))
        .collect::<Vec<_>>();
    let listing = found
        .iter()
        .map(|value| {
            if value.is_empty() {
                "(blank)".to_string()
            } else {
                format!("'{value}'")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let canonical = param_value(expected, key).unwrap_or_default().trim();
    if canonical.is_empty() {
        return BlockSelection::Ambiguous(format!(
            "Ambiguous: multiple {{{{{template}}}}} templates but canonical {key} is blank. Found: {listing}"
        ));
    }

    let wanted = normalize_param_value_for_compare(canonical);
    let matching = found
        .iter()
        .enumerate()
        .filter(|(_, value)| normalize_param_value_for_compare(value) == wanted)
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    match matching.as_slice() {
        [index] => BlockSelection::Selected(blocks.swap_remove(*index)),
        [] => BlockSelection::Ambiguous(format!(
            "Ambiguous: multiple {{{{{template}}}}} templates; none match canonical {key} '{canonical}'. Found: {listing}"
        )),
        _ => BlockSelection::Ambiguous(format!(
            "Ambiguous: multiple {{{{{template}}}}} templates match {key} '{canonical}'."
        )),
    }
}

/// Fills whichever side of the pair is blank from the other.
pub fn apply_alias(params: &mut ParamMap, pair: &AliasPair) {
    let primary = param_value(params, &pair.primary)
        .unwrap_or_default()
        .trim()
        .to_string();
    let alias = param_value(params, &pair.alias)
        .unwrap_or_default()
        .trim()
        .to_string();
    if primary.is_empty() && !alias.is_empty() {
        set_param(params, &pair.primary, alias);
    } else if alias.is_empty() && !primary.is_empty() {
        set_param(params, &pair.alias, primary);
    }
}

fn set_param(params: &mut ParamMap, key: &str, value: String) {
    let wanted = fold_key(key.trim());
    let existing = params.keys().find(|name| fold_key(name) == wanted).cloned();
    params.insert(existing.unwrap_or_else(|| key.trim().to_string()), value);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageOutcome {
    pub title: String,
    pub original: String,
    pub patched: String,
    pub mismatches: Vec<String>,
    pub warnings: Vec<String>,
}

impl PageOutcome {
    /// An outcome that never got as far as comparing.
    pub fn skipped(title: &str, original: String, warning: String) -> Self {
        Self {
            title: title.to_string(),
            patched: original.clone(),
            original,
            mismatches: Vec::new(),
            warnings: vec![warning],
        }
    }

    pub fn changed(&self) -> bool {
        self.original.trim() != self.patched.trim()
    }

    pub fn has_mismatches(&self) -> bool {
        !self.mismatches.is_empty()
    }
}

/// Runs every check against the page in order. Each check sees the text as
/// patched by the checks before it.
pub fn compare_page(
    title: &str,
    text: &str,
    expected: &TemplateParams,
    checks: &[TemplateCheck],
) -> PageOutcome {
    let mut patched = text.to_string();
    let mut mismatches = Vec::new();
    let mut warnings = Vec::new();

    for check in checks {
        let template = check.template.trim();
        if template.is_empty() {
            continue;
        }

        let Some(expected_params) = template_params(expected, template) else {
            let count = find_template_blocks(&patched, template).len();
            if count > 0 {
                warnings.push(format!(
                    "Page has {count} {{{{{template}}}}} template(s), but data has no canonical entry. Skipping."
                ));
            }
            continue;
        };

        let block = match select_block(
            &patched,
            template,
            check.select_by.as_deref(),
            expected_params,
        ) {
            BlockSelection::Selected(block) => block,
            BlockSelection::Missing => {
                warnings.push(format!("No {{{{{template}}}}} template found on page."));
                continue;
            }
            BlockSelection::Ambiguous(reason) => {
                warnings.push(reason);
                continue;
            }
        };

        let mut found = parse_template_params(&block.text, &check.multiline_keys());
        let mut wanted = expected_params.clone();
        for pair in &check.aliases {
            apply_alias(&mut found, pair);
            apply_alias(&mut wanted, pair);
        }

        let block_mismatches = compare_param_dicts(&wanted, &found, &check.compare_options());
        if block_mismatches.is_empty() {
            continue;
        }
        mismatches.extend(mismatch_lines(&block_mismatches));

        let outcome = patch_template_params_in_place(&block.text, &wanted, &check.patch_options());
        if outcome.text != block.text {
            debug!(
                "{title}: patched {{{{{template}}}}} ({} parameter(s))",
                outcome.mismatches.len()
            );
            patched = replace_span(&patched, block.start, block.end, &outcome.text);
        }
    }

    PageOutcome {
        title: title.to_string(),
        original: text.to_string(),
        patched,
        mismatches,
        warnings,
    }
}
