use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::normalize::{KeySet, comparable_value, fold_key};
use crate::params::ParamMap;

#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    /// Prepended to keys in labels and skip lookups, e.g. `recipe.`.
    pub prefix: String,
    pub skip_keys: KeySet,
    pub qty_assume_one_suffixes: KeySet,
}

/// A single differing parameter with both sides already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub label: String,
    pub expected: String,
    pub found: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "- {} Expected {} - Found {}",
            self.label,
            quote_value(&self.expected),
            quote_value(&self.found)
        )
    }
}

pub fn mismatch_lines(mismatches: &[Mismatch]) -> Vec<String> {
    mismatches.iter().map(ToString::to_string).collect()
}

/// Compares two parameter maps over the union of their keys.
///
/// Keys match case-insensitively and are visited in case-folded order. A key
/// blank on both sides is not a mismatch.
pub fn compare_param_dicts(
    expected: &ParamMap,
    found: &ParamMap,
    options: &CompareOptions,
) -> Vec<Mismatch> {
    let mut keys: BTreeMap<String, (Option<&str>, Option<&str>, &str)> = BTreeMap::new();
    for (key, value) in expected {
        let entry = keys.entry(fold_key(key)).or_insert((None, None, key.as_str()));
        entry.0 = Some(value.as_str());
        entry.2 = key.as_str();
    }
    for (key, value) in found {
        let entry = keys.entry(fold_key(key)).or_insert((None, None, key.as_str()));
        entry.1 = Some(value.as_str());
    }

    let mut mismatches = Vec::new();
    for (expected_raw, found_raw, key) in keys.into_values() {
        if options.skip_keys.contains_labelled(key, &options.prefix) {
            continue;
        }
        let assume_one = options
            .qty_assume_one_suffixes
            .matches_suffix(key, &options.prefix);
        let expected_value = comparable_value(expected_raw.unwrap_or_default(), assume_one);
        let found_value = comparable_value(found_raw.unwrap_or_default(), assume_one);

        if expected_value.is_empty() && found_value.is_empty() {
            continue;
        }
        if expected_value != found_value {
            mismatches.push(Mismatch {
                label: format!("{}{key}", options.prefix),
                expected: expected_value,
                found: found_value,
            });
        }
    }
    mismatches
}

/// Quotes a report value: single quotes unless the value holds `'` and no `"`.
pub fn quote_value(value: &str) -> String {
    let quote = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch == quote => {
                out.push('\\');
                out.push(ch);
            }
            ch if ch.is_control() => {
                let code = u32::from(ch);
                if code < 0x100 {
                    out.push_str(&format!("\\x{code:02x}"));
                } else {
                    out.push_str(&format!("\\u{code:04x}"));
                }
            }
            ch => out.push(ch),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> ParamMap {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn numeric_formatting_is_not_a_mismatch() {
        let options = CompareOptions::default();
        assert!(compare_param_dicts(&map(&[("power", "80.0")]), &map(&[("power", "80")]), &options).is_empty());
        assert!(compare_param_dicts(&map(&[("x", "1,200")]), &map(&[("x", "1200")]), &options).is_empty());
    }

    #[test]
    fn quantity_lists_compare_with_implicit_one() {
        let options = CompareOptions {
            qty_assume_one_suffixes: KeySet::new(["ingredients"]),
            ..CompareOptions::default()
        };
        let mismatches = compare_param_dicts(
            &map(&[("ingredients", "Wood*1; Stone")]),
            &map(&[("ingredients", "Wood; Stone*1")]),
            &options,
        );
        assert!(mismatches.is_empty());

        let without = compare_param_dicts(
            &map(&[("ingredients", "Wood*1; Stone")]),
            &map(&[("ingredients", "Wood; Stone*1")]),
            &CompareOptions::default(),
        );
        assert_eq!(without.len(), 1);
    }

    #[test]
    fn mismatch_lines_quote_both_sides() {
        let mismatches = compare_param_dicts(
            &map(&[("description", "New text"), ("rarity", "2")]),
            &map(&[("description", "Old  text"), ("rarity", "2.0")]),
            &CompareOptions::default(),
        );
        assert_eq!(
            mismatch_lines(&mismatches),
            vec!["- description Expected 'New text' - Found 'Old text'".to_string()]
        );
    }

    #[test]
    fn labels_carry_prefix_and_skip_checks_both_forms() {
        let options = CompareOptions {
            prefix: "recipe.".to_string(),
            skip_keys: KeySet::new(["recipe.workbench", "schematic"]),
            ..CompareOptions::default()
        };
        let mismatches = compare_param_dicts(
            &map(&[("workbench", "Primitive"), ("schematic", "A"), ("yield", "2")]),
            &map(&[("workbench", "Forge"), ("schematic", "B"), ("yield", "1")]),
            &options,
        );
        assert_eq!(
            mismatch_lines(&mismatches),
            vec!["- recipe.yield Expected '2' - Found '1'".to_string()]
        );
    }

    #[test]
    fn absence_on_one_side_is_reported_and_blank_on_both_is_not() {
        let mismatches = compare_param_dicts(
            &map(&[("b", "value"), ("empty", "  ")]),
            &map(&[("a", "extra")]),
            &CompareOptions::default(),
        );
        assert_eq!(
            mismatch_lines(&mismatches),
            vec![
                "- a Expected '' - Found 'extra'".to_string(),
                "- b Expected 'value' - Found ''".to_string(),
            ]
        );
    }

    #[test]
    fn keys_match_case_insensitively_in_folded_order() {
        let mismatches = compare_param_dicts(
            &map(&[("Name", "Lamball"), ("alpha", "1")]),
            &map(&[("name", "Lamball"), ("ALPHA", "2")]),
            &CompareOptions::default(),
        );
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].label, "alpha");
    }

    #[test]
    fn quoting_switches_to_double_quotes_for_apostrophes() {
        assert_eq!(quote_value("Pal's"), "\"Pal's\"");
        assert_eq!(quote_value("say \"hi\" it's"), "'say \"hi\" it\\'s'");
        assert_eq!(quote_value("a\\b"), "'a\\\\b'");
        assert_eq!(quote_value(""), "''");
    }
}
