use std::collections::HashMap;

use serde::Serialize;

use crate::compare::{Mismatch, mismatch_lines};
use crate::normalize::{KeySet, comparable_value, fold_key, normalize_newlines};
use crate::params::{
    ParamMap, finish_multiline, finish_single_line, is_closing_line, parse_param_line,
    split_trailing_comment,
};

#[derive(Debug, Clone, Default)]
pub struct PatchOptions {
    /// Label prefix, also honoured by skip and suffix lookups.
    pub prefix: String,
    pub skip_keys: KeySet,
    pub allow_multiline_keys: KeySet,
    pub qty_assume_one_suffixes: KeySet,
    pub add_missing_params: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchOutcome {
    pub text: String,
    pub mismatches: Vec<Mismatch>,
}

impl PatchOutcome {
    pub fn mismatch_lines(&self) -> Vec<String> {
        mismatch_lines(&self.mismatches)
    }
}

#[derive(Debug, Clone, Copy)]
struct LineSpan {
    start: usize,
    end: usize,
    next: usize,
}

fn line_spans(text: &str) -> Vec<LineSpan> {
    let mut spans = Vec::new();
    let mut start = 0usize;
    loop {
        match text[start..].find('\n') {
            Some(offset) => {
                let end = start + offset;
                spans.push(LineSpan {
                    start,
                    end,
                    next: end + 1,
                });
                start = end + 1;
            }
            None => {
                spans.push(LineSpan {
                    start,
                    end: text.len(),
                    next: text.len(),
                });
                return spans;
            }
        }
    }
}

/// Byte range of one `|key = value` parameter, from the start of its line up
/// to the next parameter line or the closing `}}`.
#[derive(Debug, Clone)]
struct ParamRegion<'a> {
    indent: &'a str,
    key: &'a str,
    first_line: &'a str,
    rest: &'a str,
    start: usize,
    end: usize,
    ends_with_newline: bool,
}

impl ParamRegion<'_> {
    fn found_value(&self, multiline: bool) -> String {
        if !multiline {
            return finish_single_line(self.first_line);
        }
        if self.rest.is_empty() {
            finish_multiline(self.first_line)
        } else {
            finish_multiline(&format!("{}\n{}", self.first_line, self.rest))
        }
    }

    fn rebuild(&self, value: &str, multiline: bool) -> String {
        let mut block = if multiline {
            format!("{}|{} = {value}", self.indent, self.key)
                .trim_end()
                .to_string()
        } else {
            let comment = split_trailing_comment(self.first_line)
                .1
                .map(str::trim)
                .unwrap_or_default();
            let first_line = [value, comment]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            let mut block = format!("{}|{} = {first_line}", self.indent, self.key)
                .trim_end()
                .to_string();
            if !self.rest.is_empty() {
                block.push('\n');
                block.push_str(self.rest);
            }
            block
        };
        if self.ends_with_newline {
            block.push('\n');
        }
        block
    }
}

fn line_text<'t>(text: &'t str, span: &LineSpan) -> &'t str {
    &text[span.start..span.end]
}

fn scan_param_regions(text: &str) -> Vec<ParamRegion<'_>> {
    let lines = line_spans(text);
    let mut regions = Vec::new();

    for (index, span) in lines.iter().enumerate() {
        let line = line_text(text, span);
        let Some(param) = parse_param_line(line) else {
            continue;
        };
        if param.key.is_empty() {
            continue;
        }
        let value_start = span.start + param.value_offset;

        let boundary = lines[index + 1..]
            .iter()
            .position(|next| {
                let next_line = line_text(text, next);
                is_closing_line(next_line) || parse_param_line(next_line).is_some()
            })
            .map(|offset| index + 1 + offset);

        let end = match boundary {
            Some(mut boundary_index) => {
                while boundary_index > index + 1
                    && line_text(text, &lines[boundary_index - 1]).trim().is_empty()
                {
                    boundary_index -= 1;
                }
                lines[boundary_index].start
            }
            // The template closes on a parameter line: stop before its `}}`.
            None => match text.rfind("}}") {
                Some(close) if close >= value_start => close,
                _ => text.len(),
            },
        };

        let first_line = &text[value_start..span.end.min(end)];
        let rest = if span.next < end {
            text[span.next..end].trim_end_matches('\n')
        } else {
            ""
        };
        regions.push(ParamRegion {
            indent: param.indent,
            key: param.key,
            first_line,
            rest,
            start: span.start,
            end,
            ends_with_newline: text[span.start..end].ends_with('\n'),
        });
    }
    regions
}

fn first_line_of(value: &str) -> String {
    normalize_newlines(value)
        .split('\n')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn insert_before_close(text: &str, lines: &[String]) -> String {
    let Some(close) = text.rfind("}}") else {
        return text.to_string();
    };
    let line_start = text[..close].rfind('\n').map_or(0, |index| index + 1);
    let split_at = if line_start > 0 && text[line_start..close].trim().is_empty() {
        line_start
    } else {
        close
    };

    let mut before = text[..split_at].to_string();
    let after = &text[split_at..];
    if !before.contains('\n') {
        before.truncate(before.trim_end().len());
    }
    if !before.ends_with('\n') {
        before.push('\n');
    }
    if before.ends_with("\n\n") {
        before.truncate(before.trim_end_matches('\n').len());
        before.push('\n');
    }

    let insertion = lines.join("\n");
    format!("{before}{}\n{after}", insertion.trim_end())
}

/// Rewrites only the parameters of one template block whose normalized value
/// differs from `expected`.
///
/// Matching parameters and skip-listed keys are left byte-for-byte intact.
/// A rewritten single-line parameter keeps its indentation, key spelling,
/// trailing `<!-- -->` comment and any extra lines captured after it; a
/// multiline parameter has its whole value replaced. With
/// `add_missing_params`, absent non-blank parameters are appended before the
/// closing `}}` in `expected` order.
pub fn patch_template_params_in_place(
    template_text: &str,
    expected: &ParamMap,
    options: &PatchOptions,
) -> PatchOutcome {
    let unchanged = || PatchOutcome {
        text: template_text.to_string(),
        mismatches: Vec::new(),
    };
    if template_text.trim().is_empty() || expected.is_empty() {
        return unchanged();
    }

    let text = normalize_newlines(template_text);
    let regions = scan_param_regions(&text);
    let mut by_key: HashMap<String, &ParamRegion<'_>> = HashMap::new();
    for region in &regions {
        by_key.insert(fold_key(region.key), region);
    }
    let indent_guess = regions.first().map_or("", |region| region.indent);

    let mut replacements: Vec<(usize, usize, String)> = Vec::new();
    let mut insertions = Vec::new();
    let mut mismatches = Vec::new();

    for (raw_key, expected_raw) in expected {
        let key = raw_key.trim();
        if key.is_empty() || options.skip_keys.contains_labelled(key, &options.prefix) {
            continue;
        }
        let multiline = options.allow_multiline_keys.contains(key);
        let assume_one = options
            .qty_assume_one_suffixes
            .matches_suffix(key, &options.prefix);
        let expected_value = comparable_value(expected_raw, assume_one);
        let replacement_value = if multiline {
            normalize_newlines(expected_raw).trim_end().to_string()
        } else {
            first_line_of(expected_raw)
        };

        let Some(region) = by_key.get(&fold_key(key)) else {
            if options.add_missing_params && !expected_value.is_empty() {
                insertions.push(
                    format!("{indent_guess}|{key} = {replacement_value}")
                        .trim_end()
                        .to_string(),
                );
                mismatches.push(Mismatch {
                    label: format!("{}{key}", options.prefix),
                    expected: expected_value,
                    found: String::new(),
                });
            }
            continue;
        };

        let found_value = comparable_value(&region.found_value(multiline), assume_one);
        if found_value == expected_value {
            continue;
        }
        mismatches.push(Mismatch {
            label: format!("{}{}", options.prefix, region.key),
            expected: expected_value,
            found: found_value,
        });
        replacements.push((
            region.start,
            region.end,
            region.rebuild(&replacement_value, multiline),
        ));
    }

    if replacements.is_empty() && insertions.is_empty() {
        return unchanged();
    }

    let mut patched = text.clone();
    replacements.sort_by(|left, right| right.0.cmp(&left.0));
    for (start, end, replacement) in replacements {
        patched.replace_range(start..end, &replacement);
    }
    if !insertions.is_empty() {
        patched = insert_before_close(&patched, &insertions);
    }

    PatchOutcome {
        text: patched,
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{CompareOptions, compare_param_dicts};
    use crate::params::parse_template_params;

    fn map(pairs: &[(&str, &str)]) -> ParamMap {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn rewrites_only_the_mismatched_parameter() {
        let outcome = patch_template_params_in_place(
            "{{Item\n|description = Old text\n|rarity = 2\n}}",
            &map(&[("description", "New text"), ("rarity", "2")]),
            &PatchOptions::default(),
        );
        assert_eq!(outcome.text, "{{Item\n|description = New text\n|rarity = 2\n}}");
        assert_eq!(
            outcome.mismatch_lines(),
            vec!["- description Expected 'New text' - Found 'Old text'".to_string()]
        );
    }

    #[test]
    fn matching_blocks_are_returned_byte_identical() {
        let text = "{{Item\r\n  |Name   =  Wood <!-- auto -->\r\n|price= 1,200\r\n|power = 80.0\r\n\r\n}}";
        let outcome = patch_template_params_in_place(
            text,
            &map(&[("name", "[[Wood]]"), ("price", "1200"), ("power", "80")]),
            &PatchOptions::default(),
        );
        assert_eq!(outcome.text, text);
        assert!(outcome.mismatches.is_empty());
    }

    #[test]
    fn untouched_params_keep_their_formatting() {
        let outcome = patch_template_params_in_place(
            "{{Item\n  |name   =  Wood\n|rarity=1\n}}",
            &map(&[("name", "Wood"), ("rarity", "3")]),
            &PatchOptions::default(),
        );
        assert_eq!(outcome.text, "{{Item\n  |name   =  Wood\n|rarity = 3\n}}");
    }

    #[test]
    fn skipped_keys_are_invisible() {
        let text = "{{Item\n|technology = 12 <!-- hand maintained -->\n|rarity = 1\n}}";
        let outcome = patch_template_params_in_place(
            text,
            &map(&[("Technology", "99"), ("rarity", "1")]),
            &PatchOptions {
                skip_keys: KeySet::new(["technology"]),
                ..PatchOptions::default()
            },
        );
        assert_eq!(outcome.text, text);
        assert!(outcome.mismatch_lines().iter().all(|line| !line.contains("technology")));
    }

    #[test]
    fn prefixed_skip_keys_apply_to_bare_params() {
        let text = "{{Crafting Recipe\n|workbench = Forge\n}}";
        let outcome = patch_template_params_in_place(
            text,
            &map(&[("workbench", "Primitive Workbench")]),
            &PatchOptions {
                prefix: "recipe.".to_string(),
                skip_keys: KeySet::new(["recipe.workbench"]),
                ..PatchOptions::default()
            },
        );
        assert_eq!(outcome.text, text);
    }

    #[test]
    fn trailing_comments_and_extra_lines_are_kept() {
        let outcome = patch_template_params_in_place(
            "{{Pal\n|power = 70 <!-- base -->\n|rarity = 1\n<!-- Combat -->\n|hp = 2\n}}",
            &map(&[("power", "80"), ("rarity", "3"), ("hp", "2")]),
            &PatchOptions::default(),
        );
        assert_eq!(
            outcome.text,
            "{{Pal\n|power = 80 <!-- base -->\n|rarity = 3\n<!-- Combat -->\n|hp = 2\n}}"
        );
        assert_eq!(outcome.mismatches.len(), 2);
    }

    #[test]
    fn multiline_values_are_replaced_whole() {
        let outcome = patch_template_params_in_place(
            "{{Item\n|description = Old line one\nold line two\n|rarity = 2\n}}",
            &map(&[("description", "New line one\r\nnew line two\n\n")]),
            &PatchOptions {
                allow_multiline_keys: KeySet::new(["description"]),
                ..PatchOptions::default()
            },
        );
        assert_eq!(
            outcome.text,
            "{{Item\n|description = New line one\nnew line two\n|rarity = 2\n}}"
        );
    }

    #[test]
    fn single_line_params_write_only_the_first_expected_line() {
        let outcome = patch_template_params_in_place(
            "{{Item\n|name = Old\n}}",
            &map(&[("name", "New\nignored")]),
            &PatchOptions::default(),
        );
        assert_eq!(outcome.text, "{{Item\n|name = New\n}}");
    }

    #[test]
    fn blank_lines_before_the_next_param_stay_put() {
        let outcome = patch_template_params_in_place(
            "{{Item\n|a = 1\n\n|b = 2\n}}",
            &map(&[("a", "3")]),
            &PatchOptions::default(),
        );
        assert_eq!(outcome.text, "{{Item\n|a = 3\n\n|b = 2\n}}");
    }

    #[test]
    fn inline_closing_braces_are_preserved() {
        let outcome = patch_template_params_in_place(
            "{{Pal\n|no = 1\n|name = Lambal}}",
            &map(&[("no", "1"), ("name", "Lamball")]),
            &PatchOptions::default(),
        );
        assert_eq!(outcome.text, "{{Pal\n|no = 1\n|name = Lamball}}");
    }

    #[test]
    fn several_edits_apply_without_shifting_offsets() {
        let outcome = patch_template_params_in_place(
            "{{Item\n|a = x\n|b = yy\n|c = zzz\n}}",
            &map(&[("c", "a much longer value"), ("a", "1"), ("b", "")]),
            &PatchOptions::default(),
        );
        assert_eq!(
            outcome.text,
            "{{Item\n|a = 1\n|b =\n|c = a much longer value\n}}"
        );
        let labels = outcome
            .mismatches
            .iter()
            .map(|mismatch| mismatch.label.as_str())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["c", "a", "b"]);
    }

    #[test]
    fn missing_params_expand_a_bare_template() {
        let outcome = patch_template_params_in_place(
            "{{Crafting Recipe}}",
            &map(&[("product", "Wood"), ("yield", "2"), ("schematic", "")]),
            &PatchOptions {
                prefix: "recipe.".to_string(),
                add_missing_params: true,
                ..PatchOptions::default()
            },
        );
        assert_eq!(
            outcome.text,
            "{{Crafting Recipe\n|product = Wood\n|yield = 2\n}}"
        );
        assert_eq!(
            outcome.mismatch_lines(),
            vec![
                "- recipe.product Expected 'Wood' - Found ''".to_string(),
                "- recipe.yield Expected '2' - Found ''".to_string(),
            ]
        );
    }

    #[test]
    fn missing_params_reuse_existing_indentation() {
        let outcome = patch_template_params_in_place(
            "{{Pal\n  |no = 1\n  |name = Lamball\n\n  }}",
            &map(&[("no", "1"), ("element", "Neutral"), ("name", "Lamball")]),
            &PatchOptions {
                add_missing_params: true,
                ..PatchOptions::default()
            },
        );
        assert_eq!(
            outcome.text,
            "{{Pal\n  |no = 1\n  |name = Lamball\n  |element = Neutral\n  }}"
        );
    }

    #[test]
    fn missing_params_are_ignored_unless_requested() {
        let text = "{{Pal\n|no = 1\n}}";
        let outcome = patch_template_params_in_place(
            text,
            &map(&[("no", "1"), ("element", "Neutral")]),
            &PatchOptions::default(),
        );
        assert_eq!(outcome.text, text);
        assert!(outcome.mismatches.is_empty());
    }

    #[test]
    fn quantity_lists_agree_with_the_differ() {
        let text = "{{Crafting Recipe\n|ingredients = Wood; Stone*1\n}}";
        let outcome = patch_template_params_in_place(
            text,
            &map(&[("ingredients", "Wood*1; Stone")]),
            &PatchOptions {
                qty_assume_one_suffixes: KeySet::new(["ingredients"]),
                ..PatchOptions::default()
            },
        );
        assert_eq!(outcome.text, text);
    }

    #[test]
    fn patched_blocks_parse_back_to_the_expected_values() {
        let expected = map(&[
            ("name", "Lamball"),
            ("power", "80.0"),
            ("element", "[[Neutral]]"),
            ("pal_gear", "Do not touch"),
            ("description", "Line one\nLine two"),
        ]);
        let multiline = KeySet::new(["description"]);
        let skip = KeySet::new(["pal_gear"]);
        let outcome = patch_template_params_in_place(
            "{{Pal\n|name = Lambal <!-- x -->\n|power = 70\n|pal_gear = Custom\n|description = Old\n|no = 1}}",
            &expected,
            &PatchOptions {
                skip_keys: skip.clone(),
                allow_multiline_keys: multiline.clone(),
                add_missing_params: true,
                ..PatchOptions::default()
            },
        );
        assert!(outcome.text.contains("|pal_gear = Custom\n"));

        let reparsed = parse_template_params(&outcome.text, &multiline);
        let remaining = compare_param_dicts(
            &expected,
            &reparsed
                .into_iter()
                .filter(|(key, _)| key != "no")
                .collect::<ParamMap>(),
            &CompareOptions {
                skip_keys: skip,
                ..CompareOptions::default()
            },
        );
        assert!(remaining.is_empty(), "{remaining:?}");

        let again = patch_template_params_in_place(
            &outcome.text,
            &expected,
            &PatchOptions {
                skip_keys: KeySet::new(["pal_gear"]),
                allow_multiline_keys: multiline,
                add_missing_params: true,
                ..PatchOptions::default()
            },
        );
        assert_eq!(again.text, outcome.text);
    }

    #[test]
    fn blank_input_is_a_no_op() {
        let outcome = patch_template_params_in_place("", &map(&[("a", "1")]), &PatchOptions::default());
        assert_eq!(outcome.text, "");
        assert!(outcome.mismatches.is_empty());
        let outcome = patch_template_params_in_place("{{Item}}", &ParamMap::new(), &PatchOptions::default());
        assert_eq!(outcome.text, "{{Item}}");
    }
}
