use serde::Serialize;

use crate::normalize::{KeySet, fold_key, normalize_newlines};
use crate::params::{finish_single_line, parse_param_line, parse_template_params};

/// One `{{Name ...}}` invocation. Offsets are byte positions into the text
/// the block was located in and go stale once that text is edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateBlock {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Locates every `{{template_name|...}}` / `{{template_name}}` in `text`.
///
/// The name must be followed by `|` or `}}` (optionally after whitespace), so
/// `Pal` never matches `{{Pal Navigation}}` or `{{Paldeck}}`. Unterminated
/// invocations are skipped.
pub fn find_template_blocks(text: &str, template_name: &str) -> Vec<TemplateBlock> {
    let name = template_name.trim();
    let mut blocks = Vec::new();
    if text.trim().is_empty() || name.is_empty() {
        return blocks;
    }

    let bytes = text.as_bytes();
    let mut claimed_until = 0usize;
    let mut search_from = 0usize;
    while let Some(offset) = text[search_from..].find("{{") {
        let start = search_from + offset;
        search_from = start + 1;
        if start < claimed_until || !name_matches_at(text, start + 2, name) {
            continue;
        }
        if let Some(end) = find_balanced_end(bytes, start) {
            blocks.push(TemplateBlock {
                text: text[start..end].to_string(),
                start,
                end,
            });
            claimed_until = end;
        }
    }
    blocks
}

pub fn extract_first_template_block(text: &str, template_name: &str) -> Option<TemplateBlock> {
    find_template_blocks(text, template_name).into_iter().next()
}

pub fn replace_span(text: &str, start: usize, end: usize, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len() - (end - start) + replacement.len());
    out.push_str(&text[..start]);
    out.push_str(replacement);
    out.push_str(&text[end..]);
    out
}

fn name_matches_at(text: &str, position: usize, name: &str) -> bool {
    let rest = text[position..].trim_start();
    let Some(candidate) = rest.get(..name.len()) else {
        return false;
    };
    if !candidate.eq_ignore_ascii_case(name) {
        return false;
    }
    let after = rest[name.len()..].trim_start();
    after.starts_with('|') || after.starts_with("}}")
}

fn find_balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut index = start;
    while index + 1 < bytes.len() {
        match (bytes[index], bytes[index + 1]) {
            (b'{', b'{') => {
                depth += 1;
                index += 2;
            }
            (b'}', b'}') => {
                depth -= 1;
                index += 2;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => index += 1,
        }
    }
    None
}

/// Reads `|key = value` from the key's own line only.
pub fn extract_param_value_single_line(block: &str, key: &str) -> String {
    if block.trim().is_empty() {
        return String::new();
    }
    let wanted = fold_key(key.trim());
    let text = normalize_newlines(block);
    for line in text.split('\n') {
        let Some(param) = parse_param_line(line) else {
            continue;
        };
        if fold_key(param.key) == wanted {
            return finish_single_line(&line[param.value_offset..]);
        }
    }
    String::new()
}

/// True if any parameter outside `ignore_keys` carries a non-blank value.
pub fn template_has_meaningful_data(block: &str, ignore_keys: &KeySet) -> bool {
    if block.trim().is_empty() {
        return false;
    }
    parse_template_params(block, &KeySet::default())
        .iter()
        .any(|(key, value)| !key.is_empty() && !ignore_keys.contains(key) && !value.trim().is_empty())
}
