use std::collections::BTreeSet;

/// Case-folded set of parameter names. Used for skip lists, multiline
/// allow-lists and quantity-list suffixes alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: BTreeSet<String>,
}

impl KeySet {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .filter_map(|key| {
                let trimmed = key.as_ref().trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(fold_key(trimmed))
                }
            })
            .collect();
        Self { keys }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(&fold_key(key.trim()))
    }

    /// Matches either the bare key or its prefixed label (`recipe.workbench`).
    pub fn contains_labelled(&self, key: &str, prefix: &str) -> bool {
        if self.contains(key) {
            return true;
        }
        !prefix.is_empty() && self.contains(&format!("{prefix}{}", key.trim()))
    }

    /// True when the key or its prefixed label ends with any member.
    pub fn matches_suffix(&self, key: &str, prefix: &str) -> bool {
        let key_norm = fold_key(key.trim());
        let label_norm = fold_key(&format!("{prefix}{}", key.trim()));
        self.keys
            .iter()
            .any(|suffix| key_norm.ends_with(suffix.as_str()) || label_norm.ends_with(suffix.as_str()))
    }
}

pub fn normalize_skip_keys<I, S>(keys: I) -> KeySet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    KeySet::new(keys)
}

pub fn fold_key(key: &str) -> String {
    key.to_lowercase()
}

pub fn normalize_title(title: &str) -> String {
    collapse_whitespace(title)
}

pub fn normalize_newlines(value: &str) -> String {
    value.replace("\r\n", "\n").replace('\r', "\n")
}

pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical form used only for equality checks; never written back.
pub fn normalize_param_value_for_compare(value: &str) -> String {
    let value = normalize_newlines(value);
    let value = strip_wikilinks(&value);
    let value = remove_digit_group_commas(&value);
    let value = collapse_whitespace(&value);
    normalize_numeric_string(&value)
}

/// `Wood; Stone*2` -> `Wood*1; Stone*2`
pub fn normalize_qty_list_assume_one(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    trimmed
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            if entry.contains('*') {
                entry.to_string()
            } else {
                format!("{entry}*1")
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub(crate) fn comparable_value(value: &str, assume_one: bool) -> String {
    if assume_one {
        normalize_param_value_for_compare(&normalize_qty_list_assume_one(value))
    } else {
        normalize_param_value_for_compare(value)
    }
}

/// `[[Target]]` -> `Target`, `[[Target|Label]]` -> `Label`.
pub fn strip_wikilinks(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(open) = rest.find("[[") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match parse_wikilink(after_open) {
            Some((display, consumed)) => {
                out.push_str(display);
                rest = &after_open[consumed..];
            }
            None => {
                out.push('[');
                rest = &rest[open + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_wikilink(after_open: &str) -> Option<(&str, usize)> {
    let target_end = after_open.find([']', '|'])?;
    if target_end == 0 {
        return None;
    }
    let target = &after_open[..target_end];
    let tail = &after_open[target_end..];

    if let Some(label_part) = tail.strip_prefix('|') {
        let label_end = label_part.find(']')?;
        if label_end == 0 || !label_part[label_end..].starts_with("]]") {
            return None;
        }
        let label = label_part[..label_end].trim();
        let display = if label.is_empty() {
            target.trim()
        } else {
            label
        };
        return Some((display, target_end + 1 + label_end + 2));
    }

    if !tail.starts_with("]]") {
        return None;
    }
    Some((target.trim(), target_end + 2))
}

fn remove_digit_group_commas(value: &str) -> String {
    let chars = value.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(value.len());
    for (index, ch) in chars.iter().copied().enumerate() {
        if ch == ','
            && index > 0
            && chars[index - 1].is_ascii_digit()
            && chars.get(index + 1).is_some_and(char::is_ascii_digit)
        {
            continue;
        }
        out.push(ch);
    }
    out
}

/// Trims insignificant fraction zeros from a value that is entirely a
/// decimal literal: `80.0` -> `80`, `1.50` -> `1.5`. Anything else passes
/// through trimmed. Lossy for numeric-looking strings such as `1.10`.
pub fn normalize_numeric_string(value: &str) -> String {
    let value = value.trim();
    if !is_plain_decimal(value) {
        return value.to_string();
    }
    match value.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => value.to_string(),
    }
}

fn is_plain_decimal(value: &str) -> bool {
    let unsigned = value.strip_prefix('-').unwrap_or(value);
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|byte| byte.is_ascii_digit());
    match unsigned.split_once('.') {
        Some((whole, fraction)) => all_digits(whole) && all_digits(fraction),
        None => all_digits(unsigned),
    }
}
