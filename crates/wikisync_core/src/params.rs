use indexmap::IndexMap;

use crate::normalize::{KeySet, fold_key, normalize_newlines};

/// Parameter name (as spelled in the source) to raw value, in first-seen order.
pub type ParamMap = IndexMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParamLine<'a> {
    pub indent: &'a str,
    pub key: &'a str,
    /// Byte offset of the value within the line, after `=` and leading blanks.
    pub value_offset: usize,
}

/// Recognizes `| key = value` at the start of a line. A line whose key part
/// is blank still counts as a parameter boundary but yields an empty key.
pub(crate) fn parse_param_line(line: &str) -> Option<ParamLine<'_>> {
    let indent_len = line.len() - line.trim_start_matches([' ', '\t']).len();
    let after_indent = &line[indent_len..];
    let after_pipe = after_indent.strip_prefix('|')?;
    let equals = after_pipe.find('=')?;
    let key_part = &after_pipe[..equals];
    if key_part.is_empty() || key_part.contains('|') {
        return None;
    }
    let value_start = indent_len + 1 + equals + 1;
    let value = &line[value_start..];
    let value_offset = value_start + (value.len() - value.trim_start().len());
    Some(ParamLine {
        indent: &line[..indent_len],
        key: key_part.trim(),
        value_offset,
    })
}

pub(crate) fn is_closing_line(line: &str) -> bool {
    line.trim() == "}}"
}

/// Splits `value <!-- note -->` into the value and the trailing comment.
/// Only a comment that runs to the end of the value counts.
pub fn split_trailing_comment(value: &str) -> (&str, Option<&str>) {
    let Some(open) = value.find("<!--") else {
        return (value, None);
    };
    if !value[open + 4..].trim_end().ends_with("-->") {
        return (value, None);
    }
    (value[..open].trim_end(), Some(&value[open..]))
}

pub fn strip_trailing_wiki_comment(value: &str) -> String {
    split_trailing_comment(value).0.trim().to_string()
}

/// Drops a `}}` that closes the enclosing template on the value's own line.
/// Balanced nested templates (`{{i|Fire}}`) are left alone.
pub(crate) fn strip_closing_braces(value: &str) -> &str {
    let trimmed = value.trim_end();
    if trimmed.ends_with("}}") && trimmed.matches("}}").count() > trimmed.matches("{{").count() {
        trimmed[..trimmed.len() - 2].trim_end()
    } else {
        trimmed
    }
}

pub(crate) fn finish_single_line(first_line: &str) -> String {
    let raw = strip_closing_braces(first_line.trim());
    strip_trailing_wiki_comment(raw)
}

pub(crate) fn finish_multiline(raw: &str) -> String {
    strip_closing_braces(raw.trim()).trim().to_string()
}

enum ParseState {
    Scanning,
    SingleLine { key: String, first_line: String },
    Multiline { key: String, lines: Vec<String> },
    Closed,
}

struct ParamParser<'a> {
    allow_multiline: &'a KeySet,
    state: ParseState,
    params: ParamMap,
}

impl<'a> ParamParser<'a> {
    fn new(allow_multiline: &'a KeySet) -> Self {
        Self {
            allow_multiline,
            state: ParseState::Scanning,
            params: ParamMap::new(),
        }
    }

    fn feed(&mut self, line: &str) {
        if matches!(self.state, ParseState::Closed) {
            return;
        }
        if is_closing_line(line) {
            self.flush();
            self.state = ParseState::Closed;
            return;
        }
        if let Some(param) = parse_param_line(line) {
            self.flush();
            let value = line[param.value_offset..].to_string();
            self.state = if param.key.is_empty() {
                ParseState::Scanning
            } else if self.allow_multiline.contains(param.key) {
                ParseState::Multiline {
                    key: param.key.to_string(),
                    lines: vec![value],
                }
            } else {
                ParseState::SingleLine {
                    key: param.key.to_string(),
                    first_line: value,
                }
            };
            return;
        }
        if let ParseState::Multiline { lines, .. } = &mut self.state {
            lines.push(line.to_string());
        }
    }

    fn flush(&mut self) {
        let state = std::mem::replace(&mut self.state, ParseState::Scanning);
        match state {
            ParseState::SingleLine { key, first_line } => {
                self.params.insert(key, finish_single_line(&first_line));
            }
            ParseState::Multiline { key, lines } => {
                self.params.insert(key, finish_multiline(&lines.join("\n")));
            }
            ParseState::Closed => self.state = ParseState::Closed,
            ParseState::Scanning => {}
        }
    }

    fn finish(mut self) -> ParamMap {
        self.flush();
        self.params
    }
}

/// Parses one template block into its parameters.
///
/// Values are cut at the first newline unless the key is in
/// `allow_multiline_keys`, in which case continuation lines are kept until
/// the next parameter or the closing `}}` line. A repeated key keeps its
/// first position and takes the last value.
pub fn parse_template_params(block: &str, allow_multiline_keys: &KeySet) -> ParamMap {
    if block.trim().is_empty() {
        return ParamMap::new();
    }
    let text = normalize_newlines(block);
    let mut parser = ParamParser::new(allow_multiline_keys);
    for line in text.split('\n') {
        parser.feed(line);
    }
    parser.finish()
}

/// Case-insensitive lookup by parameter name.
pub fn param_value<'a>(params: &'a ParamMap, key: &str) -> Option<&'a str> {
    let key = fold_key(key.trim());
    params
        .iter()
        .rev()
        .find(|(name, _)| fold_key(name) == key)
        .map(|(_, value)| value.as_str())
}
