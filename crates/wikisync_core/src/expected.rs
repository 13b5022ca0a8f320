use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde_json::Value;

use crate::normalize::{fold_key, normalize_title};
use crate::params::ParamMap;

/// Template name to its expected parameters, in document order.
pub type TemplateParams = IndexMap<String, ParamMap>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedPage {
    pub title: String,
    pub templates: TemplateParams,
}

/// Expected template parameters per page, keyed by case-folded title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedPages {
    pages: IndexMap<String, ExpectedPage>,
}

impl ExpectedPages {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn insert(&mut self, title: &str, templates: TemplateParams) {
        let title = normalize_title(title);
        self.pages.insert(
            fold_key(&title),
            ExpectedPage { title, templates },
        );
    }

    pub fn page(&self, title: &str) -> Option<&ExpectedPage> {
        self.pages.get(&fold_key(&normalize_title(title)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpectedPage> {
        self.pages.values()
    }
}

/// Case-insensitive template lookup.
pub fn template_params<'a>(templates: &'a TemplateParams, name: &str) -> Option<&'a ParamMap> {
    let wanted = fold_key(name.trim());
    templates
        .iter()
        .find(|(template, _)| fold_key(template.trim()) == wanted)
        .map(|(_, params)| params)
}

type RawDocument = IndexMap<String, IndexMap<String, IndexMap<String, Value>>>;

/// Parses `{ "<title>": { "<template>": { "<param>": value } } }`.
pub fn parse_expected(content: &str) -> Result<ExpectedPages> {
    let raw: RawDocument =
        serde_json::from_str(content).context("expected data must be a title -> template -> param object")?;

    let mut pages = ExpectedPages::default();
    for (title, templates) in raw {
        if title.trim().is_empty() {
            continue;
        }
        let mut parsed = TemplateParams::new();
        for (template, params) in templates {
            let mut values = ParamMap::new();
            for (param, value) in params {
                let Some(rendered) = render_value(&value) else {
                    bail!("unsupported value for {title} / {template} / {param}: {value}");
                };
                values.insert(param, rendered);
            }
            parsed.insert(template, values);
        }
        pages.insert(&title, parsed);
    }
    Ok(pages)
}

pub fn load_expected(path: &Path) -> Result<ExpectedPages> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_expected(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}
