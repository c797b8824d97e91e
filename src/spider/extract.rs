use crate::config::{ConfigPayload, FieldType};
use crate::error::{Error, Result};
use chadselect::ChadSelect;
use regex::Regex;
use serde_json::{json, Map, Number, Value};
use std::collections::HashMap;
use url::Url;

const ENGINE_PREFIXES: [&str; 3] = ["css:", "xpath:", "regex:"];

/// Turns a Scrapy-style selector into a ChadSelect query.
///
/// `scope` is the list selector of an item list; CSS field selectors are
/// resolved beneath it. Queries that already name an engine pass through
/// untouched. `::attr(name)` is answered through XPath, which requires the
/// CSS part to be a plain chain of tag, class and id steps.
pub fn to_query(scope: Option<&str>, selector: &str) -> String {
    let selector = selector.trim();
    if let Some(css) = selector.strip_prefix("css:") {
        return format!("css:{}", scoped(scope, css));
    }
    if ENGINE_PREFIXES.iter().any(|p| selector.starts_with(p)) {
        return selector.to_string();
    }

    let selector = selector.strip_suffix("::text").unwrap_or(selector).trim();
    if let Some((css, attr)) = split_attr(selector) {
        let css = scoped(scope, css);
        return match css_to_xpath(&css) {
            Some(path) => format!("xpath:{}/@{}", path, attr),
            None => {
                log::warn!(
                    "Cannot read attribute '{}' through selector '{}', using its text",
                    attr,
                    css
                );
                format!("css:{}", css)
            }
        };
    }
    format!("css:{}", scoped(scope, selector))
}

fn scoped(scope: Option<&str>, css: &str) -> String {
    match scope {
        Some(root) => {
            let root = root.strip_prefix("css:").unwrap_or(root).trim();
            format!("{} {}", root, css.trim())
        }
        None => css.trim().to_string(),
    }
}

fn split_attr(selector: &str) -> Option<(&str, &str)> {
    let (css, rest) = selector.rsplit_once("::attr(")?;
    let attr = rest.strip_suffix(')')?.trim();
    if attr.is_empty() {
        return None;
    }
    Some((css, attr))
}

/// XPath of a field relative to one list item, or `None` when the selector is
/// not a plain CSS chain.
fn item_path(selector: &str) -> Option<String> {
    let selector = selector.trim();
    let selector = selector.strip_prefix("css:").unwrap_or(selector);
    if ENGINE_PREFIXES.iter().any(|p| selector.starts_with(p)) {
        return None;
    }
    let (selector, text_only) = match selector.strip_suffix("::text") {
        Some(css) => (css.trim(), true),
        None => (selector, false),
    };
    if let Some((css, attr)) = split_attr(selector) {
        return css_to_xpath(css).map(|path| format!("{}/@{}", path, attr));
    }
    let path = css_to_xpath(selector)?;
    Some(if text_only {
        format!("{}/text()", path)
    } else {
        format!("{}//text()", path)
    })
}

fn list_path(selector: &str) -> Option<String> {
    let selector = selector.trim();
    if let Some(xpath) = selector.strip_prefix("xpath:") {
        return Some(xpath.trim().to_string());
    }
    css_to_xpath(selector.strip_prefix("css:").unwrap_or(selector))
}

/// Translates descendant chains like `div.results a#next` to XPath.
fn css_to_xpath(css: &str) -> Option<String> {
    let mut path = String::new();
    for step in css.split_whitespace() {
        let boundary = step.find(['.', '#']).unwrap_or(step.len());
        let (tag, mut rest) = step.split_at(boundary);
        if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '*') {
            return None;
        }
        path.push_str("//");
        path.push_str(if tag.is_empty() { "*" } else { tag });

        while !rest.is_empty() {
            let marker = rest.chars().next()?;
            let body = &rest[1..];
            let end = body.find(['.', '#']).unwrap_or(body.len());
            let name = &body[..end];
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return None;
            }
            match marker {
                '.' => path.push_str(&format!(
                    "[contains(concat(' ', normalize-space(@class), ' '), ' {} ')]",
                    name
                )),
                _ => path.push_str(&format!("[@id='{}']", name)),
            }
            rest = &body[end..];
        }
    }
    (!path.is_empty()).then_some(path)
}

/// Collapses runs of whitespace into single spaces.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// A compiled `data_fields` entry.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub query: String,
    /// Relative to one list item; only used in list mode.
    pub item_path: Option<String>,
    pub field_type: FieldType,
    pub required: bool,
    regex: Option<Regex>,
}

impl FieldRule {
    /// Converts one extracted string; `None` means the value is missing.
    pub fn coerce(&self, raw: &str, clean: bool) -> Option<Value> {
        let mut value = raw.trim();
        if value.is_empty() {
            return None;
        }
        if let Some(re) = &self.regex {
            let caps = re.captures(value)?;
            value = caps.get(1).or_else(|| caps.get(0))?.as_str().trim();
        }
        let value = if clean {
            clean_text(value)
        } else {
            value.to_string()
        };

        match self.field_type {
            FieldType::String => Some(Value::String(value)),
            FieldType::Float => {
                let number: f64 = value.replace(',', "").parse().ok()?;
                Number::from_f64(number).map(Value::Number)
            }
            FieldType::Integer => {
                let number: i64 = value.replace(',', "").parse().ok()?;
                Some(json!(number))
            }
            FieldType::Boolean => parse_bool(&value).map(Value::Bool),
        }
    }
}

/// Records found on one page and the next page to visit, if any.
#[derive(Debug, Default)]
pub struct Page {
    pub records: Vec<Value>,
    pub next: Option<Url>,
}

#[derive(Debug, Clone)]
struct ItemList {
    query: String,
    path: Option<String>,
}

/// Applies a configuration's extraction rules to fetched pages.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    rules: Vec<FieldRule>,
    list: Option<ItemList>,
    next_page: Option<String>,
    clean_text: bool,
    validate: bool,
}

impl RecordBuilder {
    pub fn new(payload: &ConfigPayload) -> Result<Self> {
        let scope = payload
            .item_selector
            .as_ref()
            .map(|items| items.list_selector.as_str());

        let mut rules = Vec::with_capacity(payload.data_fields.len());
        for (name, spec) in &payload.data_fields {
            let regex = spec
                .regex
                .as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(|e| Error::InvalidFieldSpec {
                    attribute: format!("{}.regex", name),
                    message: e.to_string(),
                })?;
            rules.push(FieldRule {
                name: name.clone(),
                query: to_query(scope, &spec.selector),
                item_path: item_path(&spec.selector),
                field_type: spec.field_type,
                required: spec.required,
                regex,
            });
        }

        let next_page = payload
            .pagination
            .as_ref()
            .filter(|p| p.enabled)
            .and_then(|p| p.next_page_selector.as_deref())
            .map(|s| to_query(None, s));

        Ok(Self {
            rules,
            list: scope.map(|selector| ItemList {
                query: to_query(None, selector),
                path: list_path(selector),
            }),
            next_page,
            clean_text: payload.data_processing.clean_text,
            validate: payload.data_processing.validate_data,
        })
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn scrape(&self, html: String, page_url: &Url) -> Page {
        let mut cs = ChadSelect::new();
        cs.add_html(html);

        let mut records = Vec::new();
        if let Some(list) = &self.list {
            let count = cs.query(-1, &list.query).len();
            log::debug!("List selector matched {} items on {}", count, page_url);

            // Page-wide columns can only be paired with items when every
            // item contributed exactly one value.
            let mut columns = HashMap::new();
            for rule in &self.rules {
                if list.path.is_some() && rule.item_path.is_some() {
                    continue;
                }
                let values = cs.query(-1, &rule.query);
                if values.is_empty() {
                    continue;
                }
                if values.len() != count {
                    log::warn!(
                        "Field '{}' matched {} values for {} items on {}, leaving it empty",
                        rule.name,
                        values.len(),
                        count,
                        page_url
                    );
                    continue;
                }
                columns.insert(rule.name.as_str(), values);
            }

            for i in 0..count {
                let values: Vec<(&str, String)> = self
                    .rules
                    .iter()
                    .filter_map(|rule| {
                        let value = match (&list.path, &rule.item_path) {
                            (Some(items), Some(field)) => cs
                                .query(-1, &format!("xpath:({})[{}]{}", items, i + 1, field))
                                .concat(),
                            _ => columns.get(rule.name.as_str())?.get(i)?.clone(),
                        };
                        Some((rule.name.as_str(), value))
                    })
                    .collect();
                let raw: HashMap<&str, &str> =
                    values.iter().map(|(n, v)| (*n, v.as_str())).collect();
                records.extend(self.build(&raw, page_url));
            }
        } else {
            let values: Vec<(&str, String)> = self
                .rules
                .iter()
                .map(|rule| (rule.name.as_str(), cs.select(0, &rule.query)))
                .collect();
            let raw: HashMap<&str, &str> = values.iter().map(|(n, v)| (*n, v.as_str())).collect();
            records.extend(self.build(&raw, page_url));
        }

        let next = self.next_page.as_ref().and_then(|query| {
            let href = cs.select(0, query);
            let href = href.trim();
            if href.is_empty() {
                return None;
            }
            page_url.join(href).ok()
        });

        Page { records, next }
    }

    /// Builds one record from raw strings keyed by field name.
    pub fn build(&self, raw: &HashMap<&str, &str>, source_url: &Url) -> Option<Value> {
        let mut record = Map::new();
        for rule in &self.rules {
            let value = raw
                .get(rule.name.as_str())
                .and_then(|v| rule.coerce(v, self.clean_text));
            match value {
                Some(value) => {
                    record.insert(rule.name.clone(), value);
                }
                None if rule.required && self.validate => {
                    log::warn!(
                        "Skipping record from {}: required field '{}' is missing",
                        source_url,
                        rule.name
                    );
                    return None;
                }
                None => {}
            }
        }
        if record.is_empty() {
            return None;
        }
        record.insert("source_url".to_string(), json!(source_url.as_str()));
        Some(Value::Object(record))
    }
}
