use crate::config::field::validate_field;
use crate::config::schema::{
    ConfigPayload, DataProcessing, FieldSpec, ItemSelector, OutputSettings, Pagination,
    SpiderSettings,
};
use crate::error::{Error, FieldError, Result};
use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use url::Url;

/// The sink kinds a configuration may route its output to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkKinds(Vec<String>);

impl SinkKinds {
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let kinds = kinds
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| seen.insert(k.clone()))
            .collect();
        Self(kinds)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.0.iter().any(|k| k == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for SinkKinds {
    fn default() -> Self {
        Self::new(["stock_data", "research_report", "financial_news"])
    }
}

/// Turns raw configuration documents into [`ConfigPayload`]s.
///
/// Every check runs even after an earlier one failed, so a rejected
/// document reports all of its problems at once.
#[derive(Debug, Clone, Default)]
pub struct DocumentValidator {
    sinks: SinkKinds,
}

type Object = Map<String, Value>;

impl DocumentValidator {
    pub fn new(sinks: SinkKinds) -> Self {
        Self { sinks }
    }

    pub fn sinks(&self) -> &SinkKinds {
        &self.sinks
    }

    /// Validates JSON text. Unlike [`validate`](Self::validate) this can
    /// detect repeated keys inside `data_fields`.
    pub fn validate_str(&self, raw: &str) -> Result<ConfigPayload> {
        let doc: Value = serde_json::from_str(raw).map_err(|e| {
            Error::InvalidConfig(vec![FieldError::new("$", format!("malformed JSON: {}", e))])
        })?;
        self.check(&doc, &duplicate_field_names(raw))
    }

    pub fn validate(&self, doc: &Value) -> Result<ConfigPayload> {
        self.check(doc, &[])
    }

    fn check(&self, doc: &Value, duplicates: &[String]) -> Result<ConfigPayload> {
        let Some(obj) = doc.as_object() else {
            return Err(Error::InvalidConfig(vec![FieldError::new(
                "$",
                "document must be a JSON object",
            )]));
        };

        let mut problems = Vec::new();
        let name = required_string(obj, "name", &mut problems);
        let website_name = required_string(obj, "website_name", &mut problems);
        let start_urls = start_urls(obj.get("start_urls"), &mut problems);
        let data_fields = data_fields(obj.get("data_fields"), duplicates, &mut problems);
        let output_settings = self.output_settings(obj.get("output_settings"), &mut problems);
        let spider_settings = spider_settings(obj.get("spider_settings"), &mut problems);
        let description = optional_string(obj, "description", &mut problems);
        let allowed_domains = allowed_domains(obj.get("allowed_domains"), &mut problems);
        let item_selector = item_selector(obj.get("item_selector"), &mut problems);
        let pagination = pagination(obj.get("pagination"), &mut problems);
        let data_processing = data_processing(obj.get("data_processing"), &mut problems);

        for key in obj.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                log::debug!("Ignoring unknown configuration key '{}'", key);
            }
        }

        if !problems.is_empty() {
            return Err(Error::InvalidConfig(problems));
        }

        Ok(ConfigPayload {
            name,
            website_name,
            description,
            spider_settings,
            start_urls,
            allowed_domains,
            data_fields,
            item_selector,
            pagination,
            data_processing,
            output_settings,
        })
    }

    fn output_settings(&self, raw: Option<&Value>, problems: &mut Vec<FieldError>) -> OutputSettings {
        let mut settings = OutputSettings {
            data_type: String::new(),
            save_to_database: true,
            save_to_file: false,
        };
        let Some(obj) = object_at("output_settings", raw, true, problems) else {
            return settings;
        };

        match obj.get("data_type") {
            Some(Value::String(kind)) if self.sinks.contains(kind) => {
                settings.data_type = kind.clone();
            }
            Some(Value::String(kind)) => problems.push(FieldError::new(
                "output_settings.data_type",
                format!(
                    "'{}' is not a registered sink kind ({})",
                    kind,
                    self.sinks.iter().collect::<Vec<_>>().join(", ")
                ),
            )),
            Some(_) => problems.push(FieldError::new("output_settings.data_type", "must be a string")),
            None => problems.push(FieldError::new("output_settings.data_type", "is required")),
        }
        if let Some(flag) = optional_bool(obj, "output_settings", "save_to_database", problems) {
            settings.save_to_database = flag;
        }
        if let Some(flag) = optional_bool(obj, "output_settings", "save_to_file", problems) {
            settings.save_to_file = flag;
        }
        settings
    }
}

/// Longest pause between page requests, in seconds.
pub const MAX_DOWNLOAD_DELAY: f64 = 3600.0;

const KNOWN_KEYS: &[&str] = &[
    "name",
    "website_name",
    "description",
    "spider_settings",
    "start_urls",
    "allowed_domains",
    "data_fields",
    "item_selector",
    "pagination",
    "data_processing",
    "output_settings",
];

fn required_string(obj: &Object, key: &str, problems: &mut Vec<FieldError>) -> String {
    match obj.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::String(_)) => {
            problems.push(FieldError::new(key, "must not be empty"));
            String::new()
        }
        Some(Value::Null) | None => {
            problems.push(FieldError::new(key, "is required"));
            String::new()
        }
        Some(_) => {
            problems.push(FieldError::new(key, "must be a string"));
            String::new()
        }
    }
}

fn optional_string(obj: &Object, key: &str, problems: &mut Vec<FieldError>) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            problems.push(FieldError::new(key, "must be a string"));
            None
        }
    }
}

fn optional_bool(
    obj: &Object,
    section: &str,
    key: &str,
    problems: &mut Vec<FieldError>,
) -> Option<bool> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => {
            problems.push(FieldError::new(format!("{}.{}", section, key), "must be a boolean"));
            None
        }
    }
}

/// Returns the object at `key`, recording a problem when it is required
/// but absent or when it has the wrong shape.
fn object_at<'a>(
    key: &str,
    raw: Option<&'a Value>,
    required: bool,
    problems: &mut Vec<FieldError>,
) -> Option<&'a Object> {
    match raw {
        Some(Value::Object(obj)) => Some(obj),
        None | Some(Value::Null) => {
            if required {
                problems.push(FieldError::new(key, "is required"));
            }
            None
        }
        Some(_) => {
            problems.push(FieldError::new(key, "must be an object"));
            None
        }
    }
}

fn start_urls(raw: Option<&Value>, problems: &mut Vec<FieldError>) -> Vec<Url> {
    let entries = match raw {
        Some(Value::Array(entries)) => entries,
        None | Some(Value::Null) => {
            problems.push(FieldError::new("start_urls", "is required"));
            return Vec::new();
        }
        Some(_) => {
            problems.push(FieldError::new("start_urls", "must be a list of URLs"));
            return Vec::new();
        }
    };
    if entries.is_empty() {
        problems.push(FieldError::new("start_urls", "must contain at least one URL"));
        return Vec::new();
    }

    let mut urls = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let path = format!("start_urls[{}]", i);
        let Some(raw_url) = entry.as_str() else {
            problems.push(FieldError::new(path, "must be a string"));
            continue;
        };
        match Url::parse(raw_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => urls.push(url),
            Ok(_) => problems.push(FieldError::new(
                path,
                format!("'{}' must be an absolute http(s) URL", raw_url),
            )),
            Err(e) => problems.push(FieldError::new(
                path,
                format!("'{}' is not an absolute URL: {}", raw_url, e),
            )),
        }
    }
    urls
}

fn data_fields(
    raw: Option<&Value>,
    duplicates: &[String],
    problems: &mut Vec<FieldError>,
) -> BTreeMap<String, FieldSpec> {
    let mut fields = BTreeMap::new();
    let Some(obj) = object_at("data_fields", raw, true, problems) else {
        return fields;
    };
    if obj.is_empty() {
        problems.push(FieldError::new("data_fields", "must declare at least one field"));
        return fields;
    }
    for name in duplicates {
        problems.push(FieldError::new(
            format!("data_fields.{}", name),
            "field is declared more than once",
        ));
    }

    for (name, declaration) in obj {
        if name.trim().is_empty() {
            problems.push(FieldError::new("data_fields", "field names must not be empty"));
            continue;
        }
        match validate_field(declaration) {
            Ok(spec) => {
                fields.insert(name.clone(), spec);
            }
            Err(Error::InvalidFieldSpec { attribute, message }) => {
                let path = if attribute == "field" {
                    format!("data_fields.{}", name)
                } else {
                    format!("data_fields.{}.{}", name, attribute)
                };
                problems.push(FieldError::new(path, message));
            }
            Err(other) => problems.push(FieldError::new(
                format!("data_fields.{}", name),
                other.to_string(),
            )),
        }
    }
    fields
}

fn spider_settings(raw: Option<&Value>, problems: &mut Vec<FieldError>) -> SpiderSettings {
    let mut settings = SpiderSettings::default();
    let Some(obj) = object_at("spider_settings", raw, false, problems) else {
        return settings;
    };

    match obj.get("download_delay") {
        None | Some(Value::Null) => {}
        Some(value) => match value.as_f64() {
            Some(delay) if (0.0..=MAX_DOWNLOAD_DELAY).contains(&delay) => {
                settings.download_delay = delay
            }
            Some(delay) if delay > MAX_DOWNLOAD_DELAY => problems.push(FieldError::new(
                "spider_settings.download_delay",
                format!("must be at most {} seconds", MAX_DOWNLOAD_DELAY),
            )),
            Some(_) => problems.push(FieldError::new(
                "spider_settings.download_delay",
                "must not be negative",
            )),
            None => problems.push(FieldError::new(
                "spider_settings.download_delay",
                "must be a number of seconds",
            )),
        },
    }

    match obj.get("user_agent") {
        None | Some(Value::Null) => {}
        Some(Value::String(ua)) if !ua.trim().is_empty() => settings.user_agent = ua.clone(),
        Some(Value::String(_)) => problems.push(FieldError::new(
            "spider_settings.user_agent",
            "must not be empty",
        )),
        Some(_) => problems.push(FieldError::new(
            "spider_settings.user_agent",
            "must be a string",
        )),
    }

    match obj.get("concurrent_requests") {
        None | Some(Value::Null) => {}
        Some(value) => match value.as_u64() {
            Some(n) if n >= 1 => settings.concurrent_requests = n as usize,
            _ => problems.push(FieldError::new(
                "spider_settings.concurrent_requests",
                "must be a positive integer",
            )),
        },
    }
    settings
}

fn allowed_domains(raw: Option<&Value>, problems: &mut Vec<FieldError>) -> Vec<String> {
    let entries = match raw {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            problems.push(FieldError::new("allowed_domains", "must be a list of domains"));
            return Vec::new();
        }
    };
    let mut domains = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        match entry.as_str() {
            Some(domain) if !domain.trim().is_empty() => domains.push(domain.to_string()),
            _ => problems.push(FieldError::new(
                format!("allowed_domains[{}]", i),
                "must be a non-empty string",
            )),
        }
    }
    domains
}

fn item_selector(raw: Option<&Value>, problems: &mut Vec<FieldError>) -> Option<ItemSelector> {
    let obj = object_at("item_selector", raw, false, problems)?;
    let list_selector = match obj.get("list_selector") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        // An empty list selector means "extract from the whole page".
        None | Some(Value::Null) => return None,
        Some(Value::String(_)) => return None,
        Some(_) => {
            problems.push(FieldError::new("item_selector.list_selector", "must be a string"));
            return None;
        }
    };
    let detail_url_selector = match obj.get("detail_url_selector") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            problems.push(FieldError::new(
                "item_selector.detail_url_selector",
                "must be a string",
            ));
            None
        }
    };
    Some(ItemSelector {
        list_selector,
        detail_url_selector,
    })
}

fn pagination(raw: Option<&Value>, problems: &mut Vec<FieldError>) -> Option<Pagination> {
    let obj = object_at("pagination", raw, false, problems)?;
    let enabled = optional_bool(obj, "pagination", "enabled", problems).unwrap_or(false);

    let next_page_selector = match obj.get("next_page_selector") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) => None,
        Some(_) => {
            problems.push(FieldError::new("pagination.next_page_selector", "must be a string"));
            None
        }
    };
    if enabled && next_page_selector.is_none() {
        problems.push(FieldError::new(
            "pagination.next_page_selector",
            "is required when pagination is enabled",
        ));
    }

    let max_pages = match obj.get("max_pages") {
        None | Some(Value::Null) => 10,
        Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
            Some(n) if n >= 1 => n,
            _ => {
                problems.push(FieldError::new("pagination.max_pages", "must be a positive integer"));
                10
            }
        },
    };

    Some(Pagination {
        enabled,
        next_page_selector,
        max_pages,
    })
}

fn data_processing(raw: Option<&Value>, problems: &mut Vec<FieldError>) -> DataProcessing {
    let mut processing = DataProcessing::default();
    let Some(obj) = object_at("data_processing", raw, false, problems) else {
        return processing;
    };
    if let Some(flag) = optional_bool(obj, "data_processing", "remove_duplicates", problems) {
        processing.remove_duplicates = flag;
    }
    if let Some(flag) = optional_bool(obj, "data_processing", "clean_text", problems) {
        processing.clean_text = flag;
    }
    if let Some(flag) = optional_bool(obj, "data_processing", "validate_data", problems) {
        processing.validate_data = flag;
    }
    processing
}

/// Names that appear more than once inside the raw `data_fields` object.
/// `serde_json::Value` keeps only the last occurrence, so this has to look
/// at the text.
fn duplicate_field_names(raw: &str) -> Vec<String> {
    #[derive(Deserialize)]
    struct DataFieldsOnly {
        #[serde(default)]
        data_fields: Option<KeyList>,
    }

    let Ok(DataFieldsOnly {
        data_fields: Some(KeyList(keys)),
    }) = serde_json::from_str::<DataFieldsOnly>(raw)
    else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for key in keys {
        if !seen.insert(key.clone()) && !duplicates.contains(&key) {
            duplicates.push(key);
        }
    }
    duplicates
}

struct KeyList(Vec<String>);

impl<'de> Deserialize<'de> for KeyList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = KeyList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field declarations")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<KeyList, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut keys = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    map.next_value::<IgnoredAny>()?;
                    keys.push(key);
                }
                Ok(KeyList(keys))
            }
        }

        deserializer.deserialize_map(KeyVisitor)
    }
}
