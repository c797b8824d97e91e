use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;

/// A named, read-only starting point for a configuration draft.
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub key: String,
    pub name: String,
    pub description: String,
    /// Editable portion of a configuration, without `name` or `website_name`.
    pub config: Value,
}

/// Caller-supplied values merged into an instantiated draft.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub website_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
}

impl TemplateRegistry {
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    /// The process-wide registry of built-in templates.
    pub fn builtin() -> &'static TemplateRegistry {
        static REGISTRY: OnceLock<TemplateRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| TemplateRegistry::new(builtin_templates()))
    }

    /// Templates in registration order.
    pub fn list(&self) -> &[Template] {
        &self.templates
    }

    pub fn get(&self, key: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.key == key)
    }

    /// Returns a fresh draft document. The draft is not validated and is
    /// not stored; callers submit it like any other document.
    pub fn instantiate(&self, key: &str, overrides: &Overrides) -> Result<Value> {
        let template = self
            .get(key)
            .ok_or_else(|| Error::UnknownTemplate(key.to_string()))?;

        let mut draft = template.config.clone();
        let Some(obj) = draft.as_object_mut() else {
            return Err(Error::Internal(format!("template '{}' is not an object", key)));
        };
        for (field, value) in [
            ("name", &overrides.name),
            ("website_name", &overrides.website_name),
            ("description", &overrides.description),
        ] {
            if let Some(value) = value {
                obj.insert(field.to_string(), Value::String(value.clone()));
            }
        }
        log::debug!("Instantiated template '{}'", key);
        Ok(draft)
    }
}

fn template(key: &str, name: &str, description: &str, config: Value) -> Template {
    Template {
        key: key.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        config,
    }
}

fn spider_settings() -> Value {
    json!({
        "download_delay": 1,
        "concurrent_requests": 16,
        "user_agent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
    })
}

fn builtin_templates() -> Vec<Template> {
    vec![
        template(
            "default",
            "Generic page",
            "Title, price and description from a single product-style page",
            json!({
                "spider_settings": spider_settings(),
                "start_urls": ["https://example.com/data"],
                "allowed_domains": ["example.com"],
                "data_fields": {
                    "title": {"selector": "h1.title::text", "type": "string", "required": true},
                    "price": {
                        "selector": ".price::text",
                        "type": "float",
                        "required": true,
                        "regex": r"[\d\.]+"
                    },
                    "description": {"selector": ".description::text", "type": "string", "required": false}
                },
                "pagination": {
                    "enabled": false,
                    "next_page_selector": ".next-page::attr(href)",
                    "max_pages": 10
                },
                "item_selector": {
                    "list_selector": ".item-list .item",
                    "detail_url_selector": "a::attr(href)"
                },
                "data_processing": {
                    "remove_duplicates": true,
                    "clean_text": true,
                    "validate_data": true
                },
                "output_settings": {
                    "data_type": "stock_data",
                    "save_to_database": true,
                    "save_to_file": false
                }
            }),
        ),
        template(
            "stock_data",
            "Stock quotes",
            "Quote tables with symbol, name, price, change and volume columns",
            json!({
                "spider_settings": spider_settings(),
                "start_urls": ["https://quote.eastmoney.com/center/gridlist.html"],
                "allowed_domains": ["quote.eastmoney.com"],
                "item_selector": {"list_selector": "table tr"},
                "data_fields": {
                    "symbol": {"selector": ".symbol::text", "type": "string", "required": true},
                    "name": {"selector": ".name::text", "type": "string", "required": true},
                    "price": {"selector": ".price::text", "type": "float", "required": false},
                    "change": {"selector": ".change::text", "type": "float", "required": false},
                    "change_percent": {
                        "selector": ".change-percent::text",
                        "type": "float",
                        "required": false,
                        "regex": r"(-?[\d\.]+)%?"
                    },
                    "volume": {"selector": ".volume::text", "type": "integer", "required": false}
                },
                "output_settings": {"data_type": "stock_data", "save_to_database": true}
            }),
        ),
        template(
            "research_report",
            "Research reports",
            "Analyst reports with institution, rating and target price",
            json!({
                "spider_settings": spider_settings(),
                "start_urls": ["https://data.eastmoney.com/report/"],
                "item_selector": {"list_selector": ".report-list .report-item"},
                "data_fields": {
                    "title": {"selector": ".title::text", "type": "string", "required": true},
                    "author": {"selector": ".author::text", "type": "string", "required": false},
                    "institution": {"selector": ".institution::text", "type": "string", "required": false},
                    "publish_date": {"selector": ".date::text", "type": "string", "required": false},
                    "rating": {"selector": ".rating::text", "type": "string", "required": false},
                    "target_price": {
                        "selector": ".target-price::text",
                        "type": "float",
                        "required": false,
                        "regex": r"[\d\.]+"
                    }
                },
                "pagination": {"enabled": true, "next_page_selector": ".next::attr(href)", "max_pages": 5},
                "output_settings": {"data_type": "research_report", "save_to_database": true}
            }),
        ),
        template(
            "financial_news",
            "Financial news",
            "News articles with title, body, source and category",
            json!({
                "spider_settings": spider_settings(),
                "start_urls": ["https://finance.sina.com.cn/roll/"],
                "item_selector": {"list_selector": ".news-list li"},
                "data_fields": {
                    "title": {"selector": "a::text", "type": "string", "required": true},
                    "content": {"selector": ".summary::text", "type": "string", "required": false},
                    "publish_time": {"selector": ".time::text", "type": "string", "required": false},
                    "source": {"selector": ".source::text", "type": "string", "required": false},
                    "category": {"selector": ".category::text", "type": "string", "required": false}
                },
                "output_settings": {"data_type": "financial_news", "save_to_database": true}
            }),
        ),
    ]
}
