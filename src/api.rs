use crate::config::{ConfigId, CrawlConfig, DocumentValidator};
use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::template::{Overrides, TemplateRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// One dashboard request. Any transport that can carry JSON can carry
/// these, e.g. `{"op": "trigger_run", "id": 3}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ListConfigs,
    GetConfig {
        id: ConfigId,
    },
    /// `document` is already parsed, so a `data_fields` key repeated in the
    /// request text has collapsed to its last occurrence. Transports that
    /// hold the raw text should check it with
    /// [`DocumentValidator::validate_str`] first.
    CreateConfig {
        document: Value,
    },
    /// Same caveat on repeated `data_fields` keys as `CreateConfig`.
    UpdateConfig {
        id: ConfigId,
        document: Value,
    },
    DeleteConfig {
        id: ConfigId,
    },
    SetActive {
        id: ConfigId,
        active: bool,
    },
    /// Validates a document without storing it.
    ValidateConfig {
        document: Value,
    },
    ListTemplates,
    InstantiateTemplate {
        key: String,
        #[serde(default)]
        overrides: Overrides,
    },
    TriggerRun {
        id: ConfigId,
    },
    Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn created(body: Value) -> Self {
        Self { status: 201, body }
    }

    pub fn error(err: &Error) -> Self {
        Self {
            status: err.status(),
            body: json!({ "error": error_body(err) }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn error_body(err: &Error) -> Value {
    let mut body = json!({
        "kind": err.kind(),
        "message": err.to_string(),
    });
    let problems = err.problems();
    if !problems.is_empty() {
        body["problems"] = json!(problems);
    }
    body
}

/// The dashboard boundary: maps requests onto the store, the template
/// registry and the coordinator, and errors onto status codes.
pub struct Api {
    coordinator: Arc<Coordinator>,
    templates: &'static TemplateRegistry,
}

impl Api {
    pub fn new(coordinator: Arc<Coordinator>, templates: &'static TemplateRegistry) -> Self {
        Self {
            coordinator,
            templates,
        }
    }

    pub fn validator(&self) -> &DocumentValidator {
        self.coordinator.store().validator()
    }

    pub async fn handle(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(err) => {
                if err.status() >= 500 {
                    log::error!("Request failed: {}", err);
                } else {
                    log::debug!("Request rejected: {}", err);
                }
                Response::error(&err)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response> {
        let store = self.coordinator.store();
        let response = match request {
            Request::ListConfigs => {
                let configs: Vec<Value> = store
                    .list()
                    .await
                    .iter()
                    .map(|c| self.view(c))
                    .collect::<Result<_>>()?;
                Response::ok(json!(configs))
            }
            Request::GetConfig { id } => Response::ok(self.view(&store.get(id).await?)?),
            Request::CreateConfig { document } => {
                Response::created(self.view(&store.create(&document).await?)?)
            }
            Request::UpdateConfig { id, document } => {
                Response::ok(self.view(&store.update(id, &document).await?)?)
            }
            Request::DeleteConfig { id } => {
                store.delete(id).await?;
                Response::ok(json!({ "deleted": id }))
            }
            Request::SetActive { id, active } => {
                Response::ok(self.view(&store.set_active(id, active).await?)?)
            }
            Request::ValidateConfig { document } => {
                let payload = store.validator().validate(&document)?;
                Response::ok(serde_json::to_value(payload)?)
            }
            Request::ListTemplates => Response::ok(json!(self.templates.list())),
            Request::InstantiateTemplate { key, overrides } => {
                Response::ok(self.templates.instantiate(&key, &overrides)?)
            }
            Request::TriggerRun { id } => {
                let run = self.coordinator.trigger(id).await?;
                if run.succeeded() {
                    Response::ok(json!(run))
                } else {
                    let err = Error::CollaboratorFailure(run.message.clone());
                    Response {
                        status: err.status(),
                        body: json!({ "error": error_body(&err), "run": run }),
                    }
                }
            }
            Request::Metrics => Response::ok(json!({
                "metrics": self.coordinator.get_metrics(),
                "running": self
                    .coordinator
                    .running()
                    .into_iter()
                    .map(|(id, started_at)| json!({ "id": id, "started_at": started_at }))
                    .collect::<Vec<_>>(),
            })),
        };
        Ok(response)
    }

    fn view(&self, config: &CrawlConfig) -> Result<Value> {
        let mut value = serde_json::to_value(config)?;
        value["state"] = json!(self.coordinator.state(config.id));
        Ok(value)
    }
}
