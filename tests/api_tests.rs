mod common;

use common::{document, memory_store, Scripted};
use crawlconf::api::{Api, Request};
use crawlconf::coordinator::Coordinator;
use crawlconf::template::{Overrides, TemplateRegistry};
use serde_json::json;
use std::sync::Arc;

fn api(collaborator: Arc<Scripted>) -> Api {
    let coordinator = Coordinator::new(memory_store(), collaborator, None);
    Api::new(Arc::new(coordinator), TemplateRegistry::builtin())
}

#[tokio::test]
async fn create_then_get_returns_stored_config() {
    let api = api(Arc::new(Scripted::default()));

    let created = api
        .handle(Request::CreateConfig {
            document: document("quotes"),
        })
        .await;
    assert_eq!(created.status, 201);
    let id = created.body["id"].as_u64().unwrap();

    let fetched = api
        .handle(serde_json::from_value(json!({"op": "get_config", "id": id})).unwrap())
        .await;
    assert_eq!(fetched.status, 200);
    assert_eq!(fetched.body["name"], "quotes");
    assert_eq!(fetched.body["website_name"], "Example Exchange");
    assert_eq!(fetched.body["is_active"], true);
    assert_eq!(fetched.body["run_count"], 0);
    assert_eq!(fetched.body["success_count"], 0);
    assert_eq!(fetched.body["state"], "idle");
    assert_eq!(fetched.body["data_fields"]["symbol"]["type"], "string");
}

#[tokio::test]
async fn duplicate_names_conflict() {
    let api = api(Arc::new(Scripted::default()));
    let first = api
        .handle(Request::CreateConfig {
            document: document("quotes"),
        })
        .await;
    assert_eq!(first.status, 201);

    let second = api
        .handle(Request::CreateConfig {
            document: document("quotes"),
        })
        .await;
    assert_eq!(second.status, 409);
    assert_eq!(second.body["error"]["kind"], "DuplicateName");

    let renamed = api
        .handle(Request::CreateConfig {
            document: document("quotes-2"),
        })
        .await;
    assert_eq!(renamed.status, 201);

    let list = api.handle(Request::ListConfigs).await;
    assert_eq!(list.body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_start_urls_are_rejected_with_problems() {
    let api = api(Arc::new(Scripted::default()));
    let mut doc = document("empty");
    doc["start_urls"] = json!([]);

    let response = api.handle(Request::CreateConfig { document: doc }).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.body["error"]["kind"], "InvalidConfig");
    let problems = response.body["error"]["problems"].as_array().unwrap();
    assert!(problems.iter().any(|p| p["field"] == "start_urls"));

    let list = api.handle(Request::ListConfigs).await;
    assert_eq!(list.body, json!([]));
}

#[tokio::test]
async fn missing_ids_are_not_found() {
    let api = api(Arc::new(Scripted::default()));
    for request in [
        json!({"op": "get_config", "id": 9}),
        json!({"op": "delete_config", "id": 9}),
        json!({"op": "set_active", "id": 9, "active": false}),
        json!({"op": "trigger_run", "id": 9}),
        json!({"op": "update_config", "id": 9, "document": document("nine")}),
    ] {
        let response = api.handle(serde_json::from_value(request).unwrap()).await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body["error"]["kind"], "NotFound");
    }
}

#[tokio::test]
async fn templates_instantiate_into_valid_documents() {
    let api = api(Arc::new(Scripted::default()));

    let templates = api.handle(Request::ListTemplates).await;
    let keys: Vec<_> = templates
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, ["default", "stock_data", "research_report", "financial_news"]);

    let draft = api
        .handle(Request::InstantiateTemplate {
            key: "stock_data".into(),
            overrides: Overrides {
                name: Some("sse-quotes".into()),
                website_name: Some("Shanghai Stock Exchange".into()),
                description: None,
            },
        })
        .await;
    assert_eq!(draft.status, 200);

    let created = api
        .handle(Request::CreateConfig {
            document: draft.body,
        })
        .await;
    assert_eq!(created.status, 201);
    assert_eq!(created.body["output_settings"]["data_type"], "stock_data");

    let unknown = api
        .handle(Request::InstantiateTemplate {
            key: "crypto".into(),
            overrides: Overrides::default(),
        })
        .await;
    assert_eq!(unknown.status, 404);
    assert_eq!(unknown.body["error"]["kind"], "UnknownTemplate");
}

#[tokio::test]
async fn runs_map_outcomes_to_statuses() {
    let api = api(Arc::new(Scripted::new([
        Ok(4),
        Err("HTTP 500 from upstream".to_string()),
    ])));
    let id = api
        .handle(Request::CreateConfig {
            document: document("runs"),
        })
        .await
        .body["id"]
        .as_u64()
        .unwrap();
    let trigger = || serde_json::from_value::<Request>(json!({"op": "trigger_run", "id": id})).unwrap();

    let ok = api.handle(trigger()).await;
    assert_eq!(ok.status, 200);
    assert_eq!(ok.body["outcome"], "succeeded");
    assert_eq!(ok.body["items"], 4);

    let failed = api.handle(trigger()).await;
    assert_eq!(failed.status, 502);
    assert_eq!(failed.body["error"]["kind"], "CollaboratorFailure");
    assert_eq!(failed.body["run"]["outcome"], "failed");
    assert_eq!(failed.body["run"]["message"], "HTTP 500 from upstream");

    let paused = api
        .handle(serde_json::from_value(json!({"op": "set_active", "id": id, "active": false})).unwrap())
        .await;
    assert_eq!(paused.status, 200);
    assert_eq!(paused.body["is_active"], false);

    let inactive = api.handle(trigger()).await;
    assert_eq!(inactive.status, 409);
    assert_eq!(inactive.body["error"]["kind"], "Inactive");

    let metrics = api.handle(Request::Metrics).await;
    assert_eq!(metrics.body["metrics"]["runs_requested"], 3);
    assert_eq!(metrics.body["metrics"]["runs_rejected"], 1);
    assert_eq!(metrics.body["running"], json!([]));

    let shown = api
        .handle(serde_json::from_value(json!({"op": "get_config", "id": id})).unwrap())
        .await;
    assert_eq!(shown.body["run_count"], 2);
    assert_eq!(shown.body["success_count"], 1);
}

#[tokio::test]
async fn deleted_configs_are_gone() {
    let api = api(Arc::new(Scripted::default()));
    let id = api
        .handle(Request::CreateConfig {
            document: document("doomed"),
        })
        .await
        .body["id"]
        .as_u64()
        .unwrap();

    let delete = json!({"op": "delete_config", "id": id});
    let deleted = api.handle(serde_json::from_value(delete.clone()).unwrap()).await;
    assert_eq!(deleted.status, 200);

    let again = api.handle(serde_json::from_value(delete).unwrap()).await;
    assert_eq!(again.status, 404);

    let recreated = api
        .handle(Request::CreateConfig {
            document: document("doomed"),
        })
        .await;
    assert_eq!(recreated.status, 201);
    assert_ne!(recreated.body["id"].as_u64().unwrap(), id);
}

#[tokio::test]
async fn validate_config_does_not_store() {
    let api = api(Arc::new(Scripted::default()));
    let valid = api
        .handle(Request::ValidateConfig {
            document: document("draft"),
        })
        .await;
    assert_eq!(valid.status, 200);
    assert_eq!(valid.body["name"], "draft");

    let mut doc = document("draft");
    doc["data_fields"]["symbol"]["type"] = json!("date");
    let invalid = api.handle(Request::ValidateConfig { document: doc }).await;
    assert_eq!(invalid.status, 400);

    let list = api.handle(Request::ListConfigs).await;
    assert_eq!(list.body, json!([]));
}

#[tokio::test]
async fn repeated_field_keys_are_caught_only_in_raw_text() {
    let api = api(Arc::new(Scripted::default()));
    let text = r#"{
        "name": "twice",
        "website_name": "Example Exchange",
        "start_urls": ["https://example.com/quotes"],
        "data_fields": {
            "symbol": {"selector": ".symbol::text", "type": "string"},
            "symbol": {"selector": ".code::text", "type": "string"}
        },
        "output_settings": {"data_type": "stock_data"}
    }"#;

    let err = api.validator().validate_str(text).unwrap_err();
    assert_eq!(err.status(), 400);

    let request = format!(r#"{{"op": "create_config", "document": {}}}"#, text);
    let created = api.handle(serde_json::from_str(&request).unwrap()).await;
    assert_eq!(created.status, 201);
    assert_eq!(created.body["data_fields"]["symbol"]["selector"], ".code::text");
}
