//! OpenAPI 3.0 document generated from the route table.

use crate::config::ApiInfo;
use crate::routes::RouteTable;
use serde_json::{json, Map, Value};

const DEFAULT_TITLE: &str = "Stubber API";
const DEFAULT_VERSION: &str = "1.0.0";

/// Build the OpenAPI document describing every configured route plus `/health`.
pub fn generate(info: Option<&ApiInfo>, routes: &RouteTable) -> Value {
    let mut paths = Map::new();

    for route in routes.routes() {
        let mut operations = Map::new();

        let parameters: Vec<Value> = route
            .template
            .param_names()
            .map(|name| {
                json!({
                    "name": name,
                    "in": "path",
                    "required": true,
                    "schema": {"type": "string"},
                })
            })
            .collect();

        for endpoint in &route.endpoints {
            let definition = &endpoint.definition;
            let method = if definition.is_wildcard() {
                "get".to_string()
            } else {
                definition.method.to_lowercase()
            };

            // First registered wins, as in method resolution.
            if operations.contains_key(&method) {
                continue;
            }

            let description = if endpoint.status.is_success() {
                "Successful response"
            } else {
                endpoint.status.canonical_reason().unwrap_or("Response")
            };
            let mut response = Map::new();
            response.insert("description".to_string(), json!(description));
            if !definition.response.is_null() {
                response.insert(
                    "content".to_string(),
                    json!({"application/json": {"example": definition.response}}),
                );
            }

            let mut operation = Map::new();
            operation.insert(
                "responses".to_string(),
                json!({ endpoint.status.as_str(): response }),
            );
            if !parameters.is_empty() {
                operation.insert("parameters".to_string(), json!(parameters));
            }
            if let Some(summary) = &definition.summary {
                operation.insert("summary".to_string(), json!(summary));
            }
            if let Some(description) = &definition.description {
                operation.insert("description".to_string(), json!(description));
            }
            if !definition.tags.is_empty() {
                operation.insert("tags".to_string(), json!(definition.tags));
            }

            operations.insert(method, Value::Object(operation));
        }

        paths.insert(route.template.as_str().to_string(), Value::Object(operations));
    }

    paths.insert("/health".to_string(), health_path());

    json!({
        "openapi": "3.0.3",
        "info": info_object(info),
        "paths": paths,
    })
}

fn info_object(info: Option<&ApiInfo>) -> Value {
    let non_empty = |value: Option<&String>| value.filter(|v| !v.is_empty()).cloned();

    let title = non_empty(info.and_then(|i| i.title.as_ref()));
    let version = non_empty(info.and_then(|i| i.version.as_ref()));
    let description = non_empty(info.and_then(|i| i.description.as_ref()));

    let mut object = Map::new();
    object.insert(
        "title".to_string(),
        json!(title.unwrap_or_else(|| DEFAULT_TITLE.to_string())),
    );
    if let Some(description) = description {
        object.insert("description".to_string(), json!(description));
    }
    object.insert(
        "version".to_string(),
        json!(version.unwrap_or_else(|| DEFAULT_VERSION.to_string())),
    );
    Value::Object(object)
}

fn health_path() -> Value {
    json!({
        "get": {
            "summary": "Health check endpoint",
            "tags": ["System"],
            "responses": {
                "200": {
                    "description": "Service is healthy",
                    "content": {"text/plain": {"example": "ok"}},
                },
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StubberConfig;
    use crate::script::ScriptRuntime;

    fn document(json: &str) -> Value {
        let config = StubberConfig::from_json(json).unwrap();
        let routes = RouteTable::build(config.endpoints, &ScriptRuntime::default()).unwrap();
        generate(config.info.as_ref(), &routes)
    }

    #[test]
    fn test_empty_config_has_health() {
        let doc = document(r#"{"endpoints": []}"#);
        assert_eq!(doc["openapi"], "3.0.3");
        assert_eq!(doc["info"]["title"], DEFAULT_TITLE);
        assert_eq!(doc["info"]["version"], DEFAULT_VERSION);
        assert!(doc["info"].get("description").is_none());
        assert_eq!(doc["paths"].as_object().unwrap().len(), 1);
        assert_eq!(doc["paths"]["/health"]["get"]["tags"][0], "System");
    }

    #[test]
    fn test_info_overrides() {
        let doc = document(
            r#"{"info": {"title": "Pets", "description": "Pet store", "version": ""}, "endpoints": []}"#,
        );
        assert_eq!(doc["info"]["title"], "Pets");
        assert_eq!(doc["info"]["description"], "Pet store");
        assert_eq!(doc["info"]["version"], DEFAULT_VERSION);
    }

    #[test]
    fn test_operations() {
        let doc = document(
            r#"{"endpoints": [
                {"path": "/users/{id}", "method": "GET", "response": {"id": "1"},
                 "summary": "Get user", "description": "One user", "tags": ["users"]},
                {"path": "/users/{id}", "method": "DELETE", "statusCode": 204},
                {"path": "/ping"},
                {"path": "/teapot", "method": "POST", "statusCode": 418, "response": "short"}
            ]}"#,
        );

        let get = &doc["paths"]["/users/{id}"]["get"];
        assert_eq!(get["summary"], "Get user");
        assert_eq!(get["description"], "One user");
        assert_eq!(get["tags"], json!(["users"]));
        assert_eq!(
            get["parameters"],
            json!([{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}])
        );
        assert_eq!(
            get["responses"]["200"]["content"]["application/json"]["example"],
            json!({"id": "1"})
        );

        let delete = &doc["paths"]["/users/{id}"]["delete"];
        assert_eq!(delete["responses"]["204"]["description"], "Successful response");
        assert!(delete["responses"]["204"].get("content").is_none());

        assert!(doc["paths"]["/ping"]["get"].get("parameters").is_none());
        assert_eq!(
            doc["paths"]["/teapot"]["post"]["responses"]["418"]["description"],
            "I'm a teapot"
        );
    }

    #[test]
    fn test_first_registered_operation_wins() {
        let doc = document(
            r#"{"endpoints": [
                {"path": "/x", "response": "wildcard"},
                {"path": "/x", "method": "GET", "response": "exact"}
            ]}"#,
        );
        assert_eq!(
            doc["paths"]["/x"]["get"]["responses"]["200"]["content"]["application/json"]["example"],
            "wildcard"
        );
    }
}
