// Boundary sanitization: turns captured values and analysis results into
// plain JSON safe to hand across the reporting channel.
use crate::models::{AnalysisResult, RouteRecord};
use crate::page::Value;
use serde_json::{json, Value as Json};

/// Keys that routinely close reference cycles in captured route graphs.
const CYCLE_KEYS: &[&str] = &["parent", "router", "matched"];

/// Nested objects under these keys keep their fields (shallow-sanitized);
/// any other nested object collapses to "[Object]".
const SHALLOW_KEYS: &[&str] = &["meta", "query", "params"];

fn scalar(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Str(s) => json!(s),
        Value::Function(_) => json!("[Function]"),
        Value::Promise => json!("[Promise]"),
        _ => Json::Null,
    }
}

/// One-level sanitization for route-adjacent objects: scalars pass, anything
/// nested collapses to a tag.
pub fn sanitize_shallow(value: &Value) -> Json {
    let obj = match value {
        Value::Object(o) => o,
        Value::Array(a) => {
            return Json::Array(a.items().iter().map(shallow_field).collect());
        }
        other => return scalar(other),
    };

    let mut out = serde_json::Map::new();
    for key in obj.keys() {
        match obj.get(&key) {
            Ok(Some(v)) => {
                out.insert(key, shallow_field(&v));
            }
            Ok(None) => {}
            Err(_) => return json!("[Route Object - Serialization Error]"),
        }
    }
    Json::Object(out)
}

fn shallow_field(value: &Value) -> Json {
    match value {
        Value::Object(_) | Value::Array(_) => json!("[Object]"),
        other => scalar(other),
    }
}

/// Full sanitization contract for arbitrary captured values: functions and
/// promises become tags, class-tagged objects become "[Class]", likely-cyclic
/// and framework-internal keys are dropped, and nesting collapses except
/// under the dedicated shallow keys.
pub fn sanitize_value(value: &Value) -> Json {
    match value {
        Value::Object(obj) => {
            if let Some(class) = obj.class() {
                return json!(format!("[{}]", class));
            }
            let mut out = serde_json::Map::new();
            for key in obj.keys() {
                if key.starts_with('_') || key.starts_with('$') || CYCLE_KEYS.contains(&key.as_str())
                {
                    continue;
                }
                let v = match obj.get(&key) {
                    Ok(Some(v)) => v,
                    Ok(None) => continue,
                    Err(_) => return json!("[Object - Serialization Error]"),
                };
                if key == "allRoutes" {
                    if let Value::Array(routes) = &v {
                        out.insert(key, forced_route_array(routes.items()));
                        continue;
                    }
                }
                if key == "pathDefinitions" {
                    if let Some(defs) = v.as_object() {
                        let paths = defs
                            .get("paths")
                            .ok()
                            .flatten()
                            .and_then(|p| p.as_array().cloned())
                            .map(|p| forced_path_array(p.items()))
                            .unwrap_or_else(|| json!([]));
                        out.insert(key, json!({ "paths": paths }));
                        continue;
                    }
                }
                out.insert(key.clone(), sanitize_field(&key, &v));
            }
            Json::Object(out)
        }
        Value::Array(arr) => sanitize_array(arr.items()),
        other => scalar(other),
    }
}

fn sanitize_field(key: &str, value: &Value) -> Json {
    match value {
        Value::Array(arr) => sanitize_array(arr.items()),
        Value::Object(obj) => {
            if let Some(class) = obj.class() {
                json!(format!("[{}]", class))
            } else if SHALLOW_KEYS.contains(&key) {
                sanitize_shallow(value)
            } else {
                json!("[Object]")
            }
        }
        other => scalar(other),
    }
}

fn sanitize_array(items: Vec<Value>) -> Json {
    // an array whose first element looks like a route gets the dedicated
    // shape-preserving treatment
    let is_route_array = items
        .first()
        .and_then(|v| v.as_object().cloned())
        .map(|o| matches!(o.get("path"), Ok(Some(_))))
        .unwrap_or(false);
    if is_route_array {
        return forced_route_array(items);
    }
    Json::Array(
        items
            .iter()
            .map(|item| match item {
                Value::Object(_) | Value::Array(_) => sanitize_shallow(item),
                other => scalar(other),
            })
            .collect(),
    )
}

fn forced_route_array(items: Vec<Value>) -> Json {
    Json::Array(
        items
            .iter()
            .map(|route| match route {
                Value::Object(_) => {
                    let name = route
                        .get_path(&["name"])
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default();
                    let path = route
                        .get_path(&["path"])
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default();
                    let meta = route
                        .get_path(&["meta"])
                        .map(|m| sanitize_shallow(&m))
                        .unwrap_or_else(|| json!({}));
                    json!({ "name": name, "path": path, "meta": meta })
                }
                other => scalar(other),
            })
            .collect(),
    )
}

fn forced_path_array(items: Vec<Value>) -> Json {
    Json::Array(
        items
            .iter()
            .map(|item| {
                let field = |key: &str| {
                    item.get_path(&[key])
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default()
                };
                json!({
                    "path": field("path"),
                    "source": field("source"),
                    "pattern": field("pattern"),
                })
            })
            .collect(),
    )
}

fn route_json(route: &RouteRecord) -> Json {
    let meta = route
        .meta
        .as_ref()
        .map(sanitize_shallow)
        .unwrap_or_else(|| json!({}));
    json!({ "name": route.name, "path": route.path, "meta": meta })
}

/// Prepares the full result payload for the reporting boundary. Any failure
/// degrades to the minimal fallback payload instead of propagating.
pub fn sanitize_result(result: &AnalysisResult) -> Json {
    match try_sanitize(result) {
        Ok(payload) => payload,
        Err(_) => minimal_fallback(result),
    }
}

fn try_sanitize(result: &AnalysisResult) -> Result<Json, serde_json::Error> {
    let routes: Vec<Json> = result.all_routes.iter().map(route_json).collect();
    let analyses: Vec<Json> = result
        .all_routes
        .iter()
        .map(|r| serde_json::to_value(&r.analysis))
        .collect::<Result<_, _>>()?;
    let route_details: Vec<Json> = result
        .all_routes
        .iter()
        .zip(analyses)
        .map(|(r, analysis)| {
            json!({
                "component": r.component,
                "analysis": analysis,
                "hasBeforeEnter": r.has_before_enter,
                "requiresAuth": r.requires_auth,
                "roles": r.roles,
            })
        })
        .collect();

    Ok(json!({
        "vueDetected": result.vue_detected,
        "vueVersion": result.vue_version,
        "framework": result.framework.name(),
        "buildTool": result.build_tool.label(),
        "routerDetected": result.router_detected,
        "logs": serde_json::to_value(&result.logs)?,
        "modifiedRoutes": serde_json::to_value(&result.modified_routes)?,
        "allRoutes": routes,
        "routeDetails": route_details,
        "routerBase": result.router_base,
        "pageAnalysis": serde_json::to_value(&result.page_analysis)?,
        "currentPath": result.current_path,
        "pathDefinitions": { "paths": serde_json::to_value(&result.path_definitions)? },
        "securityBypass": serde_json::to_value(&result.security_bypass)?,
        "error": result.error,
        "analyzedAt": result.analyzed_at.to_rfc3339(),
    }))
}

/// Emitted when result sanitization itself fails: only the flags, the
/// version, the modification list, and an explicit error marker survive.
pub fn minimal_fallback(result: &AnalysisResult) -> Json {
    json!({
        "vueDetected": result.vue_detected,
        "routerDetected": result.router_detected,
        "vueVersion": result.vue_version,
        "modifiedRoutes": serde_json::to_value(&result.modified_routes)
            .unwrap_or_else(|_| json!([])),
        "error": "Serialization failed",
        "allRoutes": [],
    })
}
