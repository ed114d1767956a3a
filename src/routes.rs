// Route-tree traversal and normalization into flat route records
use crate::models::{LogSink, RouteAnalysis, RouteRecord};
use crate::page::{ArrayRef, Value};
use crate::router::RouterHandle;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref PARAM_RE: Regex = Regex::new(r":(\w+)").unwrap();
}

fn param_placeholder(name: &str) -> &'static str {
    match name {
        "id" => "123",
        "userId" => "456",
        "name" => "example",
        _ => "value",
    }
}

/// Derives parameter/wildcard information from a route path and synthesizes
/// one example path per finding.
pub fn analyze_route_parameters(path: &str) -> RouteAnalysis {
    let mut analysis = RouteAnalysis::default();

    let parameters: Vec<String> = PARAM_RE
        .captures_iter(path)
        .map(|c| c[1].to_string())
        .collect();
    if !parameters.is_empty() {
        analysis.has_params = true;
        let example = PARAM_RE
            .replace_all(path, |caps: &Captures| param_placeholder(&caps[1]).to_string())
            .to_string();
        analysis.parameters = parameters;
        analysis.examples.push(example);
    }

    if path.contains('*') || path.contains("(.*)") {
        analysis.has_wildcard = true;
        analysis.examples.push(path.replacen('*', "any-path", 1));
    }

    if path.contains('?') {
        analysis.has_query = true;
    }

    analysis
}

/// Joins a child segment onto its accumulated parent path. An absolute child
/// overrides the parent entirely; otherwise exactly one "/" separates them.
pub fn join_path(base: &str, path: &str) -> String {
    if path.is_empty() {
        return if base.is_empty() { "/".to_string() } else { base.to_string() };
    }
    if path.starts_with('/') {
        return path.to_string();
    }
    if base.is_empty() || base == "/" {
        return format!("/{}", path);
    }
    let base = base.strip_suffix('/').unwrap_or(base);
    format!("{}/{}", base, path)
}

/// Normalizes the router's internal route representation into a flat list.
/// Strategies are tried in order and the first one whose capability is
/// present wins; later strategies are not attempted.
pub fn list_routes(router: &RouterHandle, sink: &LogSink) -> Vec<RouteRecord> {
    let mut list = Vec::new();

    // flat accessor on the router itself
    if let Some(accessor @ Value::Function(_)) = router.value.get_path(&["getRoutes"]) {
        push_flat(&accessor.call(), &mut list);
        return list;
    }

    // static route-config tree
    if let Some(routes) = router
        .value
        .get_path(&["options", "routes"])
        .and_then(|v| v.as_array().cloned())
    {
        traverse(&routes, "", &mut list);
        return list;
    }

    // matcher-exposed accessor
    if let Some(accessor @ Value::Function(_)) = router.value.get_path(&["matcher", "getRoutes"]) {
        push_flat(&accessor.call(), &mut list);
        return list;
    }

    // currently-matched chain from history state
    if let Some(matched) = router
        .value
        .get_path(&["history", "current", "matched"])
        .and_then(|v| v.as_array().cloned())
    {
        for route in matched.items() {
            let path = string_field(&route, "path");
            list.push(route_record(&route, path));
        }
        return list;
    }

    sink.warn("unable to list route information");
    list
}

fn push_flat(routes: &Value, list: &mut Vec<RouteRecord>) {
    if let Some(routes) = routes.as_array() {
        for route in routes.items() {
            let path = string_field(&route, "path");
            list.push(route_record(&route, path));
        }
    }
}

fn traverse(routes: &ArrayRef, base: &str, list: &mut Vec<RouteRecord>) {
    for route in routes.items() {
        let own = string_field(&route, "path");
        let full = join_path(base, &own);
        list.push(route_record(&route, full.clone()));

        if let Some(children) = route
            .get_path(&["children"])
            .and_then(|v| v.as_array().cloned())
        {
            if !children.is_empty() {
                traverse(&children, &full, list);
            }
        }
    }
}

fn string_field(route: &Value, key: &str) -> String {
    route
        .get_path(&[key])
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn route_record(route: &Value, path: String) -> RouteRecord {
    let meta = route.get_path(&["meta"]);
    let requires_auth = matches!(
        route.get_path(&["meta", "requiresAuth"]),
        Some(v) if v.is_truthy()
    );
    let roles = route
        .get_path(&["meta", "roles"])
        .and_then(|v| v.as_array().cloned())
        .map(|arr| {
            arr.items()
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    RouteRecord {
        name: string_field(route, "name"),
        component: component_name(route),
        analysis: analyze_route_parameters(&path),
        has_before_enter: matches!(route.get_path(&["beforeEnter"]), Some(v) if v.is_truthy()),
        requires_auth,
        roles,
        meta,
        path,
    }
}

fn component_name(route: &Value) -> String {
    match route.get_path(&["component"]) {
        Some(Value::Function(f)) if !f.name.is_empty() => f.name.clone(),
        Some(Value::Object(obj)) => {
            if let Ok(Some(Value::Str(name))) = obj.get("name") {
                name
            } else if let Some(class) = obj.class() {
                class
            } else {
                "Unknown".to_string()
            }
        }
        _ => "Unknown".to_string(),
    }
}
