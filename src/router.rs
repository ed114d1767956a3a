// Router-instance resolution across framework generations
use crate::finder::FrameworkRoot;
use crate::page::{ObjectRef, Value};
use tracing::{debug, warn};

/// Internal layout a located router exposes, chosen by ordered capability
/// probes rather than type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterShape {
    /// Flat route accessor (`getRoutes`).
    ModernConfig,
    /// Static route-config tree (`options.routes`).
    ClassicInstance,
    /// Matcher-exposed accessor.
    Matcher,
    /// Currently-matched chain from history state.
    History,
}

/// The one router considered "the" router for this run.
#[derive(Clone)]
pub struct RouterHandle {
    pub value: Value,
    /// Which nested probe produced the instance (for the detection log).
    pub found_via: &'static str,
}

impl RouterHandle {
    pub fn obj(&self) -> Option<&ObjectRef> {
        self.value.as_object()
    }

    /// First capability the router satisfies, in dispatch order.
    pub fn shape(&self) -> Option<RouterShape> {
        let obj = self.obj()?;
        if matches!(obj.get("getRoutes"), Ok(Some(Value::Function(_)))) {
            return Some(RouterShape::ModernConfig);
        }
        if matches!(self.value.get_path(&["options", "routes"]), Some(v) if v.is_truthy()) {
            return Some(RouterShape::ClassicInstance);
        }
        if matches!(self.value.get_path(&["matcher"]), Some(v) if v.is_truthy()) {
            return Some(RouterShape::Matcher);
        }
        if matches!(self.value.get_path(&["history", "current", "matched"]), Some(v) if v.is_truthy())
        {
            return Some(RouterShape::History);
        }
        None
    }
}

const MODERN_PROBES: &[(&'static str, &[&str])] = &[
    (
        "app.config.globalProperties.$router",
        &["__vue_app__", "config", "globalProperties", "$router"],
    ),
    (
        "app._instance.appContext.config.globalProperties.$router",
        &[
            "__vue_app__",
            "_instance",
            "appContext",
            "config",
            "globalProperties",
            "$router",
        ],
    ),
    ("app._instance.ctx.$router", &["__vue_app__", "_instance", "ctx", "$router"]),
];

const CLASSIC_PROBES: &[(&'static str, &[&str])] = &[
    ("vm.$router", &["__vue__", "$router"]),
    ("vm.$root.$router", &["__vue__", "$root", "$router"]),
    ("vm.$root.$options.router", &["__vue__", "$root", "$options", "router"]),
    ("vm._router", &["__vue__", "_router"]),
];

/// Locates the router instance behind a detected root. The modern
/// application-instance shape is probed before the classic instance shape;
/// within a shape the first non-null nested path wins. A thrown property
/// access is treated as "not found" and logged.
pub fn resolve(root: &FrameworkRoot) -> Option<RouterHandle> {
    let props = Value::Object(root.props().clone());

    for probes in [MODERN_PROBES, CLASSIC_PROBES] {
        for &(label, path) in probes {
            match props.try_path(path) {
                Ok(Some(v)) if v.is_truthy() => {
                    debug!("find_router: located via {}", label);
                    return Some(RouterHandle {
                        value: v,
                        found_via: label,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!("find_router: probe {} failed: {}", label, e),
            }
        }
    }
    None
}

/// Base path the router was mounted under, empty when unset.
pub fn router_base(router: &RouterHandle) -> String {
    for path in [&["options", "base"][..], &["history", "base"][..]] {
        match router.value.try_path(path) {
            Ok(Some(Value::Str(base))) if !base.is_empty() => return base,
            Ok(_) => {}
            Err(e) => warn!("router_base: probe failed: {}", e),
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::{find, DEFAULT_MAX_DEPTH};
    use crate::page::NodeRef;

    fn root_with(props: ObjectRef) -> FrameworkRoot {
        let node = NodeRef::build("div", vec![], props, vec![]);
        find(&node, DEFAULT_MAX_DEPTH).unwrap()
    }

    fn router_obj() -> ObjectRef {
        ObjectRef::new().with("getRoutes", Value::function_returning("getRoutes", Value::array(vec![])))
    }

    #[test]
    fn test_modern_global_properties_first() {
        let router = router_obj();
        let app = ObjectRef::new().with(
            "config",
            Value::Object(ObjectRef::new().with(
                "globalProperties",
                Value::Object(ObjectRef::new().with("$router", Value::Object(router.clone()))),
            )),
        );
        let root = root_with(ObjectRef::new().with("__vue_app__", Value::Object(app)));

        let handle = resolve(&root).unwrap();
        assert_eq!(handle.found_via, "app.config.globalProperties.$router");
        assert_eq!(handle.obj().unwrap().ptr_id(), router.ptr_id());
        assert_eq!(handle.shape(), Some(RouterShape::ModernConfig));
    }

    #[test]
    fn test_modern_falls_through_to_component_context() {
        let router = router_obj();
        let app = ObjectRef::new()
            .with("config", Value::Object(ObjectRef::new()))
            .with(
                "_instance",
                Value::Object(ObjectRef::new().with(
                    "ctx",
                    Value::Object(ObjectRef::new().with("$router", Value::Object(router))),
                )),
            );
        let root = root_with(ObjectRef::new().with("__vue_app__", Value::Object(app)));
        assert_eq!(resolve(&root).unwrap().found_via, "app._instance.ctx.$router");
    }

    #[test]
    fn test_classic_probe_order() {
        let options_router = ObjectRef::new().with(
            "options",
            Value::Object(ObjectRef::new().with("routes", Value::array(vec![]))),
        );
        let vm = ObjectRef::new().with(
            "$root",
            Value::Object(
                ObjectRef::new().with(
                    "$options",
                    Value::Object(
                        ObjectRef::new().with("router", Value::Object(options_router.clone())),
                    ),
                ),
            ),
        );
        let root = root_with(ObjectRef::new().with("__vue__", Value::Object(vm)));

        let handle = resolve(&root).unwrap();
        assert_eq!(handle.found_via, "vm.$root.$options.router");
        assert_eq!(handle.shape(), Some(RouterShape::ClassicInstance));
    }

    #[test]
    fn test_hostile_probe_falls_through() {
        let vm = ObjectRef::new()
            .with_throwing("$router", "proxy trap")
            .with("_router", Value::Object(router_obj()));
        let root = root_with(ObjectRef::new().with("__vue__", Value::Object(vm)));
        assert_eq!(resolve(&root).unwrap().found_via, "vm._router");
    }

    #[test]
    fn test_no_router_anywhere() {
        let root = root_with(ObjectRef::new().with("__vue__", Value::Object(ObjectRef::new())));
        assert!(resolve(&root).is_none());
    }

    #[test]
    fn test_router_base() {
        let handle = RouterHandle {
            value: Value::Object(ObjectRef::new().with(
                "history",
                Value::Object(ObjectRef::new().with("base", Value::str("/console"))),
            )),
            found_via: "test",
        };
        assert_eq!(router_base(&handle), "/console");

        let bare = RouterHandle {
            value: Value::Object(ObjectRef::new()),
            found_via: "test",
        };
        assert_eq!(router_base(&bare), "");
    }
}
