// Framework generation and build-tool classification for a detected root
use crate::finder::FrameworkRoot;
use crate::models::{BuildTool, Framework, VersionInfo};
use crate::page::{PageSnapshot, Value};
use tracing::debug;

/// Classifies the detected root. Every probe degrades to the next one when a
/// captured property throws on access; "unknown" is the terminal fallback.
pub fn resolve(root: &FrameworkRoot, page: &PageSnapshot) -> VersionInfo {
    let props = Value::Object(root.props().clone());
    let globals = Value::Object(page.globals.clone());

    let mut version = version_string(&props.get_path(&["__vue_app__", "version"]))
        .or_else(|| {
            version_string(&props.get_path(&["__vue__", "$root", "$options", "_base", "version"]))
        });

    if version.is_none() {
        version = version_string(&globals.get_path(&["Vue", "version"])).or_else(|| {
            version_string(&globals.get_path(&["__VUE_DEVTOOLS_GLOBAL_HOOK__", "Vue", "version"]))
        });
    }

    let mut framework = Framework::Vue;
    if truthy(&globals, "$nuxt") || truthy(&globals, "__NUXT__") {
        framework = Framework::Nuxt;
        if let Some(v) =
            version_string(&globals.get_path(&["$nuxt", "$root", "$nuxt", "constructor", "version"]))
        {
            version = Some(v);
        }
    } else if truthy(&globals, "Quasar") || truthy(&props, "__quasar__") {
        framework = Framework::Quasar;
        if let Some(v) = version_string(&globals.get_path(&["Quasar", "version"])) {
            version = Some(v);
        }
    }

    // Build-tool markers are orthogonal to the framework classification.
    let build_tool = if truthy(&globals, "__VUE_HMR_RUNTIME__") {
        BuildTool::Vite
    } else if truthy(&globals, "webpackHotUpdate") || truthy(&globals, "__webpack_require__") {
        BuildTool::Webpack
    } else {
        BuildTool::None
    };

    let version = version.unwrap_or_else(|| "unknown".to_string());
    debug!(
        "resolved {} version {} (build tool: {:?})",
        framework.name(),
        version,
        build_tool
    );

    VersionInfo {
        version,
        framework,
        build_tool,
    }
}

fn version_string(value: &Option<Value>) -> Option<String> {
    let v = value.as_ref()?;
    let s = match v {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        _ => return None,
    };
    if s.is_empty() || s == "unknown" {
        None
    } else {
        Some(s)
    }
}

fn truthy(value: &Value, key: &str) -> bool {
    matches!(value.get_path(&[key]), Some(v) if v.is_truthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::{find, DEFAULT_MAX_DEPTH};
    use crate::page::{NodeRef, ObjectRef, PageSnapshot};

    fn root_with(props: ObjectRef) -> (FrameworkRoot, NodeRef) {
        let node = NodeRef::build("div", vec![], props, vec![]);
        let body = NodeRef::build("body", vec![], ObjectRef::new(), vec![node.clone()]);
        (find(&body, DEFAULT_MAX_DEPTH).unwrap(), body)
    }

    #[test]
    fn test_version_from_app_instance() {
        let app = ObjectRef::new().with("version", Value::str("3.4.21"));
        let (root, body) = root_with(ObjectRef::new().with("__vue_app__", Value::Object(app)));
        let page = PageSnapshot::new("https://x.test/", body);

        let info = resolve(&root, &page);
        assert_eq!(info.version, "3.4.21");
        assert_eq!(info.framework, Framework::Vue);
        assert_eq!(info.build_tool, BuildTool::None);
    }

    #[test]
    fn test_version_falls_back_to_global_then_devtools() {
        let (root, body) =
            root_with(ObjectRef::new().with("__vue__", Value::Object(ObjectRef::new())));
        let mut page = PageSnapshot::new("https://x.test/", body);
        page.globals = ObjectRef::new().with(
            "__VUE_DEVTOOLS_GLOBAL_HOOK__",
            Value::Object(
                ObjectRef::new().with(
                    "Vue",
                    Value::Object(ObjectRef::new().with("version", Value::str("2.6.14"))),
                ),
            ),
        );
        assert_eq!(resolve(&root, &page).version, "2.6.14");
    }

    #[test]
    fn test_nuxt_overrides_framework() {
        let (root, body) =
            root_with(ObjectRef::new().with("__vue__", Value::Object(ObjectRef::new())));
        let mut page = PageSnapshot::new("https://x.test/", body);
        page.globals = ObjectRef::new()
            .with("__NUXT__", Value::Object(ObjectRef::new()))
            .with("__webpack_require__", Value::function("", ""));

        let info = resolve(&root, &page);
        assert_eq!(info.framework, Framework::Nuxt);
        assert_eq!(info.version, "unknown");
        // build tool still classified alongside the meta-framework
        assert_eq!(info.build_tool, BuildTool::Webpack);
    }

    #[test]
    fn test_quasar_version_rederived() {
        let (root, body) =
            root_with(ObjectRef::new().with("__quasar__", Value::Object(ObjectRef::new())));
        let mut page = PageSnapshot::new("https://x.test/", body);
        page.globals = ObjectRef::new()
            .with(
                "Quasar",
                Value::Object(ObjectRef::new().with("version", Value::str("2.14.2"))),
            )
            .with("__VUE_HMR_RUNTIME__", Value::Object(ObjectRef::new()));

        let info = resolve(&root, &page);
        assert_eq!(info.framework, Framework::Quasar);
        assert_eq!(info.version, "2.14.2");
        assert_eq!(info.build_tool, BuildTool::Vite);
    }

    #[test]
    fn test_hostile_globals_degrade_to_unknown() {
        let (root, body) =
            root_with(ObjectRef::new().with("__vue__", Value::Object(ObjectRef::new())));
        let mut page = PageSnapshot::new("https://x.test/", body);
        page.globals = ObjectRef::new().with_throwing("Vue", "revoked");

        let info = resolve(&root, &page);
        assert_eq!(info.version, "unknown");
        assert_eq!(info.framework, Framework::Vue);
    }
}
