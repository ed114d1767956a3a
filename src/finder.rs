// Breadth-first search for a framework root inside the captured DOM
use crate::page::{NodeRef, ObjectRef, ELEMENT_NODE};
use std::collections::VecDeque;
use tracing::debug;

pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Which marker family identified the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootMarker {
    AppInstance,
    Composition,
    MetaFramework,
    UiFramework,
    AlternateBuild,
}

/// Marker probes in priority order. Within a family, any truthy property
/// qualifies.
const MARKER_PROBES: &[(&[&str], RootMarker)] = &[
    (&["__vue_app__", "__vue__", "_vnode"], RootMarker::AppInstance),
    (&["__vueParentComponent", "__vueapp__"], RootMarker::Composition),
    (&["__NUXT__", "$nuxt"], RootMarker::MetaFramework),
    (&["__quasar__", "$q"], RootMarker::UiFramework),
    (&["_isVue", "__VUE__"], RootMarker::AlternateBuild),
];

/// A DOM node carrying framework-internal markers. Transient per run.
#[derive(Clone)]
pub struct FrameworkRoot {
    pub node: NodeRef,
    pub marker: RootMarker,
}

impl FrameworkRoot {
    pub fn props(&self) -> &ObjectRef {
        self.node.props()
    }
}

/// Visits nodes breadth-first (children before grandchildren) and returns
/// the first node matching any marker probe. `max_depth` bounds traversal on
/// pathological trees; non-element nodes are never expanded.
pub fn find(start: &NodeRef, max_depth: usize) -> Option<FrameworkRoot> {
    let mut queue: VecDeque<(NodeRef, usize)> = VecDeque::new();
    queue.push_back((start.clone(), 0));

    while let Some((node, depth)) = queue.pop_front() {
        if depth > max_depth {
            break;
        }
        if let Some(marker) = match_markers(node.props()) {
            return Some(FrameworkRoot { node, marker });
        }
        if node.node_type() == ELEMENT_NODE {
            for child in node.children() {
                queue.push_back((child.clone(), depth + 1));
            }
        }
    }
    None
}

fn match_markers(props: &ObjectRef) -> Option<RootMarker> {
    for (keys, marker) in MARKER_PROBES {
        for key in *keys {
            match props.get(key) {
                Ok(Some(v)) if v.is_truthy() => return Some(*marker),
                Ok(_) => {}
                Err(e) => debug!("find_root: probe {} failed: {}", key, e),
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{NodeRef, ObjectRef, Value};

    fn div(props: ObjectRef, children: Vec<NodeRef>) -> NodeRef {
        NodeRef::build("div", vec![], props, children)
    }

    #[test]
    fn test_finds_first_in_breadth_first_order() {
        // marker on a depth-1 sibling must win over a depth-2 descendant
        let deep = div(
            ObjectRef::new().with("__vue__", Value::Object(ObjectRef::new())),
            vec![],
        );
        let left = div(ObjectRef::new(), vec![deep]);
        let right = div(
            ObjectRef::new().with("$nuxt", Value::Object(ObjectRef::new())),
            vec![],
        );
        let body = div(ObjectRef::new(), vec![left, right]);

        let root = find(&body, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(root.marker, RootMarker::MetaFramework);
    }

    #[test]
    fn test_marker_priority_within_node() {
        let props = ObjectRef::new()
            .with("$q", Value::Object(ObjectRef::new()))
            .with("__vue_app__", Value::Object(ObjectRef::new()));
        let root = find(&div(props, vec![]), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(root.marker, RootMarker::AppInstance);
    }

    #[test]
    fn test_falsy_markers_do_not_match() {
        let props = ObjectRef::new()
            .with("_isVue", Value::Bool(false))
            .with("__VUE__", Value::Null);
        assert!(find(&div(props, vec![]), DEFAULT_MAX_DEPTH).is_none());
    }

    #[test]
    fn test_hostile_props_are_skipped() {
        let hostile = div(
            ObjectRef::new().with_throwing("__vue_app__", "trap"),
            vec![],
        );
        let good = div(
            ObjectRef::new().with("_vnode", Value::Object(ObjectRef::new())),
            vec![],
        );
        let body = div(ObjectRef::new(), vec![hostile, good]);
        let root = find(&body, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(root.marker, RootMarker::AppInstance);
    }

    #[test]
    fn test_text_nodes_are_not_expanded() {
        let body = NodeRef::build(
            "body",
            vec![],
            ObjectRef::new(),
            vec![NodeRef::text("plain"), NodeRef::comment("nothing here")],
        );
        assert!(find(&body, DEFAULT_MAX_DEPTH).is_none());
    }

    #[test]
    fn test_max_depth_bounds_traversal() {
        // chain of 5 nested divs with the marker at the bottom
        let mut node = div(
            ObjectRef::new().with("__vue__", Value::Object(ObjectRef::new())),
            vec![],
        );
        for _ in 0..5 {
            node = div(ObjectRef::new(), vec![node]);
        }
        assert!(find(&node, 3).is_none());
        assert!(find(&node, 5).is_some());
    }
}
