// Orchestrates the full pipeline: bounded detection retries, the settle
// delay, and the staged analysis that assembles one result record.
use crate::bypass;
use crate::finder::{self, DEFAULT_MAX_DEPTH};
use crate::links;
use crate::miner::{PathMiner, ScriptFetcher};
use crate::models::{AnalysisResult, BuildTool, LogSink};
use crate::page::PageSnapshot;
use crate::router;
use crate::routes;
use crate::sanitizer;
use crate::version;
use anyhow::Result;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Detection retry schedule: immediate, then two delayed attempts.
const RETRY_DELAYS_MS: [u64; 3] = [0, 300, 600];

/// Pause before full analysis to let the target's render cycle settle.
const SETTLE_DELAY_MS: u64 = 50;

/// Outcome of one detection cycle.
#[derive(Debug, Clone)]
pub struct Detection {
    pub detected: bool,
    pub method: String,
    pub attempts: u32,
}

pub struct Analyzer {
    max_depth: usize,
    settle_ms: u64,
    fetcher: ScriptFetcher,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Analyzer {
            max_depth: DEFAULT_MAX_DEPTH,
            settle_ms: SETTLE_DELAY_MS,
            fetcher: ScriptFetcher::disabled(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_fetcher(mut self, fetcher: ScriptFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Runs the bounded retry schedule and reports how detection concluded.
    pub async fn detect(&self, page: &PageSnapshot) -> Detection {
        for (attempt, delay) in RETRY_DELAYS_MS.iter().enumerate() {
            if *delay > 0 {
                sleep(Duration::from_millis(*delay)).await;
            }
            if finder::find(&page.dom, self.max_depth).is_some() {
                let method = if attempt == 0 {
                    "Immediate detection".to_string()
                } else {
                    format!("Delayed detection (attempt {})", attempt + 1)
                };
                return Detection {
                    detected: true,
                    method,
                    attempts: attempt as u32 + 1,
                };
            }
            debug!("detection attempt {} found no framework root", attempt + 1);
        }
        Detection {
            detected: false,
            method: format!("Max retry limit reached ({} attempts)", RETRY_DELAYS_MS.len()),
            attempts: RETRY_DELAYS_MS.len() as u32,
        }
    }

    /// Full analysis phase. Always yields a result record; a fault inside the
    /// phase surfaces in `error` with both detection flags left false. The
    /// captured log is attached on every path.
    pub async fn analyze(&self, page: &PageSnapshot) -> AnalysisResult {
        sleep(Duration::from_millis(self.settle_ms)).await;

        let sink = LogSink::new();
        let mut result = match self.full_analysis(page, &sink).await {
            Ok(result) => result,
            Err(e) => {
                sink.error(format!("analysis failed: {}", e));
                let mut fallback = AnalysisResult::empty(&page.current_path());
                fallback.error = Some(e.to_string());
                fallback
            }
        };
        result.logs = sink.entries();
        result
    }

    async fn full_analysis(&self, page: &PageSnapshot, sink: &LogSink) -> Result<AnalysisResult> {
        let mut result = AnalysisResult::empty(&page.current_path());

        let root = match finder::find(&page.dom, self.max_depth) {
            Some(root) => root,
            None => {
                sink.error("no Vue instance detected");
                return Ok(result);
            }
        };
        result.vue_detected = true;

        let router = match router::resolve(&root) {
            Some(router) => router,
            None => {
                sink.error("no Vue Router instance detected");
                return Ok(result);
            }
        };
        result.router_detected = true;
        sink.log(format!("router located via {}", router.found_via));
        if let Some(shape) = router.shape() {
            sink.log(format!("router shape: {:?}", shape));
        }

        let info = version::resolve(&root, page);
        sink.log(format!("Vue version: {}", info.version));
        sink.log(format!("framework: {}", info.framework.name()));
        if info.build_tool != BuildTool::None {
            sink.log(format!("build tool: {}", info.build_tool.label()));
        }
        result.vue_version = info.version;
        result.framework = info.framework;
        result.build_tool = info.build_tool;

        result.router_base = router::router_base(&router);
        if result.router_base.is_empty() {
            sink.log("router base path: (none)");
        } else {
            sink.log(format!("router base path: {}", result.router_base));
        }

        result.page_analysis = links::analyze_page_links(page);
        if !result.page_analysis.detected_base_path.is_empty() {
            sink.log(format!(
                "detected base path from page links: {}",
                result.page_analysis.detected_base_path
            ));
        }

        let (modified, bypass) = bypass::neutralize(&router, &root, page, sink);
        result.modified_routes = modified;
        result.security_bypass = Some(bypass);

        result.all_routes = routes::list_routes(&router, sink);
        sink.log("all registered routes:");
        sink.table(
            result
                .all_routes
                .iter()
                .map(|r| {
                    json!({
                        "name": r.name,
                        "path": r.path,
                        "meta": r.meta.as_ref().map(sanitizer::sanitize_shallow),
                    })
                })
                .collect(),
        );

        let miner = PathMiner::new(page, &self.fetcher, sink);
        result.path_definitions = miner.discover().await;
        sink.log(format!(
            "discovered {} path definitions",
            result.path_definitions.len()
        ));

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{NodeRef, ObjectRef, Value};
    use tokio::time::Instant;

    fn empty_page() -> PageSnapshot {
        let body = NodeRef::build(
            "body",
            vec![],
            ObjectRef::new(),
            vec![NodeRef::element("div")],
        );
        PageSnapshot::new("https://x.test/", body)
    }

    fn modern_page() -> PageSnapshot {
        let routes = Value::array(vec![
            Value::Object(
                ObjectRef::new()
                    .with("path", Value::str("/a"))
                    .with(
                        "meta",
                        Value::Object(ObjectRef::new().with("requiresAuth", Value::Bool(true))),
                    ),
            ),
            Value::Object(
                ObjectRef::new()
                    .with("path", Value::str("/b"))
                    .with(
                        "meta",
                        Value::Object(ObjectRef::new().with("requiresAuth", Value::Bool(false))),
                    ),
            ),
        ]);
        let router = ObjectRef::new()
            .with("getRoutes", Value::function_returning("getRoutes", routes))
            .with(
                "options",
                Value::Object(ObjectRef::new().with("base", Value::str("/app"))),
            );
        let app = ObjectRef::new()
            .with("version", Value::str("3.4.21"))
            .with(
                "config",
                Value::Object(ObjectRef::new().with(
                    "globalProperties",
                    Value::Object(ObjectRef::new().with("$router", Value::Object(router))),
                )),
            );
        let app_div = NodeRef::build(
            "div",
            vec![("id".to_string(), "app".to_string())],
            ObjectRef::new().with("__vue_app__", Value::Object(app)),
            vec![],
        );
        let body = NodeRef::build("body", vec![], ObjectRef::new(), vec![app_div]);
        PageSnapshot::new("https://x.test/app/dashboard", body)
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_retry_schedule_and_terminal_failure() {
        let analyzer = Analyzer::new();
        let page = empty_page();

        let started = Instant::now();
        let detection = analyzer.detect(&page).await;
        let elapsed = started.elapsed();

        assert!(!detection.detected);
        assert_eq!(detection.attempts, 3);
        assert_eq!(detection.method, "Max retry limit reached (3 attempts)");
        // 0 + 300 + 600 ms of scheduled delay
        assert_eq!(elapsed.as_millis(), 900);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_detection() {
        let analyzer = Analyzer::new();
        let page = modern_page();

        let started = Instant::now();
        let detection = analyzer.detect(&page).await;

        assert!(detection.detected);
        assert_eq!(detection.attempts, 1);
        assert_eq!(detection.method, "Immediate detection");
        assert_eq!(started.elapsed().as_millis(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_analysis_on_modern_root() {
        let analyzer = Analyzer::new();
        let page = modern_page();

        let result = analyzer.analyze(&page).await;

        assert!(result.vue_detected);
        assert!(result.router_detected);
        assert_eq!(result.vue_version, "3.4.21");
        assert_eq!(result.router_base, "/app");
        assert_eq!(result.current_path, "/app/dashboard");
        assert_eq!(result.all_routes.len(), 2);

        // "requiresAuth" contains the substring "auth" and was truthy on /a,
        // so the patch flipped it and recorded the modification; by listing
        // time the flag reads false
        assert_eq!(result.modified_routes.len(), 1);
        assert_eq!(result.modified_routes[0].path, "/a");
        assert!(!result.all_routes[0].requires_auth);

        let bypass = result.security_bypass.unwrap();
        assert!(bypass.router_guards_cleared);
        assert!(!result.logs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_without_root_is_partial() {
        let analyzer = Analyzer::new();
        let result = analyzer.analyze(&empty_page()).await;

        assert!(!result.vue_detected);
        assert!(!result.router_detected);
        assert!(result.all_routes.is_empty());
        assert!(result
            .logs
            .iter()
            .any(|e| e.message.contains("no Vue instance detected")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_without_router_skips_downstream() {
        let app_div = NodeRef::build(
            "div",
            vec![],
            ObjectRef::new().with("__vue__", Value::Object(ObjectRef::new())),
            vec![],
        );
        let body = NodeRef::build("body", vec![], ObjectRef::new(), vec![app_div]);
        let page = PageSnapshot::new("https://x.test/", body);

        let result = Analyzer::new().analyze(&page).await;
        assert!(result.vue_detected);
        assert!(!result.router_detected);
        assert!(result.security_bypass.is_none());
        assert!(result.path_definitions.is_empty());
        assert!(result
            .logs
            .iter()
            .any(|e| e.message.contains("no Vue Router instance detected")));
    }
}
