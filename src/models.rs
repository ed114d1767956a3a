// Data model shared across the analysis pipeline
use crate::page::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Framework {
    Vue,
    Nuxt,
    Quasar,
}

impl Framework {
    pub fn name(&self) -> &'static str {
        match self {
            Framework::Vue => "Vue.js",
            Framework::Nuxt => "Nuxt.js",
            Framework::Quasar => "Quasar",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildTool {
    None,
    Vite,
    Webpack,
}

impl BuildTool {
    pub fn label(&self) -> &'static str {
        match self {
            BuildTool::None => "",
            BuildTool::Vite => "Vite",
            BuildTool::Webpack => "Webpack",
        }
    }
}

/// Framework generation/build classification for one detected root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub framework: Framework,
    pub build_tool: BuildTool,
}

impl Default for VersionInfo {
    fn default() -> Self {
        VersionInfo {
            version: "unknown".to_string(),
            framework: Framework::Vue,
            build_tool: BuildTool::None,
        }
    }
}

/// Derived purely from a route's path string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAnalysis {
    pub has_params: bool,
    pub has_query: bool,
    pub has_wildcard: bool,
    pub parameters: Vec<String>,
    pub examples: Vec<String>,
}

/// One normalized route. `path` is always absolute; `meta` keeps the captured
/// object so the sanitizer decides what crosses the reporting boundary.
#[derive(Debug, Clone)]
pub struct RouteRecord {
    pub name: String,
    pub path: String,
    pub meta: Option<Value>,
    pub component: String,
    pub analysis: RouteAnalysis,
    pub has_before_enter: bool,
    pub requires_auth: bool,
    pub roles: Vec<String>,
}

/// Recorded whenever a truthy auth-meta field is flipped to false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifiedRoute {
    pub path: String,
    pub name: String,
}

/// A path literal mined from static content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathDefinition {
    pub path: String,
    pub source: String,
    pub pattern: String,
}

/// Which bypass categories succeeded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityBypass {
    pub router_guards_cleared: bool,
    pub tokens_bypass: bool,
    pub session_bypass: bool,
    pub permissions_bypass: bool,
    pub cookies_bypass: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixCount {
    pub prefix: String,
    pub count: usize,
}

/// Common-prefix heuristic over the page's internal links.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLinkAnalysis {
    pub detected_base_path: String,
    pub common_prefixes: Vec<PrefixCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Warn,
    Error,
    Table,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
    #[serde(rename = "data", skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Json>>,
}

/// Run-scoped log collector injected through the pipeline instead of
/// redirecting process-wide output channels. Entries also mirror to the
/// tracing backend so normal logging still observes the run.
#[derive(Clone, Default)]
pub struct LogSink(Rc<RefCell<Vec<LogEntry>>>);

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{}", message);
        self.push(LogLevel::Log, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.push(LogLevel::Warn, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.push(LogLevel::Error, message, None);
    }

    pub fn table(&self, rows: Vec<Json>) {
        tracing::debug!("table with {} rows", rows.len());
        self.push(LogLevel::Table, String::new(), Some(rows));
    }

    fn push(&self, level: LogLevel, message: String, rows: Option<Vec<Json>>) {
        self.0.borrow_mut().push(LogEntry { level, message, rows });
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The terminal aggregate of one orchestrated run. Constructed fresh per run
/// and treated as immutable once handed to the reporting boundary.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub vue_detected: bool,
    pub vue_version: String,
    pub framework: Framework,
    pub build_tool: BuildTool,
    pub router_detected: bool,
    pub logs: Vec<LogEntry>,
    pub modified_routes: Vec<ModifiedRoute>,
    pub all_routes: Vec<RouteRecord>,
    pub router_base: String,
    pub page_analysis: PageLinkAnalysis,
    pub current_path: String,
    pub path_definitions: Vec<PathDefinition>,
    pub security_bypass: Option<SecurityBypass>,
    pub error: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn empty(current_path: &str) -> Self {
        AnalysisResult {
            vue_detected: false,
            vue_version: "unknown".to_string(),
            framework: Framework::Vue,
            build_tool: BuildTool::None,
            router_detected: false,
            logs: Vec::new(),
            modified_routes: Vec::new(),
            all_routes: Vec::new(),
            router_base: String::new(),
            page_analysis: PageLinkAnalysis::default(),
            current_path: current_path.to_string(),
            path_definitions: Vec::new(),
            security_bypass: None,
            error: None,
            analyzed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_names() {
        assert_eq!(Framework::Vue.name(), "Vue.js");
        assert_eq!(Framework::Nuxt.name(), "Nuxt.js");
        assert_eq!(Framework::Quasar.name(), "Quasar");
        assert_eq!(BuildTool::None.label(), "");
        assert_eq!(BuildTool::Vite.label(), "Vite");
    }

    #[test]
    fn test_log_sink_collects_in_order() {
        let sink = LogSink::new();
        sink.log("first");
        sink.warn("second");
        sink.table(vec![serde_json::json!({"path": "/a"})]);

        let entries = sink.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].level, LogLevel::Log);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].level, LogLevel::Warn);
        assert_eq!(entries[2].level, LogLevel::Table);
        assert_eq!(entries[2].rows.as_ref().unwrap().len(), 1);

        // clones share the same buffer
        let clone = sink.clone();
        clone.error("third");
        assert_eq!(sink.len(), 4);
    }
}
