// Best-effort mining of route-path literals from static content surfaces:
// inline scripts, serialized markup, bundler caches, conventional globals,
// and same-origin external scripts. Regex-based by design; false positives
// and negatives are accepted behavior.
use crate::models::{LogSink, PathDefinition};
use crate::page::{stringify, PageSnapshot, Value};
use fxhash::{FxHashMap, FxHashSet};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

const MAX_HITS_PER_PATTERN: usize = 100;
const MAX_MODULES: usize = 50;
const MAX_EXTERNAL_SCRIPTS: usize = 10;

lazy_static! {
    static ref PATH_PATTERNS: Vec<(Regex, &'static str)> = vec![
        (
            Regex::new(r#"(?i)path\s*:\s*["']([^"']+)["']"#).unwrap(),
            "path:",
        ),
        (
            Regex::new(r#"(?i)["']path["']\s*:\s*["']([^"']+)["']"#).unwrap(),
            "\"path\":",
        ),
        (
            Regex::new(r#"(?i)path\s*=\s*["']([^"']+)["']"#).unwrap(),
            "path=",
        ),
        (
            Regex::new(r#"(?i)route\s*:\s*["']([^"']+)["']"#).unwrap(),
            "route:",
        ),
        (
            Regex::new(r#"(?i)url\s*:\s*["']([^"']+)["']"#).unwrap(),
            "url:",
        ),
    ];
    static ref ASSET_EXT_RE: Regex =
        Regex::new(r"(?i)\.(js|css|png|jpg|gif|svg|ico|woff|ttf)$").unwrap();
    static ref GENERIC_PATH_RE: Regex =
        Regex::new(r"^/[a-zA-Z0-9][a-zA-Z0-9/_.-]*$").unwrap();
    static ref QUOTED_PATH_RE: Regex = Regex::new(r#"["']/[^"']{1,100}["']"#).unwrap();
}

const SEGMENT_KEYWORDS: &[&str] = &[
    "/api", "/admin", "/user", "/system", "/monitor", "/manage", "/dashboard", "/login",
    "/logout", "/home", "/index", "/main", "/page", "/view", "/component", "/module", "/config",
    "/setting", "/profile", "/account",
];

const GLOBAL_VARS: &[&str] = &["$vue", "$app", "app", "router", "routes", "config"];

/// Port for retrieving external script bodies. The HTTP variant bounds each
/// request; the fixed variant backs tests and offline captures.
pub enum ScriptFetcher {
    Disabled,
    Http(reqwest::Client),
    Fixed(FxHashMap<String, String>),
}

impl ScriptFetcher {
    pub fn disabled() -> Self {
        ScriptFetcher::Disabled
    }

    pub fn http(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(ScriptFetcher::Http(
            reqwest::Client::builder().timeout(timeout).build()?,
        ))
    }

    pub fn fixed(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        ScriptFetcher::Fixed(entries.into_iter().collect())
    }

    pub async fn fetch(&self, url: &str) -> Option<String> {
        match self {
            ScriptFetcher::Disabled => None,
            ScriptFetcher::Fixed(map) => map.get(url).cloned(),
            ScriptFetcher::Http(client) => {
                let response = client.get(url).send().await.ok()?;
                if !response.status().is_success() {
                    return None;
                }
                response.text().await.ok()
            }
        }
    }
}

/// First-stage gate applied to every raw pattern capture.
fn accept_candidate(path: &str) -> bool {
    path.starts_with('/')
        && path.len() > 1
        && path.len() < 200
        && !path.contains('<')
        && !path.contains('>')
        && !path.contains("script")
        && !path.contains("style")
        && !path.contains("http")
        && !ASSET_EXT_RE.is_match(path)
}

/// Final acceptance filter applied after deduplication.
fn accept_final(path: &str) -> bool {
    const ASSET_MARKERS: &[&str] = &[
        "favicon",
        "static/css",
        "static/js",
        "assets/",
        "chunk-",
        ".min.",
        "node_modules",
    ];
    path.contains('/')
        && path.len() >= 2
        && path.len() <= 100
        && !ASSET_MARKERS.iter().any(|m| path.contains(m))
        && (GENERIC_PATH_RE.is_match(path)
            || SEGMENT_KEYWORDS.iter().any(|k| path.contains(k)))
}

fn dedup(defs: Vec<PathDefinition>) -> Vec<PathDefinition> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    defs.into_iter()
        .filter(|d| seen.insert(d.path.clone()))
        .collect()
}

pub struct PathMiner<'a> {
    page: &'a PageSnapshot,
    fetcher: &'a ScriptFetcher,
    sink: &'a LogSink,
}

impl<'a> PathMiner<'a> {
    pub fn new(page: &'a PageSnapshot, fetcher: &'a ScriptFetcher, sink: &'a LogSink) -> Self {
        PathMiner {
            page,
            fetcher,
            sink,
        }
    }

    /// Runs every mining stage, then deduplicates (first occurrence wins) and
    /// applies the acceptance filter. An empty outcome triggers diagnostics
    /// which may still recover manually extracted paths.
    pub async fn discover(&self) -> Vec<PathDefinition> {
        let mut acc: Vec<PathDefinition> = Vec::new();

        self.sink.log("starting deep search for path definitions");
        self.scan_scripts(&mut acc);
        self.scan_markup(&mut acc);
        self.scan_webpack(&mut acc);
        self.scan_module_systems(&mut acc);
        self.scan_framework_globals(&mut acc);
        self.fetch_external(&mut acc).await;

        let mut paths = dedup(acc);
        paths.retain(|d| accept_final(&d.path));

        self.sink.log(format!(
            "found {} valid path definitions after filtering",
            paths.len()
        ));
        if paths.is_empty() {
            self.diagnostics(&mut paths);
        } else {
            self.sink.table(
                paths
                    .iter()
                    .filter_map(|d| serde_json::to_value(d).ok())
                    .collect(),
            );
        }
        paths
    }

    fn extract_from_content(&self, content: &str, source: &str, acc: &mut Vec<PathDefinition>) {
        if content.is_empty() {
            return;
        }
        let mut found = 0usize;
        for (pattern, label) in PATH_PATTERNS.iter() {
            let mut hits = 0usize;
            for caps in pattern.captures_iter(content) {
                let path = &caps[1];
                if accept_candidate(path) {
                    acc.push(PathDefinition {
                        path: path.to_string(),
                        source: source.to_string(),
                        pattern: label.to_string(),
                    });
                    found += 1;
                    hits += 1;
                }
                if hits >= MAX_HITS_PER_PATTERN {
                    break;
                }
            }
        }
        if found > 0 {
            self.sink.log(format!("found {} paths in {}", found, source));
        }
    }

    fn scan_scripts(&self, acc: &mut Vec<PathDefinition>) {
        let scripts = self.page.scripts();
        self.sink.log(format!("found {} script tags", scripts.len()));

        let mut inline = 0usize;
        for script in &scripts {
            if script.text.trim().is_empty() {
                continue;
            }
            inline += 1;
            self.sink.log(format!(
                "scanning inline script {}, length {}",
                inline,
                script.text.len()
            ));
            self.extract_from_content(&script.text, &format!("inline script {}", inline), acc);
        }

        // loaded-resource listing from the capture, diagnostic only
        let js_resources: Vec<&String> = self
            .page
            .resources
            .iter()
            .filter(|r| r.contains(".js") && !r.contains("extension"))
            .collect();
        if !js_resources.is_empty() {
            self.sink
                .log(format!("found {} loaded JS resources", js_resources.len()));
            for (i, resource) in js_resources.iter().enumerate() {
                self.sink.log(format!("  {}. {}", i + 1, resource));
            }
        }
    }

    fn scan_markup(&self, acc: &mut Vec<PathDefinition>) {
        let html = self.page.outer_html();
        self.sink
            .log(format!("scanning full page markup, length {}", html.len()));
        self.extract_from_content(&html, "page markup", acc);
    }

    fn scan_webpack(&self, acc: &mut Vec<PathDefinition>) {
        let globals = Value::Object(self.page.globals.clone());
        self.sink.log("checking webpack module system");

        // legacy chunk array
        if let Some(chunks) = globals
            .get_path(&["webpackJsonp"])
            .and_then(|v| v.as_array().cloned())
        {
            self.sink.log("found webpackJsonp");
            for (i, chunk) in chunks.items().iter().enumerate() {
                let payload = match chunk.as_array().and_then(|c| c.get(1)) {
                    Some(p) => p,
                    None => continue,
                };
                if let Ok(text) = stringify(&payload) {
                    self.extract_from_content(&text, &format!("webpack chunk {}", i), acc);
                }
            }
        }

        // legacy module cache
        if let Some(require) = globals
            .get_path(&["__webpack_require__"])
            .filter(Value::is_truthy)
        {
            self.sink.log("found __webpack_require__");
            if let Some(cache) = require
                .get_path(&["cache"])
                .and_then(|v| v.as_object().cloned())
            {
                let mut count = 0usize;
                for id in cache.keys() {
                    if count >= MAX_MODULES {
                        break;
                    }
                    let exports = match cache.get(&id) {
                        Ok(Some(module)) => module.get_path(&["exports"]),
                        Ok(None) => None,
                        Err(e) => {
                            debug!("webpack cache module {} unreadable: {}", id, e);
                            None
                        }
                    };
                    let exports = match exports {
                        Some(e) => e,
                        None => continue,
                    };
                    if let Ok(text) = stringify(&exports) {
                        if text.contains("path") && text.contains('/') {
                            self.extract_from_content(
                                &text,
                                &format!("webpack module {}", id),
                                acc,
                            );
                            count += 1;
                        }
                    }
                }
                self.sink.log(format!("checked {} webpack modules", count));
            }
        }

        // modern module registry
        if let Some(modules) = globals
            .get_path(&["__webpack_modules__"])
            .and_then(|v| v.as_object().cloned())
        {
            self.sink.log("found __webpack_modules__ (webpack 5)");
            let mut count = 0usize;
            for id in modules.keys() {
                if count >= MAX_MODULES {
                    break;
                }
                if let Ok(Some(Value::Function(f))) = modules.get(&id) {
                    if f.source.contains("path") && f.source.contains('/') {
                        self.extract_from_content(
                            &f.source,
                            &format!("webpack5 module {}", id),
                            acc,
                        );
                        count += 1;
                    }
                }
            }
            self.sink.log(format!("checked {} webpack 5 modules", count));
        }
    }

    fn scan_module_systems(&self, acc: &mut Vec<PathDefinition>) {
        let globals = Value::Object(self.page.globals.clone());
        self.sink.log("checking module systems");

        let has_requirejs = matches!(globals.get_path(&["requirejs"]), Some(v) if v.is_truthy())
            || matches!(globals.get_path(&["require"]), Some(v) if v.is_truthy());
        if has_requirejs {
            self.sink.log("found RequireJS");
            if let Some(contexts) = globals
                .get_path(&["require", "s", "contexts"])
                .and_then(|v| v.as_object().cloned())
            {
                for context_name in contexts.keys() {
                    let defined = match contexts.get(&context_name) {
                        Ok(Some(context)) => context
                            .get_path(&["defined"])
                            .and_then(|v| v.as_object().cloned()),
                        _ => None,
                    };
                    let defined = match defined {
                        Some(d) => d,
                        None => continue,
                    };
                    for module_name in defined.keys() {
                        if let Ok(Some(module)) = defined.get(&module_name) {
                            if let Ok(text) = stringify(&module) {
                                if text.contains("path") && text.contains('/') {
                                    self.extract_from_content(
                                        &text,
                                        &format!("requirejs module {}", module_name),
                                        acc,
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }

        if matches!(globals.get_path(&["System"]), Some(v) if v.is_truthy()) {
            self.sink.log("found SystemJS");
        }
    }

    fn scan_framework_globals(&self, acc: &mut Vec<PathDefinition>) {
        let globals = Value::Object(self.page.globals.clone());
        self.sink.log("checking framework globals");

        if let Some(router) = globals.get_path(&["$router"]).filter(Value::is_truthy) {
            self.sink.log("found $router global");
            if let Ok(text) = stringify(&router) {
                self.extract_from_content(&text, "router global", acc);
            }
        }

        if let Some(vue) = globals.get_path(&["__VUE__"]).filter(Value::is_truthy) {
            self.sink.log("found __VUE__ global");
            if let Ok(text) = stringify(&vue) {
                self.extract_from_content(&text, "vue instance global", acc);
            }
        }

        for &name in GLOBAL_VARS {
            let value = match globals.get_path(&[name]) {
                Some(v) if v.as_object().is_some() => v,
                _ => continue,
            };
            // stringification faults (cycles) are silently skipped here
            if let Ok(text) = stringify(&value) {
                if text.contains("path") && text.contains('/') {
                    self.extract_from_content(&text, &format!("global variable {}", name), acc);
                }
            }
        }
    }

    async fn fetch_external(&self, acc: &mut Vec<PathDefinition>) {
        let external: Vec<String> = self
            .page
            .scripts()
            .into_iter()
            .filter_map(|s| s.src)
            .filter(|src| !src.contains("extension"))
            .collect();
        self.sink
            .log(format!("found {} external scripts", external.len()));

        let origin = self.page.origin();
        for src in external.iter().take(MAX_EXTERNAL_SCRIPTS) {
            let name = src.rsplit('/').next().unwrap_or(src);
            if origin.is_empty() || !src.starts_with(&origin) {
                debug!("skipping cross-origin script {}", src);
                continue;
            }
            match self.fetcher.fetch(src).await {
                Some(content) => {
                    self.sink.log(format!(
                        "fetched script {}, length {}",
                        name,
                        content.len()
                    ));
                    self.extract_from_content(&content, &format!("external script {}", name), acc);
                }
                None => {
                    self.sink.log(format!("unable to fetch script {}", name));
                }
            }
        }
    }

    /// Emitted only when the filtered result is empty: keyword counts, raw
    /// samples, and a manual re-extraction pass whose survivors are appended
    /// to the result set.
    fn diagnostics(&self, paths: &mut Vec<PathDefinition>) {
        self.sink.warn("no valid path definitions found");

        let html = self.page.outer_html();
        let keyword_count = html.to_lowercase().matches("path").count();
        self.sink.log(format!(
            "page contains \"path\" keyword {} times",
            keyword_count
        ));

        let samples: Vec<&str> = QUOTED_PATH_RE
            .find_iter(&html)
            .take(20)
            .map(|m| m.as_str())
            .collect();
        if !samples.is_empty() {
            self.sink.log(format!(
                "possible path samples (first 20): {}",
                samples.join(", ")
            ));
        }

        let definitions: Vec<(String, String)> = PATH_PATTERNS[0]
            .0
            .captures_iter(&html)
            .take(10)
            .map(|c| (c[0].to_string(), c[1].to_string()))
            .collect();
        if definitions.is_empty() {
            return;
        }
        self.sink.log(format!(
            "found path: definition samples (first 10): {}",
            definitions
                .iter()
                .map(|(full, _)| full.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        self.sink.log("attempting manual path extraction");
        for (i, (full, path)) in definitions.iter().enumerate() {
            let context: String = full.chars().take(50).collect();
            self.sink
                .log(format!("  {}. {} (from: {})", i + 1, path, context));
            if path.starts_with('/') && path.len() > 1 {
                paths.push(PathDefinition {
                    path: path.clone(),
                    source: "manual extraction".to_string(),
                    pattern: "manual".to_string(),
                });
            }
        }
    }
}
