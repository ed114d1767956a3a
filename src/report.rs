// Rendering of analysis results: terminal summary, markdown, and JSON
use crate::models::{AnalysisResult, LogLevel};
use crate::sanitizer;
use anyhow::{bail, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use std::fs;
use std::path::Path;

pub struct ReportGenerator {
    format: String,
}

impl ReportGenerator {
    pub fn new(format: &str) -> Self {
        ReportGenerator {
            format: format.to_lowercase(),
        }
    }

    pub fn generate(&self, result: &AnalysisResult) -> Result<String> {
        match self.format.as_str() {
            "text" => Ok(render_text(result)),
            "markdown" | "md" => Ok(render_markdown(result)),
            "json" => Ok(serde_json::to_string_pretty(&sanitizer::sanitize_result(
                result,
            ))?),
            other => bail!("unsupported report format: {}", other),
        }
    }

    pub fn write_to_file(&self, report: &str, path: &Path) -> Result<()> {
        fs::write(path, report)?;
        Ok(())
    }
}

fn route_table(result: &AnalysisResult) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Path", "Name", "Component", "Params", "Auth", "Roles", "Meta"]);
    for route in &result.all_routes {
        let meta = route
            .meta
            .as_ref()
            .map(|m| sanitizer::sanitize_value(m).to_string())
            .unwrap_or_default();
        table.add_row(vec![
            route.path.clone(),
            route.name.clone(),
            route.component.clone(),
            route.analysis.parameters.join(", "),
            if route.requires_auth { "yes" } else { "" }.to_string(),
            route.roles.join(", "),
            meta,
        ]);
    }
    table
}

fn path_table(result: &AnalysisResult) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Path", "Source", "Pattern"]);
    for def in &result.path_definitions {
        table.add_row(vec![
            def.path.clone(),
            def.source.clone(),
            def.pattern.clone(),
        ]);
    }
    table
}

/// Colored terminal summary, the interactive analog of the report formats.
pub fn print_summary(result: &AnalysisResult) {
    if !result.vue_detected {
        println!("{}", "No Vue.js application detected".red().bold());
        return;
    }

    let mut headline = format!("{} {}", result.framework.name(), result.vue_version);
    if !result.build_tool.label().is_empty() {
        headline.push_str(&format!(" via {}", result.build_tool.label()));
    }
    println!("{} {}", "detected:".green().bold(), headline);

    if !result.router_detected {
        println!("{}", "No router instance located".yellow());
        return;
    }

    if !result.router_base.is_empty() {
        println!("router base: {}", result.router_base);
    }
    if !result.page_analysis.detected_base_path.is_empty() {
        println!(
            "base path from links: {}",
            result.page_analysis.detected_base_path
        );
    }
    println!("current path: {}", result.current_path);

    if let Some(bypass) = &result.security_bypass {
        let mut cleared = Vec::new();
        if bypass.router_guards_cleared {
            cleared.push("guards");
        }
        if bypass.tokens_bypass || bypass.session_bypass {
            cleared.push("tokens");
        }
        if bypass.permissions_bypass {
            cleared.push("permissions");
        }
        if bypass.cookies_bypass {
            cleared.push("cookies");
        }
        if !cleared.is_empty() {
            println!("{} {}", "bypassed:".yellow().bold(), cleared.join(", "));
        }
    }

    println!(
        "\n{} ({} modified)",
        format!("{} routes", result.all_routes.len()).bold(),
        result.modified_routes.len()
    );
    if !result.all_routes.is_empty() {
        println!("{}", route_table(result));
    }

    println!("\n{}", format!("{} mined paths", result.path_definitions.len()).bold());
    if !result.path_definitions.is_empty() {
        println!("{}", path_table(result));
    }
}

fn render_text(result: &AnalysisResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Vue detected: {}\nRouter detected: {}\n",
        result.vue_detected, result.router_detected
    ));
    out.push_str(&format!(
        "Framework: {} {}\n",
        result.framework.name(),
        result.vue_version
    ));
    if !result.build_tool.label().is_empty() {
        out.push_str(&format!("Build tool: {}\n", result.build_tool.label()));
    }
    out.push_str(&format!("Current path: {}\n", result.current_path));
    if !result.router_base.is_empty() {
        out.push_str(&format!("Router base: {}\n", result.router_base));
    }
    out.push_str(&format!("\nRoutes ({}):\n", result.all_routes.len()));
    for route in &result.all_routes {
        out.push_str(&format!(
            "  {}  name={} component={}\n",
            route.path, route.name, route.component
        ));
        for example in &route.analysis.examples {
            out.push_str(&format!("    example: {}\n", example));
        }
    }
    out.push_str(&format!(
        "\nModified auth meta ({}):\n",
        result.modified_routes.len()
    ));
    for m in &result.modified_routes {
        out.push_str(&format!("  {}  {}\n", m.path, m.name));
    }
    out.push_str(&format!(
        "\nMined path definitions ({}):\n",
        result.path_definitions.len()
    ));
    for def in &result.path_definitions {
        out.push_str(&format!("  {}  [{} / {}]\n", def.path, def.source, def.pattern));
    }
    if let Some(error) = &result.error {
        out.push_str(&format!("\nError: {}\n", error));
    }
    out
}

fn render_markdown(result: &AnalysisResult) -> String {
    let mut out = String::new();
    out.push_str("# Route analysis report\n\n");
    out.push_str(&format!(
        "- Analyzed at: {}\n- Vue detected: {}\n- Router detected: {}\n- Framework: {} {}\n",
        result.analyzed_at.to_rfc3339(),
        result.vue_detected,
        result.router_detected,
        result.framework.name(),
        result.vue_version,
    ));
    if !result.build_tool.label().is_empty() {
        out.push_str(&format!("- Build tool: {}\n", result.build_tool.label()));
    }
    out.push_str(&format!("- Current path: {}\n", result.current_path));
    if !result.router_base.is_empty() {
        out.push_str(&format!("- Router base: {}\n", result.router_base));
    }
    if !result.page_analysis.detected_base_path.is_empty() {
        out.push_str(&format!(
            "- Base path from links: {}\n",
            result.page_analysis.detected_base_path
        ));
    }

    out.push_str(&format!("\n## Routes ({})\n\n", result.all_routes.len()));
    if !result.all_routes.is_empty() {
        out.push_str("| Path | Name | Component | Params | Auth | Roles |\n");
        out.push_str("|------|------|-----------|--------|------|-------|\n");
        for route in &result.all_routes {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                route.path,
                route.name,
                route.component,
                route.analysis.parameters.join(", "),
                if route.requires_auth { "yes" } else { "" },
                route.roles.join(", "),
            ));
        }
    }

    out.push_str(&format!(
        "\n## Modified auth meta ({})\n\n",
        result.modified_routes.len()
    ));
    for m in &result.modified_routes {
        out.push_str(&format!("- `{}` {}\n", m.path, m.name));
    }

    out.push_str(&format!(
        "\n## Mined path definitions ({})\n\n",
        result.path_definitions.len()
    ));
    if !result.path_definitions.is_empty() {
        out.push_str("| Path | Source | Pattern |\n|------|--------|--------|\n");
        for def in &result.path_definitions {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                def.path, def.source, def.pattern
            ));
        }
    }

    if let Some(bypass) = &result.security_bypass {
        out.push_str("\n## Security bypass\n\n");
        out.push_str(&format!(
            "- Router guards cleared: {}\n- Tokens seeded: {}\n- Session tokens seeded: {}\n- Permissions flipped: {}\n- Cookies planted: {}\n",
            bypass.router_guards_cleared,
            bypass.tokens_bypass,
            bypass.session_bypass,
            bypass.permissions_bypass,
            bypass.cookies_bypass,
        ));
    }

    out.push_str(&format!("\n## Captured log ({})\n\n", result.logs.len()));
    for entry in &result.logs {
        match entry.level {
            LogLevel::Table => {
                let rows = entry.rows.as_ref().map(Vec::len).unwrap_or(0);
                out.push_str(&format!("- [table] {} rows\n", rows));
            }
            level => {
                let tag = match level {
                    LogLevel::Warn => "warn",
                    LogLevel::Error => "error",
                    _ => "log",
                };
                out.push_str(&format!("- [{}] {}\n", tag, entry.message));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModifiedRoute, PathDefinition, RouteRecord};
    use crate::routes::analyze_route_parameters;

    fn sample_result() -> AnalysisResult {
        let mut result = AnalysisResult::empty("/dashboard");
        result.vue_detected = true;
        result.router_detected = true;
        result.vue_version = "2.6.14".to_string();
        result.all_routes.push(RouteRecord {
            name: "user-detail".to_string(),
            path: "/user/:id/detail".to_string(),
            meta: None,
            component: "UserDetail".to_string(),
            analysis: analyze_route_parameters("/user/:id/detail"),
            has_before_enter: true,
            requires_auth: true,
            roles: vec!["admin".to_string()],
        });
        result.modified_routes.push(ModifiedRoute {
            path: "/user/:id/detail".to_string(),
            name: "user-detail".to_string(),
        });
        result.path_definitions.push(PathDefinition {
            path: "/api/users".to_string(),
            source: "inline script 1".to_string(),
            pattern: "url:".to_string(),
        });
        result
    }

    #[test]
    fn test_markdown_report() {
        let report = ReportGenerator::new("markdown")
            .generate(&sample_result())
            .unwrap();
        assert!(report.contains("# Route analysis report"));
        assert!(report.contains("| /user/:id/detail | user-detail | UserDetail | id | yes | admin |"));
        assert!(report.contains("| /api/users | inline script 1 | url: |"));
    }

    #[test]
    fn test_text_report_includes_examples() {
        let report = ReportGenerator::new("text")
            .generate(&sample_result())
            .unwrap();
        assert!(report.contains("example: /user/123/detail"));
        assert!(report.contains("Mined path definitions (1):"));
    }

    #[test]
    fn test_json_report_is_sanitized_payload() {
        let report = ReportGenerator::new("json")
            .generate(&sample_result())
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(parsed["routerDetected"], true);
        assert_eq!(parsed["allRoutes"][0]["path"], "/user/:id/detail");
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(ReportGenerator::new("csv").generate(&sample_result()).is_err());
    }
}
