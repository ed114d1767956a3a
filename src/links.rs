// Common-prefix heuristic over the page's internal anchor links
use crate::models::{PageLinkAnalysis, PrefixCount};
use crate::page::PageSnapshot;

/// Internal navigation candidates: root-relative hrefs that are not
/// protocol-relative and carry no file extension.
pub fn collect_route_links(page: &PageSnapshot) -> Vec<String> {
    page.anchor_hrefs()
        .into_iter()
        .filter(|href| href.starts_with('/') && !href.starts_with("//") && !href.contains('.'))
        .collect()
}

/// Tallies the first path segment of every internal link; when one segment
/// dominates (>60% of links) it is reported as the detected base path. Fewer
/// than three links is too little signal to call.
pub fn analyze_page_links(page: &PageSnapshot) -> PageLinkAnalysis {
    let mut result = PageLinkAnalysis::default();

    let links = collect_route_links(page);
    if links.len() < 3 {
        return result;
    }

    let mut first_segments: Vec<(String, usize)> = Vec::new();
    for link in &links {
        if let Some(first) = link.split('/').find(|s| !s.is_empty()) {
            match first_segments.iter_mut().find(|(s, _)| s == first) {
                Some((_, count)) => *count += 1,
                None => first_segments.push((first.to_string(), 1)),
            }
        }
    }

    first_segments.sort_by(|a, b| b.1.cmp(&a.1));
    result.common_prefixes = first_segments
        .iter()
        .map(|(prefix, count)| PrefixCount {
            prefix: prefix.clone(),
            count: *count,
        })
        .collect();

    if let Some(top) = result.common_prefixes.first() {
        if top.count as f64 / links.len() as f64 > 0.6 {
            result.detected_base_path = format!("/{}", top.prefix);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{NodeRef, ObjectRef};

    fn page_with_links(hrefs: &[&str]) -> PageSnapshot {
        let anchors = hrefs
            .iter()
            .map(|h| {
                NodeRef::build(
                    "a",
                    vec![("href".to_string(), h.to_string())],
                    ObjectRef::new(),
                    vec![],
                )
            })
            .collect();
        let body = NodeRef::build("body", vec![], ObjectRef::new(), anchors);
        PageSnapshot::new("https://x.test/", body)
    }

    #[test]
    fn test_link_filtering() {
        let page = page_with_links(&[
            "/admin/users",
            "//cdn.x.test/lib",
            "/app.js",
            "https://x.test/out",
            "/admin/roles",
        ]);
        assert_eq!(collect_route_links(&page), vec!["/admin/users", "/admin/roles"]);
    }

    #[test]
    fn test_dominant_prefix_becomes_base_path() {
        let page = page_with_links(&[
            "/console/users",
            "/console/roles",
            "/console/audit",
            "/help",
        ]);
        let analysis = analyze_page_links(&page);
        assert_eq!(analysis.detected_base_path, "/console");
        assert_eq!(analysis.common_prefixes[0].prefix, "console");
        assert_eq!(analysis.common_prefixes[0].count, 3);
    }

    #[test]
    fn test_no_dominant_prefix() {
        let page = page_with_links(&["/a/x", "/b/y", "/c/z"]);
        let analysis = analyze_page_links(&page);
        assert_eq!(analysis.detected_base_path, "");
        assert_eq!(analysis.common_prefixes.len(), 3);
    }

    #[test]
    fn test_too_few_links_yields_default() {
        let page = page_with_links(&["/admin/a", "/admin/b"]);
        let analysis = analyze_page_links(&page);
        assert_eq!(analysis.detected_base_path, "");
        assert!(analysis.common_prefixes.is_empty());
    }
}
