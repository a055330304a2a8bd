//! SumUp cursor pagination via the `links` array in each history page.
//!
//! Each page body carries relative link objects:
//!
//! ```text
//! { "items": [...],
//!   "links": [ { "rel": "next", "href": "?order=ascending&oldest_ref=REF" } ] }
//! ```
//!
//! The `next` link's href is resolved against the history endpoint URL to
//! form the next page request. No `next` link means the last page.

/// Extracts the `next` href from a page's `links`, if any.
#[must_use]
pub(super) fn next_href(links: &[super::types::SumUpLink]) -> Option<&str> {
    links
        .iter()
        .find(|l| l.rel == "next")
        .map(|l| l.href.as_str())
        .filter(|href| !href.is_empty())
}

/// Resolves a (possibly relative) `next` href against the endpoint URL.
///
/// SumUp sends query-only hrefs (`?oldest_ref=...`); absolute URLs are
/// passed through untouched.
#[must_use]
pub(super) fn resolve_next_url(endpoint: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_owned();
    }
    let base = endpoint.split('?').next().unwrap_or(endpoint);
    if let Some(query) = href.strip_prefix('?') {
        return format!("{base}?{query}");
    }
    format!("{}/{}", base.trim_end_matches('/'), href.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::super::types::SumUpLink;
    use super::*;

    fn link(rel: &str, href: &str) -> SumUpLink {
        SumUpLink {
            rel: rel.to_owned(),
            href: href.to_owned(),
        }
    }

    #[test]
    fn no_links_means_last_page() {
        assert!(next_href(&[]).is_none());
    }

    #[test]
    fn only_prev_link_means_last_page() {
        let links = vec![link("prev", "?oldest_ref=ABC")];
        assert!(next_href(&links).is_none());
    }

    #[test]
    fn finds_next_among_multiple_links() {
        let links = vec![
            link("prev", "?oldest_ref=PREV"),
            link("next", "?order=ascending&oldest_ref=NEXT"),
        ];
        assert_eq!(next_href(&links), Some("?order=ascending&oldest_ref=NEXT"));
    }

    #[test]
    fn empty_next_href_is_ignored() {
        let links = vec![link("next", "")];
        assert!(next_href(&links).is_none());
    }

    #[test]
    fn resolves_query_only_href_against_endpoint() {
        let url = resolve_next_url(
            "https://api.sumup.example/v0.1/me/transactions/history?limit=100",
            "?oldest_ref=XYZ",
        );
        assert_eq!(
            url,
            "https://api.sumup.example/v0.1/me/transactions/history?oldest_ref=XYZ"
        );
    }

    #[test]
    fn passes_absolute_href_through() {
        let url = resolve_next_url(
            "https://api.sumup.example/v0.1/me/transactions/history",
            "https://api.sumup.example/v0.1/me/transactions/history?oldest_ref=A",
        );
        assert_eq!(
            url,
            "https://api.sumup.example/v0.1/me/transactions/history?oldest_ref=A"
        );
    }

    #[test]
    fn joins_path_href_with_slash() {
        let url = resolve_next_url("https://api.sumup.example/v0.1", "history?oldest_ref=B");
        assert_eq!(url, "https://api.sumup.example/v0.1/history?oldest_ref=B");
    }
}
