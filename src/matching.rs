use crate::models::TrackedSite;

fn is_separator(c: char) -> bool {
    matches!(c, ',' | ';' | '，' | '；') || c.is_whitespace()
}

/// Splits a site's `url` field into its non-empty match patterns.
pub fn url_patterns(site_urls: &str) -> impl Iterator<Item = &str> {
    site_urls
        .split(is_separator)
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
}

pub fn matches_any_url(address: &str, site_urls: &str) -> bool {
    url_patterns(site_urls).any(|pattern| address.contains(pattern))
}

/// First enabled site, in list order, whose patterns match `address`.
pub fn find_matching_site<'a>(sites: &'a [TrackedSite], address: &str) -> Option<&'a TrackedSite> {
    sites
        .iter()
        .find(|site| site.enabled && matches_any_url(address, &site.url))
}
