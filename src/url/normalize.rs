use url::Url;

/// Query parameters that only carry tracking state and never change the page
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Resolves an `href` found on `base` into a normalized absolute link
///
/// Returns None if the link should be excluded:
/// - empty or fragment-only hrefs (same-page anchors)
/// - javascript:, mailto:, tel: schemes and data: URIs
/// - hrefs that fail to resolve
/// - anything that is not HTTP(S) after resolution
///
/// # Examples
///
/// ```
/// use scrape_pool::url::resolve_link;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/docs/").unwrap();
/// assert_eq!(
///     resolve_link(&base, "intro#top"),
///     Some("https://example.com/docs/intro".to_string())
/// );
/// assert_eq!(resolve_link(&base, "mailto:me@example.com"), None);
/// ```
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }

    Some(normalize_link(absolute))
}

/// Normalizes an absolute URL into its canonical link spelling
///
/// # Normalization Steps
///
/// 1. Drop the fragment
/// 2. Lowercase the host (the `url` crate already does this for special schemes)
/// 3. Remove `utm_*` and other tracking query parameters
/// 4. Remove an empty query string
///
/// Scheme and path are kept as-is; the crawler does not assume `http` and `https`
/// serve the same document.
pub fn normalize_link(mut url: Url) -> String {
    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    url.to_string()
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
