use crate::url::matcher::matches_glob;
use crate::UrlError;
use url::Url;

/// Query parameter patterns removed by default during normalization
pub const DEFAULT_IGNORED_PARAMS: &[&str] = &["utm_*", "fbclid", "gclid", "mc_eid"];

/// Canonicalizes URLs for identity and deduplication
///
/// A `Normalizer` carries the set of query parameter patterns to strip. It is
/// a pure function of its input: the same raw URL and base always produce the
/// same canonical URL, and normalizing a canonical URL returns it unchanged.
#[derive(Debug, Clone)]
pub struct Normalizer {
    ignored_params: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_PARAMS.iter().map(|p| p.to_string()))
    }
}

impl Normalizer {
    /// Creates a normalizer that strips query keys matching any of `ignored_params`
    ///
    /// Patterns may contain `*` wildcards (e.g. `utm_*`).
    pub fn new<I, S>(ignored_params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored_params: ignored_params.into_iter().map(Into::into).collect(),
        }
    }

    /// Normalizes a URL according to the crawl identity rules
    ///
    /// # Normalization Steps
    ///
    /// 1. Resolve `raw` against `base` (if given) and parse; reject if malformed
    /// 2. Reject anything other than `http`/`https`
    /// 3. Lowercase the scheme and host, drop default ports
    /// 4. Normalize path:
    ///    - Remove dot segments and repeated slashes
    ///    - Remove trailing slash (except for root)
    ///    - Empty path becomes /
    /// 5. Remove fragment
    /// 6. Remove ignored query parameters
    /// 7. Sort remaining query parameters by key, then value
    /// 8. Remove empty query string
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_sitecrawl::url::Normalizer;
    ///
    /// let normalizer = Normalizer::default();
    /// let url = normalizer.normalize("HTTP://Example.COM:80/a/../b/?utm_source=x#top", None).unwrap();
    /// assert_eq!(url.as_str(), "http://example.com/b");
    /// ```
    pub fn normalize(&self, raw: &str, base: Option<&Url>) -> Result<Url, UrlError> {
        let raw = raw.trim();

        // Step 1: Resolve and parse
        let mut url = match base {
            Some(base) => base.join(raw),
            None => Url::parse(raw),
        }
        .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

        // Step 2: Validate scheme
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UrlError::InvalidScheme(format!(
                "Only HTTP and HTTPS schemes are crawlable, got: {}",
                url.scheme()
            )));
        }

        // Step 3: Lowercase host. The url crate already lowercases the scheme
        // and elides the scheme's default port while parsing.
        match url.host_str() {
            Some(host) if !host.is_empty() => {
                let lowered = host.to_lowercase();
                if lowered != host {
                    url.set_host(Some(&lowered))
                        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
                }
            }
            _ => return Err(UrlError::MissingHost),
        }

        // Step 4: Normalize path
        let normalized_path = normalize_path(url.path());
        url.set_path(&normalized_path);

        // Step 5: Remove fragment
        url.set_fragment(None);

        // Steps 6-8: Filter and sort query parameters
        if url.query().is_some() {
            let params = self.filter_and_sort_query_params(&url);
            if params.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(params);
            }
        }

        Ok(url)
    }

    /// Returns true if a query key should be stripped
    pub fn is_ignored_param(&self, key: &str) -> bool {
        self.ignored_params
            .iter()
            .any(|pattern| matches_glob(pattern, key))
    }

    fn filter_and_sort_query_params(&self, url: &Url) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !self.is_ignored_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        params.sort();
        params
    }
}

/// Normalizes a URL with the default ignored query parameters
///
/// # Examples
///
/// ```
/// use sumi_sitecrawl::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.com/page/?b=2&a=1", None).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page?a=1&b=2");
/// ```
pub fn normalize_url(raw: &str, base: Option<&Url>) -> Result<Url, UrlError> {
    Normalizer::default().normalize(raw, base)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: &str) -> Url {
        normalize_url(raw, None).unwrap()
    }

    #[test]
    fn test_lowercase_scheme_and_host() {
        assert_eq!(
            normalize("HTTPS://EXAMPLE.COM/Page").as_str(),
            "https://example.com/Page"
        );
    }

    #[test]
    fn test_strip_default_ports() {
        assert_eq!(normalize("http://example.com:80/a").as_str(), "http://example.com/a");
        assert_eq!(normalize("https://example.com:443/a").as_str(), "https://example.com/a");
        assert_eq!(
            normalize("https://example.com:8443/a").as_str(),
            "https://example.com:8443/a"
        );
    }

    #[test]
    fn test_empty_path_and_root_are_identical() {
        assert_eq!(normalize("https://example.com"), normalize("https://example.com/"));
        assert_eq!(normalize("https://example.com").as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_trailing_slash() {
        assert_eq!(normalize("https://example.com/page/").as_str(), "https://example.com/page");
    }

    #[test]
    fn test_remove_fragment() {
        assert_eq!(
            normalize("https://example.com/page#section").as_str(),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_remove_tracking_params() {
        assert_eq!(
            normalize("https://example.com/page?utm_source=a&fbclid=b&gclid=c&utm_custom=d").as_str(),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_sort_query_params() {
        assert_eq!(
            normalize("https://example.com/page?b=2&a=1&a=0").as_str(),
            "https://example.com/page?a=0&a=1&b=2"
        );
    }

    #[test]
    fn test_mixed_query_params() {
        assert_eq!(
            normalize("https://example.com/page?keep=yes&utm_medium=email&another=value").as_str(),
            "https://example.com/page?another=value&keep=yes"
        );
    }

    #[test]
    fn test_dot_segments_and_multiple_slashes() {
        assert_eq!(
            normalize("https://example.com///a/../b/./c//d").as_str(),
            "https://example.com/b/c/d"
        );
        assert_eq!(normalize("https://example.com/../page").as_str(), "https://example.com/page");
    }

    #[test]
    fn test_resolve_relative_against_base() {
        let base = Url::parse("https://site.test/docs/intro").unwrap();
        let n = Normalizer::default();
        assert_eq!(
            n.normalize("guide", Some(&base)).unwrap().as_str(),
            "https://site.test/docs/guide"
        );
        assert_eq!(n.normalize("/a", Some(&base)).unwrap().as_str(), "https://site.test/a");
        assert_eq!(
            n.normalize("//other.test/x/", Some(&base)).unwrap().as_str(),
            "https://other.test/x"
        );
        assert_eq!(
            n.normalize("#frag", Some(&base)).unwrap().as_str(),
            "https://site.test/docs/intro"
        );
    }

    #[test]
    fn test_invalid_scheme() {
        assert!(matches!(
            normalize_url("ftp://example.com/page", None),
            Err(UrlError::InvalidScheme(_))
        ));
        let base = Url::parse("https://site.test/").unwrap();
        assert!(matches!(
            normalize_url("mailto:someone@site.test", Some(&base)),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(matches!(
            normalize_url("javascript:void(0)", Some(&base)),
            Err(UrlError::InvalidScheme(_))
        ));
    }

    #[test]
    fn test_malformed_url() {
        assert!(matches!(normalize_url("not a url", None), Err(UrlError::Parse(_))));
        assert!(normalize_url("http://", None).is_err());
    }

    #[test]
    fn test_custom_ignored_params() {
        let n = Normalizer::new(["session*", "ref"]);
        assert_eq!(
            n.normalize("https://example.com/?sessionid=1&ref=x&utm_source=y", None)
                .unwrap()
                .as_str(),
            "https://example.com/?utm_source=y"
        );
    }

    #[test]
    fn test_encoded_query_values_survive() {
        let url = normalize("https://example.com/search?q=a%26b+c");
        assert_eq!(url.query_pairs().next().unwrap().1, "a&b c");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let inputs = [
            "HTTP://Example.COM:80/a/../b/?utm_source=x&z=1&a=2#frag",
            "https://example.com",
            "https://example.com/search?q=a%26b+c&empty=",
            "https://example.com//x//y/",
            "https://example.com/%7Euser/index.html?b=%20&a",
            "http://[::1]:8080/path/",
        ];
        for raw in inputs {
            let once = normalize(raw);
            let twice = normalize(once.as_str());
            assert_eq!(once, twice, "normalization not idempotent for {}", raw);
        }
    }
}
