use url::{Host, Url};

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_sitecrawl::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the `host[:port]` authority used to key per-host state
///
/// Robots records and rate buckets are keyed on this value so that two
/// servers on different ports of one host are treated independently.
pub fn host_key(url: &Url) -> Option<String> {
    let host = extract_host(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Computes the registrable domain (eTLD+1) of a URL's host
///
/// Uses the public suffix list, so `blog.example.co.uk` yields
/// `example.co.uk`. IP addresses and single-label hosts such as `localhost`
/// have no registrable domain and are returned as-is.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_sitecrawl::url::registrable_domain;
///
/// let url = Url::parse("https://docs.example.co.uk/").unwrap();
/// assert_eq!(registrable_domain(&url), Some("example.co.uk".to_string()));
/// ```
pub fn registrable_domain(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) => {
            let lower = domain.to_lowercase();
            let registrable = psl::domain(lower.as_bytes())
                .map(|d| String::from_utf8_lossy(d.as_bytes()).into_owned());
            Some(registrable.unwrap_or(lower))
        }
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(format!("[{}]", ip)),
    }
}
