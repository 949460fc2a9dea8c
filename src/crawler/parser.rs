//! HTML parser for the HTTP extractor
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from <a> tags and canonical links)
//! - Image assets (from <img src>)
//! - Page title and visible text length

use scraper::{Html, Selector};
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Outbound links (absolute URLs)
    pub links: Vec<String>,

    /// Image URLs (absolute)
    pub assets: Vec<String>,

    /// Characters of visible body text, whitespace collapsed
    pub text_length: usize,
}

/// Parses HTML content and extracts links, assets and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - Fragment-only links
///
/// Relative references resolve against `<base href>` when present,
/// otherwise against `base_url`.
///
/// # Example
///
/// ```
/// use sumi_sitecrawl::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base = document_base(&document, base_url);

    ParsedPage {
        title: extract_title(&document),
        links: extract_links(&document, &base),
        assets: extract_assets(&document, &base),
        text_length: visible_text_length(&document),
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn document_base(document: &Html, page_url: &Url) -> Url {
    selector("base[href]")
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone())
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = selector("title")?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Some(a_selector) = selector("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(url) = element.value().attr("href").and_then(|h| resolve_link(h, base_url)) {
                links.push(url);
            }
        }
    }

    if let Some(canonical_selector) = selector("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(url) = element.value().attr("href").and_then(|h| resolve_link(h, base_url)) {
                links.push(url);
            }
        }
    }

    links
}

fn extract_assets(document: &Html, base_url: &Url) -> Vec<String> {
    let Some(img_selector) = selector("img[src]") else {
        return Vec::new();
    };

    let mut assets: Vec<String> = document
        .select(&img_selector)
        .filter_map(|el| el.value().attr("src"))
        .filter_map(|src| resolve_link(src, base_url))
        .collect();
    assets.dedup();
    assets
}

fn visible_text_length(document: &Html) -> usize {
    let Some(body_selector) = selector("body") else {
        return 0;
    };
    let Some(skip_selector) = selector("script, style, noscript") else {
        return 0;
    };

    let Some(body) = document.select(&body_selector).next() else {
        return 0;
    };
    let hidden: usize = body
        .select(&skip_selector)
        .map(|el| collapsed_len(el.text()))
        .sum();
    collapsed_len(body.text()).saturating_sub(hidden)
}

fn collapsed_len<'a>(text: impl Iterator<Item = &'a str>) -> usize {
    text.flat_map(|t| t.split_whitespace())
        .map(|word| word.chars().count())
        .sum()
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None for special schemes, fragment-only links and invalid URLs.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    matches!(absolute_url.scheme(), "http" | "https").then(|| absolute_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn test_extract_title() {
        let html = r#"<html><head><title>  Test Page  </title></head><body></body></html>"#;
        assert_eq!(parse_html(html, &base_url()).title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let html = r#"<html><head></head><body></body></html>"#;
        assert_eq!(parse_html(html, &base_url()).title, None);
    }

    #[test]
    fn test_extract_relative_and_absolute_links() {
        let html = r#"<html><body>
            <a href="https://other.com/page">A</a>
            <a href="/other">B</a>
            <a href="sibling">C</a>
        </body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(
            parsed.links,
            vec![
                "https://other.com/page".to_string(),
                "https://example.com/other".to_string(),
                "https://example.com/sibling".to_string(),
            ]
        );
    }

    #[test]
    fn test_skip_special_links() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">js</a>
            <a href="MAILTO:test@example.com">mail</a>
            <a href="tel:+1234567890">tel</a>
            <a href="data:text/html,hi">data</a>
            <a href="#section">jump</a>
            <a href="/file.pdf" download>dl</a>
            <a href="/valid">ok</a>
        </body></html>"##;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.links, vec!["https://example.com/valid".to_string()]);
    }

    #[test]
    fn test_extract_canonical_link() {
        let html = r#"<html><head><link rel="canonical" href="https://example.com/canonical" /></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert!(parsed.links.contains(&"https://example.com/canonical".to_string()));
    }

    #[test]
    fn test_base_href_changes_resolution() {
        let html = r#"<html><head><base href="https://cdn.example.com/docs/"></head><body><a href="intro">x</a></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(parsed.links, vec!["https://cdn.example.com/docs/intro".to_string()]);
    }

    #[test]
    fn test_extract_assets() {
        let html = r#"<html><body><img src="/logo.png"><img src="data:image/png;base64,AA"><img src="https://img.test/a.jpg"></body></html>"#;
        let parsed = parse_html(html, &base_url());
        assert_eq!(
            parsed.assets,
            vec![
                "https://example.com/logo.png".to_string(),
                "https://img.test/a.jpg".to_string()
            ]
        );
    }

    #[test]
    fn test_visible_text_length_ignores_scripts() {
        let html = r#"<html><body><p>Hello   world</p><script>var x = 1;</script></body></html>"#;
        assert_eq!(parse_html(html, &base_url()).text_length, 10);
    }
}
