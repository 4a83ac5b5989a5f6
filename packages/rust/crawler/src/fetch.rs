//! Single-page fetching and HTML content extraction.
//!
//! Used by the crawl engine for frontier pages and by tier processors that
//! retrieve a fixed set of source pages (professional profiles, news).

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use firmfacts_shared::{CrawledPage, FirmfactsError, Result};

/// Fetch one page and extract its plain text. Non-2xx statuses and
/// non-HTML content types are errors; the caller decides whether they are
/// fatal.
pub async fn fetch_page(client: &Client, url: &Url) -> Result<CrawledPage> {
    debug!(%url, "fetching page");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| FirmfactsError::crawl(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FirmfactsError::crawl(format!("{url}: HTTP {status}")));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    if let Some(ct) = &content_type {
        if !ct.contains("text/html") && !ct.contains("text/plain") {
            return Err(FirmfactsError::crawl(format!(
                "{url}: unsupported content type {ct}"
            )));
        }
    }

    let body = response
        .text()
        .await
        .map_err(|e| FirmfactsError::crawl(format!("{url}: body read failed: {e}")))?;

    let text = html_to_text(&body);
    let title = extract_title(&body);

    Ok(CrawledPage {
        url: url.to_string(),
        title,
        html: body,
        word_count: text.split_whitespace().count() as u64,
        text,
        status_code: status.as_u16(),
        content_type,
        fetched_at: Utc::now(),
    })
}

/// Extract the page title: `<title>` preferred, first `<h1>` as fallback.
pub fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    for sel in ["title", "h1"] {
        let selector = Selector::parse(sel).expect("valid selector");
        if let Some(el) = doc.select(&selector).next() {
            let text = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Convert an HTML body to plain text. Script and style blocks are removed
/// before parsing so their contents never reach extraction.
pub fn html_to_text(html: &str) -> String {
    static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
            .expect("valid regex")
    });

    let stripped = SCRIPT_RE.replace_all(html, " ");
    let doc = Html::parse_document(&stripped);

    let body_sel = Selector::parse("body").expect("valid selector");
    let text: String = match doc.select(&body_sel).next() {
        Some(body) => body.text().collect::<Vec<_>>().join(" "),
        None => doc.root_element().text().collect::<Vec<_>>().join(" "),
    };

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract `(resolved_url, anchor_text)` pairs from a document, skipping
/// anchors, javascript:, and mailto: links. Fragments are stripped.
pub fn extract_links(html: &str, base_url: &Url) -> Vec<(String, String)> {
    let doc = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").expect("valid selector");
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            if href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
            {
                continue;
            }

            if let Ok(mut resolved) = base_url.join(href) {
                resolved.set_fragment(None);
                let anchor = el.text().collect::<String>().trim().to_string();
                links.push((resolved.to_string(), anchor));
            }
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_drops_scripts_and_styles() {
        let html = r#"<html><head><style>body { color: red; }</style></head>
            <body><h1>Acme</h1><script>var x = 1;</script><p>We build rockets.</p></body></html>"#;
        let text = html_to_text(html);
        assert!(text.contains("Acme"));
        assert!(text.contains("We build rockets."));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn title_prefers_title_tag() {
        let html = "<html><head><title>Acme Corp</title></head><body><h1>Welcome</h1></body></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Acme Corp"));

        let no_title = "<html><body><h1>Welcome</h1></body></html>";
        assert_eq!(extract_title(no_title).as_deref(), Some("Welcome"));
    }

    #[test]
    fn extract_links_resolves_and_filters() {
        let html = r##"<html><body>
            <a href="/about">About Us</a>
            <a href="https://other.com/page">External</a>
            <a href="#section">Anchor</a>
            <a href="mailto:hi@acme.com">Mail</a>
            <a href="products.html">Products</a>
        </body></html>"##;

        let base = Url::parse("https://acme.com/index.html").unwrap();
        let links = extract_links(html, &base);

        let urls: Vec<&str> = links.iter().map(|(u, _)| u.as_str()).collect();
        assert!(urls.contains(&"https://acme.com/about"));
        assert!(urls.contains(&"https://other.com/page"));
        assert!(urls.contains(&"https://acme.com/products.html"));
        assert!(!urls.iter().any(|u| u.contains('#')));
        assert!(!urls.iter().any(|u| u.starts_with("mailto")));

        let about = links.iter().find(|(u, _)| u.ends_with("/about")).unwrap();
        assert_eq!(about.1, "About Us");
    }
}
