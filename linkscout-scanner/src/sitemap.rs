// Sitemap fetching and <loc> extraction

use crate::classify::{is_same_origin, normalize_url};
use crate::error::Result;
use crate::http::{DEFAULT_FETCH_TIMEOUT, HttpProbe};
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Origin;

/// Maximum number of child sitemaps followed from a sitemap index.
pub const MAX_CHILD_SITEMAPS: usize = 8;

/// The `<loc>` values of one sitemap document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SitemapDocument {
    /// Page URLs from a `<urlset>`.
    pub pages: Vec<String>,
    /// Child sitemap URLs from a `<sitemapindex>`.
    pub sitemaps: Vec<String>,
}

/// Scans the document for `<loc>` text. Prefixed extension tags such as
/// `<image:loc>` or `<video:content_loc>` are not page entries and are
/// skipped. Parsing stops quietly at the first malformed token and keeps
/// whatever was collected before it, so a document without any `<loc>`
/// yields an empty result rather than an error.
pub fn parse_sitemap(xml: &str) -> SitemapDocument {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_loc = false;
    let mut saw_sitemapindex = false;
    let mut seen = HashSet::new();
    let mut locs = Vec::new();

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) => {
                let name = e.name();
                if name.as_ref().ends_with(b"sitemapindex") {
                    saw_sitemapindex = true;
                } else if name.as_ref() == b"loc" {
                    in_loc = true;
                }
            }
            Ok(XmlEvent::End(e)) => {
                if e.name().as_ref() == b"loc" {
                    in_loc = false;
                }
            }
            Ok(XmlEvent::Text(t)) if in_loc => {
                if let Ok(text) = t.unescape() {
                    push_unique(&mut locs, &mut seen, text.trim());
                }
            }
            Ok(XmlEvent::CData(c)) if in_loc => {
                let text = String::from_utf8_lossy(&c);
                push_unique(&mut locs, &mut seen, text.trim());
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => {
                debug!("Stopping sitemap scan at malformed XML: {}", e);
                break;
            }
            _ => {}
        }
    }

    if saw_sitemapindex {
        SitemapDocument {
            pages: Vec::new(),
            sitemaps: locs,
        }
    } else {
        SitemapDocument {
            pages: locs,
            sitemaps: Vec::new(),
        }
    }
}

fn push_unique(locs: &mut Vec<String>, seen: &mut HashSet<String>, loc: &str) {
    if !loc.is_empty() && seen.insert(loc.to_string()) {
        locs.push(loc.to_string());
    }
}

/// Keeps normalized, same-origin URLs in first-seen order.
pub fn filter_same_origin(urls: &[String], origin: &Origin) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter_map(|url| normalize_url(url).ok())
        .filter(|url| is_same_origin(url, origin))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Fetches a sitemap (following a sitemap index one level deep) and returns
/// the deduplicated page URLs that belong to `origin`.
pub async fn fetch_sitemap(probe: &HttpProbe, url: &str, origin: &Origin) -> Result<Vec<String>> {
    let xml = probe.get_text(url, DEFAULT_FETCH_TIMEOUT).await?;
    let document = parse_sitemap(&xml);

    let mut pages = document.pages;
    let children = filter_same_origin(&document.sitemaps, origin);
    if children.len() > MAX_CHILD_SITEMAPS {
        warn!(
            "Sitemap index lists {} sitemaps, only the first {} are loaded",
            children.len(),
            MAX_CHILD_SITEMAPS
        );
    }

    for child in children.into_iter().take(MAX_CHILD_SITEMAPS) {
        match probe.get_text(&child, DEFAULT_FETCH_TIMEOUT).await {
            Ok(child_xml) => pages.extend(parse_sitemap(&child_xml).pages),
            Err(e) => warn!("Failed to load child sitemap {}: {}", child, e),
        }
    }

    Ok(filter_same_origin(&pages, origin))
}
