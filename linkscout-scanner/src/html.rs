// Link extraction from rendered markup

use crate::browser::ExtractedLink;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Landmarks reported as a link's DOM region, innermost wins.
const REGIONS: &[&str] = &["nav", "header", "footer", "aside", "main", "article", "section"];

/// Extracts every `<a href>` from `html`, resolved against `page_url`.
///
/// Fragment-only, `javascript:`, `mailto:`, `tel:` and `data:` links are
/// skipped. Identical `(href, text)` pairs are reported once.
pub fn extract_links(html: &str, page_url: &str) -> Vec<ExtractedLink> {
    let document = Html::parse_document(html);
    let Ok(link_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&link_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(absolute_url) = resolve_url(page_url, href) else {
            continue;
        };

        let text = link_text(&element);
        if seen.insert((absolute_url.clone(), text.clone())) {
            links.push(ExtractedLink {
                href: absolute_url,
                text,
                context: element_context(&element),
            });
        }
    }

    links
}

pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    let lowered = href.to_ascii_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let base_url = Url::parse(base).ok()?;
    let mut url = base_url.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);

    Some(url.to_string())
}

fn link_text(element: &ElementRef) -> String {
    let text = element
        .text()
        .flat_map(|chunk| chunk.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");
    if !text.is_empty() {
        return text;
    }

    let value = element.value();
    for attr in ["aria-label", "title"] {
        if let Some(label) = value.attr(attr).map(str::trim)
            && !label.is_empty()
        {
            return label.to_string();
        }
    }

    // Image-only links
    if let Ok(img_selector) = Selector::parse("img[alt]")
        && let Some(alt) = element
            .select(&img_selector)
            .filter_map(|img| img.value().attr("alt"))
            .map(str::trim)
            .find(|alt| !alt.is_empty())
    {
        return alt.to_string();
    }

    "[no text]".to_string()
}

fn element_context(element: &ElementRef) -> String {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find_map(|ancestor| {
            let name = ancestor.value().name();
            REGIONS.contains(&name).then(|| name.to_string())
        })
        .unwrap_or_else(|| "body".to_string())
}
