use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One attribution record: where a URL was found and how it was labelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkReference {
    pub found_on_page: String,
    pub link_text: String,
    pub element_context: String,
}

impl LinkReference {
    pub fn new(
        found_on_page: impl Into<String>,
        link_text: impl Into<String>,
        element_context: impl Into<String>,
    ) -> Self {
        Self {
            found_on_page: found_on_page.into(),
            link_text: link_text.into(),
            element_context: element_context.into(),
        }
    }

    pub fn seed(start_url: &str) -> Self {
        Self::new(start_url, "Start URL", "seed")
    }

    pub fn sitemap(sitemap_url: &str) -> Self {
        Self::new(sitemap_url, "Sitemap entry", "sitemap")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    pub url: String,
    /// `0` when no response was received at all.
    pub status_code: u16,
    pub found_on_page: String,
    pub link_text: String,
    pub element_context: String,
    pub timestamp: DateTime<Utc>,
}

impl BrokenLink {
    pub fn new(url: &str, status_code: u16, reference: &LinkReference) -> Self {
        Self {
            url: url.to_string(),
            status_code,
            found_on_page: reference.found_on_page.clone(),
            link_text: reference.link_text.clone(),
            element_context: reference.element_context.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenImage {
    pub src: String,
    pub found_on_page: String,
    pub alt_text: String,
    pub element_context: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleErrorKind {
    Error,
    Warning,
    JsError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleError {
    pub message: String,
    pub found_on_page: String,
    #[serde(rename = "type")]
    pub kind: ConsoleErrorKind,
    pub timestamp: DateTime<Utc>,
}

/// A single detection produced by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    BrokenLink(BrokenLink),
    BrokenImage(BrokenImage),
    ConsoleError(ConsoleError),
}

impl Finding {
    /// The page the finding is attributed to.
    pub fn page(&self) -> &str {
        match self {
            Finding::BrokenLink(link) => &link.found_on_page,
            Finding::BrokenImage(image) => &image.found_on_page,
            Finding::ConsoleError(error) => &error.found_on_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_link_serializes_camel_case() {
        let reference = LinkReference::new("https://ex.com/", "Missing", "main");
        let link = BrokenLink::new("https://ex.com/missing", 404, &reference);
        let json = serde_json::to_value(&link).unwrap();

        assert_eq!(json["statusCode"], 404);
        assert_eq!(json["foundOnPage"], "https://ex.com/");
        assert_eq!(json["linkText"], "Missing");
        assert_eq!(json["elementContext"], "main");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_console_error_kind_field_is_named_type() {
        let error = ConsoleError {
            message: "Uncaught TypeError".to_string(),
            found_on_page: "https://ex.com/".to_string(),
            kind: ConsoleErrorKind::JsError,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["type"], "js_error");
    }
}
