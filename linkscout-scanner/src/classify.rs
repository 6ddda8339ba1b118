// Resource classification and the deny-lists that drive it

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::{Origin, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Page,
    Image,
    Document,
    Other,
}

/// Extension lists, noise patterns and hostile domains used by the classifier.
///
/// Every list can be overridden from a JSON file; fields that are absent keep
/// their built-in values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionRules {
    pub non_page_extensions: Vec<String>,
    pub image_extensions: Vec<String>,
    pub document_extensions: Vec<String>,
    pub page_extensions: Vec<String>,
    pub noise_patterns: Vec<String>,
    pub hostile_domains: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for DetectionRules {
    fn default() -> Self {
        Self {
            non_page_extensions: strings(&[
                // documents
                "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "rtf",
                "txt", "csv", "epub",
                // archives
                "zip", "rar", "7z", "tar", "gz", "tgz", "bz2", "xz",
                // media
                "mp3", "mp4", "wav", "ogg", "webm", "avi", "mov", "mkv", "flac", "m4a",
                // images
                "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "bmp", "avif", "tif", "tiff",
                // styles, scripts, fonts
                "css", "js", "mjs", "map", "woff", "woff2", "ttf", "otf", "eot",
                // data and binaries
                "json", "xml", "rss", "atom", "exe", "dmg", "apk", "msi", "iso", "bin",
            ]),
            image_extensions: strings(&[
                "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "bmp", "avif", "tif", "tiff",
            ]),
            document_extensions: strings(&[
                "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "rtf",
                "txt", "csv", "epub",
            ]),
            page_extensions: strings(&[
                "html", "htm", "xhtml", "shtml", "php", "asp", "aspx", "jsp", "cfm",
            ]),
            noise_patterns: strings(&[
                "CORS",
                "Cross-Origin",
                "Access-Control-Allow-Origin",
                "net::ERR_ABORTED",
                "net::ERR_BLOCKED_BY_CLIENT",
                "net::ERR_BLOCKED_BY_RESPONSE",
                "net::ERR_BLOCKED_BY_ORB",
                "net::ERR_FAILED",
                "Mixed Content",
                "Content Security Policy",
                "SecurityError",
                "net::ERR_CERT",
            ]),
            hostile_domains: strings(&[
                "facebook.com",
                "fb.com",
                "instagram.com",
                "twitter.com",
                "x.com",
                "linkedin.com",
                "tiktok.com",
                "pinterest.com",
                "reddit.com",
                "apps.apple.com",
                "itunes.apple.com",
                "play.google.com",
                "whatsapp.com",
                "wa.me",
                "t.me",
                "telegram.org",
                "discord.gg",
                "discord.com",
            ]),
        }
    }
}

impl DetectionRules {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let rules: DetectionRules = serde_json::from_str(content)?;
        Ok(rules.normalized())
    }

    /// Lowercases extensions and domains and strips leading dots.
    pub fn normalized(mut self) -> Self {
        for list in [
            &mut self.non_page_extensions,
            &mut self.image_extensions,
            &mut self.document_extensions,
            &mut self.page_extensions,
            &mut self.hostile_domains,
        ] {
            for item in list.iter_mut() {
                *item = item.trim().trim_start_matches('.').to_ascii_lowercase();
            }
            list.retain(|item| !item.is_empty());
        }
        self
    }

    /// True when the URL's path ends with a known non-page extension.
    pub fn is_non_page_resource(&self, url: &str) -> bool {
        path_extension(url)
            .map(|ext| self.non_page_extensions.contains(&ext))
            .unwrap_or(false)
    }

    pub fn classify(&self, url: &str, content_type: Option<&str>) -> ResourceKind {
        let extension = path_extension(url);

        if let Some(ref ext) = extension {
            if self.image_extensions.contains(ext) {
                return ResourceKind::Image;
            }
            if self.document_extensions.contains(ext) {
                return ResourceKind::Document;
            }
        }

        if let Some(content_type) = content_type {
            let content_type = content_type.to_ascii_lowercase();
            if content_type.starts_with("image/") {
                return ResourceKind::Image;
            }
            if content_type.starts_with("application/pdf")
                || content_type.contains("msword")
                || content_type.contains("officedocument")
                || content_type.contains("opendocument")
                || content_type.starts_with("text/csv")
            {
                return ResourceKind::Document;
            }
            if content_type.starts_with("text/html")
                || content_type.starts_with("application/xhtml")
            {
                return ResourceKind::Page;
            }
        }

        match extension {
            None => ResourceKind::Page,
            Some(ext) if self.page_extensions.contains(&ext) => ResourceKind::Page,
            Some(_) => ResourceKind::Other,
        }
    }

    /// True when the message matches a pattern known to produce false positives.
    pub fn is_noise_error(&self, message: &str) -> bool {
        let message = message.to_ascii_lowercase();
        self.noise_patterns
            .iter()
            .any(|pattern| message.contains(&pattern.to_ascii_lowercase()))
    }

    /// True when the URL's host is, or is a subdomain of, a deny-listed domain.
    pub fn is_hostile_external_domain(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        else {
            return false;
        };
        let host = host.trim_start_matches("www.");

        self.hostile_domains
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)))
    }
}

/// Lowercased extension of the last path segment, if it has one.
pub fn path_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_same_origin(url: &str, origin: &Origin) -> bool {
    Url::parse(url)
        .map(|u| &u.origin() == origin)
        .unwrap_or(false)
}

/// Parses an absolute http(s) URL and drops its fragment.
pub fn normalize_url(url: &str) -> Result<String> {
    let mut parsed =
        Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ScanError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            url,
            parsed.scheme()
        )));
    }
    parsed.set_fragment(None);
    Ok(parsed.to_string())
}
