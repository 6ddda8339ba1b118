//! Turns navigation outcomes, page signals and DOM image state into findings.
//!
//! Every resource is evaluated at most once per session: the
//! [`CheckedResources`] set is consulted before any finding is produced.
//! Broken links fan out to one [`BrokenLink`] per registered referrer;
//! broken images are attributed only to the page they were observed on.

use crate::browser::{
    ConsoleLevel, ConsoleSignal, ExtractedImage, FailedRequestSignal, RequestKind, ResponseSignal,
};
use crate::classify::{DetectionRules, ResourceKind, is_same_origin, normalize_url};
use crate::registry::LinkRegistry;
use crate::result::{
    BrokenImage, BrokenLink, ConsoleError, ConsoleErrorKind, Finding, LinkReference,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use url::{Origin, Url};

/// Resources already evaluated, and the status of those found broken.
#[derive(Debug, Default)]
pub struct CheckedResources {
    checked: HashSet<String>,
    broken: HashMap<String, u16>,
}

impl CheckedResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `url` is seen.
    pub fn mark(&mut self, url: &str) -> bool {
        self.checked.insert(url.to_string())
    }

    pub fn is_checked(&self, url: &str) -> bool {
        self.checked.contains(url)
    }

    /// Remembers a broken link target so later referrers can be reported too.
    pub fn record_broken(&mut self, url: &str, status: u16) {
        self.broken.insert(url.to_string(), status);
    }

    pub fn broken_status(&self, url: &str) -> Option<u16> {
        self.broken.get(url).copied()
    }

    pub fn len(&self) -> usize {
        self.checked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checked.is_empty()
    }
}

/// Session state the detector reads and updates for each signal.
pub struct DetectionContext<'a> {
    pub registry: &'a LinkRegistry,
    pub checked: &'a mut CheckedResources,
    pub current_page: &'a str,
}

pub struct Detector {
    rules: DetectionRules,
    origin: Origin,
    check_external: bool,
}

impl Detector {
    pub fn new(rules: DetectionRules, origin: Origin) -> Self {
        Self {
            rules,
            origin,
            check_external: false,
        }
    }

    /// Also inspect images served from other origins.
    pub fn with_external_checks(mut self, check_external: bool) -> Self {
        self.check_external = check_external;
        self
    }

    pub fn rules(&self) -> &DetectionRules {
        &self.rules
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn is_same_origin(&self, url: &str) -> bool {
        is_same_origin(url, &self.origin)
    }

    /// A page navigation that answered with `status`.
    pub fn navigation_status(
        &self,
        url: &str,
        status: u16,
        ctx: &mut DetectionContext,
    ) -> Vec<Finding> {
        if status < 400 {
            ctx.checked.mark(url);
            return Vec::new();
        }
        self.broken_target(url, status, ctx, LinkReference::new("unknown", "unknown", "unknown"))
    }

    /// A navigation that produced no response at all. Only reported when
    /// some page is known to link to `url`.
    pub fn navigation_failed(&self, url: &str, ctx: &mut DetectionContext) -> Vec<Finding> {
        if !ctx.registry.contains(url) {
            return Vec::new();
        }
        self.broken_target(url, 0, ctx, LinkReference::new("unknown", "unknown", "unknown"))
    }

    /// Result of a HEAD existence check for a non-page or external resource.
    pub fn existence_status(
        &self,
        url: &str,
        status: u16,
        ctx: &mut DetectionContext,
    ) -> Vec<Finding> {
        if crate::http::is_reachable_status(status) {
            ctx.checked.mark(url);
            return Vec::new();
        }
        self.broken_target(url, status, ctx, LinkReference::new("unknown", "unknown", "unknown"))
    }

    /// A sub-resource response observed while the current page was loading.
    pub fn response(&self, signal: &ResponseSignal, ctx: &mut DetectionContext) -> Vec<Finding> {
        if signal.status < 400
            || !signal.kind.is_checked_subresource()
            || !self.is_same_origin(&signal.url)
        {
            return Vec::new();
        }

        let is_image = signal.kind == RequestKind::Image
            || self.rules.classify(&signal.url, signal.content_type.as_deref())
                == ResourceKind::Image;
        let reason = format!("HTTP {} response", signal.status);
        let fallback =
            LinkReference::new(ctx.current_page, "Detected from network", "network request");

        self.resource_failure(&signal.url, signal.status, is_image, reason, fallback, ctx)
    }

    /// A same-origin request that failed without a response.
    pub fn request_failed(
        &self,
        signal: &FailedRequestSignal,
        ctx: &mut DetectionContext,
    ) -> Vec<Finding> {
        if !self.is_same_origin(&signal.url) {
            return Vec::new();
        }
        if self.rules.is_noise_error(&signal.error_text) {
            debug!("Suppressed noisy request failure {}: {}", signal.url, signal.error_text);
            return Vec::new();
        }
        let is_image = signal.kind == RequestKind::Image
            || self.rules.classify(&signal.url, None) == ResourceKind::Image;
        if !is_image || !ctx.checked.mark(&signal.url) {
            return Vec::new();
        }

        vec![Finding::BrokenImage(BrokenImage {
            src: signal.url.clone(),
            found_on_page: ctx.current_page.to_string(),
            alt_text: String::new(),
            element_context: "network request".to_string(),
            reason: format!("Request failed: {}", signal.error_text),
            timestamp: Utc::now(),
        })]
    }

    /// A console message. Error messages naming a 4xx status and a URL are
    /// treated as broken resources; other errors become console findings.
    pub fn console(&self, signal: &ConsoleSignal, ctx: &mut DetectionContext) -> Vec<Finding> {
        if signal.level != ConsoleLevel::Error {
            return Vec::new();
        }
        if self.rules.is_noise_error(&signal.text) {
            debug!("Suppressed noisy console error: {}", signal.text);
            return Vec::new();
        }

        let Some((status, url)) = extract_status_and_url(&signal.text, signal.source_url.as_deref())
        else {
            return vec![Finding::ConsoleError(ConsoleError {
                message: signal.text.clone(),
                found_on_page: ctx.current_page.to_string(),
                kind: ConsoleErrorKind::Error,
                timestamp: Utc::now(),
            })];
        };

        if !self.is_same_origin(&url) || self.rules.is_non_page_resource(&url) {
            debug!("Console error for {} left to other checks", url);
            return Vec::new();
        }

        let is_image = self.rules.classify(&url, None) == ResourceKind::Image;
        let reason = format!("HTTP {} reported in console", status);
        let fallback = LinkReference::new(ctx.current_page, "Detected from console", "console");

        self.resource_failure(&url, status, is_image, reason, fallback, ctx)
    }

    /// An uncaught exception thrown by page script.
    pub fn page_error(&self, message: &str, ctx: &mut DetectionContext) -> Vec<Finding> {
        if self.rules.is_noise_error(message) {
            debug!("Suppressed noisy page error: {}", message);
            return Vec::new();
        }
        vec![Finding::ConsoleError(ConsoleError {
            message: message.to_string(),
            found_on_page: ctx.current_page.to_string(),
            kind: ConsoleErrorKind::JsError,
            timestamp: Utc::now(),
        })]
    }

    /// Images that never finished loading or rendered with zero width.
    pub fn images(&self, images: &[ExtractedImage], ctx: &mut DetectionContext) -> Vec<Finding> {
        let mut findings = Vec::new();

        for image in images {
            if image.complete && image.width > 0 {
                continue;
            }
            let Some(src) = self.resolve_image_src(&image.src, ctx.current_page) else {
                continue;
            };
            if !ctx.checked.mark(&src) {
                continue;
            }

            let reason = if !image.complete {
                format!("Image did not finish loading (naturalWidth={})", image.width)
            } else {
                "Image failed to render (naturalWidth=0)".to_string()
            };

            findings.push(Finding::BrokenImage(BrokenImage {
                src,
                found_on_page: ctx.current_page.to_string(),
                alt_text: image.alt.clone(),
                element_context: image.context.clone(),
                reason,
                timestamp: Utc::now(),
            }));
        }

        findings
    }

    /// A referrer registered after its target was already found broken.
    pub fn late_referrer(
        &self,
        url: &str,
        reference: &LinkReference,
        ctx: &DetectionContext,
    ) -> Option<Finding> {
        ctx.checked
            .broken_status(url)
            .map(|status| Finding::BrokenLink(BrokenLink::new(url, status, reference)))
    }

    fn resolve_image_src(&self, src: &str, page: &str) -> Option<String> {
        let src = src.trim();
        if src.is_empty() || src.starts_with("data:") || src.starts_with("blob:") {
            return None;
        }
        let absolute = match Url::parse(page).and_then(|base| base.join(src)) {
            Ok(url) => url.to_string(),
            Err(_) => src.to_string(),
        };
        let normalized = normalize_url(&absolute).ok()?;
        if !self.check_external && !self.is_same_origin(&normalized) {
            return None;
        }
        Some(normalized)
    }

    fn resource_failure(
        &self,
        url: &str,
        status: u16,
        is_image: bool,
        reason: String,
        fallback: LinkReference,
        ctx: &mut DetectionContext,
    ) -> Vec<Finding> {
        if !is_image {
            return self.broken_target(url, status, ctx, fallback);
        }
        if !ctx.checked.mark(url) {
            return Vec::new();
        }
        vec![Finding::BrokenImage(BrokenImage {
            src: url.to_string(),
            found_on_page: ctx.current_page.to_string(),
            alt_text: String::new(),
            element_context: fallback.element_context,
            reason,
            timestamp: Utc::now(),
        })]
    }

    /// Fans a broken target out across its referrers, or `fallback` when none are known.
    fn broken_target(
        &self,
        url: &str,
        status: u16,
        ctx: &mut DetectionContext,
        fallback: LinkReference,
    ) -> Vec<Finding> {
        if !ctx.checked.mark(url) {
            return Vec::new();
        }
        ctx.checked.record_broken(url, status);

        let references = ctx.registry.references_for(url);
        if references.is_empty() {
            return vec![Finding::BrokenLink(BrokenLink::new(url, status, &fallback))];
        }
        references
            .iter()
            .map(|reference| Finding::BrokenLink(BrokenLink::new(url, status, reference)))
            .collect()
    }
}

/// Pulls a 4xx status and an absolute URL out of a console message.
///
/// The status is the first standalone three-digit number between 400 and 499
/// outside any URL. The URL is the first `http(s)://` token in the text; when
/// the text holds a status but no URL, `fallback_url` (the resource URL the
/// engine attached to the message) is used. Returns `None` when no status is
/// found or no URL is available.
pub fn extract_status_and_url(text: &str, fallback_url: Option<&str>) -> Option<(u16, String)> {
    let mut status = None;
    let mut url = None;

    for token in text.split_whitespace() {
        if let Some(start) = token.find("http://").or_else(|| token.find("https://")) {
            if url.is_none() {
                let candidate = token[start..].trim_end_matches(|c: char| {
                    matches!(c, ')' | '(' | ',' | ';' | '.' | '\'' | '"' | ']' | '>' | ':')
                });
                if Url::parse(candidate).is_ok() {
                    url = Some(candidate.to_string());
                }
            }
            continue;
        }
        if status.is_none() {
            status = client_error_status(token);
        }
    }

    let status = status?;
    let url = url.or_else(|| fallback_url.map(str::to_string))?;
    Some((status, url))
}

fn client_error_status(token: &str) -> Option<u16> {
    token
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 3)
        .filter_map(|run| run.parse::<u16>().ok())
        .find(|code| (400..500).contains(code))
}
