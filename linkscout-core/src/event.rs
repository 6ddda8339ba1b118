//! The event stream a crawl session pushes to its caller.
//!
//! Events serialize to one JSON object per line:
//! `{"type": "broken_link", "message": "...", "data": {...}}`. A stream ends
//! with exactly one terminal event (`done` or `error`); [`EventEmitter`]
//! drops anything sent after it.

use linkscout_scanner::result::{BrokenImage, BrokenLink, ConsoleError, ConsoleErrorKind, Finding};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlEvent {
    Log {
        message: String,
    },
    BrokenLink {
        message: String,
        data: BrokenLink,
    },
    BrokenImage {
        message: String,
        data: BrokenImage,
    },
    ConsoleError {
        message: String,
        data: ConsoleError,
    },
    Done {
        message: String,
    },
    Error {
        message: String,
    },
}

impl CrawlEvent {
    pub fn log(message: impl Into<String>) -> Self {
        CrawlEvent::Log {
            message: message.into(),
        }
    }

    pub fn done(message: impl Into<String>) -> Self {
        CrawlEvent::Done {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        CrawlEvent::Error {
            message: message.into(),
        }
    }

    /// Wraps a finding with a one-line human readable message.
    pub fn from_finding(finding: Finding) -> Self {
        match finding {
            Finding::BrokenLink(link) => {
                let status = if link.status_code == 0 {
                    "no response".to_string()
                } else {
                    link.status_code.to_string()
                };
                CrawlEvent::BrokenLink {
                    message: format!(
                        "Broken link: {} ({}) | Found on: {} | Text: \"{}\"",
                        link.url, status, link.found_on_page, link.link_text
                    ),
                    data: link,
                }
            }
            Finding::BrokenImage(image) => CrawlEvent::BrokenImage {
                message: format!(
                    "Broken image: {} | Found on: {} | {}",
                    image.src, image.found_on_page, image.reason
                ),
                data: image,
            },
            Finding::ConsoleError(error) => {
                let label = match error.kind {
                    ConsoleErrorKind::JsError => "JS error",
                    ConsoleErrorKind::Warning => "Console warning",
                    ConsoleErrorKind::Error => "Console error",
                };
                CrawlEvent::ConsoleError {
                    message: format!(
                        "{}: {} | Page: {}",
                        label, error.message, error.found_on_page
                    ),
                    data: error,
                }
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CrawlEvent::Log { message }
            | CrawlEvent::BrokenLink { message, .. }
            | CrawlEvent::BrokenImage { message, .. }
            | CrawlEvent::ConsoleError { message, .. }
            | CrawlEvent::Done { message }
            | CrawlEvent::Error { message } => message,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlEvent::Done { .. } | CrawlEvent::Error { .. })
    }

    /// The finding carried by this event, if any.
    pub fn finding(&self) -> Option<Finding> {
        match self {
            CrawlEvent::BrokenLink { data, .. } => Some(Finding::BrokenLink(data.clone())),
            CrawlEvent::BrokenImage { data, .. } => Some(Finding::BrokenImage(data.clone())),
            CrawlEvent::ConsoleError { data, .. } => Some(Finding::ConsoleError(data.clone())),
            _ => None,
        }
    }

    /// Serializes the event as a single NDJSON line (without the newline).
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Callback receiving every event of a crawl session
pub type CrawlEventCallback = Arc<dyn Fn(CrawlEvent) + Send + Sync>;

/// Delivers events to the caller and guarantees nothing follows a terminal event.
pub struct EventEmitter {
    callback: Option<CrawlEventCallback>,
    closed: AtomicBool,
}

impl EventEmitter {
    pub fn new(callback: Option<CrawlEventCallback>) -> Self {
        Self {
            callback,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns `false` if the stream was already closed and the event was dropped.
    pub fn emit(&self, event: CrawlEvent) -> bool {
        let delivered = if event.is_terminal() {
            !self.closed.swap(true, Ordering::SeqCst)
        } else {
            !self.closed.load(Ordering::SeqCst)
        };

        if !delivered {
            trace!("Dropping event after stream closed: {}", event.message());
            return false;
        }
        if let Some(ref callback) = self.callback {
            callback(event);
        }
        true
    }

    pub fn log(&self, message: impl Into<String>) -> bool {
        self.emit(CrawlEvent::log(message))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
