//! Contract between the crawl driver and a page-rendering engine.
//!
//! A [`BrowserLauncher`] starts a [`BrowserSession`], which opens
//! [`BrowserPage`]s. Asynchronous page events (network responses, failed
//! requests, console output, uncaught exceptions) are not delivered through
//! callbacks: the page posts them as [`PageSignal`]s into the channel handed
//! to [`BrowserSession::new_page`], and the driver drains that channel
//! between page visits.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// How the engine classified a request, mirroring the browser's own resource types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    Xhr,
    Fetch,
    Other,
}

impl RequestKind {
    /// Traffic worth checking for broken sub-resources: fetch/xhr, images and
    /// anything unclassified.
    pub fn is_checked_subresource(self) -> bool {
        !matches!(
            self,
            RequestKind::Document
                | RequestKind::Stylesheet
                | RequestKind::Font
                | RequestKind::Script
                | RequestKind::Media
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSignal {
    pub url: String,
    pub status: u16,
    pub kind: RequestKind,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRequestSignal {
    pub url: String,
    pub kind: RequestKind,
    pub error_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSignal {
    pub level: ConsoleLevel,
    pub text: String,
    /// Resource URL the engine attached to the message, if any.
    pub source_url: Option<String>,
}

/// An event observed on a page while it was loading or running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSignal {
    Response(ResponseSignal),
    RequestFailed(FailedRequestSignal),
    Console(ConsoleSignal),
    PageError(String),
}

pub type SignalSender = mpsc::UnboundedSender<PageSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<PageSignal>;

pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}

/// Outcome of a completed navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    /// `None` when the engine did not expose a main-document response.
    pub status: Option<u16>,
}

impl Navigation {
    pub fn ok(&self) -> bool {
        self.status.map(|s| s < 400).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedLink {
    /// Absolute URL, fragment removed.
    pub href: String,
    pub text: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedImage {
    pub src: String,
    pub alt: String,
    pub context: String,
    /// `naturalWidth` of the element.
    pub width: u32,
    pub complete: bool,
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

#[async_trait]
pub trait BrowserSession: Send {
    async fn new_page(&mut self, signals: SignalSender) -> Result<Box<dyn BrowserPage>>;
    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait BrowserPage: Send {
    async fn goto(&mut self, url: &str) -> Result<Navigation>;
    async fn extract_links(&mut self) -> Result<Vec<ExtractedLink>>;
    async fn extract_images(&mut self) -> Result<Vec<ExtractedImage>>;
    async fn close(self: Box<Self>) -> Result<()>;
}
