// In-memory browser used by the crawl tests

#![allow(dead_code)]

use async_trait::async_trait;
use linkscout_core::{CrawlEvent, CrawlEventCallback};
use linkscout_scanner::ScanError;
use linkscout_scanner::browser::{
    BrowserLauncher, BrowserPage, BrowserSession, ExtractedImage, ExtractedLink, Navigation,
    PageSignal, SignalSender,
};
use linkscout_scanner::error::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
enum FakeResponse {
    Page {
        status: u16,
        links: Vec<ExtractedLink>,
        images: Vec<ExtractedImage>,
        signals: Vec<PageSignal>,
    },
    Fail(String),
    Hang,
}

#[derive(Default)]
pub struct FakeState {
    pub visits: Mutex<Vec<String>>,
    pub page_closed: AtomicBool,
    pub browser_closed: AtomicBool,
}

impl FakeState {
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

/// A scripted site. URLs without an entry answer 404 with an empty page.
#[derive(Clone, Default)]
pub struct FakeSite {
    pages: HashMap<String, FakeResponse>,
    launch_error: Option<String>,
    pub state: Arc<FakeState>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// A 200 page linking to `links` (absolute href, text), all in `<main>`.
    pub fn page(mut self, url: &str, links: &[(&str, &str)]) -> Self {
        let links = links
            .iter()
            .map(|(href, text)| ExtractedLink {
                href: href.to_string(),
                text: text.to_string(),
                context: "main".to_string(),
            })
            .collect();
        self.pages.insert(
            url.to_string(),
            FakeResponse::Page {
                status: 200,
                links,
                images: Vec::new(),
                signals: Vec::new(),
            },
        );
        self
    }

    pub fn status(mut self, url: &str, code: u16) -> Self {
        match self.pages.get_mut(url) {
            Some(FakeResponse::Page { status, .. }) => *status = code,
            _ => {
                self.pages.insert(
                    url.to_string(),
                    FakeResponse::Page {
                        status: code,
                        links: Vec::new(),
                        images: Vec::new(),
                        signals: Vec::new(),
                    },
                );
            }
        }
        self
    }

    pub fn images(mut self, url: &str, page_images: Vec<ExtractedImage>) -> Self {
        if let Some(FakeResponse::Page { images, .. }) = self.pages.get_mut(url) {
            *images = page_images;
        }
        self
    }

    pub fn signals(mut self, url: &str, page_signals: Vec<PageSignal>) -> Self {
        if let Some(FakeResponse::Page { signals, .. }) = self.pages.get_mut(url) {
            *signals = page_signals;
        }
        self
    }

    pub fn failing(mut self, url: &str, error: &str) -> Self {
        self.pages
            .insert(url.to_string(), FakeResponse::Fail(error.to_string()));
        self
    }

    pub fn hanging(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), FakeResponse::Hang);
        self
    }

    pub fn launch_error(mut self, error: &str) -> Self {
        self.launch_error = Some(error.to_string());
        self
    }
}

#[async_trait]
impl BrowserLauncher for FakeSite {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        if let Some(ref error) = self.launch_error {
            return Err(ScanError::BrowserError(error.clone()));
        }
        Ok(Box::new(FakeSession { site: self.clone() }))
    }
}

struct FakeSession {
    site: FakeSite,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn new_page(&mut self, signals: SignalSender) -> Result<Box<dyn BrowserPage>> {
        Ok(Box::new(FakePage {
            site: self.site.clone(),
            signals,
            current: None,
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.site.state.browser_closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    site: FakeSite,
    signals: SignalSender,
    current: Option<String>,
}

impl FakePage {
    fn current(&self) -> Option<&FakeResponse> {
        self.current.as_ref().and_then(|url| self.site.pages.get(url))
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&mut self, url: &str) -> Result<Navigation> {
        self.site.state.visits.lock().unwrap().push(url.to_string());
        self.current = Some(url.to_string());

        match self.site.pages.get(url).cloned() {
            Some(FakeResponse::Page {
                status, signals, ..
            }) => {
                for signal in signals {
                    let _ = self.signals.send(signal);
                }
                Ok(Navigation {
                    status: Some(status),
                })
            }
            Some(FakeResponse::Fail(error)) => Err(ScanError::NavigationError(error)),
            Some(FakeResponse::Hang) => {
                std::future::pending::<()>().await;
                Ok(Navigation { status: None })
            }
            None => Ok(Navigation { status: Some(404) }),
        }
    }

    async fn extract_links(&mut self) -> Result<Vec<ExtractedLink>> {
        match self.current() {
            Some(FakeResponse::Page { links, .. }) => Ok(links.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn extract_images(&mut self) -> Result<Vec<ExtractedImage>> {
        match self.current() {
            Some(FakeResponse::Page { images, .. }) => Ok(images.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.site.state.page_closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn recorder() -> (CrawlEventCallback, Arc<Mutex<Vec<CrawlEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let callback: CrawlEventCallback = Arc::new(move |event| sink.lock().unwrap().push(event));
    (callback, events)
}

pub fn image(src: &str, alt: &str, width: u32, complete: bool) -> ExtractedImage {
    ExtractedImage {
        src: src.to_string(),
        alt: alt.to_string(),
        context: "main".to_string(),
        width,
        complete,
    }
}
