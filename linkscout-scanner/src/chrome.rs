// Chromium-backed implementation of the browser contract

use crate::browser::{
    BrowserLauncher, BrowserPage, BrowserSession, ConsoleLevel, ConsoleSignal, ExtractedImage,
    ExtractedLink, FailedRequestSignal, Navigation, PageSignal, RequestKind, ResponseSignal,
    SignalSender,
};
use crate::error::{Result, ScanError};
use crate::html;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::log::{
    EnableParams as LogEnableParams, EventEntryAdded, LogEntryLevel,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, EventResponseReceived, RequestId, ResourceType,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EnableParams as RuntimeEnableParams, EventConsoleApiCalled,
    EventExceptionThrown, RemoteObject,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

/// Inspects every `<img>` on the rendered page.
const IMAGES_SCRIPT: &str = r#"
(() => {
    const regions = ['nav', 'header', 'footer', 'aside', 'main', 'article', 'section'];
    const contextOf = (el) => {
        for (let node = el.parentElement; node; node = node.parentElement) {
            const name = node.tagName.toLowerCase();
            if (regions.includes(name)) return name;
        }
        return 'body';
    };
    return Array.from(document.images).map((img) => ({
        src: img.currentSrc || img.src || '',
        alt: img.alt || '',
        context: contextOf(img),
        width: img.naturalWidth || 0,
        complete: !!img.complete,
    }));
})()
"#;

/// Launches a local Chromium through the DevTools protocol.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    headless: bool,
    executable: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self {
            headless: true,
            executable: None,
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_executable(mut self, executable: PathBuf) -> Self {
        self.executable = Some(executable);
        self
    }
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--ignore-certificate-errors")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--mute-audio");
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(ref executable) = self.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(ScanError::BrowserError)?;

        info!("Launching Chromium (headless: {})", self.headless);
        let (browser, mut handler) = Browser::launch(config).await?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    let message = e.to_string();
                    // chromiumoxide cannot deserialize some newer CDP events
                    if message.contains("data did not match any variant")
                        || message.contains("Failed to deserialize WS response")
                    {
                        trace!("Ignoring CDP deserialization error: {}", message);
                    } else {
                        error!("Browser handler error: {}", message);
                    }
                }
            }
            debug!("Browser handler task finished");
        });

        Ok(Box::new(ChromeSession {
            browser,
            handler_task,
        }))
    }
}

pub struct ChromeSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn new_page(&mut self, signals: SignalSender) -> Result<Box<dyn BrowserPage>> {
        let page = self.browser.new_page("about:blank").await?;

        page.execute(NetworkEnableParams::default()).await?;
        page.execute(RuntimeEnableParams::default()).await?;
        page.execute(LogEnableParams::default()).await?;

        let listeners = spawn_signal_forwarders(&page, signals).await?;

        Ok(Box::new(ChromePage { page, listeners }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromeSession {
            mut browser,
            handler_task,
        } = *self;
        let closed = browser.close().await;
        let _ = browser.wait().await;
        handler_task.abort();
        closed?;
        info!("Browser closed");
        Ok(())
    }
}

pub struct ChromePage {
    page: Page,
    listeners: Vec<JoinHandle<()>>,
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn goto(&mut self, url: &str) -> Result<Navigation> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ScanError::NavigationError(e.to_string()))?;

        let request = self
            .page
            .wait_for_navigation_response()
            .await
            .map_err(|e| ScanError::NavigationError(e.to_string()))?;

        if let Some(ref request) = request
            && let Some(ref failure) = request.failure_text
        {
            return Err(ScanError::NavigationError(failure.clone()));
        }

        let status = request
            .as_ref()
            .and_then(|r| r.response.as_ref())
            .and_then(|response| u16::try_from(response.status).ok());

        Ok(Navigation { status })
    }

    async fn extract_links(&mut self) -> Result<Vec<ExtractedLink>> {
        let page_url = self.page.url().await?.unwrap_or_default();
        let content = self.page.content().await?;
        Ok(html::extract_links(&content, &page_url))
    }

    async fn extract_images(&mut self) -> Result<Vec<ExtractedImage>> {
        let result = self.page.evaluate(IMAGES_SCRIPT).await?;
        let images: Vec<ExtractedImage> = result
            .into_value()
            .map_err(|e| ScanError::ParseError(format!("image inspection result: {}", e)))?;
        Ok(images)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromePage { page, listeners } = *self;
        for listener in listeners {
            listener.abort();
        }
        page.close().await?;
        Ok(())
    }
}

/// Subscribes to the page's CDP events and forwards them as typed signals.
async fn spawn_signal_forwarders(
    page: &Page,
    signals: SignalSender,
) -> Result<Vec<JoinHandle<()>>> {
    let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
    let mut failures = page.event_listener::<EventLoadingFailed>().await?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await?;
    let mut responses = page.event_listener::<EventResponseReceived>().await?;
    let mut console = page.event_listener::<EventConsoleApiCalled>().await?;
    let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
    let mut log_entries = page.event_listener::<EventEntryAdded>().await?;

    let mut listeners = Vec::new();

    let tx = signals.clone();
    listeners.push(tokio::spawn(async move {
        let mut urls = InFlightRequests::default();
        loop {
            tokio::select! {
                Some(event) = requests.next() => {
                    urls.sent(event.request_id.clone(), event.request.url.clone());
                }
                Some(event) = finished.next() => {
                    urls.settle(&event.request_id);
                }
                Some(event) = failures.next() => {
                    let Some(url) = urls.settle(&event.request_id) else {
                        continue;
                    };
                    let signal = PageSignal::RequestFailed(FailedRequestSignal {
                        url,
                        kind: request_kind(&event.r#type),
                        error_text: event.error_text.clone(),
                    });
                    if tx.send(signal).is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    }));

    let tx = signals.clone();
    listeners.push(tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            let status = u16::try_from(event.response.status).unwrap_or(0);
            let signal = PageSignal::Response(ResponseSignal {
                url: event.response.url.clone(),
                status,
                kind: request_kind(&event.r#type),
                content_type: Some(event.response.mime_type.clone())
                    .filter(|mime| !mime.is_empty()),
            });
            if tx.send(signal).is_err() {
                break;
            }
        }
    }));

    let tx = signals.clone();
    listeners.push(tokio::spawn(async move {
        while let Some(event) = console.next().await {
            let level = match event.r#type {
                ConsoleApiCalledType::Error | ConsoleApiCalledType::Assert => ConsoleLevel::Error,
                ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
                _ => ConsoleLevel::Info,
            };
            let text = event
                .args
                .iter()
                .filter_map(remote_object_text)
                .collect::<Vec<_>>()
                .join(" ");
            let signal = PageSignal::Console(ConsoleSignal {
                level,
                text,
                source_url: None,
            });
            if tx.send(signal).is_err() {
                break;
            }
        }
    }));

    // Resource load errors ("Failed to load resource: ... 404") arrive through the Log domain
    let tx = signals.clone();
    listeners.push(tokio::spawn(async move {
        while let Some(event) = log_entries.next().await {
            let level = match event.entry.level {
                LogEntryLevel::Error => ConsoleLevel::Error,
                LogEntryLevel::Warning => ConsoleLevel::Warning,
                _ => ConsoleLevel::Info,
            };
            let signal = PageSignal::Console(ConsoleSignal {
                level,
                text: event.entry.text.clone(),
                source_url: event.entry.url.clone(),
            });
            if tx.send(signal).is_err() {
                break;
            }
        }
    }));

    let tx = signals;
    listeners.push(tokio::spawn(async move {
        while let Some(event) = exceptions.next().await {
            let details = &event.exception_details;
            let message = details
                .exception
                .as_ref()
                .and_then(|exception| exception.description.clone())
                .unwrap_or_else(|| details.text.clone());
            if tx.send(PageSignal::PageError(message)).is_err() {
                break;
            }
        }
    }));

    Ok(listeners)
}

/// URLs of requests still in flight. Loading failures only carry a request
/// id, so the URL is remembered until the request finishes or fails.
#[derive(Debug, Default)]
struct InFlightRequests {
    urls: HashMap<RequestId, String>,
}

impl InFlightRequests {
    fn sent(&mut self, id: RequestId, url: String) {
        self.urls.insert(id, url);
    }

    fn settle(&mut self, id: &RequestId) -> Option<String> {
        self.urls.remove(id)
    }
}

fn request_kind(resource_type: &ResourceType) -> RequestKind {
    match resource_type {
        ResourceType::Document => RequestKind::Document,
        ResourceType::Stylesheet => RequestKind::Stylesheet,
        ResourceType::Image => RequestKind::Image,
        ResourceType::Media => RequestKind::Media,
        ResourceType::Font => RequestKind::Font,
        ResourceType::Script => RequestKind::Script,
        ResourceType::Xhr => RequestKind::Xhr,
        ResourceType::Fetch => RequestKind::Fetch,
        _ => RequestKind::Other,
    }
}

fn remote_object_text(object: &RemoteObject) -> Option<String> {
    match object.value {
        Some(serde_json::Value::String(ref s)) => Some(s.clone()),
        Some(ref value) => Some(value.to_string()),
        None => object.description.clone(),
    }
}
