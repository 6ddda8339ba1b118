use crate::error::{CrawlError, Result};
use crate::event::{CrawlEvent, CrawlEventCallback, EventEmitter};
use linkscout_scanner::browser::{
    BrowserLauncher, BrowserPage, ConsoleLevel, PageSignal, SignalReceiver, signal_channel,
};
use linkscout_scanner::classify::{DetectionRules, normalize_url};
use linkscout_scanner::detect::{CheckedResources, DetectionContext, Detector};
use linkscout_scanner::frontier::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_PAGES, Frontier};
use linkscout_scanner::http::{DEFAULT_HEAD_TIMEOUT, HttpProbe};
use linkscout_scanner::registry::LinkRegistry;
use linkscout_scanner::result::{Finding, LinkReference};
use linkscout_scanner::sitemap::fetch_sitemap;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::{Origin, Url};

pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for configuring a crawl session
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub start_url: String,
    pub sitemap_url: Option<String>,
    pub max_pages: usize,
    pub batch_size: usize,
    pub navigation_timeout: Duration,
    pub head_timeout: Duration,
    /// Existence-check off-origin links instead of ignoring them
    pub check_external_links: bool,
    pub rules: DetectionRules,
}

impl CrawlOptions {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            sitemap_url: None,
            max_pages: DEFAULT_MAX_PAGES,
            batch_size: DEFAULT_BATCH_SIZE,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            head_timeout: DEFAULT_HEAD_TIMEOUT,
            check_external_links: false,
            rules: DetectionRules::default(),
        }
    }

    pub fn with_sitemap(mut self, sitemap_url: impl Into<String>) -> Self {
        self.sitemap_url = Some(sitemap_url.into());
        self
    }

    /// Replaces the built-in detection rules with the contents of a JSON file.
    pub fn with_rules_file(mut self, path: &Path) -> Result<Self> {
        self.rules = DetectionRules::from_json_file(path).map_err(CrawlError::Rules)?;
        Ok(self)
    }
}

/// Why the batch loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlOutcome {
    /// The frontier drained.
    Completed,
    PageLimitReached,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSummary {
    pub start_url: String,
    pub pages_visited: usize,
    pub broken_links: usize,
    pub broken_images: usize,
    pub console_errors: usize,
    pub remaining_in_queue: usize,
    pub outcome: CrawlOutcome,
}

impl CrawlSummary {
    pub fn total_findings(&self) -> usize {
        self.broken_links + self.broken_images + self.console_errors
    }
}

/// Checks that `url` is an absolute http(s) URL and returns it normalized.
pub fn validate_url(url: &str) -> std::result::Result<String, String> {
    let url = url.trim();
    if url.is_empty() {
        return Err("URL is required".to_string());
    }
    normalize_url(url).map_err(|e| e.to_string())
}

/// Run a crawl session to completion.
///
/// Input errors are returned before the browser is launched and produce no
/// events. Every other path, including a failed browser launch and
/// cancellation, ends the event stream with exactly one terminal event.
pub async fn execute_crawl(
    options: CrawlOptions,
    launcher: &dyn BrowserLauncher,
    event_callback: Option<CrawlEventCallback>,
    cancel: CancellationToken,
) -> Result<CrawlSummary> {
    let start_url = validate_url(&options.start_url).map_err(CrawlError::InvalidStartUrl)?;
    let sitemap_url = options
        .sitemap_url
        .as_deref()
        .map(validate_url)
        .transpose()
        .map_err(CrawlError::InvalidSitemapUrl)?;
    let origin = Url::parse(&start_url)
        .map_err(|e| CrawlError::InvalidStartUrl(e.to_string()))?
        .origin();

    let emitter = EventEmitter::new(event_callback);
    let probe = HttpProbe::new().map_err(CrawlError::Session)?;

    info!("Starting crawl of {}", start_url);
    emitter.log(format!("Starting crawler for {}", start_url));

    let mut browser = match launcher.launch().await {
        Ok(browser) => browser,
        Err(e) => {
            warn!("Browser launch failed: {}", e);
            emitter.emit(CrawlEvent::error(format!("Failed to start browser: {}", e)));
            return Err(CrawlError::Session(e));
        }
    };

    let (signal_tx, signal_rx) = signal_channel();
    let mut page = match browser.new_page(signal_tx).await {
        Ok(page) => page,
        Err(e) => {
            warn!("Could not open a browser page: {}", e);
            if let Err(close_err) = browser.close().await {
                debug!("Browser close after failed page open: {}", close_err);
            }
            emitter.emit(CrawlEvent::error(format!("Failed to open browser page: {}", e)));
            return Err(CrawlError::Session(e));
        }
    };

    let mut session = CrawlSession::new(&options, origin, probe, &emitter, signal_rx);
    session.seed(&start_url, sitemap_url.as_deref(), &cancel).await;
    let outcome = session.run(page.as_mut(), &cancel).await;
    if outcome != CrawlOutcome::Stopped {
        session.drain_signals();
    }

    if let Err(e) = page.close().await {
        debug!("Page close failed: {}", e);
    }
    if let Err(e) = browser.close().await {
        warn!("Browser close failed: {}", e);
    }

    let summary = session.summary(&start_url, outcome);
    info!(
        "Crawl finished ({:?}): {} pages, {} findings",
        outcome,
        summary.pages_visited,
        summary.total_findings()
    );

    let message = match outcome {
        CrawlOutcome::Stopped => format!(
            "Crawl stopped. Pages visited: {}",
            summary.pages_visited
        ),
        _ => format!("Crawl complete. Pages visited: {}", summary.pages_visited),
    };
    emitter.emit(CrawlEvent::done(message));

    Ok(summary)
}

/// Mutable state of one crawl session, owned by the driver.
struct CrawlSession<'a> {
    detector: Detector,
    registry: LinkRegistry,
    frontier: Frontier,
    checked: CheckedResources,
    probe: HttpProbe,
    emitter: &'a EventEmitter,
    signals: SignalReceiver,
    navigation_timeout: Duration,
    head_timeout: Duration,
    check_external_links: bool,
    current_page: String,
    broken_links: usize,
    broken_images: usize,
    console_errors: usize,
}

impl<'a> CrawlSession<'a> {
    fn new(
        options: &CrawlOptions,
        origin: Origin,
        probe: HttpProbe,
        emitter: &'a EventEmitter,
        signals: SignalReceiver,
    ) -> Self {
        let detector = Detector::new(options.rules.clone().normalized(), origin)
            .with_external_checks(options.check_external_links);

        Self {
            detector,
            registry: LinkRegistry::new(),
            frontier: Frontier::new(options.max_pages, options.batch_size),
            checked: CheckedResources::new(),
            probe,
            emitter,
            signals,
            navigation_timeout: options.navigation_timeout,
            head_timeout: options.head_timeout,
            check_external_links: options.check_external_links,
            current_page: String::new(),
            broken_links: 0,
            broken_images: 0,
            console_errors: 0,
        }
    }

    async fn seed(
        &mut self,
        start_url: &str,
        sitemap_url: Option<&str>,
        cancel: &CancellationToken,
    ) {
        self.discover(start_url, LinkReference::seed(start_url));

        let Some(sitemap_url) = sitemap_url else {
            return;
        };
        self.emitter.log(format!("Loading sitemap: {}", sitemap_url));

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = fetch_sitemap(&self.probe, sitemap_url, self.detector.origin()) => result,
        };

        match result {
            Ok(urls) => {
                let mut added = 0;
                for url in &urls {
                    if self.discover(url, LinkReference::sitemap(sitemap_url)) {
                        added += 1;
                    }
                }
                info!("Sitemap {} listed {} same-origin URLs", sitemap_url, urls.len());
                self.emitter.log(format!("Added {} URLs from sitemap", added));
            }
            Err(e) => {
                warn!("Failed to load sitemap {}: {}", sitemap_url, e);
                self.emitter.log(format!("Failed to load sitemap: {}", e));
            }
        }
    }

    async fn run(
        &mut self,
        page: &mut dyn BrowserPage,
        cancel: &CancellationToken,
    ) -> CrawlOutcome {
        let mut batch_number = 0;

        loop {
            if cancel.is_cancelled() {
                return CrawlOutcome::Stopped;
            }
            if self.frontier.is_empty() {
                return CrawlOutcome::Completed;
            }
            if self.frontier.cap_reached() {
                self.emitter.log(format!(
                    "Reached the limit of {} pages, {} URLs left unvisited",
                    self.frontier.max_pages(),
                    self.frontier.len()
                ));
                return CrawlOutcome::PageLimitReached;
            }

            batch_number += 1;
            debug!("Starting batch {} with {} URLs queued", batch_number, self.frontier.len());

            let mut pages_in_batch = 0;
            while pages_in_batch < self.frontier.batch_size() && !self.frontier.cap_reached() {
                if cancel.is_cancelled() {
                    return CrawlOutcome::Stopped;
                }
                let Some(url) = self.frontier.pop() else {
                    break;
                };

                self.drain_signals();

                if self.needs_existence_check(&url) {
                    if self.check_existence(&url, cancel).await.is_break() {
                        return CrawlOutcome::Stopped;
                    }
                    continue;
                }

                if !self.frontier.mark_visited(&url) {
                    continue;
                }
                pages_in_batch += 1;

                if self.visit(page, &url, cancel).await.is_break() {
                    return CrawlOutcome::Stopped;
                }
            }

            self.drain_signals();
            self.emitter.log(format!(
                "Batch finished. Total pages crawled: {}",
                self.frontier.pages_visited()
            ));
            if !self.frontier.is_empty() {
                self.emitter
                    .log(format!("{} URLs remaining in queue", self.frontier.len()));
            }
        }
    }

    fn needs_existence_check(&self, url: &str) -> bool {
        !self.detector.is_same_origin(url) || self.detector.rules().is_non_page_resource(url)
    }

    async fn visit(
        &mut self,
        page: &mut dyn BrowserPage,
        url: &str,
        cancel: &CancellationToken,
    ) -> ControlFlow<()> {
        self.current_page = url.to_string();
        self.emitter.log(format!(
            "Crawling ({}): {}",
            self.frontier.pages_visited(),
            url
        ));

        let navigation = tokio::select! {
            _ = cancel.cancelled() => return ControlFlow::Break(()),
            result = tokio::time::timeout(self.navigation_timeout, page.goto(url)) => result,
        };

        let navigation = match navigation {
            Ok(Ok(navigation)) => navigation,
            Ok(Err(e)) => {
                self.navigation_failed(url, &e.to_string());
                return ControlFlow::Continue(());
            }
            Err(_) => {
                let reason = format!("Timed out after {:?}", self.navigation_timeout);
                self.navigation_failed(url, &reason);
                return ControlFlow::Continue(());
            }
        };

        if let Some(status) = navigation.status {
            self.detect(|detector, ctx| detector.navigation_status(url, status, ctx));
        } else {
            self.checked.mark(url);
        }

        if !navigation.ok() {
            debug!("{} answered {:?}, skipping extraction", url, navigation.status);
            self.drain_signals();
            return ControlFlow::Continue(());
        }

        match page.extract_images().await {
            Ok(images) => self.detect(|detector, ctx| detector.images(&images, ctx)),
            Err(e) => warn!("Image inspection failed on {}: {}", url, e),
        }

        self.drain_signals();

        match page.extract_links().await {
            Ok(links) => {
                let mut queued = 0;
                for link in links {
                    let Ok(target) = normalize_url(&link.href) else {
                        continue;
                    };
                    if !self.detector.is_same_origin(&target) {
                        if !self.check_external_links {
                            continue;
                        }
                        if self.detector.rules().is_hostile_external_domain(&target) {
                            debug!("Skipping external link to hostile domain {}", target);
                            continue;
                        }
                    }
                    let reference = LinkReference::new(url, link.text, link.context);
                    if self.discover(&target, reference) {
                        queued += 1;
                    }
                }
                debug!("Queued {} new URLs from {}", queued, url);
            }
            Err(e) => warn!("Link extraction failed on {}: {}", url, e),
        }

        ControlFlow::Continue(())
    }

    fn navigation_failed(&mut self, url: &str, reason: &str) {
        warn!("Navigation to {} failed: {}", url, reason);
        self.emitter
            .log(format!("Navigation error: {} | Page: {}", reason, url));
        self.detect(|detector, ctx| detector.navigation_failed(url, ctx));
    }

    async fn check_existence(&mut self, url: &str, cancel: &CancellationToken) -> ControlFlow<()> {
        if !self.frontier.mark_checked(url) || self.checked.is_checked(url) {
            return ControlFlow::Continue(());
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return ControlFlow::Break(()),
            result = self.probe.head_status(url, self.head_timeout) => result,
        };

        match result {
            Ok(status) => {
                debug!("HEAD {} -> {}", url, status);
                self.detect(|detector, ctx| detector.existence_status(url, status, ctx));
            }
            Err(e) => {
                warn!("Existence check for {} failed: {}", url, e);
                self.emitter
                    .log(format!("Could not check {}: {}", url, e));
            }
        }
        ControlFlow::Continue(())
    }

    /// Registers a reference to `url` and queues it. Returns `true` when the
    /// URL entered the frontier for the first time.
    fn discover(&mut self, url: &str, reference: LinkReference) -> bool {
        if self.registry.register(url, reference.clone()) {
            self.detect(|detector, ctx| {
                detector.late_referrer(url, &reference, ctx).into_iter().collect()
            });
        }
        self.frontier.push(url)
    }

    /// Processes every page signal posted since the last drain.
    fn drain_signals(&mut self) {
        while let Ok(signal) = self.signals.try_recv() {
            self.handle_signal(signal);
        }
    }

    fn handle_signal(&mut self, signal: PageSignal) {
        match signal {
            PageSignal::Response(response) => {
                self.detect(|detector, ctx| detector.response(&response, ctx));
            }
            PageSignal::RequestFailed(failure) => {
                if self.detector.is_same_origin(&failure.url) {
                    self.emitter.log(format!(
                        "Internal request failed: {} ({}) | Page: {}",
                        failure.url, failure.error_text, self.current_page
                    ));
                }
                self.detect(|detector, ctx| detector.request_failed(&failure, ctx));
            }
            PageSignal::Console(console) => {
                match console.level {
                    ConsoleLevel::Error => {
                        self.emitter.log(format!(
                            "Console error: {} | Page: {}",
                            console.text, self.current_page
                        ));
                    }
                    ConsoleLevel::Warning => {
                        debug!("Console warning on {}: {}", self.current_page, console.text);
                    }
                    ConsoleLevel::Info => {}
                }
                self.detect(|detector, ctx| detector.console(&console, ctx));
            }
            PageSignal::PageError(message) => {
                self.detect(|detector, ctx| detector.page_error(&message, ctx));
            }
        }
    }

    /// Runs one detector call against the session state and reports its findings.
    fn detect<F>(&mut self, run: F)
    where
        F: FnOnce(&Detector, &mut DetectionContext<'_>) -> Vec<Finding>,
    {
        let mut ctx = DetectionContext {
            registry: &self.registry,
            checked: &mut self.checked,
            current_page: &self.current_page,
        };
        let findings = run(&self.detector, &mut ctx);
        self.report_all(findings);
    }

    fn report_all(&mut self, findings: Vec<Finding>) {
        for finding in findings {
            self.report(finding);
        }
    }

    fn report(&mut self, finding: Finding) {
        match finding {
            Finding::BrokenLink(_) => self.broken_links += 1,
            Finding::BrokenImage(_) => self.broken_images += 1,
            Finding::ConsoleError(_) => self.console_errors += 1,
        }
        self.emitter.emit(CrawlEvent::from_finding(finding));
    }

    fn summary(&self, start_url: &str, outcome: CrawlOutcome) -> CrawlSummary {
        CrawlSummary {
            start_url: start_url.to_string(),
            pages_visited: self.frontier.pages_visited(),
            broken_links: self.broken_links,
            broken_images: self.broken_images,
            console_errors: self.console_errors,
            remaining_in_queue: self.frontier.len(),
            outcome,
        }
    }
}
