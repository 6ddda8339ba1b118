// Tests for the crawl driver against a scripted browser

mod common;

use common::{FakeSite, image, recorder};
use linkscout_core::crawl::{CrawlOptions, CrawlOutcome, execute_crawl};
use linkscout_core::{CrawlError, CrawlEvent};
use linkscout_scanner::browser::{
    ConsoleLevel, ConsoleSignal, PageSignal, RequestKind, ResponseSignal,
};
use linkscout_scanner::result::{BrokenImage, BrokenLink, ConsoleErrorKind};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn broken_links(events: &[CrawlEvent]) -> Vec<BrokenLink> {
    events
        .iter()
        .filter_map(|e| match e {
            CrawlEvent::BrokenLink { data, .. } => Some(data.clone()),
            _ => None,
        })
        .collect()
}

fn broken_images(events: &[CrawlEvent]) -> Vec<BrokenImage> {
    events
        .iter()
        .filter_map(|e| match e {
            CrawlEvent::BrokenImage { data, .. } => Some(data.clone()),
            _ => None,
        })
        .collect()
}

fn assert_single_terminal_done(events: &[CrawlEvent]) {
    let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminals.len(), 1, "expected exactly one terminal event");
    assert!(matches!(events.last(), Some(CrawlEvent::Done { .. })));
}

async fn crawl(
    site: &FakeSite,
    options: CrawlOptions,
) -> (linkscout_core::CrawlSummary, Vec<CrawlEvent>) {
    let (callback, events) = recorder();
    let summary = execute_crawl(options, site, Some(callback), CancellationToken::new())
        .await
        .unwrap();
    let events = events.lock().unwrap().clone();
    (summary, events)
}

// ============================================================================
// Attribution
// ============================================================================

#[tokio::test]
async fn test_broken_page_reported_once_per_referrer() {
    let site = FakeSite::new()
        .page(
            "https://ex.com/",
            &[
                ("https://ex.com/about", "About"),
                ("https://ex.com/missing", "Missing page"),
            ],
        )
        .page("https://ex.com/about", &[("https://ex.com/missing", "Old link")])
        .status("https://ex.com/missing", 404);

    let (summary, events) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    let links = broken_links(&events);
    assert_eq!(links.len(), 2);
    assert!(links.iter().all(|l| l.url == "https://ex.com/missing"));
    assert!(links.iter().all(|l| l.status_code == 404));
    assert_eq!(links[0].found_on_page, "https://ex.com/");
    assert_eq!(links[0].link_text, "Missing page");
    assert_eq!(links[0].element_context, "main");
    assert_eq!(links[1].found_on_page, "https://ex.com/about");
    assert_eq!(links[1].link_text, "Old link");

    assert_eq!(summary.broken_links, 2);
    assert_eq!(summary.pages_visited, 3);
    assert_eq!(summary.outcome, CrawlOutcome::Completed);
    assert_single_terminal_done(&events);
}

#[tokio::test]
async fn test_referrer_found_after_target_was_visited() {
    let site = FakeSite::new()
        .page(
            "https://ex.com/",
            &[
                ("https://ex.com/missing", "Missing"),
                ("https://ex.com/b", "B"),
            ],
        )
        .page("https://ex.com/b", &[("https://ex.com/c", "C")])
        .page("https://ex.com/c", &[("https://ex.com/missing", "Also missing")])
        .status("https://ex.com/missing", 410);

    let (_, events) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    let links = broken_links(&events);
    let sources: Vec<_> = links.iter().map(|l| l.found_on_page.as_str()).collect();
    assert_eq!(sources, vec!["https://ex.com/", "https://ex.com/c"]);
    assert!(links.iter().all(|l| l.status_code == 410));
}

#[tokio::test]
async fn test_broken_page_links_are_not_followed() {
    let site = FakeSite::new()
        .page("https://ex.com/", &[("https://ex.com/gone", "Gone")])
        .page("https://ex.com/gone", &[("https://ex.com/hidden", "Hidden")])
        .status("https://ex.com/gone", 500);

    let (_, events) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    assert_eq!(
        site.state.visits(),
        vec!["https://ex.com/", "https://ex.com/gone"]
    );
    assert_eq!(broken_links(&events)[0].status_code, 500);
}

// ============================================================================
// Images, network and console signals
// ============================================================================

#[tokio::test]
async fn test_zero_width_image_reported() {
    let site = FakeSite::new().page("https://ex.com/", &[]).images(
        "https://ex.com/",
        vec![
            image("https://ex.com/broken.png", "Logo", 0, true),
            image("https://ex.com/fine.png", "Fine", 64, true),
        ],
    );

    let (summary, events) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    let images = broken_images(&events);
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].src, "https://ex.com/broken.png");
    assert_eq!(images[0].found_on_page, "https://ex.com/");
    assert_eq!(images[0].alt_text, "Logo");
    assert!(images[0].reason.contains("naturalWidth=0"));
    assert_eq!(summary.broken_images, 1);
}

#[tokio::test]
async fn test_image_on_two_pages_reported_once() {
    let broken = || vec![image("https://ex.com/broken.png", "Logo", 0, true)];
    let site = FakeSite::new()
        .page("https://ex.com/", &[("https://ex.com/about", "About")])
        .images("https://ex.com/", broken())
        .page("https://ex.com/about", &[])
        .images("https://ex.com/about", broken());

    let (_, events) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    assert_eq!(broken_images(&events).len(), 1);
}

#[tokio::test]
async fn test_failed_fetch_attributed_to_current_page() {
    let site = FakeSite::new().page("https://ex.com/", &[]).signals(
        "https://ex.com/",
        vec![
            PageSignal::Response(ResponseSignal {
                url: "https://ex.com/api/items".to_string(),
                status: 404,
                kind: RequestKind::Fetch,
                content_type: Some("application/json".to_string()),
            }),
            PageSignal::Response(ResponseSignal {
                url: "https://ex.com/app.js".to_string(),
                status: 404,
                kind: RequestKind::Script,
                content_type: None,
            }),
        ],
    );

    let (_, events) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    let links = broken_links(&events);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, "https://ex.com/api/items");
    assert_eq!(links[0].found_on_page, "https://ex.com/");
    assert_eq!(links[0].link_text, "Detected from network");
}

#[tokio::test]
async fn test_noisy_console_messages_never_become_findings() {
    let site = FakeSite::new().page("https://ex.com/", &[]).signals(
        "https://ex.com/",
        vec![
            PageSignal::Console(ConsoleSignal {
                level: ConsoleLevel::Error,
                text: "Access to https://ex.com/api 404 blocked by CORS policy".to_string(),
                source_url: None,
            }),
            PageSignal::Console(ConsoleSignal {
                level: ConsoleLevel::Error,
                text: "GET https://ex.com/img.png net::ERR_ABORTED 404".to_string(),
                source_url: None,
            }),
        ],
    );

    let (summary, events) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    assert!(broken_links(&events).is_empty());
    assert!(broken_images(&events).is_empty());
    assert_eq!(summary.total_findings(), 0);
}

#[tokio::test]
async fn test_console_and_page_errors_become_console_findings() {
    let site = FakeSite::new().page("https://ex.com/", &[]).signals(
        "https://ex.com/",
        vec![
            PageSignal::Console(ConsoleSignal {
                level: ConsoleLevel::Error,
                text: "Widget failed to initialise".to_string(),
                source_url: None,
            }),
            PageSignal::Console(ConsoleSignal {
                level: ConsoleLevel::Warning,
                text: "Deprecated API".to_string(),
                source_url: None,
            }),
            PageSignal::PageError("ReferenceError: foo is not defined".to_string()),
        ],
    );

    let (summary, events) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    let kinds: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            CrawlEvent::ConsoleError { data, .. } => Some(data.kind),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec![ConsoleErrorKind::Error, ConsoleErrorKind::JsError]);
    assert_eq!(summary.console_errors, 2);
    assert!(events.iter().any(|e| matches!(e, CrawlEvent::Log { message }
        if message.contains("Console error: Widget failed to initialise"))));
}

// ============================================================================
// Navigation failures
// ============================================================================

#[tokio::test]
async fn test_seed_navigation_timeout_logs_then_done() {
    let site = FakeSite::new().hanging("https://ex.com/");
    let mut options = CrawlOptions::new("https://ex.com/");
    options.navigation_timeout = Duration::from_millis(100);

    let (summary, events) = crawl(&site, options).await;

    assert!(events.iter().any(|e| matches!(e, CrawlEvent::Log { message }
        if message.contains("Navigation error") && message.contains("https://ex.com/"))));
    assert!(!events.iter().any(|e| matches!(e, CrawlEvent::Error { .. })));
    assert_single_terminal_done(&events);
    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.outcome, CrawlOutcome::Completed);
}

#[tokio::test]
async fn test_navigation_error_reported_as_zero_status() {
    let site = FakeSite::new()
        .page(
            "https://ex.com/",
            &[
                ("https://ex.com/dns", "Broken host"),
                ("https://ex.com/next", "Next"),
            ],
        )
        .failing("https://ex.com/dns", "net::ERR_NAME_NOT_RESOLVED")
        .page("https://ex.com/next", &[]);

    let (summary, events) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    let links = broken_links(&events);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, "https://ex.com/dns");
    assert_eq!(links[0].status_code, 0);
    assert_eq!(links[0].found_on_page, "https://ex.com/");
    // The batch carried on past the failure
    assert_eq!(summary.pages_visited, 3);
    assert!(site.state.visits().contains(&"https://ex.com/next".to_string()));
}

// ============================================================================
// Frontier and caps
// ============================================================================

#[tokio::test]
async fn test_cycles_visit_each_page_once() {
    let all = [
        ("https://ex.com/", "Home"),
        ("https://ex.com/a", "A"),
        ("https://ex.com/b", "B"),
    ];
    let site = FakeSite::new()
        .page("https://ex.com/", &all)
        .page("https://ex.com/a", &all)
        .page("https://ex.com/b", &all);

    let (summary, _) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    let visits = site.state.visits();
    let unique: HashSet<_> = visits.iter().collect();
    assert_eq!(visits.len(), 3);
    assert_eq!(unique.len(), 3);
    assert_eq!(summary.pages_visited, 3);
}

#[tokio::test]
async fn test_page_cap_stops_at_exactly_max_pages() {
    let urls: Vec<String> = (0..20).map(|i| format!("https://ex.com/p{}", i)).collect();
    let mut site = FakeSite::new();
    for (i, url) in urls.iter().enumerate() {
        let next: Vec<(&str, &str)> = urls
            .iter()
            .skip(i + 1)
            .take(3)
            .map(|u| (u.as_str(), "next"))
            .chain(std::iter::once((urls[0].as_str(), "home")))
            .collect();
        site = site.page(url, &next);
    }

    let mut options = CrawlOptions::new(urls[0].clone());
    options.max_pages = 5;
    options.batch_size = 2;

    let (summary, events) = crawl(&site, options).await;

    assert_eq!(site.state.visits().len(), 5);
    assert_eq!(summary.pages_visited, 5);
    assert_eq!(summary.outcome, CrawlOutcome::PageLimitReached);
    assert!(summary.remaining_in_queue > 0);
    assert!(events.iter().any(|e| matches!(e, CrawlEvent::Log { message }
        if message.starts_with("Batch finished"))));
    assert_single_terminal_done(&events);
}

#[tokio::test]
async fn test_off_origin_links_ignored_by_default() {
    let site = FakeSite::new().page(
        "https://ex.com/",
        &[("https://other.com/page", "Partner")],
    );

    let (summary, events) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    assert_eq!(site.state.visits(), vec!["https://ex.com/"]);
    assert_eq!(summary.total_findings(), 0);
    assert!(!events.iter().any(|e| e.message().contains("other.com")));
}

// ============================================================================
// HTTP collaborators
// ============================================================================

#[tokio::test]
async fn test_sitemap_entries_queued_same_origin_only() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let sitemap = format!(
        "<urlset><url><loc>{base}/from-sitemap</loc></url>\
         <url><loc>https://elsewhere.test/page</loc></url></urlset>"
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sitemap))
        .mount(&mock_server)
        .await;

    let start = format!("{base}/");
    let site = FakeSite::new()
        .page(&start, &[])
        .page(&format!("{base}/from-sitemap"), &[]);
    let options = CrawlOptions::new(start.clone()).with_sitemap(format!("{base}/sitemap.xml"));

    let (summary, events) = crawl(&site, options).await;

    assert_eq!(site.state.visits(), vec![start, format!("{base}/from-sitemap")]);
    assert_eq!(summary.pages_visited, 2);
    assert!(events.iter().any(|e| matches!(e, CrawlEvent::Log { message }
        if message == "Added 1 URLs from sitemap")));
}

#[tokio::test]
async fn test_unreachable_sitemap_is_logged_and_crawl_continues() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let start = format!("{}/", mock_server.uri());
    let site = FakeSite::new().page(&start, &[]);
    let options =
        CrawlOptions::new(start.clone()).with_sitemap(format!("{}/sitemap.xml", mock_server.uri()));

    let (summary, events) = crawl(&site, options).await;

    assert!(events.iter().any(|e| matches!(e, CrawlEvent::Log { message }
        if message.starts_with("Failed to load sitemap"))));
    assert_eq!(summary.pages_visited, 1);
    assert_single_terminal_done(&events);
}

#[tokio::test]
async fn test_documents_are_existence_checked_not_navigated() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    Mock::given(method("HEAD"))
        .and(path("/files/report.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/files/ok.pdf"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let start = format!("{base}/");
    let report = format!("{base}/files/report.pdf");
    let ok = format!("{base}/files/ok.pdf");
    let site = FakeSite::new().page(&start, &[(&report, "Annual report"), (&ok, "Price list")]);

    let (summary, events) = crawl(&site, CrawlOptions::new(start.clone())).await;

    assert_eq!(site.state.visits(), vec![start.clone()]);
    let links = broken_links(&events);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, report);
    assert_eq!(links[0].status_code, 404);
    assert_eq!(links[0].found_on_page, start);
    assert_eq!(links[0].link_text, "Annual report");
    // Existence checks do not count as page visits
    assert_eq!(summary.pages_visited, 1);
}

#[tokio::test]
async fn test_external_links_checked_when_enabled() {
    let site_server = MockServer::start().await;
    let external = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&external)
        .await;

    let start = format!("{}/", site_server.uri());
    let gone = format!("{}/gone", external.uri());
    let site = FakeSite::new().page(
        &start,
        &[(&gone, "Partner"), ("https://www.facebook.com/ex", "Follow us")],
    );

    let mut options = CrawlOptions::new(start.clone());
    options.check_external_links = true;
    let (_, events) = crawl(&site, options).await;

    let links = broken_links(&events);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, gone);
    assert_eq!(links[0].found_on_page, start);
    assert!(!events.iter().any(|e| e.message().contains("facebook.com")));
    assert_eq!(site.state.visits(), vec![start]);
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_invalid_start_url_rejected_before_launch() {
    let site = FakeSite::new();
    let (callback, events) = recorder();

    let result = execute_crawl(
        CrawlOptions::new("not a url"),
        &site,
        Some(callback),
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(CrawlError::InvalidStartUrl(_))));
    assert!(events.lock().unwrap().is_empty());
    assert!(site.state.visits().is_empty());
}

#[tokio::test]
async fn test_launch_failure_emits_single_error_event() {
    let site = FakeSite::new().launch_error("chromium not found");
    let (callback, events) = recorder();

    let result = execute_crawl(
        CrawlOptions::new("https://ex.com/"),
        &site,
        Some(callback),
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(CrawlError::Session(_))));
    let events = events.lock().unwrap();
    assert!(matches!(events.last(), Some(CrawlEvent::Error { message })
        if message.contains("chromium not found")));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_cancellation_closes_session_and_ends_with_done() {
    let site = FakeSite::new().hanging("https://ex.com/");
    let (callback, events) = recorder();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let summary = execute_crawl(
        CrawlOptions::new("https://ex.com/"),
        &site,
        Some(callback),
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(summary.outcome, CrawlOutcome::Stopped);
    assert!(site.state.page_closed.load(Ordering::SeqCst));
    assert!(site.state.browser_closed.load(Ordering::SeqCst));

    let events = events.lock().unwrap();
    assert!(matches!(
        events.last(),
        Some(CrawlEvent::Done { message }) if message.contains("stopped")
    ));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_session_closed_after_normal_completion() {
    let site = FakeSite::new().page("https://ex.com/", &[]);

    let (summary, events) = crawl(&site, CrawlOptions::new("https://ex.com/")).await;

    assert_eq!(summary.outcome, CrawlOutcome::Completed);
    assert!(site.state.page_closed.load(Ordering::SeqCst));
    assert!(site.state.browser_closed.load(Ordering::SeqCst));
    assert!(matches!(events.first(), Some(CrawlEvent::Log { message })
        if message.starts_with("Starting crawler")));
    assert_single_terminal_done(&events);
}
