// Crawl reports built from the summary and the findings collected from the event stream

use crate::crawl::{CrawlOutcome, CrawlSummary};
use colored::Colorize;
use linkscout_scanner::result::{BrokenImage, BrokenLink, ConsoleError, Finding};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use url::Url;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Same-origin targets are shown by path, everything else in full.
fn display_target(page: &str, target: &str) -> String {
    match (Url::parse(page), Url::parse(target)) {
        (Ok(page), Ok(target)) if page.origin() == target.origin() => {
            extract_url_path(target.as_str())
        }
        _ => target.to_string(),
    }
}

fn colored_status(status: u16) -> String {
    match status {
        0 => "ERR".red().bold().to_string(),
        400..=499 => status.to_string().yellow().to_string(),
        500..=599 => status.to_string().red().to_string(),
        _ => status.to_string(),
    }
}

fn outcome_label(outcome: CrawlOutcome) -> &'static str {
    match outcome {
        CrawlOutcome::Completed => "Completed",
        CrawlOutcome::PageLimitReached => "Stopped at page limit",
        CrawlOutcome::Stopped => "Stopped by user",
    }
}

/// Renders a text report with findings grouped by the page they were found on.
pub fn generate_crawl_report(summary: &CrawlSummary, findings: &[Finding]) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Start URL: {}\n", summary.start_url));
    report.push_str(&format!("  Outcome: {}\n", outcome_label(summary.outcome)));
    report.push_str(&format!("  Pages crawled: {}\n", summary.pages_visited));
    report.push_str(&format!("  Broken links: {}\n", summary.broken_links));
    report.push_str(&format!("  Broken images: {}\n", summary.broken_images));
    report.push_str(&format!("  Console errors: {}\n", summary.console_errors));
    if summary.remaining_in_queue > 0 {
        report.push_str(&format!(
            "  URLs left in queue: {}\n",
            summary.remaining_in_queue
        ));
    }
    report.push('\n');
    report.push_str(RULE);
    report.push('\n');

    if findings.is_empty() {
        report.push_str(&format!("{}\n", "No problems found.".green()));
        return report;
    }

    // BTreeMap keeps pages in a stable order
    let mut by_page: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
    for finding in findings {
        by_page.entry(finding.page()).or_default().push(finding);
    }

    for (page, page_findings) in &by_page {
        report.push_str(&format!("## {}\n", page.bold()));
        report.push_str(&format!("  {} problems found\n\n", page_findings.len()));

        for finding in page_findings {
            match finding {
                Finding::BrokenLink(link) => {
                    report.push_str(&format!(
                        "  {} {} {}\n",
                        colored_status(link.status_code),
                        display_target(page, &link.url),
                        format!("\"{}\" in {}", link.link_text, link.element_context).dimmed()
                    ));
                }
                Finding::BrokenImage(image) => {
                    report.push_str(&format!(
                        "  {} {} {}\n",
                        "IMG".magenta(),
                        display_target(page, &image.src),
                        image.reason.dimmed()
                    ));
                }
                Finding::ConsoleError(error) => {
                    report.push_str(&format!(
                        "  {} {}\n",
                        "JS ".cyan(),
                        error.message
                    ));
                }
            }
        }
        report.push('\n');
    }

    report
}

/// Renders the summary and all findings as pretty-printed JSON.
pub fn generate_json_report(
    summary: &CrawlSummary,
    findings: &[Finding],
) -> Result<String, serde_json::Error> {
    let mut broken_links: Vec<&BrokenLink> = Vec::new();
    let mut broken_images: Vec<&BrokenImage> = Vec::new();
    let mut console_errors: Vec<&ConsoleError> = Vec::new();
    for finding in findings {
        match finding {
            Finding::BrokenLink(link) => broken_links.push(link),
            Finding::BrokenImage(image) => broken_images.push(image),
            Finding::ConsoleError(error) => console_errors.push(error),
        }
    }

    let json_report = serde_json::json!({
        "generator": "Linkscout",
        "version": env!("CARGO_PKG_VERSION"),
        "generatedAt": chrono::Utc::now().to_rfc3339(),
        "summary": summary,
        "brokenLinks": broken_links,
        "brokenImages": broken_images,
        "consoleErrors": console_errors,
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
