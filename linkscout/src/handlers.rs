use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use linkscout_core::crawl::{CrawlOptions, CrawlSummary, execute_crawl};
use linkscout_core::event::{CrawlEvent, CrawlEventCallback};
use linkscout_core::CrawlError;
use linkscout_core::report::{
    ReportFormat, generate_crawl_report, generate_json_report, save_report,
};
use linkscout_scanner::ChromeLauncher;
use linkscout_scanner::classify::DetectionRules;
use linkscout_scanner::result::Finding;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use url::Url;

/// The crawl ran and found nothing.
pub const EXIT_CLEAN: i32 = 0;
/// The crawl ran and reported at least one finding.
pub const EXIT_FINDINGS: i32 = 1;
/// The crawl could not run.
pub const EXIT_FAILURE: i32 = 2;

/// Logs go to stderr so stdout carries only events and reports.
pub fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse a start URL, adding https:// when the scheme is missing
pub fn parse_url_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
    {
        return Some(url.to_string());
    }

    let with_scheme = format!("https://{}", line);
    match Url::parse(&with_scheme) {
        Ok(url) if url.host_str().is_some() => Some(url.to_string()),
        _ => None,
    }
}

/// Replace the detection rules in `options` with a JSON file, expanding `~`
pub fn load_rules(options: CrawlOptions, path: &str) -> Result<CrawlOptions> {
    let expanded = shellexpand::tilde(path);
    let rules_path = Path::new(expanded.as_ref());
    options
        .with_rules_file(rules_path)
        .with_context(|| format!("Failed to load detection rules from {}", rules_path.display()))
}

/// Build crawl options from the `crawl` subcommand arguments
pub fn crawl_options_from_args(args: &ArgMatches) -> Result<CrawlOptions> {
    let raw_url = args
        .get_one::<String>("url")
        .context("--url is required")?;
    let start_url =
        parse_url_line(raw_url).with_context(|| format!("Invalid start URL '{}'", raw_url))?;

    let mut options = CrawlOptions::new(start_url);

    if let Some(sitemap) = args.get_one::<String>("sitemap") {
        let sitemap_url =
            parse_url_line(sitemap).with_context(|| format!("Invalid sitemap URL '{}'", sitemap))?;
        options = options.with_sitemap(sitemap_url);
    }
    if let Some(max_pages) = args.get_one::<usize>("max-pages") {
        options.max_pages = *max_pages;
    }
    if let Some(batch_size) = args.get_one::<usize>("batch-size") {
        options.batch_size = *batch_size;
    }
    if let Some(seconds) = args.get_one::<u64>("nav-timeout") {
        options.navigation_timeout = Duration::from_secs(*seconds);
    }
    if let Some(seconds) = args.get_one::<u64>("head-timeout") {
        options.head_timeout = Duration::from_secs(*seconds);
    }
    options.check_external_links = args.get_flag("check-external");

    if let Some(rules_path) = args.get_one::<String>("rules") {
        options = load_rules(options, rules_path)?;
    }

    Ok(options)
}

/// Format one event for the terminal. Returns `None` for events hidden in quiet mode.
pub fn render_event(event: &CrawlEvent, format: ReportFormat, quiet: bool) -> Option<String> {
    if format == ReportFormat::Json {
        return match event.to_json_line() {
            Ok(line) => Some(line),
            Err(e) => {
                warn!("Could not serialize event: {}", e);
                None
            }
        };
    }

    let line = match event {
        CrawlEvent::Log { message } => {
            if quiet {
                return None;
            }
            format!("{} {}", "[*]".blue(), message.dimmed())
        }
        CrawlEvent::BrokenLink { message, .. } => format!("{} {}", "[-]".red().bold(), message),
        CrawlEvent::BrokenImage { message, .. } => {
            format!("{} {}", "[-]".magenta().bold(), message)
        }
        CrawlEvent::ConsoleError { message, .. } => {
            format!("{} {}", "[!]".yellow().bold(), message)
        }
        CrawlEvent::Done { message } => format!("{} {}", "[+]".green().bold(), message),
        CrawlEvent::Error { message } => format!("{} {}", "[x]".red().bold(), message),
    };
    Some(line)
}

/// Map the crawl result to the process exit code
pub fn exit_code(result: &std::result::Result<CrawlSummary, CrawlError>) -> i32 {
    match result {
        Ok(summary) if summary.total_findings() > 0 => EXIT_FINDINGS,
        Ok(_) => EXIT_CLEAN,
        Err(_) => EXIT_FAILURE,
    }
}

fn progress_spinner(quiet: bool, format: ReportFormat) -> Option<ProgressBar> {
    if quiet || format == ReportFormat::Json {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Starting crawl...");
    Some(spinner)
}

pub async fn handle_crawl(args: &ArgMatches, quiet: bool) -> i32 {
    let options = match crawl_options_from_args(args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{} {:#}", "[x]".red().bold(), e);
            return EXIT_FAILURE;
        }
    };
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let output = args.get_one::<PathBuf>("output").cloned();

    let mut launcher = ChromeLauncher::new().with_headless(!args.get_flag("headful"));
    if let Some(chrome) = args.get_one::<PathBuf>("chrome") {
        launcher = launcher.with_executable(chrome.clone());
    }

    let spinner = progress_spinner(quiet, format);
    let findings: Arc<Mutex<Vec<Finding>>> = Arc::new(Mutex::new(Vec::new()));

    let callback: CrawlEventCallback = {
        let spinner = spinner.clone();
        let findings = findings.clone();
        Arc::new(move |event: CrawlEvent| {
            if let Some(finding) = event.finding()
                && let Ok(mut collected) = findings.lock()
            {
                collected.push(finding);
            }
            if let Some(ref spinner) = spinner
                && let CrawlEvent::Log { message } = &event
                && message.starts_with("Crawling")
            {
                spinner.set_message(message.clone());
            }
            let Some(line) = render_event(&event, format, quiet) else {
                return;
            };
            match spinner {
                Some(ref spinner) => spinner.suspend(|| println!("{}", line)),
                None => println!("{}", line),
            }
        })
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping crawl");
            interrupt.cancel();
        }
    });

    let result = execute_crawl(options, &launcher, Some(callback), cancel).await;

    if let Some(ref spinner) = spinner {
        spinner.finish_and_clear();
    }

    match result {
        Ok(ref summary) => {
            let findings = findings.lock().map(|f| f.clone()).unwrap_or_default();

            if format == ReportFormat::Text {
                println!();
                print!("{}", generate_crawl_report(summary, &findings));
            }

            if let Some(ref path) = output
                && let Err(e) = write_report(path, format, summary, &findings)
            {
                eprintln!("{} {:#}", "[x]".red().bold(), e);
            }
        }
        Err(ref e) => eprintln!("{} Crawl failed: {}", "[x]".red().bold(), e),
    }

    exit_code(&result)
}

/// Write the final report to `path` in the chosen format, without colour codes
pub fn write_report(
    path: &Path,
    format: ReportFormat,
    summary: &CrawlSummary,
    findings: &[Finding],
) -> Result<()> {
    let content = match format {
        ReportFormat::Json => generate_json_report(summary, findings)?,
        ReportFormat::Text => {
            colored::control::set_override(false);
            let report = generate_crawl_report(summary, findings);
            colored::control::unset_override();
            report
        }
    };
    save_report(&content, path)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

pub fn handle_rules() -> i32 {
    match serde_json::to_string_pretty(&DetectionRules::default()) {
        Ok(json) => {
            println!("{}", json);
            EXIT_CLEAN
        }
        Err(e) => {
            eprintln!("{} {}", "[x]".red().bold(), e);
            EXIT_FAILURE
        }
    }
}
