use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("linkscout")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("linkscout")
        .about("Crawls a site in a real browser and reports broken links, images and script errors")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Only print findings and the final report")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log per-URL decisions to stderr (RUST_LOG overrides)")
                .required(false)
                .global(true)
                .conflicts_with("quiet"),
        )
        .subcommand_required(true)
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl every same-origin page reachable from a start URL and report what is \
                broken.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The start URL. Its origin bounds the crawl"),
                )
                .arg(
                    arg!(-s --"sitemap" <URL>)
                        .required(false)
                        .help(
                            "A sitemap (or sitemap index) whose same-origin entries seed the queue",
                        ),
                )
                .arg(
                    arg!(-m --"max-pages" <NUM>)
                        .required(false)
                        .help("Stop after navigating this many pages")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1000"),
                )
                .arg(
                    arg!(-b --"batch-size" <NUM>)
                        .required(false)
                        .help("Pages visited per batch before progress is reported")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("100"),
                )
                .arg(
                    arg!(--"nav-timeout" <SECONDS>)
                        .required(false)
                        .help("Page navigation timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(--"head-timeout" <SECONDS>)
                        .required(false)
                        .help("Existence check (HEAD) timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"check-external")
                        .required(false)
                        .help("Also existence-check links to other origins (never navigated)")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-r --"rules" <PATH>)
                        .required(false)
                        .help("JSON file overriding the built-in detection rules"),
                )
                .arg(
                    arg!(--"headful")
                        .required(false)
                        .help("Show the browser window")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"chrome" <PATH>)
                        .required(false)
                        .help("Path to the Chrome/Chromium executable")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Output format: text, or json for one event per line")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save the final report to a file")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            command!("rules").about(
                "Print the built-in detection rules as JSON, as a starting point for --rules",
            ),
        )
}
