pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{crawl_options_from_args, exit_code, load_rules, parse_url_line, render_event};

// Re-export crawl functionality from linkscout-core
pub use linkscout_core::crawl::{CrawlOptions, CrawlSummary, execute_crawl};
pub use linkscout_core::report::{extract_url_path, generate_crawl_report};
