pub mod crawl;
pub mod error;
pub mod event;
pub mod report;

pub use crawl::{CrawlOptions, CrawlOutcome, CrawlSummary, execute_crawl};
pub use error::CrawlError;
pub use event::{CrawlEvent, CrawlEventCallback};
