use linkscout_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Invalid start URL: {0}")]
    InvalidStartUrl(String),

    #[error("Invalid sitemap URL: {0}")]
    InvalidSitemapUrl(String),

    #[error("Browser session failed: {0}")]
    Session(#[source] ScanError),

    #[error("Failed to load detection rules: {0}")]
    Rules(#[source] ScanError),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
