pub mod browser;
pub mod chrome;
pub mod classify;
pub mod detect;
pub mod error;
pub mod frontier;
pub mod html;
pub mod http;
pub mod registry;
pub mod result;
pub mod sitemap;

pub use browser::{BrowserLauncher, BrowserPage, BrowserSession, PageSignal};
pub use chrome::ChromeLauncher;
pub use classify::DetectionRules;
pub use detect::Detector;
pub use error::ScanError;
pub use frontier::Frontier;
pub use http::HttpProbe;
pub use registry::LinkRegistry;
pub use result::{BrokenImage, BrokenLink, ConsoleError, Finding, LinkReference};
