//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlStatus`: Where a URL is in the crawl process
//! - `UrlRecord`: Status, last HTTP status and prerequisite flag packed in a `u16`
//! - `Frontier`: Every known URL with its record, plus resumption properties

mod frontier;
mod url_status;

pub use frontier::Frontier;
pub use url_status::{UrlRecord, UrlStatus};
