//! Web crawling for firmfacts enrichment.
//!
//! [`Crawler`] walks a company domain breadth-first over a priority-ranked
//! frontier; [`fetch::fetch_page`] retrieves single pages for tiers that
//! work from a fixed source list. Crawl attempts are logged to the
//! crawl-history repository, upserted by (job, url).

pub mod engine;
pub mod fetch;
pub mod robots;

pub use engine::{Crawler, root_url};
pub use fetch::{extract_links, extract_title, fetch_page, html_to_text};
pub use robots::{RobotsVerdict, is_fully_disallowed};
