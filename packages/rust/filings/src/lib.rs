//! Filing retrieval for firmfacts tier 1 enrichment.
//!
//! [`FilingsClient`] resolves a company against an EDGAR-style filing
//! index and retrieves recent filing documents; [`sections`] slices a
//! document into typed sections for pattern extraction.

pub mod client;
pub mod sections;

pub use client::{CompanyRef, FilingDocument, FilingRef, FilingsClient};
pub use sections::{FilingSection, SectionType, split_sections, strip_html};
