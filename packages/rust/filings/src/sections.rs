//! Filing document section splitting.
//!
//! Annual/quarterly filings are one long document with `Item N.` headings.
//! The splitter locates those headings, slices the text between them, and
//! types each section so the extractor can key its pattern set. Headings
//! repeated in a table of contents are disambiguated by keeping the longest
//! occurrence of each item.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Typed filing sections the extractor knows how to mine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionType {
    /// Item 1 — description of the business.
    Business,
    /// Item 1A — risk factors.
    RiskFactors,
    /// Item 2 — properties and facilities.
    Properties,
    /// Item 3 — legal proceedings.
    LegalProceedings,
    /// Item 7 — management's discussion and analysis.
    Mdna,
    /// Subsidiary listings (exhibit-style headings).
    Subsidiaries,
    Other,
}

impl SectionType {
    fn from_item(item: &str) -> Self {
        match item.to_uppercase().as_str() {
            "1" => Self::Business,
            "1A" => Self::RiskFactors,
            "2" => Self::Properties,
            "3" => Self::LegalProceedings,
            "7" => Self::Mdna,
            _ => Self::Other,
        }
    }
}

/// One typed slice of a filing document.
#[derive(Debug, Clone)]
pub struct FilingSection {
    pub section_type: SectionType,
    pub title: String,
    pub text: String,
    pub source_url: String,
}

/// Sections shorter than this are table-of-contents artifacts, not content.
const MIN_SECTION_LEN: usize = 100;

/// Split plain filing text into typed sections.
pub fn split_sections(text: &str, source_url: &str) -> Vec<FilingSection> {
    static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\bItem\s+(\d{1,2}A?)\s*[.:]").expect("valid regex")
    });
    static SUBS_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\bsubsidiaries of (the )?(registrant|company)\b").expect("valid regex")
    });

    // Locate every heading candidate with its byte offset.
    let mut headings: Vec<(usize, String)> = ITEM_RE
        .captures_iter(text)
        .map(|caps| {
            let m = caps.get(0).expect("match");
            (m.start(), caps[1].to_string())
        })
        .collect();
    if let Some(m) = SUBS_RE.find(text) {
        headings.push((m.start(), "SUBS".into()));
    }
    headings.sort_by_key(|(start, _)| *start);

    // Slice between consecutive headings; keep the longest slice per item
    // so table-of-contents mentions lose to the real section body.
    let mut best: HashMap<String, FilingSection> = HashMap::new();
    for (i, (start, item)) in headings.iter().enumerate() {
        let end = headings
            .get(i + 1)
            .map(|(next, _)| *next)
            .unwrap_or(text.len());
        let body = text[*start..end].trim();
        if body.len() < MIN_SECTION_LEN {
            continue;
        }

        let section_type = if item == "SUBS" {
            SectionType::Subsidiaries
        } else {
            SectionType::from_item(item)
        };

        let candidate = FilingSection {
            section_type,
            title: body.lines().next().unwrap_or("").trim().to_string(),
            text: body.to_string(),
            source_url: source_url.to_string(),
        };

        match best.get(item) {
            Some(existing) if existing.text.len() >= candidate.text.len() => {}
            _ => {
                best.insert(item.clone(), candidate);
            }
        }
    }

    let mut sections: Vec<FilingSection> = best.into_values().collect();
    sections.sort_by_key(|s| text.find(&s.text).unwrap_or(usize::MAX));
    sections
}

/// Strip HTML down to plain text: script/style blocks removed, tags
/// dropped, common entities decoded, whitespace collapsed.
pub fn strip_html(html: &str) -> String {
    static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex")
    });
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));

    let no_scripts = SCRIPT_RE.replace_all(html, " ");
    let no_tags = TAG_RE.replace_all(&no_scripts, " ");
    let decoded = no_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#8217;", "'")
        .replace("&quot;", "\"");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler(words: usize) -> String {
        vec!["filing"; words].join(" ")
    }

    fn sample_filing() -> String {
        format!(
            "Table of Contents Item 1. Business 4 Item 2. Properties 12 \
             Item 1. Business {business} \
             Item 1A. Risk Factors {risks} \
             Item 2. Properties {properties} \
             Item 3. Legal Proceedings {legal}",
            business = format!(
                "The Company designs and manufactures industrial robots. {}",
                filler(40)
            ),
            risks = format!("Our revenue depends on a small number of customers. {}", filler(40)),
            properties = format!(
                "Our corporate headquarters are located in Austin, Texas. {}",
                filler(40)
            ),
            legal = format!("We are party to various legal proceedings. {}", filler(40)),
        )
    }

    #[test]
    fn splits_typed_sections() {
        let sections = split_sections(&sample_filing(), "https://example.com/10k.htm");
        let types: Vec<SectionType> = sections.iter().map(|s| s.section_type).collect();
        assert!(types.contains(&SectionType::Business));
        assert!(types.contains(&SectionType::RiskFactors));
        assert!(types.contains(&SectionType::Properties));
        assert!(types.contains(&SectionType::LegalProceedings));
    }

    #[test]
    fn toc_mentions_lose_to_section_bodies() {
        let sections = split_sections(&sample_filing(), "https://example.com/10k.htm");
        let properties = sections
            .iter()
            .find(|s| s.section_type == SectionType::Properties)
            .expect("properties section");
        assert!(properties.text.contains("Austin, Texas"));
    }

    #[test]
    fn subsidiaries_heading_is_typed() {
        let text = format!(
            "Subsidiaries of the Registrant: Acme Europe GmbH (Germany), \
             Acme Japan K.K. (Japan) {}",
            filler(30)
        );
        let sections = split_sections(&text, "https://example.com/ex21.htm");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].section_type, SectionType::Subsidiaries);
    }

    #[test]
    fn short_fragments_are_dropped() {
        let sections = split_sections("Item 1. Business (see page 4)", "u");
        assert!(sections.is_empty());
    }

    #[test]
    fn strip_html_removes_markup() {
        let html = "<html><body><b>Item&nbsp;1.</b> Business<script>x()</script>\
                    <p>We make &amp; sell robots.</p></body></html>";
        let text = strip_html(html);
        assert_eq!(text, "Item 1. Business We make & sell robots.");
    }
}
