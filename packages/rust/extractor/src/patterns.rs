//! Pattern extraction for financial filing sections.
//!
//! Each section type keys its own pattern set: properties sections yield
//! facility and employee-count candidates, business sections yield
//! description and product candidates, subsidiary listings yield
//! subsidiary names. Per-section failures are recorded and skipped; the
//! remaining sections continue.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use firmfacts_filings::{FilingSection, SectionType};
use firmfacts_shared::{ExtractionMethod, FactData, FactType};

use crate::confidence;
use crate::ExtractedFact;

/// Output of one extraction pass over a set of sections.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Facts at or above the confidence threshold.
    pub facts: Vec<ExtractedFact>,
    /// Mean confidence of the kept facts.
    pub average_confidence: f64,
    /// Per-section failures (skipped, not fatal).
    pub errors: Vec<String>,
}

/// Extract typed facts from filing sections, dropping candidates below
/// `confidence_threshold`.
pub fn extract_from_sections(
    sections: &[FilingSection],
    confidence_threshold: f64,
) -> Extraction {
    let mut extraction = Extraction::default();

    for section in sections {
        if section.text.trim().is_empty() {
            extraction
                .errors
                .push(format!("{}: empty section", section.source_url));
            continue;
        }

        let candidates = match section.section_type {
            SectionType::Properties => extract_properties(section),
            SectionType::Business => extract_business(section),
            SectionType::Subsidiaries => extract_subsidiaries(section),
            SectionType::Mdna => extract_financials(section),
            SectionType::RiskFactors | SectionType::LegalProceedings | SectionType::Other => {
                extract_geography(section)
            }
        };

        debug!(
            section = ?section.section_type,
            candidates = candidates.len(),
            "section extracted"
        );
        extraction.facts.extend(candidates);
    }

    extraction
        .facts
        .retain(|f| f.confidence >= confidence_threshold);
    extraction.average_confidence =
        confidence::average(extraction.facts.iter().map(|f| f.confidence));
    extraction
}

fn candidate(
    section: &FilingSection,
    fact_type: FactType,
    fact_data: FactData,
    evidence: String,
) -> ExtractedFact {
    let confidence = confidence::score(ExtractionMethod::Regex, &evidence, &fact_data.value_text());
    ExtractedFact {
        fact_type,
        fact_data,
        confidence,
        source_url: section.source_url.clone(),
        source_text: evidence,
        method: ExtractionMethod::Regex,
    }
}

/// Evidence snippet: the match with surrounding context, clamped to char
/// boundaries.
fn evidence(text: &str, start: usize, end: usize) -> String {
    const CONTEXT: usize = 150;

    let mut from = start.saturating_sub(CONTEXT);
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + CONTEXT).min(text.len());
    while to < text.len() && !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].trim().to_string()
}

// ---------------------------------------------------------------------------
// Properties: facilities and employee counts
// ---------------------------------------------------------------------------

fn extract_properties(section: &FilingSection) -> Vec<ExtractedFact> {
    static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
        // Case-insensitivity is scoped to the keywords; place names must
        // stay capitalized or the capture runs into the surrounding prose.
        Regex::new(
            r"(?i:headquarters|headquartered|principal executive offices|principal offices|facilities|offices)\s+(?i:are\s+|is\s+)?(?i:located\s+)?(?i:in)\s+([A-Z][A-Za-z]*(?:\s[A-Z][A-Za-z]*)*(?:,\s*[A-Z][A-Za-z]*(?:\s[A-Z][A-Za-z]*)*)?)",
        )
        .expect("valid regex")
    });

    let mut facts = Vec::new();

    for caps in LOCATION_RE.captures_iter(&section.text) {
        let m = caps.get(0).expect("match");
        let location = caps[1].trim().trim_end_matches('.').to_string();
        facts.push(candidate(
            section,
            FactType::Facility,
            FactData::Facility {
                name: None,
                location,
            },
            evidence(&section.text, m.start(), m.end()),
        ));
    }

    facts.extend(extract_employee_counts(section));
    facts
}

fn extract_employee_counts(section: &FilingSection) -> Vec<ExtractedFact> {
    static EMPLOYEES_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)(?:approximately|about|over|more than)?\s*([\d,]{2,})\s+(?:full-time\s+|part-time\s+)?employees",
        )
        .expect("valid regex")
    });

    let mut facts = Vec::new();
    for caps in EMPLOYEES_RE.captures_iter(&section.text) {
        let m = caps.get(0).expect("match");
        let Ok(count) = caps[1].replace(',', "").parse::<u64>() else {
            continue;
        };
        facts.push(candidate(
            section,
            FactType::EmployeeCount,
            FactData::EmployeeCount { count },
            evidence(&section.text, m.start(), m.end()),
        ));
    }
    facts
}

// ---------------------------------------------------------------------------
// Business: description and products
// ---------------------------------------------------------------------------

fn extract_business(section: &FilingSection) -> Vec<ExtractedFact> {
    static PRODUCTS_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)products\s+(?:include|such as)\s+([^.]{3,160})").expect("valid regex")
    });

    let mut facts = Vec::new();

    // The opening sentences of the business section describe the company.
    if let Some(description) = leading_sentences(&section.text, 2) {
        if description.len() > 40 {
            let ev = description.clone();
            facts.push(candidate(
                section,
                FactType::BusinessDescription,
                FactData::BusinessDescription { description },
                ev,
            ));
        }
    }

    for caps in PRODUCTS_RE.captures_iter(&section.text) {
        let m = caps.get(0).expect("match");
        let ev = evidence(&section.text, m.start(), m.end());
        for product in split_listing(&caps[1]) {
            facts.push(candidate(
                section,
                FactType::Product,
                FactData::Product { name: product },
                ev.clone(),
            ));
        }
    }

    facts.extend(extract_employee_counts(section));
    facts
}

/// First `n` sentence-like units after the section heading line.
fn leading_sentences(text: &str, n: usize) -> Option<String> {
    static SENT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[A-Z][^.!?]{20,400}[.!?]").expect("valid regex"));

    let sentences: Vec<&str> = SENT_RE
        .find_iter(text)
        .take(n)
        .map(|m| m.as_str())
        .collect();
    if sentences.is_empty() {
        None
    } else {
        Some(sentences.join(" "))
    }
}

/// Split a comma/and-separated listing into trimmed items.
fn split_listing(listing: &str) -> Vec<String> {
    listing
        .split(&[',', ';'][..])
        .flat_map(|part| part.split(" and "))
        .map(|item| item.trim().trim_start_matches("and ").trim().to_string())
        .filter(|item| item.len() > 2 && item.len() < 80)
        .collect()
}

// ---------------------------------------------------------------------------
// Subsidiaries
// ---------------------------------------------------------------------------

fn extract_subsidiaries(section: &FilingSection) -> Vec<ExtractedFact> {
    static SUBSIDIARY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"([A-Z][A-Za-z0-9&.\- ]{2,60}?(?:Inc|Corp|Corporation|LLC|Ltd|GmbH|K\.K|S\.A|B\.V|Pty)\.?)",
        )
        .expect("valid regex")
    });

    let mut facts = Vec::new();
    for m in SUBSIDIARY_RE.find_iter(&section.text) {
        let name = m.as_str().trim().to_string();
        facts.push(candidate(
            section,
            FactType::Subsidiary,
            FactData::Subsidiary { name },
            evidence(&section.text, m.start(), m.end()),
        ));
    }
    facts
}

// ---------------------------------------------------------------------------
// Financial metrics and geography
// ---------------------------------------------------------------------------

fn extract_financials(section: &FilingSection) -> Vec<ExtractedFact> {
    static REVENUE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)(?:revenues?|net sales)\s+(?:of|were|totaled|increased to|decreased to)\s+\$\s?([\d,.]+\s*(?:million|billion))",
        )
        .expect("valid regex")
    });

    let mut facts = Vec::new();
    for caps in REVENUE_RE.captures_iter(&section.text) {
        let m = caps.get(0).expect("match");
        facts.push(candidate(
            section,
            FactType::Financial,
            FactData::Financial {
                metric: "revenue".into(),
                value: format!("${}", caps[1].trim()),
            },
            evidence(&section.text, m.start(), m.end()),
        ));
    }

    facts.extend(extract_geography(section));
    facts
}

fn extract_geography(section: &FilingSection) -> Vec<ExtractedFact> {
    static GEO_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i:operations)\s+(?i:in)\s+([A-Z][A-Za-z ]+(?:,\s*[A-Z][A-Za-z ]+)*(?:,?\s+and\s+[A-Z][A-Za-z ]+)?)")
            .expect("valid regex")
    });

    let mut facts = Vec::new();
    for caps in GEO_RE.captures_iter(&section.text) {
        let m = caps.get(0).expect("match");
        let ev = evidence(&section.text, m.start(), m.end());
        for region in split_listing(&caps[1]) {
            facts.push(candidate(
                section,
                FactType::Geography,
                FactData::Geography { region },
                ev.clone(),
            ));
        }
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(section_type: SectionType, text: &str) -> FilingSection {
        FilingSection {
            section_type,
            title: "Test".into(),
            text: text.into(),
            source_url: "https://example.com/10k.htm".into(),
        }
    }

    #[test]
    fn properties_yield_facility_and_employee_count() {
        let text = "Item 2. Properties. Our corporate headquarters are located in \
                    Austin, Texas and occupy 300,000 square feet. As of year end we \
                    had approximately 4,200 full-time employees across all locations.";
        let extraction = extract_from_sections(&[section(SectionType::Properties, text)], 0.0);

        let types: Vec<FactType> = extraction.facts.iter().map(|f| f.fact_type).collect();
        assert!(types.contains(&FactType::Facility));
        assert!(types.contains(&FactType::EmployeeCount));

        let employees = extraction
            .facts
            .iter()
            .find(|f| f.fact_type == FactType::EmployeeCount)
            .unwrap();
        match &employees.fact_data {
            FactData::EmployeeCount { count } => assert_eq!(*count, 4_200),
            other => panic!("unexpected data: {other:?}"),
        }

        let facility = extraction
            .facts
            .iter()
            .find(|f| f.fact_type == FactType::Facility)
            .unwrap();
        match &facility.fact_data {
            FactData::Facility { location, .. } => assert!(location.starts_with("Austin")),
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn business_yields_description_and_products() {
        let text = "Item 1. Business. The Company designs and manufactures industrial \
                    robots for automotive assembly lines worldwide. Our products include \
                    welding arms, conveyor controllers, and vision systems. We sell \
                    through a global distributor network.";
        let extraction = extract_from_sections(&[section(SectionType::Business, text)], 0.0);

        assert!(
            extraction
                .facts
                .iter()
                .any(|f| f.fact_type == FactType::BusinessDescription)
        );
        let products: Vec<String> = extraction
            .facts
            .iter()
            .filter(|f| f.fact_type == FactType::Product)
            .map(|f| f.fact_data.value_text())
            .collect();
        assert!(products.iter().any(|p| p.contains("welding arms")));
        assert!(products.iter().any(|p| p.contains("vision systems")));
    }

    #[test]
    fn subsidiaries_extracts_entity_names() {
        let text = "Subsidiaries of the Registrant: Acme Europe GmbH, Acme Japan K.K., \
                    Acme Holdings Ltd. and Acme Robotics Inc.";
        let extraction = extract_from_sections(&[section(SectionType::Subsidiaries, text)], 0.0);

        let names: Vec<String> = extraction
            .facts
            .iter()
            .map(|f| f.fact_data.value_text())
            .collect();
        assert!(names.iter().any(|n| n.contains("Acme Europe GmbH")));
        assert!(names.iter().any(|n| n.contains("Acme Robotics Inc")));
    }

    #[test]
    fn mdna_yields_revenue_and_geography() {
        let text = "Item 7. Management's Discussion. Net sales were $2,350 million for \
                    the year, driven by our operations in Germany, Brazil, and Japan.";
        let extraction = extract_from_sections(&[section(SectionType::Mdna, text)], 0.0);

        let revenue = extraction
            .facts
            .iter()
            .find(|f| f.fact_type == FactType::Financial)
            .expect("revenue fact");
        assert!(revenue.fact_data.value_text().contains("$2,350 million"));

        let regions: Vec<String> = extraction
            .facts
            .iter()
            .filter(|f| f.fact_type == FactType::Geography)
            .map(|f| f.fact_data.value_text())
            .collect();
        assert!(regions.iter().any(|r| r == "Germany"));
        assert!(regions.iter().any(|r| r == "Japan"));
    }

    #[test]
    fn threshold_drops_low_confidence_candidates() {
        // Short evidence, non-numeric value: regex base 0.7 + 0.1 (evidence
        // just over 100 chars) = 0.8 for the facility; threshold above that
        // drops everything.
        let text = "Item 2. Properties. Our headquarters are located in Lisbon and we \
                    lease additional space for engineering nearby teams.";
        let all = extract_from_sections(&[section(SectionType::Properties, text)], 0.0);
        assert!(!all.facts.is_empty());

        let filtered = extract_from_sections(&[section(SectionType::Properties, text)], 0.95);
        assert!(filtered.facts.is_empty());
        assert_eq!(filtered.average_confidence, 0.0);
    }

    #[test]
    fn empty_section_is_recorded_as_error() {
        let extraction = extract_from_sections(&[section(SectionType::Business, "  ")], 0.0);
        assert_eq!(extraction.errors.len(), 1);
        assert!(extraction.facts.is_empty());
    }

    #[test]
    fn confidence_reflects_evidence_length() {
        let long_text = format!(
            "Item 2. Properties. Our headquarters are located in Austin, Texas. {}",
            "The facility supports manufacturing and research operations. ".repeat(5)
        );
        let extraction =
            extract_from_sections(&[section(SectionType::Properties, &long_text)], 0.0);
        let facility = extraction
            .facts
            .iter()
            .find(|f| f.fact_type == FactType::Facility)
            .unwrap();
        // regex base 0.7 + both evidence-length bonuses
        assert!(facility.confidence > 0.85);
    }
}
