//! SEC EDGAR filing index.
//!
//! The submissions endpoint returns a company's recent filings as parallel
//! arrays (`form[i]`, `filingDate[i]`, ...), newest first. `EdgarClient`
//! flattens them into `FilingRecord` rows; the tables below turn a row into
//! a readable title and description.

use crate::config::WatchedCompany;
use crate::fetcher::HttpFetcher;
use crate::traits::{FilingIndex, FilingRecord};
use crate::types::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub const TRACKED_FORMS: &[&str] = &["8-K", "8-K/A", "10-Q", "10-Q/A", "10-K", "10-K/A", "S-1", "S-1/A"];

const WATCHLIST: &[(&str, u64, &str)] = &[
    ("VRTX", 875320, "Vertex Pharmaceuticals"),
    ("LEGN", 1801198, "Legend Biotech"),
    ("ACLX", 1786205, "Arcellx"),
    ("CRSP", 1674416, "CRISPR Therapeutics"),
    ("SGMO", 1001233, "Sangamo Therapeutics"),
    ("BEAM", 1745999, "Beam Therapeutics"),
    ("BLUE", 1597264, "bluebird bio"),
    ("MRNA", 1682852, "Moderna"),
    ("SRPT", 873303, "Sarepta Therapeutics"),
    ("NTLA", 1652130, "Intellia Therapeutics"),
    ("EDIT", 1650664, "Editas Medicine"),
    ("ALLO", 1737287, "Allogene Therapeutics"),
    ("LZAGY", 1311370, "Lonza Group"),
    ("CTLT", 1596783, "Catalent"),
    ("TMO", 97745, "Thermo Fisher Scientific"),
    ("DHR", 313616, "Danaher"),
    ("NBIX", 914475, "Neurocrine Biosciences"),
];

pub fn default_watchlist() -> Vec<WatchedCompany> {
    WATCHLIST
        .iter()
        .map(|(ticker, cik, company)| WatchedCompany {
            ticker: ticker.to_string(),
            cik: *cik,
            company: company.to_string(),
        })
        .collect()
}

pub fn is_tracked_form(form: &str) -> bool {
    TRACKED_FORMS.contains(&form)
}

pub fn is_event_form(form: &str) -> bool {
    form.starts_with("8-K")
}

pub fn item_description(code: &str) -> Option<&'static str> {
    let description = match code {
        "1.01" => "Entry into a Material Agreement",
        "1.02" => "Termination of a Material Agreement",
        "1.03" => "Bankruptcy or Receivership",
        "2.01" => "Completion of Acquisition or Disposition of Assets",
        "2.02" => "Results of Operations and Financial Condition",
        "2.03" => "Creation of a Direct Financial Obligation",
        "2.04" => "Triggering Events That Accelerate or Increase an Obligation",
        "2.05" => "Costs Associated with Exit or Disposal Activities",
        "2.06" => "Material Impairments",
        "3.01" => "Notice of Delisting or Transfer",
        "3.02" => "Unregistered Sales of Equity Securities",
        "3.03" => "Material Modification to Rights of Security Holders",
        "4.01" => "Changes in Registrant's Certifying Accountant",
        "4.02" => "Non-Reliance on Previously Issued Financial Statements",
        "5.01" => "Changes in Control of Registrant",
        "5.02" => "Departure/Election of Directors or Officers; Appointment of Officers",
        "5.03" => "Amendments to Articles of Incorporation or Bylaws",
        "5.05" => "Amendments to Code of Ethics",
        "5.07" => "Submission of Matters to a Vote of Security Holders",
        "7.01" => "Regulation FD Disclosure",
        "8.01" => "Other Events",
        "9.01" => "Financial Statements and Exhibits",
        _ => return None,
    };
    Some(description)
}

pub fn form_description(form: &str) -> Option<&'static str> {
    match form {
        "10-K" => Some("Annual report with full-year financials, business overview, and risk factors"),
        "10-K/A" => Some("Amendment to annual report"),
        "10-Q" => Some("Quarterly financial report"),
        "10-Q/A" => Some("Amendment to quarterly report"),
        "S-1" => Some("IPO or public offering registration statement"),
        "S-1/A" => Some("Amendment to registration statement"),
        _ => None,
    }
}

/// Splits an event-code list such as "2.02,9.01" into its codes.
pub fn parse_event_codes(raw: &str) -> Vec<&str> {
    raw.split(',').map(str::trim).filter(|c| !c.is_empty()).collect()
}

pub fn filing_url(cik: u64, accession_number: &str, primary_document: &str) -> String {
    format!(
        "https://www.sec.gov/Archives/edgar/data/{}/{}/{}",
        cik,
        accession_number.replace('-', ""),
        primary_document
    )
}

/// Title and description for one filing.
///
/// Event filings are headlined by their first code other than 9.01 (exhibits);
/// periodic and registration forms use the form description table.
pub fn describe_filing(company: &WatchedCompany, form: &str, filing_date: &str, raw_items: &str) -> (String, String) {
    let name = &company.company;
    let ticker = &company.ticker;

    if is_event_form(form) {
        let described: Vec<(&str, String)> = parse_event_codes(raw_items)
            .into_iter()
            .map(|code| match item_description(code) {
                Some(desc) => (code, format!("Item {}: {}", code, desc)),
                None => (code, format!("Item {}", code)),
            })
            .collect();

        let headline = described
            .iter()
            .find(|(code, _)| *code != "9.01")
            .or_else(|| described.first());

        return match headline {
            Some((code, label)) => {
                let short = item_description(code).map(str::to_string).unwrap_or_else(|| label.clone());
                let details: Vec<&str> = described.iter().map(|(_, label)| label.as_str()).collect();
                (
                    format!("{} ({}) \u{2014} {}: {}", name, ticker, form, short),
                    format!("{} filed {} on {}. {}.", name, form, filing_date, details.join("; ")),
                )
            }
            None => (
                format!("{} ({}) \u{2014} {}", name, ticker, form),
                format!("{} filed {} on {}.", name, form, filing_date),
            ),
        };
    }

    let form_desc = form_description(form).unwrap_or(form);
    (
        format!("{} ({}) \u{2014} {}: {}", name, ticker, form, form_desc),
        format!("{} filed {} on {}. {}.", name, form, filing_date, form_desc),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct Submissions {
    #[serde(default)]
    pub filings: SubmissionFilings,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionFilings {
    #[serde(default)]
    pub recent: RecentFilings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFilings {
    #[serde(default)]
    pub form: Vec<String>,
    #[serde(default)]
    pub filing_date: Vec<String>,
    #[serde(default)]
    pub accession_number: Vec<String>,
    #[serde(default)]
    pub primary_document: Vec<String>,
    #[serde(default)]
    pub items: Vec<String>,
}

impl Submissions {
    /// Zips the parallel arrays into rows. Missing trailing values become empty strings.
    pub fn into_records(self) -> Vec<FilingRecord> {
        let recent = self.filings.recent;
        let at = |values: &[String], i: usize| values.get(i).cloned().unwrap_or_default();

        (0..recent.form.len())
            .map(|i| FilingRecord {
                form: recent.form[i].clone(),
                filing_date: at(&recent.filing_date, i),
                accession_number: at(&recent.accession_number, i),
                primary_document: at(&recent.primary_document, i),
                items: at(&recent.items, i),
            })
            .collect()
    }
}

pub struct EdgarClient {
    fetcher: Arc<HttpFetcher>,
    base_url: String,
}

impl EdgarClient {
    /// `fetcher` should carry the contact user agent EDGAR requires.
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self {
            fetcher,
            base_url: "https://data.sec.gov/submissions".to_string(),
        }
    }
}

#[async_trait]
impl FilingIndex for EdgarClient {
    async fn recent_filings(&self, company: &WatchedCompany) -> Result<Vec<FilingRecord>> {
        let url = format!("{}/CIK{:010}.json", self.base_url, company.cik);
        debug!("Fetching filing index for {} from {}", company.ticker, url);

        let submissions: Submissions = self.fetcher.get_json(&url, &[]).await?;
        Ok(submissions.into_records())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moderna() -> WatchedCompany {
        WatchedCompany {
            ticker: "MRNA".to_string(),
            cik: 1682852,
            company: "Moderna".to_string(),
        }
    }

    #[test]
    fn event_filing_headline_skips_exhibits() {
        let (title, description) = describe_filing(&moderna(), "8-K", "2025-03-18", "9.01,2.02");
        assert_eq!(title, "Moderna (MRNA) \u{2014} 8-K: Results of Operations and Financial Condition");
        assert_eq!(
            description,
            "Moderna filed 8-K on 2025-03-18. Item 9.01: Financial Statements and Exhibits; \
             Item 2.02: Results of Operations and Financial Condition."
        );
    }

    #[test]
    fn periodic_forms_use_form_description() {
        let (title, _) = describe_filing(&moderna(), "10-Q", "2025-03-18", "");
        assert_eq!(title, "Moderna (MRNA) \u{2014} 10-Q: Quarterly financial report");
    }

    #[test]
    fn event_filing_without_codes() {
        let (title, description) = describe_filing(&moderna(), "8-K/A", "2025-03-18", "");
        assert_eq!(title, "Moderna (MRNA) \u{2014} 8-K/A");
        assert_eq!(description, "Moderna filed 8-K/A on 2025-03-18.");
    }

    #[test]
    fn submissions_flatten_into_rows() {
        let body = r#"{
            "cik": "1682852",
            "filings": {"recent": {
                "form": ["8-K", "4"],
                "filingDate": ["2025-03-18", "2025-03-17"],
                "accessionNumber": ["0001682852-25-000012", "0001682852-25-000011"],
                "primaryDocument": ["mrna-20250318.htm"],
                "items": ["2.02,9.01"]
            }}
        }"#;
        let records = serde_json::from_str::<Submissions>(body).unwrap().into_records();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].items, "2.02,9.01");
        assert_eq!(records[1].primary_document, "");
        assert_eq!(
            filing_url(1682852, &records[0].accession_number, &records[0].primary_document),
            "https://www.sec.gov/Archives/edgar/data/1682852/000168285225000012/mrna-20250318.htm"
        );
    }

    #[test]
    fn watchlist_has_seventeen_companies() {
        assert_eq!(default_watchlist().len(), 17);
        assert!(is_tracked_form("S-1/A"));
        assert!(!is_tracked_form("4"));
    }
}
