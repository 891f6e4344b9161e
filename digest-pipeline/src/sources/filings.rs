use crate::config::{FilingConfig, WatchedCompany};
use crate::sources::edgar::{describe_filing, filing_url, is_tracked_form};
use crate::sources::{FetchOutcome, SourceFailure};
use crate::traits::{FilingIndex, FilingRecord};
use crate::types::{FilingMeta, Item, OriginKind};
use crate::utils::time::days_before;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Walks the watchlist and collects recent tracked filings.
pub struct FilingFetcher {
    index: Arc<dyn FilingIndex>,
    config: FilingConfig,
}

impl FilingFetcher {
    pub fn new(index: Arc<dyn FilingIndex>, config: FilingConfig) -> Self {
        Self { index, config }
    }

    /// Filings from every watched company, newest first, capped at `max_filings`.
    pub async fn fetch_recent(&self, today: NaiveDate) -> FetchOutcome {
        let cutoff = days_before(today, self.config.days_back);
        let mut outcome = FetchOutcome::default();

        for company in &self.config.watchlist {
            match self.index.recent_filings(company).await {
                Ok(records) => {
                    let items = filings_since(company, records, cutoff);
                    debug!("{} recent filings for {}", items.len(), company.ticker);
                    outcome.items.extend(items);
                }
                Err(e) => {
                    warn!("Failed to fetch filings for {}: {}", company.ticker, e);
                    outcome.failures.push(SourceFailure {
                        source: format!("filings:{}", company.ticker),
                        message: e.to_string(),
                    });
                }
            }
        }

        // Stable sort keeps watchlist order among same-day filings.
        outcome.items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        outcome.items.truncate(self.config.max_filings);
        info!("Collected {} filings across {} companies", outcome.items.len(), self.config.watchlist.len());
        outcome
    }
}

/// Converts index rows into filing items, stopping at the first tracked
/// filing dated on or before `cutoff` since rows arrive newest first.
pub fn filings_since(company: &WatchedCompany, records: Vec<FilingRecord>, cutoff: NaiveDate) -> Vec<Item> {
    let mut items = Vec::new();

    for record in records {
        if !is_tracked_form(&record.form) {
            continue;
        }
        let Ok(filed_on) = NaiveDate::parse_from_str(&record.filing_date, "%Y-%m-%d") else {
            continue;
        };
        if filed_on <= cutoff {
            break;
        }

        let (title, description) = describe_filing(company, &record.form, &record.filing_date, &record.items);
        let url = filing_url(company.cik, &record.accession_number, &record.primary_document);
        let published_at = filed_on.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        let meta = FilingMeta {
            company: company.company.clone(),
            ticker: company.ticker.clone(),
            form_type: record.form,
            filed_on,
            event_codes: record.items,
        };

        items.push(
            Item::new(url, title, format!("SEC EDGAR \u{2014} {}", company.company), OriginKind::Filing(meta))
                .with_description(Some(description))
                .with_published_at(published_at),
        );
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(form: &str, date: &str, items: &str) -> FilingRecord {
        FilingRecord {
            form: form.to_string(),
            filing_date: date.to_string(),
            accession_number: format!("0000000000-25-{}", date.replace('-', "")),
            primary_document: "doc.htm".to_string(),
            items: items.to_string(),
        }
    }

    #[test]
    fn scanning_stops_at_first_stale_tracked_filing() {
        let company = WatchedCompany {
            ticker: "BEAM".to_string(),
            cik: 1745999,
            company: "Beam Therapeutics".to_string(),
        };
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        let records = vec![
            record("8-K", "2025-03-18", "1.01"),
            record("4", "2025-03-01", ""),
            record("10-Q", "2025-03-12", ""),
            record("10-K", "2025-03-05", ""),
            record("8-K", "2025-03-15", "5.02"),
        ];

        let items = filings_since(&company, records, cutoff);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].filing().unwrap().form_type, "8-K");
        assert_eq!(items[1].filing().unwrap().form_type, "10-Q");
        assert_eq!(items[0].source_name, "SEC EDGAR \u{2014} Beam Therapeutics");
    }

    #[test]
    fn filings_from_the_cutoff_day_are_dropped() {
        let company = WatchedCompany {
            ticker: "MRNA".to_string(),
            cik: 1682852,
            company: "Moderna".to_string(),
        };
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 13).unwrap();
        let records = vec![
            record("8-K", "2025-03-14", "1.01"),
            record("8-K", "2025-03-13", "5.02"),
            record("10-Q", "2025-03-12", ""),
        ];

        let items = filings_since(&company, records, cutoff);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].filing().unwrap().filed_on, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
    }
}
