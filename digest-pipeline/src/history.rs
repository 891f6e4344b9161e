use crate::config::HistoryConfig;
use crate::fetcher::HttpFetcher;
use crate::types::{ArticleHistory, DaySynthesis, DigestError, HistoryEntry, Result};
use crate::utils::time::today;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use interfaces::defs::HistoryStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shape of the JSON file kept in the gist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryDocument {
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub articles: Vec<HistoryEntry>,
    #[serde(default)]
    pub syntheses: Vec<DaySynthesis>,
}

impl HistoryDocument {
    /// Existing history plus this run's additions, pruned to the retention window.
    pub fn merged(
        existing: &ArticleHistory,
        new_entries: &[HistoryEntry],
        new_syntheses: &[DaySynthesis],
        retention_days: u64,
        today: NaiveDate,
    ) -> Self {
        let history = existing.merged(new_entries, new_syntheses).pruned(retention_days, today);
        Self {
            last_updated: Utc::now(),
            articles: history.entries,
            syntheses: history.syntheses,
        }
    }

    /// Date the additions were stamped with, so pruning follows the run
    /// that produced them rather than the wall clock.
    pub fn run_date(new_entries: &[HistoryEntry], new_syntheses: &[DaySynthesis]) -> NaiveDate {
        new_entries
            .iter()
            .map(|e| e.date_sent)
            .chain(new_syntheses.iter().map(|s| s.date))
            .max()
            .unwrap_or_else(today)
    }

    pub fn into_history(self) -> ArticleHistory {
        ArticleHistory {
            entries: self.articles,
            syntheses: self.syntheses,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    content: Option<String>,
}

/// History kept as one JSON file in a private GitHub gist.
pub struct GistHistoryStore {
    http: Arc<HttpFetcher>,
    config: HistoryConfig,
}

impl GistHistoryStore {
    pub fn new(http: Arc<HttpFetcher>, config: HistoryConfig) -> Self {
        Self { http, config }
    }

    pub fn enabled(&self) -> bool {
        self.credentials().is_some()
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.config.gist_id.as_deref().filter(|s| !s.trim().is_empty())?;
        let token = self.config.github_token.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((id, token))
    }

    fn gist_url(&self, gist_id: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), gist_id)
    }

    async fn try_read(&self, gist_id: &str, token: &str) -> Result<ArticleHistory> {
        let url = self.gist_url(gist_id);
        let response = self
            .http
            .send_with_retry(&url, |client| {
                client
                    .get(&url)
                    .header("Authorization", format!("token {}", token))
                    .header("Accept", "application/vnd.github+json")
            })
            .await?;
        let gist: GistResponse = response.json().await?;

        let content = gist
            .files
            .get(&self.config.file_name)
            .and_then(|file| file.content.clone())
            .ok_or_else(|| DigestError::Parse(format!("gist has no file named {}", self.config.file_name)))?;
        let document: HistoryDocument = serde_json::from_str(&content)?;
        Ok(document.into_history())
    }

    async fn try_write(&self, gist_id: &str, token: &str, document: &HistoryDocument) -> Result<()> {
        let url = self.gist_url(gist_id);
        let content = serde_json::to_string_pretty(document)?;
        let body = json!({ "files": { self.config.file_name.clone(): { "content": content } } });

        self.http
            .send_with_retry(&url, |client| {
                client
                    .patch(&url)
                    .header("Authorization", format!("token {}", token))
                    .header("Accept", "application/vnd.github+json")
                    .json(&body)
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for GistHistoryStore {
    async fn read(&self) -> ArticleHistory {
        let Some((gist_id, token)) = self.credentials() else {
            debug!("History store not configured, starting without history");
            return ArticleHistory::default();
        };

        match self.try_read(gist_id, token).await {
            Ok(history) => {
                info!(
                    "Loaded history: {} articles, {} syntheses",
                    history.entries.len(),
                    history.syntheses.len()
                );
                history
            }
            Err(e) => {
                warn!("Failed to read history, continuing without it: {}", e);
                ArticleHistory::default()
            }
        }
    }

    async fn write(&self, new_entries: &[HistoryEntry], new_syntheses: &[DaySynthesis], existing: &ArticleHistory) -> bool {
        let Some((gist_id, token)) = self.credentials() else {
            return false;
        };

        let run_date = HistoryDocument::run_date(new_entries, new_syntheses);
        let document = HistoryDocument::merged(existing, new_entries, new_syntheses, self.config.retention_days, run_date);
        match self.try_write(gist_id, token, &document).await {
            Ok(()) => {
                info!(
                    "Updated history: {} articles, {} syntheses",
                    document.articles.len(),
                    document.syntheses.len()
                );
                true
            }
            Err(e) => {
                warn!("Failed to write history: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FetchConfig;

    #[test]
    fn document_keeps_the_wire_field_names() {
        let raw = r#"{
            "last_updated": "2025-03-19T12:00:00+00:00",
            "articles": [{"url": "https://a/1", "title": "A", "topic": "NBA", "date_sent": "2025-03-18"}],
            "syntheses": [{"topic": "NBA", "prose": "Trade talk [1].", "date": "2025-03-18"}]
        }"#;
        let history = serde_json::from_str::<HistoryDocument>(raw).unwrap().into_history();

        assert_eq!(history.entries[0].date_sent, NaiveDate::from_ymd_opt(2025, 3, 18).unwrap());
        assert_eq!(history.syntheses[0].prose, "Trade talk [1].");
    }

    #[test]
    fn merged_document_is_pruned() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        let old = HistoryEntry {
            url: "https://a/old".to_string(),
            title: "Old".to_string(),
            topic: "NBA".to_string(),
            date_sent: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        };
        let fresh = HistoryEntry {
            url: "https://a/new".to_string(),
            date_sent: today,
            ..old.clone()
        };
        let existing = ArticleHistory {
            entries: vec![old],
            syntheses: vec![],
        };

        let document = HistoryDocument::merged(&existing, &[fresh], &[], 7, today);
        assert_eq!(document.articles.len(), 1);
        assert_eq!(document.articles[0].url, "https://a/new");
    }

    #[test]
    fn pruning_follows_the_run_date_of_the_additions() {
        let run_day = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        let entry = |url: &str, date_sent: NaiveDate| HistoryEntry {
            url: url.to_string(),
            title: url.to_string(),
            topic: "NBA".to_string(),
            date_sent,
        };
        let existing = ArticleHistory {
            entries: vec![
                entry("https://a/stale", NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()),
                entry("https://a/recent", NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()),
            ],
            syntheses: vec![],
        };
        let synthesis = DaySynthesis {
            topic: "NBA".to_string(),
            prose: "Trade talk [1].".to_string(),
            date: run_day,
        };
        let fresh = [entry("https://a/new", NaiveDate::from_ymd_opt(2025, 3, 19).unwrap())];

        let run_date = HistoryDocument::run_date(&fresh, std::slice::from_ref(&synthesis));
        assert_eq!(run_date, run_day);

        let document = HistoryDocument::merged(&existing, &fresh, &[synthesis], 7, run_date);
        let urls: Vec<&str> = document.articles.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a/recent", "https://a/new"]);
        assert_eq!(document.syntheses.len(), 1);
    }

    #[test]
    fn unconfigured_store_reads_empty_and_refuses_writes() {
        let http = Arc::new(HttpFetcher::new(FetchConfig::default()).unwrap());
        let store = GistHistoryStore::new(http, HistoryConfig::default());

        assert!(!store.enabled());
        assert!(tokio_test::block_on(store.read()).is_empty());
        assert!(!tokio_test::block_on(store.write(&[], &[], &ArticleHistory::default())));
    }
}
