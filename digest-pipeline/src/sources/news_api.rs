use crate::fetcher::HttpFetcher;
use crate::traits::{SearchApi, SearchRequest};
use crate::types::{DigestError, Item, OriginKind, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// OR-combination of keywords (multi-word ones quoted as phrases), with
/// minus-prefixed exclusions appended when present.
pub fn build_query<S: AsRef<str>>(keywords: &[S], exclude_keywords: &[S]) -> String {
    let quoted: Vec<String> = keywords
        .iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty())
        .map(|k| if k.contains(' ') { format!("\"{}\"", k) } else { k.to_string() })
        .collect();
    let query = quoted.join(" OR ");

    let exclusions: Vec<String> = exclude_keywords
        .iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty())
        .map(|k| format!("-{}", k))
        .collect();

    if exclusions.is_empty() {
        query
    } else {
        format!("({}) {}", query, exclusions.join(" "))
    }
}

/// Over-fetch because results are keyword-filtered afterwards.
pub fn page_size_for(wanted: usize) -> usize {
    (wanted * 3).clamp(1, 50)
}

pub fn search_request<S: AsRef<str>>(
    keywords: &[S],
    exclude_keywords: &[S],
    wanted: usize,
    from: NaiveDate,
) -> SearchRequest {
    SearchRequest {
        query: build_query(keywords, exclude_keywords),
        from,
        page_size: page_size_for(wanted),
    }
}

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<ApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiArticle {
    #[serde(default)]
    source: ApiSource,
    title: Option<String>,
    #[serde(default)]
    url: String,
    description: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSource {
    name: Option<String>,
}

impl ApiArticle {
    fn into_item(self) -> Option<Item> {
        if self.url.trim().is_empty() {
            return None;
        }
        let published_at = self
            .published_at
            .as_deref()
            .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let source_name = self.source.name.unwrap_or_else(|| "Unknown".to_string());
        let title = self.title.unwrap_or_else(|| "Untitled".to_string());

        Some(
            Item::new(self.url, title, source_name, OriginKind::SearchResult)
                .with_description(self.description)
                .with_published_at(published_at),
        )
    }
}

/// NewsAPI `/v2/everything` client.
pub struct NewsApiClient {
    fetcher: Arc<HttpFetcher>,
    base_url: String,
    api_key: Option<String>,
}

impl NewsApiClient {
    pub fn new(fetcher: Arc<HttpFetcher>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

#[async_trait]
impl SearchApi for NewsApiClient {
    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Item>> {
        let Some(api_key) = self.api_key.as_ref() else {
            debug!("Search API has no key configured, skipping");
            return Ok(Vec::new());
        };

        let url = format!("{}/everything", self.base_url.trim_end_matches('/'));
        let query = [
            ("q", request.query.clone()),
            ("from", request.from.format("%Y-%m-%d").to_string()),
            ("sortBy", "relevancy".to_string()),
            ("pageSize", request.page_size.to_string()),
            ("language", "en".to_string()),
            ("apiKey", api_key.clone()),
        ];

        let response: EverythingResponse = self.fetcher.get_json(&url, &query).await?;
        if response.status != "ok" {
            return Err(DigestError::General(format!(
                "Search API returned status '{}': {}",
                response.status,
                response.message.unwrap_or_default()
            )));
        }

        let items: Vec<Item> = response
            .articles
            .into_iter()
            .filter_map(ApiArticle::into_item)
            .collect();
        info!("Search returned {} items for query {}", items.len(), request.query);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_quotes_phrases_and_appends_exclusions() {
        let query = build_query(&["cell therapy", "CDMO"], &["stock", "crypto"]);
        assert_eq!(query, "(\"cell therapy\" OR CDMO) -stock -crypto");
        assert_eq!(build_query(&["NBA", "NBA trade"], &[]), "NBA OR \"NBA trade\"");
    }

    #[test]
    fn page_size_overfetches_within_limit() {
        assert_eq!(page_size_for(2), 6);
        assert_eq!(page_size_for(10), 30);
        assert_eq!(page_size_for(40), 50);
    }

    #[test]
    fn response_articles_become_search_items() {
        let body = r#"{
            "status": "ok",
            "totalResults": 2,
            "articles": [
                {"source": {"id": null, "name": "Reuters"}, "title": "Moderna update",
                 "url": "https://reuters.com/a", "description": "mRNA news",
                 "publishedAt": "2025-03-18T09:30:00Z"},
                {"source": {"name": "Nobody"}, "title": "No url", "url": ""}
            ]
        }"#;
        let response: EverythingResponse = serde_json::from_str(body).unwrap();
        let items: Vec<Item> = response.articles.into_iter().filter_map(ApiArticle::into_item).collect();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_name, "Reuters");
        assert_eq!(items[0].origin, OriginKind::SearchResult);
        assert!(items[0].published_at.is_some());
    }
}
