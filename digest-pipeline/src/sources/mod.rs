pub mod edgar;
pub mod filings;
pub mod keywords;
pub mod news_api;
pub mod rss_feed;
pub mod topic;

pub use edgar::EdgarClient;
pub use filings::FilingFetcher;
pub use keywords::KeywordFilter;
pub use news_api::NewsApiClient;
pub use rss_feed::RssFeedReader;
pub use topic::TopicFetcher;

use crate::types::Item;
use std::collections::HashSet;

/// A source that failed and was counted as returning nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub message: String,
}

/// Items from one fetch plus every source failure absorbed along the way.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub items: Vec<Item>,
    pub failures: Vec<SourceFailure>,
}

/// One item per distinct url, first occurrence wins.
pub fn dedupe_by_url(items: Vec<Item>) -> Vec<Item> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OriginKind;

    #[test]
    fn dedupe_keeps_first_seen_order() {
        let item = |url: &str, title: &str| Item::new(url, title, "src", OriginKind::FeedEntry);
        let deduped = dedupe_by_url(vec![
            item("https://a/1", "first"),
            item("https://a/2", "second"),
            item("https://a/1", "again"),
            item("https://a/3", "third"),
            item("https://a/2", "again"),
        ]);

        let titles: Vec<&str> = deduped.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }
}
