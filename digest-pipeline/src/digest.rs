//! Model-backed writing: per-topic narrative with local citations, the
//! cross-topic overview, and per-item briefs.

use crate::config::{ModelConfig, TopicSpec};
use crate::types::{DigestError, Item, ItemBrief, ModelIdentity, Result, Synthesis};
use crate::utils::text::truncate_chars;
use interfaces::defs::CompletionModel;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How much of a previous day's prose is shown to the model as context.
const CONTINUITY_CHARS: usize = 600;
/// How much of each topic's prose feeds the overview.
const OVERVIEW_SNIPPET_CHARS: usize = 500;

const SYNTHESIS_SYSTEM: &str = "You write sections for a daily news digest email. \
Your writing is clear, direct and informative, and you turn several sources into one coherent narrative.";

const OVERVIEW_SYSTEM: &str = "You write the opening paragraph of a daily news digest email. \
The tone is dry and lightly sarcastic but always informative. Keep it concise.";

const SUMMARY_SYSTEM: &str = "You summarize news articles for a daily email digest. \
Be direct and factual. Never comment on the article itself or mention missing details.";

/// What the overview is written from.
pub enum OverviewInput<'a> {
    Syntheses(&'a [Synthesis]),
    /// Degraded mode: topic names with their item titles.
    Headlines(&'a [(String, Vec<String>)]),
}

/// Numbered source listing. Items come first, then appended filings, numbered from 1.
pub fn source_listing(items: &[Item], filings: &[Item]) -> String {
    let item_lines = items.iter().map(|item| (item, item.synthesis_content()));
    let filing_lines = filings
        .iter()
        .map(|filing| (filing, filing.description().unwrap_or(&filing.title)));

    item_lines
        .chain(filing_lines)
        .enumerate()
        .map(|(i, (item, content))| {
            format!(
                "[{}] {}\n    Source: {}\n    Content: {}",
                i + 1,
                item.title,
                item.source_name,
                content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn synthesis_prompt(topic: &str, items: &[Item], filings: &[Item], previous: Option<&str>) -> String {
    let mut prompt = format!(
        "Here are the sources for the \"{}\" section of a daily news brief:\n\n{}\n\n",
        topic,
        source_listing(items, filings)
    );

    if let Some(previous) = previous {
        prompt.push_str(&format!(
            "For continuity, this is what the reader was told about this topic recently:\n\"\"\"\n{}\n\"\"\"\n\
             Do not repeat developments already covered there unless the sources add something new.\n\n",
            truncate_chars(previous, CONTINUITY_CHARS)
        ));
    }

    prompt.push_str(
        "Write 3-5 paragraphs synthesizing the key developments in these sources. Rules:\n\
         - Cite sources inline by number, e.g. [1] or [2, 3]\n\
         - Every factual claim must cite at least one source\n\
         - Connect the sources into themes instead of summarizing each one in turn\n\
         - If regulatory filings are included, work the notable ones into the narrative\n\
         - Vary your opening; do not begin with \"This week\" or \"In this week's\"",
    );
    prompt
}

/// Deterministic stand-in used when the model call fails: one bullet per source, no citations.
pub fn fallback_synthesis(topic: &str, items: &[Item], filings: &[Item]) -> Synthesis {
    let prose = items
        .iter()
        .chain(filings)
        .map(|item| format!("- {}", item.title))
        .collect::<Vec<_>>()
        .join("\n");
    Synthesis {
        topic: topic.to_string(),
        prose,
        model: ModelIdentity::fallback(),
    }
}

pub fn overview_prompt(input: &OverviewInput<'_>) -> String {
    let context = match input {
        OverviewInput::Syntheses(syntheses) => syntheses
            .iter()
            .map(|s| format!("{}:\n{}", s.topic, truncate_chars(&s.prose, OVERVIEW_SNIPPET_CHARS)))
            .collect::<Vec<_>>()
            .join("\n\n"),
        OverviewInput::Headlines(headlines) => headlines
            .iter()
            .map(|(topic, titles)| {
                let bullets: Vec<String> = titles.iter().map(|t| format!("- {}", t)).collect();
                format!("{}:\n{}", topic, bullets.join("\n"))
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    };

    format!(
        "Here is today's news, by topic:\n\n{}\n\n\
         Write one short overview paragraph (3-5 sentences) pointing out the most interesting or important \
         stories across all topics. Flowing prose only, no bullet points. \
         Do not start with \"Well\", \"So\" or \"Alright\".",
        context
    )
}

pub fn summary_prompt(item: &Item, topic: &TopicSpec) -> String {
    let context: Vec<&str> = topic.keywords.iter().take(5).map(String::as_str).collect();
    let mut lines = vec![
        format!("Title: {}", item.title),
        format!("Source: {}", item.source_name),
    ];
    if let Some(description) = item.description() {
        lines.push(format!("Description: {}", description));
    }
    if let Some(published_at) = item.published_at {
        lines.push(format!("Published: {}", published_at.format("%Y-%m-%d")));
    }

    format!(
        "You are writing summaries for a daily email news digest. The reader is interested in: {} ({})\n\n\
         Summarize the article below in one or two short paragraphs using whatever information is provided. \
         Focus on the key facts. Always produce a summary and add no meta-commentary.\n\nArticle:\n{}",
        topic.name,
        context.join(", "),
        lines.join("\n")
    )
}

pub struct Synthesizer {
    model: Arc<dyn CompletionModel>,
    config: ModelConfig,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn CompletionModel>, config: ModelConfig) -> Self {
        Self { model, config }
    }

    pub fn model_identity(&self) -> ModelIdentity {
        self.model.identify()
    }

    /// Narrative prose for one topic whose `[n]` markers index `items ++ filings`.
    pub async fn synthesize_topic(
        &self,
        topic: &str,
        items: &[Item],
        filings: &[Item],
        previous: Option<&str>,
    ) -> Result<Synthesis> {
        let identity = self.model.identify();
        let prompt = synthesis_prompt(topic, items, filings, previous);

        let prose = self
            .model
            .complete_text(SYNTHESIS_SYSTEM, &prompt, self.config.synthesis_max_tokens)
            .await
            .map_err(|e| DigestError::Model {
                provider: identity.provider.clone(),
                message: e.to_string(),
            })?;

        info!(
            "Synthesized topic '{}': {} chars from {} sources",
            topic,
            prose.len(),
            items.len() + filings.len()
        );
        Ok(Synthesis {
            topic: topic.to_string(),
            prose,
            model: identity,
        })
    }

    pub async fn generate_overview(&self, input: OverviewInput<'_>) -> Result<String> {
        let prompt = overview_prompt(&input);
        let overview = self
            .model
            .complete_text(OVERVIEW_SYSTEM, &prompt, self.config.overview_max_tokens)
            .await
            .map_err(|e| DigestError::Model {
                provider: self.model.identify().provider,
                message: e.to_string(),
            })?;
        info!("Generated overview: {} chars", overview.len());
        Ok(overview)
    }

    /// Always yields a displayable summary: the title when there is no
    /// description to work from, the description (or title) when the model fails.
    pub async fn summarize_item(&self, item: &Item, topic: &TopicSpec) -> ItemBrief {
        let brief = |summary: String, model: ModelIdentity| ItemBrief {
            title: item.title.clone(),
            url: item.url.clone(),
            source_name: item.source_name.clone(),
            summary,
            model,
        };

        if item.description().is_none() {
            debug!("No description for '{}', using title as summary", item.title);
            return brief(item.title.clone(), ModelIdentity::fallback());
        }

        let prompt = summary_prompt(item, topic);
        match self
            .model
            .complete_text(SUMMARY_SYSTEM, &prompt, self.config.summary_max_length * 2)
            .await
        {
            Ok(summary) => brief(summary, self.model.identify()),
            Err(e) => {
                warn!("Summary failed for '{}', using fallback: {}", item.title, e);
                let fallback = item.description().unwrap_or(&item.title).to_string();
                brief(fallback, ModelIdentity::fallback())
            }
        }
    }

    pub async fn summarize_items(&self, items: &[Item], topic: &TopicSpec) -> Vec<ItemBrief> {
        let mut briefs = Vec::with_capacity(items.len());
        for item in items {
            briefs.push(self.summarize_item(item, topic).await);
        }
        briefs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FilingMeta, OriginKind};
    use chrono::NaiveDate;

    fn article(n: usize) -> Item {
        Item::new(format!("https://news/{}", n), format!("Story {}", n), "Wire", OriginKind::FeedEntry)
            .with_description(Some(format!("Description {}", n)))
    }

    fn notable_filing() -> Item {
        let meta = FilingMeta {
            company: "Moderna".to_string(),
            ticker: "MRNA".to_string(),
            form_type: "8-K".to_string(),
            filed_on: NaiveDate::from_ymd_opt(2025, 3, 18).unwrap(),
            event_codes: "1.01".to_string(),
        };
        Item::new("https://www.sec.gov/x", "Moderna 8-K", "SEC EDGAR", OriginKind::Filing(meta))
            .with_description(Some("Material agreement".to_string()))
    }

    #[test]
    fn listing_numbers_items_then_filings() {
        let mut first = article(1);
        first.body_text = Some("Full body".to_string());
        let listing = source_listing(&[first, article(2)], &[notable_filing()]);

        assert!(listing.starts_with("[1] Story 1\n    Source: Wire\n    Content: Full body"));
        assert!(listing.contains("[2] Story 2\n    Source: Wire\n    Content: Description 2"));
        assert!(listing.contains("[3] Moderna 8-K\n    Source: SEC EDGAR\n    Content: Material agreement"));
    }

    #[test]
    fn continuity_context_is_truncated() {
        let previous = "x".repeat(1000);
        let prompt = synthesis_prompt("AI News", &[article(1)], &[], Some(&previous));
        assert!(prompt.contains(&"x".repeat(600)));
        assert!(!prompt.contains(&"x".repeat(601)));
    }

    #[test]
    fn fallback_lists_every_title_without_citations() {
        let synthesis = fallback_synthesis("Biotech", &[article(1), article(2)], &[notable_filing()]);
        assert_eq!(synthesis.prose, "- Story 1\n- Story 2\n- Moderna 8-K");
        assert!(synthesis.model.is_fallback());
    }

    #[test]
    fn headline_overview_lists_titles() {
        let headlines = vec![("NBA".to_string(), vec!["Trade deadline".to_string()])];
        let prompt = overview_prompt(&OverviewInput::Headlines(&headlines));
        assert!(prompt.contains("NBA:\n- Trade deadline"));
    }
}
