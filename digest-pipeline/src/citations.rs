use crate::config::CitationStyle;
use crate::types::{Item, SourceReference, Synthesis};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

/// One narrative topic as it was handed to the synthesizer.
pub struct TopicSources<'a> {
    pub synthesis: &'a Synthesis,
    /// Exactly the listing order the model saw: items, then appended filings.
    pub sources: Vec<&'a Item>,
}

#[derive(Debug, Clone)]
pub struct Renumbered {
    /// Same order as the input, prose rewritten to global numbers.
    pub syntheses: Vec<Synthesis>,
    pub references: Vec<SourceReference>,
}

fn marker_pattern() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("static marker pattern"))
}

pub fn render_marker(number: usize, style: CitationStyle) -> String {
    match style {
        CitationStyle::Anchor => format!("<a href=\"#ref-{0}\">[{0}]</a>", number),
        CitationStyle::Plain => format!("[{}]", number),
    }
}

/// Assigns run-wide numbers in topic order, then local order, and rewrites
/// every topic's `[n]` / `[n, m]` markers to them. Markers with no local
/// mapping are left as they are.
pub fn renumber(topics: &[TopicSources<'_>], style: CitationStyle) -> Renumbered {
    let mut references = Vec::new();
    let mut syntheses = Vec::with_capacity(topics.len());

    for topic in topics {
        let mut local_to_global = HashMap::new();
        for (index, source) in topic.sources.iter().enumerate() {
            let global = references.len() + 1;
            local_to_global.insert(index + 1, global);
            references.push(SourceReference {
                number: global,
                title: source.title.clone(),
                source_name: source.source_name.clone(),
                url: source.url.clone(),
            });
        }

        let prose = rewrite_markers(&topic.synthesis.prose, &local_to_global, style);
        syntheses.push(Synthesis {
            prose,
            ..topic.synthesis.clone()
        });
    }

    Renumbered { syntheses, references }
}

pub fn rewrite_markers(prose: &str, mapping: &HashMap<usize, usize>, style: CitationStyle) -> String {
    marker_pattern()
        .replace_all(prose, |caps: &Captures<'_>| {
            let locals: Vec<Option<usize>> = caps[1].split(',').map(|n| n.trim().parse::<usize>().ok()).collect();
            let any_mapped = locals
                .iter()
                .any(|local| local.and_then(|n| mapping.get(&n)).is_some());
            if !any_mapped {
                return caps[0].to_string();
            }

            caps[1]
                .split(',')
                .map(str::trim)
                .zip(locals)
                .map(|(raw, local)| match local.and_then(|n| mapping.get(&n)) {
                    Some(global) => render_marker(*global, style),
                    None => format!("[{}]", raw),
                })
                .collect::<String>()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModelIdentity, OriginKind};

    fn items(prefix: &str, count: usize) -> Vec<Item> {
        (1..=count)
            .map(|n| Item::new(format!("https://{}/{}", prefix, n), format!("{} {}", prefix, n), prefix, OriginKind::FeedEntry))
            .collect()
    }

    fn synthesis(topic: &str, prose: &str) -> Synthesis {
        Synthesis {
            topic: topic.to_string(),
            prose: prose.to_string(),
            model: ModelIdentity::new("Test", "scripted"),
        }
    }

    #[test]
    fn numbers_are_dense_across_topics() {
        let ai = items("ai", 2);
        let f1 = items("f1", 3);
        let ai_synthesis = synthesis("AI", "Models improved [1] while costs fell [2].");
        let f1_synthesis = synthesis("F1", "A wet race [1, 3] and a protest [2].");

        let renumbered = renumber(
            &[
                TopicSources { synthesis: &ai_synthesis, sources: ai.iter().collect() },
                TopicSources { synthesis: &f1_synthesis, sources: f1.iter().collect() },
            ],
            CitationStyle::Plain,
        );

        let numbers: Vec<usize> = renumbered.references.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(renumbered.references[2].url, "https://f1/1");
        assert_eq!(renumbered.syntheses[0].prose, "Models improved [1] while costs fell [2].");
        assert_eq!(renumbered.syntheses[1].prose, "A wet race [3][5] and a protest [4].");
    }

    #[test]
    fn unknown_markers_are_left_alone() {
        let mapping = HashMap::from([(1, 7), (2, 8)]);
        let prose = "Known [1], unknown [99], mixed [2, 42], all unknown [5, 6].";
        assert_eq!(
            rewrite_markers(prose, &mapping, CitationStyle::Plain),
            "Known [7], unknown [99], mixed [8][42], all unknown [5, 6]."
        );
    }

    #[test]
    fn anchor_style_links_to_reference_ids() {
        let mapping = HashMap::from([(1, 4)]);
        assert_eq!(
            rewrite_markers("Claim [1].", &mapping, CitationStyle::Anchor),
            "Claim <a href=\"#ref-4\">[4]</a>."
        );
    }
}
