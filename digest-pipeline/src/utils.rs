/// Text processing utilities
pub mod text {
    use regex::Regex;
    use std::sync::OnceLock;

    fn tag_pattern() -> &'static Regex {
        static TAGS: OnceLock<Regex> = OnceLock::new();
        TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static tag pattern"))
    }

    /// Truncate to at most `max_chars` characters without splitting a code point.
    pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((byte_index, _)) => &text[..byte_index],
            None => text,
        }
    }

    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Decodes the handful of entities that routinely appear in feed and article markup.
    pub fn decode_entities(text: &str) -> String {
        if !text.contains('&') {
            return text.to_string();
        }
        text.replace("&nbsp;", " ")
            .replace("&#160;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&#x27;", "'")
            .replace("&apos;", "'")
            .replace("&rsquo;", "\u{2019}")
            .replace("&lsquo;", "\u{2018}")
            .replace("&ldquo;", "\u{201c}")
            .replace("&rdquo;", "\u{201d}")
            .replace("&mdash;", "\u{2014}")
            .replace("&ndash;", "\u{2013}")
            .replace("&hellip;", "\u{2026}")
            .replace("&amp;", "&")
    }

    /// Plain text of an HTML fragment: tags removed, entities decoded, whitespace collapsed.
    pub fn strip_html(html: &str) -> String {
        let without_tags = tag_pattern().replace_all(html, " ");
        collapse_whitespace(&decode_entities(&without_tags))
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    pub fn extract_host(url_str: &str) -> Option<String> {
        Url::parse(url_str)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.to_ascii_lowercase()))
    }

    /// True when the url's host is `domain` or one of its subdomains.
    pub fn is_on_domain(url_str: &str, domain: &str) -> bool {
        let domain = domain.trim_start_matches('.').to_ascii_lowercase();
        match extract_host(url_str) {
            Some(host) => host == domain || host.ends_with(&format!(".{}", domain)),
            None => url_str.to_ascii_lowercase().contains(&domain),
        }
    }

    pub fn domain_label(url_str: &str) -> String {
        extract_host(url_str)
            .map(|h| h.trim_start_matches("www.").to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Time utilities
pub mod time {
    use chrono::{Days, NaiveDate, Utc};

    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    pub fn days_before(date: NaiveDate, days: u32) -> NaiveDate {
        date.checked_sub_days(Days::new(u64::from(days))).unwrap_or(NaiveDate::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(text::truncate_chars("caf\u{e9} au lait", 4), "caf\u{e9}");
        assert_eq!(text::truncate_chars("short", 50), "short");
    }

    #[test]
    fn html_is_flattened_to_text() {
        let html = "<p>Gene   therapy <b>works</b> &amp; scales</p>\n<br/>";
        assert_eq!(text::strip_html(html), "Gene therapy works & scales");
    }

    #[test]
    fn domain_matching_includes_subdomains() {
        assert!(url::is_on_domain("https://www.sec.gov/Archives/edgar/data/1/2/a.htm", "sec.gov"));
        assert!(!url::is_on_domain("https://notsec.gov.example.com/", "sec.gov"));
        assert_eq!(url::domain_label("https://www.statnews.com/feed/"), "statnews.com");
    }
}
