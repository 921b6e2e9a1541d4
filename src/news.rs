use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;
use std::time::Duration;

use crate::{logi, logw};

const TOP_ITEMS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headline {
    pub title: String,
    pub summary: String,
}

impl Headline {
    pub fn as_context(&self) -> String {
        format!("Headline: {}. Summary: {}", self.title, self.summary)
    }
}

pub struct NewsFeed {
    client: reqwest::Client,
    url: String,
}

impl NewsFeed {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn fetch(&self) -> Result<Vec<Headline>> {
        let body = self
            .client
            .get(&self.url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .context("RSS request failed")?
            .error_for_status()
            .context("RSS feed returned an error status")?
            .text()
            .await
            .context("RSS body read failed")?;
        parse_items(&body)
    }

    pub async fn pick<R: Rng>(&self, rng: &mut R) -> Option<Headline> {
        logi("Checking RSS feed for fresh stories...");
        match self.fetch().await {
            Ok(items) => {
                let top = &items[..items.len().min(TOP_ITEMS)];
                let story = top.choose(rng).cloned();
                if let Some(story) = &story {
                    logi(format!("Found story: {}", story.title));
                }
                story
            }
            Err(err) => {
                logw(format!("RSS parsing error: {err:#}"));
                None
            }
        }
    }
}

fn item_regex() -> Result<&'static Regex> {
    static ITEM_RE: OnceCell<Regex> = OnceCell::new();
    ITEM_RE.get_or_try_init(|| {
        Regex::new(r"(?is)<item\b[^>]*>(.*?)</item>").context("failed to compile item regex")
    })
}

fn field_regex(tag: &'static str) -> Result<Regex> {
    Regex::new(&format!(r"(?is)<{tag}\b[^>]*>(.*?)</{tag}>"))
        .with_context(|| format!("failed to compile {tag} regex"))
}

fn tag_regex() -> Result<&'static Regex> {
    static TAG_RE: OnceCell<Regex> = OnceCell::new();
    TAG_RE.get_or_try_init(|| Regex::new(r"<[^>]*>").context("failed to compile tag regex"))
}

fn char_ref_regex() -> Result<&'static Regex> {
    static CHAR_REF_RE: OnceCell<Regex> = OnceCell::new();
    CHAR_REF_RE.get_or_try_init(|| {
        Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));")
            .context("failed to compile character reference regex")
    })
}

/// `&#8217;` and `&#x2019;` style references; invalid code points are left as written.
fn decode_char_refs(text: &str) -> Result<String> {
    let decoded = char_ref_regex()?.replace_all(text, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse().ok(),
            (None, None) => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    Ok(decoded.into_owned())
}

fn clean_text(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(raw);
    let decoded = raw
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    let stripped = tag_regex()?.replace_all(&decoded, " ");
    let text = decode_char_refs(&stripped)?.replace("&amp;", "&");
    Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

pub fn parse_items(xml: &str) -> Result<Vec<Headline>> {
    let title_re = field_regex("title")?;
    let desc_re = field_regex("description")?;

    let mut out = Vec::new();
    for cap in item_regex()?.captures_iter(xml) {
        let item = &cap[1];
        let Some(title) = title_re.captures(item) else {
            continue;
        };
        let title = clean_text(&title[1])?;
        if title.is_empty() {
            continue;
        }
        let summary = match desc_re.captures(item) {
            Some(d) => clean_text(&d[1])?,
            None => String::new(),
        };
        out.push(Headline { title, summary });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss><channel><title>Feed</title>
<item><title>Box office &amp; more</title><description><![CDATA[<a href="x">Big <b>weekend</b></a>]]></description></item>
<item><title><![CDATA[Second story]]></title></item>
<item><description>no title</description></item>
</channel></rss>"#;

    #[test]
    fn parses_items_and_cleans_markup() {
        let items = parse_items(FEED).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Box office & more");
        assert_eq!(items[0].summary, "Big weekend");
        assert_eq!(items[1].title, "Second story");
        assert_eq!(items[1].summary, "");
    }

    #[test]
    fn channel_title_is_not_an_item() {
        let items = parse_items(FEED).unwrap();
        assert!(items.iter().all(|h| h.title != "Feed"));
    }

    #[test]
    fn context_line() {
        let h = Headline {
            title: "A".into(),
            summary: "B".into(),
        };
        assert_eq!(h.as_context(), "Headline: A. Summary: B");
    }

    #[test]
    fn numeric_character_references_are_decoded() {
        let feed = "<item><title>Khan&#8217;s film &#x2014; day one &#99999999; &amp;#39;</title></item>";
        let items = parse_items(feed).unwrap();
        assert_eq!(items[0].title, "Khan\u{2019}s film \u{2014} day one &#99999999; &#39;");
    }
}
