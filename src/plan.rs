use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::topics::Topic;

pub const MAX_TITLE_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentRole {
    Hook,
    Reveal,
    GrindAction,
    Outcome,
}

impl SegmentRole {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "hook" => Some(Self::Hook),
            "reveal" => Some(Self::Reveal),
            "grind_action" | "action" | "grind" => Some(Self::GrindAction),
            "outcome" | "result" => Some(Self::Outcome),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub role: SegmentRole,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Prediction {
    Pass,
    Fail,
}

impl Prediction {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PASS" => Some(Self::Pass),
            "FAIL" => Some(Self::Fail),
            _ => None,
        }
    }

    pub fn badge(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub description: String,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPlan {
    pub subject: String,
    pub category: String,
    pub search_keyword: String,
    pub predicted_outcome: Option<Prediction>,
    pub clip_duration: f64,
    pub segments: Vec<Segment>,
    pub metadata: Metadata,
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ActionBounds {
    pub default_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Default for ActionBounds {
    fn default() -> Self {
        Self {
            default_secs: 5.0,
            min_secs: 1.0,
            max_secs: 30.0,
        }
    }
}

impl ActionBounds {
    fn resolve(&self, raw: Option<f64>) -> f64 {
        match raw {
            Some(v) if v.is_finite() && v > 0.0 => v.clamp(self.min_secs, self.max_secs),
            _ => self.default_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    #[serde(default)]
    text: String,
    #[serde(rename = "type", alias = "role", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<String>),
    Csv(String),
}

impl RawTags {
    fn into_set(self) -> BTreeSet<String> {
        let items: Vec<String> = match self {
            Self::List(items) => items,
            Self::Csv(csv) => csv.split(',').map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|t| t.trim().trim_start_matches('#').trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Option<RawTags>,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(alias = "subject")]
    material_name: Option<String>,
    category: Option<String>,
    #[serde(alias = "pexels_keyword")]
    search_keyword: Option<String>,
    clip_duration: Option<f64>,
    prediction: Option<String>,
    script_segments: Vec<RawSegment>,
    #[serde(default)]
    seo_metadata: RawMetadata,
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].trim_end().to_string(),
        None => text.to_string(),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

impl ContentPlan {
    // Unknown roles and empty segments are dropped; a missing hook or a final
    // segment other than the outcome rejects the whole plan.
    pub fn from_response(raw: &str, topic: &Topic, bounds: &ActionBounds) -> Result<Self> {
        let root: RawPlan = serde_json::from_str(strip_code_fence(raw))
            .context("Failed to parse content plan JSON")?;

        let segments: Vec<Segment> = root
            .script_segments
            .into_iter()
            .filter_map(|s| {
                let role = SegmentRole::parse(&s.kind)?;
                let text = s.text.trim().to_string();
                (!text.is_empty()).then_some(Segment { role, text })
            })
            .collect();

        if !segments.iter().any(|s| s.role == SegmentRole::Hook) {
            bail!("content plan has no hook segment");
        }
        if segments.last().map(|s| s.role) != Some(SegmentRole::Outcome) {
            bail!("content plan does not end with an outcome segment");
        }

        let subject = root
            .material_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| topic.subject.clone());
        let category = root
            .category
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| topic.category.clone());
        let search_keyword = root
            .search_keyword
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| subject.clone());

        let meta = root.seo_metadata;
        let title = match meta.title.trim() {
            "" => subject.as_str(),
            t => t,
        };

        Ok(Self {
            predicted_outcome: root.prediction.as_deref().and_then(Prediction::parse),
            clip_duration: bounds.resolve(root.clip_duration),
            segments,
            metadata: Metadata {
                title: truncate_chars(title, MAX_TITLE_CHARS),
                description: meta.description.trim().to_string(),
                tags: meta.tags.map(RawTags::into_set).unwrap_or_default(),
            },
            subject,
            category,
            search_keyword,
            fallback: false,
        })
    }

    pub fn fallback(topic: &Topic, bounds: &ActionBounds) -> Self {
        let subject = topic.subject.clone();
        let lower = subject.to_lowercase();
        let segments = vec![
            Segment {
                role: SegmentRole::Hook,
                text: format!("Can the shredder survive a {lower}?"),
            },
            Segment {
                role: SegmentRole::Reveal,
                text: format!("We dropped a {lower} straight into the grinder."),
            },
            Segment {
                role: SegmentRole::GrindAction,
                text: "Listen to the blades bite down.".to_string(),
            },
            Segment {
                role: SegmentRole::Outcome,
                text: "Did you guess right? Follow for the next test!".to_string(),
            },
        ];

        let mut tags: BTreeSet<String> = ["shorts", "satisfying", "shredder"]
            .into_iter()
            .map(str::to_string)
            .collect();
        tags.insert(lower.clone());
        if !topic.category.is_empty() {
            tags.insert(topic.category.to_lowercase());
        }

        Self {
            search_keyword: subject.clone(),
            category: topic.category.clone(),
            predicted_outcome: None,
            clip_duration: bounds.default_secs,
            segments,
            metadata: Metadata {
                title: truncate_chars(&format!("Will It Shred? {subject}"), MAX_TITLE_CHARS),
                description: format!(
                    "What happens when a {lower} meets an industrial shredder? Watch till the end."
                ),
                tags,
            },
            subject,
            fallback: true,
        }
    }

    pub fn fallback_post(topic: &Topic, bounds: &ActionBounds) -> Self {
        let subject = topic.subject.clone();
        let hook = if topic.category.is_empty() {
            format!("{subject}.")
        } else {
            format!("{}: {subject}.", topic.category)
        };
        let segments = vec![
            Segment {
                role: SegmentRole::Hook,
                text: hook,
            },
            Segment {
                role: SegmentRole::Outcome,
                text: "What's your take?".to_string(),
            },
        ];

        let mut tags = BTreeSet::new();
        tags.insert(subject.to_lowercase());
        if !topic.category.is_empty() {
            tags.insert(topic.category.to_lowercase());
        }

        Self {
            search_keyword: subject.clone(),
            category: topic.category.clone(),
            predicted_outcome: None,
            clip_duration: bounds.default_secs,
            segments,
            metadata: Metadata {
                title: truncate_chars(&subject, MAX_TITLE_CHARS),
                description: topic.context.clone().unwrap_or_default(),
                tags,
            },
            subject,
            fallback: true,
        }
    }

    pub fn segment_text(&self, role: SegmentRole) -> Vec<&str> {
        self.segments
            .iter()
            .filter(|s| s.role == role)
            .map(|s| s.text.as_str())
            .collect()
    }

    pub fn post_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"material_name":"Glass Bottle","clip_duration":5,"prediction":"FAIL","script_segments":[{"text":"Hook!","type":"hook"},{"text":"Reveal","type":"reveal"},{"text":"Grind","type":"grind_action"},{"text":"Outcome","type":"outcome"}],"seo_metadata":{"title":"T","description":"D","tags":"a,b"}}"#;

    fn topic() -> Topic {
        Topic::new("Everyday Waste", "Glass Bottle")
    }

    #[test]
    fn parses_generated_plan() {
        let plan = ContentPlan::from_response(SAMPLE, &topic(), &ActionBounds::default()).unwrap();
        assert_eq!(plan.subject, "Glass Bottle");
        assert_eq!(plan.category, "Everyday Waste");
        assert_eq!(plan.search_keyword, "Glass Bottle");
        assert_eq!(plan.predicted_outcome, Some(Prediction::Fail));
        assert_eq!(plan.clip_duration, 5.0);
        assert_eq!(plan.segments.len(), 4);
        assert_eq!(plan.segments[0].role, SegmentRole::Hook);
        assert_eq!(plan.metadata.title, "T");
        let tags: Vec<&str> = plan.metadata.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, ["a", "b"]);
        assert!(!plan.fallback);
    }

    #[test]
    fn oversized_title_is_truncated() {
        let long = "x".repeat(75);
        let raw = SAMPLE.replace(r#""title":"T""#, &format!(r#""title":"{long}""#));
        let plan = ContentPlan::from_response(&raw, &topic(), &ActionBounds::default()).unwrap();
        assert_eq!(plan.metadata.title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn multibyte_title_truncates_on_char_boundary() {
        let title = "é".repeat(70);
        assert_eq!(truncate_chars(&title, 60).chars().count(), 60);
    }

    #[test]
    fn tags_accept_list_form() {
        let raw = SAMPLE.replace(r#""tags":"a,b""#, r##""tags":["#one"," two ",""]"##);
        let plan = ContentPlan::from_response(&raw, &topic(), &ActionBounds::default()).unwrap();
        assert!(plan.metadata.tags.contains("one"));
        assert!(plan.metadata.tags.contains("two"));
        assert_eq!(plan.metadata.tags.len(), 2);
    }

    #[test]
    fn fenced_output_is_unwrapped() {
        let fenced = format!("```json\n{SAMPLE}\n```");
        let plan = ContentPlan::from_response(&fenced, &topic(), &ActionBounds::default()).unwrap();
        assert_eq!(plan.subject, "Glass Bottle");
    }

    #[test]
    fn missing_hook_is_rejected() {
        let raw = SAMPLE.replace(r#""type":"hook""#, r#""type":"reveal""#);
        assert!(ContentPlan::from_response(&raw, &topic(), &ActionBounds::default()).is_err());
    }

    #[test]
    fn outcome_must_be_last() {
        let raw = r#"{"script_segments":[{"text":"Outcome","type":"outcome"},{"text":"Hook","type":"hook"}]}"#;
        assert!(ContentPlan::from_response(raw, &topic(), &ActionBounds::default()).is_err());
    }

    #[test]
    fn clip_duration_defaults_and_clamps() {
        let bounds = ActionBounds::default();
        let raw = SAMPLE.replace(r#""clip_duration":5,"#, "");
        let plan = ContentPlan::from_response(&raw, &topic(), &bounds).unwrap();
        assert_eq!(plan.clip_duration, bounds.default_secs);

        let raw = SAMPLE.replace(r#""clip_duration":5"#, r#""clip_duration":90"#);
        let plan = ContentPlan::from_response(&raw, &topic(), &bounds).unwrap();
        assert_eq!(plan.clip_duration, bounds.max_secs);
    }

    #[test]
    fn missing_subject_falls_back_to_topic() {
        let raw = r#"{"script_segments":[{"text":"Hook","type":"hook"},{"text":"Done","type":"outcome"}]}"#;
        let plan = ContentPlan::from_response(raw, &topic(), &ActionBounds::default()).unwrap();
        assert_eq!(plan.subject, "Glass Bottle");
        assert_eq!(plan.metadata.title, "Glass Bottle");
        assert_eq!(plan.predicted_outcome, None);
    }

    #[test]
    fn fallback_is_deterministic_and_well_formed() {
        let bounds = ActionBounds::default();
        let a = ContentPlan::fallback(&topic(), &bounds);
        let b = ContentPlan::fallback(&topic(), &bounds);
        assert_eq!(a, b);
        assert!(a.fallback);
        assert_eq!(a.segments.first().map(|s| s.role), Some(SegmentRole::Hook));
        assert_eq!(a.segments.last().map(|s| s.role), Some(SegmentRole::Outcome));
        assert!(a.metadata.title.chars().count() <= MAX_TITLE_CHARS);
    }

    #[test]
    fn post_fallback_carries_topic_and_headline() {
        let topic = Topic::new("News", "Record opening weekend")
            .with_context("Headline: Record opening weekend. Summary: Lines around the block");
        let plan = ContentPlan::fallback_post(&topic, &ActionBounds::default());
        assert!(plan.fallback);
        assert_eq!(plan.post_text(), "News: Record opening weekend. What's your take?");
        assert_eq!(plan.segments.last().map(|s| s.role), Some(SegmentRole::Outcome));
        assert!(plan.metadata.description.contains("Lines around the block"));
        assert!(plan.metadata.tags.contains("news"));
    }
}
