use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::api::{GenerationRequest, TextGenerator};
use crate::error::{CollaboratorError, CycleError};
use crate::plan::{ActionBounds, ContentPlan, MAX_TITLE_CHARS};
use crate::topics::{RecentSubjects, Topic, TopicPool, TopicSelector};
use crate::{logi, logok, logw};

const SCHEMA_EXAMPLE: &str = r#"{"material_name":"<subject>","category":"<category>","search_keyword":"<2-3 word stock footage query>","clip_duration":5,"prediction":"PASS or FAIL","script_segments":[{"type":"hook","text":"..."},{"type":"reveal","text":"..."},{"type":"grind_action","text":"..."},{"type":"outcome","text":"..."}],"seo_metadata":{"title":"...","description":"...","tags":"tag1,tag2,tag3"}}"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptProfile {
    Shorts,
    Post {
        persona: Option<String>,
        max_chars: usize,
    },
}

pub struct ContentRequestBuilder {
    generator: Box<dyn TextGenerator>,
    profile: PromptProfile,
    bounds: ActionBounds,
    selector: TopicSelector,
    recent: RecentSubjects,
    rng: StdRng,
}

impl ContentRequestBuilder {
    pub fn new(
        generator: Box<dyn TextGenerator>,
        profile: PromptProfile,
        bounds: ActionBounds,
        avoid_repeat: usize,
    ) -> Self {
        Self {
            generator,
            profile,
            bounds,
            selector: TopicSelector::default(),
            recent: RecentSubjects::new(avoid_repeat),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn recent(&self) -> &RecentSubjects {
        &self.recent
    }

    pub fn generator(&self) -> &dyn TextGenerator {
        self.generator.as_ref()
    }

    pub async fn build(&mut self, pool: &TopicPool) -> Result<ContentPlan, CycleError> {
        let topic = self.select_topic(pool);
        self.build_for(topic).await
    }

    pub fn select_topic(&mut self, pool: &TopicPool) -> Topic {
        self.selector
            .next(pool, &self.recent, &mut self.rng)
            .unwrap_or_else(|| Topic::new("General", "Mystery Object"))
    }

    pub async fn build_for(&mut self, topic: Topic) -> Result<ContentPlan, CycleError> {
        logi(format!(
            "Selected topic -> {} ({})",
            topic.subject, topic.category
        ));
        let request = self.request_for(&topic);

        let plan = match self.generator.generate(&request).await {
            Ok(raw) => match ContentPlan::from_response(&raw, &topic, &self.bounds) {
                Ok(plan) => {
                    logok(format!(
                        "Plan generated by {}: {} segments, title '{}'",
                        self.generator.name(),
                        plan.segments.len(),
                        plan.metadata.title
                    ));
                    plan
                }
                Err(err) => {
                    logw(format!("Generated plan rejected ({err:#}); using fallback plan"));
                    self.fallback(&topic)
                }
            },
            Err(err @ CollaboratorError::Unauthorized { .. }) => return Err(err.into()),
            Err(err) => {
                logw(format!("Text generation failed ({err}); using fallback plan"));
                self.fallback(&topic)
            }
        };

        self.recent.remember(&plan.subject);
        Ok(plan)
    }

    fn fallback(&self, topic: &Topic) -> ContentPlan {
        match self.profile {
            PromptProfile::Shorts => ContentPlan::fallback(topic, &self.bounds),
            PromptProfile::Post { .. } => ContentPlan::fallback_post(topic, &self.bounds),
        }
    }

    pub fn request_for(&self, topic: &Topic) -> GenerationRequest {
        let context = topic
            .context
            .as_deref()
            .map(|c| format!("\nSOURCE MATERIAL:\n{c}\n"))
            .unwrap_or_default();

        match &self.profile {
            PromptProfile::Shorts => GenerationRequest {
                system: "You write viral vertical-video scripts and output JSON only.".to_string(),
                prompt: format!(
                    "Category: {category}\nSubject: {subject}\n{context}\n\
                     TASK: Script a YouTube Short where an industrial shredder grinds the subject.\n\
                     - The FIRST segment must be an attention-grabbing hook (type \"hook\") that makes viewers guess the result.\n\
                     - Then a \"reveal\" segment, a \"grind_action\" segment describing the grind, and a final \"outcome\" segment.\n\
                     - Predict whether the shredder passes (PASS) or fails (FAIL).\n\
                     - clip_duration is the grind footage length in seconds ({min}-{max}).\n\
                     - seo_metadata.title must be at most {title} characters.\n\
                     Return ONE JSON object, no markdown, exactly this shape:\n{schema}",
                    category = topic.category,
                    subject = topic.subject,
                    min = self.bounds.min_secs,
                    max = self.bounds.max_secs,
                    title = MAX_TITLE_CHARS,
                    schema = SCHEMA_EXAMPLE,
                ),
                json_output: true,
            },
            PromptProfile::Post { persona, max_chars } => GenerationRequest {
                system: format!(
                    "You are {}. You write punchy social posts and output JSON only.",
                    persona.as_deref().unwrap_or("a witty social media creator")
                ),
                prompt: format!(
                    "Category: {category}\nSubject: {subject}\n{context}\n\
                     TASK: Write one social post about the subject.\n\
                     - The FIRST segment must be an attention-grabbing hook (type \"hook\").\n\
                     - End with an \"outcome\" segment that invites replies.\n\
                     - All segment texts together must stay under {max_chars} characters. No hashtags.\n\
                     - seo_metadata.title must be at most {title} characters.\n\
                     Return ONE JSON object, no markdown, exactly this shape:\n{schema}",
                    category = topic.category,
                    subject = topic.subject,
                    title = MAX_TITLE_CHARS,
                    schema = SCHEMA_EXAMPLE,
                ),
                json_output: true,
            },
        }
    }
}
