use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub category: String,
    pub subject: String,
    pub context: Option<String>,
}

impl Topic {
    pub fn new(category: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subject: subject.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    Random,
    RoundRobin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCategory {
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPool {
    #[serde(default)]
    pub selection: Selection,
    #[serde(default = "default_categories")]
    pub categories: Vec<TopicCategory>,
}

fn default_categories() -> Vec<TopicCategory> {
    let cat = |name: &str, subjects: &[&str]| TopicCategory {
        name: name.to_string(),
        subjects: subjects.iter().map(|s| s.to_string()).collect(),
    };
    vec![
        cat(
            "Everyday Waste",
            &[
                "Glass Bottle",
                "Plastic Straw",
                "Aluminum Can",
                "Paper Cup",
                "Styrofoam",
                "Cardboard Box",
                "Battery",
                "Light Bulb",
            ],
        ),
        cat(
            "Kitchen",
            &["Cast Iron Pan", "Coconut", "Frozen Turkey", "Watermelon"],
        ),
        cat(
            "Toys",
            &["Rubber Duck", "Bowling Ball", "Plastic Brick", "Yo-Yo"],
        ),
    ]
}

impl Default for TopicPool {
    fn default() -> Self {
        Self {
            selection: Selection::default(),
            categories: default_categories(),
        }
    }
}

impl TopicPool {
    pub fn single(category: &str, subjects: &[&str]) -> Self {
        Self {
            selection: Selection::RoundRobin,
            categories: vec![TopicCategory {
                name: category.to_string(),
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.iter().all(|c| c.subjects.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct RecentSubjects {
    capacity: usize,
    items: VecDeque<String>,
}

impl RecentSubjects {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.items.iter().any(|s| s.eq_ignore_ascii_case(subject))
    }

    pub fn remember(&mut self, subject: &str) {
        if self.capacity == 0 || self.contains(subject) {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(subject.to_string());
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Picks the next topic, skipping recently used subjects while fresh ones remain.
#[derive(Debug, Default)]
pub struct TopicSelector {
    cursor: usize,
}

impl TopicSelector {
    pub fn next<R: Rng>(
        &mut self,
        pool: &TopicPool,
        recent: &RecentSubjects,
        rng: &mut R,
    ) -> Option<Topic> {
        let candidates: Vec<Topic> = pool
            .categories
            .iter()
            .flat_map(|c| c.subjects.iter().map(|s| Topic::new(&c.name, s)))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let fresh: Vec<&Topic> = candidates
            .iter()
            .filter(|t| !recent.contains(&t.subject))
            .collect();

        let picked = match pool.selection {
            Selection::Random => {
                let choices: Vec<&Topic> = if fresh.is_empty() {
                    candidates.iter().collect()
                } else {
                    fresh
                };
                choices.choose(rng).copied()
            }
            Selection::RoundRobin => {
                let len = candidates.len();
                let start = self.cursor % len;
                let idx = (0..len)
                    .map(|off| (start + off) % len)
                    .find(|&i| !recent.contains(&candidates[i].subject))
                    .unwrap_or(start);
                self.cursor = idx + 1;
                candidates.get(idx)
            }
        };

        picked.cloned()
    }
}
