//! Q&A provider boundary
//!
//! A provider answers questions about one plant given its catalog record.
//! Providers are remote and fallible; nothing here knows which service sits
//! behind the trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::dataset::PlantRecord;
use crate::utils::error::{PlantIdError, Result};

/// One canned question offered next to an identified plant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetQuestion {
    pub id: &'static str,
    pub label: &'static str,
    pub question: &'static str,
}

pub const PRESET_QUESTIONS: [PresetQuestion; 8] = [
    PresetQuestion {
        id: "safety",
        label: "Safety",
        question: "Is it safe to touch or stand near this plant? What should I watch out for?",
    },
    PresetQuestion {
        id: "edibility",
        label: "Edibility",
        question: "Does this plant have edible parts? How are they eaten?",
    },
    PresetQuestion {
        id: "medicinal",
        label: "Medicinal",
        question: "Does this plant have medicinal uses? Who should avoid it or be careful?",
    },
    PresetQuestion {
        id: "fire",
        label: "Fire & fuel",
        question: "Can this plant be used as tinder or firewood?",
    },
    PresetQuestion {
        id: "identify",
        label: "Identification",
        question: "How can I tell this plant apart from others in the wild? Does it have look-alikes?",
    },
    PresetQuestion {
        id: "uses",
        label: "Uses",
        question: "How can campers and hikers make use of this plant?",
    },
    PresetQuestion {
        id: "pests",
        label: "Insects & pests",
        question: "Does this plant attract insects or repel them?",
    },
    PresetQuestion {
        id: "signs",
        label: "Water & signs",
        question: "Does this plant indicate a nearby water source or a particular soil type?",
    },
];

/// Look up a preset question by id
pub fn preset(id: &str) -> Option<&'static PresetQuestion> {
    PRESET_QUESTIONS.iter().find(|q| q.id == id)
}

/// Answers keyed by preset question id
pub type Answers = HashMap<String, String>;

/// Something that answers questions about a plant
#[async_trait]
pub trait QaProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One answer per preset question id; ids may be missing
    async fn answer_all(&self, record: &PlantRecord) -> Result<Answers>;

    /// Free-text answer to an ad-hoc question
    async fn ask(&self, record: &PlantRecord, question: &str) -> Result<String>;
}

/// Tries `primary`, then `backup` when the primary fails
pub struct FallbackProvider {
    primary: Arc<dyn QaProvider>,
    backup: Arc<dyn QaProvider>,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn QaProvider>, backup: Arc<dyn QaProvider>) -> Self {
        Self { primary, backup }
    }
}

#[async_trait]
impl QaProvider for FallbackProvider {
    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn answer_all(&self, record: &PlantRecord) -> Result<Answers> {
        match self.primary.answer_all(record).await {
            Ok(answers) => {
                info!("Answers received from {}", self.primary.name());
                Ok(answers)
            }
            Err(e) => {
                warn!("{} failed ({}), trying {}", self.primary.name(), e, self.backup.name());
                self.backup.answer_all(record).await
            }
        }
    }

    async fn ask(&self, record: &PlantRecord, question: &str) -> Result<String> {
        match self.primary.ask(record, question).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!("{} failed ({}), trying {}", self.primary.name(), e, self.backup.name());
                self.backup.ask(record, question).await
            }
        }
    }
}

/// Parse a provider reply holding a JSON object of answers.
///
/// Replies are sometimes wrapped in Markdown code fences; those are removed
/// before parsing.
pub fn parse_answers(text: &str) -> Result<Answers> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(PlantIdError::Assistant("empty reply".to_string()));
    }

    serde_json::from_str(cleaned)
        .map_err(|e| PlantIdError::Assistant(format!("malformed answers: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PlantRecord {
        PlantRecord {
            id: 3,
            turkish_name: "Ebegümeci".to_string(),
            scientific_name: "Malva sylvestris".to_string(),
            toxicity: "None".to_string(),
            edible: "Leaves".to_string(),
            geography: "Mediterranean".to_string(),
            description: "Common mallow.".to_string(),
        }
    }

    struct Scripted {
        name: &'static str,
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl QaProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn answer_all(&self, _record: &PlantRecord) -> Result<Answers> {
            match self.reply {
                Some(reply) => parse_answers(reply),
                None => Err(PlantIdError::Assistant(format!("{} unreachable", self.name))),
            }
        }

        async fn ask(&self, record: &PlantRecord, question: &str) -> Result<String> {
            match self.reply {
                Some(_) => Ok(format!("{}: {}", record.scientific_name, question)),
                None => Err(PlantIdError::Assistant(format!("{} unreachable", self.name))),
            }
        }
    }

    #[test]
    fn test_preset_ids() {
        let ids: Vec<&str> = PRESET_QUESTIONS.iter().map(|q| q.id).collect();
        assert_eq!(
            ids,
            vec!["safety", "edibility", "medicinal", "fire", "identify", "uses", "pests", "signs"]
        );
        assert_eq!(preset("fire").unwrap().label, "Fire & fuel");
        assert!(preset("weather").is_none());
    }

    #[test]
    fn test_parse_answers_strips_fences() {
        let answers =
            parse_answers("```json\n{\"safety\": \"Safe to touch.\", \"fire\": \"No.\"}\n```")
                .unwrap();
        assert_eq!(answers["safety"], "Safe to touch.");
        assert_eq!(answers.len(), 2);
    }

    #[test]
    fn test_parse_answers_rejects_garbage() {
        assert!(matches!(parse_answers("  "), Err(PlantIdError::Assistant(_))));
        assert!(matches!(
            parse_answers("Sorry, I cannot help."),
            Err(PlantIdError::Assistant(_))
        ));
    }

    #[tokio::test]
    async fn test_fallback_uses_backup_on_failure() {
        let provider = FallbackProvider::new(
            Arc::new(Scripted {
                name: "primary",
                reply: None,
            }),
            Arc::new(Scripted {
                name: "backup",
                reply: Some(r#"{"uses": "Tea from the leaves."}"#),
            }),
        );

        let answers = provider.answer_all(&record()).await.unwrap();
        assert_eq!(answers["uses"], "Tea from the leaves.");

        let answer = provider.ask(&record(), "Is it edible?").await.unwrap();
        assert_eq!(answer, "Malva sylvestris: Is it edible?");
    }

    #[tokio::test]
    async fn test_fallback_fails_when_both_fail() {
        let provider = FallbackProvider::new(
            Arc::new(Scripted {
                name: "primary",
                reply: None,
            }),
            Arc::new(Scripted {
                name: "backup",
                reply: None,
            }),
        );

        let err = provider.answer_all(&record()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
