//! Assistant conversation state for one identified plant
//!
//! Provider failures end in a `Failed` state the UI can offer a retry from;
//! they never propagate into the classification flow.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::provider::{preset, Answers, QaProvider};
use crate::dataset::PlantRecord;
use crate::utils::error::Result;

/// Shown when the provider gave no answer for a preset question
pub const NO_ANSWER: &str = "I don't have information on this yet.";

/// Where the batched preset answers are
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Loading,
    Ready(Answers),
    Failed { message: String, retryable: bool },
}

/// Preset answers and ad-hoc questions about one plant
pub struct AssistantSession {
    provider: Arc<dyn QaProvider>,
    record: PlantRecord,
    state: Mutex<SessionState>,
}

impl AssistantSession {
    pub fn new(provider: Arc<dyn QaProvider>, record: PlantRecord) -> Self {
        Self {
            provider,
            record,
            state: Mutex::new(SessionState::Idle),
        }
    }

    pub fn record(&self) -> &PlantRecord {
        &self.record
    }

    pub fn state(&self) -> SessionState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set(&self, state: SessionState) {
        *self.lock() = state;
    }

    pub fn welcome_message(&self) -> String {
        format!(
            "Hello! Pick one of the questions below to learn about \"{}\".",
            self.record.turkish_name
        )
    }

    /// Fetch every preset answer in one provider call.
    ///
    /// Does nothing once answers are cached. Calling it again after a failure
    /// is the retry.
    pub async fn fetch_all(&self) -> SessionState {
        let cached = matches!(&*self.lock(), SessionState::Ready(_));
        if cached {
            return self.state();
        }

        self.set(SessionState::Loading);
        debug!("Fetching answers for {}", self.record.scientific_name);

        let next = match self.provider.answer_all(&self.record).await {
            Ok(answers) => SessionState::Ready(answers),
            Err(e) => {
                warn!("Assistant unavailable: {}", e);
                SessionState::Failed {
                    message: e.user_message().to_string(),
                    retryable: e.is_retryable(),
                }
            }
        };

        self.set(next.clone());
        next
    }

    /// Cached answer for a preset question id.
    ///
    /// `None` until answers are loaded or for an unknown id; a known id the
    /// provider skipped yields [`NO_ANSWER`].
    pub fn answer(&self, question_id: &str) -> Option<String> {
        preset(question_id)?;
        match &*self.lock() {
            SessionState::Ready(answers) => Some(
                answers
                    .get(question_id)
                    .cloned()
                    .unwrap_or_else(|| NO_ANSWER.to_string()),
            ),
            _ => None,
        }
    }

    /// Ask a free-text question
    pub async fn ask(&self, question: &str) -> Result<String> {
        let answer = self.provider.ask(&self.record, question).await?;
        Ok(answer.trim().to_string())
    }

    /// Forget cached answers
    pub fn reset(&self) {
        self.set(SessionState::Idle);
    }
}
