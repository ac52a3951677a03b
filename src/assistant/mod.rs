//! Botanical Q&A assistant boundary
//!
//! Used only after a plant has been identified. The provider behind the
//! trait is remote and swappable; this module only defines the contract and
//! the retryable session state around it.

pub mod provider;
pub mod session;

pub use provider::{
    parse_answers, preset, Answers, FallbackProvider, PresetQuestion, QaProvider, PRESET_QUESTIONS,
};
pub use session::{AssistantSession, SessionState, NO_ANSWER};
