//! Grounded answer synthesis.
//!
//! The generator is instructed to answer only from the supplied context and
//! to reply with [`NOT_FOUND_SENTINEL`] otherwise. That reply is recognised
//! here and becomes [`Synthesis::NotGrounded`]; callers never string-match.

use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::generation::TextGenerator;

/// The exact reply the generator gives when the context lacks the answer.
pub const NOT_FOUND_SENTINEL: &str = "Information not available in context.";

/// The outcome of one synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
    /// An answer drawn from the context.
    Grounded(String),
    /// The context did not contain the answer.
    NotGrounded,
}

impl Synthesis {
    /// The answer text, with [`NOT_FOUND_SENTINEL`] standing in for
    /// [`Synthesis::NotGrounded`].
    pub fn as_text(&self) -> &str {
        match self {
            Self::Grounded(text) => text,
            Self::NotGrounded => NOT_FOUND_SENTINEL,
        }
    }

    /// Whether the answer came from the context.
    pub fn is_grounded(&self) -> bool {
        matches!(self, Self::Grounded(_))
    }

    /// Interpret raw generator output.
    fn from_output(raw: &str) -> Self {
        let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
        let sentinel = NOT_FOUND_SENTINEL.trim_end_matches('.');
        let bare = trimmed.trim_end_matches('.');
        if bare.eq_ignore_ascii_case(sentinel) {
            Self::NotGrounded
        } else {
            Self::Grounded(raw.trim().to_string())
        }
    }
}

impl Serialize for Synthesis {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_text())
    }
}

/// Build the student-support prompt for `question` over `context`.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a student-support assistant.\n\
         Use ONLY the information in the context below to answer the question.\n\
         If the answer is not in the context, say: \"{NOT_FOUND_SENTINEL}\"\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question:\n\
         {question}\n\
         \n\
         Answer clearly:\n"
    )
}

/// Produces grounded answers with a [`TextGenerator`].
pub struct AnswerSynthesizer {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl AnswerSynthesizer {
    /// Create a synthesizer whose generator call is bounded by `timeout`.
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Answer `question` from `context` with exactly one generator call.
    ///
    /// # Errors
    ///
    /// - [`RagError::SynthesisError`] if the generator fails or times out.
    /// - [`RagError::MalformedUpstreamOutput`] if it returns no text.
    pub async fn synthesize(&self, context: &str, question: &str) -> Result<Synthesis> {
        let prompt = build_prompt(context, question);
        let raw = tokio::time::timeout(self.timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| RagError::SynthesisError {
                provider: self.generator.model_id().to_string(),
                message: format!("request timed out after {}s", self.timeout.as_secs_f32()),
            })?
            .inspect_err(|e| error!(error = %e, "generation failed"))?;

        if raw.trim().is_empty() {
            return Err(RagError::MalformedUpstreamOutput {
                message: "generator returned empty output".into(),
                raw,
            });
        }

        let synthesis = Synthesis::from_output(&raw);
        debug!(grounded = synthesis.is_grounded(), "synthesized answer");
        Ok(synthesis)
    }
}
