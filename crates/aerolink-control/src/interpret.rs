//! Free-text → [`Command`] interpretation glue.
//!
//! The actual classifier (a zero-shot model, a cloud API, whatever) lives
//! outside this system; it is consumed through the [`IntentClassifier`]
//! contract with the executor's command vocabulary as the label set. This
//! module only owns the gating: matches whose confidence does not exceed
//! [`CONFIDENCE_THRESHOLD`] are discarded rather than executed, because a
//! misheard "land" is worse than asking the operator to repeat it.

use aerolink_types::{AeroError, Command};
use async_trait::async_trait;
use tracing::debug;

/// Minimum confidence a classification must *exceed* to be acted on.
pub const CONFIDENCE_THRESHOLD: f32 = 0.70;

/// External intent-classification collaborator.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Score `text` against `labels` and return the best label with its
    /// confidence in [0, 1].
    ///
    /// # Errors
    ///
    /// Implementations surface their own transport/model failures; the
    /// caller treats any error as "no command".
    async fn classify(&self, text: &str, labels: &[&str]) -> Result<(String, f32), AeroError>;
}

/// Map transcribed text onto the closed command set.
///
/// Returns `Ok(None)` when the best match is not confident enough or names
/// something outside the vocabulary (a well-behaved classifier cannot, but
/// the contract does not enforce it).
pub async fn interpret(
    classifier: &dyn IntentClassifier,
    text: &str,
) -> Result<Option<Command>, AeroError> {
    let labels = Command::labels();
    let (best, confidence) = classifier.classify(text, &labels).await?;
    debug!(text, best = %best, confidence, "intent classified");

    if confidence <= CONFIDENCE_THRESHOLD {
        debug!(confidence, "interpretation confidence too low, command ignored");
        return Ok(None);
    }
    Ok(best.parse::<Command>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Classifier double returning a fixed answer.
    struct FixedClassifier {
        label: String,
        confidence: f32,
    }

    #[async_trait]
    impl IntentClassifier for FixedClassifier {
        async fn classify(&self, _text: &str, labels: &[&str]) -> Result<(String, f32), AeroError> {
            assert_eq!(labels, Command::labels().as_slice(), "vocabulary is the label set");
            Ok((self.label.clone(), self.confidence))
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl IntentClassifier for FailingClassifier {
        async fn classify(&self, _: &str, _: &[&str]) -> Result<(String, f32), AeroError> {
            Err(AeroError::Rpc {
                call: "classify".to_string(),
                details: "model unavailable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn confident_match_maps_to_command() {
        let classifier = FixedClassifier {
            label: "take_off".to_string(),
            confidence: 0.93,
        };
        let cmd = interpret(&classifier, "please lift off now").await.unwrap();
        assert_eq!(cmd, Some(Command::TakeOff));
    }

    #[tokio::test]
    async fn low_confidence_is_discarded() {
        let classifier = FixedClassifier {
            label: "land".to_string(),
            confidence: 0.69,
        };
        assert_eq!(interpret(&classifier, "mumble").await.unwrap(), None);
    }

    #[tokio::test]
    async fn threshold_is_exclusive() {
        let classifier = FixedClassifier {
            label: "land".to_string(),
            confidence: CONFIDENCE_THRESHOLD,
        };
        assert_eq!(interpret(&classifier, "land maybe").await.unwrap(), None);
    }

    #[tokio::test]
    async fn out_of_vocabulary_label_yields_none() {
        let classifier = FixedClassifier {
            label: "self_destruct".to_string(),
            confidence: 0.99,
        };
        assert_eq!(interpret(&classifier, "boom").await.unwrap(), None);
    }

    #[tokio::test]
    async fn classifier_failure_propagates() {
        let err = interpret(&FailingClassifier, "anything").await.unwrap_err();
        assert!(err.to_string().contains("model unavailable"));
    }
}
