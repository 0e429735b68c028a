use std::sync::Arc;

use crate::models::{Conversation, Message};
use crate::segments::encoding::{CarrierSegmentCalculator, SegmentCalculator};

/// Characters per segment assumed when the calculator cannot be used
const HEURISTIC_CHARS_PER_SEGMENT: usize = 160;

/// Which content representation an estimate was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Messages,
    Transcript,
    Empty,
}

/// Estimates billable segments for a conversation
///
/// Estimation never fails: calculator errors degrade to a character-count
/// heuristic and every result is at least one segment.
#[derive(Clone)]
pub struct SegmentEstimator {
    calculator: Arc<dyn SegmentCalculator>,
}

impl std::fmt::Debug for SegmentEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentEstimator")
            .field("calculator", &"<SegmentCalculator>")
            .finish()
    }
}

impl SegmentEstimator {
    pub fn new(calculator: Arc<dyn SegmentCalculator>) -> Self {
        Self { calculator }
    }

    /// Estimate using the best content the conversation carries
    pub fn estimate(&self, conversation: &Conversation) -> u32 {
        self.estimate_with_source(conversation).0
    }

    pub fn estimate_with_source(&self, conversation: &Conversation) -> (u32, ContentSource) {
        let messages = conversation.non_empty_messages();
        if !messages.is_empty() {
            let bodies: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
            return (self.count(&bodies), ContentSource::Messages);
        }

        match conversation.transcript.as_deref() {
            Some(transcript) if !transcript.is_empty() => {
                (self.count(&[transcript]), ContentSource::Transcript)
            }
            _ => (1, ContentSource::Empty),
        }
    }

    /// Estimate from fully fetched structured content only, never the transcript
    pub fn estimate_authoritative(&self, messages: &[Message]) -> u32 {
        let bodies: Vec<&str> = messages
            .iter()
            .filter(|m| !m.is_empty())
            .map(|m| m.body.as_str())
            .collect();

        if bodies.is_empty() {
            return 1;
        }
        self.count(&bodies)
    }

    fn count(&self, bodies: &[&str]) -> u32 {
        match self.calculator.count_segments(bodies) {
            Ok(segments) => segments.max(1),
            Err(e) => {
                let segments = heuristic_segments(bodies);
                tracing::debug!(error = %e, segments, "segment calculator failed; using heuristic");
                segments
            }
        }
    }
}

impl Default for SegmentEstimator {
    fn default() -> Self {
        Self::new(Arc::new(CarrierSegmentCalculator::new()))
    }
}

/// `ceil(total_chars / 160)`, floored at 1
pub fn heuristic_segments(bodies: &[&str]) -> u32 {
    let total_chars: usize = bodies.iter().map(|b| b.chars().count()).sum();
    let segments = total_chars.div_ceil(HEURISTIC_CHARS_PER_SEGMENT).max(1);
    u32::try_from(segments).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::encoding::SegmentError;
    use chrono::Utc;

    struct FailingCalculator;

    impl SegmentCalculator for FailingCalculator {
        fn count_segments(&self, _bodies: &[&str]) -> Result<u32, SegmentError> {
            Err(SegmentError::MessageTooLong { length: 0, max: 0 })
        }
    }

    struct ZeroCalculator;

    impl SegmentCalculator for ZeroCalculator {
        fn count_segments(&self, _bodies: &[&str]) -> Result<u32, SegmentError> {
            Ok(0)
        }
    }

    fn conversation() -> Conversation {
        Conversation::new("c1", Utc::now())
    }

    #[test]
    fn test_structured_messages_take_priority_over_transcript() {
        let estimator = SegmentEstimator::default();
        let conv = conversation()
            .with_messages(vec![Message::new("a".repeat(200)), Message::new("")])
            .with_transcript("short");

        let (segments, source) = estimator.estimate_with_source(&conv);
        assert_eq!(source, ContentSource::Messages);
        assert_eq!(segments, 2);
    }

    #[test]
    fn test_all_empty_messages_fall_back_to_transcript() {
        let estimator = SegmentEstimator::default();
        let conv = conversation()
            .with_messages(vec![Message::new(""), Message::new("")])
            .with_transcript("Hello world");

        let (segments, source) = estimator.estimate_with_source(&conv);
        assert_eq!(source, ContentSource::Transcript);
        assert_eq!(segments, 1);
    }

    #[test]
    fn test_no_content_yields_minimum() {
        let estimator = SegmentEstimator::default();
        let (segments, source) = estimator.estimate_with_source(&conversation().with_transcript(""));
        assert_eq!(source, ContentSource::Empty);
        assert_eq!(segments, 1);
    }

    #[test]
    fn test_calculator_failure_uses_heuristic() {
        let estimator = SegmentEstimator::new(Arc::new(FailingCalculator));
        let conv = conversation().with_transcript("x".repeat(321));
        assert_eq!(estimator.estimate(&conv), 3);
    }

    #[test]
    fn test_calculator_result_is_floored_at_one() {
        let estimator = SegmentEstimator::new(Arc::new(ZeroCalculator));
        let conv = conversation().with_messages(vec![Message::new("hi")]);
        assert_eq!(estimator.estimate(&conv), 1);
    }

    #[test]
    fn test_too_long_message_degrades_to_heuristic() {
        let estimator = SegmentEstimator::default();
        let conv = conversation().with_messages(vec![Message::new("a".repeat(2000))]);
        // 2000 / 160 rounded up
        assert_eq!(estimator.estimate(&conv), 13);
    }

    #[test]
    fn test_estimate_never_below_one() {
        let estimator = SegmentEstimator::default();
        let cases = vec![
            conversation(),
            conversation().with_messages(vec![]),
            conversation().with_messages(vec![Message::new("")]),
            conversation().with_transcript(""),
            conversation().with_transcript("ok"),
            conversation().with_messages(vec![Message::new("ж")]),
        ];

        for conv in cases {
            assert!(estimator.estimate(&conv) >= 1);
        }
    }

    #[test]
    fn test_authoritative_path_ignores_transcript() {
        let estimator = SegmentEstimator::default();
        assert_eq!(estimator.estimate_authoritative(&[]), 1);
        assert_eq!(
            estimator.estimate_authoritative(&[Message::new("a".repeat(161)), Message::new("b")]),
            3
        );
    }

    #[test]
    fn test_heuristic_segments() {
        assert_eq!(heuristic_segments(&[]), 1);
        assert_eq!(heuristic_segments(&["a"]), 1);
        assert_eq!(heuristic_segments(&["a".repeat(160).as_str()]), 1);
        assert_eq!(heuristic_segments(&["a".repeat(100).as_str(), "b".repeat(61).as_str()]), 2);
    }
}
