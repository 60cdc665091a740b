use docsift_core::RecognitionOutput;
use tracing::debug;

/// Pick one adapter's output wholesale. `second` wins only with a strictly
/// higher average confidence; ties go to `first`. No token-level merging.
pub fn combine(first: RecognitionOutput, second: RecognitionOutput) -> RecognitionOutput {
    if second.average_confidence > first.average_confidence {
        debug!(
            winner = "second",
            first = first.average_confidence,
            second = second.average_confidence,
            "arbitrated recognition outputs"
        );
        second
    } else {
        debug!(
            winner = "first",
            first = first.average_confidence,
            second = second.average_confidence,
            "arbitrated recognition outputs"
        );
        first
    }
}
