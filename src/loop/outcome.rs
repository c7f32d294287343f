//! Per-iteration outcome classification.
//!
//! The agent declares completion or blockage by printing an exact promise
//! marker. Classification is a fixed-priority decision, first match wins:
//!
//! | Priority | Condition                            | Outcome   |
//! |----------|--------------------------------------|-----------|
//! | 1        | output contains `SUCCESS_SIGNAL`     | `JobDone` |
//! | 2        | output contains `FAILURE_SIGNAL`     | `Failure` |
//! | 3        | exit code is non-zero                | `Failure` |
//! | 4        | otherwise                            | `Success` |
//!
//! Matching is byte-exact and case-sensitive.

use serde::{Deserialize, Serialize};

/// Marker the agent prints when the whole job is complete.
pub const SUCCESS_SIGNAL: &str = "<promise>SUCCESS</promise>";

/// Marker the agent prints when it is blocked.
pub const FAILURE_SIGNAL: &str = "<promise>FAILURE</promise>";

/// Result of one iteration as seen by the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IterationOutcome {
    /// The agent declared the job complete.
    JobDone,
    /// Explicit failure signal or non-zero exit.
    Failure,
    /// Clean exit with no signal; resets the failure counter.
    Success,
}

impl std::fmt::Display for IterationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IterationOutcome::JobDone => write!(f, "job-done"),
            IterationOutcome::Failure => write!(f, "failure"),
            IterationOutcome::Success => write!(f, "success"),
        }
    }
}

/// Which promise markers appeared in the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseSignals {
    pub success: bool,
    pub failure: bool,
}

impl PromiseSignals {
    /// Whether at least one marker was seen.
    #[must_use]
    pub fn any(&self) -> bool {
        self.success || self.failure
    }
}

/// Report both promise markers independently.
#[must_use]
pub fn scan_signals(output: &[u8]) -> PromiseSignals {
    PromiseSignals {
        success: contains(output, SUCCESS_SIGNAL.as_bytes()),
        failure: contains(output, FAILURE_SIGNAL.as_bytes()),
    }
}

/// Map an exit code and captured output to an [`IterationOutcome`].
///
/// # Example
///
/// ```
/// use rooda::r#loop::outcome::{classify, IterationOutcome};
///
/// assert_eq!(classify(1, b"<promise>SUCCESS</promise>"), IterationOutcome::JobDone);
/// assert_eq!(classify(0, b"<promise>FAILURE</promise>"), IterationOutcome::Failure);
/// assert_eq!(classify(2, b"done"), IterationOutcome::Failure);
/// assert_eq!(classify(0, b"done"), IterationOutcome::Success);
/// ```
#[must_use]
pub fn classify(exit_code: i32, output: &[u8]) -> IterationOutcome {
    let signals = scan_signals(output);
    if signals.success {
        IterationOutcome::JobDone
    } else if signals.failure || exit_code != 0 {
        IterationOutcome::Failure
    } else {
        IterationOutcome::Success
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_signal_wins_regardless_of_exit_code() {
        let out = b"working...\n<promise>SUCCESS</promise>\n";
        assert_eq!(classify(0, out), IterationOutcome::JobDone);
        assert_eq!(classify(1, out), IterationOutcome::JobDone);
        assert_eq!(classify(-1, out), IterationOutcome::JobDone);
    }

    #[test]
    fn test_failure_signal_regardless_of_exit_code() {
        let out = b"stuck\n<promise>FAILURE</promise>";
        assert_eq!(classify(0, out), IterationOutcome::Failure);
        assert_eq!(classify(3, out), IterationOutcome::Failure);
    }

    #[test]
    fn test_both_signals_prefer_success() {
        let out = b"<promise>FAILURE</promise> then <promise>SUCCESS</promise>";
        assert_eq!(classify(1, out), IterationOutcome::JobDone);
        let signals = scan_signals(out);
        assert!(signals.success && signals.failure);
    }

    #[test]
    fn test_exit_code_without_signals() {
        assert_eq!(classify(0, b""), IterationOutcome::Success);
        assert_eq!(classify(0, b"all good"), IterationOutcome::Success);
        assert_eq!(classify(127, b""), IterationOutcome::Failure);
        assert_eq!(classify(-1, b"killed"), IterationOutcome::Failure);
    }

    #[test]
    fn test_near_miss_markers_never_match() {
        let variants: [&[u8]; 7] = [
            b"success",
            b"<promise>success</promise>",
            b"<PROMISE>SUCCESS</PROMISE>",
            b"<promise> SUCCESS </promise>",
            b"<promise>SUCCESS",
            b"<promise>SUCCESS</promise",
            b"promise>SUCCESS</promise>",
        ];
        for v in variants {
            assert_eq!(
                classify(0, v),
                IterationOutcome::Success,
                "{:?} should not match",
                String::from_utf8_lossy(v)
            );
            assert!(!scan_signals(v).any());
        }
    }

    #[test]
    fn test_marker_split_across_lines_does_not_match() {
        assert_eq!(
            classify(0, b"<promise>\nFAILURE</promise>"),
            IterationOutcome::Success
        );
    }

    #[test]
    fn test_non_utf8_output_is_scanned() {
        let mut out = vec![0xff, 0xfe, 0x00];
        out.extend_from_slice(SUCCESS_SIGNAL.as_bytes());
        out.push(0x80);
        assert_eq!(classify(0, &out), IterationOutcome::JobDone);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(IterationOutcome::JobDone.to_string(), "job-done");
        assert_eq!(IterationOutcome::Failure.to_string(), "failure");
        assert_eq!(IterationOutcome::Success.to_string(), "success");
    }
}
