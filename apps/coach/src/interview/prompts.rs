//! Scripted interviewer lines.

use crate::interview::machine::{EndReason, InterviewSetup};

pub const INTRO_QUESTION_ID: &str = "intro";

/// First prompt when the Question Service issued the session.
pub const INTRO_PROMPT: &str =
    "To start, please introduce yourself and tell me a little about your background.";

/// First prompt when the session runs on a local fallback id.
pub const GENERIC_INTRO_PROMPT: &str =
    "Let's begin. Tell me about yourself and what draws you to this kind of role.";

const TIMED_OUT_LINE: &str =
    "We're out of time. Thank you for your answers today, your feedback is ready.";

const EXPLICIT_END_LINE: &str = "Thank you for your time today. That concludes our interview.";

const QUESTION_LIMIT_LINE: &str =
    "That was the last question. Thank you, your feedback is ready.";

pub fn welcome_line(setup: &InterviewSetup) -> String {
    format!(
        "Hello {}, welcome to your {} interview. We have {} together.",
        setup.candidate_name.trim(),
        setup.role.trim(),
        format_duration(setup.duration_secs)
    )
}

pub fn closing_line(reason: EndReason) -> &'static str {
    match reason {
        EndReason::TimedOut => TIMED_OUT_LINE,
        EndReason::Explicit => EXPLICIT_END_LINE,
        EndReason::QuestionLimit => QUESTION_LIMIT_LINE,
    }
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        return plural(secs, "second");
    }
    plural((secs + 30) / 60, "minute")
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(1), "1 second");
        assert_eq!(format_duration(45), "45 seconds");
        assert_eq!(format_duration(60), "1 minute");
        assert_eq!(format_duration(900), "15 minutes");
        assert_eq!(format_duration(95), "2 minutes");
    }

    #[test]
    fn test_closing_lines_differ_by_reason() {
        assert_ne!(closing_line(EndReason::TimedOut), closing_line(EndReason::Explicit));
        assert_ne!(closing_line(EndReason::TimedOut), closing_line(EndReason::QuestionLimit));
    }
}
