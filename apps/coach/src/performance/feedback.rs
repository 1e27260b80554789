//! End-of-session feedback text. Pure function of level, session and whether
//! the level changed.

use crate::leveling::LiveLevel;
use crate::performance::tracker::PerformanceSession;

/// (min accuracy, template) bands used when the level did not change.
/// `{c}` correct, `{t}` total, `{p}` rounded accuracy percent.
const ACCURACY_BANDS: &[(f64, &str)] = &[
    (
        0.8,
        "Excellent work! You answered {c} of {t} questions correctly ({p}%). You're ready for tougher questions.",
    ),
    (
        0.6,
        "Good job! You answered {c} of {t} questions correctly ({p}%). Keep practicing to reach the next level.",
    ),
    (
        0.4,
        "Fair effort. You answered {c} of {t} questions correctly ({p}%). Review the topics you missed and try again.",
    ),
];

const NEEDS_IMPROVEMENT: &str =
    "Keep at it. You answered {c} of {t} questions correctly ({p}%). Focus on the fundamentals before moving on.";

const LEVEL_CHANGE: &str =
    "Congratulations! Your performance has moved you to the {level} level. You answered {c} of {t} questions correctly ({p}%).";

pub fn generate_feedback(level: LiveLevel, session: &PerformanceSession, level_changed: bool) -> String {
    let accuracy = session.accuracy();

    let template = if level_changed {
        LEVEL_CHANGE
    } else {
        ACCURACY_BANDS
            .iter()
            .find(|(min, _)| accuracy >= *min)
            .map(|(_, template)| *template)
            .unwrap_or(NEEDS_IMPROVEMENT)
    };

    template
        .replace("{level}", level.display_name())
        .replace("{c}", &session.correct.to_string())
        .replace("{t}", &session.total.to_string())
        .replace("{p}", &percent(accuracy).to_string())
}

pub fn percent(ratio: f64) -> u32 {
    (ratio * 100.0).round() as u32
}
