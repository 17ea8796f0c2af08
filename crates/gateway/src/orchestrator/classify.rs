//! Deterministic complex-request classifier.
//!
//! A fixed regex pattern set maps user messages onto a category and the
//! high-level tool that usually serves it. The match only produces a hint
//! injected into the system prompt — the model stays free to choose
//! differently.

use regex::RegexSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hint {
    pub category: &'static str,
    pub preferred_tool: &'static str,
}

/// Ordered rules: the first matching pattern wins, so classification is
/// deterministic regardless of message content overlap.
const RULES: &[(&str, &str, &str)] = &[
    (
        r"(?i)\b(analytics|statistics|kpi|utilization|occupancy rate)\b",
        "analytics",
        "ai_master_request",
    ),
    (
        r"(?i)\b(dashboard|hospital overview|status summary)\b",
        "dashboard",
        "ai_master_request",
    ),
    (
        r"(?i)\b(forecast|predict|projection|stockout|run(ning)? out)\b",
        "forecast",
        "run_predictive_forecast",
    ),
    (
        r"(?i)\b(translate|translation)\b",
        "translation",
        "translate_text",
    ),
    (
        r"(?i)\bequipment\b.*\b(maintenance|lifecycle|service|calibration)\b",
        "equipment_lifecycle",
        "schedule_equipment_maintenance",
    ),
    (
        r"(?i)\b(real[- ]?time|monitor(ing)?|live status|time remaining)\b",
        "real_time_monitoring",
        "get_bed_status_with_time_remaining",
    ),
];

pub struct RequestClassifier {
    set: RegexSet,
}

impl RequestClassifier {
    pub fn new() -> Self {
        let set = RegexSet::new(RULES.iter().map(|(pattern, _, _)| *pattern))
            .expect("classifier patterns are statically valid");
        Self { set }
    }

    pub fn classify(&self, message: &str) -> Option<Hint> {
        let matches = self.set.matches(message);
        RULES
            .iter()
            .enumerate()
            .find(|(i, _)| matches.matched(*i))
            .map(|(_, &(_, category, preferred_tool))| Hint {
                category,
                preferred_tool,
            })
    }
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_category() {
        let c = RequestClassifier::new();
        let cases = [
            ("show me bed occupancy rate for March", "analytics"),
            ("give me the hospital overview", "dashboard"),
            ("forecast our saline stock", "forecast"),
            ("translate the discharge summary", "translation"),
            ("the MRI equipment needs maintenance soon", "equipment_lifecycle"),
            ("real-time status of bed 101A please", "real_time_monitoring"),
        ];
        for (message, expected) in cases {
            let hint = c.classify(message).unwrap_or_else(|| panic!("no hint for: {message}"));
            assert_eq!(hint.category, expected, "message: {message}");
        }
    }

    #[test]
    fn plain_requests_produce_no_hint() {
        let c = RequestClassifier::new();
        assert!(c.classify("admit Jane Roe born 1990-02-01").is_none());
        assert!(c.classify("what beds are free?").is_none());
    }

    #[test]
    fn first_rule_wins_on_overlap() {
        let c = RequestClassifier::new();
        // Matches both analytics and forecast; analytics is declared first.
        let hint = c.classify("analytics forecast for supplies").unwrap();
        assert_eq!(hint.category, "analytics");
    }
}
