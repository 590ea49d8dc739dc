//! Narrative progress: objectives and career affinities.
//!
//! Progress is only ever changed by structured output from the privileged
//! orchestrator agent, through the pure reducer [`apply_orchestrator_output`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Number of completed objectives that counts as 100% progress.
pub const PROGRESS_GOAL: usize = 5;

/// Lifecycle of a single objective. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// A narrative objective the orchestrator can mark as completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    /// Semantic tag the orchestrator reports as `intent`
    pub tag: String,
    pub name: String,
    pub description: String,
    pub status: ObjectiveStatus,
}

impl Objective {
    fn pending(tag: &str, name: &str, description: &str) -> Self {
        Self {
            tag: tag.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            status: ObjectiveStatus::NotStarted,
        }
    }
}

/// Integer affinity counters, one per STEM career.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityScores {
    pub biotechnology: i64,
    pub robotics: i64,
    pub software_engineering: i64,
    pub data_science: i64,
    pub environmental_engineering: i64,
}

impl AffinityScores {
    /// Add `delta` to the counter named `key`. Both snake_case and camelCase
    /// names are accepted. Returns `false` for unknown names.
    pub fn apply_delta(&mut self, key: &str, delta: i64) -> bool {
        let slot = match key {
            "biotechnology" => &mut self.biotechnology,
            "robotics" => &mut self.robotics,
            "software_engineering" | "softwareEngineering" => &mut self.software_engineering,
            "data_science" | "dataScience" => &mut self.data_science,
            "environmental_engineering" | "environmentalEngineering" => {
                &mut self.environmental_engineering
            }
            _ => return false,
        };
        *slot = slot.saturating_add(delta);
        true
    }

    /// Counters as (name, value) pairs, in declaration order.
    pub fn entries(&self) -> [(&'static str, i64); 5] {
        [
            ("biotechnology", self.biotechnology),
            ("robotics", self.robotics),
            ("software_engineering", self.software_engineering),
            ("data_science", self.data_science),
            ("environmental_engineering", self.environmental_engineering),
        ]
    }
}

/// Objectives plus affinities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub objectives: Vec<Objective>,
    pub affinity: AffinityScores,
}

impl ProgressState {
    /// The default objective catalogue with zeroed affinities.
    pub fn initial() -> Self {
        Self {
            objectives: vec![
                Objective::pending(
                    "introduce_yourself",
                    "Introduce Yourself",
                    "Send your first message in the group to say hello and present yourself.",
                ),
                Objective::pending(
                    "choose_your_role",
                    "Choose Your Role",
                    "Decide whether you'll focus on Biotechnology, Robotics, Data Science, or Software Engineering.",
                ),
                Objective::pending(
                    "join_project_group",
                    "Join a Project Group",
                    "Join or chat in the project group chat.",
                ),
                Objective::pending(
                    "first_dm",
                    "Initiate a DM",
                    "Send a private message to one character to build rapport.",
                ),
                Objective::pending(
                    "make_a_technical_decision",
                    "Make a Technical Decision",
                    "Choose a specific sensor or analysis method in the group discussion.",
                ),
                Objective::pending(
                    "share_a_resource",
                    "Support a Teammate",
                    "Offer help or encouragement to a character during a setback.",
                ),
                Objective::pending(
                    "resolve_a_crisis",
                    "Resolve a Crisis",
                    "Respond to a field-test failure and propose a solution collaboratively.",
                ),
                Objective::pending(
                    "define_presentation_focus",
                    "Define Presentation Focus",
                    "Select the angle for your final pitch: technical, ecological, or UX.",
                ),
                Objective::pending(
                    "contribute_pitch_idea",
                    "Contribute a Pitch Idea",
                    "Share at least one concrete idea for the final presentation.",
                ),
                Objective::pending(
                    "reach_story_completion",
                    "Reach Story Completion",
                    "Finish all chapters and reveal your top STEM career affinities.",
                ),
            ],
            affinity: AffinityScores::default(),
        }
    }

    /// Semantic tags of every objective, in catalogue order.
    pub fn semantic_tags(&self) -> Vec<&str> {
        self.objectives.iter().map(|o| o.tag.as_str()).collect()
    }

    /// Number of completed objectives.
    pub fn completed_count(&self) -> usize {
        self.objectives
            .iter()
            .filter(|o| o.status == ObjectiveStatus::Completed)
            .count()
    }

    /// Percentage of [`PROGRESS_GOAL`] reached, capped at 100.
    pub fn progress_percent(&self) -> f64 {
        let pct = self.completed_count() as f64 / PROGRESS_GOAL as f64 * 100.0;
        pct.min(100.0)
    }

    /// Look up an objective by tag.
    pub fn objective(&self, tag: &str) -> Option<&Objective> {
        self.objectives.iter().find(|o| o.tag == tag)
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Structured output the privileged orchestrator is instructed to emit.
///
/// Every key is optional; an absent key means "no update".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorOutput {
    #[serde(default)]
    pub intent: Option<String>,

    #[serde(default, rename = "scoreUpdates")]
    pub score_updates: Option<HashMap<String, i64>>,

    #[serde(default, rename = "systemMessages")]
    pub system_messages: Option<Vec<String>>,
}

impl OrchestratorOutput {
    /// Parse raw generated text. Surrounding whitespace and a markdown code
    /// fence (```json ... ```) are tolerated.
    pub fn parse(raw: &str) -> std::result::Result<Self, ParseError> {
        let body = strip_code_fence(raw.trim());
        if body.is_empty() {
            return Err(ParseError::Empty);
        }
        serde_json::from_str(body).map_err(|e| ParseError::OrchestratorOutput(e.to_string()))
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Apply one orchestrator output to a progress state.
///
/// - `scoreUpdates` deltas accumulate into the matching counters; unknown
///   names are ignored.
/// - A non-empty `intent` equal to an objective tag completes it. Completing
///   an already completed objective is a no-op.
/// - `systemMessages` do not touch progress; the engine surfaces them.
pub fn apply_orchestrator_output(
    mut state: ProgressState,
    output: &OrchestratorOutput,
) -> ProgressState {
    if let Some(updates) = &output.score_updates {
        for (key, delta) in updates {
            state.affinity.apply_delta(key, *delta);
        }
    }

    if let Some(intent) = output.intent.as_deref().map(str::trim)
        && !intent.is_empty()
        && let Some(objective) = state.objectives.iter_mut().find(|o| o.tag == intent)
    {
        objective.status = ObjectiveStatus::Completed;
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_has_ten_pending_objectives() {
        let state = ProgressState::initial();
        assert_eq!(state.objectives.len(), 10);
        assert_eq!(state.semantic_tags()[0], "introduce_yourself");
        assert_eq!(state.semantic_tags()[9], "reach_story_completion");
        assert_eq!(state.completed_count(), 0);
        assert_eq!(state.affinity, AffinityScores::default());
    }

    #[test]
    fn score_updates_accumulate_and_ignore_unknown() {
        let output = OrchestratorOutput::parse(
            r#"{"scoreUpdates": {"robotics": 2, "softwareEngineering": 1, "astrology": 9}}"#,
        )
        .unwrap();

        let state = apply_orchestrator_output(ProgressState::initial(), &output);
        let state = apply_orchestrator_output(state, &output);

        assert_eq!(state.affinity.robotics, 4);
        assert_eq!(state.affinity.software_engineering, 2);
        assert_eq!(state.affinity.biotechnology, 0);
    }

    #[test]
    fn negative_deltas_decrease_counters() {
        let mut scores = AffinityScores::default();
        assert!(scores.apply_delta("data_science", -3));
        assert_eq!(scores.data_science, -3);
        assert!(!scores.apply_delta("chemistry", 1));
    }

    #[test]
    fn intent_completes_objective_idempotently() {
        let output = OrchestratorOutput::parse(r#"{"intent": "introduce_yourself"}"#).unwrap();

        let once = apply_orchestrator_output(ProgressState::initial(), &output);
        let twice = apply_orchestrator_output(once.clone(), &output);

        assert_eq!(
            once.objective("introduce_yourself").unwrap().status,
            ObjectiveStatus::Completed
        );
        assert_eq!(once, twice);
        assert_eq!(twice.completed_count(), 1);
    }

    #[test]
    fn empty_or_unknown_intent_changes_nothing() {
        let empty = OrchestratorOutput {
            intent: Some("  ".into()),
            ..Default::default()
        };
        let unknown = OrchestratorOutput {
            intent: Some("fly_to_mars".into()),
            ..Default::default()
        };
        let initial = ProgressState::initial();
        assert_eq!(apply_orchestrator_output(initial.clone(), &empty), initial);
        assert_eq!(apply_orchestrator_output(initial.clone(), &unknown), initial);
    }

    #[test]
    fn progress_percent_caps_at_hundred() {
        let mut state = ProgressState::initial();
        for o in state.objectives.iter_mut().take(2) {
            o.status = ObjectiveStatus::Completed;
        }
        assert_eq!(state.progress_percent(), 40.0);

        for o in state.objectives.iter_mut() {
            o.status = ObjectiveStatus::Completed;
        }
        assert_eq!(state.progress_percent(), 100.0);
    }

    #[test]
    fn parse_accepts_code_fence() {
        let raw = "```json\n{\"intent\": \"first_dm\", \"systemMessages\": [\"DM unlocked\"]}\n```";
        let output = OrchestratorOutput::parse(raw).unwrap();
        assert_eq!(output.intent.as_deref(), Some("first_dm"));
        assert_eq!(output.system_messages.unwrap(), vec!["DM unlocked"]);
        assert!(output.score_updates.is_none());
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(matches!(
            OrchestratorOutput::parse("Sure! The user introduced themselves."),
            Err(ParseError::OrchestratorOutput(_))
        ));
        assert!(matches!(OrchestratorOutput::parse("   "), Err(ParseError::Empty)));
    }
}
