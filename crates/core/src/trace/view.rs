use serde::{Deserialize, Serialize};

use crate::model::span::{FlatSpan, Span};
use crate::model::turn::ConversationTurn;
use crate::trace::flatten::flatten;
use crate::trace::segment::segment;
use crate::trace::tree::build;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TraceStats {
    pub span_count: usize,
    pub root_count: usize,
    pub orphan_count: usize,
    pub error_count: usize,
    pub max_level: u32,
    pub cycles_broken: usize,
    pub turn_count: usize,
}

/// Everything a renderer needs for one trace, derived from a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceView {
    pub flat_spans: Vec<FlatSpan>,
    pub turns: Vec<ConversationTurn>,
    pub stats: TraceStats,
}

/// Rebuilds tree, flattened order and turns from scratch.
pub fn recompute(snapshot: Vec<Span>) -> TraceView {
    let tree = build(snapshot);
    let flat_spans = flatten(&tree);
    let turns = segment(&flat_spans);

    let stats = TraceStats {
        span_count: tree.len(),
        root_count: tree.roots().len(),
        orphan_count: tree.orphan_count(),
        error_count: tree.spans().iter().filter(|s| s.is_error()).count(),
        max_level: tree.max_level(),
        cycles_broken: tree.cycles_broken(),
        turn_count: turns.len(),
    };

    TraceView {
        flat_spans,
        turns,
        stats,
    }
}

impl TraceView {
    /// No spans loaded: the "no data" state, not an error.
    pub fn is_empty(&self) -> bool {
        self.flat_spans.is_empty()
    }

    pub fn find(&self, span_id: &str) -> Option<&FlatSpan> {
        self.flat_spans.iter().find(|f| f.span.span_id == span_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::turn::TurnType;

    fn span(id: &str, name: &str, parent: Option<&str>, start: i64, dur: Option<f64>) -> Span {
        Span {
            id: id.to_string(),
            span_id: id.to_string(),
            parent_span_id: parent.map(str::to_string),
            name: name.to_string(),
            operation_type: "general".to_string(),
            start_time_ns: Some(start),
            end_time_ns: None,
            duration_ms: dur,
            captured_at: None,
            status: None,
            attributes: serde_json::Value::Null,
            events: serde_json::Value::Null,
        }
    }

    fn voice_session() -> Vec<Span> {
        vec![
            span("1", "start_agent_activity", None, 0, None),
            span("2", "user_turn", None, 10, None),
            span("3", "stt", Some("2"), 11, None),
            span("4", "assistant_turn", None, 20, None),
            span("5", "llm", Some("4"), 21, Some(500.0)),
        ]
    }

    #[test]
    fn voice_session_yields_three_turns() {
        let view = recompute(voice_session());

        let shape: Vec<(TurnType, Vec<&str>)> = view
            .turns
            .iter()
            .map(|t| {
                (
                    t.turn_type,
                    t.spans.iter().map(|f| f.span.name.as_str()).collect(),
                )
            })
            .collect();
        assert_eq!(
            shape,
            vec![
                (TurnType::SessionManagement, vec!["start_agent_activity"]),
                (TurnType::UserTurn, vec!["user_turn", "stt"]),
                (TurnType::AssistantTurn, vec!["assistant_turn", "llm"]),
            ]
        );
        assert_eq!(view.turns[2].duration_ms, 500.0);
        assert_eq!(view.stats.turn_count, 3);
        assert_eq!(view.stats.root_count, 3);
        assert_eq!(view.stats.max_level, 1);
    }

    #[test]
    fn late_parent_reparents_orphan_on_rebuild() {
        let page_one = vec![span("5", "llm", Some("4"), 21, Some(500.0))];
        let first = recompute(page_one.clone());
        assert_eq!(first.stats.orphan_count, 1);
        assert_eq!(first.find("5").unwrap().level, 0);

        let mut both = page_one;
        both.push(span("4", "assistant_turn", None, 20, None));
        let second = recompute(both);
        assert_eq!(second.stats.orphan_count, 0);
        assert_eq!(second.find("4").unwrap().level, 0);
        assert_eq!(second.find("5").unwrap().level, 1);
        assert_eq!(second.flat_spans[0].span.span_id, "4");
    }

    #[test]
    fn every_span_after_first_sentinel_is_in_one_turn() {
        let mut spans = voice_session();
        spans.insert(0, span("0", "boot", None, -5, None));
        spans.push(span("6", "tool", Some("5"), 22, Some(3.0)));
        let view = recompute(spans);

        let first_sentinel = view
            .flat_spans
            .iter()
            .position(|f| f.span.name == "start_agent_activity")
            .unwrap();
        for (idx, flat) in view.flat_spans.iter().enumerate() {
            let hits = view
                .turns
                .iter()
                .flat_map(|t| t.spans.iter())
                .filter(|m| m.span.id == flat.span.id)
                .count();
            let expected = if idx >= first_sentinel { 1 } else { 0 };
            assert_eq!(hits, expected, "span {}", flat.span.id);
        }
    }

    #[test]
    fn empty_snapshot_is_no_data() {
        let view = recompute(Vec::new());
        assert!(view.is_empty());
        assert!(view.turns.is_empty());
        assert_eq!(view.stats, TraceStats::default());
    }
}
