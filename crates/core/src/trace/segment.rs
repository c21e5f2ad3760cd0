use tracing::debug;

use crate::model::span::FlatSpan;
use crate::model::turn::{ConversationTurn, SentinelKind, TurnType};

enum SegmentState {
    NoActiveTurn,
    AccumulatingTurn(TurnAccumulator),
}

struct TurnAccumulator {
    turn_type: TurnType,
    title: String,
    spans: Vec<FlatSpan>,
}

impl TurnAccumulator {
    fn open(sentinel: &FlatSpan) -> Self {
        Self {
            turn_type: classify_turn(&sentinel.span.name),
            title: sentinel.span.name.clone(),
            spans: vec![sentinel.clone()],
        }
    }

    fn finish(self, ordinal: usize) -> ConversationTurn {
        let start_time_ns = self
            .spans
            .iter()
            .map(|f| f.span.order_key())
            .min()
            .unwrap_or(0);
        let duration_ms = self
            .spans
            .iter()
            .map(|f| f.span.effective_duration_ms())
            .sum();

        ConversationTurn {
            id: format!("turn-{ordinal}-{}", self.turn_type),
            turn_type: self.turn_type,
            title: self.title,
            spans: self.spans,
            start_time_ns,
            duration_ms,
        }
    }
}

/// Turn type for a sentinel name. Unknown names fall back to session
/// management.
pub fn classify_turn(name: &str) -> TurnType {
    SentinelKind::from_name(name)
        .map(SentinelKind::turn_type)
        .unwrap_or(TurnType::SessionManagement)
}

/// Groups a flattened span sequence into conversation turns.
///
/// Each sentinel span opens a turn that runs up to (not including) the next
/// sentinel. Spans seen before the first sentinel belong to no turn.
pub fn segment(flat: &[FlatSpan]) -> Vec<ConversationTurn> {
    let mut turns = Vec::new();
    let mut state = SegmentState::NoActiveTurn;
    let mut unassigned = 0usize;

    for span in flat {
        if SentinelKind::from_name(&span.span.name).is_some() {
            let previous = std::mem::replace(
                &mut state,
                SegmentState::AccumulatingTurn(TurnAccumulator::open(span)),
            );
            if let SegmentState::AccumulatingTurn(acc) = previous {
                let ordinal = turns.len();
                turns.push(acc.finish(ordinal));
            }
            continue;
        }

        match &mut state {
            SegmentState::AccumulatingTurn(acc) => acc.spans.push(span.clone()),
            SegmentState::NoActiveTurn => unassigned += 1,
        }
    }

    if let SegmentState::AccumulatingTurn(acc) = state {
        let ordinal = turns.len();
        turns.push(acc.finish(ordinal));
    }

    if unassigned > 0 {
        debug!(unassigned, "spans before the first sentinel have no turn");
    }

    turns
}
