use std::cmp::Ordering;

use crate::model::span::FlatSpan;
use crate::trace::tree::SpanTree;

/// Pre-order, depth-first walk of the tree. Roots and every child list are
/// visited in chronological order, so a parent always precedes its
/// descendants and sibling subtrees never interleave.
pub fn flatten(tree: &SpanTree) -> Vec<FlatSpan> {
    flatten_order(tree)
        .into_iter()
        .map(|idx| FlatSpan {
            span: tree.span(idx).clone(),
            level: tree.level(idx),
            child_count: tree.children(idx).len(),
        })
        .collect()
}

/// Arena indices in display order.
pub fn flatten_order(tree: &SpanTree) -> Vec<usize> {
    let mut out = Vec::with_capacity(tree.len());
    let mut stack = chronological(tree, tree.roots());
    stack.reverse();

    while let Some(idx) = stack.pop() {
        out.push(idx);
        let kids = chronological(tree, tree.children(idx));
        stack.extend(kids.into_iter().rev());
    }

    out
}

fn chronological(tree: &SpanTree, ids: &[usize]) -> Vec<usize> {
    let mut ids = ids.to_vec();
    ids.sort_by(|&a, &b| compare_spans(tree, a, b));
    ids
}

// `order_key` first; start time then storage id keep ties reproducible.
fn compare_spans(tree: &SpanTree, a: usize, b: usize) -> Ordering {
    let (sa, sb) = (tree.span(a), tree.span(b));
    sa.order_key()
        .cmp(&sb.order_key())
        .then_with(|| sa.start_time_ns.cmp(&sb.start_time_ns))
        .then_with(|| sa.id.cmp(&sb.id))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::span::Span;
    use crate::trace::tree::build;

    fn span(span_id: &str, parent: Option<&str>, start: i64) -> Span {
        Span {
            id: format!("row-{span_id}"),
            span_id: span_id.to_string(),
            parent_span_id: parent.map(str::to_string),
            name: span_id.to_string(),
            operation_type: "general".to_string(),
            start_time_ns: Some(start),
            end_time_ns: None,
            duration_ms: None,
            captured_at: None,
            status: None,
            attributes: serde_json::Value::Null,
            events: serde_json::Value::Null,
        }
    }

    fn names(flat: &[FlatSpan]) -> Vec<&str> {
        flat.iter().map(|f| f.span.name.as_str()).collect()
    }

    #[test]
    fn emits_pre_order_with_chronological_siblings() {
        let tree = build(vec![
            span("late_root", None, 100),
            span("root", None, 0),
            span("b", Some("root"), 20),
            span("a", Some("root"), 10),
            span("a1", Some("a"), 11),
            span("late_kid", Some("late_root"), 101),
        ]);

        let flat = flatten(&tree);
        assert_eq!(
            names(&flat),
            vec!["root", "a", "a1", "b", "late_root", "late_kid"]
        );
        let levels: Vec<u32> = flat.iter().map(|f| f.level).collect();
        assert_eq!(levels, vec![0, 1, 2, 1, 0, 1]);
        assert_eq!(flat[0].child_count, 2);
    }

    #[test]
    fn captured_at_overrides_start_time_for_ordering() {
        let mut first = span("first", None, 500);
        first.captured_at = Some(Utc.timestamp_nanos(1));
        let tree = build(vec![span("second", None, 2), first]);
        assert_eq!(names(&flatten(&tree)), vec!["first", "second"]);
    }

    #[test]
    fn parent_precedes_every_descendant() {
        let tree = build(vec![
            span("c", Some("b"), 1),
            span("b", Some("a"), 50),
            span("a", None, 99),
            span("d", Some("a"), 0),
        ]);
        let flat = flatten(&tree);
        let pos = |name: &str| flat.iter().position(|f| f.span.name == name).unwrap();

        for f in &flat {
            if let Some(parent) = f.span.parent_span_id() {
                assert!(pos(parent) < pos(&f.span.name));
            }
        }
    }

    #[test]
    fn ties_fall_back_to_storage_id() {
        let tree = build(vec![span("y", None, 7), span("x", None, 7)]);
        assert_eq!(names(&flatten(&tree)), vec!["x", "y"]);
    }

    #[test]
    fn order_does_not_depend_on_input_order() {
        let spans = vec![
            span("root", None, 0),
            span("k1", Some("root"), 3),
            span("k2", Some("root"), 1),
            span("k3", Some("k2"), 2),
        ];
        let mut reversed = spans.clone();
        reversed.reverse();

        assert_eq!(
            names(&flatten(&build(spans))),
            names(&flatten(&build(reversed)))
        );
    }
}
