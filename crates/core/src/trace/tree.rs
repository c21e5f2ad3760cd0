use std::collections::HashMap;

use tracing::warn;

use crate::model::span::Span;

/// Parent/child structure over one span snapshot.
///
/// Spans live in a flat arena; links are indices into it. Every span is
/// either a root or a child of exactly one parent.
#[derive(Debug, Clone, Default)]
pub struct SpanTree {
    spans: Vec<Span>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    levels: Vec<u32>,
    roots: Vec<usize>,
    by_span_id: HashMap<String, usize>,
    orphan_count: usize,
    cycles_broken: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

pub fn build(spans: Vec<Span>) -> SpanTree {
    let n = spans.len();

    let mut by_span_id: HashMap<String, usize> = HashMap::with_capacity(n);
    for (idx, span) in spans.iter().enumerate() {
        if by_span_id.contains_key(&span.span_id) {
            warn!(
                span_id = %span.span_id,
                id = %span.id,
                "duplicate spanId in trace, children attach to the first occurrence"
            );
            continue;
        }
        by_span_id.insert(span.span_id.clone(), idx);
    }

    let mut orphan_count = 0;
    let mut parents: Vec<Option<usize>> = Vec::with_capacity(n);
    for span in &spans {
        let parent = match span.parent_span_id() {
            None => None,
            Some(parent_id) => {
                let found = by_span_id.get(parent_id).copied();
                if found.is_none() {
                    orphan_count += 1;
                }
                found
            }
        };
        parents.push(parent);
    }

    let cycles_broken = break_cycles(&spans, &mut parents);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (idx, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(idx),
            None => roots.push(idx),
        }
    }

    let mut levels = vec![0u32; n];
    let mut stack = roots.clone();
    while let Some(idx) = stack.pop() {
        for &child in &children[idx] {
            levels[child] = levels[idx] + 1;
            stack.push(child);
        }
    }

    SpanTree {
        spans,
        parents,
        children,
        levels,
        roots,
        by_span_id,
        orphan_count,
        cycles_broken,
    }
}

/// Walks every parent chain once. A chain that comes back to a node on the
/// current path is a cycle; each member of that cycle loses its parent link.
fn break_cycles(spans: &[Span], parents: &mut [Option<usize>]) -> usize {
    let mut marks = vec![Mark::Unvisited; spans.len()];
    let mut path: Vec<usize> = Vec::new();
    let mut broken = 0;

    for start in 0..spans.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }

        let mut cur = start;
        loop {
            match marks[cur] {
                Mark::Done => break,
                Mark::OnPath => {
                    if let Some(from) = path.iter().rposition(|&idx| idx == cur) {
                        let members = &path[from..];
                        warn!(
                            span_id = %spans[cur].span_id,
                            members = members.len(),
                            "cyclic parentage, rooting every span in the cycle"
                        );
                        for &member in members {
                            parents[member] = None;
                        }
                        broken += 1;
                    }
                    break;
                }
                Mark::Unvisited => {
                    marks[cur] = Mark::OnPath;
                    path.push(cur);
                    match parents[cur] {
                        Some(next) => cur = next,
                        None => break,
                    }
                }
            }
        }

        for idx in path.drain(..) {
            marks[idx] = Mark::Done;
        }
    }

    broken
}

impl SpanTree {
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn span(&self, idx: usize) -> &Span {
        &self.spans[idx]
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn children(&self, idx: usize) -> &[usize] {
        &self.children[idx]
    }

    pub fn parent(&self, idx: usize) -> Option<usize> {
        self.parents[idx]
    }

    pub fn level(&self, idx: usize) -> u32 {
        self.levels[idx]
    }

    pub fn max_level(&self) -> u32 {
        self.levels.iter().copied().max().unwrap_or(0)
    }

    /// Arena index of the span with the given logical `spanId`.
    pub fn index_of(&self, span_id: &str) -> Option<usize> {
        self.by_span_id.get(span_id).copied()
    }

    /// Spans whose `parentSpanId` is not (yet) in the snapshot.
    pub fn orphan_count(&self) -> usize {
        self.orphan_count
    }

    pub fn cycles_broken(&self) -> usize {
        self.cycles_broken
    }
}
