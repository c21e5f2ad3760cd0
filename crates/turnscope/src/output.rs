use std::io::IsTerminal;

use chrono::SecondsFormat;
use owo_colors::OwoColorize;
use turnscope_core::model::span::FlatSpan;
use turnscope_core::model::turn::{ConversationTurn, TurnType};
use turnscope_core::query::TraceListItem;
use turnscope_core::time::{format_duration_ms, ns_to_datetime};
use turnscope_core::trace::{TraceStats, TraceView};
use turnscope_feed::SessionStatus;

pub fn print_turns_human(trace_key: &str, view: &TraceView, status: &SessionStatus) {
    print_header(trace_key, &view.stats, status);
    if view.turns.is_empty() {
        println!("no turns");
        return;
    }
    let color = std::io::stdout().is_terminal();
    for (ordinal, turn) in view.turns.iter().enumerate() {
        print_turn(ordinal, turn, color);
    }
    let covered: usize = view.turns.iter().map(|t| t.spans.len()).sum();
    let unassigned = view.flat_spans.len().saturating_sub(covered);
    if unassigned > 0 {
        println!("-- {unassigned} spans before the first turn --");
    }
}

fn print_turn(ordinal: usize, turn: &ConversationTurn, color: bool) {
    let label = turn.turn_type.as_str();
    let label = if !color {
        label.to_string()
    } else {
        match turn.turn_type {
            TurnType::UserTurn => label.green().to_string(),
            TurnType::AssistantTurn => label.cyan().to_string(),
            TurnType::SessionManagement => label.bright_black().to_string(),
        }
    };
    println!(
        "#{ordinal} {label} title=\"{}\" start={} duration={} spans={}",
        turn.title,
        format_ts(turn.start_time_ns),
        format_duration_ms(turn.duration_ms),
        turn.spans.len()
    );

    // Indent relative to the sentinel so nested turns still start at the margin.
    let base = turn.spans.first().map_or(0, |s| s.level);
    for span in turn.spans.iter().skip(1) {
        let depth = span.level.saturating_sub(base) as usize;
        println!("  {}{}", "  ".repeat(depth), span_line(span, color));
    }
}

pub fn print_flat_spans_human(trace_key: &str, view: &TraceView, status: &SessionStatus) {
    print_header(trace_key, &view.stats, status);
    let color = std::io::stdout().is_terminal();
    for span in &view.flat_spans {
        println!("{}{}", "  ".repeat(span.level as usize), span_line(span, color));
    }
}

pub fn print_span_human(span: &FlatSpan) {
    let s = &span.span;
    println!(
        "SPAN {} name={} type={} level={} children={}",
        s.span_id, s.name, s.operation_type, span.level, span.child_count
    );
    println!("id={}", s.id);
    println!("parent={}", s.parent_span_id().unwrap_or("-"));
    if let Some(start) = s.start_time_ns {
        println!("start={}", format_ts(start));
    }
    println!(
        "duration={} status={}",
        format_duration_ms(s.effective_duration_ms()),
        s.status.map_or("-", |st| st.as_str())
    );
    println!("attributes={}", s.attributes);
    println!("events={}", s.events);
}

pub fn print_count_human(trace_key: &str, count: u64) {
    println!("trace={trace_key} spans={count}");
}

pub fn print_traces_human(items: &[TraceListItem]) {
    for item in items {
        let first = item.first_start_ns.map_or_else(|| "-".to_string(), format_ts);
        println!(
            "trace={} spans={} first={}",
            item.trace_key, item.span_count, first
        );
    }
    println!("-- {} traces --", items.len());
}

fn print_header(trace_key: &str, stats: &TraceStats, status: &SessionStatus) {
    println!(
        "TRACE {trace_key} spans={} roots={} turns={} errors={} max_level={}",
        stats.span_count, stats.root_count, stats.turn_count, stats.error_count, stats.max_level
    );
    if stats.orphan_count > 0 || stats.cycles_broken > 0 {
        println!(
            "orphans={} cycles_broken={}",
            stats.orphan_count, stats.cycles_broken
        );
    }
    if let Some(total) = status.total_hint
        && total != status.loaded as u64
    {
        println!("loaded={} reported={total}", status.loaded);
    }
}

fn span_line(span: &FlatSpan, color: bool) -> String {
    let s = &span.span;
    let duration = format_duration_ms(s.effective_duration_ms());
    let mut line = format!("{} [{}] ({duration})", s.name, s.operation_type);
    if s.is_error() {
        let flag = if color {
            "ERROR".red().to_string()
        } else {
            "ERROR".to_string()
        };
        line.push(' ');
        line.push_str(&flag);
    }
    line
}

fn format_ts(ns: i64) -> String {
    ns_to_datetime(ns).to_rfc3339_opts(SecondsFormat::Millis, true)
}
