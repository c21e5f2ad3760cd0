//! Pure reconstruction pipeline: snapshot -> tree -> flattened order -> turns.
//!
//! Nothing in here performs I/O; every pass is a plain function over the
//! current span snapshot, so the whole view can be rebuilt after each page.

pub mod flatten;
pub mod segment;
pub mod tree;
pub mod view;

pub use flatten::flatten;
pub use segment::segment;
pub use tree::{SpanTree, build};
pub use view::{TraceStats, TraceView, recompute};
