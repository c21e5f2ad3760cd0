pub mod span;
pub mod turn;
