pub mod driver;
pub mod duck;
pub mod http;
pub mod session;
pub mod source;

pub use driver::{PageRequest, PaginationDriver, Step};
pub use duck::DuckDbSource;
pub use http::HttpSource;
pub use session::{
    FetchOutcome, LoadState, MAX_AUTOLOAD_FAILURES, SessionController, SessionStatus,
};
pub use source::SpanSource;
