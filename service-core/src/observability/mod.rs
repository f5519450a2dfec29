pub mod logging;
pub mod outbound;

pub use logging::init_tracing;
pub use outbound::{TRACEPARENT_HEADER, inject_trace_headers};
