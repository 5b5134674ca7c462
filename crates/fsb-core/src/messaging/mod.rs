//! Transport abstractions: the outbound port, its throttling decorator and the
//! inbound update model.

pub mod port;
pub mod throttled;
pub mod types;
