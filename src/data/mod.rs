//! Small value helpers shared by settings, the CLI and output.
//!
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "1s", "500ms")
//! - [`instant`]: Parsing of RFC 3339 instants for historical ranges

pub mod duration;
pub mod instant;

pub use duration::{format_duration, parse_duration};
pub use instant::parse_instant;
