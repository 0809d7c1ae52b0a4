// Utility functions module
pub mod date_format;
pub mod logging;

pub use date_format::{DateFormat, DateFormatter, format_minutes};
pub use logging::init_logging;
