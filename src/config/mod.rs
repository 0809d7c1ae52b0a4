pub mod settings;

pub use settings::{Config, expand_home};
