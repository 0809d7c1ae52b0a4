// Output module
pub mod table;

pub use table::{AlertRow, EscalationRow, OutputFormat, ResponseRow, RuleRow, StatRow};
