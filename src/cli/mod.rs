pub mod ascii_preview;
pub mod report;

pub use ascii_preview::{AsciiRenderer, TerminalOperator, clear_screen};
