//! Calendar document parsing and generation.
//!
//! Parsing is deliberately permissive (published feeds are messy); generation
//! is strict enough for common calendar clients to accept the output.

mod generate;
mod parse;
mod text;

pub use generate::{CalendarMetadata, RenderedCalendar, generate_feed, render_calendar};
pub use parse::{ParseOptions, parse_feed};
pub use text::{escape_text, unescape_text};
