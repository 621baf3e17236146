pub mod parse;
pub mod render;
pub mod sources;

use calfeed_core::CollectingSink;
use owo_colors::OwoColorize;

/// Print a short summary of everything that degraded during a run.
pub fn print_diagnostics(sink: &CollectingSink) {
    let diagnostics = sink.diagnostics();
    if diagnostics.is_empty() {
        return;
    }

    eprintln!(
        "{}",
        format!("{} warning(s):", diagnostics.len()).yellow().bold()
    );
    for diagnostic in &diagnostics {
        eprintln!("   {} {}", diagnostic.kind().dimmed(), diagnostic);
    }
}
