//! Colored status messages for the terminal

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

fn print_prefixed(mut out: impl std::io::Write, color: Color, prefix: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(prefix),
        ResetColor,
        Print(msg),
        Print("\r\n")
    );
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_prefixed(std::io::stdout(), Color::Green, "✓ ", msg);
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr so it never mixes with console output.
pub fn print_error(msg: &str) {
    print_prefixed(std::io::stderr(), Color::Red, "✗ ", msg);
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    print_prefixed(std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    print_prefixed(std::io::stdout(), Color::Cyan, "ℹ ", msg);
}
