//! Terminal color constants and helpers for CLI output.

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const RED: &str = "\x1b[31m";

/// Print a bold title followed by a rule.
pub fn header(title: &str) {
    println!("\n{BOLD}{title}{RESET}");
    println!("{}", "─".repeat(50));
}

/// Print a green status word followed by a message.
pub fn done(status: &str, message: impl std::fmt::Display) {
    println!("{GREEN}{status}{RESET} {message}");
}

/// Print a yellow warning line to stdout.
pub fn note(message: impl std::fmt::Display) {
    println!("{YELLOW}warning:{RESET} {message}");
}
