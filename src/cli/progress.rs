//! Progress and console output utilities
//!
//! Spinner styling and boxed headers shared by the CLI commands, plus the
//! writer that mirrors log output to a file.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::Duration;

// ============================================================================
// Styles
// ============================================================================

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷")
}

/// Start a spinner for a network round trip
pub fn request_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

// ============================================================================
// Console output helpers
// ============================================================================

/// Print a header section with a box
pub fn print_header(title: &str) {
    let width = 68;
    let title_padded = format!("{:^width$}", title, width = width - 4);
    println!();
    println!("╔{}╗", "═".repeat(width - 2));
    println!("║{}║", title_padded);
    println!("╚{}╝", "═".repeat(width - 2));
    println!();
}

pub fn print_success(msg: &str) {
    println!("  ✓ {}", msg);
}

pub fn print_info(msg: &str) {
    println!("  • {}", msg);
}

pub fn print_error(msg: &str) {
    println!("  ✗ {}", msg);
}

// ============================================================================
// Log writer
// ============================================================================

/// Writes log lines to stderr and a log file
pub struct DualWriter {
    pub console: std::io::Stderr,
    pub file: std::fs::File,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self.console.write(buf);
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_dual_writer_writes_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let mut writer = DualWriter {
            console: std::io::stderr(),
            file: tmp.reopen().unwrap(),
        };
        writer.write_all(b"scanner log line\n").unwrap();
        writer.flush().unwrap();

        let mut content = String::new();
        tmp.read_to_string(&mut content).unwrap();
        assert_eq!(content, "scanner log line\n");
    }
}
