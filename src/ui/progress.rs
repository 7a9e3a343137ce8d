use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

/// Typed progress events for terminal rendering
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Transient status, replaced by the next event
    Spinner { text: String },
    /// Permanent `✓` line
    Success { text: String },
    /// Permanent `✗` line
    Error { text: String },
}

impl ProgressEvent {
    pub fn spinner(text: impl Into<String>) -> Self {
        ProgressEvent::Spinner { text: text.into() }
    }

    pub fn success(text: impl Into<String>) -> Self {
        ProgressEvent::Success { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        ProgressEvent::Error { text: text.into() }
    }

    /// Line printed for permanent events; `None` for transient ones
    pub fn persisted_line(&self) -> Option<String> {
        match self {
            ProgressEvent::Spinner { .. } => None,
            ProgressEvent::Success { text } => Some(format!("{} {}", "✓".green(), text)),
            ProgressEvent::Error { text } => Some(format!("{} {}", "✗".red(), text)),
        }
    }
}

/// Renders progress events: a spinner on a terminal, plain lines otherwise
pub struct ProgressPrinter {
    spinner: Option<ProgressBar>,
}

impl ProgressPrinter {
    pub fn new() -> Self {
        let spinner = std::io::stdout().is_terminal().then(|| {
            let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });
        Self { spinner }
    }

    pub fn on_event(&self, event: ProgressEvent) {
        match (&self.spinner, event.persisted_line()) {
            (Some(pb), Some(line)) => pb.println(line),
            (None, Some(line)) => println!("{}", line),
            (Some(pb), None) => {
                if let ProgressEvent::Spinner { text } = event {
                    pb.set_message(text);
                }
            }
            (None, None) => {}
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.spinner {
            pb.finish_and_clear();
        }
    }
}

impl Default for ProgressPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProgressPrinter {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_final_events_persist() {
        colored::control::set_override(false);
        assert_eq!(ProgressEvent::spinner("Downloading 2023").persisted_line(), None);
        assert_eq!(
            ProgressEvent::success("Saved: x.csv").persisted_line().as_deref(),
            Some("✓ Saved: x.csv")
        );
        assert_eq!(
            ProgressEvent::error("No data for PETR4").persisted_line().as_deref(),
            Some("✗ No data for PETR4")
        );
    }
}
