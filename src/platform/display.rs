use tracing::info;

/// Small text display for connection progress.
pub trait StatusDisplay: Send {
    fn show(&mut self, text: &str);
}

/// Writes display text to the log.
#[derive(Debug, Default)]
pub struct LogDisplay {
    last: String,
}

impl StatusDisplay for LogDisplay {
    fn show(&mut self, text: &str) {
        if self.last != text {
            info!("[display] {}", text);
            self.last = text.to_string();
        }
    }
}
