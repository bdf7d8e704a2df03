use std::sync::Arc;

/// Type alias for progress callback functions
///
/// The callback receives one finished progress line
pub type ProgressCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Per-step progress reporting for a test run
///
/// Phases report what they are doing as it happens; the callback decides
/// where the lines go. The console reporter prints them, tests capture
/// them, and the disabled reporter drops them.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<Arc<ProgressCallback>>,
}

impl ProgressReporter {
    /// Create a reporter with a custom callback
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// Create a reporter that prints to stdout
    pub fn console() -> Self {
        Self::new(Box::new(|line| println!("{}", line)))
    }

    /// Create a reporter that outputs nothing
    pub fn disabled() -> Self {
        Self { callback: None }
    }

    /// Announce a phase
    pub fn phase(&self, title: &str) {
        self.emit(&format!("-> {}", title));
    }

    /// Report one step or informational line inside a phase
    pub fn detail(&self, text: &str) {
        self.emit(&format!("   {}", text));
    }

    /// Report one judged step with its pass/fail outcome
    pub fn outcome(&self, text: &str, pass: bool) {
        let verdict = if pass { "Pass" } else { "Fail" };
        self.emit(&format!("   {} {}", text, verdict));
    }

    fn emit(&self, line: &str) {
        if let Some(ref callback) = self.callback {
            callback(line);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn capturing() -> (ProgressReporter, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let reporter = ProgressReporter::new(Box::new(move |line| {
            sink.lock().unwrap().push(line.to_string());
        }));
        (reporter, lines)
    }

    #[test]
    fn test_line_formats() {
        let (reporter, lines) = capturing();
        reporter.phase("Running Device Control Test Sequence:");
        reporter.detail("Done!");
        reporter.outcome("Sending OFF to motor control...", true);
        reporter.outcome("Read Motor status ... 5 ", false);

        let lines = lines.lock().unwrap();
        assert_eq!(lines[0], "-> Running Device Control Test Sequence:");
        assert_eq!(lines[1], "   Done!");
        assert_eq!(lines[2], "   Sending OFF to motor control... Pass");
        assert_eq!(lines[3], "   Read Motor status ... 5  Fail");
    }

    #[test]
    fn test_disabled_reporter_drops_lines() {
        let reporter = ProgressReporter::disabled();
        // No callback installed, must not panic
        reporter.phase("Init");
        reporter.outcome("step", false);
    }
}
