//! Line collector for shell command output

/// Accumulates a command's output lines into a single result
///
/// Empty lines, comment lines (`#`) and prompt lines (`$`) are dropped.
/// The transport feeds lines in arrival order and calls [`complete`] once
/// the output stream ends; only then is [`result`] available.
///
/// [`complete`]: ResultCollector::complete
/// [`result`]: ResultCollector::result
#[derive(Debug, Default)]
pub struct ResultCollector {
    /// Retained lines joined with `\n`
    buffer: String,
    /// Set by `complete()`
    result: Option<String>,
}

impl ResultCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Never cancelled; every command runs to completion
    pub fn is_cancelled(&self) -> bool {
        false
    }

    /// Append a batch of output lines
    pub fn feed<I>(&mut self, lines: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for line in lines {
            let line = line.as_ref();
            if line.is_empty() || line.starts_with('#') || line.starts_with('$') {
                continue;
            }
            if !self.buffer.is_empty() {
                self.buffer.push('\n');
            }
            self.buffer.push_str(line);
        }
    }

    /// Mark the output stream as finished
    pub fn complete(&mut self) {
        self.result = Some(std::mem::take(&mut self.buffer));
    }

    /// Whether `complete()` has been called
    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    /// The collected text, or `None` while output is still arriving
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }
}
