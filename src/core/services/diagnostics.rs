use std::sync::{Arc, Mutex, PoisonError};

/// Append-only diagnostic log shared by the manager and its stores.
///
/// Backend warnings and errors land here instead of surfacing as per-call
/// faults. The text is never cleared implicitly.
#[derive(Clone, Default)]
pub struct DiagnosticLog {
    inner: Arc<Mutex<String>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one UTC-timestamped line.
    pub fn report(&self, message: &str) {
        let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let mut text = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        text.push_str(&stamp);
        text.push(' ');
        text.push_str(message);
        text.push('\n');
    }

    /// The accumulated text so far.
    pub fn text(&self) -> String {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
