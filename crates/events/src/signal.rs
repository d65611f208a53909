/// Signals broadcast across the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// The server rejected the current credential (401) or a refresh failed.
    ///
    /// Carries no payload. Listeners must treat repeated deliveries as one.
    Invalidated,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Invalidated => "session_invalidated",
        }
    }
}
