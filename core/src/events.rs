//! Notifications the client emits while it works.
//!
//! The surrounding application subscribes to these instead of the client
//! calling UI hooks directly. `LoggedOut` is the cue to drop any state that
//! belonged to the old session.

/// Something the application may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiEvent {
    /// The first call went in flight.
    Busy,
    /// The last in-flight call finished.
    Idle,
    /// The server issued a session where none was known.
    LoggedIn { session: String },
    /// The server stopped sending the known session.
    LoggedOut,
}

/// Receives `ApiEvent`s from an `ApiClient`.
pub trait Observer {
    fn notify(&self, event: &ApiEvent);
}

impl<F> Observer for F
where
    F: Fn(&ApiEvent),
{
    fn notify(&self, event: &ApiEvent) {
        self(event)
    }
}
