//! Thread-local session id registry.

use crate::record::NO_SESSION_ID;
use std::cell::RefCell;

thread_local! {
    static SESSION_ID: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Associates the calling thread with a user session id.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionRegistry;

impl SessionRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn store_session_id(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        SESSION_ID.with(|cell| *cell.borrow_mut() = Some(session_id));
    }

    pub fn recall_session_id(&self) -> Option<String> {
        SESSION_ID.with(|cell| cell.borrow().clone())
    }

    /// The thread's session id, or [`NO_SESSION_ID`].
    pub fn recall_or_default(&self) -> String {
        self.recall_session_id()
            .unwrap_or_else(|| NO_SESSION_ID.to_string())
    }

    pub fn unset_session_id(&self) {
        SESSION_ID.with(|cell| *cell.borrow_mut() = None);
    }
}
