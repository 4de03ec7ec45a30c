use crate::machine::Action;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Document-level event sources an open overlay listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentEvent {
    PointerDown,
    KeyDown,
    Resize,
    Scroll,
}

pub const DOCUMENT_EVENTS: [DocumentEvent; 4] = [
    DocumentEvent::PointerDown,
    DocumentEvent::KeyDown,
    DocumentEvent::Resize,
    DocumentEvent::Scroll,
];

/// Document listeners owned by one trigger instance.
///
/// Attached while an overlay is open and detached when it closes or the
/// instance is torn down. Each instance has its own, so several triggers
/// can coexist without sharing a dispatcher.
#[derive(Debug, Default)]
pub struct Subscription {
    attached: bool,
}

impl Subscription {
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Returns the action to perform, or `None` if already attached.
    pub fn attach(&mut self) -> Option<Action> {
        if self.attached {
            return None;
        }
        self.attached = true;
        debug!("attaching document listeners");
        Some(Action::Listen {
            events: DOCUMENT_EVENTS.to_vec(),
        })
    }

    pub fn detach(&mut self) -> Option<Action> {
        if !self.attached {
            return None;
        }
        self.attached = false;
        debug!("detaching document listeners");
        Some(Action::Unlisten {
            events: DOCUMENT_EVENTS.to_vec(),
        })
    }
}
