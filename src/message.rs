use std::cell::RefCell;

// ---------------------------------------------------------------------------
// Message hub: synchronous fire-and-forget change notifications
// ---------------------------------------------------------------------------

/// A change notification about a subset. Carries the subset label so
/// observers can identify the sender without holding a handle to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A subset was created and registered with its dataset.
    SubsetCreate { subset: String },
    /// A named attribute of a subset changed (state, style, label).
    SubsetUpdate { subset: String, attribute: String },
    /// A subset was deleted from its dataset.
    SubsetDelete { subset: String },
}

/// Receiver side of subset broadcasts. Delivery is synchronous and must not
/// call back into mask evaluation.
pub trait MessageHub {
    fn broadcast(&self, message: Message);
}

/// Hub that records every message it receives. Used in tests and as a
/// simple default observer.
#[derive(Debug, Default)]
pub struct EventLog {
    messages: RefCell<Vec<Message>>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog::default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.borrow().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn clear(&self) {
        self.messages.borrow_mut().clear();
    }
}

impl MessageHub for EventLog {
    fn broadcast(&self, message: Message) {
        self.messages.borrow_mut().push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_records_in_order() {
        let log = EventLog::new();
        log.broadcast(Message::SubsetCreate {
            subset: "Subset 1".into(),
        });
        log.broadcast(Message::SubsetDelete {
            subset: "Subset 1".into(),
        });
        assert_eq!(log.count(), 2);
        assert_eq!(
            log.messages()[1],
            Message::SubsetDelete {
                subset: "Subset 1".into()
            }
        );
    }
}
