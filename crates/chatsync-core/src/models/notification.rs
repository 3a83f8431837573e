use parking_lot::Mutex;
use std::time::SystemTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Affordance the rendering layer attaches to a notification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationAction {
    Reload,
}

#[derive(Clone, Debug)]
pub struct Notification {
    pub timestamp: SystemTime,
    pub level: NotificationLevel,
    pub message: String,
    pub conversation_id: Option<String>,
    pub action: Option<NotificationAction>,
    /// Stays on screen until dismissed instead of timing out
    pub persistent: bool,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            level,
            message: message.into(),
            conversation_id: None,
            action: None,
            persistent: false,
        }
    }

    pub fn for_conversation(mut self, conversation_id: &str) -> Self {
        self.conversation_id = Some(conversation_id.to_string());
        self
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// Bounded log of user-facing notices (deletions, recovery warnings and failures)
pub struct NotificationCenter {
    entries: Mutex<Vec<Notification>>,
    max_entries: usize,
}

impl NotificationCenter {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            max_entries,
        }
    }

    pub fn add(&self, notification: Notification) {
        let mut entries = self.entries.lock();
        entries.push(notification);

        // FIFO eviction when exceeding max
        if entries.len() > self.max_entries {
            entries.remove(0);
        }
    }

    pub fn get_all(&self) -> Vec<Notification> {
        self.entries.lock().clone()
    }

    pub fn latest(&self) -> Option<Notification> {
        self.entries.lock().last().cloned()
    }

    pub fn count(&self, level: NotificationLevel) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|n| n.level == level)
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_eviction() {
        let center = NotificationCenter::new(2);
        center.add(Notification::new(NotificationLevel::Info, "one"));
        center.add(Notification::new(NotificationLevel::Warning, "two"));
        center.add(Notification::new(NotificationLevel::Error, "three"));

        let all = center.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "two");
        assert_eq!(center.latest().unwrap().message, "three");
    }

    #[test]
    fn test_counts_by_level() {
        let center = NotificationCenter::default();
        center.add(Notification::new(NotificationLevel::Error, "a").persistent());
        center.add(Notification::new(NotificationLevel::Error, "b"));
        center.add(Notification::new(NotificationLevel::Warning, "c"));

        assert_eq!(center.count(NotificationLevel::Error), 2);
        assert_eq!(center.count(NotificationLevel::Warning), 1);

        center.clear();
        assert!(center.get_all().is_empty());
    }

    #[test]
    fn test_builder() {
        let n = Notification::new(NotificationLevel::Error, "failed")
            .for_conversation("c1")
            .with_action(NotificationAction::Reload)
            .persistent();
        assert_eq!(n.conversation_id.as_deref(), Some("c1"));
        assert_eq!(n.action, Some(NotificationAction::Reload));
        assert!(n.persistent);
    }
}
