//! Backend-initiated command routing by exact name.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Callback invoked with the command's positional arguments.
pub type CommandCallback = Arc<dyn Fn(&[Value]) + Send + Sync>;

struct CommandSubscription {
    command_name: String,
    callback: CommandCallback,
}

/// Registry of command handlers. Matching is by exact name only — no
/// id scoping or wildcards.
pub struct CommandRouter {
    subs: Mutex<Vec<CommandSubscription>>,
}

impl CommandRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            subs: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for a command name.
    pub fn subscribe(&self, command_name: &str, callback: CommandCallback) {
        self.subs.lock().push(CommandSubscription {
            command_name: command_name.to_owned(),
            callback,
        });
    }

    /// Invoke every handler registered under the exact name, in
    /// registration order. Returns how many handlers matched.
    pub fn dispatch(&self, command_name: &str, args: &[Value]) -> usize {
        let matching: Vec<CommandCallback> = {
            let subs = self.subs.lock();
            subs.iter()
                .filter(|sub| sub.command_name == command_name)
                .map(|sub| sub.callback.clone())
                .collect()
        };
        for callback in &matching {
            callback(args);
        }
        matching.len()
    }

    /// Remove every subscription. Invoked on reconnect.
    pub fn unsubscribe_all(&self) {
        self.subs.lock().clear();
    }

    /// Number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.subs.lock().len()
    }

    /// Whether no subscriptions are registered.
    pub fn is_empty(&self) -> bool {
        self.subs.lock().is_empty()
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new()
    }
}
