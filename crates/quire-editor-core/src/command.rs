//! Editor commands and the bus that routes them.
//!
//! Toolbar buttons, keybindings and menu items invoke a [`Command`] on a
//! [`CommandBus`] instead of reaching into the editor directly. Whoever owns
//! the behaviour registers a handler; the bus is cheap to clone and every
//! clone shares the same handler table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use smol_str::SmolStr;

/// Semantic editor commands that can be triggered from outside the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // === History ===
    /// Undo the last change.
    Undo,
    /// Redo the last undone change.
    Redo,

    // === Formatting ===
    /// Toggle bold on selection.
    ToggleBold,
    /// Toggle italic on selection.
    ToggleItalic,
    /// Toggle inline code on selection.
    ToggleCode,
    /// Toggle strikethrough on selection.
    ToggleStrikethrough,
    /// Insert/wrap with link. Takes the target URL as argument.
    InsertLink,

    // === Document ===
    /// Flush pending changes to persistence now.
    Save,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::ToggleBold => "toggle-bold",
            Self::ToggleItalic => "toggle-italic",
            Self::ToggleCode => "toggle-code",
            Self::ToggleStrikethrough => "toggle-strikethrough",
            Self::InsertLink => "insert-link",
            Self::Save => "save",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional argument passed along with a command.
pub type CommandArgs = Option<SmolStr>;

type Handler = Arc<dyn Fn(CommandArgs) + Send + Sync>;

/// Routes commands to registered handlers. One handler per command.
#[derive(Clone, Default)]
pub struct CommandBus {
    handlers: Arc<Mutex<HashMap<Command, Handler>>>,
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handler for `command`, replacing any previous one.
    pub fn register<F>(&self, command: Command, handler: F)
    where
        F: Fn(CommandArgs) + Send + Sync + 'static,
    {
        if self.lock().insert(command, Arc::new(handler)).is_some() {
            tracing::debug!(%command, "replaced command handler");
        }
    }

    /// Remove the handler for `command`. Returns true if one was installed.
    pub fn unregister(&self, command: Command) -> bool {
        self.lock().remove(&command).is_some()
    }

    pub fn is_registered(&self, command: Command) -> bool {
        self.lock().contains_key(&command)
    }

    /// Run the handler for `command`.
    ///
    /// Returns false if nothing is registered for it.
    pub fn invoke(&self, command: Command, args: CommandArgs) -> bool {
        // Clone the handler out so it can re-enter the bus.
        let handler = self.lock().get(&command).cloned();
        match handler {
            Some(handler) => {
                handler(args);
                true
            }
            None => {
                tracing::debug!(%command, "no handler registered");
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Command, Handler>> {
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<Command> = self.lock().keys().copied().collect();
        f.debug_struct("CommandBus")
            .field("registered", &registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_invoke_without_handler_returns_false() {
        let bus = CommandBus::new();
        assert!(!bus.invoke(Command::Save, None));
    }

    #[test]
    fn test_register_invoke_unregister() {
        let bus = CommandBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bus.register(Command::Save, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.is_registered(Command::Save));
        assert!(bus.clone().invoke(Command::Save, None));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(bus.unregister(Command::Save));
        assert!(!bus.unregister(Command::Save));
        assert!(!bus.invoke(Command::Save, None));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_args_reach_handler() {
        let bus = CommandBus::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        bus.register(Command::InsertLink, move |args| {
            *sink.lock().unwrap() = args;
        });

        bus.invoke(Command::InsertLink, Some("https://example.com".into()));
        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn test_handler_may_reenter_bus() {
        let bus = CommandBus::new();
        let inner = bus.clone();
        bus.register(Command::Redo, move |_| {
            inner.unregister(Command::Redo);
        });
        assert!(bus.invoke(Command::Redo, None));
        assert!(!bus.is_registered(Command::Redo));
    }
}
