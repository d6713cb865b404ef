// Brltab Key Table
// Top-level owner of the compiled tables and the translator's runtime state

use smallvec::SmallVec;

use crate::command::BoundCommand;
use crate::context::{KeyContext, CTX_DEFAULT, CTX_MENU};
use crate::key::KeyValue;
use crate::names::KeyNameSet;
use crate::scheduler::{AlarmHandle, Scheduler};

/// A named, stored sequence of commands replayed by a single binding.
#[derive(Debug, Clone)]
pub struct CommandMacro {
    pub name: String,
    pub commands: Vec<BoundCommand>,
}

/// A named external program invocation dispatched through the sink.
#[derive(Debug, Clone)]
pub struct HostCommand {
    pub name: String,
    pub arguments: Vec<String>,
}

/// State of an armed long-press alarm.
#[derive(Debug, Clone)]
pub(crate) struct LongPressState {
    pub handle: AlarmHandle,
    pub command: BoundCommand,
    /// Re-arm at the autorepeat interval after firing.
    pub repeat: bool,
}

/// The translator's mutable state. Owned exclusively by the translator;
/// reset on context changes and explicit resets.
#[derive(Debug, Default)]
pub(crate) struct RuntimeState {
    /// Currently pressed keys, kept sorted.
    pub pressed: SmallVec<[KeyValue; 8]>,
    pub context_current: usize,
    pub context_next: usize,
    pub context_persistent: usize,
    /// Command deferred to the chord's first release.
    pub release_command: Option<BoundCommand>,
    pub long_press: Option<LongPressState>,
    pub autorelease: Option<AlarmHandle>,
    /// Accumulated braille-keyboard chord bits.
    pub chord_bits: u16,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            context_current: CTX_DEFAULT,
            context_next: CTX_DEFAULT,
            context_persistent: CTX_DEFAULT,
            ..Self::default()
        }
    }
}

/// A compiled key table plus its runtime state.
///
/// Built once by the compiler, used for the lifetime of a driver session.
/// The static tables are read-only after compilation; only the runtime
/// state mutates during event processing.
#[derive(Debug)]
pub struct KeyTable {
    /// Source name the table was compiled from.
    pub name: String,
    pub title: Option<String>,
    pub notes: Vec<String>,
    pub names: KeyNameSet,
    pub contexts: Vec<KeyContext>,
    pub macros: Vec<CommandMacro>,
    pub host_commands: Vec<HostCommand>,
    pub(crate) state: RuntimeState,
}

impl KeyTable {
    /// An empty table over a name universe, with the two special contexts
    /// in place.
    pub fn new(name: &str, names: KeyNameSet) -> Self {
        let mut default_ctx = KeyContext::special("default");
        default_ctx.is_defined = true;
        default_ctx.is_referenced = true;
        let mut menu_ctx = KeyContext::special("menu");
        menu_ctx.is_defined = true;
        Self {
            name: name.to_string(),
            title: None,
            notes: Vec::new(),
            names,
            contexts: vec![default_ctx, menu_ctx],
            macros: Vec::new(),
            host_commands: Vec::new(),
            state: RuntimeState::new(),
        }
    }

    pub fn context(&self, index: usize) -> Option<&KeyContext> {
        self.contexts.get(index)
    }

    pub fn default_context(&self) -> &KeyContext {
        &self.contexts[CTX_DEFAULT]
    }

    pub fn menu_context(&self) -> &KeyContext {
        &self.contexts[CTX_MENU]
    }

    /// Index of a context by name (case-insensitive), if it exists.
    pub fn find_context(&self, name: &str) -> Option<usize> {
        self.contexts
            .iter()
            .position(|ctx| matches!(&ctx.name, Some(n) if n.eq_ignore_ascii_case(name)))
    }

    /// Index of the context currently in effect.
    pub fn current_context(&self) -> usize {
        self.state.context_current
    }

    /// Keys currently held, sorted.
    pub fn pressed_keys(&self) -> &[KeyValue] {
        &self.state.pressed
    }

    /// Whether any key is logically pressed.
    pub fn any_key_pressed(&self) -> bool {
        !self.state.pressed.is_empty()
    }

    /// Clear all runtime state: pressed keys, pending commands, alarms,
    /// and context selection. The compiled tables are untouched.
    pub fn reset(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(long_press) = self.state.long_press.take() {
            scheduler.cancel(long_press.handle);
        }
        if let Some(handle) = self.state.autorelease.take() {
            scheduler.cancel(handle);
        }
        self.state = RuntimeState::new();
    }
}
