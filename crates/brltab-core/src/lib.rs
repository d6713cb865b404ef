// Brltab Core Library
// Key-table compilation, translation, listing, and audit

pub mod audit;
pub mod combo;
pub mod command;
pub mod compile;
pub mod context;
pub mod key;
pub mod list;
pub mod names;
pub mod prefs;
pub mod scheduler;
pub mod sorted;
pub mod table;
pub mod translate;

pub use audit::{audit, AuditFinding};
pub use combo::{ComboError, KeyCombination};
pub use command::{
    apply_command_suffix, find_command, BoundCommand, Command, CommandCategory, CommandEntry,
    CommandProperties, SuffixError, COMMANDS,
};
pub use compile::{compile_file, compile_source, CompileError};
pub use context::{
    HotkeyEntry, KeyBinding, KeyContext, KeyboardFunction, MappedKeyEntry, CTX_DEFAULT, CTX_MENU,
};
pub use key::{KeyValue, KEY_NUMBER_ANY, MAX_MODIFIERS};
pub use list::{list, ListSink, RstListWriter, TextListWriter};
pub use names::{KeyNameEntry, KeyNameSet};
pub use prefs::{Prefs, PrefsError};
pub use scheduler::{AlarmHandle, AlarmKind, ManualScheduler, Scheduler};
pub use sorted::SortedVec;
pub use table::{CommandMacro, HostCommand, KeyTable};
pub use translate::{CommandSink, ContextRequest, KeyEventOutcome, RecordingSink};
