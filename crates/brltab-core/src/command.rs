// Brltab Command Model
// Tagged command values, wire encoding, and the static command repertoire

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use strum_macros::Display;

// Wire layout of an emitted command code: ARG in bits 0-7, BLK in bits
// 8-15, FLG in bits 16-23, EXT (high argument byte) in bits 24-31.
const ARG_SHIFT: u32 = 0;
const BLK_SHIFT: u32 = 8;
const FLG_SHIFT: u32 = 16;
const EXT_SHIFT: u32 = 24;
const BYTE_MASK: i32 = 0xFF;

/// Sentinel code carried by synthesized partial-chord bindings; it never
/// reaches a command sink.
pub const CMD_INCOMPLETE: i32 = -1;

// Block identifiers for parameterized commands.
pub const BLK_ROUTE: u8 = 0x01;
pub const BLK_CLIP_NEW: u8 = 0x02;
pub const BLK_CLIP_ADD: u8 = 0x03;
pub const BLK_COPY_LINE: u8 = 0x04;
pub const BLK_COPY_RECT: u8 = 0x05;
pub const BLK_GOTOLINE: u8 = 0x06;
pub const BLK_SETMARK: u8 = 0x07;
pub const BLK_GOTOMARK: u8 = 0x08;
pub const BLK_SWITCHVT: u8 = 0x09;
pub const BLK_PASSDOTS: u8 = 0x0A;
pub const BLK_PASSCHAR: u8 = 0x0B;
pub const BLK_CONTEXT: u8 = 0x0C;
pub const BLK_MACRO: u8 = 0x0D;
pub const BLK_HOSTCMD: u8 = 0x0E;

// Flag bits. Meanings overlap between command classes; a flag byte is
// interpreted against the block that carries it.
pub const FLG_TOGGLE_ON: u8 = 0x01;
pub const FLG_TOGGLE_OFF: u8 = 0x02;
pub const FLG_MOTION_ROUTE: u8 = 0x01;
pub const FLG_MOTION_SCALED: u8 = 0x02;
pub const FLG_MOTION_TOLEFT: u8 = 0x04;
pub const FLG_INPUT_SHIFT: u8 = 0x01;
pub const FLG_INPUT_UPPER: u8 = 0x02;
pub const FLG_INPUT_CONTROL: u8 = 0x04;
pub const FLG_INPUT_META: u8 = 0x08;
pub const FLG_INPUT_ALTGR: u8 = 0x10;
pub const FLG_INPUT_GUI: u8 = 0x20;
pub const FLG_CONTEXT_PERSISTENT: u8 = 0x01;

/// A command value: a simple enumeration, or a parameterized block
/// carrying an argument and flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Basic(u8),
    Block { code: u8, arg: u16, flags: u8 },
}

impl Command {
    pub const fn block(code: u8) -> Self {
        Command::Block {
            code,
            arg: 0,
            flags: 0,
        }
    }

    /// Pack into the integer wire format consumed by the dispatch layer.
    pub fn encode(&self) -> i32 {
        match *self {
            Command::Basic(code) => (code as i32) << ARG_SHIFT,
            Command::Block { code, arg, flags } => {
                ((arg as i32 & BYTE_MASK) << ARG_SHIFT)
                    | ((code as i32) << BLK_SHIFT)
                    | ((flags as i32) << FLG_SHIFT)
                    | (((arg >> 8) as i32) << EXT_SHIFT)
            }
        }
    }

    /// Unpack a wire code produced by [`Command::encode`].
    pub fn decode(code: i32) -> Self {
        let blk = ((code >> BLK_SHIFT) & BYTE_MASK) as u8;
        let flags = ((code >> FLG_SHIFT) & BYTE_MASK) as u8;
        let low = (code & BYTE_MASK) as u16;
        let high = ((code >> EXT_SHIFT) & BYTE_MASK) as u16;
        if blk == 0 && flags == 0 && high == 0 {
            Command::Basic(low as u8)
        } else {
            // blk 0 with flag bits is a flagged basic command; keep the
            // block form so encode(decode(x)) == x.
            Command::Block {
                code: blk,
                arg: (high << 8) | low,
                flags,
            }
        }
    }

    pub fn block_code(&self) -> Option<u8> {
        match self {
            Command::Basic(_) => None,
            Command::Block { code, .. } => Some(*code),
        }
    }

    pub fn arg(&self) -> u16 {
        match self {
            Command::Basic(_) => 0,
            Command::Block { arg, .. } => *arg,
        }
    }

    pub fn flags(&self) -> u8 {
        match self {
            Command::Basic(_) => 0,
            Command::Block { flags, .. } => *flags,
        }
    }

    /// Set the argument. Only block commands carry one; a basic command is
    /// returned unchanged.
    pub fn with_arg(self, arg: u16) -> Self {
        match self {
            Command::Basic(_) => self,
            Command::Block { code, flags, .. } => Command::Block { code, arg, flags },
        }
    }

    pub fn with_flags(self, extra: u8) -> Self {
        match self {
            Command::Basic(code) => Command::Block {
                code: 0,
                arg: code as u16,
                flags: extra,
            },
            Command::Block { code, arg, flags } => Command::Block {
                code,
                arg,
                flags: flags | extra,
            },
        }
    }
}

/// Human category a command is listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum CommandCategory {
    #[strum(serialize = "Cursor Navigation")]
    Navigation,
    #[strum(serialize = "Scrolling")]
    Scrolling,
    #[strum(serialize = "Feature Toggles")]
    Toggles,
    #[strum(serialize = "Clipboard")]
    Clipboard,
    #[strum(serialize = "Braille Keyboard")]
    BrailleKeyboard,
    #[strum(serialize = "Contexts & Macros")]
    Contexts,
    #[strum(serialize = "Speech")]
    Speech,
    #[strum(serialize = "Special")]
    Special,
}

/// All categories in listing order.
pub const CATEGORY_ORDER: [CommandCategory; 8] = [
    CommandCategory::Navigation,
    CommandCategory::Scrolling,
    CommandCategory::Toggles,
    CommandCategory::Clipboard,
    CommandCategory::BrailleKeyboard,
    CommandCategory::Contexts,
    CommandCategory::Speech,
    CommandCategory::Special,
];

/// Static attributes of a repertoire entry. The booleans gate which
/// `+suffix` modifier classes apply and how numeric arguments are filled
/// in at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandProperties {
    pub is_toggle: bool,
    pub is_motion: bool,
    pub is_row: bool,
    pub is_vertical: bool,
    pub is_column: bool,
    pub is_offset: bool,
    pub is_range: bool,
    pub is_input: bool,
    pub is_character: bool,
    pub is_braille: bool,
    pub is_keyboard: bool,
    pub is_repeatable: bool,
}

impl CommandProperties {
    const NONE: Self = Self {
        is_toggle: false,
        is_motion: false,
        is_row: false,
        is_vertical: false,
        is_column: false,
        is_offset: false,
        is_range: false,
        is_input: false,
        is_character: false,
        is_braille: false,
        is_keyboard: false,
        is_repeatable: false,
    };

    /// Whether the command takes a numeric argument from leftover chord
    /// keys at translation time.
    pub fn wants_key_argument(&self) -> bool {
        self.is_offset || self.is_column || self.is_row || self.is_range || self.is_keyboard
    }
}

/// One entry of the command repertoire.
#[derive(Debug)]
pub struct CommandEntry {
    pub name: &'static str,
    pub command: Command,
    pub description: &'static str,
    pub category: CommandCategory,
    pub props: CommandProperties,
}

macro_rules! props {
    ($($field:ident),*) => {
        CommandProperties { $($field: true,)* ..CommandProperties::NONE }
    };
}

macro_rules! basic {
    ($name:literal, $code:literal, $cat:ident, $desc:literal) => {
        basic!($name, $code, $cat, $desc, CommandProperties::NONE)
    };
    ($name:literal, $code:literal, $cat:ident, $desc:literal, $props:expr) => {
        CommandEntry {
            name: $name,
            command: Command::Basic($code),
            description: $desc,
            category: CommandCategory::$cat,
            props: $props,
        }
    };
}

macro_rules! block {
    ($name:literal, $code:expr, $cat:ident, $desc:literal, $props:expr) => {
        CommandEntry {
            name: $name,
            command: Command::block($code),
            description: $desc,
            category: CommandCategory::$cat,
            props: $props,
        }
    };
}

/// The command repertoire, in declaration order.
///
/// Basic codes are stable small integers; block commands use the BLK_*
/// identifiers above. Descriptions feed the listing pass.
pub static COMMANDS: &[CommandEntry] = &[
    basic!("NOOP", 0x00, Special, "do nothing"),
    basic!("LNUP", 0x01, Navigation, "go up one line", props!(is_repeatable, is_vertical)),
    basic!("LNDN", 0x02, Navigation, "go down one line", props!(is_repeatable, is_vertical)),
    basic!("WINUP", 0x03, Scrolling, "go up several lines", props!(is_repeatable, is_vertical)),
    basic!("WINDN", 0x04, Scrolling, "go down several lines", props!(is_repeatable, is_vertical)),
    basic!("PRDIFLN", 0x05, Navigation, "go up to nearest different line", props!(is_repeatable)),
    basic!("NXDIFLN", 0x06, Navigation, "go down to nearest different line", props!(is_repeatable)),
    basic!("TOP", 0x07, Navigation, "go to top line"),
    basic!("BOT", 0x08, Navigation, "go to bottom line"),
    basic!("TOP_LEFT", 0x09, Navigation, "go to beginning of top line"),
    basic!("BOT_LEFT", 0x0A, Navigation, "go to beginning of bottom line"),
    basic!("HOME", 0x0B, Navigation, "go to screen cursor"),
    basic!("BACK", 0x0C, Navigation, "go back after cursor tracking"),
    basic!("RETURN", 0x0D, Navigation, "go to screen cursor or go back"),
    basic!("FWINLT", 0x0E, Scrolling, "go backward one braille window", props!(is_repeatable, is_motion)),
    basic!("FWINRT", 0x0F, Scrolling, "go forward one braille window", props!(is_repeatable, is_motion)),
    basic!("LNBEG", 0x10, Navigation, "go to beginning of line"),
    basic!("LNEND", 0x11, Navigation, "go to end of line"),
    basic!("CHRLT", 0x12, Navigation, "go left one character", props!(is_repeatable, is_motion)),
    basic!("CHRRT", 0x13, Navigation, "go right one character", props!(is_repeatable, is_motion)),
    basic!("HWINLT", 0x14, Scrolling, "go backward one half window", props!(is_repeatable, is_motion)),
    basic!("HWINRT", 0x15, Scrolling, "go forward one half window", props!(is_repeatable, is_motion)),
    basic!("CSRTRK", 0x16, Toggles, "set screen cursor tracking", props!(is_toggle)),
    basic!("SIXDOTS", 0x17, Toggles, "set six-dot computer braille", props!(is_toggle)),
    basic!("SLIDEWIN", 0x18, Toggles, "set sliding braille window", props!(is_toggle)),
    basic!("SKPIDLNS", 0x19, Toggles, "set skipping of identical lines", props!(is_toggle)),
    basic!("SKPBLNKWINS", 0x1A, Toggles, "set skipping of blank windows", props!(is_toggle)),
    basic!("AUTOREPEAT", 0x1B, Toggles, "set autorepeat", props!(is_toggle)),
    basic!("AUTOSPEAK", 0x1C, Toggles, "set autospeak", props!(is_toggle)),
    basic!("FREEZE", 0x1D, Toggles, "set screen image frozen", props!(is_toggle)),
    basic!("DISPMD", 0x1E, Toggles, "set display mode attributes", props!(is_toggle)),
    basic!("PASTE", 0x1F, Clipboard, "insert clipboard text after screen cursor"),
    basic!("HELP", 0x20, Special, "enter or leave help display"),
    basic!("INFO", 0x21, Special, "enter or leave status display"),
    basic!("LEARN", 0x22, Special, "enter or leave command learn mode"),
    basic!("PREFMENU", 0x23, Special, "enter or leave preferences menu"),
    basic!("PREFSAVE", 0x24, Special, "save preferences to disk"),
    basic!("PREFLOAD", 0x25, Special, "restore preferences from disk"),
    basic!("MUTE", 0x26, Speech, "stop speaking"),
    basic!("SPKHOME", 0x27, Speech, "go to current speaking position"),
    basic!("SAYLINE", 0x28, Speech, "speak current line"),
    basic!("SAYALL", 0x29, Speech, "speak from current line through bottom of screen"),
    basic!("SPELL", 0x2A, Speech, "spell current word"),
    block!("ROUTE", BLK_ROUTE, Navigation, "bring screen cursor to character", props!(is_column, is_motion)),
    block!("CLIP_NEW", BLK_CLIP_NEW, Clipboard, "start new clipboard at character", props!(is_column)),
    block!("CLIP_ADD", BLK_CLIP_ADD, Clipboard, "append to clipboard from character", props!(is_column)),
    block!("COPY_LINE", BLK_COPY_LINE, Clipboard, "linear copy to character", props!(is_column)),
    block!("COPY_RECT", BLK_COPY_RECT, Clipboard, "rectangular copy to character", props!(is_column, is_range)),
    block!("GOTOLINE", BLK_GOTOLINE, Navigation, "go to line", props!(is_row, is_vertical)),
    block!("SETMARK", BLK_SETMARK, Navigation, "remember current braille window position", props!(is_offset)),
    block!("GOTOMARK", BLK_GOTOMARK, Navigation, "go to remembered braille window position", props!(is_offset)),
    block!("SWITCHVT", BLK_SWITCHVT, Special, "switch to virtual terminal", props!(is_offset)),
    block!("PASSDOTS", BLK_PASSDOTS, BrailleKeyboard, "type braille dots", props!(is_braille, is_input, is_character)),
    block!("PASSCHAR", BLK_PASSCHAR, BrailleKeyboard, "type unicode character", props!(is_input, is_character, is_keyboard)),
    block!("CONTEXT", BLK_CONTEXT, Contexts, "switch to command context", CommandProperties::NONE),
];

static COMMANDS_BY_NAME: LazyLock<Vec<&'static CommandEntry>> = LazyLock::new(|| {
    let mut entries: Vec<&'static CommandEntry> = COMMANDS.iter().collect();
    entries.sort_by(|a, b| compare_command_names(a.name, b.name));
    entries
});

fn compare_command_names(a: &str, b: &str) -> Ordering {
    a.to_ascii_uppercase().cmp(&b.to_ascii_uppercase())
}

/// Resolve a base command name (case-insensitive, binary search).
pub fn find_command(name: &str) -> Option<&'static CommandEntry> {
    let upper = name.to_ascii_uppercase();
    COMMANDS_BY_NAME
        .binary_search_by(|entry| entry.name.to_ascii_uppercase().cmp(&upper))
        .ok()
        .map(|index| COMMANDS_BY_NAME[index])
}

/// Find the repertoire entry a command value belongs to, ignoring its
/// argument and flags. Used by the listing pass.
pub fn entry_for_command(command: &Command) -> Option<&'static CommandEntry> {
    COMMANDS.iter().find(|entry| match (entry.command, command) {
        (Command::Basic(a), Command::Basic(b)) => a == *b,
        (Command::Block { code: a, .. }, Command::Block { code: b, .. }) => a == *b,
        _ => false,
    })
}

/// Entries used for commands that are not part of the searchable
/// repertoire: synthesized partial-chord markers and the resolved forms of
/// macro and host-command invocations.
pub static INCOMPLETE_ENTRY: CommandEntry = CommandEntry {
    name: "incomplete-chord",
    command: Command::Basic(0),
    description: "chord still being composed",
    category: CommandCategory::Special,
    props: CommandProperties::NONE,
};

pub static MACRO_ENTRY: CommandEntry = CommandEntry {
    name: "MACRO",
    command: Command::block(BLK_MACRO),
    description: "run command macro",
    category: CommandCategory::Contexts,
    props: CommandProperties::NONE,
};

pub static HOSTCMD_ENTRY: CommandEntry = CommandEntry {
    name: "HOSTCMD",
    command: Command::block(BLK_HOSTCMD),
    description: "run host command",
    category: CommandCategory::Contexts,
    props: CommandProperties::NONE,
};

/// A command bound to a key combination: the repertoire entry plus the
/// concrete value with its argument and flags applied.
#[derive(Debug, Clone, Copy)]
pub struct BoundCommand {
    pub entry: &'static CommandEntry,
    pub command: Command,
    incomplete: bool,
}

impl BoundCommand {
    pub fn new(entry: &'static CommandEntry) -> Self {
        Self {
            entry,
            command: entry.command,
            incomplete: false,
        }
    }

    pub fn with_command(entry: &'static CommandEntry, command: Command) -> Self {
        Self {
            entry,
            command,
            incomplete: false,
        }
    }

    /// The EOF-analogue sentinel carried by synthesized partial-chord
    /// bindings.
    pub fn incomplete() -> Self {
        Self {
            entry: &INCOMPLETE_ENTRY,
            command: INCOMPLETE_ENTRY.command,
            incomplete: true,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn encode(&self) -> i32 {
        if self.incomplete {
            CMD_INCOMPLETE
        } else {
            self.command.encode()
        }
    }
}

impl fmt::Display for BoundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entry.name)
    }
}

/// Errors from `+suffix` modifier application.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuffixError {
    #[error("unknown command modifier: '{0}'")]
    Unknown(String),
    #[error("command modifier not applicable: '{0}'")]
    NotApplicable(String),
    #[error("numeric command offset out of range: '{0}'")]
    OffsetOutOfRange(String),
}

/// Apply one `+suffix` modifier to a command.
///
/// The classes are tried in a fixed order and the first applicable match
/// wins: toggle, motion, row, vertical, input, character, braille,
/// keyboard, then a trailing numeric offset. The order is semantically
/// significant and must not be reordered.
pub fn apply_command_suffix(bound: &mut BoundCommand, suffix: &str) -> Result<(), SuffixError> {
    let props = bound.entry.props;
    let lowered = suffix.to_ascii_lowercase();

    struct SuffixRule {
        class_applies: fn(&CommandProperties) -> bool,
        name: &'static str,
        flag: u8,
    }

    const RULES: &[SuffixRule] = &[
        // toggle
        SuffixRule { class_applies: |p| p.is_toggle, name: "on", flag: FLG_TOGGLE_ON },
        SuffixRule { class_applies: |p| p.is_toggle, name: "off", flag: FLG_TOGGLE_OFF },
        // motion
        SuffixRule { class_applies: |p| p.is_motion, name: "route", flag: FLG_MOTION_ROUTE },
        // row
        SuffixRule { class_applies: |p| p.is_row, name: "scaled", flag: FLG_MOTION_SCALED },
        // vertical
        SuffixRule { class_applies: |p| p.is_vertical, name: "toleft", flag: FLG_MOTION_TOLEFT },
        // input
        SuffixRule { class_applies: |p| p.is_input, name: "shift", flag: FLG_INPUT_SHIFT },
        SuffixRule { class_applies: |p| p.is_input, name: "upper", flag: FLG_INPUT_UPPER },
        SuffixRule { class_applies: |p| p.is_input, name: "control", flag: FLG_INPUT_CONTROL },
        SuffixRule { class_applies: |p| p.is_input, name: "meta", flag: FLG_INPUT_META },
        // character
        SuffixRule { class_applies: |p| p.is_character, name: "altgr", flag: FLG_INPUT_ALTGR },
        SuffixRule { class_applies: |p| p.is_character, name: "gui", flag: FLG_INPUT_GUI },
    ];

    for rule in RULES {
        if rule.name == lowered {
            if (rule.class_applies)(&props) {
                bound.command = bound.command.with_flags(rule.flag);
                return Ok(());
            }
            return Err(SuffixError::NotApplicable(suffix.to_string()));
        }
    }

    // braille: dot1..dot8 add dots to the argument of a braille command
    if props.is_braille {
        if let Some(rest) = lowered.strip_prefix("dot") {
            if let Ok(dot) = rest.parse::<u8>() {
                if (1..=8).contains(&dot) {
                    let arg = bound.command.arg() | (1u16 << (dot - 1));
                    bound.command = bound.command.with_arg(arg);
                    return Ok(());
                }
            }
        }
        if lowered == "space" && matches!(bound.command, Command::Block { .. }) {
            // Space is the empty chord; nothing to add to the argument.
            return Ok(());
        }
    }

    // keyboard and offset commands accept a trailing numeric argument
    if let Ok(number) = lowered.parse::<u32>() {
        if !matches!(bound.command, Command::Block { .. }) {
            return Err(SuffixError::NotApplicable(suffix.to_string()));
        }
        if number <= u16::MAX as u32 {
            bound.command = bound.command.with_arg(number as u16);
            return Ok(());
        }
        return Err(SuffixError::OffsetOutOfRange(suffix.to_string()));
    }

    Err(SuffixError::Unknown(suffix.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_round_trip_basic() {
        let cmd = Command::Basic(0x1B);
        assert_eq!(cmd.encode(), 0x1B);
        assert_eq!(Command::decode(cmd.encode()), cmd);
    }

    #[test]
    fn test_wire_round_trip_block() {
        let cmd = Command::Block {
            code: BLK_ROUTE,
            arg: 0x0207,
            flags: FLG_MOTION_ROUTE,
        };
        let code = cmd.encode();
        assert_eq!(code & 0xFF, 0x07); // ARG low byte
        assert_eq!((code >> 8) & 0xFF, BLK_ROUTE as i32);
        assert_eq!((code >> 16) & 0xFF, FLG_MOTION_ROUTE as i32);
        assert_eq!((code >> 24) & 0xFF, 0x02); // EXT high byte
        assert_eq!(Command::decode(code), cmd);
    }

    #[test]
    fn test_find_command() {
        assert!(find_command("LNUP").is_some());
        assert!(find_command("lnup").is_some());
        assert!(find_command("route").is_some());
        assert!(find_command("NOSUCH").is_none());
    }

    #[test]
    fn test_repertoire_sorted_and_searchable() {
        for entry in COMMANDS {
            let found = find_command(entry.name).expect("repertoire entry must be findable");
            assert_eq!(found.name, entry.name);
        }
    }

    #[test]
    fn test_toggle_suffix() {
        let mut bound = BoundCommand::new(find_command("CSRTRK").unwrap());
        apply_command_suffix(&mut bound, "on").unwrap();
        assert_eq!(bound.command.flags(), FLG_TOGGLE_ON);
    }

    #[test]
    fn test_suffix_not_applicable() {
        let mut bound = BoundCommand::new(find_command("HOME").unwrap());
        assert_eq!(
            apply_command_suffix(&mut bound, "on"),
            Err(SuffixError::NotApplicable("on".to_string()))
        );
    }

    #[test]
    fn test_braille_dot_suffixes() {
        let mut bound = BoundCommand::new(find_command("PASSDOTS").unwrap());
        apply_command_suffix(&mut bound, "dot1").unwrap();
        apply_command_suffix(&mut bound, "dot4").unwrap();
        assert_eq!(bound.command.arg(), 0b0000_1001);
    }

    #[test]
    fn test_numeric_suffix() {
        let mut bound = BoundCommand::new(find_command("SWITCHVT").unwrap());
        apply_command_suffix(&mut bound, "3").unwrap();
        assert_eq!(bound.command.arg(), 3);
    }

    #[test]
    fn test_input_suffix_order_first_match_wins() {
        // "shift" is an input modifier; PASSDOTS is both input and braille,
        // and the input class is checked before the braille class.
        let mut bound = BoundCommand::new(find_command("PASSDOTS").unwrap());
        apply_command_suffix(&mut bound, "shift").unwrap();
        assert_eq!(bound.command.flags(), FLG_INPUT_SHIFT);
        assert_eq!(bound.command.arg(), 0);
    }

    #[test]
    fn test_incomplete_sentinel() {
        let bound = BoundCommand::incomplete();
        assert!(bound.is_incomplete());
        assert_eq!(bound.encode(), CMD_INCOMPLETE);
    }
}
