// Brltab Key Table Compiler
// Turns directive-language source into a compiled KeyTable

pub mod operands;
pub mod reader;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use smallvec::SmallVec;
use thiserror::Error;

use crate::combo::KeyCombination;
use crate::command::{
    apply_command_suffix, find_command, BoundCommand, Command, BLK_CONTEXT, BLK_HOSTCMD,
    BLK_MACRO, HOSTCMD_ENTRY, MACRO_ENTRY,
};
use crate::context::{
    compare_bindings, compare_hotkeys, compare_mapped_keys, HotkeyEntry, KeyBinding, KeyContext,
    MappedKeyEntry, CTX_DEFAULT, CTX_MENU,
};
use crate::key::{KeyValue, MAX_MODIFIERS};
use crate::names::KeyNameSet;
use crate::table::{CommandMacro, HostCommand, KeyTable};

/// How deep `include` may nest.
pub const MAX_INCLUDE_DEPTH: usize = 10;

/// Command operand standing for "no command" in hotkey slots.
const NULL_COMMAND: &str = "null";

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("include depth limit ({MAX_INCLUDE_DEPTH}) exceeded at {0}")]
    IncludeDepth(PathBuf),
}

/// A source position for diagnostics.
struct Location<'a> {
    file: &'a str,
    line: usize,
}

impl fmt::Display for Location<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Compile key-table source text.
///
/// Malformed directives are logged and skipped; the compile only fails
/// when a source file cannot be read or includes nest too deeply.
/// `include` paths are resolved relative to the process working directory.
pub fn compile_source(
    name: &str,
    text: &str,
    names: &KeyNameSet,
) -> Result<KeyTable, CompileError> {
    let mut compiler = Compiler::new(name, names);
    compiler.process_text(name, text, None)?;
    Ok(compiler.finish())
}

/// Compile a key-table source file, resolving `include` relative to it.
pub fn compile_file(path: &Path, names: &KeyNameSet) -> Result<KeyTable, CompileError> {
    let text = fs::read_to_string(path).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path.display().to_string();
    let mut compiler = Compiler::new(&name, names);
    compiler.process_text(&name, &text, path.parent())?;
    Ok(compiler.finish())
}

struct Compiler<'a> {
    names: &'a KeyNameSet,
    table: KeyTable,
    // lowercased context name -> index, in definition order
    context_ids: IndexMap<String, usize>,
    current_context: usize,
    hide: bool,
    include_depth: usize,
}

impl<'a> Compiler<'a> {
    fn new(name: &str, names: &'a KeyNameSet) -> Self {
        let mut context_ids = IndexMap::new();
        context_ids.insert("default".to_string(), CTX_DEFAULT);
        context_ids.insert("menu".to_string(), CTX_MENU);
        Self {
            names,
            table: KeyTable::new(name, names.clone()),
            context_ids,
            current_context: CTX_DEFAULT,
            hide: false,
            include_depth: 0,
        }
    }

    fn process_text(
        &mut self,
        file: &str,
        text: &str,
        base: Option<&Path>,
    ) -> Result<(), CompileError> {
        for (number, line) in reader::lines(text) {
            let loc = Location { file, line: number };
            let operands = match reader::tokenize(line) {
                Ok(operands) => operands,
                Err(err) => {
                    log::warn!("{loc}: {err}");
                    continue;
                }
            };
            if operands.is_empty() {
                continue;
            }
            self.process_directive(&loc, &operands, base)?;
        }
        Ok(())
    }

    fn process_directive(
        &mut self,
        loc: &Location<'_>,
        operands: &[String],
        base: Option<&Path>,
    ) -> Result<(), CompileError> {
        let directive = operands[0].to_ascii_lowercase();
        let rest = &operands[1..];
        match directive.as_str() {
            "bind" => self.process_bind(loc, rest),
            "context" => self.process_context(loc, rest),
            "hide" => self.process_hide(loc, rest),
            "hotkey" => self.process_hotkey(loc, rest),
            "ifkey" => {
                return self.process_conditional(loc, rest, base, |c, name| {
                    c.names.contains(name)
                })
            }
            "ifnotkey" => {
                return self.process_conditional(loc, rest, base, |c, name| {
                    !c.names.contains(name)
                })
            }
            "ifplatform" => {
                return self.process_conditional(loc, rest, base, |_, name| {
                    name.eq_ignore_ascii_case(std::env::consts::OS)
                })
            }
            "ifnotplatform" => {
                return self.process_conditional(loc, rest, base, |_, name| {
                    !name.eq_ignore_ascii_case(std::env::consts::OS)
                })
            }
            "ignore" => self.process_ignore(loc, rest),
            "include" => return self.process_include(loc, rest, base),
            "isolated" => self.process_isolated(loc, rest),
            "macro" => self.process_macro(loc, rest),
            "map" => self.process_map(loc, rest),
            "note" => self.process_note(loc, rest),
            "run" => self.process_run(loc, rest),
            "superimpose" => self.process_superimpose(loc, rest),
            "title" => self.process_title(loc, rest),
            other => log::warn!("{loc}: unknown directive '{other}'"),
        }
        Ok(())
    }

    /// The generic predicate gate behind the four conditional directives:
    /// test the first operand, and process the remainder of the line as a
    /// directive of its own iff the predicate holds.
    fn process_conditional(
        &mut self,
        loc: &Location<'_>,
        operands: &[String],
        base: Option<&Path>,
        predicate: fn(&Compiler<'_>, &str) -> bool,
    ) -> Result<(), CompileError> {
        let Some((subject, rest)) = operands.split_first() else {
            log::warn!("{loc}: conditional directive missing operand");
            return Ok(());
        };
        if !predicate(self, subject) {
            return Ok(());
        }
        if rest.is_empty() {
            return Ok(());
        }
        self.process_directive(loc, rest, base)
    }

    fn process_bind(&mut self, loc: &Location<'_>, operands: &[String]) {
        let (keys, command, long_press) = match operands {
            [keys, command] => (keys, command, None),
            [keys, command, long_press] => (keys, command, Some(long_press)),
            _ => {
                log::warn!("{loc}: bind expects KEYS COMMAND [LONGPRESS-COMMAND]");
                return;
            }
        };
        let combination = match operands::parse_combination(self.names, keys) {
            Ok(combination) => combination,
            Err(err) => {
                log::warn!("{loc}: {err}");
                return;
            }
        };
        let Some(primary) = self.parse_command(loc, command) else {
            return;
        };
        let secondary = match long_press {
            Some(token) => match self.parse_command(loc, token) {
                Some(command) => Some(command),
                None => return,
            },
            None => None,
        };
        let mut binding = KeyBinding::new(combination, primary);
        binding.secondary = secondary;
        binding.hidden = self.hide;
        self.table.contexts[self.current_context]
            .bindings
            .insert(binding);
    }

    fn process_ignore(&mut self, loc: &Location<'_>, operands: &[String]) {
        let [keys] = operands else {
            log::warn!("{loc}: ignore expects KEYS");
            return;
        };
        let combination = match operands::parse_combination(self.names, keys) {
            Ok(combination) => combination,
            Err(err) => {
                log::warn!("{loc}: {err}");
                return;
            }
        };
        let noop = BoundCommand::new(find_command("NOOP").expect("NOOP is in the repertoire"));
        let mut binding = KeyBinding::new(combination, noop);
        // Ignored combinations never belong in a help listing.
        binding.hidden = true;
        self.table.contexts[self.current_context]
            .bindings
            .insert(binding);
    }

    fn process_context(&mut self, loc: &Location<'_>, operands: &[String]) {
        let Some((name, title)) = operands.split_first() else {
            log::warn!("{loc}: context expects NAME [TITLE...]");
            return;
        };
        let index = self.context_index(name);
        self.current_context = index;
        let ctx = &mut self.table.contexts[index];
        ctx.is_defined = true;
        if !title.is_empty() {
            let title = title.join(" ");
            if let Some(existing) = &ctx.title {
                if *existing != title {
                    log::warn!("{loc}: context '{name}' title redefined");
                }
            }
            ctx.title = Some(title);
        }
    }

    fn process_hide(&mut self, loc: &Location<'_>, operands: &[String]) {
        match operands {
            [state] if state.eq_ignore_ascii_case("on") => self.hide = true,
            [state] if state.eq_ignore_ascii_case("off") => self.hide = false,
            _ => log::warn!("{loc}: hide expects on|off"),
        }
    }

    fn process_hotkey(&mut self, loc: &Location<'_>, operands: &[String]) {
        let [key, press, release] = operands else {
            log::warn!("{loc}: hotkey expects KEY PRESS-COMMAND RELEASE-COMMAND");
            return;
        };
        let key = match operands::parse_key(self.names, key) {
            Ok(key) => key,
            Err(err) => {
                log::warn!("{loc}: {err}");
                return;
            }
        };
        let Some(press) = self.parse_optional_command(loc, press) else {
            return;
        };
        let Some(release) = self.parse_optional_command(loc, release) else {
            return;
        };
        self.table.contexts[self.current_context]
            .hotkeys
            .insert(HotkeyEntry {
                key,
                press,
                release,
                duplicate: false,
            });
    }

    fn process_map(&mut self, loc: &Location<'_>, operands: &[String]) {
        let [key, function] = operands else {
            log::warn!("{loc}: map expects KEY FUNCTION");
            return;
        };
        let key = match operands::parse_key(self.names, key) {
            Ok(key) => key,
            Err(err) => {
                log::warn!("{loc}: {err}");
                return;
            }
        };
        let function = match operands::parse_keyboard_function(function) {
            Ok(function) => function,
            Err(err) => {
                log::warn!("{loc}: {err}");
                return;
            }
        };
        self.table.contexts[self.current_context]
            .mapped_keys
            .insert(MappedKeyEntry {
                key,
                function,
                duplicate: false,
            });
    }

    fn process_superimpose(&mut self, loc: &Location<'_>, operands: &[String]) {
        let [function] = operands else {
            log::warn!("{loc}: superimpose expects FUNCTION");
            return;
        };
        match operands::parse_keyboard_function(function) {
            Ok(function) => {
                self.table.contexts[self.current_context].superimpose |= function.bit();
            }
            Err(err) => log::warn!("{loc}: {err}"),
        }
    }

    fn process_isolated(&mut self, loc: &Location<'_>, operands: &[String]) {
        if !operands.is_empty() {
            log::warn!("{loc}: isolated takes no operands");
            return;
        }
        self.table.contexts[self.current_context].is_isolated = true;
    }

    fn process_macro(&mut self, loc: &Location<'_>, operands: &[String]) {
        let Some((name, commands)) = operands.split_first() else {
            log::warn!("{loc}: macro expects NAME COMMAND...");
            return;
        };
        if commands.is_empty() {
            log::warn!("{loc}: macro '{name}' has no commands");
            return;
        }
        if self.find_macro(name).is_some() {
            log::warn!("{loc}: macro '{name}' redefined; keeping the first definition");
            return;
        }
        // Commands are resolved before the macro is registered, so a
        // macro cannot invoke itself.
        let mut resolved = Vec::with_capacity(commands.len());
        for command in commands {
            match self.parse_command(loc, command) {
                Some(command) => resolved.push(command),
                None => return,
            }
        }
        self.table.macros.push(CommandMacro {
            name: name.to_string(),
            commands: resolved,
        });
    }

    fn process_run(&mut self, loc: &Location<'_>, operands: &[String]) {
        let Some((name, arguments)) = operands.split_first() else {
            log::warn!("{loc}: run expects NAME PROGRAM [ARGUMENT...]");
            return;
        };
        if arguments.is_empty() {
            log::warn!("{loc}: run '{name}' has no program");
            return;
        }
        if self.find_host_command(name).is_some() {
            log::warn!("{loc}: host command '{name}' redefined; keeping the first definition");
            return;
        }
        self.table.host_commands.push(HostCommand {
            name: name.to_string(),
            arguments: arguments.to_vec(),
        });
    }

    fn process_note(&mut self, loc: &Location<'_>, operands: &[String]) {
        if operands.is_empty() {
            log::warn!("{loc}: note expects TEXT");
            return;
        }
        self.table.notes.push(operands.join(" "));
    }

    fn process_title(&mut self, loc: &Location<'_>, operands: &[String]) {
        if operands.is_empty() {
            log::warn!("{loc}: title expects TEXT");
            return;
        }
        let title = operands.join(" ");
        if self.table.title.is_some() {
            log::warn!("{loc}: table title redefined");
        }
        self.table.title = Some(title);
    }

    fn process_include(
        &mut self,
        loc: &Location<'_>,
        operands: &[String],
        base: Option<&Path>,
    ) -> Result<(), CompileError> {
        let [operand] = operands else {
            log::warn!("{loc}: include expects PATH");
            return Ok(());
        };
        let path = match base {
            Some(base) => base.join(operand),
            None => PathBuf::from(operand),
        };
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(CompileError::IncludeDepth(path));
        }
        let text = fs::read_to_string(&path).map_err(|source| CompileError::Io {
            path: path.clone(),
            source,
        })?;
        let file = path.display().to_string();

        // The included file sees the current context and hide state but
        // cannot leak its own changes back out.
        let saved_context = self.current_context;
        let saved_hide = self.hide;
        self.include_depth += 1;
        let result = self.process_text(&file, &text, path.parent());
        self.include_depth -= 1;
        self.current_context = saved_context;
        self.hide = saved_hide;
        result
    }

    /// Resolve a context name to an index, creating the context on first
    /// mention.
    fn context_index(&mut self, name: &str) -> usize {
        let key = name.to_ascii_lowercase();
        if let Some(&index) = self.context_ids.get(&key) {
            return index;
        }
        let index = self.table.contexts.len();
        self.table.contexts.push(KeyContext::new(Some(name.to_string())));
        self.context_ids.insert(key, index);
        index
    }

    fn find_macro(&self, name: &str) -> Option<usize> {
        self.table
            .macros
            .iter()
            .position(|m| m.name.eq_ignore_ascii_case(name))
    }

    fn find_host_command(&self, name: &str) -> Option<usize> {
        self.table
            .host_commands
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// Parse a command operand: a repertoire name, a macro name, or a
    /// host-command name, then `+suffix` modifiers. For CONTEXT, a
    /// non-numeric suffix names the target context.
    fn parse_command(&mut self, loc: &Location<'_>, operand: &str) -> Option<BoundCommand> {
        let mut parts = operand.split('+');
        let base = parts.next().unwrap_or("");

        let mut bound = if let Some(entry) = find_command(base) {
            BoundCommand::new(entry)
        } else if let Some(index) = self.find_macro(base) {
            BoundCommand::with_command(
                &MACRO_ENTRY,
                Command::block(BLK_MACRO).with_arg(index as u16),
            )
        } else if let Some(index) = self.find_host_command(base) {
            BoundCommand::with_command(
                &HOSTCMD_ENTRY,
                Command::block(BLK_HOSTCMD).with_arg(index as u16),
            )
        } else {
            log::warn!("{loc}: unknown command '{base}'");
            return None;
        };

        for suffix in parts {
            if suffix.is_empty() {
                log::warn!("{loc}: empty command modifier in '{operand}'");
                return None;
            }
            if bound.command.block_code() == Some(BLK_CONTEXT)
                && suffix.parse::<u32>().is_err()
            {
                let index = self.context_index(suffix);
                self.table.contexts[index].is_referenced = true;
                bound.command = bound.command.with_arg(index as u16);
                continue;
            }
            if let Err(err) = apply_command_suffix(&mut bound, suffix) {
                log::warn!("{loc}: {err}");
                return None;
            }
        }
        Some(bound)
    }

    /// A hotkey command slot: the literal `null` means "no command".
    fn parse_optional_command(
        &mut self,
        loc: &Location<'_>,
        operand: &str,
    ) -> Option<Option<BoundCommand>> {
        if operand.eq_ignore_ascii_case(NULL_COMMAND) {
            return Some(None);
        }
        self.parse_command(loc, operand).map(Some)
    }

    /// The post-parse pass: synthesize partial-chord markers, flag
    /// duplicates, and assert table order.
    fn finish(mut self) -> KeyTable {
        for index in 0..self.table.contexts.len() {
            self.synthesize_incomplete(index);
            mark_duplicate_bindings(&mut self.table.contexts[index]);
        }
        self.table
    }

    /// For every authored binding, every non-empty subset of its key set
    /// that is not itself bound becomes a modifier-only binding carrying
    /// the partial-chord sentinel, so the matcher can tell "still
    /// composing" from "no such chord".
    fn synthesize_incomplete(&mut self, ctx_index: usize) {
        let full_sets: Vec<SmallVec<[KeyValue; 4]>> = self.table.contexts[ctx_index]
            .bindings
            .iter()
            .filter(|binding| !binding.is_incomplete())
            .map(|binding| {
                let mut set: SmallVec<[KeyValue; 4]> =
                    binding.combination.sorted_modifiers().iter().copied().collect();
                if let Some(key) = binding.combination.immediate() {
                    set.push(key);
                    set.sort();
                }
                set
            })
            .collect();

        for set in full_sets {
            if set.len() > MAX_MODIFIERS {
                continue;
            }
            for mask in 1u32..(1 << set.len()) {
                let subset: SmallVec<[KeyValue; 4]> = set
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| mask & (1 << index) != 0)
                    .map(|(_, key)| *key)
                    .collect();
                let probe = KeyBinding::incomplete(KeyCombination::modifiers_only(subset));
                let ctx = &mut self.table.contexts[ctx_index];
                if ctx.bindings.find(&probe).is_err() {
                    ctx.bindings.insert(probe);
                }
            }
        }
        debug_assert!(self.table.contexts[ctx_index].bindings.is_sorted());
    }
}

/// Flag every entry that repeats an earlier equal one; the first-authored
/// entry stays effective, the rest surface through the audit pass.
fn mark_duplicate_bindings(ctx: &mut KeyContext) {
    let duplicates: Vec<usize> = (1..ctx.bindings.len())
        .filter(|&index| {
            let (Some(prev), Some(this)) = (ctx.bindings.get(index - 1), ctx.bindings.get(index))
            else {
                return false;
            };
            compare_bindings(prev, this) == std::cmp::Ordering::Equal && !this.is_incomplete()
        })
        .collect();
    for index in duplicates {
        if let Some(binding) = ctx.bindings.get_mut(index) {
            binding.duplicate = true;
        }
    }

    let duplicates: Vec<usize> = (1..ctx.hotkeys.len())
        .filter(|&index| {
            let (Some(prev), Some(this)) = (ctx.hotkeys.get(index - 1), ctx.hotkeys.get(index))
            else {
                return false;
            };
            compare_hotkeys(prev, this) == std::cmp::Ordering::Equal
        })
        .collect();
    for index in duplicates {
        if let Some(hotkey) = ctx.hotkeys.get_mut(index) {
            hotkey.duplicate = true;
        }
    }

    let duplicates: Vec<usize> = (1..ctx.mapped_keys.len())
        .filter(|&index| {
            let (Some(prev), Some(this)) =
                (ctx.mapped_keys.get(index - 1), ctx.mapped_keys.get(index))
            else {
                return false;
            };
            compare_mapped_keys(prev, this) == std::cmp::Ordering::Equal
        })
        .collect();
    for index in duplicates {
        if let Some(mapped) = ctx.mapped_keys.get_mut(index) {
            mapped.duplicate = true;
        }
    }
}
