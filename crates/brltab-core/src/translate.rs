// Brltab Translation Engine
// Maps key press/release events against a compiled table to command codes

use smallvec::SmallVec;

use crate::combo::KeyCombination;
use crate::command::{
    find_command, BoundCommand, Command, BLK_CONTEXT, BLK_HOSTCMD, BLK_MACRO, BLK_PASSDOTS,
    FLG_CONTEXT_PERSISTENT,
};
use crate::context::{KeyboardFunction, CTX_DEFAULT};
use crate::key::{KeyValue, MAX_MODIFIERS};
use crate::prefs::Prefs;
use crate::scheduler::{AlarmKind, Scheduler};
use crate::table::{KeyTable, LongPressState};

/// Bound on recursive command expansion (macros invoking macros). The
/// directive language cannot express a cycle check, so a runaway macro is
/// cut here instead of looping forever.
pub const MAX_COMMAND_DEPTH: usize = 10;

/// Which context an incoming event asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRequest {
    /// The sentinel: use whatever context the table currently has.
    Default,
    /// An explicit context index (e.g. the menu while it is open).
    Specific(usize),
}

/// What a key event resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventOutcome {
    /// No binding involves the pressed set.
    Unbound,
    /// A chord is still being composed.
    Modifiers,
    /// A binding matched; its command was emitted or deferred.
    Command,
    /// A hotkey fired, bypassing chord matching.
    Hotkey,
}

/// Where emitted command codes go.
///
/// `enqueue` receives wire-encoded codes; returning false means the
/// dispatch queue refused the command, which the translator logs and
/// otherwise ignores. Host commands are forwarded rather than encoded
/// because they never enter the command queue.
pub trait CommandSink {
    fn enqueue(&mut self, code: i32) -> bool;

    fn run_host_command(&mut self, name: &str, arguments: &[String]) -> bool {
        let _ = (name, arguments);
        false
    }
}

/// A sink that records everything; used by tests and the CLI.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub commands: Vec<i32>,
    pub host_runs: Vec<(String, Vec<String>)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandSink for RecordingSink {
    fn enqueue(&mut self, code: i32) -> bool {
        self.commands.push(code);
        true
    }

    fn run_host_command(&mut self, name: &str, arguments: &[String]) -> bool {
        self.host_runs.push((name.to_string(), arguments.to_vec()));
        true
    }
}

/// An owned snapshot of a matched binding: the bound commands plus the
/// pressed keys that matched through group wildcards (the source of
/// numeric arguments).
#[derive(Debug)]
struct BindingMatch {
    primary: BoundCommand,
    secondary: Option<BoundCommand>,
    incomplete: bool,
    wildcard_keys: SmallVec<[KeyValue; 4]>,
}

/// One wildcard variant of a key set: the sorted probe values plus the
/// actual keys that were replaced by their group wildcard.
fn build_variant(
    keys: &[KeyValue],
    mask: u32,
) -> Option<(SmallVec<[KeyValue; 4]>, SmallVec<[KeyValue; 4]>)> {
    let mut probe: SmallVec<[KeyValue; 4]> = SmallVec::with_capacity(keys.len());
    let mut wildcarded: SmallVec<[KeyValue; 4]> = SmallVec::new();
    for (index, key) in keys.iter().enumerate() {
        if mask & (1 << index) != 0 {
            probe.push(key.to_any());
            wildcarded.push(*key);
        } else {
            probe.push(*key);
        }
    }
    probe.sort();
    // Two keys of one group collapsing onto the same wildcard do not form
    // a valid combination.
    if probe.windows(2).any(|pair| pair[0] == pair[1]) {
        return None;
    }
    Some((probe, wildcarded))
}

impl KeyTable {
    /// Translate one key event.
    ///
    /// This is the external input interface: the event source reports the
    /// key's (group, number), whether it went down or up, and which
    /// context it wants the event interpreted in. Commands come out
    /// through `sink`; alarms through `scheduler`.
    pub fn process_key_event(
        &mut self,
        request: ContextRequest,
        key: KeyValue,
        press: bool,
        sink: &mut dyn CommandSink,
        scheduler: &mut dyn Scheduler,
        prefs: &Prefs,
    ) -> KeyEventOutcome {
        if press {
            self.handle_press(request, key, sink, scheduler, prefs)
        } else {
            self.handle_release(request, key, sink, scheduler, prefs)
        }
    }

    /// Deliver an alarm previously scheduled by the translator. The host
    /// loop calls this on the same logical thread as event processing.
    pub fn handle_alarm(
        &mut self,
        kind: AlarmKind,
        sink: &mut dyn CommandSink,
        scheduler: &mut dyn Scheduler,
        prefs: &Prefs,
    ) {
        match kind {
            AlarmKind::LongPress => {
                let Some(long_press) = self.state.long_press.take() else {
                    return;
                };
                // The long press supersedes the deferred short-press
                // command.
                self.state.release_command = None;
                self.process_command(long_press.command, 0, sink);
                if long_press.repeat {
                    let handle = scheduler.schedule(prefs.autorepeat_interval(), AlarmKind::LongPress);
                    self.state.long_press = Some(LongPressState {
                        handle,
                        command: long_press.command,
                        repeat: true,
                    });
                }
            }
            AlarmKind::Autorelease => {
                if self.state.autorelease.take().is_none() {
                    return;
                }
                if self.state.pressed.is_empty() {
                    return;
                }
                log::warn!(
                    "{}: autoreleasing {} stuck keys",
                    self.name,
                    self.state.pressed.len()
                );
                self.state.pressed.clear();
                self.state.chord_bits = 0;
                self.state.release_command = None;
                if let Some(long_press) = self.state.long_press.take() {
                    scheduler.cancel(long_press.handle);
                }
            }
        }
    }

    fn handle_press(
        &mut self,
        request: ContextRequest,
        key: KeyValue,
        sink: &mut dyn CommandSink,
        scheduler: &mut dyn Scheduler,
        prefs: &Prefs,
    ) -> KeyEventOutcome {
        if self.state.pressed.contains(&key) {
            // Hardware repeat of a held key; repeats are synthesized from
            // the long-press alarm instead.
            log::debug!("{}: ignoring repeated press of {}", self.name, key);
            return KeyEventOutcome::Modifiers;
        }

        let new_chord = self.state.pressed.is_empty();
        if new_chord {
            // Realize one-shot context switches: the context selected for
            // the next chord becomes current, then falls back to the
            // persistent one.
            self.state.context_current = self.state.context_next;
            self.state.context_next = self.state.context_persistent;
        }
        let ctx_index = self.resolve_context(request);

        // Hotkeys first: they fire independently of any other held keys
        // and never join the pressed set.
        if let Some(command) = self.find_hotkey_command(ctx_index, key, true) {
            if let Some(command) = command {
                self.process_command(command, 0, sink);
            }
            return KeyEventOutcome::Hotkey;
        }

        let position = self.state.pressed.partition_point(|held| *held < key);
        self.state.pressed.insert(position, key);

        // The chord changed; any pending long press is stale.
        self.cancel_long_press(scheduler);
        self.rearm_autorelease(scheduler, prefs);

        let mut matched = self.find_binding(ctx_index, key);
        if matched.is_none() && ctx_index != CTX_DEFAULT {
            let isolated = self
                .context(ctx_index)
                .is_some_and(|ctx| ctx.is_isolated);
            if !isolated {
                matched = self.find_binding(CTX_DEFAULT, key).filter(|m| {
                    // A fallback match must not shadow braille typing in
                    // the requested context.
                    m.primary.command.block_code() != Some(BLK_PASSDOTS)
                });
            }
        }

        let try_keyboard = prefs.braille_quick_space || !matches!(matched, Some(ref m) if !m.incomplete);
        if try_keyboard {
            if let Some(bits) = self.keyboard_chord_bits(ctx_index) {
                let superimpose = self
                    .context(ctx_index)
                    .map(|ctx| ctx.superimpose)
                    .unwrap_or(0);
                self.state.chord_bits = bits;
                self.state.release_command = Some(passdots_command(bits | superimpose));
                return KeyEventOutcome::Command;
            }
        }

        let Some(matched) = matched else {
            self.state.release_command = None;
            return KeyEventOutcome::Unbound;
        };
        if matched.incomplete {
            self.state.release_command = None;
            return KeyEventOutcome::Modifiers;
        }

        let primary = self.resolve_key_argument(matched.primary, &matched.wildcard_keys);
        let secondary = matched
            .secondary
            .map(|cmd| self.resolve_key_argument(cmd, &matched.wildcard_keys))
            .or_else(|| {
                (primary.entry.props.is_repeatable && prefs.autorepeat_enabled).then_some(primary)
            });

        match secondary {
            Some(secondary) => {
                // A long press is possible: hold the primary back until
                // release so the two outcomes stay distinguishable.
                self.state.release_command = Some(primary);
                let handle = scheduler.schedule(prefs.long_press_time(), AlarmKind::LongPress);
                self.state.long_press = Some(LongPressState {
                    handle,
                    command: secondary,
                    repeat: secondary.entry.props.is_repeatable && prefs.autorepeat_enabled,
                });
            }
            None => {
                self.state.release_command = None;
                self.process_command(primary, 0, sink);
            }
        }
        KeyEventOutcome::Command
    }

    fn handle_release(
        &mut self,
        request: ContextRequest,
        key: KeyValue,
        sink: &mut dyn CommandSink,
        scheduler: &mut dyn Scheduler,
        prefs: &Prefs,
    ) -> KeyEventOutcome {
        let ctx_index = self.resolve_context(request);

        if !self.state.pressed.contains(&key) {
            // Hotkey keys never entered the pressed set; their release
            // command fires here.
            if let Some(command) = self.find_hotkey_command(ctx_index, key, false) {
                if let Some(command) = command {
                    self.process_command(command, 0, sink);
                }
                return KeyEventOutcome::Hotkey;
            }
            log::debug!("{}: ignoring release of unpressed {}", self.name, key);
            return KeyEventOutcome::Unbound;
        }

        self.state.pressed.retain(|held| *held != key);
        self.cancel_long_press(scheduler);

        let mut emitted = false;
        if self.state.release_command.is_some()
            && (prefs.on_first_release || self.state.pressed.is_empty())
        {
            if let Some(command) = self.state.release_command.take() {
                self.process_command(command, 0, sink);
                emitted = true;
            }
        }

        if self.state.pressed.is_empty() {
            self.state.chord_bits = 0;
            if let Some(handle) = self.state.autorelease.take() {
                scheduler.cancel(handle);
            }
        } else {
            self.rearm_autorelease(scheduler, prefs);
        }

        if emitted {
            KeyEventOutcome::Command
        } else {
            KeyEventOutcome::Unbound
        }
    }

    fn resolve_context(&self, request: ContextRequest) -> usize {
        match request {
            ContextRequest::Default => self.state.context_current,
            ContextRequest::Specific(index) => index,
        }
    }

    /// The hotkey command for a key in a context (press or release side),
    /// retrying the default context unless the requested one is isolated.
    /// Outer Option: was there a hotkey at all; inner: does that side
    /// carry a command.
    fn find_hotkey_command(
        &self,
        ctx_index: usize,
        key: KeyValue,
        press: bool,
    ) -> Option<Option<BoundCommand>> {
        let mut indices: SmallVec<[usize; 2]> = SmallVec::new();
        indices.push(ctx_index);
        if ctx_index != CTX_DEFAULT
            && !self.context(ctx_index).is_some_and(|ctx| ctx.is_isolated)
        {
            indices.push(CTX_DEFAULT);
        }
        for index in indices {
            if let Some(entry) = self.context(index).and_then(|ctx| ctx.find_hotkey(key)) {
                return Some(if press { entry.press } else { entry.release });
            }
        }
        None
    }

    /// Search a context's bindings for the current pressed set, with
    /// `event_key` as the candidate immediate key.
    ///
    /// Every pressed key is tried both as itself and as its group
    /// wildcard, fewest wildcards first, so one physical key can satisfy
    /// an exact binding or a whole-group binding. Combinations with the
    /// immediate key fixed are preferred over modifier-only ones.
    fn find_binding(&self, ctx_index: usize, event_key: KeyValue) -> Option<BindingMatch> {
        self.context(ctx_index)?;
        let pressed = &self.state.pressed;
        if pressed.len() > MAX_MODIFIERS {
            return None;
        }

        let modifiers: SmallVec<[KeyValue; 4]> = pressed
            .iter()
            .copied()
            .filter(|held| *held != event_key)
            .collect();

        // Pass 1: event key as the immediate key.
        let mod_count = modifiers.len();
        for wildcards in 0..=(mod_count + 1) {
            for immediate_any in [false, true] {
                let mask_bits = wildcards.checked_sub(usize::from(immediate_any));
                let Some(mask_bits) = mask_bits else { continue };
                if mask_bits > mod_count {
                    continue;
                }
                let immediate = if immediate_any {
                    event_key.to_any()
                } else {
                    event_key
                };
                for mask in 0u32..(1 << mod_count) {
                    if mask.count_ones() as usize != mask_bits {
                        continue;
                    }
                    let Some((probe, mut wildcarded)) = build_variant(&modifiers, mask) else {
                        continue;
                    };
                    if probe.contains(&immediate) {
                        continue;
                    }
                    if immediate_any {
                        wildcarded.push(event_key);
                    }
                    let combo = KeyCombination::search_probe(probe, Some(immediate));
                    if let Some(found) = self.search_bindings(ctx_index, &combo, wildcarded) {
                        return Some(found);
                    }
                }
            }
        }
        // Pass 2: no immediate key; the whole pressed set as modifiers.
        let all: SmallVec<[KeyValue; 4]> = pressed.iter().copied().collect();
        for wildcards in 0..=all.len() {
            for mask in 0u32..(1 << all.len()) {
                if mask.count_ones() as usize != wildcards {
                    continue;
                }
                let Some((probe, wildcarded)) = build_variant(&all, mask) else {
                    continue;
                };
                let combo = KeyCombination::search_probe(probe, None);
                if let Some(found) = self.search_bindings(ctx_index, &combo, wildcarded) {
                    return Some(found);
                }
            }
        }

        None
    }

    fn search_bindings(
        &self,
        ctx_index: usize,
        combo: &KeyCombination,
        wildcard_keys: SmallVec<[KeyValue; 4]>,
    ) -> Option<BindingMatch> {
        let ctx = self.context(ctx_index)?;
        let index = ctx
            .bindings
            .find_by(|binding| binding.combination.cmp(combo))
            .ok()?;
        let binding = ctx.bindings.get(index)?;
        Some(BindingMatch {
            primary: binding.primary,
            secondary: binding.secondary,
            incomplete: binding.is_incomplete(),
            wildcard_keys,
        })
    }

    /// The chord bits for the pressed set, if every pressed key maps to a
    /// keyboard function in the context (falling back per key to the
    /// default context unless isolated).
    fn keyboard_chord_bits(&self, ctx_index: usize) -> Option<u16> {
        if self.state.pressed.is_empty() {
            return None;
        }
        let ctx = self.context(ctx_index)?;
        let fallback = if ctx_index != CTX_DEFAULT && !ctx.is_isolated {
            self.context(CTX_DEFAULT)
        } else {
            None
        };
        let mut bits = 0u16;
        for key in &self.state.pressed {
            let function = ctx
                .find_mapped_key(*key)
                .or_else(|| fallback.and_then(|dctx| dctx.find_mapped_key(*key)))?;
            bits |= function.bit();
        }
        Some(bits)
    }

    /// Fill a command's numeric argument from the chord keys the binding
    /// matched through group wildcards: the lowest leftover key number is
    /// the argument, the second lowest the range end.
    fn resolve_key_argument(
        &self,
        mut bound: BoundCommand,
        wildcard_keys: &[KeyValue],
    ) -> BoundCommand {
        if !bound.entry.props.wants_key_argument() || wildcard_keys.is_empty() {
            return bound;
        }
        let mut numbers: SmallVec<[u8; 4]> =
            wildcard_keys.iter().map(|key| key.number).collect();
        numbers.sort_unstable();
        let mut arg = bound.command.arg() + numbers[0] as u16;
        if bound.entry.props.is_range && numbers.len() > 1 {
            arg |= (numbers[1] as u16) << 8;
        }
        bound.command = bound.command.with_arg(arg);
        bound
    }

    /// Expand and emit a command: context switches and macro or host
    /// command invocations are resolved recursively, everything else goes
    /// to the sink as a wire code.
    fn process_command(&mut self, bound: BoundCommand, depth: usize, sink: &mut dyn CommandSink) -> bool {
        if depth > MAX_COMMAND_DEPTH {
            log::warn!("{}: command expansion too deep, dropping", self.name);
            return false;
        }
        if bound.is_incomplete() {
            log::warn!("{}: refusing to emit incomplete-chord sentinel", self.name);
            return false;
        }
        match bound.command.block_code() {
            Some(BLK_CONTEXT) => {
                let target = bound.command.arg() as usize;
                if target >= self.contexts.len() {
                    log::warn!("{}: context command targets unknown context {}", self.name, target);
                    return false;
                }
                self.state.context_next = target;
                if bound.command.flags() & FLG_CONTEXT_PERSISTENT != 0 {
                    self.state.context_persistent = target;
                }
                true
            }
            Some(BLK_MACRO) => {
                let index = bound.command.arg() as usize;
                let Some(commands) = self.macros.get(index).map(|m| m.commands.clone()) else {
                    log::warn!("{}: macro command targets unknown macro {}", self.name, index);
                    return false;
                };
                let mut ok = true;
                for command in commands {
                    ok &= self.process_command(command, depth + 1, sink);
                }
                ok
            }
            Some(BLK_HOSTCMD) => {
                let index = bound.command.arg() as usize;
                let Some(host) = self.host_commands.get(index) else {
                    log::warn!("{}: host command index {} unknown", self.name, index);
                    return false;
                };
                sink.run_host_command(&host.name, &host.arguments)
            }
            _ => {
                let code = bound.encode();
                if !sink.enqueue(code) {
                    log::warn!("{}: command queue refused {:#x}", self.name, code);
                    return false;
                }
                true
            }
        }
    }

    fn cancel_long_press(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(long_press) = self.state.long_press.take() {
            scheduler.cancel(long_press.handle);
        }
    }

    fn rearm_autorelease(&mut self, scheduler: &mut dyn Scheduler, prefs: &Prefs) {
        if let Some(handle) = self.state.autorelease.take() {
            scheduler.cancel(handle);
        }
        if let Some(timeout) = prefs.autorelease_time() {
            self.state.autorelease = Some(scheduler.schedule(timeout, AlarmKind::Autorelease));
        }
    }
}

/// A PASSDOTS command from accumulated chord bits: dots in the argument,
/// input-modifier bits in the flag byte.
fn passdots_command(bits: u16) -> BoundCommand {
    let entry = find_command("PASSDOTS").expect("PASSDOTS is in the repertoire");
    let command = Command::Block {
        code: BLK_PASSDOTS,
        arg: bits & KeyboardFunction::DOT_MASK,
        flags: ((bits & KeyboardFunction::MODIFIER_MASK) >> 8) as u8,
    };
    BoundCommand::with_command(entry, command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandEntry, FLG_INPUT_SHIFT};
    use crate::context::{HotkeyEntry, KeyBinding, MappedKeyEntry, CTX_MENU};
    use crate::names::KeyNameSet;
    use crate::scheduler::ManualScheduler;
    use crate::table::CommandMacro;

    const DOT1: KeyValue = KeyValue::new(0, 0);
    const DOT2: KeyValue = KeyValue::new(0, 1);
    const SPACE: KeyValue = KeyValue::new(0, 8);
    const ENTER: KeyValue = KeyValue::new(0, 18);
    const ROUTING: KeyValue = KeyValue::new(1, 6);

    fn entry(name: &str) -> &'static CommandEntry {
        find_command(name).unwrap()
    }

    fn bound(name: &str) -> BoundCommand {
        BoundCommand::new(entry(name))
    }

    fn table() -> KeyTable {
        KeyTable::new("test", KeyNameSet::generic())
    }

    fn press(
        table: &mut KeyTable,
        key: KeyValue,
        sink: &mut RecordingSink,
        scheduler: &mut ManualScheduler,
        prefs: &Prefs,
    ) -> KeyEventOutcome {
        table.process_key_event(ContextRequest::Default, key, true, sink, scheduler, prefs)
    }

    fn release(
        table: &mut KeyTable,
        key: KeyValue,
        sink: &mut RecordingSink,
        scheduler: &mut ManualScheduler,
        prefs: &Prefs,
    ) -> KeyEventOutcome {
        table.process_key_event(ContextRequest::Default, key, false, sink, scheduler, prefs)
    }

    #[test]
    fn test_single_key_emits_on_press() {
        let mut table = table();
        table.contexts[CTX_DEFAULT]
            .bindings
            .insert(KeyBinding::new(KeyCombination::single(ENTER), bound("HOME")));
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        assert_eq!(
            press(&mut table, ENTER, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Command
        );
        assert_eq!(sink.commands, vec![bound("HOME").encode()]);
        assert_eq!(
            release(&mut table, ENTER, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Unbound
        );
        assert_eq!(sink.commands.len(), 1);
        assert!(!table.any_key_pressed());
    }

    #[test]
    fn test_unbound_key_and_stale_release() {
        let mut table = table();
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        assert_eq!(
            press(&mut table, ENTER, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Unbound
        );
        assert_eq!(
            release(&mut table, SPACE, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Unbound
        );
        assert!(sink.commands.is_empty());
        assert_eq!(table.pressed_keys(), &[ENTER]);
    }

    #[test]
    fn test_incomplete_chord_then_full_match() {
        let mut table = table();
        {
            let bindings = &mut table.contexts[CTX_DEFAULT].bindings;
            bindings.insert(KeyBinding::new(
                KeyCombination::modifiers_only([DOT1, DOT2]),
                bound("HOME"),
            ));
            bindings.insert(KeyBinding::incomplete(KeyCombination::modifiers_only([DOT1])));
        }
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        assert_eq!(
            press(&mut table, DOT1, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Modifiers
        );
        assert!(sink.commands.is_empty());
        assert_eq!(
            press(&mut table, DOT2, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Command
        );
        assert_eq!(sink.commands, vec![bound("HOME").encode()]);
    }

    #[test]
    fn test_repeatable_command_deferred_until_release() {
        let mut table = table();
        table.contexts[CTX_DEFAULT]
            .bindings
            .insert(KeyBinding::new(KeyCombination::single(ENTER), bound("LNUP")));
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        // LNUP is repeatable so the press only arms the long-press alarm.
        assert_eq!(
            press(&mut table, ENTER, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Command
        );
        assert!(sink.commands.is_empty());
        assert!(scheduler.pending_of(AlarmKind::LongPress).is_some());

        assert_eq!(
            release(&mut table, ENTER, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Command
        );
        assert_eq!(sink.commands, vec![bound("LNUP").encode()]);
        assert!(scheduler.pending_of(AlarmKind::LongPress).is_none());
    }

    #[test]
    fn test_long_press_fires_secondary_and_repeats() {
        let mut table = table();
        let mut binding = KeyBinding::new(KeyCombination::single(ENTER), bound("HOME"));
        binding.secondary = Some(bound("LNUP"));
        table.contexts[CTX_DEFAULT].bindings.insert(binding);
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        press(&mut table, ENTER, &mut sink, &mut scheduler, &prefs);
        assert!(sink.commands.is_empty());

        scheduler.fire(AlarmKind::LongPress).unwrap();
        table.handle_alarm(AlarmKind::LongPress, &mut sink, &mut scheduler, &prefs);
        assert_eq!(sink.commands, vec![bound("LNUP").encode()]);
        // LNUP is repeatable; the alarm re-arms at the autorepeat interval.
        let (_, delay) = scheduler.pending_of(AlarmKind::LongPress).unwrap();
        assert_eq!(delay, prefs.autorepeat_interval());

        scheduler.fire(AlarmKind::LongPress).unwrap();
        table.handle_alarm(AlarmKind::LongPress, &mut sink, &mut scheduler, &prefs);
        assert_eq!(sink.commands.len(), 2);

        // The deferred primary was superseded; release emits nothing.
        release(&mut table, ENTER, &mut sink, &mut scheduler, &prefs);
        assert_eq!(sink.commands.len(), 2);
    }

    #[test]
    fn test_hotkey_bypasses_pressed_set() {
        let mut table = table();
        table.contexts[CTX_DEFAULT].hotkeys.insert(HotkeyEntry {
            key: ENTER,
            press: Some(bound("MUTE")),
            release: Some(bound("SAYLINE")),
            duplicate: false,
        });
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        assert_eq!(
            press(&mut table, ENTER, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Hotkey
        );
        assert!(!table.any_key_pressed());
        assert_eq!(
            release(&mut table, ENTER, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Hotkey
        );
        assert_eq!(
            sink.commands,
            vec![bound("MUTE").encode(), bound("SAYLINE").encode()]
        );
    }

    #[test]
    fn test_braille_chord_emits_passdots_on_first_release() {
        let mut table = table();
        {
            let mapped = &mut table.contexts[CTX_DEFAULT].mapped_keys;
            mapped.insert(MappedKeyEntry {
                key: DOT1,
                function: KeyboardFunction::Dot1,
                duplicate: false,
            });
            mapped.insert(MappedKeyEntry {
                key: DOT2,
                function: KeyboardFunction::Dot2,
                duplicate: false,
            });
        }
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        assert_eq!(
            press(&mut table, DOT1, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Command
        );
        assert_eq!(
            press(&mut table, DOT2, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Command
        );
        assert!(sink.commands.is_empty());

        assert_eq!(
            release(&mut table, DOT1, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Command
        );
        let expected = Command::Block {
            code: BLK_PASSDOTS,
            arg: KeyboardFunction::Dot1.bit() | KeyboardFunction::Dot2.bit(),
            flags: 0,
        };
        assert_eq!(sink.commands, vec![expected.encode()]);

        // The chord already emitted; the remaining release is quiet.
        assert_eq!(
            release(&mut table, DOT2, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Unbound
        );
        assert_eq!(sink.commands.len(), 1);
    }

    #[test]
    fn test_superimpose_bits_join_chord() {
        let mut table = table();
        {
            let ctx = &mut table.contexts[CTX_DEFAULT];
            ctx.superimpose = KeyboardFunction::Shift.bit();
            ctx.mapped_keys.insert(MappedKeyEntry {
                key: DOT1,
                function: KeyboardFunction::Dot1,
                duplicate: false,
            });
        }
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        press(&mut table, DOT1, &mut sink, &mut scheduler, &prefs);
        release(&mut table, DOT1, &mut sink, &mut scheduler, &prefs);
        let command = Command::decode(sink.commands[0]);
        assert_eq!(command.arg(), KeyboardFunction::Dot1.bit());
        assert_eq!(command.flags(), FLG_INPUT_SHIFT);
    }

    #[test]
    fn test_wildcard_key_supplies_numeric_argument() {
        let mut table = table();
        table.contexts[CTX_DEFAULT].bindings.insert(KeyBinding::new(
            KeyCombination::single(KeyValue::any(1)),
            bound("ROUTE"),
        ));
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        assert_eq!(
            press(&mut table, ROUTING, &mut sink, &mut scheduler, &prefs),
            KeyEventOutcome::Command
        );
        let command = Command::decode(sink.commands[0]);
        assert_eq!(command.block_code(), Some(crate::command::BLK_ROUTE));
        assert_eq!(command.arg(), ROUTING.number as u16);
    }

    #[test]
    fn test_exact_binding_wins_over_wildcard() {
        let mut table = table();
        {
            let bindings = &mut table.contexts[CTX_DEFAULT].bindings;
            bindings.insert(KeyBinding::new(
                KeyCombination::single(KeyValue::any(1)),
                bound("ROUTE"),
            ));
            bindings.insert(KeyBinding::new(
                KeyCombination::single(ROUTING),
                bound("HOME"),
            ));
        }
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        press(&mut table, ROUTING, &mut sink, &mut scheduler, &prefs);
        assert_eq!(sink.commands, vec![bound("HOME").encode()]);
    }

    #[test]
    fn test_context_switch_is_one_shot() {
        let mut table = table();
        let switch = BoundCommand::with_command(
            entry("CONTEXT"),
            Command::block(BLK_CONTEXT).with_arg(CTX_MENU as u16),
        );
        table.contexts[CTX_DEFAULT]
            .bindings
            .insert(KeyBinding::new(KeyCombination::single(ENTER), switch));
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        press(&mut table, ENTER, &mut sink, &mut scheduler, &prefs);
        release(&mut table, ENTER, &mut sink, &mut scheduler, &prefs);
        assert!(sink.commands.is_empty());

        // The next chord lands in the menu context, the one after is back
        // in the default.
        press(&mut table, SPACE, &mut sink, &mut scheduler, &prefs);
        assert_eq!(table.current_context(), CTX_MENU);
        release(&mut table, SPACE, &mut sink, &mut scheduler, &prefs);
        press(&mut table, SPACE, &mut sink, &mut scheduler, &prefs);
        assert_eq!(table.current_context(), CTX_DEFAULT);
    }

    #[test]
    fn test_persistent_context_switch_sticks() {
        let mut table = table();
        let switch = BoundCommand::with_command(
            entry("CONTEXT"),
            Command::Block {
                code: BLK_CONTEXT,
                arg: CTX_MENU as u16,
                flags: FLG_CONTEXT_PERSISTENT,
            },
        );
        table.contexts[CTX_DEFAULT]
            .bindings
            .insert(KeyBinding::new(KeyCombination::single(ENTER), switch));
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        press(&mut table, ENTER, &mut sink, &mut scheduler, &prefs);
        release(&mut table, ENTER, &mut sink, &mut scheduler, &prefs);

        press(&mut table, SPACE, &mut sink, &mut scheduler, &prefs);
        release(&mut table, SPACE, &mut sink, &mut scheduler, &prefs);
        press(&mut table, SPACE, &mut sink, &mut scheduler, &prefs);
        assert_eq!(table.current_context(), CTX_MENU);
    }

    #[test]
    fn test_menu_falls_back_to_default_bindings() {
        let mut table = table();
        table.contexts[CTX_DEFAULT]
            .bindings
            .insert(KeyBinding::new(KeyCombination::single(ENTER), bound("HOME")));
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        let outcome = table.process_key_event(
            ContextRequest::Specific(CTX_MENU),
            ENTER,
            true,
            &mut sink,
            &mut scheduler,
            &prefs,
        );
        assert_eq!(outcome, KeyEventOutcome::Command);
        assert_eq!(sink.commands, vec![bound("HOME").encode()]);
    }

    #[test]
    fn test_isolated_context_blocks_fallback() {
        let mut table = table();
        table.contexts[CTX_DEFAULT]
            .bindings
            .insert(KeyBinding::new(KeyCombination::single(ENTER), bound("HOME")));
        table.contexts[CTX_MENU].is_isolated = true;
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        let outcome = table.process_key_event(
            ContextRequest::Specific(CTX_MENU),
            ENTER,
            true,
            &mut sink,
            &mut scheduler,
            &prefs,
        );
        assert_eq!(outcome, KeyEventOutcome::Unbound);
        assert!(sink.commands.is_empty());
    }

    #[test]
    fn test_macro_replays_commands_in_order() {
        let mut table = table();
        table.macros.push(CommandMacro {
            name: "two".to_string(),
            commands: vec![bound("MUTE"), bound("SAYLINE")],
        });
        let invoke = BoundCommand::with_command(
            &crate::command::MACRO_ENTRY,
            Command::block(BLK_MACRO).with_arg(0),
        );
        table.contexts[CTX_DEFAULT]
            .bindings
            .insert(KeyBinding::new(KeyCombination::single(ENTER), invoke));
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        press(&mut table, ENTER, &mut sink, &mut scheduler, &prefs);
        assert_eq!(
            sink.commands,
            vec![bound("MUTE").encode(), bound("SAYLINE").encode()]
        );
    }

    #[test]
    fn test_host_command_forwarded_to_sink() {
        let mut table = table();
        table.host_commands.push(crate::table::HostCommand {
            name: "say".to_string(),
            arguments: vec!["hello".to_string()],
        });
        let invoke = BoundCommand::with_command(
            &crate::command::HOSTCMD_ENTRY,
            Command::block(BLK_HOSTCMD).with_arg(0),
        );
        table.contexts[CTX_DEFAULT]
            .bindings
            .insert(KeyBinding::new(KeyCombination::single(ENTER), invoke));
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        press(&mut table, ENTER, &mut sink, &mut scheduler, &prefs);
        assert!(sink.commands.is_empty());
        assert_eq!(
            sink.host_runs,
            vec![("say".to_string(), vec!["hello".to_string()])]
        );
    }

    #[test]
    fn test_autorelease_clears_stuck_keys() {
        let mut table = table();
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs {
            autorelease_setting: 1,
            ..Prefs::default()
        };

        press(&mut table, ENTER, &mut sink, &mut scheduler, &prefs);
        let (_, delay) = scheduler.pending_of(AlarmKind::Autorelease).unwrap();
        assert_eq!(delay, prefs.autorelease_time().unwrap());

        scheduler.fire(AlarmKind::Autorelease).unwrap();
        table.handle_alarm(AlarmKind::Autorelease, &mut sink, &mut scheduler, &prefs);
        assert!(!table.any_key_pressed());
    }

    #[test]
    fn test_runaway_macro_is_cut_off() {
        let mut table = table();
        // A macro that invokes itself.
        let invoke = BoundCommand::with_command(
            &crate::command::MACRO_ENTRY,
            Command::block(BLK_MACRO).with_arg(0),
        );
        table.macros.push(CommandMacro {
            name: "loop".to_string(),
            commands: vec![invoke],
        });
        table.contexts[CTX_DEFAULT]
            .bindings
            .insert(KeyBinding::new(KeyCombination::single(ENTER), invoke));
        let mut sink = RecordingSink::new();
        let mut scheduler = ManualScheduler::new();
        let prefs = Prefs::default();

        // Must terminate without emitting anything.
        press(&mut table, ENTER, &mut sink, &mut scheduler, &prefs);
        assert!(sink.commands.is_empty());
    }
}
