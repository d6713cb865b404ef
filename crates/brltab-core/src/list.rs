// Brltab Listing Pass
// Renders a compiled table's bindings as human-readable help

use indexmap::IndexMap;

use crate::command::{BoundCommand, BLK_CONTEXT, CATEGORY_ORDER};
use crate::context::{KeyContext, CTX_DEFAULT, CTX_MENU};
use crate::table::KeyTable;

/// How deep untitled-context inlining may chase CONTEXT bindings.
const MAX_INLINE_DEPTH: usize = 4;

/// Receives the structure of a listing.
pub trait ListSink {
    fn header(&mut self, text: &str);
    fn begin_list(&mut self, title: &str);
    fn list_item(&mut self, text: &str);
    fn end_list(&mut self);
    fn line(&mut self, text: &str);
}

/// Walk a table and emit its help listing.
///
/// Special contexts come first, then titled user contexts in definition
/// order. Within a context, bindings are grouped by command category and
/// combinations bound to the same command are coalesced into one entry.
/// Hidden, duplicate, and partial-chord entries never appear. Bindings
/// that switch to an untitled context are replaced by that context's own
/// bindings, each prefixed with the switching combination.
///
/// Returns whether anything was listed.
pub fn list(table: &KeyTable, sink: &mut dyn ListSink) -> bool {
    sink.header(table.title.as_deref().unwrap_or(&table.name));
    for note in &table.notes {
        sink.line(note);
    }

    let mut listed = false;
    for (index, ctx) in table.contexts.iter().enumerate() {
        if !section_worthy(index, ctx) {
            continue;
        }
        listed |= list_context(table, index, sink);
    }
    listed
}

/// Whether a context gets its own section. Untitled user contexts are
/// only reachable by inlining; empty ones have nothing to say.
fn section_worthy(index: usize, ctx: &KeyContext) -> bool {
    if ctx.is_empty() {
        return false;
    }
    if index == CTX_DEFAULT || index == CTX_MENU {
        return true;
    }
    ctx.title.is_some()
}

fn list_context(table: &KeyTable, ctx_index: usize, sink: &mut dyn ListSink) -> bool {
    let ctx = &table.contexts[ctx_index];
    // command wire code -> (description, rendered combinations)
    let mut groups: Vec<IndexMap<i32, (String, Vec<String>)>> =
        (0..CATEGORY_ORDER.len()).map(|_| IndexMap::new()).collect();

    collect_entries(table, ctx_index, &mut groups, "", 0);

    if groups.iter().all(|group| group.is_empty()) {
        return false;
    }

    sink.header(ctx.label());
    for (slot, category) in CATEGORY_ORDER.iter().enumerate() {
        let group = &groups[slot];
        if group.is_empty() {
            continue;
        }
        sink.begin_list(&category.to_string());
        for (description, combinations) in group.values() {
            sink.list_item(&format!("{}: {}", description, combinations.join(" or ")));
        }
        sink.end_list();
    }
    true
}

fn collect_entries(
    table: &KeyTable,
    ctx_index: usize,
    groups: &mut [IndexMap<i32, (String, Vec<String>)>],
    prefix: &str,
    depth: usize,
) {
    let ctx = &table.contexts[ctx_index];
    for binding in &ctx.bindings {
        if binding.is_incomplete() || binding.hidden || binding.duplicate {
            continue;
        }
        let mut rendered = binding.combination.format(&table.names);
        if !prefix.is_empty() {
            rendered = format!("{prefix}, {rendered}");
        }

        // A switch to an untitled context stands for that context's own
        // bindings.
        if binding.primary.command.block_code() == Some(BLK_CONTEXT) && depth < MAX_INLINE_DEPTH {
            let target = binding.primary.command.arg() as usize;
            if target > CTX_MENU {
                if let Some(target_ctx) = table.context(target) {
                    if target_ctx.title.is_none() {
                        collect_entries(table, target, groups, &rendered, depth + 1);
                        continue;
                    }
                }
            }
        }

        let slot = CATEGORY_ORDER
            .iter()
            .position(|cat| *cat == binding.primary.entry.category)
            .unwrap_or(0);
        let code = binding.primary.encode();
        let entry = groups[slot]
            .entry(code)
            .or_insert_with(|| (describe(&binding.primary, table), Vec::new()));
        entry.1.push(rendered);

        if let Some(secondary) = &binding.secondary {
            let slot = CATEGORY_ORDER
                .iter()
                .position(|cat| *cat == secondary.entry.category)
                .unwrap_or(0);
            let rendered = binding.combination.format(&table.names);
            let rendered = if prefix.is_empty() {
                format!("held {rendered}")
            } else {
                format!("{prefix}, held {rendered}")
            };
            let entry = groups[slot]
                .entry(secondary.encode())
                .or_insert_with(|| (describe(secondary, table), Vec::new()));
            entry.1.push(rendered);
        }
    }
}

/// Human text for a bound command: macros and host commands show their
/// authored names, everything else its repertoire description.
fn describe(bound: &BoundCommand, table: &KeyTable) -> String {
    use crate::command::{BLK_HOSTCMD, BLK_MACRO};
    match bound.command.block_code() {
        Some(BLK_MACRO) => {
            let index = bound.command.arg() as usize;
            match table.macros.get(index) {
                Some(m) => format!("run macro {}", m.name),
                None => bound.entry.description.to_string(),
            }
        }
        Some(BLK_HOSTCMD) => {
            let index = bound.command.arg() as usize;
            match table.host_commands.get(index) {
                Some(h) => format!("run host command {}", h.name),
                None => bound.entry.description.to_string(),
            }
        }
        Some(BLK_CONTEXT) => {
            let index = bound.command.arg() as usize;
            match table.context(index) {
                Some(ctx) => format!("switch to {}", ctx.label()),
                None => bound.entry.description.to_string(),
            }
        }
        _ => bound.entry.description.to_string(),
    }
}

/// Plain-text renderer: headers underlined, items indented.
#[derive(Debug, Default)]
pub struct TextListWriter {
    output: String,
}

impl TextListWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_output(self) -> String {
        self.output
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

impl ListSink for TextListWriter {
    fn header(&mut self, text: &str) {
        if !self.output.is_empty() {
            self.output.push('\n');
        }
        self.output.push_str(text);
        self.output.push('\n');
        for _ in text.chars() {
            self.output.push('=');
        }
        self.output.push('\n');
    }

    fn begin_list(&mut self, title: &str) {
        self.output.push('\n');
        self.output.push_str(title);
        self.output.push_str(":\n");
    }

    fn list_item(&mut self, text: &str) {
        self.output.push_str("  ");
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn end_list(&mut self) {}

    fn line(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
    }
}

/// reStructuredText renderer: section titles with adornment lines,
/// bullet-list items.
#[derive(Debug, Default)]
pub struct RstListWriter {
    output: String,
    depth: usize,
}

impl RstListWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_output(self) -> String {
        self.output
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

impl ListSink for RstListWriter {
    fn header(&mut self, text: &str) {
        if !self.output.is_empty() {
            self.output.push('\n');
        }
        let adornment = if self.depth == 0 { '=' } else { '-' };
        self.depth = 1;
        self.output.push_str(text);
        self.output.push('\n');
        for _ in text.chars() {
            self.output.push(adornment);
        }
        self.output.push_str("\n\n");
    }

    fn begin_list(&mut self, title: &str) {
        self.output.push_str("**");
        self.output.push_str(title);
        self.output.push_str("**\n\n");
    }

    fn list_item(&mut self, text: &str) {
        self.output.push_str("* ");
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn end_list(&mut self) {
        self.output.push('\n');
    }

    fn line(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
    }
}
