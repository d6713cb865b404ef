// Brltab Audit Pass
// Advisory findings over a compiled table

use std::fmt;

use crate::table::KeyTable;

/// One advisory finding. None of these block compilation or translation;
/// they exist for table authors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFinding {
    /// A CONTEXT command targets a context no directive ever selected.
    UndefinedContext { context: String },
    /// A user context was authored but nothing switches to it.
    UnreferencedContext { context: String },
    /// A context was selected but nothing was put into it.
    EmptyContext { context: String },
    /// A later binding repeats an earlier combination.
    DuplicateBinding { context: String, combination: String },
    /// A later hotkey repeats an earlier key.
    DuplicateHotkey { context: String, key: String },
    /// A later mapped key repeats an earlier key.
    DuplicateMappedKey { context: String, key: String },
}

impl fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditFinding::UndefinedContext { context } => {
                write!(f, "context '{context}' is referenced but never defined")
            }
            AuditFinding::UnreferencedContext { context } => {
                write!(f, "context '{context}' is defined but never referenced")
            }
            AuditFinding::EmptyContext { context } => {
                write!(f, "context '{context}' is empty")
            }
            AuditFinding::DuplicateBinding { context, combination } => {
                write!(f, "context '{context}': duplicate binding for {combination}")
            }
            AuditFinding::DuplicateHotkey { context, key } => {
                write!(f, "context '{context}': duplicate hotkey for {key}")
            }
            AuditFinding::DuplicateMappedKey { context, key } => {
                write!(f, "context '{context}': duplicate mapped key {key}")
            }
        }
    }
}

/// Check a compiled table for authoring mistakes. Read-only; findings are
/// returned in context order.
pub fn audit(table: &KeyTable) -> Vec<AuditFinding> {
    let mut findings = Vec::new();

    for ctx in &table.contexts {
        let context = ctx.label().to_string();

        if !ctx.is_special {
            if !ctx.is_defined {
                findings.push(AuditFinding::UndefinedContext {
                    context: context.clone(),
                });
            }
            if !ctx.is_referenced {
                findings.push(AuditFinding::UnreferencedContext {
                    context: context.clone(),
                });
            }
            if ctx.is_defined && ctx.is_empty() {
                findings.push(AuditFinding::EmptyContext {
                    context: context.clone(),
                });
            }
        }

        for binding in &ctx.bindings {
            if binding.duplicate {
                findings.push(AuditFinding::DuplicateBinding {
                    context: context.clone(),
                    combination: binding.combination.format(&table.names),
                });
            }
        }
        for hotkey in &ctx.hotkeys {
            if hotkey.duplicate {
                findings.push(AuditFinding::DuplicateHotkey {
                    context: context.clone(),
                    key: table.names.format_value(hotkey.key),
                });
            }
        }
        for mapped in &ctx.mapped_keys {
            if mapped.duplicate {
                findings.push(AuditFinding::DuplicateMappedKey {
                    context: context.clone(),
                    key: table.names.format_value(mapped.key),
                });
            }
        }
    }

    findings
}
