// Brltab CLI
// Authoring-time front end: check, list, and audit key tables

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use brltab_core::compile::compile_file;
use brltab_core::{
    audit, list, KeyNameSet, KeyTable, KeyValue, RstListWriter, TextListWriter, KEY_NUMBER_ANY,
};

/// Braille display key table tool
#[derive(Parser, Debug)]
#[command(name = "brltab")]
#[command(version = "0.2.1")]
#[command(about = "Compile, list, and audit braille display key tables", long_about = None)]
struct Args {
    /// Key name definition file (defaults to a generic keyboard set)
    #[arg(short, long, value_name = "FILE", global = true)]
    names: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Compile a table and report audit findings
    Check {
        /// Key table source file
        file: PathBuf,
    },

    /// Render a table's help listing
    List {
        /// Key table source file
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = ListFormat::Text)]
        format: ListFormat,
    },

    /// Report audit findings only
    Audit {
        /// Key table source file
        file: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ListFormat {
    Text,
    Rst,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let names = load_names(args.names.as_deref())?;
    log::debug!("key name universe has {} entries", names.len());
    match args.command {
        CliCommand::Check { file } => {
            let table = compile(&file, &names)?;
            let findings = audit(&table);
            for finding in &findings {
                println!("{finding}");
            }
            println!(
                "{}: {} contexts, {} findings",
                table.name,
                table.contexts.len(),
                findings.len()
            );
            Ok(())
        }
        CliCommand::List { file, format } => {
            let table = compile(&file, &names)?;
            let output = match format {
                ListFormat::Text => {
                    let mut writer = TextListWriter::new();
                    list(&table, &mut writer);
                    writer.into_output()
                }
                ListFormat::Rst => {
                    let mut writer = RstListWriter::new();
                    list(&table, &mut writer);
                    writer.into_output()
                }
            };
            print!("{output}");
            Ok(())
        }
        CliCommand::Audit { file } => {
            let table = compile(&file, &names)?;
            for finding in audit(&table) {
                println!("{finding}");
            }
            Ok(())
        }
    }
}

fn compile(file: &Path, names: &KeyNameSet) -> Result<KeyTable> {
    compile_file(file, names).with_context(|| format!("compiling {}", file.display()))
}

/// Read a key name definition file: one `NAME GROUP.NUMBER` pair per
/// line, `#` comments, `*` as the number for a whole-group name.
fn load_names(path: Option<&Path>) -> Result<KeyNameSet> {
    let Some(path) = path else {
        return Ok(KeyNameSet::generic());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading key names from {}", path.display()))?;

    let mut pairs = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(name), Some(value), None) = (fields.next(), fields.next(), fields.next())
        else {
            bail!(
                "{}:{}: expected NAME GROUP.NUMBER",
                path.display(),
                number + 1
            );
        };
        pairs.push((name.to_string(), parse_value(value).with_context(|| {
            format!("{}:{}: bad key value '{}'", path.display(), number + 1, value)
        })?));
    }
    Ok(KeyNameSet::new(pairs))
}

fn parse_value(value: &str) -> Result<KeyValue> {
    let Some((group, number)) = value.split_once('.') else {
        bail!("missing '.' separator");
    };
    let group: u8 = group.parse().context("bad group")?;
    if number == "*" {
        return Ok(KeyValue::any(group));
    }
    let number: u8 = number.parse().context("bad number")?;
    if number == KEY_NUMBER_ANY {
        bail!("number {KEY_NUMBER_ANY} is reserved");
    }
    Ok(KeyValue::new(group, number))
}
