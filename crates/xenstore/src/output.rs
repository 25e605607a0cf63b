use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use xenstore_client::WatchEvent;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Raw
        }
    }
}

#[derive(Serialize)]
struct ValueOutput<'a> {
    operation: &'a str,
    path: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct ChildrenOutput<'a> {
    path: &'a str,
    children: &'a [String],
}

/// One row of `list --long`.
#[derive(Debug, Serialize)]
pub struct Entry {
    pub path: String,
    pub permissions: String,
}

#[derive(Serialize)]
struct EventOutput<'a> {
    event: &'static str,
    path: &'a str,
    token: &'a str,
}

/// Print the single-string result of `operation` on `path`.
pub fn print_value(operation: &str, path: &str, value: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ValueOutput {
            operation,
            path,
            value,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OPERATION", "PATH", "VALUE"])
                .add_row(vec![operation.to_string(), path.to_string(), printable(value)]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{path}: {}", printable(value)),
        OutputFormat::Raw => println!("{value}"),
    }
}

/// Print the children of `path`.
pub fn print_children(path: &str, children: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ChildrenOutput { path, children }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHILD"]);
            for child in children {
                table.add_row(vec![child.as_str()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", children.join(" ")),
        OutputFormat::Raw => {
            let mut out = std::io::stdout().lock();
            for child in children {
                let _ = writeln!(out, "{child}");
            }
            let _ = out.flush();
        }
    }
}

/// Print full child paths with their permissions.
pub fn print_entries(entries: &[Entry], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(entries),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PATH", "PERMISSIONS"]);
            for entry in entries {
                table.add_row(vec![entry.path.clone(), printable(&entry.permissions)]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for entry in entries {
                println!("{} {}", entry.path, printable(&entry.permissions));
            }
        }
    }
}

/// Print one watch notification.
pub fn print_event(event: &WatchEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&EventOutput {
            event: "WATCH_EVENT",
            path: &event.path,
            token: &event.token,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("{} [{}]", event.path, event.token);
        }
        OutputFormat::Raw => println!("{}", event.path),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Multi-field values (permission lists) are NUL separated on the wire.
fn printable(value: &str) -> String {
    value.replace('\0', " ")
}
