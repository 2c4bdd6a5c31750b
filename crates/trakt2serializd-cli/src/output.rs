use clap::ValueEnum;
use comfy_table::{Cell, Color, Table};
use media_migrate_core::progress::describe;
use media_migrate_models::{DestinationShowMatch, MigrationSummary};
use owo_colors::OwoColorize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
}

pub struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    pub fn is_human(&self) -> bool {
        self.format == OutputFormat::Human
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        self.message("success", "✓".green().to_string(), msg.as_ref());
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }

        match self.format {
            OutputFormat::Human => println!("{}", msg.as_ref()),
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.print_json(&json!({ "type": "info", "message": msg.as_ref() }));
            }
        }
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.message("warning", "⚠".yellow().to_string(), msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        // Errors should always be shown, even in quiet mode
        match self.format {
            OutputFormat::Human => eprintln!("{} {}", "✗".red(), msg.as_ref()),
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.print_json(&json!({ "type": "error", "message": msg.as_ref() }));
            }
        }
    }

    fn message(&self, kind: &str, mark: String, msg: &str) {
        if self.quiet {
            return;
        }

        match self.format {
            OutputFormat::Human => println!("{} {}", mark, msg),
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.print_json(&json!({ "type": kind, "message": msg }));
            }
        }
    }

    /// Final report: a table per show in human mode, the whole summary in JSON
    pub fn summary(&self, summary: &MigrationSummary) {
        match self.format {
            OutputFormat::Human => {
                if self.quiet {
                    return;
                }
                if !summary.results.is_empty() {
                    println!("{}", summary_table(summary));
                }
                println!(
                    "{} matched, {} unresolved, {} with errors, {} episodes marked",
                    summary.tally.matched.to_string().green(),
                    summary.tally.unresolved.to_string().yellow(),
                    summary.tally.failed.to_string().red(),
                    summary.episodes_marked()
                );
            }
            OutputFormat::Json | OutputFormat::JsonPretty => {
                let value = serde_json::to_value(summary).unwrap_or_default();
                self.print_json(&json!({
                    "type": "summary",
                    "outcome": format!("{:?}", summary.outcome()),
                    "summary": value,
                }));
            }
        }
    }

    fn print_json(&self, data: &serde_json::Value) {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(data).unwrap_or_default());
            }
            OutputFormat::JsonPretty => {
                println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
            }
            OutputFormat::Human => {
                // Shouldn't happen, but fallback to string representation
                println!("{}", data);
            }
        }
    }
}

fn summary_table(summary: &MigrationSummary) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("Show").add_attribute(comfy_table::Attribute::Bold),
        Cell::new("Serializd").add_attribute(comfy_table::Attribute::Bold),
        Cell::new("Episodes").add_attribute(comfy_table::Attribute::Bold),
        Cell::new("Seasons").add_attribute(comfy_table::Attribute::Bold),
        Cell::new("Already logged").add_attribute(comfy_table::Attribute::Bold),
        Cell::new("Result").add_attribute(comfy_table::Attribute::Bold),
    ]);

    for result in &summary.results {
        let (target, status) = match &result.destination {
            DestinationShowMatch::Matched { show_id, method, .. } => {
                let status = if result.has_errors() {
                    Cell::new(format!("{} errors", result.errors.len())).fg(Color::Red)
                } else {
                    Cell::new("ok").fg(Color::Green)
                };
                (format!("{} ({})", show_id, method), status)
            }
            DestinationShowMatch::Unresolved { .. } => {
                ("-".to_string(), Cell::new(describe(result)).fg(Color::Yellow))
            }
        };
        table.add_row(vec![
            Cell::new(&result.title),
            Cell::new(target),
            Cell::new(result.episodes_marked),
            Cell::new(result.seasons_marked),
            Cell::new(result.already_watched),
            status,
        ]);
    }

    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}
