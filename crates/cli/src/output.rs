//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use hvac_agent_lib::{ActuatorCommand, Device, HvacMode, SwitchState};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// One key/value line of a detail table
#[derive(Tabled)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl FieldRow {
    pub fn new(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }
}

/// Print `value` as pretty JSON, or `rows` as a table
pub fn print_record<T: Serialize>(value: &T, rows: Vec<FieldRow>, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Table => {
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
        }
    }
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn format_celsius(value: f64) -> String {
    format!("{:.2} °C", value)
}

/// Optional metric, `-` when absent
pub fn format_optional(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "-".to_string(),
    }
}

/// Leading 12 hex characters of a SHA-256 fingerprint
pub fn short_fingerprint(fingerprint: &str) -> String {
    fingerprint.chars().take(12).collect()
}

/// Unix seconds as a UTC date-time, or the raw number if out of range
pub fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Color a mode: blue for cooling, red for heating
pub fn color_mode(mode: HvacMode) -> String {
    let label = mode.to_string();
    match mode {
        HvacMode::Cooling => label.blue().bold().to_string(),
        HvacMode::Heating => label.red().bold().to_string(),
        HvacMode::Idle => label.dimmed().to_string(),
    }
}

pub fn color_switch(state: SwitchState) -> String {
    match state {
        SwitchState::On => state.payload().green().to_string(),
        SwitchState::Off => state.payload().dimmed().to_string(),
    }
}

/// Rows showing each device's switch state
pub fn command_rows(command: &ActuatorCommand) -> Vec<FieldRow> {
    Device::ALL
        .iter()
        .map(|device| FieldRow::new(device.as_str(), color_switch(command.state_of(*device))))
        .collect()
}
