//! Commands talking to a running agent

use anyhow::Result;
use colored::Colorize;
use hvac_agent_lib::LabeledSample;

use crate::client::ApiClient;
use crate::output::{
    color_mode, format_celsius, format_timestamp, print_record, print_success, print_warning,
    short_fingerprint, FieldRow, OutputFormat,
};

/// Show the agent's configuration, model state and last cycle
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;

    let model = if status.model_loaded {
        "loaded".green().to_string()
    } else {
        "not loaded".yellow().to_string()
    };

    let mut rows = vec![
        FieldRow::new("zone", status.zone.cyan().to_string()),
        FieldRow::new("setpoint", format_celsius(status.setpoint)),
        FieldRow::new("deadband", format_celsius(status.deadband)),
        FieldRow::new("backend", status.backend.clone()),
        FieldRow::new("sensors", status.sensor_source.clone()),
        FieldRow::new("model", model),
        FieldRow::new("inferences", status.total_inferences.to_string()),
        FieldRow::new("trainings", status.total_trainings.to_string()),
    ];
    if let (Some(model_fp), Some(scaler_fp)) = (&status.model_fingerprint, &status.scaler_fingerprint) {
        rows.push(FieldRow::new(
            "fingerprints",
            format!("{} / {}", short_fingerprint(model_fp), short_fingerprint(scaler_fp)),
        ));
    }
    match &status.last_cycle {
        Some(cycle) => {
            rows.push(FieldRow::new("last cycle", format!("#{} at {}", cycle.cycle, format_timestamp(cycle.completed_at))));
            if let Some(predicted) = cycle.predicted_temperature {
                rows.push(FieldRow::new("predicted", format_celsius(predicted)));
            }
            if let Some(mode) = cycle.mode {
                rows.push(FieldRow::new("mode", color_mode(mode)));
            }
            if let Some(error) = &cycle.error {
                rows.push(FieldRow::new("error", error.red().to_string()));
            }
        }
        None => rows.push(FieldRow::new("last cycle", "-")),
    }

    print_record(&status, rows, format)
}

/// Show the agent's current sensor readings
pub async fn show_sensors(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let snapshot = client.sensor_data().await?;

    let rows = vec![
        FieldRow::new("temperature", format_celsius(snapshot.temperature)),
        FieldRow::new("humidity", format!("{:.2} %", snapshot.humidity)),
        FieldRow::new("co2_level", format!("{} ppm", snapshot.co2_level)),
        FieldRow::new("occupancy", snapshot.occupancy.to_string()),
    ];
    print_record(&snapshot, rows, format)
}

/// Send a labeled sample to the agent's retrain queue
pub async fn submit_sample(client: &ApiClient, sample: &LabeledSample, format: OutputFormat) -> Result<()> {
    let response = client.submit_sample(sample).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Table => {
            if response.status == "queued" {
                print_success("Sample queued; the agent retrains in the background");
            } else {
                print_warning(&format!("Agent answered: {}", response.status));
            }
        }
    }
    Ok(())
}
