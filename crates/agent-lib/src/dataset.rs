//! Training dataset storage
//!
//! The dataset is an append-only CSV file with a header row. Raw exports
//! from the building logger use their own column names, which are mapped
//! to the logical feature/label names at ingestion time.

use crate::error::{HvacError, Result};
use crate::models::{FeatureVector, LabeledSample, FEATURE_NAMES, LABEL_NAME, NUM_FEATURES};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Raw logger column → logical column
const COLUMN_RENAMES: &[(&str, &str)] = &[
    ("outside_temp", "temperature"),
    ("amb_humid_1", "humidity"),
    ("co2_1", "co2_level"),
    ("summer_setpoint_temp", "desired_temperature"),
];

/// Column that is filled with zeros when the export lacks it
const OPTIONAL_COLUMN: &str = "occupancy";

/// Cleaned rows ready for scaling and training
#[derive(Debug, Clone, Default)]
pub struct DatasetRows {
    pub features: Vec<FeatureVector>,
    pub labels: Vec<f64>,
    /// Rows discarded because a required value was missing or unparseable
    pub dropped: usize,
}

impl DatasetRows {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Append-only CSV dataset of labeled samples
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    path: PathBuf,
}

impl TrainingDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load and clean every row
    pub fn load(&self) -> Result<DatasetRows> {
        if !self.exists() {
            return Err(HvacError::DatasetMissing(self.path.display().to_string()));
        }
        let content = fs::read_to_string(&self.path)?;
        let rows = parse_dataset(&content)?;

        info!(
            path = %self.path.display(),
            rows = rows.len(),
            dropped = rows.dropped,
            "Loaded training dataset"
        );
        Ok(rows)
    }

    /// Number of data rows in the file, cleaned or not
    pub fn row_count(&self) -> Result<usize> {
        if !self.exists() {
            return Ok(0);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(content.lines().skip(1).filter(|l| !l.trim().is_empty()).count())
    }

    /// Append one labeled sample as a new row
    ///
    /// Values are written in the file's own column order. Columns that do
    /// not map to a feature or the label are left empty. A missing file is
    /// created with the logical header.
    pub fn append(&self, sample: &LabeledSample) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let existing = if self.exists() {
            fs::read_to_string(&self.path)?
        } else {
            String::new()
        };

        let mut out = String::new();
        let header: Vec<String> = match existing.lines().next() {
            Some(line) if !line.trim().is_empty() => split_line(line),
            _ => {
                let header: Vec<String> = FEATURE_NAMES
                    .iter()
                    .chain(std::iter::once(&LABEL_NAME))
                    .map(|s| s.to_string())
                    .collect();
                out.push_str(&header.join(","));
                out.push('\n');
                header
            }
        };

        if !existing.is_empty() && !existing.ends_with('\n') {
            out.insert(0, '\n');
        }

        let fields: Vec<String> = header
            .iter()
            .map(|column| sample_value(sample, logical_name(column)).unwrap_or_default())
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(out.as_bytes())?;
        file.sync_all()?;

        debug!(path = %self.path.display(), "Appended labeled sample");
        Ok(())
    }
}

fn logical_name(column: &str) -> &str {
    COLUMN_RENAMES
        .iter()
        .find(|(raw, _)| *raw == column)
        .map(|(_, logical)| *logical)
        .unwrap_or(column)
}

fn sample_value(sample: &LabeledSample, column: &str) -> Option<String> {
    let s = &sample.snapshot;
    match column {
        "temperature" => Some(s.temperature.to_string()),
        "humidity" => Some(s.humidity.to_string()),
        "co2_level" => Some(s.co2_level.to_string()),
        "occupancy" => Some(s.occupancy.to_string()),
        "desired_temperature" => Some(sample.desired_temperature.to_string()),
        _ => None,
    }
}

/// Split one CSV record, honouring double-quoted fields and `""` escapes
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

/// Parse CSV content into cleaned feature/label rows
pub fn parse_dataset(content: &str) -> Result<DatasetRows> {
    let mut lines = content.lines();
    let header = match lines.next() {
        Some(line) if !line.trim().is_empty() => split_line(line),
        _ => return Err(HvacError::InvalidDataset("dataset has no header row".to_string())),
    };
    let columns: Vec<&str> = header.iter().map(|c| logical_name(c)).collect();

    let index_of = |name: &str| columns.iter().position(|c| *c == name);

    let mut feature_idx: [Option<usize>; NUM_FEATURES] = [None; NUM_FEATURES];
    for (slot, name) in feature_idx.iter_mut().zip(FEATURE_NAMES) {
        *slot = index_of(name);
        if slot.is_none() && name != OPTIONAL_COLUMN {
            return Err(HvacError::SchemaMismatch(name.to_string()));
        }
    }
    let label_idx =
        index_of(LABEL_NAME).ok_or_else(|| HvacError::SchemaMismatch(LABEL_NAME.to_string()))?;

    let mut rows = DatasetRows::default();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_line(line);
        if fields.len() != header.len() {
            rows.dropped += 1;
            continue;
        }

        let mut values = [0.0; NUM_FEATURES];
        let mut complete = true;
        for (value, idx) in values.iter_mut().zip(feature_idx) {
            match idx {
                Some(i) => match parse_field(fields.get(i)) {
                    Some(v) => *value = v,
                    None => {
                        complete = false;
                        break;
                    }
                },
                None => *value = 0.0,
            }
        }
        let label = parse_field(fields.get(label_idx));

        match (complete, label) {
            (true, Some(label)) => {
                rows.features.push(FeatureVector(values));
                rows.labels.push(label);
            }
            _ => rows.dropped += 1,
        }
    }

    Ok(rows)
}

fn parse_field(field: Option<&String>) -> Option<f64> {
    let raw = field?.as_str();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensorSnapshot;
    use tempfile::TempDir;

    const RAW_EXPORT: &str = "timestamp,outside_temp,amb_humid_1,co2_1,summer_setpoint_temp\n\
        2024-06-01T10:00,26.1,48.0,520,23.0\n\
        2024-06-01T10:10,27.3,,540,23.5\n\
        2024-06-01T10:20,25.0,50.5,610,22.5\n";

    fn sample() -> LabeledSample {
        LabeledSample {
            snapshot: SensorSnapshot {
                temperature: 24.0,
                humidity: 45.0,
                co2_level: 700,
                occupancy: 1,
            },
            desired_temperature: 21.5,
        }
    }

    #[test]
    fn test_raw_columns_renamed() {
        let rows = parse_dataset(RAW_EXPORT).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.dropped, 1);
        assert_eq!(rows.features[0].0, [26.1, 48.0, 520.0, 0.0]);
        assert_eq!(rows.labels, vec![23.0, 22.5]);
    }

    #[test]
    fn test_occupancy_used_when_present() {
        let csv = "temperature,humidity,co2_level,occupancy,desired_temperature\n20,40,450,1,21\n";
        let rows = parse_dataset(csv).unwrap();
        assert_eq!(rows.features[0].0[3], 1.0);
    }

    #[test]
    fn test_missing_column_is_schema_mismatch() {
        let csv = "outside_temp,amb_humid_1,summer_setpoint_temp\n20,40,21\n";
        match parse_dataset(csv) {
            Err(HvacError::SchemaMismatch(col)) => assert_eq!(col, "co2_level"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_label_is_schema_mismatch() {
        let csv = "temperature,humidity,co2_level\n20,40,450\n";
        assert!(matches!(parse_dataset(csv), Err(HvacError::SchemaMismatch(c)) if c == LABEL_NAME));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let dataset = TrainingDataset::new(dir.path().join("nope.csv"));
        assert!(matches!(dataset.load(), Err(HvacError::DatasetMissing(_))));
        assert_eq!(dataset.row_count().unwrap(), 0);
    }

    #[test]
    fn test_append_follows_file_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hvac_data.csv");
        fs::write(&path, RAW_EXPORT).unwrap();
        let dataset = TrainingDataset::new(&path);

        assert_eq!(dataset.row_count().unwrap(), 3);
        dataset.append(&sample()).unwrap();
        assert_eq!(dataset.row_count().unwrap(), 4);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with(",24,45,700,21.5\n"));

        let rows = dataset.load().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(*rows.labels.last().unwrap(), 21.5);
    }

    #[test]
    fn test_append_creates_file_with_logical_header() {
        let dir = TempDir::new().unwrap();
        let dataset = TrainingDataset::new(dir.path().join("data").join("new.csv"));
        dataset.append(&sample()).unwrap();

        let content = fs::read_to_string(dataset.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("temperature,humidity,co2_level,occupancy,desired_temperature"));
        assert_eq!(lines.next(), Some("24,45,700,1,21.5"));
    }

    #[test]
    fn test_append_without_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("d.csv");
        fs::write(&path, "temperature,humidity,co2_level,occupancy,desired_temperature\n20,40,450,0,21").unwrap();
        let dataset = TrainingDataset::new(&path);
        dataset.append(&sample()).unwrap();
        assert_eq!(dataset.load().unwrap().len(), 2);
    }

    #[test]
    fn test_quoted_field_with_comma_keeps_columns_aligned() {
        let csv = "timestamp,outside_temp,amb_humid_1,co2_1,summer_setpoint_temp\n\
            \"Jun 1, 2024\",26.1,48.0,520,23.0\n";
        let rows = parse_dataset(csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.dropped, 0);
        assert_eq!(rows.features[0], FeatureVector([26.1, 48.0, 520.0, 0.0]));
        assert_eq!(rows.labels[0], 23.0);
    }

    #[test]
    fn test_ragged_row_dropped() {
        let csv = "temperature,humidity,co2_level,desired_temperature\n\
            20,40,450,21\n\
            Jun 1, 2024,20,40,450,21\n\
            22,41\n";
        let rows = parse_dataset(csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.dropped, 2);
    }

    #[test]
    fn test_split_line_escaped_quotes() {
        assert_eq!(
            split_line(r#"a,"say ""hi"", ok", 3 "#),
            vec!["a".to_string(), "say \"hi\", ok".to_string(), "3".to_string()]
        );
    }
}
