use std::{fs, path::Path};

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use tracing::debug;

use crate::ConfigurationError;

/// Reads a two-column numeric table.
pub(super) fn read_table(path: &Path) -> Result<Vec<(f64, f64)>, ConfigurationError> {
    let content = read(path)?;
    let samples = parse_table(&content, &path.display().to_string())?;
    debug!(path = %path.display(), rows = samples.len(), "read sample table");
    Ok(samples)
}

fn parse_table(content: &str, source_name: &str) -> Result<Vec<(f64, f64)>, ConfigurationError> {
    let delimiter = if content.contains(',') {
        b','
    } else if content.contains('\t') {
        b'\t'
    } else {
        b' '
    };
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let data_error = |reason: String| ConfigurationError::Data {
        source_name: source_name.to_owned(),
        reason,
    };

    let mut samples = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| data_error(e.to_string()))?;
        let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
        if fields.is_empty() {
            continue;
        }
        let parsed: Result<Vec<f64>, _> = fields.iter().map(|f| f.parse::<f64>()).collect();
        match (parsed, fields.len()) {
            (Ok(values), 2) => samples.push((values[0], values[1])),
            // Header row.
            (Err(_), _) if samples.is_empty() && row == 0 => {}
            _ => {
                return Err(data_error(format!(
                    "row {} must hold exactly two numbers, found `{}`",
                    row + 1,
                    fields.join(" ")
                )));
            }
        }
    }
    Ok(samples)
}

#[derive(Debug, Deserialize)]
struct FieldFile {
    frames: Vec<Frame>,
}

#[derive(Debug, Deserialize)]
struct Frame {
    time: f64,
    values: Vec<f64>,
}

/// Reads a JSON field time series into times and per-vertex frames.
pub(super) fn read_field(path: &Path) -> Result<(Vec<f64>, Vec<Vec<f64>>), ConfigurationError> {
    let content = read(path)?;
    let file: FieldFile =
        serde_json::from_str(&content).map_err(|e| ConfigurationError::Data {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
    debug!(path = %path.display(), frames = file.frames.len(), "read field time series");
    Ok(file.frames.into_iter().map(|f| (f.time, f.values)).unzip())
}

fn read(path: &Path) -> Result<String, ConfigurationError> {
    fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_owned(),
        source,
    })
}
