//! Field output written after every accepted step.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The vertex values of one species at one time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFrame {
    pub species: String,
    pub compartment: String,
    /// Accepted steps before this frame; zero for the initial condition.
    pub step: usize,
    pub t: f64,
    pub values: Vec<f64>,
    /// Vertex coordinates, aligned with `values`.
    pub coordinates: Vec<[f64; 3]>,
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("writing field output failed")]
    Io(#[from] io::Error),

    #[error("encoding field output failed")]
    Json(#[from] serde_json::Error),
}

/// A destination for field frames.
pub trait FieldSink {
    /// Records one frame.
    ///
    /// # Errors
    ///
    /// Returns an [`OutputError`] if the frame cannot be stored.
    fn write(&mut self, frame: &FieldFrame) -> Result<(), OutputError>;
}

/// Keeps every frame in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    frames: Vec<FieldFrame>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn frames(&self) -> &[FieldFrame] {
        &self.frames
    }

    /// Frames of one species, in write order.
    pub fn species<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FieldFrame> + 'a {
        self.frames.iter().filter(move |f| f.species == name)
    }

    #[must_use]
    pub fn into_frames(self) -> Vec<FieldFrame> {
        self.frames
    }
}

impl FieldSink for MemorySink {
    fn write(&mut self, frame: &FieldFrame) -> Result<(), OutputError> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Flushes and returns the writer.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn into_inner(mut self) -> Result<W, OutputError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> FieldSink for JsonLinesSink<W> {
    fn write(&mut self, frame: &FieldFrame) -> Result<(), OutputError> {
        serde_json::to_writer(&mut self.writer, frame)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Summary statistics of vertex values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
}

impl FieldStats {
    /// Statistics of `values`; all `NaN` when empty.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let values: Vec<f64> = values.into_iter().collect();
        if values.is_empty() {
            return Self {
                min: f64::NAN,
                max: f64::NAN,
                mean: f64::NAN,
                std: f64::NAN,
            };
        }
        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std: variance.sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn frame(species: &str, step: usize) -> FieldFrame {
        FieldFrame {
            species: species.into(),
            compartment: "Cyto".into(),
            step,
            t: 0.5 * step as f64,
            values: vec![1.0, 2.0],
            coordinates: vec![[0.0; 3], [1.0, 0.0, 0.0]],
        }
    }

    #[test]
    fn stats_of_known_values() {
        let stats = FieldStats::from_values([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_relative_eq!(stats.min, 2.0);
        assert_relative_eq!(stats.max, 9.0);
        assert_relative_eq!(stats.mean, 5.0);
        assert_relative_eq!(stats.std, 2.0);
        assert!(FieldStats::from_values([]).mean.is_nan());
    }

    #[test]
    fn memory_sink_filters_by_species() {
        let mut sink = MemorySink::new();
        sink.write(&frame("A", 0)).unwrap();
        sink.write(&frame("B", 0)).unwrap();
        sink.write(&frame("A", 1)).unwrap();
        let steps: Vec<usize> = sink.species("A").map(|f| f.step).collect();
        assert_eq!(steps, vec![0, 1]);
        assert_eq!(sink.frames().len(), 3);
    }

    #[test]
    fn json_lines_sink_writes_one_frame_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write(&frame("A", 0)).unwrap();
        sink.write(&frame("A", 1)).unwrap();
        let bytes = sink.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let frames: Vec<FieldFrame> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(frames, vec![frame("A", 0), frame("A", 1)]);
    }
}
