//! Dataset files: locate a named histogram in a file.
//!
//! Two on-disk layouts are supported, picked by file extension:
//!
//! - **JSON** (default): a list of pre-binned histograms,
//!   `{"created": ..., "histograms": [{"name", "title", "x_min", "x_max", "contents", "sumw2"?}]}`
//! - **CSV**: one column of raw sample values per dataset, keyed by header
//!   name. The requested column is binned with the caller's [`Binning`].
//!
//! Missing/unreadable files are [`DatasetError::Io`]; a readable file without
//! the requested name is [`DatasetError::NotFound`].

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;

use chrono::{DateTime, Utc};
use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::domain::{Binning, Histogram};
use crate::error::{AppError, DatasetError};

/// Serialized dataset file (JSON layout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    pub histograms: Vec<HistogramRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramRecord {
    pub name: String,
    #[serde(default)]
    pub title: String,
    pub x_min: f64,
    pub x_max: f64,
    pub contents: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sumw2: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<f64>,
    #[serde(default)]
    pub underflow: f64,
    #[serde(default)]
    pub overflow: f64,
}

impl From<&Histogram> for HistogramRecord {
    fn from(h: &Histogram) -> Self {
        Self {
            name: h.name.clone(),
            title: h.title.clone(),
            x_min: h.x_min,
            x_max: h.x_max,
            contents: h.contents.clone(),
            sumw2: h.sumw2.clone(),
            entries: Some(h.entries),
            underflow: h.underflow,
            overflow: h.overflow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Json,
    Csv,
}

fn layout_for(path: &Path) -> Layout {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Layout::Csv,
        _ => Layout::Json,
    }
}

/// Open `path` and return the dataset called `name`.
///
/// `binning` only applies to CSV sample columns; JSON histograms carry their own.
pub fn load_dataset(path: &Path, name: &str, binning: &Binning) -> Result<Histogram, DatasetError> {
    let text = read_text(path)?;
    let hist = match layout_for(path) {
        Layout::Json => {
            let file = parse_json(path, &text)?;
            let record = file
                .histograms
                .into_iter()
                .find(|h| h.name == name)
                .ok_or_else(|| DatasetError::NotFound {
                    name: name.to_string(),
                    path: path.to_path_buf(),
                })?;
            histogram_from_record(path, record)?
        }
        Layout::Csv => load_csv_column(path, &text, name, binning)?,
    };

    log::info!(
        "loaded '{}' from {}: {} bins over [{}, {}], integral {:.1}",
        hist.name,
        path.display(),
        hist.n_bins(),
        hist.x_min,
        hist.x_max,
        hist.integral()
    );
    Ok(hist)
}

/// Names of all datasets in a file, in file order.
pub fn list_datasets(path: &Path) -> Result<Vec<String>, DatasetError> {
    let text = read_text(path)?;
    match layout_for(path) {
        Layout::Json => Ok(parse_json(path, &text)?
            .histograms
            .into_iter()
            .map(|h| h.name)
            .collect()),
        Layout::Csv => {
            let mut reader = csv_reader(&text);
            let headers = reader.headers().map_err(|e| format_error(path, format!("bad CSV header: {e}")))?;
            Ok(headers.iter().map(normalize_header_name).collect())
        }
    }
}

/// Write histograms as a JSON dataset file.
pub fn write_dataset_file(path: &Path, histograms: &[Histogram]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(4, format!("Failed to create dataset file '{}': {e}", path.display())))?;

    let doc = DatasetFile {
        created: Some(Utc::now()),
        histograms: histograms.iter().map(HistogramRecord::from).collect(),
    };

    serde_json::to_writer_pretty(file, &doc)
        .map_err(|e| AppError::new(4, format!("Failed to write dataset file: {e}")))?;
    Ok(())
}

/// Write raw samples as a single-column CSV dataset file.
pub fn write_samples_csv(path: &Path, name: &str, samples: &[f64]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(4, format!("Failed to create CSV '{}': {e}", path.display())))?;
    writer
        .write_record([name])
        .map_err(|e| AppError::new(4, format!("Failed to write CSV header: {e}")))?;
    for v in samples {
        writer
            .write_record([format!("{v:.6}")])
            .map_err(|e| AppError::new(4, format!("Failed to write CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(4, format!("Failed to flush CSV: {e}")))?;
    Ok(())
}

fn read_text(path: &Path) -> Result<String, DatasetError> {
    fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_json(path: &Path, text: &str) -> Result<DatasetFile, DatasetError> {
    serde_json::from_str(text).map_err(|e| format_error(path, format!("bad JSON: {e}")))
}

fn format_error(path: &Path, message: impl Into<String>) -> DatasetError {
    DatasetError::Format {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn histogram_from_record(path: &Path, record: HistogramRecord) -> Result<Histogram, DatasetError> {
    let n = record.contents.len();
    if n == 0 {
        return Err(format_error(path, format!("histogram '{}' has no bins", record.name)));
    }
    if !(record.x_min.is_finite() && record.x_max.is_finite() && record.x_max > record.x_min) {
        return Err(format_error(
            path,
            format!(
                "histogram '{}' has invalid range [{}, {}]",
                record.name, record.x_min, record.x_max
            ),
        ));
    }
    if let Some(w2) = &record.sumw2 {
        if w2.len() != n {
            return Err(format_error(
                path,
                format!("histogram '{}': sumw2 has {} entries for {n} bins", record.name, w2.len()),
            ));
        }
    }
    if record.contents.iter().any(|c| !c.is_finite()) {
        return Err(format_error(path, format!("histogram '{}' has non-finite contents", record.name)));
    }

    let integral: f64 = record.contents.iter().sum();
    let title = if record.title.is_empty() { record.name.clone() } else { record.title };
    Ok(Histogram {
        name: record.name,
        title,
        x_min: record.x_min,
        x_max: record.x_max,
        contents: record.contents,
        sumw2: record.sumw2,
        entries: record.entries.unwrap_or(integral),
        underflow: record.underflow,
        overflow: record.overflow,
    })
}

fn csv_reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes())
}

fn load_csv_column(path: &Path, text: &str, name: &str, binning: &Binning) -> Result<Histogram, DatasetError> {
    if !binning.is_valid() {
        return Err(format_error(
            path,
            format!(
                "invalid binning: {} bins over [{}, {}]",
                binning.n_bins, binning.x_min, binning.x_max
            ),
        ));
    }

    let mut reader = csv_reader(text);
    let headers = reader
        .headers()
        .map_err(|e| format_error(path, format!("bad CSV header: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let col = *header_map.get(name).ok_or_else(|| DatasetError::NotFound {
        name: name.to_string(),
        path: path.to_path_buf(),
    })?;

    let mut hist = Histogram::new(name, name, *binning);
    let mut skipped = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records start after the header and lines are 1-based.
        let line = idx + 2;
        let record = result.map_err(|e| format_error(path, format!("line {line}: {e}")))?;

        let Some(cell) = record.get(col).filter(|c| !c.is_empty()) else {
            skipped += 1;
            continue;
        };
        let value: f64 = cell
            .parse()
            .map_err(|_| format_error(path, format!("line {line}: '{cell}' is not a number")))?;
        if !value.is_finite() {
            return Err(format_error(path, format!("line {line}: non-finite value")));
        }
        hist.fill(value);
    }

    if skipped > 0 {
        log::debug!("column '{name}': skipped {skipped} empty cell(s)");
    }
    if hist.underflow + hist.overflow > 0.0 {
        log::warn!(
            "column '{name}': {} value(s) outside [{}, {}]",
            hist.underflow + hist.overflow,
            binning.x_min,
            binning.x_max
        );
    }

    Ok(hist)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on the
    // first header. If we don't strip it, the first column can't be found.
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}
