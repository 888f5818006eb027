//! JSONL corpus loader
//!
//! One vector per line, as an object mapping dimensions to weights:
//! `{"2839": 0.41, "17": 1.2}`. Keys may appear in any order.

use std::io::BufRead;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use spindex_core::{SparseIndex, SparseVector};

/// Outcome of loading a corpus
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

/// Parse one JSONL line into a sparse vector
pub fn parse_line(line: &str) -> Result<SparseVector> {
    let json: serde_json::Value = serde_json::from_str(line).context("Invalid JSON")?;
    let Some(object) = json.as_object() else {
        bail!("Expected a JSON object of dimension -> weight");
    };

    let mut pairs = Vec::with_capacity(object.len());
    for (key, value) in object {
        let dim: u32 = key
            .trim()
            .parse()
            .with_context(|| format!("Invalid dimension key {:?}", key))?;
        let Some(weight) = value.as_f64() else {
            bail!("Weight for dimension {} is not a number", dim);
        };
        pairs.push((dim, weight as f32));
    }
    pairs.sort_unstable_by_key(|&(dim, _)| dim);

    SparseVector::try_from_pairs(pairs).map_err(|e| anyhow::anyhow!("Malformed vector: {}", e))
}

/// Parse a query given as `dim:weight,dim:weight`
pub fn parse_query(spec: &str) -> Result<SparseVector> {
    let mut pairs = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (dim, weight) = part
            .split_once(':')
            .with_context(|| format!("Expected dim:weight, got {:?}", part))?;
        let dim: u32 = dim
            .trim()
            .parse()
            .with_context(|| format!("Invalid dimension {:?}", dim))?;
        let weight: f32 = weight
            .trim()
            .parse()
            .with_context(|| format!("Invalid weight {:?}", weight))?;
        pairs.push((dim, weight));
    }
    pairs.sort_unstable_by_key(|&(dim, _)| dim);
    Ok(SparseVector::from(pairs))
}

/// Insert every vector of a JSONL stream into `index`
///
/// Malformed lines abort the load unless `skip_invalid` is set, in which
/// case they are counted and the first few are logged.
pub fn load_corpus<R: BufRead>(
    reader: R,
    index: &SparseIndex,
    skip_invalid: bool,
    progress_interval: usize,
) -> Result<LoadReport> {
    let mut report = LoadReport::default();
    let start_time = Instant::now();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        let vector = match parse_line(&line) {
            Ok(v) => v,
            Err(e) if skip_invalid => {
                if report.skipped < 10 {
                    warn!("Skipping line {}: {:#}", line_no + 1, e);
                }
                report.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.context(format!("Line {}", line_no + 1))),
        };

        index
            .insert(vector)
            .with_context(|| format!("Failed to insert line {}", line_no + 1))?;
        report.loaded += 1;

        if progress_interval > 0 && report.loaded.is_multiple_of(progress_interval) {
            let rate = report.loaded as f64 / start_time.elapsed().as_secs_f64();
            info!("Progress: {} vectors ({:.0}/s)", report.loaded, rate);
        }
    }

    if report.skipped > 0 {
        warn!("Skipped {} malformed lines", report.skipped);
    }
    info!(
        "Loaded {} vectors in {:.2}s",
        report.loaded,
        start_time.elapsed().as_secs_f64()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_sorts_dimensions() {
        let vector = parse_line(r#"{"2839": 0.5, "17": 1.25}"#).unwrap();
        let pairs: Vec<(u32, f32)> = vector.into();
        assert_eq!(pairs, vec![(17, 1.25), (2839, 0.5)]);
    }

    #[test]
    fn test_parse_line_rejects_bad_input() {
        assert!(parse_line(r#"{"x": 1.0}"#).is_err());
        assert!(parse_line(r#"{"3": "high"}"#).is_err());
        assert!(parse_line(r#"{"3": 0.0}"#).is_err());
        assert!(parse_line("[1, 2]").is_err());
    }

    #[test]
    fn test_load_corpus() {
        let input = "{\"1\": 1.0}\n\n{\"x\": 1}\n{\"1\": 0.5, \"4\": 2.0}\n";
        let index = SparseIndex::default();

        assert!(load_corpus(input.as_bytes(), &index, false, 0).is_err());

        let index = SparseIndex::default();
        let report = load_corpus(input.as_bytes(), &index, true, 0).unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(index.live_count(), 2);
    }

    #[test]
    fn test_parse_query() {
        let query = parse_query("2839:1.0, 2000:0.5").unwrap();
        let pairs: Vec<(u32, f32)> = query.into();
        assert_eq!(pairs, vec![(2000, 0.5), (2839, 1.0)]);
        assert!(parse_query("12").is_err());
    }
}
