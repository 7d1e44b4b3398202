//! CSV and JSON writers for accumulated histories and matrices.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::Writer;
use nalgebra::DMatrix;
use serde::Serialize;
use tracing::debug;

use crate::cdf::CdfCurve;
use crate::error::{ensure_len, Result};
use crate::margin::{MarginNode, Performance};
use crate::matrices::TrialMatrix;
use crate::network::{MarginNetwork, NetworkModel};

pub fn create_timestamped_output_dir(root: &Path) -> Result<PathBuf> {
    fs::create_dir_all(root)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let mut output_dir = root.join(&timestamp);
    let mut counter = 1_u32;

    while output_dir.exists() {
        output_dir = root.join(format!("{timestamp}-{counter:02}"));
        counter += 1;
    }

    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn fmt_f64(value: f64) -> String {
    format!("{value:.10}")
}

/// Long format: one row per node and trial.
pub fn write_excess_csv(path: &Path, nodes: &[MarginNode]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(["node", "trial", "decided_value", "target", "excess"])?;

    for node in nodes {
        let decided = node.decided_value().values();
        let target = node.target().values();
        for (trial, excess) in node.excess().values().iter().enumerate() {
            writer.write_record([
                node.label().to_string(),
                trial.to_string(),
                fmt_f64(decided[trial]),
                fmt_f64(target[trial]),
                fmt_f64(*excess),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

pub fn write_performance_csv(path: &Path, performances: &[Performance]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(["performance", "trial", "value"])?;

    for perf in performances {
        for (trial, value) in perf.values().values().iter().enumerate() {
            writer.write_record([perf.label().to_string(), trial.to_string(), fmt_f64(*value)])?;
        }
    }

    writer.flush()?;
    Ok(())
}

pub fn write_cdf_csv(path: &Path, curve: &CdfCurve) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(["bin_centre", "cdf"])?;
    for (centre, p) in curve.centres.iter().zip(&curve.cdf) {
        writer.write_record([fmt_f64(*centre), fmt_f64(*p)])?;
    }
    writer.flush()?;
    Ok(())
}

/// Every trial of every cell, long format.
pub fn write_trial_matrix_csv(
    path: &Path,
    matrix: &TrialMatrix,
    row_labels: &[String],
    col_labels: &[String],
) -> Result<()> {
    let (rows, cols) = matrix.shape();
    ensure_len("matrix row labels", rows, row_labels.len())?;
    ensure_len("matrix column labels", cols, col_labels.len())?;

    let mut writer = Writer::from_path(path)?;
    writer.write_record(["row", "column", "trial", "value"])?;
    for (i, row_label) in row_labels.iter().enumerate() {
        for (j, col_label) in col_labels.iter().enumerate() {
            for (trial, value) in matrix.cell(i, j).iter().enumerate() {
                writer.write_record([
                    row_label.clone(),
                    col_label.clone(),
                    trial.to_string(),
                    fmt_f64(*value),
                ])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// Wide format with a header of column labels.
pub fn write_mean_matrix_csv(
    path: &Path,
    matrix: &DMatrix<f64>,
    row_labels: &[String],
    col_labels: &[String],
) -> Result<()> {
    ensure_len("matrix row labels", matrix.nrows(), row_labels.len())?;
    ensure_len("matrix column labels", matrix.ncols(), col_labels.len())?;

    let mut writer = Writer::from_path(path)?;
    let mut header = vec![String::new()];
    header.extend(col_labels.iter().cloned());
    writer.write_record(&header)?;

    for (i, label) in row_labels.iter().enumerate() {
        let mut record = vec![label.clone()];
        record.extend(matrix.row(i).iter().map(|v| fmt_f64(*v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary_json<T: Serialize>(path: &Path, summary: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}

/// Histories, CDF curves and matrices of `network` into `dir`. Nodes with too
/// few samples for a CDF are skipped.
pub fn write_network_outputs<M: NetworkModel>(
    dir: &Path,
    network: &MarginNetwork<M>,
    cdf_bins: usize,
) -> Result<()> {
    write_excess_csv(&dir.join("excess.csv"), network.margin_nodes())?;
    write_performance_csv(&dir.join("performance.csv"), network.performances())?;

    for node in network.margin_nodes() {
        match node.cdf_curve(cdf_bins) {
            Ok(curve) => write_cdf_csv(&dir.join(format!("cdf_{}.csv", node.label())), &curve)?,
            Err(err) => debug!(node = node.label(), %err, "cdf not written"),
        }
    }

    let nodes: Vec<String> = network
        .margin_nodes()
        .iter()
        .map(|n| n.label().to_string())
        .collect();
    let performances: Vec<String> = network
        .performances()
        .iter()
        .map(|p| p.label().to_string())
        .collect();
    let specs: Vec<String> = network.input_specs().iter().map(|s| s.key.clone()).collect();

    let impact = network.impact_matrix();
    if impact.n_trials() > 0 {
        write_trial_matrix_csv(
            &dir.join("impact_trials.csv"),
            impact.values(),
            &nodes,
            &performances,
        )?;
        write_mean_matrix_csv(&dir.join("impact_mean.csv"), &impact.mean(), &nodes, &performances)?;
    }

    let absorption = network.absorption_matrix();
    if absorption.n_trials() > 0 {
        write_trial_matrix_csv(
            &dir.join("absorption_trials.csv"),
            absorption.values(),
            &nodes,
            &specs,
        )?;
        write_mean_matrix_csv(
            &dir.join("absorption_mean.csv"),
            &absorption.mean(),
            &nodes,
            &specs,
        )?;
        write_trial_matrix_csv(
            &dir.join("deterioration_trials.csv"),
            absorption.deteriorations(),
            &nodes,
            &specs,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excess_csv_has_one_row_per_trial() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = MarginNode::new("E1");
        node.evaluate_batch(&[2.0, 3.0], &[1.0, 1.0]).unwrap();

        let path = dir.path().join("excess.csv");
        write_excess_csv(&path, &[node]).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "node,trial,decided_value,target,excess");
        assert!(lines[2].starts_with("E1,1,3.0000000000"));
    }

    #[test]
    fn mean_matrix_checks_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mean.csv");
        let matrix = DMatrix::from_row_slice(1, 2, &[0.5, f64::NAN]);
        let rows = vec!["E1".to_string()];
        let cols = vec!["P1".to_string(), "P2".to_string()];

        assert!(write_mean_matrix_csv(&path, &matrix, &rows, &cols[..1]).is_err());
        write_mean_matrix_csv(&path, &matrix, &rows, &cols).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with(",P1,P2\nE1,0.5000000000,NaN"));
    }

    #[test]
    fn timestamped_dirs_do_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let first = create_timestamped_output_dir(root.path()).unwrap();
        let second = create_timestamped_output_dir(root.path()).unwrap();
        assert_ne!(first, second);
        assert!(second.is_dir());
    }
}
