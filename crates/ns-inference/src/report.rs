//! Human-readable summaries of the engine state.

use crate::engine::{DatasetStatus, LikelihoodEngine};
use crate::load::selected_entry;
use ns_core::{LikelihoodBuffer, Result};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::fmt;

/// Statistical term of one sample; `None` when disabled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleTerm {
    /// Sample name
    pub name: String,
    /// Joint-probability term
    pub likelihood: Option<f64>,
}

/// Penalty of one parameter set; `None` when disabled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSetTerm {
    /// Set name
    pub name: String,
    /// Penalty term
    pub penalty: Option<f64>,
}

/// Likelihood summary read from the cached buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LikelihoodSummary {
    /// Cached total/stat/penalty
    pub buffer: LikelihoodBuffer,
    /// Per-sample statistical terms
    pub samples: Vec<SampleTerm>,
    /// Per-set penalties
    pub parameter_sets: Vec<ParameterSetTerm>,
}

fn fmt_term(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.6}"),
        None => "disabled".to_string(),
    }
}

impl fmt::Display for LikelihoodSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total likelihood = {:.6} (stat {:.6} + penalty {:.6})",
            self.buffer.total_likelihood, self.buffer.stat_likelihood, self.buffer.penalty_likelihood
        )?;
        writeln!(f, "Stat likelihood per sample:")?;
        for s in &self.samples {
            writeln!(f, "  {}: {}", s.name, fmt_term(s.likelihood))?;
        }
        writeln!(f, "Penalty likelihood per parameter set:")?;
        for p in &self.parameter_sets {
            writeln!(f, "  {}: {}", p.name, fmt_term(p.penalty))?;
        }
        Ok(())
    }
}

/// Fixed-width text table.
#[derive(Debug, Clone, Default)]
pub struct TablePrinter {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TablePrinter {
    /// Table with the given column titles.
    pub fn new<S: Into<String>>(header: impl IntoIterator<Item = S>) -> Self {
        Self { header: header.into_iter().map(Into::into).collect(), rows: Vec::new() }
    }

    /// Append a row; missing cells render empty.
    pub fn add_row<S: Into<String>>(&mut self, row: impl IntoIterator<Item = S>) {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    /// Number of data rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.header.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate().take(widths.len()) {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
        widths
    }
}

impl fmt::Display for TablePrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();
        let line = |f: &mut fmt::Formatter<'_>, cells: &[String]| -> fmt::Result {
            write!(f, "|")?;
            for (i, w) in widths.iter().enumerate() {
                let cell = cells.get(i).map(String::as_str).unwrap_or("");
                write!(f, " {cell:<w$} |")?;
            }
            writeln!(f)
        };
        let rule: String = widths.iter().map(|w| format!("+{}", "-".repeat(w + 2))).collect::<String>() + "+";
        writeln!(f, "{rule}")?;
        line(f, &self.header)?;
        writeln!(f, "{rule}")?;
        for row in &self.rows {
            line(f, row)?;
        }
        writeln!(f, "{rule}")
    }
}

fn relative_diff(model: f64, data: f64) -> String {
    if model == 0.0 {
        if data == 0.0 { "0.00%".to_string() } else { "-".to_string() }
    } else {
        format!("{:+.2}%", 100.0 * (data - model) / model)
    }
}

/// Upper-tail probability of a chi-square value with `dof` degrees of freedom.
pub fn chi2_p_value(chi2: f64, dof: usize) -> Result<f64> {
    let dist = ChiSquared::new(dof as f64)
        .map_err(|e| ns_core::Error::Computation(format!("chi-square with {dof} dof: {e}")))?;
    Ok(dist.sf(chi2))
}

impl LikelihoodEngine {
    /// Summary of the cached buffer; nothing is recomputed.
    pub fn summary(&self) -> LikelihoodSummary {
        let samples = self
            .model
            .samples()
            .samples()
            .iter()
            .enumerate()
            .map(|(i, s)| SampleTerm { name: s.name().to_string(), likelihood: self.sample_likelihood(i) })
            .collect();
        let parameter_sets = self
            .model
            .parameters()
            .sets()
            .iter()
            .zip(self.parameter_set_penalties())
            .map(|(set, penalty)| ParameterSetTerm { name: set.name().to_string(), penalty })
            .collect();
        LikelihoodSummary { buffer: self.buffer, samples, parameter_sets }
    }

    /// Model vs data per sample pair.
    pub fn sample_breakdown_table(&self) -> TablePrinter {
        let mut table = TablePrinter::new([
            "Sample",
            "Model (# binned)",
            "Data (# binned)",
            "Diff.",
            "Model (weighted)",
            "Data (weighted)",
            "Diff.",
        ]);
        for view in self.pair_views() {
            let n_model = view.model.nb_binned_events();
            let n_data = view.data.nb_binned_events();
            let w_model = view.model.sum_weights();
            let w_data = view.data.sum_weights();
            table.add_row([
                view.model.name().to_string(),
                n_model.to_string(),
                n_data.to_string(),
                relative_diff(n_model as f64, n_data as f64),
                format!("{w_model:.3}"),
                format!("{w_data:.3}"),
                relative_diff(w_model, w_data),
            ]);
        }
        table
    }

    /// One row per configured dataset.
    pub fn dataset_breakdown_table(&self) -> TablePrinter {
        let mut table = TablePrinter::new(["Dataset", "Enabled", "Data entry used", "Status"]);
        for (dataset, status) in self.datasets.iter().zip(&self.dataset_status) {
            let entry = match status {
                DatasetStatus::Disabled => "-".to_string(),
                _ => {
                    let entry = selected_entry(self.config.data_type, dataset);
                    if entry.is_empty() { ns_propagator::dataset::ASIMOV_ENTRY.to_string() } else { entry.to_string() }
                }
            };
            table.add_row([
                dataset.name().to_string(),
                dataset.is_enabled().to_string(),
                entry,
                status.to_string(),
            ]);
        }
        table
    }

    /// Log the summary and both tables.
    pub fn print_summary(&self) {
        log::info!("\n{}", self.summary());
        log::info!("Sample breakdown:\n{}", self.sample_breakdown_table());
        log::info!("Dataset breakdown:\n{}", self.dataset_breakdown_table());
        let dof = self.nb_fit_bins.saturating_sub(self.nb_fit_parameters);
        if dof > 0 && self.buffer.total_likelihood.is_finite() {
            match chi2_p_value(self.buffer.total_likelihood, dof) {
                Ok(p) => log::info!(
                    "chi2/dof = {:.4} ({dof} dof), p-value {p:.4}",
                    self.buffer.total_likelihood / dof as f64
                ),
                Err(e) => log::warn!("p-value unavailable: {e}"),
            }
        }
    }
}
