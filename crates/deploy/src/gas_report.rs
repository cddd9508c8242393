//! Gas usage report.
//!
//! Gas used by deployments and state-changing calls is collected per contract
//! and method, then rendered as a table when the reporter is enabled.

use std::{collections::BTreeMap, path::Path, sync::Mutex};

use anyhow::{Context, Result};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, presets::UTF8_FULL};

/// Method name used for contract creation entries.
pub const DEPLOYMENT_METHOD: &str = "(deployment)";

/// Aggregated gas figures for a single contract method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasStats {
    pub calls: u64,
    pub min: u64,
    pub max: u64,
    pub total: u64,
}

impl GasStats {
    fn new(gas_used: u64) -> Self {
        Self {
            calls: 1,
            min: gas_used,
            max: gas_used,
            total: gas_used,
        }
    }

    fn add(&mut self, gas_used: u64) {
        self.calls += 1;
        self.min = self.min.min(gas_used);
        self.max = self.max.max(gas_used);
        self.total += gas_used;
    }

    pub fn average(&self) -> u64 {
        self.total / self.calls
    }
}

/// Collects gas usage across a run.
#[derive(Debug, Default)]
pub struct GasReport {
    entries: Mutex<BTreeMap<(String, String), GasStats>>,
}

impl GasReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the gas used by one transaction.
    pub fn record(&self, contract: &str, method: &str, gas_used: u64) {
        let Ok(mut entries) = self.entries.lock() else {
            tracing::warn!("Gas report is poisoned, dropping entry");
            return;
        };
        entries
            .entry((contract.to_string(), method.to_string()))
            .and_modify(|stats| stats.add(gas_used))
            .or_insert_with(|| GasStats::new(gas_used));
    }

    /// Snapshot of the collected figures, ordered by contract then method.
    pub fn stats(&self) -> Vec<(String, String, GasStats)> {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .map(|((contract, method), stats)| (contract.clone(), method.clone(), *stats))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Render the report as a table.
    pub fn render(&self, currency: &str, no_colors: bool) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        if !no_colors {
            table.enforce_styling();
        }

        let header = ["Contract", "Method", "Min", "Max", "Avg", "# calls"]
            .into_iter()
            .map(|title| {
                let cell = Cell::new(title);
                if no_colors {
                    cell
                } else {
                    cell.add_attribute(Attribute::Bold).fg(Color::Cyan)
                }
            })
            .collect::<Vec<_>>();
        table.set_header(header);

        for (contract, method, stats) in self.stats() {
            table.add_row(vec![
                Cell::new(contract),
                Cell::new(method),
                Cell::new(stats.min).set_alignment(CellAlignment::Right),
                Cell::new(stats.max).set_alignment(CellAlignment::Right),
                Cell::new(stats.average()).set_alignment(CellAlignment::Right),
                Cell::new(stats.calls).set_alignment(CellAlignment::Right),
            ]);
        }

        format!("Gas usage (in gas units, no {} conversion)\n{}\n", currency, table)
    }

    /// Write the rendered report to `path`.
    pub fn write_to_file(&self, path: &Path, currency: &str, no_colors: bool) -> Result<()> {
        std::fs::write(path, self.render(currency, no_colors))
            .with_context(|| format!("Failed to write gas report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Gas report written");
        Ok(())
    }
}
