use anyhow::Result;

use crate::cli::OutputFormat;
use crate::DriftReport;

use super::super::Container;

pub struct ReconcileController<'a> {
    container: &'a Container,
}

impl<'a> ReconcileController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn reconcile(&self, repair: bool, format: OutputFormat) -> Result<String> {
        let report = self.container.reconcile_use_case().execute(repair).await?;

        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&report)?,
            OutputFormat::Text => self.format_report(&report, repair),
        })
    }

    fn format_report(&self, report: &DriftReport, repair: bool) -> String {
        let mut out = format!(
            "Checked {} documents against {} graph nodes\n",
            report.documents_checked, report.nodes_checked
        );

        if report.is_consistent() {
            out.push_str("Graph mirror is consistent.");
            return out;
        }

        if !report.missing_in_graph.is_empty() {
            out.push_str(&format!(
                "\nMissing from graph ({}):\n",
                report.missing_in_graph.len()
            ));
            for id in &report.missing_in_graph {
                out.push_str(&format!("  - {}\n", id));
            }
        }
        if !report.orphaned_in_graph.is_empty() {
            out.push_str(&format!(
                "\nOrphaned nodes ({}):\n",
                report.orphaned_in_graph.len()
            ));
            for id in &report.orphaned_in_graph {
                out.push_str(&format!("  - {}\n", id));
            }
        }

        if repair {
            out.push_str(&format!(
                "\nRepaired: {} nodes recreated, {} orphans removed",
                report.repaired_missing, report.removed_orphans
            ));
        } else {
            out.push_str("\nRun with --repair to fix.");
        }
        out
    }
}
