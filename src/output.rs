//! Result rendering for the CLI: machine-readable JSON or a terminal table.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use crate::core::SignificanceMarker;
use crate::crosstab::{CrosstabTree, NodeId};
use crate::errors::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

pub fn render(tree: &CrosstabTree, format: OutputFormat) -> EngineResult<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(tree)
            .map_err(|e| EngineError::Upstream(anyhow::Error::new(e))),
        OutputFormat::Table => Ok(render_table(tree)),
    }
}

/// One row per cell, indented by depth. Wide multi-row headers read badly
/// in a terminal, so the tree is laid out vertically instead.
fn render_table(tree: &CrosstabTree) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Cell", "Value", "Weighted n", "Unweighted n", "Sig"]);
    append_rows(&mut table, tree, tree.root(), 0);
    table.to_string()
}

fn append_rows(table: &mut Table, tree: &CrosstabTree, id: NodeId, depth: usize) {
    let node = tree.node(id);
    let label = format!("{}{}", "  ".repeat(depth), node.label);
    let value = node
        .result
        .value
        .map_or_else(|| "no data".to_string(), |v| format!("{v:.3}"));
    let marker = match node.result.significance {
        Some(SignificanceMarker::Higher) => "up",
        Some(SignificanceMarker::Lower) => "down",
        Some(SignificanceMarker::NotSignificant) => "ns",
        Some(SignificanceMarker::InsufficientData) => "insufficient",
        None => "",
    };
    table.add_row(vec![
        Cell::new(label),
        Cell::new(value),
        Cell::new(format!("{:.1}", node.result.weighted_sample)),
        Cell::new(node.result.unweighted_sample),
        Cell::new(marker),
    ]);
    for &child in &node.children {
        append_rows(table, tree, child, depth + 1);
    }
}
