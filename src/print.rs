//! Print Sheet
//!
//! Printable summary of a design: what was picked in each slot, in which
//! color, and how many layers the preview stacks.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::catalog::{CatalogSource, PlumbingSide};
use crate::compositor::OrderedLayer;
use crate::design::{Design, SlotKey};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintLine {
    pub slot: SlotKey,
    pub category: String,
    pub subcategory: Option<String>,
    pub product: String,
    pub color: Option<String>,
    pub color_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintSheet {
    pub shower_type: String,
    pub plumbing_side: PlumbingSide,
    pub lines: Vec<PrintLine>,
    /// Product layers in the preview, base excluded
    pub layer_count: usize,
}

impl PrintSheet {
    /// Selections whose product is gone from the catalog are left off the sheet.
    pub fn build(design: &Design, catalog: &impl CatalogSource, layers: &[OrderedLayer]) -> Self {
        let shower_type = catalog
            .shower_type(design.shower_type_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("Shower type {}", design.shower_type_id));

        let lines = design
            .selections()
            .filter_map(|(slot, selection)| {
                let product = catalog.product(selection.product_id)?;
                let variant = selection.variant_id.and_then(|id| product.variant(id));
                Some(PrintLine {
                    slot: *slot,
                    category: catalog
                        .category(product.category_id)
                        .map(|c| c.name.clone())
                        .unwrap_or_default(),
                    subcategory: product
                        .subcategory_id
                        .and_then(|id| catalog.subcategory(id))
                        .map(|s| s.name.clone()),
                    product: product.name.clone(),
                    color: variant.map(|v| v.name.clone()),
                    color_code: variant.and_then(|v| v.color_code.clone()),
                })
            })
            .collect();

        Self {
            shower_type,
            plumbing_side: design.plumbing_side(),
            lines,
            layer_count: layers.len().saturating_sub(1),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} ({} plumbing)", self.shower_type, self.plumbing_side);
        for line in &self.lines {
            let group = match &line.subcategory {
                Some(sub) => format!("{} / {}", line.category, sub),
                None => line.category.clone(),
            };
            let color = match (&line.color, &line.color_code) {
                (Some(name), Some(code)) => format!("{name} [{code}]"),
                (Some(name), None) => name.clone(),
                _ => "-".to_string(),
            };
            let _ = writeln!(out, "  {group}: {} - {color}", line.product);
        }
        let _ = writeln!(out, "{} layers", self.layer_count);
        out
    }
}
