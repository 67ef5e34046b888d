//! ShowerViz Core - Plumbing-Aware Layer Compositing
//!
//! # The Rules
//! 1. Left Is the Authoring Side
//! 2. One Selection per Slot
//! 3. Stack Order Dominates, Catalog Ids Break Ties
//! 4. A Broken Layer Never Blanks the Preview
//! 5. Normalize at Ingest, Not in the Core

pub mod catalog;
pub mod resolver;
pub mod transform;
pub mod compositor;
pub mod design;
pub mod validation;
pub mod hashing;
pub mod print;
pub mod config;

pub use catalog::{Catalog, CatalogSource, ImageRef, PlumbingSide, Product, ShowerGeometry, Symmetry, Variant};
pub use resolver::resolve;
pub use transform::{should_mirror, AdjustedImage, ImageTransformer, ResizeOptions, TransformDiagnostic};
pub use compositor::{LayerCompositor, LayerKind, OrderedLayer, RenderCache};
pub use design::{Design, DesignError, DesignStore, InMemoryDesignStore, SavedDesign, SelectedProduct, SlotKey};
pub use validation::{FailureMode, ValidationResult, ValidationRule, ValidationViolation, Validator, ViolationSeverity};
pub use hashing::{canonical_json, compute_fingerprint};
pub use print::PrintSheet;
pub use config::Config;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESIGN_SCHEMA_VERSION: &str = "1.0.0";
