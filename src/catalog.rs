//! Catalog Model - Read-Only Leaf Data
//!
//! Project types → shower types → categories → subcategories → products → variants.
//! Raw records are normalized once at ingest; core logic only sees closed enums.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

pub type ProjectTypeId = u32;
pub type ShowerTypeId = u32;
pub type CategoryId = u32;
pub type SubcategoryId = u32;
pub type ProductId = u32;
pub type VariantId = u32;

/// Fallback stack order when neither product, subcategory nor category sets one.
pub const DEFAULT_STACK_ORDER: f64 = 50.0;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Variant {variant_id}: {source}")]
    InvalidOrientation {
        variant_id: VariantId,
        #[source]
        source: ParseSideError,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized plumbing side {0:?}")]
pub struct ParseSideError(pub String);

/// Side of the shower the valve/plumbing sits on.
///
/// `Both` is only meaningful as a variant orientation: the image is symmetric
/// and is never mirrored. Users pick `Left` or `Right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlumbingSide {
    Left,
    Right,
    Both,
}

impl PlumbingSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlumbingSide::Left => "left",
            PlumbingSide::Right => "right",
            PlumbingSide::Both => "both",
        }
    }

    /// Legacy records carry no orientation; they were authored for the left side.
    pub fn from_legacy(raw: Option<&str>) -> Result<Self, ParseSideError> {
        match raw {
            None => Ok(PlumbingSide::Left),
            Some(s) if s.trim().is_empty() => Ok(PlumbingSide::Left),
            Some(s) => s.parse(),
        }
    }
}

impl FromStr for PlumbingSide {
    type Err = ParseSideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(PlumbingSide::Left),
            "right" => Ok(PlumbingSide::Right),
            "both" => Ok(PlumbingSide::Both),
            _ => Err(ParseSideError(s.to_string())),
        }
    }
}

impl fmt::Display for PlumbingSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a shower's geometry has handedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symmetry {
    Symmetric,
    Asymmetric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShowerGeometry {
    Alcove,
    TubToShower,
    Curved,
    NeoAngle,
    Corner,
}

impl ShowerGeometry {
    pub fn symmetry(&self) -> Symmetry {
        match self {
            ShowerGeometry::Alcove | ShowerGeometry::TubToShower => Symmetry::Symmetric,
            ShowerGeometry::Curved | ShowerGeometry::NeoAngle | ShowerGeometry::Corner => {
                Symmetry::Asymmetric
            }
        }
    }
}

/// Opaque reference to a hosted image (effectively a URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for ImageRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectType {
    pub id: ProjectTypeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowerType {
    pub id: ShowerTypeId,
    pub project_type_id: ProjectTypeId,
    pub name: String,
    pub geometry: ShowerGeometry,
    #[serde(default)]
    pub base_image: Option<ImageRef>,
}

impl ShowerType {
    pub fn symmetry(&self) -> Symmetry {
        self.geometry.symmetry()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub shower_type_id: Option<ShowerTypeId>,
    #[serde(default)]
    pub stack_order: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subcategory {
    pub id: SubcategoryId,
    pub category_id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub stack_order: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: VariantId,
    /// Display color name
    pub name: String,
    #[serde(default)]
    pub color_code: Option<String>,
    #[serde(default)]
    pub image: Option<ImageRef>,
    pub orientation: PlumbingSide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub subcategory_id: Option<SubcategoryId>,
    #[serde(default)]
    pub stack_order: Option<f64>,
    #[serde(default)]
    pub image: Option<ImageRef>,
    #[serde(default)]
    pub thumbnail: Option<ImageRef>,
    /// Ordered by name
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl Product {
    pub fn variant(&self, id: VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }
}

/// Variant record as the catalog collaborator hands it over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVariant {
    pub id: VariantId,
    pub name: String,
    #[serde(default)]
    pub color_code: Option<String>,
    #[serde(default)]
    pub image: Option<ImageRef>,
    #[serde(default)]
    pub orientation: Option<String>,
}

impl RawVariant {
    pub fn normalize(self) -> Result<Variant, CatalogError> {
        let orientation = PlumbingSide::from_legacy(self.orientation.as_deref()).map_err(
            |source| CatalogError::InvalidOrientation {
                variant_id: self.id,
                source,
            },
        )?;
        Ok(Variant {
            id: self.id,
            name: self.name,
            color_code: self.color_code,
            image: self.image,
            orientation,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProduct {
    pub id: ProductId,
    pub name: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub subcategory_id: Option<SubcategoryId>,
    #[serde(default)]
    pub stack_order: Option<f64>,
    #[serde(default)]
    pub image: Option<ImageRef>,
    #[serde(default)]
    pub thumbnail: Option<ImageRef>,
    #[serde(default)]
    pub variants: Vec<RawVariant>,
}

impl RawProduct {
    pub fn normalize(self) -> Result<Product, CatalogError> {
        let mut variants = self
            .variants
            .into_iter()
            .map(RawVariant::normalize)
            .collect::<Result<Vec<_>, _>>()?;
        variants.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Product {
            id: self.id,
            name: self.name,
            category_id: self.category_id,
            subcategory_id: self.subcategory_id,
            stack_order: self.stack_order,
            image: self.image,
            thumbnail: self.thumbnail,
            variants,
        })
    }
}

/// One exported catalog file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub project_types: Vec<ProjectType>,
    #[serde(default)]
    pub shower_types: Vec<ShowerType>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
    #[serde(default)]
    pub products: Vec<RawProduct>,
}

/// Lookup seam for catalog metadata.
pub trait CatalogSource {
    fn product(&self, id: ProductId) -> Option<&Product>;
    fn category(&self, id: CategoryId) -> Option<&Category>;
    fn subcategory(&self, id: SubcategoryId) -> Option<&Subcategory>;
    fn shower_type(&self, id: ShowerTypeId) -> Option<&ShowerType>;

    /// Product value, else subcategory, else category, else [`DEFAULT_STACK_ORDER`].
    fn effective_stack_order(&self, product: &Product) -> f64 {
        product
            .stack_order
            .or_else(|| {
                product
                    .subcategory_id
                    .and_then(|id| self.subcategory(id))
                    .and_then(|s| s.stack_order)
            })
            .or_else(|| self.category(product.category_id).and_then(|c| c.stack_order))
            .unwrap_or(DEFAULT_STACK_ORDER)
    }
}

/// In-memory catalog - loads and indexes snapshots
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    project_types: BTreeMap<ProjectTypeId, ProjectType>,
    shower_types: BTreeMap<ShowerTypeId, ShowerType>,
    categories: BTreeMap<CategoryId, Category>,
    subcategories: BTreeMap<SubcategoryId, Subcategory>,
    products: BTreeMap<ProductId, Product>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        catalog.merge_snapshot(snapshot)?;
        Ok(catalog)
    }

    /// All-or-nothing: a bad variant rejects the whole snapshot.
    pub fn merge_snapshot(&mut self, snapshot: CatalogSnapshot) -> Result<(), CatalogError> {
        let products = snapshot
            .products
            .into_iter()
            .map(RawProduct::normalize)
            .collect::<Result<Vec<_>, _>>()?;

        for p in snapshot.project_types {
            self.project_types.insert(p.id, p);
        }
        for s in snapshot.shower_types {
            self.shower_types.insert(s.id, s);
        }
        for c in snapshot.categories {
            self.categories.insert(c.id, c);
        }
        for s in snapshot.subcategories {
            self.subcategories.insert(s.id, s);
        }
        for p in products {
            self.products.insert(p.id, p);
        }
        Ok(())
    }

    pub fn load_file(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        let snapshot: CatalogSnapshot = serde_json::from_str(&content)?;
        Self::from_snapshot(snapshot)
    }

    /// Merge every `*.json` snapshot in `dir`; files that fail to load are skipped.
    pub fn load_from_dir(dir: &Path) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        if !dir.exists() {
            warn!("Catalog directory {} does not exist", dir.display());
            return Ok(catalog);
        }

        let mut paths = vec![];
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| e == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let loaded = fs::read_to_string(&path)
                .map_err(CatalogError::from)
                .and_then(|content| Ok(serde_json::from_str::<CatalogSnapshot>(&content)?))
                .and_then(|snapshot| catalog.merge_snapshot(snapshot));
            match loaded {
                Ok(()) => debug!("Loaded catalog snapshot {}", path.display()),
                Err(e) => warn!("Skipping catalog snapshot {}: {}", path.display(), e),
            }
        }
        Ok(catalog)
    }

    pub fn insert_product(&mut self, mut product: Product) {
        product.variants.sort_by(|a, b| a.name.cmp(&b.name));
        self.products.insert(product.id, product);
    }

    pub fn insert_category(&mut self, category: Category) {
        self.categories.insert(category.id, category);
    }

    pub fn insert_subcategory(&mut self, subcategory: Subcategory) {
        self.subcategories.insert(subcategory.id, subcategory);
    }

    pub fn insert_shower_type(&mut self, shower_type: ShowerType) {
        self.shower_types.insert(shower_type.id, shower_type);
    }

    pub fn remove_product(&mut self, id: ProductId) -> Option<Product> {
        self.products.remove(&id)
    }

    pub fn project_type(&self, id: ProjectTypeId) -> Option<&ProjectType> {
        self.project_types.get(&id)
    }

    pub fn project_types(&self) -> impl Iterator<Item = &ProjectType> {
        self.project_types.values()
    }

    pub fn shower_types(&self) -> impl Iterator<Item = &ShowerType> {
        self.shower_types.values()
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn subcategories(&self) -> impl Iterator<Item = &Subcategory> {
        self.subcategories.values()
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }
}

impl CatalogSource for Catalog {
    fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.get(&id)
    }

    fn subcategory(&self, id: SubcategoryId) -> Option<&Subcategory> {
        self.subcategories.get(&id)
    }

    fn shower_type(&self, id: ShowerTypeId) -> Option<&ShowerType> {
        self.shower_types.get(&id)
    }
}
