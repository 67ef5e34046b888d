//! Designs - What the Customer Has Picked
//!
//! A design holds at most one selection per slot. The slot is the product's
//! subcategory when it has one, otherwise its category.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{
    CatalogSource, CategoryId, ImageRef, PlumbingSide, Product, ProductId, ShowerTypeId,
    SubcategoryId, VariantId,
};
use crate::hashing::compute_fingerprint;
use crate::resolver;
use crate::DESIGN_SCHEMA_VERSION;

#[derive(Debug, Error)]
pub enum DesignError {
    #[error("Plumbing side must be left or right, got {0}")]
    InvalidPlumbingSide(PlumbingSide),

    #[error("Shower type not found: {0}")]
    UnknownShowerType(ShowerTypeId),

    #[error("Shower type {0} has no base image")]
    MissingBaseImage(ShowerTypeId),

    #[error("Product not found: {0}")]
    UnknownProduct(ProductId),

    #[error("Variant {variant_id} does not belong to product {product_id}")]
    UnknownVariant {
        product_id: ProductId,
        variant_id: VariantId,
    },

    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("Invalid design blob: {0}")]
    InvalidBlob(String),

    #[error("Design schema {found} is newer than supported {supported}")]
    UnsupportedSchema {
        found: semver::Version,
        supported: semver::Version,
    },

    #[error("Saved design not found: {0}")]
    NotFound(Uuid),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Slot a selection occupies. Serialized as `category-<id>` / `subcategory-<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SlotKey {
    Category(CategoryId),
    Subcategory(SubcategoryId),
}

impl SlotKey {
    pub fn for_product(product: &Product) -> Self {
        match product.subcategory_id {
            Some(id) => SlotKey::Subcategory(id),
            None => SlotKey::Category(product.category_id),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Category(id) => write!(f, "category-{id}"),
            SlotKey::Subcategory(id) => write!(f, "subcategory-{id}"),
        }
    }
}

impl FromStr for SlotKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_id = |id: &str| id.parse::<u32>().map_err(|e| format!("bad slot key {s:?}: {e}"));
        if let Some(id) = s.strip_prefix("subcategory-") {
            Ok(SlotKey::Subcategory(parse_id(id)?))
        } else if let Some(id) = s.strip_prefix("category-") {
            Ok(SlotKey::Category(parse_id(id)?))
        } else {
            Err(format!("bad slot key {s:?}"))
        }
    }
}

impl From<SlotKey> for String {
    fn from(key: SlotKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for SlotKey {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedProduct {
    pub product_id: ProductId,
    /// `None` when the product has no variant to show
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    /// The customer chose this variant. Unpinned variants were defaulted by
    /// the resolver and follow the plumbing side.
    #[serde(default)]
    pub pinned: bool,
}

impl SelectedProduct {
    /// An explicit variant is pinned, a missing one is left to the resolver.
    pub fn new(product_id: ProductId, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id,
            variant_id,
            pinned: variant_id.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Design {
    pub shower_type_id: ShowerTypeId,
    pub base_image: ImageRef,
    plumbing_side: PlumbingSide,
    #[serde(default)]
    selections: BTreeMap<SlotKey, SelectedProduct>,
}

fn user_side(side: PlumbingSide) -> Result<PlumbingSide, DesignError> {
    match side {
        PlumbingSide::Both => Err(DesignError::InvalidPlumbingSide(side)),
        side => Ok(side),
    }
}

impl Design {
    pub fn new(
        shower_type_id: ShowerTypeId,
        base_image: ImageRef,
        plumbing_side: PlumbingSide,
    ) -> Result<Self, DesignError> {
        Ok(Self {
            shower_type_id,
            base_image,
            plumbing_side: user_side(plumbing_side)?,
            selections: BTreeMap::new(),
        })
    }

    /// Start a design on a catalog shower type, using its base image.
    pub fn for_shower_type(
        catalog: &impl CatalogSource,
        shower_type_id: ShowerTypeId,
        plumbing_side: PlumbingSide,
    ) -> Result<Self, DesignError> {
        let shower = catalog
            .shower_type(shower_type_id)
            .ok_or(DesignError::UnknownShowerType(shower_type_id))?;
        let base_image = shower
            .base_image
            .clone()
            .ok_or(DesignError::MissingBaseImage(shower_type_id))?;
        Self::new(shower_type_id, base_image, plumbing_side)
    }

    pub fn plumbing_side(&self) -> PlumbingSide {
        self.plumbing_side
    }

    /// Returns whether the side changed; callers drop their render cache if so.
    ///
    /// Unpinned selections are resolved again for the new side. Pinned ones and
    /// selections whose product left the catalog keep their variant.
    pub fn set_plumbing_side(
        &mut self,
        catalog: &impl CatalogSource,
        side: PlumbingSide,
    ) -> Result<bool, DesignError> {
        let side = user_side(side)?;
        if side == self.plumbing_side {
            return Ok(false);
        }
        let symmetry = catalog
            .shower_type(self.shower_type_id)
            .ok_or(DesignError::UnknownShowerType(self.shower_type_id))?
            .symmetry();

        self.plumbing_side = side;
        for (key, selection) in self.selections.iter_mut().filter(|(_, s)| !s.pinned) {
            let Some(product) = catalog.product(selection.product_id) else {
                continue;
            };
            let variant_id = resolver::resolve(&product.variants, side, symmetry).map(|v| v.id);
            if variant_id != selection.variant_id {
                debug!(
                    "Slot {} default variant {:?} -> {:?} for {} plumbing",
                    key, selection.variant_id, variant_id, side
                );
                selection.variant_id = variant_id;
            }
        }
        Ok(true)
    }

    pub fn selections(&self) -> impl Iterator<Item = (&SlotKey, &SelectedProduct)> {
        self.selections.iter()
    }

    pub fn selection(&self, key: SlotKey) -> Option<&SelectedProduct> {
        self.selections.get(&key)
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Put `product_id` in its slot, replacing whatever was there.
    ///
    /// Without an explicit variant the default for the current side is picked.
    pub fn select(
        &mut self,
        catalog: &impl CatalogSource,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Result<SlotKey, DesignError> {
        let product = catalog
            .product(product_id)
            .ok_or(DesignError::UnknownProduct(product_id))?;

        let pinned = variant_id.is_some();
        let variant_id = match variant_id {
            Some(id) => {
                product.variant(id).ok_or(DesignError::UnknownVariant {
                    product_id,
                    variant_id: id,
                })?;
                Some(id)
            }
            None => {
                let shower = catalog
                    .shower_type(self.shower_type_id)
                    .ok_or(DesignError::UnknownShowerType(self.shower_type_id))?;
                resolver::resolve(&product.variants, self.plumbing_side, shower.symmetry())
                    .map(|v| v.id)
            }
        };

        let key = SlotKey::for_product(product);
        let previous = self.selections.insert(
            key,
            SelectedProduct {
                product_id,
                variant_id,
                pinned,
            },
        );
        debug!(
            "Slot {} now holds product {} (replaced {:?})",
            key,
            product_id,
            previous.map(|p| p.product_id)
        );
        Ok(key)
    }

    /// Re-key selections held under the wrong slot, as a hand-written or
    /// foreign payload can do. A selection whose slot is already taken by a
    /// correctly keyed one is dropped and returned. Selections whose product
    /// is not in the catalog are kept; the compositor skips them.
    pub fn check_slots(&mut self, catalog: &impl CatalogSource) -> Vec<SelectedProduct> {
        let mut misplaced = Vec::new();
        self.selections.retain(|key, selection| {
            match catalog.product(selection.product_id) {
                Some(product) if SlotKey::for_product(product) != *key => {
                    misplaced.push((SlotKey::for_product(product), *selection));
                    false
                }
                _ => true,
            }
        });

        let mut dropped = Vec::new();
        for (key, selection) in misplaced {
            if self.selections.contains_key(&key) {
                warn!(
                    "Dropping product {}: slot {} is already taken",
                    selection.product_id, key
                );
                dropped.push(selection);
            } else {
                debug!("Moved product {} to slot {}", selection.product_id, key);
                self.selections.insert(key, selection);
            }
        }
        dropped
    }

    pub fn deselect(&mut self, key: SlotKey) -> Option<SelectedProduct> {
        self.selections.remove(&key)
    }

    pub fn clear(&mut self) {
        self.selections.clear();
    }

    pub fn fingerprint(&self) -> Result<String, DesignError> {
        Ok(compute_fingerprint(self)?)
    }

    /// Opaque URL-safe blob for the persistence collaborator.
    pub fn to_blob(&self) -> Result<String, DesignError> {
        let envelope = BlobEnvelope {
            schema_version: supported_schema(),
            design: self.clone(),
        };
        let json = serde_json::to_vec(&envelope)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn from_blob(blob: &str) -> Result<Self, DesignError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(blob.trim())
            .map_err(|e| DesignError::InvalidBlob(e.to_string()))?;
        let envelope: BlobEnvelope = serde_json::from_slice(&bytes)?;

        let supported = supported_schema();
        if envelope.schema_version.major > supported.major {
            return Err(DesignError::UnsupportedSchema {
                found: envelope.schema_version,
                supported,
            });
        }

        let design = envelope.design;
        user_side(design.plumbing_side)?;
        Ok(design)
    }
}

fn supported_schema() -> semver::Version {
    semver::Version::parse(DESIGN_SCHEMA_VERSION).unwrap_or_else(|_| semver::Version::new(1, 0, 0))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobEnvelope {
    schema_version: semver::Version,
    design: Design,
}

/// Lower-cases and sanity-checks an address: one `@`, a dotted domain.
pub fn normalize_email(email: &str) -> Result<String, DesignError> {
    let normalized = email.trim().to_lowercase();
    let valid = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !normalized.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(normalized)
    } else {
        Err(DesignError::InvalidEmail(email.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedDesign {
    pub id: Uuid,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub fingerprint: String,
    pub blob: String,
}

impl SavedDesign {
    pub fn new(design: &Design, email: Option<&str>) -> Result<Self, DesignError> {
        let email = email.map(normalize_email).transpose()?;
        Ok(Self {
            id: Uuid::new_v4(),
            email,
            created_at: Utc::now(),
            fingerprint: design.fingerprint()?,
            blob: design.to_blob()?,
        })
    }

    pub fn design(&self) -> Result<Design, DesignError> {
        Design::from_blob(&self.blob)
    }
}

/// Persistence seam for saved designs.
pub trait DesignStore {
    fn save(&mut self, design: &Design, email: Option<&str>) -> Result<SavedDesign, DesignError>;
    fn load(&self, id: Uuid) -> Result<Design, DesignError>;
    fn list_by_email(&self, email: &str) -> Result<Vec<SavedDesign>, DesignError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDesignStore {
    designs: HashMap<Uuid, SavedDesign>,
}

impl InMemoryDesignStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.designs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.designs.is_empty()
    }
}

impl DesignStore for InMemoryDesignStore {
    /// Saving an identical design for the same email returns the existing record.
    fn save(&mut self, design: &Design, email: Option<&str>) -> Result<SavedDesign, DesignError> {
        let record = SavedDesign::new(design, email)?;

        if let Some(existing) = self
            .designs
            .values()
            .find(|d| d.fingerprint == record.fingerprint && d.email == record.email)
        {
            debug!("Design {} already saved as {}", record.fingerprint, existing.id);
            return Ok(existing.clone());
        }

        info!("Saved design {} ({:?})", record.id, record.email);
        self.designs.insert(record.id, record.clone());
        Ok(record)
    }

    fn load(&self, id: Uuid) -> Result<Design, DesignError> {
        self.designs
            .get(&id)
            .ok_or(DesignError::NotFound(id))?
            .design()
    }

    fn list_by_email(&self, email: &str) -> Result<Vec<SavedDesign>, DesignError> {
        let email = normalize_email(email)?;
        let mut found: Vec<_> = self
            .designs
            .values()
            .filter(|d| d.email.as_deref() == Some(email.as_str()))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }
}
