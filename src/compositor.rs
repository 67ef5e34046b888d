//! Layer Compositor - Single Entry Point for Previews
//!
//! Turns a design's selections into image layers stacked bottom-to-top over
//! the shower base image. A layer that cannot be built is dropped, never the
//! whole preview.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::catalog::{
    CatalogSource, CategoryId, ImageRef, PlumbingSide, Product, ProductId, SubcategoryId,
    VariantId,
};
use crate::config::Config;
use crate::design::{Design, SelectedProduct, SlotKey};
use crate::transform::{AdjustedImage, ImageTransformer, ResizeOptions, TransformDiagnostic};

/// Sort key of the base image; every product layer sits above it.
pub const BASE_Z_INDEX: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerKind {
    Base,
    #[serde(rename_all = "camelCase")]
    Product {
        slot: SlotKey,
        product_id: ProductId,
        variant_id: VariantId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedLayer {
    #[serde(flatten)]
    pub kind: LayerKind,
    pub image: ImageRef,
    pub mirrored: bool,
    #[serde(default)]
    pub diagnostic: Option<TransformDiagnostic>,
    /// Rounded effective stack order (the nominal z-index)
    pub stack_order: i32,
    /// Stack order plus the catalog tie-break, unrounded
    pub z_index: f64,
}

/// `round(stack order) + category * 0.01 + subcategory * 0.001 + (product % 100) * 0.0001`.
///
/// Kept fractional: rounding the sum would erase the tie-break. The tie-break is
/// not bounded below 1: once category ids reach 100 it adds a whole unit, so a
/// category id more than 100 above another's outweighs a one-step stack-order
/// difference.
pub fn z_index(
    stack_order: f64,
    category_id: CategoryId,
    subcategory_id: Option<SubcategoryId>,
    product_id: ProductId,
) -> f64 {
    let tie_break = f64::from(category_id) * 0.01
        + f64::from(subcategory_id.unwrap_or(0)) * 0.001
        + f64::from(product_id % 100) * 0.0001;
    stack_order.round() + tie_break
}

/// Memoized adjustments for one render pass.
///
/// Keyed by image, orientation, target side and resize options. Asking for a
/// different target side than the cached one empties the cache first.
#[derive(Debug, Default)]
pub struct RenderCache {
    side: Option<PlumbingSide>,
    entries: HashMap<String, AdjustedImage>,
    hits: u64,
    misses: u64,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.side = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn adjust(
        &mut self,
        transformer: &ImageTransformer,
        image: &ImageRef,
        orientation: PlumbingSide,
        target: PlumbingSide,
        opts: &ResizeOptions,
    ) -> AdjustedImage {
        if self.side != Some(target) {
            if let Some(previous) = self.side {
                debug!("Target side {} -> {}, dropping {} cached images", previous, target, self.len());
            }
            self.clear();
            self.side = Some(target);
        }

        let key = format!("{}|{}|{}|{}", image, orientation, target, opts.cache_key());
        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            return hit.clone();
        }

        self.misses += 1;
        let adjusted = transformer.adjust(image, orientation, target, opts);
        self.entries.insert(key, adjusted.clone());
        adjusted
    }
}

pub struct LayerCompositor {
    transformer: ImageTransformer,
    preview: ResizeOptions,
}

impl LayerCompositor {
    pub fn new(transformer: ImageTransformer) -> Self {
        Self {
            transformer,
            preview: ResizeOptions::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ImageTransformer::new(config.cdn.clone())).with_preview(config.preview.clone())
    }

    /// Resize options applied to every layer, base included.
    pub fn with_preview(mut self, preview: ResizeOptions) -> Self {
        self.preview = preview;
        self
    }

    pub fn transformer(&self) -> &ImageTransformer {
        &self.transformer
    }

    /// Layers for `selections` over `base_image`, base first, then ascending z-index.
    pub fn composite<'a>(
        &self,
        catalog: &impl CatalogSource,
        base_image: &ImageRef,
        selections: impl IntoIterator<Item = &'a SelectedProduct>,
        target: PlumbingSide,
    ) -> Vec<OrderedLayer> {
        let mut cache = RenderCache::new();
        self.composite_with_cache(catalog, base_image, selections, target, &mut cache)
    }

    pub fn composite_with_cache<'a>(
        &self,
        catalog: &impl CatalogSource,
        base_image: &ImageRef,
        selections: impl IntoIterator<Item = &'a SelectedProduct>,
        target: PlumbingSide,
        cache: &mut RenderCache,
    ) -> Vec<OrderedLayer> {
        let mut layers: Vec<OrderedLayer> = selections
            .into_iter()
            .filter_map(|selection| self.layer(catalog, selection, target, cache))
            .collect();

        layers.sort_by(|a, b| a.z_index.total_cmp(&b.z_index).then_with(|| a.kind.cmp(&b.kind)));

        // The base never mirrors; it only picks up the preview sizing.
        let base = cache.adjust(
            &self.transformer,
            base_image,
            PlumbingSide::Both,
            target,
            &self.preview,
        );
        let mut stack = Vec::with_capacity(layers.len() + 1);
        stack.push(OrderedLayer {
            kind: LayerKind::Base,
            image: base.image,
            mirrored: false,
            diagnostic: base.diagnostic,
            stack_order: 0,
            z_index: BASE_Z_INDEX,
        });
        stack.extend(layers);
        stack
    }

    pub fn composite_design(
        &self,
        catalog: &impl CatalogSource,
        design: &Design,
        cache: &mut RenderCache,
    ) -> Vec<OrderedLayer> {
        self.composite_with_cache(
            catalog,
            &design.base_image,
            design.selections().map(|(_, selection)| selection),
            design.plumbing_side(),
            cache,
        )
    }

    fn layer(
        &self,
        catalog: &impl CatalogSource,
        selection: &SelectedProduct,
        target: PlumbingSide,
        cache: &mut RenderCache,
    ) -> Option<OrderedLayer> {
        let variant_id = selection.variant_id?;

        let Some(product) = catalog.product(selection.product_id) else {
            warn!("Dropping layer: product {} not in catalog", selection.product_id);
            return None;
        };
        if !hierarchy_resolves(catalog, product) {
            warn!("Dropping layer: product {} has no consistent category", product.id);
            return None;
        }
        let Some(variant) = product.variant(variant_id) else {
            warn!("Dropping layer: variant {} not on product {}", variant_id, product.id);
            return None;
        };

        let Some(image) = variant
            .image
            .as_ref()
            .or(product.image.as_ref())
            .or(product.thumbnail.as_ref())
        else {
            debug!("Product {} variant {} has no image, skipping", product.id, variant.id);
            return None;
        };

        let adjusted = cache.adjust(&self.transformer, image, variant.orientation, target, &self.preview);
        let stack_order = catalog.effective_stack_order(product).round();

        Some(OrderedLayer {
            kind: LayerKind::Product {
                slot: SlotKey::for_product(product),
                product_id: product.id,
                variant_id: variant.id,
            },
            image: adjusted.image,
            mirrored: adjusted.mirrored,
            diagnostic: adjusted.diagnostic,
            stack_order: stack_order as i32,
            z_index: z_index(stack_order, product.category_id, product.subcategory_id, product.id),
        })
    }
}

fn hierarchy_resolves(catalog: &impl CatalogSource, product: &Product) -> bool {
    if catalog.category(product.category_id).is_none() {
        return false;
    }
    match product.subcategory_id {
        Some(id) => catalog
            .subcategory(id)
            .map_or(false, |s| s.category_id == product.category_id),
        None => true,
    }
}

impl Default for LayerCompositor {
    fn default() -> Self {
        Self::new(ImageTransformer::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Category, Subcategory, Variant};

    const CDN: &str = "https://res.cloudinary.com/demo/image/upload";

    fn product(id: ProductId, category_id: CategoryId, stack_order: Option<f64>) -> Product {
        Product {
            id,
            name: format!("Product {id}"),
            category_id,
            subcategory_id: None,
            stack_order,
            image: None,
            thumbnail: None,
            variants: vec![Variant {
                id: id * 10,
                name: "Chrome".into(),
                color_code: None,
                image: Some(format!("{CDN}/v1/p{id}.png").into()),
                orientation: PlumbingSide::Left,
            }],
        }
    }

    fn pick(product_id: ProductId) -> SelectedProduct {
        SelectedProduct::new(product_id, Some(product_id * 10))
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        for id in [1, 2] {
            catalog.insert_category(Category {
                id,
                name: format!("Category {id}"),
                shower_type_id: None,
                stack_order: Some(40.0),
            });
        }
        catalog
    }

    #[test]
    fn test_z_index_formula() {
        let z = z_index(49.6, 3, Some(7), 1234);
        assert!((z - (50.0 + 0.03 + 0.007 + 0.0034)).abs() < 1e-9);
        assert_eq!(z_index(10.0, 0, None, 0), 10.0);
    }

    #[test]
    fn test_large_category_id_outweighs_one_stack_step() {
        assert!(z_index(50.0, 150, None, 0) > z_index(51.0, 1, None, 0));
        assert!(z_index(50.0, 99, None, 0) < z_index(51.0, 1, None, 0));
    }

    #[test]
    fn test_layers_sorted_over_base() {
        let mut catalog = catalog();
        catalog.insert_product(product(10, 1, Some(80.0)));
        catalog.insert_product(product(11, 1, Some(20.0)));
        catalog.insert_product(product(12, 2, None));

        let base: ImageRef = format!("{CDN}/v1/base.png").into();
        let layers = LayerCompositor::default().composite(
            &catalog,
            &base,
            &[pick(10), pick(11), pick(12)],
            PlumbingSide::Left,
        );

        assert_eq!(layers[0].kind, LayerKind::Base);
        assert_eq!(layers[0].image, base);
        let order: Vec<_> = layers[1..]
            .iter()
            .map(|l| match l.kind {
                LayerKind::Product { product_id, .. } => product_id,
                LayerKind::Base => 0,
            })
            .collect();
        assert_eq!(order, vec![11, 12, 10]);
        assert_eq!(layers[2].stack_order, 40);
    }

    #[test]
    fn test_equal_stack_order_tie_breaks_by_hierarchy() {
        let mut catalog = catalog();
        catalog.insert_product(product(10, 2, Some(50.0)));
        catalog.insert_product(product(11, 1, Some(50.0)));

        let compositor = LayerCompositor::default();
        let base: ImageRef = "base.png".into();
        let a = compositor.composite(&catalog, &base, &[pick(10), pick(11)], PlumbingSide::Left);
        let b = compositor.composite(&catalog, &base, &[pick(11), pick(10)], PlumbingSide::Left);
        assert_eq!(a, b);
        assert!(matches!(a[1].kind, LayerKind::Product { product_id: 11, .. }));
        assert!(a[1].z_index < a[2].z_index);
    }

    #[test]
    fn test_missing_metadata_and_images_drop_silently() {
        let mut catalog = catalog();
        catalog.insert_product(product(10, 1, None));
        // Category 9 does not exist
        catalog.insert_product(product(11, 9, None));
        let mut bare = product(12, 1, None);
        bare.variants[0].image = None;
        catalog.insert_product(bare);
        let mut mismatched = product(13, 1, None);
        mismatched.subcategory_id = Some(5);
        catalog.insert_product(mismatched);
        catalog.insert_subcategory(Subcategory {
            id: 5,
            category_id: 2,
            name: "Elsewhere".into(),
            stack_order: None,
        });

        let selections = [
            pick(10),
            pick(11),
            pick(12),
            pick(13),
            pick(404),
            SelectedProduct::new(10, None),
        ];
        let layers =
            LayerCompositor::default().composite(&catalog, &"base.png".into(), &selections, PlumbingSide::Left);
        assert_eq!(layers.len(), 2);
        assert!(matches!(layers[1].kind, LayerKind::Product { product_id: 10, .. }));
    }

    #[test]
    fn test_image_falls_back_to_product_then_thumbnail() {
        let mut catalog = catalog();
        let mut p = product(10, 1, None);
        p.variants[0].image = None;
        p.thumbnail = Some(format!("{CDN}/v1/thumb.png").into());
        catalog.insert_product(p.clone());

        let compositor = LayerCompositor::default();
        let layers = compositor.composite(&catalog, &"base.png".into(), &[pick(10)], PlumbingSide::Left);
        assert_eq!(layers[1].image.as_str(), format!("{CDN}/v1/thumb.png"));

        p.image = Some(format!("{CDN}/v1/full.png").into());
        catalog.insert_product(p);
        let layers = compositor.composite(&catalog, &"base.png".into(), &[pick(10)], PlumbingSide::Left);
        assert_eq!(layers[1].image.as_str(), format!("{CDN}/v1/full.png"));
    }

    #[test]
    fn test_cache_hits_and_side_change_clears() {
        let transformer = ImageTransformer::default();
        let image: ImageRef = format!("{CDN}/v1/door.png").into();
        let opts = ResizeOptions::default();
        let mut cache = RenderCache::new();

        let first = cache.adjust(&transformer, &image, PlumbingSide::Left, PlumbingSide::Right, &opts);
        let second = cache.adjust(&transformer, &image, PlumbingSide::Left, PlumbingSide::Right, &opts);
        assert_eq!(first, second);
        assert_eq!((cache.hits(), cache.misses(), cache.len()), (1, 1, 1));

        let left = cache.adjust(&transformer, &image, PlumbingSide::Left, PlumbingSide::Left, &opts);
        assert!(!left.mirrored);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.misses(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_preview_options_reach_every_layer() {
        let mut catalog = catalog();
        catalog.insert_product(product(10, 1, None));
        let compositor = LayerCompositor::default().with_preview(ResizeOptions {
            width: Some(600),
            ..Default::default()
        });
        let base: ImageRef = format!("{CDN}/v1/base.png").into();
        let layers = compositor.composite(&catalog, &base, &[pick(10)], PlumbingSide::Right);
        assert_eq!(layers[0].image.as_str(), format!("{CDN}/w_600/v1/base.png"));
        assert_eq!(layers[1].image.as_str(), format!("{CDN}/a_hflip,w_600/v1/p10.png"));
        assert!(layers[1].mirrored);
    }
}
