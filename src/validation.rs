//! Catalog Validation - Rule/Policy Separation
//!
//! Rules produce structured violations.
//! Policy maps violations to actions.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogSource, ImageRef};
use crate::config::CdnConfig;
use crate::transform::ImageTransformer;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    #[default]
    Block,
    Warn,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    /// Record the violation is about, e.g. `product 12`
    pub subject: String,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
    pub products_checked: usize,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn count(&self, severity: ViolationSeverity) -> usize {
        self.violations.iter().filter(|v| v.severity == severity).count()
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, catalog: &Catalog) -> Vec<ValidationViolation>;
}

// --- Concrete Rules ---

pub struct StackOrderRangeRule;

impl StackOrderRangeRule {
    fn check(&self, subject: String, value: Option<f64>) -> Option<ValidationViolation> {
        let value = value?;
        if (0.0..=100.0).contains(&value) {
            return None;
        }
        Some(ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Error,
            subject,
            message: "Stack order out of range".to_string(),
            expected: Some("0-100".to_string()),
            actual: Some(value.to_string()),
            remediation: vec!["Set a stack order between 0 and 100, or clear it to inherit".to_string()],
        })
    }
}

impl ValidationRule for StackOrderRangeRule {
    fn name(&self) -> &'static str { "stack_order_range" }

    fn validate(&self, catalog: &Catalog) -> Vec<ValidationViolation> {
        let categories = catalog
            .categories()
            .filter_map(|c| self.check(format!("category {}", c.id), c.stack_order));
        let subcategories = catalog
            .subcategories()
            .filter_map(|s| self.check(format!("subcategory {}", s.id), s.stack_order));
        let products = catalog
            .products()
            .filter_map(|p| self.check(format!("product {}", p.id), p.stack_order));
        categories.chain(subcategories).chain(products).collect()
    }
}

pub struct HierarchyRule;

impl HierarchyRule {
    fn violation(&self, subject: String, message: String) -> ValidationViolation {
        ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Error,
            subject,
            message,
            expected: None,
            actual: None,
            remediation: vec!["Reassign the record to an existing parent".to_string()],
        }
    }
}

impl ValidationRule for HierarchyRule {
    fn name(&self) -> &'static str { "hierarchy" }

    fn validate(&self, catalog: &Catalog) -> Vec<ValidationViolation> {
        let mut violations = vec![];

        for shower in catalog.shower_types() {
            if catalog.project_type(shower.project_type_id).is_none() {
                violations.push(self.violation(
                    format!("shower type {}", shower.id),
                    format!("Project type {} not found", shower.project_type_id),
                ));
            }
        }

        for category in catalog.categories() {
            if let Some(shower_id) = category.shower_type_id {
                if catalog.shower_type(shower_id).is_none() {
                    violations.push(self.violation(
                        format!("category {}", category.id),
                        format!("Shower type {} not found", shower_id),
                    ));
                }
            }
        }

        for subcategory in catalog.subcategories() {
            if catalog.category(subcategory.category_id).is_none() {
                violations.push(self.violation(
                    format!("subcategory {}", subcategory.id),
                    format!("Category {} not found", subcategory.category_id),
                ));
            }
        }

        for product in catalog.products() {
            let subject = format!("product {}", product.id);
            if catalog.category(product.category_id).is_none() {
                violations.push(self.violation(
                    subject.clone(),
                    format!("Category {} not found", product.category_id),
                ));
            }
            if let Some(sub_id) = product.subcategory_id {
                match catalog.subcategory(sub_id) {
                    None => violations.push(self.violation(
                        subject,
                        format!("Subcategory {} not found", sub_id),
                    )),
                    Some(sub) if sub.category_id != product.category_id => {
                        violations.push(self.violation(
                            subject,
                            format!(
                                "Subcategory {} belongs to category {}, not {}",
                                sub_id, sub.category_id, product.category_id
                            ),
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        violations
    }
}

pub struct ImageReferenceRule {
    transformer: ImageTransformer,
}

impl ImageReferenceRule {
    pub fn new(cdn: CdnConfig) -> Self {
        Self {
            transformer: ImageTransformer::new(cdn),
        }
    }

    fn check(&self, subject: String, image: &ImageRef) -> Option<ValidationViolation> {
        if self.transformer.is_cdn_hosted(image) {
            return None;
        }
        Some(ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Warning,
            subject,
            message: "Image cannot be mirrored or resized by the CDN".to_string(),
            expected: Some(format!(
                "https://{}/...{}...",
                self.transformer.cdn().host,
                self.transformer.cdn().upload_marker
            )),
            actual: Some(image.to_string()),
            remediation: vec!["Re-upload the image to the configured CDN".to_string()],
        })
    }
}

impl ValidationRule for ImageReferenceRule {
    fn name(&self) -> &'static str { "image_reference" }

    fn validate(&self, catalog: &Catalog) -> Vec<ValidationViolation> {
        let mut violations = vec![];

        for shower in catalog.shower_types() {
            if let Some(image) = &shower.base_image {
                violations.extend(self.check(format!("shower type {}", shower.id), image));
            }
        }

        for product in catalog.products() {
            for image in product.image.iter().chain(product.thumbnail.iter()) {
                violations.extend(self.check(format!("product {}", product.id), image));
            }
            for variant in &product.variants {
                if let Some(image) = &variant.image {
                    violations.extend(self.check(
                        format!("product {} variant {}", product.id, variant.id),
                        image,
                    ));
                }
            }
        }

        violations
    }
}

pub struct VariantPresenceRule;

impl ValidationRule for VariantPresenceRule {
    fn name(&self) -> &'static str { "variant_presence" }

    fn validate(&self, catalog: &Catalog) -> Vec<ValidationViolation> {
        catalog
            .products()
            .filter(|p| p.variants.is_empty())
            .map(|p| ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Info,
                subject: format!("product {}", p.id),
                message: "Product has no variants and will never render".to_string(),
                expected: Some("at least 1 variant".to_string()),
                actual: Some("0 variants".to_string()),
                remediation: vec!["Add a color variant".to_string()],
            })
            .collect()
    }
}

/// Validator orchestrates rules and applies policy
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
    failure_mode: FailureMode,
}

impl Validator {
    pub fn new(cdn: CdnConfig, failure_mode: FailureMode) -> Self {
        Self {
            rules: vec![
                Box::new(StackOrderRangeRule),
                Box::new(HierarchyRule),
                Box::new(ImageReferenceRule::new(cdn)),
                Box::new(VariantPresenceRule),
            ],
            failure_mode,
        }
    }

    pub fn validate(&self, catalog: &Catalog) -> ValidationResult {
        let violations: Vec<_> = self
            .rules
            .iter()
            .flat_map(|rule| rule.validate(catalog))
            .collect();

        let has_errors = violations.iter().any(|v| v.severity == ViolationSeverity::Error);
        let valid = match self.failure_mode {
            FailureMode::Block => !has_errors,
            FailureMode::Warn => {
                for v in &violations {
                    warn!("[{}] {}: {}", v.rule, v.subject, v.message);
                }
                true
            }
            FailureMode::Log => {
                for v in &violations {
                    info!("[{}] {}: {}", v.rule, v.subject, v.message);
                }
                true
            }
        };

        ValidationResult {
            valid,
            violations,
            products_checked: catalog.products().count(),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(CdnConfig::default(), FailureMode::default())
    }
}
