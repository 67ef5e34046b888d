//! Variant Resolution
//!
//! Picks the one variant of a product to display for a plumbing side.
//! Pure and deterministic: same inputs (including order) give the same variant.

use tracing::debug;

use crate::catalog::{PlumbingSide, Symmetry, Variant};

/// Select the variant to display.
///
/// Symmetric showers ignore orientation and take the first variant. Asymmetric
/// showers prefer an exact orientation match, then a `Both` variant, then the
/// first variant (which the transformer may mirror).
pub fn resolve(variants: &[Variant], side: PlumbingSide, symmetry: Symmetry) -> Option<&Variant> {
    let first = variants.first()?;

    let chosen = match symmetry {
        Symmetry::Symmetric => first,
        Symmetry::Asymmetric => variants
            .iter()
            .find(|v| v.orientation == side)
            .or_else(|| variants.iter().find(|v| v.orientation == PlumbingSide::Both))
            .unwrap_or(first),
    };

    debug!(
        "Resolved variant {} ({}) for side {} on {:?} shower",
        chosen.id, chosen.orientation, side, symmetry
    );
    Some(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(id: u32, orientation: PlumbingSide) -> Variant {
        Variant {
            id,
            name: format!("Color {id}"),
            color_code: None,
            image: Some(format!("https://img.test/{id}.png").into()),
            orientation,
        }
    }

    #[test]
    fn test_empty_resolves_to_none() {
        assert!(resolve(&[], PlumbingSide::Left, Symmetry::Asymmetric).is_none());
        assert!(resolve(&[], PlumbingSide::Right, Symmetry::Symmetric).is_none());
    }

    #[test]
    fn test_symmetric_takes_first_for_any_side() {
        let variants = vec![
            variant(1, PlumbingSide::Right),
            variant(2, PlumbingSide::Left),
            variant(3, PlumbingSide::Both),
        ];
        for side in [PlumbingSide::Left, PlumbingSide::Right, PlumbingSide::Both] {
            assert_eq!(resolve(&variants, side, Symmetry::Symmetric).unwrap().id, 1);
        }
    }

    #[test]
    fn test_asymmetric_exact_match_beats_earlier_both() {
        let variants = vec![
            variant(1, PlumbingSide::Both),
            variant(2, PlumbingSide::Left),
            variant(3, PlumbingSide::Right),
        ];
        let v = resolve(&variants, PlumbingSide::Right, Symmetry::Asymmetric).unwrap();
        assert_eq!(v.id, 3);
    }

    #[test]
    fn test_asymmetric_falls_back_to_both_then_first() {
        let variants = vec![variant(1, PlumbingSide::Left), variant(2, PlumbingSide::Both)];
        let v = resolve(&variants, PlumbingSide::Right, Symmetry::Asymmetric).unwrap();
        assert_eq!(v.id, 2);

        let only_left = vec![variant(4, PlumbingSide::Left), variant(5, PlumbingSide::Left)];
        let v = resolve(&only_left, PlumbingSide::Right, Symmetry::Asymmetric).unwrap();
        assert_eq!(v.id, 4);
    }
}
