//! Reference Feature fixtures (C12): grocery list and media library.
//! Deliberately minimal, in-memory only, and not a specified part of
//! the core — they exist to exercise the Feature capability contract.

pub mod grocery;
pub mod media;

pub use grocery::GroceryFeature;
pub use media::MediaFeature;

use crate::feature::{Feature, FeatureRegistry};

/// Build the default registry used by the CLI entry point: grocery list
/// before media library, matching their registration priority order.
pub fn default_registry() -> FeatureRegistry {
    let features: Vec<Box<dyn Feature>> = vec![Box::new(GroceryFeature::new()), Box::new(MediaFeature::new())];
    FeatureRegistry::new(features)
}
