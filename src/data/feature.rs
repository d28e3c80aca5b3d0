use serde::{Deserialize, Serialize};

use crate::data::adduct::Adduct;

/// One chromatographic feature as handed in by the caller.
///
/// A feature is a detected 2D (retention time, m/z) signal region from one
/// LC-MS run, with its intensity, an optional charge (0 = unknown), an
/// optional adduct formula and the peptide annotations an identification
/// pipeline may have attached to it. Features are addressed by their
/// position in the containing map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub rt: f64,
    pub mz: f64,
    pub intensity: f64,
    #[serde(default)]
    pub charge: i32,
    #[serde(default)]
    pub adduct: Option<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
}

impl Feature {
    pub fn new(rt: f64, mz: f64, intensity: f64, charge: i32) -> Self {
        Feature {
            rt,
            mz,
            intensity,
            charge,
            adduct: None,
            annotations: Vec::new(),
        }
    }
}

/// The complete feature set of one LC-MS run. The map's index in the input
/// slice is its identity throughout a linking run.
pub type FeatureMap = Vec<Feature>;

/// Flattened per-feature handle used by the linking engine.
///
/// The engine copies every input feature into one arena and refers to
/// entries by arena id everywhere (grid cells, candidate lists, the distance
/// cache), so no pointers into caller storage are held. Adducts are
/// canonicalized and annotation lists are sorted and deduplicated once here,
/// at wrap time.
#[derive(Debug, Clone)]
pub struct LinkedFeature {
    pub map_idx: usize,
    pub feature_idx: usize,
    pub rt: f64,
    pub mz: f64,
    pub intensity: f64,
    pub charge: i32,
    pub adduct: Option<Adduct>,
    pub annotations: Vec<String>,
}

impl LinkedFeature {
    pub fn from_feature(map_idx: usize, feature_idx: usize, feature: &Feature) -> Self {
        let mut annotations = feature.annotations.clone();
        annotations.sort();
        annotations.dedup();

        LinkedFeature {
            map_idx,
            feature_idx,
            rt: feature.rt,
            mz: feature.mz,
            intensity: feature.intensity,
            charge: feature.charge,
            adduct: feature.adduct.as_deref().map(Adduct::parse),
            annotations,
        }
    }

    /// Two annotation sets are compatible when either is empty (an
    /// unannotated feature can always substitute) or they are equal.
    pub fn annotations_compatible(&self, other: &LinkedFeature) -> bool {
        self.annotations.is_empty()
            || other.annotations.is_empty()
            || self.annotations == other.annotations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_sorts_and_dedups_annotations() {
        let mut feature = Feature::new(100.0, 500.0, 1000.0, 2);
        feature.annotations = vec![
            "PEPTIDEB".to_string(),
            "PEPTIDEA".to_string(),
            "PEPTIDEB".to_string(),
        ];

        let wrapped = LinkedFeature::from_feature(0, 3, &feature);
        assert_eq!(wrapped.annotations, vec!["PEPTIDEA", "PEPTIDEB"]);
        assert_eq!(wrapped.map_idx, 0);
        assert_eq!(wrapped.feature_idx, 3);
    }

    #[test]
    fn test_wrap_canonicalizes_adduct() {
        let mut a = Feature::new(100.0, 500.0, 1000.0, 1);
        a.adduct = Some("H2O".to_string());
        let mut b = Feature::new(100.0, 500.0, 1000.0, 1);
        b.adduct = Some("OH2".to_string());

        let a = LinkedFeature::from_feature(0, 0, &a);
        let b = LinkedFeature::from_feature(1, 0, &b);
        assert_eq!(a.adduct, b.adduct);
    }

    #[test]
    fn test_annotation_compatibility() {
        let mut annotated = Feature::new(0.0, 0.0, 0.0, 0);
        annotated.annotations = vec!["PEPTIDEA".to_string()];
        let annotated = LinkedFeature::from_feature(0, 0, &annotated);

        let mut other = Feature::new(0.0, 0.0, 0.0, 0);
        other.annotations = vec!["PEPTIDEB".to_string()];
        let other = LinkedFeature::from_feature(1, 0, &other);

        let plain = LinkedFeature::from_feature(2, 0, &Feature::new(0.0, 0.0, 0.0, 0));

        assert!(annotated.annotations_compatible(&annotated.clone()));
        assert!(annotated.annotations_compatible(&plain));
        assert!(plain.annotations_compatible(&other));
        assert!(!annotated.annotations_compatible(&other));
    }
}
