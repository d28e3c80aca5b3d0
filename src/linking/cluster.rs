use std::collections::{BTreeMap, HashSet};

use ordered_float::OrderedFloat;

use crate::data::feature::LinkedFeature;

/// One candidate member: distance to the cluster center plus the arena id
/// of the feature.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    id: usize,
}

/// A candidate correspondence group anchored at one feature.
///
/// The cluster keeps, for every map other than the center's, the candidates
/// found in the center's grid neighborhood, sorted ascending by distance
/// (ties keep insertion order). Quality is cached and recomputed lazily:
/// `(max_distance - mean best distance over foreign maps) / max_distance`,
/// where a map without a usable candidate counts as `max_distance`.
///
/// With `use_annotations`, the candidates considered "best" are constrained
/// to a single resolved annotation set (see `resolve_annotations`), so a
/// cluster never mixes conflicting peptide identifications.
#[derive(Debug, Clone)]
pub struct QtCluster {
    center_id: usize,
    center_map: usize,
    num_maps: usize,
    max_distance: f64,
    use_annotations: bool,
    /// map index -> candidates, closest first
    candidates: BTreeMap<usize, Vec<Candidate>>,
    quality: f64,
    dirty: bool,
    /// annotation set the cluster settled on (annotation-aware mode only)
    resolved: Option<Vec<String>>,
}

impl QtCluster {
    pub fn new(
        center_id: usize,
        center: &LinkedFeature,
        num_maps: usize,
        max_distance: f64,
        use_annotations: bool,
    ) -> Self {
        QtCluster {
            center_id,
            center_map: center.map_idx,
            num_maps,
            max_distance,
            use_annotations,
            candidates: BTreeMap::new(),
            quality: 0.0,
            dirty: true,
            resolved: None,
        }
    }

    pub fn center_id(&self) -> usize {
        self.center_id
    }

    pub fn center_map(&self) -> usize {
        self.center_map
    }

    /// Number of stored candidates across all foreign maps.
    pub fn candidate_count(&self) -> usize {
        self.candidates.values().map(|list| list.len()).sum()
    }

    /// Add a candidate member. Candidates from the center's own map are
    /// rejected (a cluster never competes with itself). Insertion keeps the
    /// per-map list sorted ascending by distance; equal distances keep their
    /// insertion order.
    pub fn add_candidate(&mut self, id: usize, distance: f64, feature: &LinkedFeature) {
        if feature.map_idx == self.center_map {
            return;
        }
        let list = self.candidates.entry(feature.map_idx).or_default();
        let pos = list.partition_point(|c| OrderedFloat(c.distance) <= OrderedFloat(distance));
        list.insert(pos, Candidate { distance, id });
        self.dirty = true;
    }

    /// Current quality in [0, 1]; recomputed only when the cluster changed.
    pub fn quality(&mut self, features: &[LinkedFeature]) -> f64 {
        if self.dirty {
            self.recompute_quality(features);
        }
        self.quality
    }

    /// The members this cluster would contribute to a consensus row:
    /// the center plus, per foreign map, the closest candidate consistent
    /// with the resolved annotation set. Returns map index -> arena id.
    pub fn elements(&mut self, features: &[LinkedFeature]) -> BTreeMap<usize, usize> {
        if self.dirty {
            self.recompute_quality(features);
        }
        let mut out = BTreeMap::new();
        out.insert(self.center_map, self.center_id);
        for (&map_idx, list) in &self.candidates {
            let chosen = if self.use_annotations {
                let resolved: &[String] = self.resolved.as_deref().unwrap_or(&[]);
                list.iter().find(|c| {
                    let anns = &features[c.id].annotations;
                    anns.is_empty() || anns.as_slice() == resolved
                })
            } else {
                list.first()
            };
            if let Some(candidate) = chosen {
                out.insert(map_idx, candidate.id);
            }
        }
        out
    }

    /// Drop every candidate whose feature was consumed by an extracted
    /// cluster. Returns `false` when the center itself was consumed (the
    /// cluster is dead). The quality cache is only invalidated when a
    /// removal can change the current selection: in annotation-aware mode
    /// any removal can shift the optimization, otherwise only the loss of a
    /// list's front element matters.
    pub fn update(&mut self, removed: &HashSet<usize>) -> bool {
        if removed.contains(&self.center_id) {
            return false;
        }
        let mut front_removed = false;
        let mut any_removed = false;
        self.candidates.retain(|_, list| {
            if list.first().map_or(false, |c| removed.contains(&c.id)) {
                front_removed = true;
            }
            let before = list.len();
            list.retain(|c| !removed.contains(&c.id));
            if list.len() != before {
                any_removed = true;
            }
            !list.is_empty()
        });
        if (self.use_annotations && any_removed) || front_removed {
            self.dirty = true;
            self.resolved = None;
        }
        true
    }

    fn recompute_quality(&mut self, features: &[LinkedFeature]) {
        let internal_sum = if !self.use_annotations {
            self.resolved = None;
            self.best_distance_sum()
        } else {
            let center_annotations = &features[self.center_id].annotations;
            if !center_annotations.is_empty() {
                // an annotated center fixes the cluster's annotation set;
                // only compatible candidates were admitted in the first place
                self.resolved = Some(center_annotations.clone());
                self.best_distance_sum()
            } else {
                let (chosen, sum) = self.resolve_annotations(features);
                self.resolved = Some(chosen);
                sum
            }
        };
        let internal = internal_sum / (self.num_maps - 1) as f64;
        self.quality = ((self.max_distance - internal) / self.max_distance).clamp(0.0, 1.0);
        self.dirty = false;
    }

    /// Sum of the best distance per foreign map, missing maps counted as
    /// `max_distance`.
    fn best_distance_sum(&self) -> f64 {
        let mut sum = 0.0;
        for map_idx in 0..self.num_maps {
            if map_idx == self.center_map {
                continue;
            }
            sum += self
                .candidates
                .get(&map_idx)
                .and_then(|list| list.first())
                .map(|c| c.distance)
                .unwrap_or(self.max_distance);
        }
        sum
    }

    /// Pick the annotation set that minimizes the summed per-map best
    /// distance. Candidates are grouped by their (sorted) annotation list;
    /// the unannotated group is merged into every other group by entry-wise
    /// minimum, since an unannotated feature can stand in for any
    /// identification. Equal sums resolve to the lexicographically smallest
    /// annotation set (the groups live in a BTreeMap, so traversal order is
    /// the documented tie-break, not an accident of hashing).
    fn resolve_annotations(&self, features: &[LinkedFeature]) -> (Vec<String>, f64) {
        let mut groups: BTreeMap<&[String], Vec<f64>> = BTreeMap::new();
        for (&map_idx, list) in &self.candidates {
            for candidate in list {
                let anns: &[String] = &features[candidate.id].annotations;
                let per_map = groups
                    .entry(anns)
                    .or_insert_with(|| vec![self.max_distance; self.num_maps]);
                if candidate.distance < per_map[map_idx] {
                    per_map[map_idx] = candidate.distance;
                }
            }
        }
        if groups.is_empty() {
            return (Vec::new(), self.max_distance * (self.num_maps - 1) as f64);
        }

        let empty: &[String] = &[];
        let unannotated = groups.get(empty).cloned();

        let mut best_key: &[String] = empty;
        let mut best_sum = f64::INFINITY;
        for (key, per_map) in &groups {
            let mut sum = 0.0;
            for map_idx in 0..self.num_maps {
                if map_idx == self.center_map {
                    continue;
                }
                let mut value = per_map[map_idx];
                if let Some(fallback) = &unannotated {
                    if fallback[map_idx] < value {
                        value = fallback[map_idx];
                    }
                }
                sum += value;
            }
            // strict less-than: on ties the first (lexicographically
            // smallest) key wins
            if sum < best_sum {
                best_sum = sum;
                best_key = *key;
            }
        }
        (best_key.to_vec(), best_sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::feature::Feature;

    fn feature_at(map_idx: usize, feature_idx: usize, annotations: &[&str]) -> LinkedFeature {
        let mut f = Feature::new(100.0, 500.0, 1000.0, 0);
        f.annotations = annotations.iter().map(|s| s.to_string()).collect();
        LinkedFeature::from_feature(map_idx, feature_idx, &f)
    }

    /// Arena with one center (map 0) and candidates on maps 1 and 2.
    fn three_map_arena() -> Vec<LinkedFeature> {
        vec![
            feature_at(0, 0, &[]),
            feature_at(1, 0, &[]),
            feature_at(2, 0, &[]),
        ]
    }

    #[test]
    fn test_quality_is_one_iff_all_maps_at_zero() {
        let features = three_map_arena();
        let mut cluster = QtCluster::new(0, &features[0], 3, 1.0, false);
        cluster.add_candidate(1, 0.0, &features[1]);
        cluster.add_candidate(2, 0.0, &features[2]);
        assert_eq!(cluster.quality(&features), 1.0);

        // one map slightly off: quality drops below 1
        let mut cluster = QtCluster::new(0, &features[0], 3, 1.0, false);
        cluster.add_candidate(1, 0.0, &features[1]);
        cluster.add_candidate(2, 0.1, &features[2]);
        assert!(cluster.quality(&features) < 1.0);
    }

    #[test]
    fn test_quality_decreases_with_distance() {
        let features = three_map_arena();
        let mut near = QtCluster::new(0, &features[0], 3, 1.0, false);
        near.add_candidate(1, 0.1, &features[1]);
        let mut far = QtCluster::new(0, &features[0], 3, 1.0, false);
        far.add_candidate(1, 0.3, &features[1]);
        assert!(near.quality(&features) > far.quality(&features));
    }

    #[test]
    fn test_singleton_quality_is_zero() {
        let features = three_map_arena();
        let mut cluster = QtCluster::new(0, &features[0], 3, 1.0, false);
        // no candidates: both foreign maps count as max_distance
        assert_eq!(cluster.quality(&features), 0.0);
    }

    #[test]
    fn test_own_map_candidates_are_rejected() {
        let features = vec![feature_at(0, 0, &[]), feature_at(0, 1, &[])];
        let mut cluster = QtCluster::new(0, &features[0], 2, 1.0, false);
        cluster.add_candidate(1, 0.0, &features[1]);
        assert_eq!(cluster.candidate_count(), 0);
    }

    #[test]
    fn test_elements_picks_closest_per_map() {
        let mut features = three_map_arena();
        features.push(feature_at(1, 1, &[]));
        let mut cluster = QtCluster::new(0, &features[0], 3, 1.0, false);
        cluster.add_candidate(3, 0.2, &features[3]);
        cluster.add_candidate(1, 0.1, &features[1]);
        cluster.add_candidate(2, 0.3, &features[2]);

        let elements = cluster.elements(&features);
        assert_eq!(elements[&0], 0);
        assert_eq!(elements[&1], 1);
        assert_eq!(elements[&2], 2);
    }

    #[test]
    fn test_update_kills_cluster_on_center_removal() {
        let features = three_map_arena();
        let mut cluster = QtCluster::new(0, &features[0], 3, 1.0, false);
        cluster.add_candidate(1, 0.1, &features[1]);

        let removed: HashSet<usize> = [0].into_iter().collect();
        assert!(!cluster.update(&removed));
    }

    #[test]
    fn test_update_prunes_and_promotes_runner_up() {
        let mut features = three_map_arena();
        features.push(feature_at(1, 1, &[]));
        let mut cluster = QtCluster::new(0, &features[0], 3, 1.0, false);
        cluster.add_candidate(1, 0.1, &features[1]);
        cluster.add_candidate(3, 0.4, &features[3]);
        let before = cluster.quality(&features);

        // losing the front candidate of map 1 must lower the quality and
        // promote the runner-up
        let removed: HashSet<usize> = [1].into_iter().collect();
        assert!(cluster.update(&removed));
        assert!(cluster.quality(&features) < before);
        assert_eq!(cluster.elements(&features)[&1], 3);
    }

    #[test]
    fn test_update_of_runner_up_keeps_quality() {
        let mut features = three_map_arena();
        features.push(feature_at(1, 1, &[]));
        let mut cluster = QtCluster::new(0, &features[0], 3, 1.0, false);
        cluster.add_candidate(1, 0.1, &features[1]);
        cluster.add_candidate(3, 0.4, &features[3]);
        let before = cluster.quality(&features);

        let removed: HashSet<usize> = [3].into_iter().collect();
        assert!(cluster.update(&removed));
        assert_eq!(cluster.quality(&features), before);
    }

    #[test]
    fn test_annotation_optimization_prefers_consistent_set() {
        // map 1: one candidate annotated X (d 0.1)
        // map 2: closer candidate annotated Y (d 0.05), farther one X (d 0.2)
        let features = vec![
            feature_at(0, 0, &[]),
            feature_at(1, 0, &["X"]),
            feature_at(2, 0, &["Y"]),
            feature_at(2, 1, &["X"]),
        ];
        let mut cluster = QtCluster::new(0, &features[0], 3, 1.0, true);
        cluster.add_candidate(1, 0.1, &features[1]);
        cluster.add_candidate(2, 0.05, &features[2]);
        cluster.add_candidate(3, 0.2, &features[3]);

        // X: 0.1 + 0.2 = 0.3 beats Y: 1.0 + 0.05 = 1.05
        let elements = cluster.elements(&features);
        assert_eq!(elements[&1], 1);
        assert_eq!(elements[&2], 3);
        // quality follows the optimized set, not the plain minima
        let expected = 1.0 - (0.1 + 0.2) / 2.0;
        assert!((cluster.quality(&features) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unannotated_candidates_substitute_anywhere() {
        // map 1: unannotated candidate closer than the X-annotated one
        let features = vec![
            feature_at(0, 0, &[]),
            feature_at(1, 0, &[]),
            feature_at(1, 1, &["X"]),
            feature_at(2, 0, &["X"]),
        ];
        let mut cluster = QtCluster::new(0, &features[0], 3, 1.0, true);
        cluster.add_candidate(1, 0.15, &features[1]);
        cluster.add_candidate(2, 0.3, &features[2]);
        cluster.add_candidate(3, 0.1, &features[3]);

        // set X merged with the unannotated fallback: 0.15 + 0.1
        let elements = cluster.elements(&features);
        assert_eq!(elements[&1], 1);
        assert_eq!(elements[&2], 3);
        let expected = 1.0 - (0.15 + 0.1) / 2.0;
        assert!((cluster.quality(&features) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_annotation_tie_breaks_lexicographically() {
        // two single-candidate sets with identical sums
        let features = vec![
            feature_at(0, 0, &[]),
            feature_at(1, 0, &["B"]),
            feature_at(1, 1, &["A"]),
        ];
        let mut cluster = QtCluster::new(0, &features[0], 2, 1.0, true);
        cluster.add_candidate(1, 0.2, &features[1]);
        cluster.add_candidate(2, 0.2, &features[2]);

        // both sets sum to 0.2; "A" < "B" wins
        let elements = cluster.elements(&features);
        assert_eq!(elements[&1], 2);
    }

    #[test]
    fn test_annotated_center_fixes_the_set() {
        let features = vec![
            feature_at(0, 0, &["X"]),
            feature_at(1, 0, &[]),
            feature_at(1, 1, &["X"]),
        ];
        let mut cluster = QtCluster::new(0, &features[0], 2, 1.0, true);
        cluster.add_candidate(1, 0.1, &features[1]);
        cluster.add_candidate(2, 0.2, &features[2]);

        // the unannotated candidate is closest and compatible
        let elements = cluster.elements(&features);
        assert_eq!(elements[&1], 1);
        let expected = 1.0 - 0.1;
        assert!((cluster.quality(&features) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_equal_distances_keep_insertion_order() {
        let mut features = three_map_arena();
        features.push(feature_at(1, 1, &[]));
        let mut cluster = QtCluster::new(0, &features[0], 3, 1.0, false);
        // same distance: the first added stays in front
        cluster.add_candidate(1, 0.2, &features[1]);
        cluster.add_candidate(3, 0.2, &features[3]);
        assert_eq!(cluster.elements(&features)[&1], 1);
    }
}
