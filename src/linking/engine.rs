use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;
use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;

use crate::data::feature::{FeatureMap, LinkedFeature};
use crate::data::params::{LinkerParams, MzUnit};
use crate::linking::cluster::QtCluster;
use crate::linking::consensus::{ConsensusFeature, ConsensusMap};
use crate::linking::distance::FeatureDistance;
use crate::linking::error::LinkError;
use crate::linking::grid::HashGrid;

/// Upper bound of the normalized feature distance; cluster quality is
/// measured against it.
const MAX_DISTANCE: f64 = 1.0;

/// Pairwise distances keyed by the unordered pair of arena ids, so a pair
/// visited from either center is computed exactly once per run.
type DistanceCache = HashMap<(usize, usize), (bool, f64)>;

/// Greedy quality-threshold linker.
///
/// Wraps all input features into one arena, buckets them into a hash grid
/// sized to the tolerance windows, builds one candidate cluster per feature
/// from its 3x3 grid neighborhood, then repeatedly extracts the best-quality
/// cluster as a consensus feature and invalidates every remaining cluster
/// that referenced the consumed features. Each input feature ends up in
/// exactly one consensus row.
///
/// The extraction loop is strictly sequential; cancellation is polled
/// between rounds through the shared handle.
pub struct QtClusterFinder {
    params: LinkerParams,
    cancel: Arc<AtomicBool>,
}

impl QtClusterFinder {
    pub fn new(params: LinkerParams) -> Self {
        QtClusterFinder {
            params,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag polled between extraction rounds; set it to `true` from
    /// another thread to abort the run with `LinkError::Cancelled`.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Link the given feature maps into a consensus map.
    ///
    /// Map identity is positional; the input collections are only borrowed
    /// for the duration of this call.
    pub fn run(&self, maps: &[FeatureMap]) -> Result<ConsensusMap, LinkError> {
        self.params.validate()?;
        if maps.len() < 2 {
            return Err(LinkError::Config(format!(
                "need at least two feature maps, got {}",
                maps.len()
            )));
        }
        let started = Instant::now();
        let map_sizes: Vec<usize> = maps.iter().map(|m| m.len()).collect();

        // ---- 1) flatten all maps into the feature arena -----------------
        let features: Vec<LinkedFeature> = maps
            .iter()
            .enumerate()
            .flat_map(|(map_idx, map)| {
                map.iter()
                    .enumerate()
                    .map(move |(feature_idx, f)| LinkedFeature::from_feature(map_idx, feature_idx, f))
            })
            .collect();
        info!(
            "linking {} features across {} maps ({})",
            features.len(),
            maps.len(),
            map_sizes.iter().join(", ")
        );
        if features.is_empty() {
            return Ok(ConsensusMap {
                map_sizes,
                features: Vec::new(),
            });
        }

        // ---- 2) distance metric with the run-wide intensity maximum -----
        let max_intensity = features
            .par_iter()
            .map(|f| f.intensity)
            .reduce(|| 0.0, f64::max);
        let metric = FeatureDistance::new(&self.params, max_intensity);

        // ---- 3) spatial grid sized to the tolerance windows -------------
        let mut grid = HashGrid::new(
            self.params.distance_rt.max_difference,
            self.mz_cell_size(&features),
        );
        for (id, feature) in features.iter().enumerate() {
            grid.insert(feature.rt, feature.mz, id)?;
        }
        debug!("grid holds {} features in {} cells", grid.len(), grid.num_cells());

        // ---- 4) one cluster per feature from its 3x3 neighborhood -------
        let mut cache: DistanceCache = HashMap::new();
        let mut neighborhood: Vec<usize> = Vec::new();
        let mut clusters: Vec<QtCluster> = Vec::with_capacity(features.len());
        for (id, center) in features.iter().enumerate() {
            let mut cluster = QtCluster::new(
                id,
                center,
                maps.len(),
                MAX_DISTANCE,
                self.params.use_identifications,
            );
            neighborhood.clear();
            grid.neighbors_into(center.rt, center.mz, &mut neighborhood);
            for &other_id in &neighborhood {
                if other_id == id {
                    continue;
                }
                let other = &features[other_id];
                if other.map_idx == center.map_idx {
                    continue;
                }
                if self.params.use_identifications && !center.annotations_compatible(other) {
                    continue;
                }
                let (valid, dist) = cached_distance(&mut cache, &metric, &features, id, other_id);
                if valid {
                    cluster.add_candidate(other_id, dist, other);
                }
            }
            clusters.push(cluster);
        }
        debug!(
            "built {} clusters, {} cached distances",
            clusters.len(),
            cache.len()
        );

        // ---- 5) greedy extraction ---------------------------------------
        let progress = if self.params.show_progress {
            ProgressBar::new(features.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        let mut out: Vec<ConsensusFeature> = Vec::new();
        let mut removed: HashSet<usize> = HashSet::new();
        while !clusters.is_empty() {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(LinkError::Cancelled);
            }

            // globally best quality; exact ties go to the lowest center id
            let mut best_idx = 0;
            let mut best_quality = -1.0;
            let mut best_center = usize::MAX;
            for (idx, cluster) in clusters.iter_mut().enumerate() {
                let quality = cluster.quality(&features);
                if quality > best_quality
                    || (quality == best_quality && cluster.center_id() < best_center)
                {
                    best_idx = idx;
                    best_quality = quality;
                    best_center = cluster.center_id();
                }
            }

            let mut best = clusters.swap_remove(best_idx);
            let elements = best.elements(&features);
            let member_refs: Vec<&LinkedFeature> =
                elements.values().map(|&fid| &features[fid]).collect();
            out.push(ConsensusFeature::from_members(&member_refs, best_quality));

            removed.clear();
            removed.extend(elements.values().copied());
            progress.inc(removed.len() as u64);

            // prune survivors; clusters whose center was consumed die here
            clusters.retain_mut(|cluster| cluster.update(&removed));
        }
        progress.finish_and_clear();

        info!(
            "extracted {} consensus features in {:.2?}",
            out.len(),
            started.elapsed()
        );
        Ok(ConsensusMap {
            map_sizes,
            features: out,
        })
    }

    /// m/z cell height of the grid. A ppm tolerance widens with m/z, so the
    /// cell must cover the window at the largest observed m/z to keep every
    /// admissible pair within one cell of each other.
    fn mz_cell_size(&self, features: &[LinkedFeature]) -> f64 {
        match self.params.distance_mz.unit {
            MzUnit::Da => self.params.distance_mz.max_difference,
            MzUnit::Ppm => {
                let max_mz = features.iter().map(|f| f.mz.abs()).fold(0.0, f64::max);
                let cell = self.params.distance_mz.max_difference * 1e-6 * max_mz;
                if cell > 0.0 {
                    cell
                } else {
                    // all-zero m/z: the window is zero wide, any cell works
                    1.0
                }
            }
        }
    }
}

/// Look up or compute the distance of an unordered feature pair. Centers
/// are visited in ascending arena order, so the computing side of a pair is
/// deterministic.
fn cached_distance(
    cache: &mut DistanceCache,
    metric: &FeatureDistance,
    features: &[LinkedFeature],
    a_id: usize,
    b_id: usize,
) -> (bool, f64) {
    let key = if a_id < b_id { (a_id, b_id) } else { (b_id, a_id) };
    if let Some(&hit) = cache.get(&key) {
        return hit;
    }
    let result = metric.distance(&features[a_id], &features[b_id]);
    cache.insert(key, result);
    result
}

/// Closed set of grouping strategies, picked at configuration time.
///
/// Replaces name-based algorithm lookup: adding a strategy means adding a
/// variant here, and every variant exposes the same `group` operation.
#[derive(Debug, Clone)]
pub enum GroupingAlgorithm {
    QualityThreshold(LinkerParams),
}

impl GroupingAlgorithm {
    /// Run the selected strategy over the given feature maps.
    ///
    /// # Examples
    ///
    /// ```
    /// use mslink::{Feature, GroupingAlgorithm, LinkerParams};
    ///
    /// let run_a = vec![Feature::new(100.0, 500.0, 1200.0, 2)];
    /// let run_b = vec![Feature::new(102.5, 500.1, 900.0, 2)];
    ///
    /// let algorithm = GroupingAlgorithm::QualityThreshold(LinkerParams::default());
    /// let consensus = algorithm.group(&[run_a, run_b]).unwrap();
    /// assert_eq!(consensus.len(), 1);
    /// assert_eq!(consensus.features[0].len(), 2);
    /// ```
    pub fn group(&self, maps: &[FeatureMap]) -> Result<ConsensusMap, LinkError> {
        match self {
            GroupingAlgorithm::QualityThreshold(params) => {
                QtClusterFinder::new(params.clone()).run(maps)
            }
        }
    }
}
