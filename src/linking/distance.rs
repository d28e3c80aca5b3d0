use crate::data::feature::LinkedFeature;
use crate::data::params::{LinkerParams, MzUnit};

/// Distance assigned to pairs that violate a hard constraint.
pub const INFINITE_DIST: f64 = f64::INFINITY;

/// Multi-dimensional feature distance with hard constraints.
///
/// The distance combines normalized RT, m/z and intensity differences into a
/// single value in [0, 1] (0 = identical position). Pairs with conflicting
/// non-zero charges or conflicting adducts are invalid outright. Pairs
/// outside an RT/m-z tolerance window are invalid when `force_constraints`
/// is set; otherwise they are flagged invalid but still get a finite
/// distance usable for ranking.
///
/// Pure function of its inputs and configuration; construction precomputes
/// the weight sum and the run-wide intensity normalizer.
#[derive(Debug, Clone)]
pub struct FeatureDistance {
    params: LinkerParams,
    weight_sum: f64,
    intensity_norm: f64,
}

impl FeatureDistance {
    /// `max_intensity` is the largest feature intensity of the whole run; it
    /// normalizes the intensity dimension into [0, 1].
    pub fn new(params: &LinkerParams, max_intensity: f64) -> Self {
        let weight_sum = params.distance_rt.weight
            + params.distance_mz.weight
            + params.distance_intensity.weight;
        let intensity_norm = if params.distance_intensity.log_transform {
            max_intensity.max(0.0).ln_1p()
        } else {
            max_intensity.max(0.0)
        };
        FeatureDistance {
            params: params.clone(),
            weight_sum,
            intensity_norm,
        }
    }

    /// Compute `(valid, distance)` for a pair of features.
    ///
    /// The m/z tolerance in ppm is converted to an absolute window relative
    /// to the left operand's m/z, so ppm comparisons are only symmetric up
    /// to that conversion; Da comparisons are exactly symmetric.
    pub fn distance(&self, a: &LinkedFeature, b: &LinkedFeature) -> (bool, f64) {
        if !self.params.ignore_charge && a.charge != 0 && b.charge != 0 && a.charge != b.charge {
            return (false, INFINITE_DIST);
        }
        if !self.params.ignore_adduct {
            if let (Some(adduct_a), Some(adduct_b)) = (&a.adduct, &b.adduct) {
                if adduct_a != adduct_b {
                    return (false, INFINITE_DIST);
                }
            }
        }

        let mut valid = true;

        let rt_diff = (a.rt - b.rt).abs();
        let max_rt = self.params.distance_rt.max_difference;
        if rt_diff > max_rt {
            if self.params.force_constraints {
                return (false, INFINITE_DIST);
            }
            valid = false;
        }

        let mz_diff = (a.mz - b.mz).abs();
        let max_mz = match self.params.distance_mz.unit {
            MzUnit::Da => self.params.distance_mz.max_difference,
            MzUnit::Ppm => self.params.distance_mz.max_difference * a.mz.abs() * 1e-6,
        };
        if mz_diff > max_mz {
            if self.params.force_constraints {
                return (false, INFINITE_DIST);
            }
            valid = false;
        }

        let rt_term = scaled_term(
            rt_diff / max_rt,
            self.params.distance_rt.exponent,
            self.params.distance_rt.weight,
        );
        let mz_term = if max_mz > 0.0 {
            scaled_term(
                mz_diff / max_mz,
                self.params.distance_mz.exponent,
                self.params.distance_mz.weight,
            )
        } else {
            0.0
        };
        let int_term = if self.intensity_norm > 0.0 {
            let (ia, ib) = if self.params.distance_intensity.log_transform {
                (a.intensity.max(0.0).ln_1p(), b.intensity.max(0.0).ln_1p())
            } else {
                (a.intensity, b.intensity)
            };
            scaled_term(
                (ia - ib).abs() / self.intensity_norm,
                self.params.distance_intensity.exponent,
                self.params.distance_intensity.weight,
            )
        } else {
            0.0
        };

        (valid, (rt_term + mz_term + int_term) / self.weight_sum)
    }
}

/// `norm^exponent * weight`, with fast paths for the common exponents.
#[inline]
fn scaled_term(norm: f64, exponent: f64, weight: f64) -> f64 {
    if exponent == 1.0 {
        norm * weight
    } else if exponent == 2.0 {
        norm * norm * weight
    } else {
        norm.powf(exponent) * weight
    }
}
