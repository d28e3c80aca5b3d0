use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

use crate::linking::error::LinkError;

/// Unit of the m/z tolerance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MzUnit {
    Da,
    Ppm,
}

impl Display for MzUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MzUnit::Da => write!(f, "Da"),
            MzUnit::Ppm => write!(f, "ppm"),
        }
    }
}

/// Tolerance, exponent and weight of one distance dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionParams {
    /// Never match features further apart than this (seconds for RT)
    pub max_difference: f64,
    /// Normalized difference is raised to this power
    pub exponent: f64,
    /// Contribution of this dimension to the final distance
    pub weight: f64,
}

impl Default for DimensionParams {
    fn default() -> Self {
        Self {
            max_difference: 100.0,
            exponent: 1.0,
            weight: 1.0,
        }
    }
}

/// m/z dimension parameters; the tolerance is interpreted in `unit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MzDimensionParams {
    /// Never match features further apart than this (in `unit`)
    pub max_difference: f64,
    /// Absolute (Da) or relative (ppm) tolerance
    pub unit: MzUnit,
    pub exponent: f64,
    pub weight: f64,
}

impl Default for MzDimensionParams {
    fn default() -> Self {
        Self {
            max_difference: 0.3,
            unit: MzUnit::Da,
            exponent: 2.0,
            weight: 1.0,
        }
    }
}

/// Intensity dimension parameters. Intensity has no hard tolerance; the
/// difference is normalized against the run-wide maximum intensity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntensityParams {
    pub exponent: f64,
    /// Off by default; intensity only ranks candidates when enabled
    pub weight: f64,
    /// Compare ln(1 + intensity) instead of raw intensities
    pub log_transform: bool,
}

impl Default for IntensityParams {
    fn default() -> Self {
        Self {
            exponent: 1.0,
            weight: 0.0,
            log_transform: false,
        }
    }
}

/// Full parameter set of a linking run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkerParams {
    pub distance_rt: DimensionParams,
    pub distance_mz: MzDimensionParams,
    pub distance_intensity: IntensityParams,
    /// Compare charge states; features with conflicting non-zero charges
    /// never match
    pub ignore_charge: bool,
    /// Compare adduct formulas; features with conflicting adducts never
    /// match
    pub ignore_adduct: bool,
    /// Peptide annotations constrain which features may share a consensus
    /// row
    pub use_identifications: bool,
    /// Treat the RT/m-z windows as hard constraints (pairs beyond a window
    /// are discarded instead of kept with a penalty distance)
    pub force_constraints: bool,
    /// Draw a progress bar over the extraction loop
    pub show_progress: bool,
}

impl Default for LinkerParams {
    fn default() -> Self {
        Self {
            distance_rt: DimensionParams::default(),
            distance_mz: MzDimensionParams::default(),
            distance_intensity: IntensityParams::default(),
            ignore_charge: false,
            ignore_adduct: true,
            use_identifications: false,
            force_constraints: true,
            show_progress: false,
        }
    }
}

impl LinkerParams {
    /// Check the parameter set before a run. All failures are fatal.
    pub fn validate(&self) -> Result<(), LinkError> {
        check_dimension("distance_rt", self.distance_rt.max_difference, self.distance_rt.exponent, self.distance_rt.weight)?;
        check_dimension("distance_mz", self.distance_mz.max_difference, self.distance_mz.exponent, self.distance_mz.weight)?;

        let intensity = &self.distance_intensity;
        if !intensity.exponent.is_finite() || intensity.exponent < 0.0 {
            return Err(LinkError::Config(
                "distance_intensity: exponent must be finite and non-negative".to_string(),
            ));
        }
        if !intensity.weight.is_finite() || intensity.weight < 0.0 {
            return Err(LinkError::Config(
                "distance_intensity: weight must be finite and non-negative".to_string(),
            ));
        }

        let weight_sum =
            self.distance_rt.weight + self.distance_mz.weight + intensity.weight;
        if weight_sum <= 0.0 {
            return Err(LinkError::Config(
                "sum of dimension weights must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_dimension(
    name: &str,
    max_difference: f64,
    exponent: f64,
    weight: f64,
) -> Result<(), LinkError> {
    if !max_difference.is_finite() || max_difference <= 0.0 {
        return Err(LinkError::Config(format!(
            "{}: max_difference must be finite and positive",
            name
        )));
    }
    if !exponent.is_finite() || exponent < 0.0 {
        return Err(LinkError::Config(format!(
            "{}: exponent must be finite and non-negative",
            name
        )));
    }
    if !weight.is_finite() || weight < 0.0 {
        return Err(LinkError::Config(format!(
            "{}: weight must be finite and non-negative",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let params = LinkerParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.distance_rt.max_difference, 100.0);
        assert_eq!(params.distance_mz.max_difference, 0.3);
        assert_eq!(params.distance_mz.unit, MzUnit::Da);
        assert!(params.ignore_adduct);
        assert!(!params.use_identifications);
    }

    #[test]
    fn test_non_positive_tolerance_rejected() {
        let mut params = LinkerParams::default();
        params.distance_rt.max_difference = 0.0;
        assert!(matches!(params.validate(), Err(LinkError::Config(_))));

        let mut params = LinkerParams::default();
        params.distance_mz.max_difference = -0.1;
        assert!(matches!(params.validate(), Err(LinkError::Config(_))));
    }

    #[test]
    fn test_zero_weight_sum_rejected() {
        let mut params = LinkerParams::default();
        params.distance_rt.weight = 0.0;
        params.distance_mz.weight = 0.0;
        params.distance_intensity.weight = 0.0;
        assert!(matches!(params.validate(), Err(LinkError::Config(_))));
    }

    #[test]
    fn test_unit_display() {
        assert_eq!(MzUnit::Da.to_string(), "Da");
        assert_eq!(MzUnit::Ppm.to_string(), "ppm");
    }
}
