use serde::{Deserialize, Serialize};

use crate::data::feature::LinkedFeature;

/// Reference to one member of a consensus feature: which map it came from
/// and its index inside that map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub map: usize,
    pub feature: usize,
}

/// One linked consensus feature: at most one member per input map, plus the
/// aggregate position, intensity, charge and the cluster quality it was
/// extracted with. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusFeature {
    /// mean retention time of the members
    pub rt: f64,
    /// mean m/z of the members
    pub mz: f64,
    /// summed intensity of the members
    pub intensity: f64,
    /// first non-zero member charge, 0 when all members are unknown
    pub charge: i32,
    pub quality: f64,
    /// members ordered by map index
    pub members: Vec<MemberRef>,
}

impl ConsensusFeature {
    /// Aggregate a set of member features (map index order) into one row.
    pub fn from_members(members: &[&LinkedFeature], quality: f64) -> Self {
        let n = members.len().max(1) as f64;
        let rt = members.iter().map(|f| f.rt).sum::<f64>() / n;
        let mz = members.iter().map(|f| f.mz).sum::<f64>() / n;
        let intensity = members.iter().map(|f| f.intensity).sum::<f64>();
        let charge = members
            .iter()
            .map(|f| f.charge)
            .find(|&c| c != 0)
            .unwrap_or(0);

        ConsensusFeature {
            rt,
            mz,
            intensity,
            charge,
            quality,
            members: members
                .iter()
                .map(|f| MemberRef {
                    map: f.map_idx,
                    feature: f.feature_idx,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member feature index for a map, if that map contributed one.
    pub fn member_for_map(&self, map: usize) -> Option<usize> {
        self.members
            .iter()
            .find(|m| m.map == map)
            .map(|m| m.feature)
    }
}

/// The ordered result of a linking run: one row per extracted cluster, plus
/// the element count of every input map (column metadata for downstream
/// writers).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusMap {
    pub map_sizes: Vec<usize>,
    pub features: Vec<ConsensusFeature>,
}

impl ConsensusMap {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Total number of assigned features across all rows.
    pub fn assigned_count(&self) -> usize {
        self.features.iter().map(|f| f.len()).sum()
    }
}
