use std::fs::File;
use std::io;
use std::io::{BufReader, BufWriter};

use serde::{Deserialize, Serialize};

use crate::data::feature::FeatureMap;
use crate::linking::consensus::ConsensusMap;

/// Versioned on-disk wrapper around a consensus map.
#[derive(Serialize, Deserialize)]
pub struct ConsensusFile {
    pub version: u32,
    pub consensus: ConsensusMap,
}

impl ConsensusFile {
    pub fn new(consensus: ConsensusMap) -> Self {
        Self {
            version: 1,
            consensus,
        }
    }
}

/// Versioned on-disk wrapper around a set of input feature maps.
#[derive(Serialize, Deserialize)]
pub struct FeatureMapsFile {
    pub version: u32,
    pub maps: Vec<FeatureMap>,
}

impl FeatureMapsFile {
    pub fn new(maps: Vec<FeatureMap>) -> Self {
        Self { version: 1, maps }
    }
}

// --- JSON (human-readable) ---
pub fn save_consensus_json(path: &str, consensus: &ConsensusMap) -> io::Result<()> {
    let f = BufWriter::new(File::create(path)?);
    let cf = ConsensusFile::new(consensus.clone());
    serde_json::to_writer_pretty(f, &cf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

pub fn load_consensus_json(path: &str) -> io::Result<ConsensusMap> {
    let f = BufReader::new(File::open(path)?);
    let cf: ConsensusFile =
        serde_json::from_reader(f).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(cf.consensus)
}

pub fn save_feature_maps_json(path: &str, maps: &[FeatureMap]) -> io::Result<()> {
    let f = BufWriter::new(File::create(path)?);
    let mf = FeatureMapsFile::new(maps.to_vec());
    serde_json::to_writer_pretty(f, &mf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

pub fn load_feature_maps_json(path: &str) -> io::Result<Vec<FeatureMap>> {
    let f = BufReader::new(File::open(path)?);
    let mf: FeatureMapsFile =
        serde_json::from_reader(f).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(mf.maps)
}

// --- Bincode + optional zstd compression ---
pub fn save_consensus_bincode(
    path: &str,
    consensus: &ConsensusMap,
    compress: bool,
) -> io::Result<()> {
    let f = File::create(path)?;
    if compress {
        let mut zw = zstd::Encoder::new(f, 3)?;
        bincode::serialize_into(&mut zw, &ConsensusFile::new(consensus.clone()))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        zw.finish()?;
        Ok(())
    } else {
        let mut bw = BufWriter::new(f);
        bincode::serialize_into(&mut bw, &ConsensusFile::new(consensus.clone()))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

pub fn load_consensus_bincode(path: &str) -> io::Result<ConsensusMap> {
    let f = File::open(path)?;
    // Try zstd first, then plain bincode
    if let Ok(mut zr) = zstd::Decoder::new(&f) {
        if let Ok(cf) = bincode::deserialize_from::<_, ConsensusFile>(&mut zr) {
            return Ok(cf.consensus);
        }
    }
    let f = BufReader::new(File::open(path)?);
    let cf: ConsensusFile =
        bincode::deserialize_from(f).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(cf.consensus)
}
