use clap::Parser;

use mslink::linking::io::{load_feature_maps_json, save_consensus_json};
use mslink::{GroupingAlgorithm, LinkerParams, MzUnit};

/// Link corresponding LC-MS features across runs into consensus features.
#[derive(Parser, Debug)]
#[command(name = "mslink")]
struct Args {
    /// JSON file holding the input feature maps
    input: String,
    /// Output path for the consensus map (JSON)
    output: String,
    /// Maximum retention time difference in seconds
    #[arg(long, default_value_t = 100.0)]
    rt_tol: f64,
    /// Maximum m/z difference (Da, or ppm with --ppm)
    #[arg(long, default_value_t = 0.3)]
    mz_tol: f64,
    /// Interpret the m/z tolerance in ppm instead of Da
    #[arg(long)]
    ppm: bool,
    /// Use peptide identifications as linking constraints
    #[arg(long)]
    use_ids: bool,
    /// Compare adduct formulas as a hard constraint
    #[arg(long)]
    with_adducts: bool,
    /// Show a progress bar over the extraction loop
    #[arg(long)]
    progress: bool,
}

fn main() {
    let args = Args::parse();

    let maps = match load_feature_maps_json(&args.input) {
        Ok(maps) => maps,
        Err(e) => {
            eprintln!("failed to read {}: {}", args.input, e);
            std::process::exit(1);
        }
    };

    let mut params = LinkerParams::default();
    params.distance_rt.max_difference = args.rt_tol;
    params.distance_mz.max_difference = args.mz_tol;
    params.distance_mz.unit = if args.ppm { MzUnit::Ppm } else { MzUnit::Da };
    params.use_identifications = args.use_ids;
    params.ignore_adduct = !args.with_adducts;
    params.show_progress = args.progress;

    let consensus = match GroupingAlgorithm::QualityThreshold(params).group(&maps) {
        Ok(consensus) => consensus,
        Err(e) => {
            eprintln!("linking failed: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "linked {} features from {} maps into {} consensus features",
        consensus.assigned_count(),
        consensus.map_sizes.len(),
        consensus.len()
    );

    if let Err(e) = save_consensus_json(&args.output, &consensus) {
        eprintln!("failed to write {}: {}", args.output, e);
        std::process::exit(1);
    }
    println!("wrote {}", args.output);
}
