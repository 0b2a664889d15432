use molinvariants::batch;
use molinvariants::config::{SPECIES, Settings};
use molinvariants::descriptor::Pipeline;
use statrs::statistics::Statistics;

const GEOMETRIES: usize = 50;
const NUM_ATOMS: usize = 9;
const MAX_RADIUS: f64 = 1.5;
const SEED: u64 = 0;

fn main() {
    env_logger::init();

    let settings = Settings::default();
    let separations = match batch::initial_geometries(GEOMETRIES, NUM_ATOMS, MAX_RADIUS, &settings.separation, Some(&SPECIES[..]), SEED) {
        Ok(separations) => separations,
        Err(e) => {
            eprintln!("Geometry generation failed: {}", e);
            std::process::exit(1);
        }
    };

    let iterations: Vec<f64> = separations.iter().map(|s| s.iterations as f64).collect();
    let min_separations: Vec<f64> = separations.iter().filter_map(|s| s.min_separation).collect();
    let converged = separations.iter().filter(|s| s.converged()).count();

    println!(
        "{} geometries of {} atoms: {} converged, mean iterations {:.1}, smallest separation {:.4}",
        separations.len(), NUM_ATOMS, converged, iterations.mean(), min_separations.min()
    );

    let pipeline = match Pipeline::from_settings(&settings.descriptor) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Invalid descriptor settings: {}", e);
            std::process::exit(1);
        }
    };
    let collections: Vec<_> = separations.into_iter().map(|s| s.atoms).collect();
    match batch::descriptors(&pipeline, &collections) {
        Ok(descriptors) => {
            let spread: Vec<f64> = descriptors.iter()
                .skip(1)
                .filter_map(|d| d.distance(&descriptors[0]))
                .collect();
            println!("Mean descriptor distance to the first geometry: {:.4e}", spread.mean());
        },
        Err(e) => eprintln!("Descriptor computation failed: {}", e)
    }
}
