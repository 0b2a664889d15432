use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Atomic numbers occurring in QM9
pub const SPECIES: [u32; 5] = [1, 6, 7, 8, 9];
/// Default descriptor cutoff radius
pub const CUTOFF: f64 = 5.0;
/// Multiplier for the cutoff used when reconstructing from a descriptor
pub const CUTOFF_FACTOR: f64 = 1.25;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigurationError {
    #[error("Maximum expansion order must be positive")]
    NonPositiveMaxOrder,
    #[error("Species map contains no species")]
    EmptySpeciesMap,
    #[error("Weight range ({0}, {1}) is not a finite, ordered interval")]
    InvalidWeightRange(f64, f64),
    #[error("Cutoff {0} must be finite and positive")]
    InvalidCutoff(f64),
    #[error("Minimum separation {0} must be finite and positive")]
    InvalidMinSeparation(f64),
    #[error("Softening epsilon {0} must be finite and non-negative")]
    InvalidEpsilon(f64),
    #[error("Barrier power must be positive")]
    NonPositivePower,
    #[error("Iteration cap must be positive")]
    NonPositiveMaxIters,
    #[error("Timeout {0} s must be finite and positive")]
    InvalidTimeout(f64),
    #[error("Symmetry tolerance {0} must be finite and positive")]
    InvalidSymmetryTolerance(f64),
    #[error("Eigenvalue tolerance {0} must be finite and positive")]
    InvalidEigenTolerance(f64),
    #[error("Could not parse settings: {0}")]
    Parse(String),
    #[error("Could not read settings file: {0}")]
    Io(String),
}

/// Linear map of atomic numbers onto scalar feature weights
///
/// The lowest configured number maps onto the lower end of `range`, the
/// highest onto the upper end. Numbers not in the set have no weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesMap {
    pub numbers: Vec<u32>,
    pub range: (f64, f64),
}

impl Default for SpeciesMap {
    fn default() -> SpeciesMap {
        SpeciesMap {numbers: SPECIES.to_vec(), range: (1.0, 2.0)}
    }
}

impl SpeciesMap {
    pub fn new(numbers: Vec<u32>, range: (f64, f64)) -> Result<SpeciesMap, ConfigurationError> {
        let map = SpeciesMap {numbers, range};
        map.validate()?;
        Ok(map)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.numbers.is_empty() {
            return Err(ConfigurationError::EmptySpeciesMap);
        }

        let (low, high) = self.range;
        if !low.is_finite() || !high.is_finite() || low > high {
            return Err(ConfigurationError::InvalidWeightRange(low, high));
        }

        Ok(())
    }

    fn bounds(&self) -> Option<(u32, u32)> {
        let min = *self.numbers.iter().min()?;
        let max = *self.numbers.iter().max()?;
        Some((min, max))
    }

    /// Whether a (possibly fractional) species value is one of the numbers
    pub fn contains(&self, number: f64) -> bool {
        self.numbers.iter().any(|&n| (n as f64 - number).abs() < 1e-6)
    }

    /// Feature weight of a species value, if it belongs to the map
    pub fn weight(&self, number: f64) -> Option<f64> {
        if !self.contains(number) {
            return None;
        }

        let (min, max) = self.bounds()?;
        let (low, high) = self.range;
        if min == max {
            return Some(low);
        }

        let fraction = (number - min as f64) / (max - min) as f64;
        Some(low + fraction * (high - low))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorSettings {
    pub cutoff: f64,
    pub max_order: usize,
    /// Multiply feature weights by a smooth envelope vanishing at the cutoff
    pub apply_cutoff: bool,
    pub species: SpeciesMap,
}

impl Default for DescriptorSettings {
    fn default() -> DescriptorSettings {
        DescriptorSettings {
            cutoff: CUTOFF,
            max_order: 7,
            apply_cutoff: true,
            species: SpeciesMap::default(),
        }
    }
}

impl DescriptorSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.cutoff.is_finite() || self.cutoff <= 0.0 {
            return Err(ConfigurationError::InvalidCutoff(self.cutoff));
        }

        if self.max_order == 0 {
            return Err(ConfigurationError::NonPositiveMaxOrder);
        }

        self.species.validate()
    }

    /// Settings for reconstructing geometries with a descriptor of these settings
    pub fn reconstruction(&self) -> DescriptorSettings {
        DescriptorSettings {cutoff: self.cutoff * CUTOFF_FACTOR, ..self.clone()}
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationSettings {
    pub min_separation: f64,
    pub epsilon: f64,
    pub power: i32,
    pub max_iters: u64,
    /// Least-squares cost at which the separation counts as reached
    pub target_cost: f64,
    pub tolerance_grad: f64,
    pub timeout_seconds: Option<f64>,
}

impl Default for SeparationSettings {
    fn default() -> SeparationSettings {
        SeparationSettings {
            min_separation: 0.85,
            epsilon: 1e-8,
            power: 12,
            max_iters: 1000,
            target_cost: 1e-12,
            tolerance_grad: 1e-10,
            timeout_seconds: None,
        }
    }
}

impl SeparationSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.min_separation.is_finite() || self.min_separation <= 0.0 {
            return Err(ConfigurationError::InvalidMinSeparation(self.min_separation));
        }

        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(ConfigurationError::InvalidEpsilon(self.epsilon));
        }

        if self.power <= 0 {
            return Err(ConfigurationError::NonPositivePower);
        }

        if self.max_iters == 0 {
            return Err(ConfigurationError::NonPositiveMaxIters);
        }

        if let Some(seconds) = self.timeout_seconds {
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(ConfigurationError::InvalidTimeout(seconds));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Distance tolerance for matching symmetry-transformed atoms
    pub tolerance: f64,
    /// Absolute tolerance for degenerate normalized principal moments
    pub eigen_tolerance: f64,
    /// Move the centre of mass to the origin before analysis
    pub recentre: bool,
    /// Treat all atoms as the same species
    pub ignore_species: bool,
}

impl Default for ClassifierSettings {
    fn default() -> ClassifierSettings {
        ClassifierSettings {
            tolerance: 0.3,
            eigen_tolerance: 0.01,
            recentre: false,
            ignore_species: false,
        }
    }
}

impl ClassifierSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ConfigurationError::InvalidSymmetryTolerance(self.tolerance));
        }

        if !self.eigen_tolerance.is_finite() || self.eigen_tolerance <= 0.0 {
            return Err(ConfigurationError::InvalidEigenTolerance(self.eigen_tolerance));
        }

        Ok(())
    }
}

/// Bundled settings of a reconstruction study
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub descriptor: DescriptorSettings,
    pub separation: SeparationSettings,
    pub classifier: ClassifierSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.descriptor.validate()?;
        self.separation.validate()?;
        self.classifier.validate()
    }

    /// Parse settings from JSON, keys absent from the document keep defaults
    pub fn from_json_str(json: &str) -> Result<Settings, ConfigurationError> {
        let settings: Settings = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Settings, ConfigurationError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Io(e.to_string()))?;
        Settings::from_json_str(&contents)
    }
}
