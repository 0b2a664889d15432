use std::f64::consts::PI;

use crate::atoms::{AtomCollection, Matrix3N};
use crate::config::SpeciesMap;
use crate::descriptor::{DescriptorError, Transform};

/// Multiplies all positions by a constant factor
#[derive(Clone, Debug, PartialEq)]
pub struct ScalePositions {
    pub factor: f64,
}

impl ScalePositions {
    /// Scaling that maps the cutoff sphere onto the unit ball
    pub fn from_cutoff(cutoff: f64) -> ScalePositions {
        ScalePositions {factor: 1.0 / cutoff}
    }
}

impl<'a> Transform<&'a AtomCollection> for ScalePositions {
    type Output = AtomCollection;

    fn apply(&self, atoms: &'a AtomCollection) -> Result<AtomCollection, DescriptorError> {
        if atoms.is_empty() {
            return Err(DescriptorError::EmptyCollection);
        }

        Ok(atoms.scaled(self.factor))
    }
}

/// Point masses with scalar weights
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedPoints {
    pub positions: Matrix3N,
    pub weights: Vec<f64>,
}

/// Smooth envelope falling from one at the origin to zero at unit radius
pub fn cutoff_envelope(r: f64) -> f64 {
    if r >= 1.0 {
        return 0.0;
    }

    0.5 * ((PI * r).cos() + 1.0)
}

/// Maps each atom's species onto a feature weight
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMapper {
    pub species: SpeciesMap,
    pub apply_cutoff: bool,
}

impl Transform<AtomCollection> for FeatureMapper {
    type Output = WeightedPoints;

    fn apply(&self, atoms: AtomCollection) -> Result<WeightedPoints, DescriptorError> {
        let weights = atoms.numbers().iter()
            .zip(atoms.positions().column_iter())
            .enumerate()
            .map(|(index, (&number, position))| -> Result<f64, DescriptorError> {
                let weight = self.species.weight(number)
                    .ok_or(DescriptorError::UnknownSpecies {index, number})?;

                if self.apply_cutoff {
                    Ok(weight * cutoff_envelope(position.norm()))
                } else {
                    Ok(weight)
                }
            })
            .collect::<Result<Vec<f64>, DescriptorError>>()?;

        Ok(WeightedPoints {positions: atoms.positions().clone(), weights})
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::stages::*;

    fn water() -> AtomCollection {
        let positions = Matrix3N::from_column_slice(&[
            0.0, 0.0, 0.1173,
            0.0, 0.7572, -0.4692,
            0.0, -0.7572, -0.4692,
        ]);
        AtomCollection::new(positions, vec![8.0, 1.0, 1.0]).unwrap()
    }

    #[test]
    fn scaling() {
        let atoms = water();
        let scaled = ScalePositions::from_cutoff(5.0).apply(&atoms).unwrap();
        approx::assert_relative_eq!(scaled.positions().clone(), atoms.positions() * 0.2);
        assert_eq!(scaled.numbers(), atoms.numbers());

        assert_eq!(
            ScalePositions::from_cutoff(5.0).apply(&AtomCollection::empty()),
            Err(DescriptorError::EmptyCollection)
        );
    }

    #[test]
    fn envelope() {
        approx::assert_relative_eq!(cutoff_envelope(0.0), 1.0);
        approx::assert_relative_eq!(cutoff_envelope(0.5), 0.5, epsilon = 1e-12);
        assert_eq!(cutoff_envelope(1.0), 0.0);
        assert_eq!(cutoff_envelope(3.0), 0.0);
    }

    #[test]
    fn feature_weights() {
        let mapper = FeatureMapper {species: SpeciesMap::default(), apply_cutoff: false};
        let points = mapper.apply(water()).unwrap();
        approx::assert_relative_eq!(points.weights[0], 1.875);
        approx::assert_relative_eq!(points.weights[1], 1.0);

        let enveloped = FeatureMapper {species: SpeciesMap::default(), apply_cutoff: true};
        let far = AtomCollection::new(Matrix3N::from_column_slice(&[0.5, 0.0, 0.0, 2.0, 0.0, 0.0]), vec![1.0, 1.0]).unwrap();
        let points = enveloped.apply(far).unwrap();
        approx::assert_relative_eq!(points.weights[0], 0.5, epsilon = 1e-12);
        assert_eq!(points.weights[1], 0.0);
    }

    #[test]
    fn unknown_species() {
        let mapper = FeatureMapper {species: SpeciesMap::default(), apply_cutoff: true};
        let atoms = AtomCollection::new(Matrix3N::zeros(2), vec![1.0, 10.0]).unwrap();
        assert_eq!(
            mapper.apply(atoms),
            Err(DescriptorError::UnknownSpecies {index: 1, number: 10.0})
        );
    }
}
