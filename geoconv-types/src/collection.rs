//! See [`FeatureCollection`].

use serde::{Deserialize, Serialize};

use crate::bounding_rect::BoundingRect;
use crate::coord::Coord;
use crate::feature::{Feature, Grouping};

/// Ordered sequence of features produced by one decoder call.
///
/// Insertion order is preserved by every operation of this type.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    features: Vec<Feature>,
}

impl FeatureCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a feature to the end of the collection.
    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// Features in insertion order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Mutable access to the features. The order cannot be changed through it.
    pub fn features_mut(&mut self) -> &mut [Feature] {
        &mut self.features
    }

    /// Consumes the collection, returning its features.
    pub fn into_features(self) -> Vec<Feature> {
        self.features
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if there are no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Iterates over the features in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    /// Iterates over every coordinate of every feature.
    pub fn coords(&self) -> impl Iterator<Item = &Coord> + '_ {
        self.features.iter().flat_map(|f| f.geometry.coords())
    }

    /// Iterates mutably over every coordinate of every feature.
    pub fn coords_mut(&mut self) -> impl Iterator<Item = &mut Coord> + '_ {
        self.features.iter_mut().flat_map(|f| f.geometry.coords_mut())
    }

    /// Returns true if any coordinate in the collection has a z component.
    pub fn has_z(&self) -> bool {
        self.coords().any(|c| c.z.is_some())
    }

    /// Drops the z component of every coordinate. Running it twice has the same effect as running it once.
    pub fn strip_z(&mut self) {
        for feature in &mut self.features {
            feature.geometry.strip_z();
        }
    }

    /// Axis aligned bounding box of all coordinates in `(x, y)` order, or `None` if the collection has no
    /// coordinates at all.
    pub fn bounds(&self) -> Option<BoundingRect> {
        BoundingRect::from_coords(self.coords())
    }

    /// Removes features that have no coordinate satisfying `is_valid`.
    pub fn filter_valid(&mut self, is_valid: impl Fn(&Coord) -> bool) {
        self.features
            .retain(|feature| feature.geometry.coords().any(&is_valid));
    }

    /// Splits the features into groups according to the grouping policy.
    ///
    /// Groups are ordered by the first appearance of their key, features keep their relative order inside a group.
    pub fn grouped(&self, grouping: Grouping) -> Vec<(String, Vec<&Feature>)> {
        let mut groups: Vec<(String, Vec<&Feature>)> = vec![];
        for feature in &self.features {
            let key = feature.group_key(grouping);
            match groups.iter_mut().find(|(name, _)| name == key) {
                Some((_, members)) => members.push(feature),
                None => groups.push((key.to_string(), vec![feature])),
            }
        }

        groups
    }
}

/// Valid domain of geographic coordinates: longitude in `[-180, 180]`, latitude in `[-90, 90]`.
pub fn is_valid_lonlat(c: &Coord) -> bool {
    c.is_finite() && (-180.0..=180.0).contains(&c.x) && (-90.0..=90.0).contains(&c.y)
}

impl From<Vec<Feature>> for FeatureCollection {
    fn from(features: Vec<Feature>) -> Self {
        Self { features }
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

impl Extend<Feature> for FeatureCollection {
    fn extend<T: IntoIterator<Item = Feature>>(&mut self, iter: T) {
        self.features.extend(iter);
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

impl<'a> IntoIterator for &'a FeatureCollection {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}
