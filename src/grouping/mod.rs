//! # Peak Grouping
//!
//! Partitions a peak list into groups that are fit jointly, determines the
//! lattice window of each group, and builds the initial guesses, bounds and
//! sync constraints of a group fit.
//!
//! Two grouping strategies are available:
//!
//! - [`group_by_overlap`]: peaks whose footprints overlap, up to two layers
//!   of transitive overlap
//! - [`group_by_column`]: peaks sharing a resonance assignment in one dimension

pub mod guesses;
pub mod peak;

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{PeakFitError, Result};

pub use guesses::{build_guesses, GroupGuesses, GuessOptions};
pub use peak::{FittedValue, Peak, PeakDim};

/// Indices of peaks fit together. The first peak anchors any column sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitGroup {
    pub peaks: Vec<usize>,
}

impl FitGroup {
    pub fn new(peaks: Vec<usize>) -> Self {
        Self { peaks }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn anchor(&self) -> Option<usize> {
        self.peaks.first().copied()
    }
}

/// Inclusive integer box on the lattice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub lower: Vec<i64>,
    pub upper: Vec<i64>,
}

impl Region {
    pub fn new(lower: Vec<i64>, upper: Vec<i64>) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Region corners have {} and {} dimensions",
                lower.len(),
                upper.len()
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn n_dims(&self) -> usize {
        self.lower.len()
    }

    pub fn contains(&self, position: &[i64]) -> bool {
        position.len() == self.lower.len()
            && position
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(p, (lo, hi))| lo <= p && p <= hi)
    }

    /// Number of lattice points inside the region.
    pub fn point_count(&self) -> usize {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .map(|(lo, hi)| (hi - lo + 1).max(0) as usize)
            .product()
    }

    /// Every lattice point inside the region, last dimension fastest.
    pub fn positions(&self) -> Vec<Vec<i64>> {
        let mut positions = Vec::with_capacity(self.point_count());
        if self.point_count() == 0 {
            return positions;
        }
        let mut current = self.lower.clone();
        loop {
            positions.push(current.clone());
            let mut d = current.len();
            loop {
                if d == 0 {
                    return positions;
                }
                d -= 1;
                if current[d] < self.upper[d] {
                    current[d] += 1;
                    break;
                }
                current[d] = self.lower[d];
            }
        }
    }
}

/// Group peaks by two-layer transitive overlap.
///
/// From each anchor not yet used, the group holds the anchor's overlapping
/// neighbours and their neighbours. Members whose whole neighbourhood lies
/// inside the group are marked used and never anchor another group, which
/// keeps large connected clusters from being refit from every member.
/// Identical groups are reported once.
pub fn group_by_overlap(peaks: &[Peak]) -> Vec<FitGroup> {
    let n = peaks.len();
    let neighbours: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| j != i && peaks[i].overlaps(&peaks[j]))
                .collect()
        })
        .collect();

    let mut used = vec![false; n];
    let mut groups: Vec<FitGroup> = Vec::new();
    for anchor in 0..n {
        if used[anchor] {
            continue;
        }
        let mut members = vec![false; n];
        members[anchor] = true;
        for &first in &neighbours[anchor] {
            members[first] = true;
            for &second in &neighbours[first] {
                members[second] = true;
            }
        }

        let group: Vec<usize> = (0..n).filter(|&i| members[i]).collect();
        for &m in &group {
            if neighbours[m].iter().all(|&k| members[k]) {
                used[m] = true;
            }
        }

        let group = FitGroup::new(group);
        if !groups.contains(&group) {
            groups.push(group);
        }
    }

    debug!("Grouped {} peaks into {} overlap groups", n, groups.len());
    groups
}

/// Group peaks sharing a resonance assignment in `dim`.
///
/// Peaks without an assignment in `dim` form groups of their own. Groups are
/// ordered by their first peak.
pub fn group_by_column(peaks: &[Peak], dim: usize) -> Result<Vec<FitGroup>> {
    let mut columns: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    let mut groups: Vec<FitGroup> = Vec::new();
    for (i, peak) in peaks.iter().enumerate() {
        let peak_dim = peak.dims.get(dim).ok_or_else(|| {
            PeakFitError::DimensionMismatch(format!(
                "Peak {} has {} dimensions, column grouping needs dimension {}",
                peak.id,
                peak.n_dims(),
                dim
            ))
        })?;
        match peak_dim.resonance {
            Some(resonance) => columns.entry(resonance).or_default().push(i),
            None => groups.push(FitGroup::new(vec![i])),
        }
    }
    groups.extend(columns.into_values().map(FitGroup::new));
    groups.sort_by_key(|g| g.anchor());
    Ok(groups)
}

/// Smallest lattice box covering the footprints of every peak in `group`.
pub fn fit_window(peaks: &[Peak], group: &FitGroup) -> Result<Region> {
    let first = group
        .anchor()
        .and_then(|i| peaks.get(i))
        .ok_or_else(|| PeakFitError::InvalidInput("Empty fit group".to_string()))?;
    let n_dims = first.n_dims();

    let mut lower = vec![i64::MAX; n_dims];
    let mut upper = vec![i64::MIN; n_dims];
    for &i in &group.peaks {
        let peak = peaks.get(i).ok_or_else(|| {
            PeakFitError::InvalidInput(format!("Group refers to missing peak {}", i))
        })?;
        if peak.n_dims() != n_dims {
            return Err(PeakFitError::DimensionMismatch(format!(
                "Peak {} has {} dimensions, group has {}",
                peak.id,
                peak.n_dims(),
                n_dims
            )));
        }
        for (d, dim) in peak.dims.iter().enumerate() {
            lower[d] = lower[d].min(dim.lower().floor() as i64);
            upper[d] = upper[d].max(dim.upper().ceil() as i64);
        }
    }
    Region::new(lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak_1d(id: usize, shift: f64, bounds: f64) -> Peak {
        Peak::new(id, 1.0, vec![PeakDim::new(shift, bounds / 2.0, bounds)])
    }

    #[test]
    fn test_two_layer_overlap() {
        // A overlaps B, B overlaps C, A does not overlap C, D is isolated
        let peaks = vec![
            peak_1d(0, 0.0, 4.0),
            peak_1d(1, 3.0, 4.0),
            peak_1d(2, 6.0, 4.0),
            peak_1d(3, 30.0, 4.0),
        ];
        assert!(!peaks[0].overlaps(&peaks[2]));
        let groups = group_by_overlap(&peaks);
        assert_eq!(groups, vec![FitGroup::new(vec![0, 1, 2]), FitGroup::new(vec![3])]);
    }

    #[test]
    fn test_long_chain_is_not_merged_whole() {
        let peaks: Vec<Peak> = (0..5).map(|i| peak_1d(i, 3.0 * i as f64, 4.0)).collect();
        let groups = group_by_overlap(&peaks);
        assert_eq!(groups[0], FitGroup::new(vec![0, 1, 2]));
        assert!(groups.iter().all(|g| g.len() <= 5));
        for i in 0..5 {
            assert!(groups.iter().any(|g| g.peaks.contains(&i)));
        }
    }

    #[test]
    fn test_group_by_column() {
        let mut peaks: Vec<Peak> = (0..4)
            .map(|i| Peak::new(i, 1.0, vec![PeakDim::new(i as f64, 1.0, 2.0), PeakDim::new(5.0, 1.0, 2.0)]))
            .collect();
        peaks[0].dims[0].resonance = Some(7);
        peaks[2].dims[0].resonance = Some(7);
        peaks[3].dims[0].resonance = Some(1);
        let groups = group_by_column(&peaks, 0).unwrap();
        assert_eq!(
            groups,
            vec![FitGroup::new(vec![0, 2]), FitGroup::new(vec![1]), FitGroup::new(vec![3])]
        );
        assert!(group_by_column(&peaks, 2).is_err());
    }

    #[test]
    fn test_fit_window() {
        let peaks = vec![peak_1d(0, 10.0, 4.0), peak_1d(1, 13.5, 3.0)];
        let window = fit_window(&peaks, &FitGroup::new(vec![0, 1])).unwrap();
        assert_eq!(window.lower, vec![8]);
        assert_eq!(window.upper, vec![15]);
        assert_eq!(window.point_count(), 8);
    }

    #[test]
    fn test_region_positions() {
        let region = Region::new(vec![0, 5], vec![1, 7]).unwrap();
        let positions = region.positions();
        assert_eq!(positions.len(), 6);
        assert_eq!(positions[0], vec![0, 5]);
        assert_eq!(positions[1], vec![0, 6]);
        assert_eq!(positions[5], vec![1, 7]);
        assert!(region.contains(&[1, 6]));
        assert!(!region.contains(&[2, 6]));
    }
}
