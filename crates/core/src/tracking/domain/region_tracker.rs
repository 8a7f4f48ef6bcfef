use crate::shared::constants::{LOSS_THRESHOLD_SCANS, REGION_TOLERANCE_PX};
use crate::shared::region::Region;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerReport {
    Found(Region),
    Lost,
}

/// Hysteresis over scan results.
///
/// "Found" is reported immediately on first sight or when the region moves
/// beyond the tolerance. "Lost" needs `loss_threshold` consecutive empty
/// scans while a region is tracked.
#[derive(Clone, Debug)]
pub struct RegionTracker {
    current: Option<Region>,
    misses: usize,
    loss_threshold: usize,
    tolerance: i32,
}

impl RegionTracker {
    pub fn new(loss_threshold: usize, tolerance: i32) -> Self {
        Self {
            current: None,
            misses: 0,
            loss_threshold: loss_threshold.max(1),
            tolerance,
        }
    }

    pub fn current(&self) -> Option<Region> {
        self.current
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    /// Feeds one background scan.
    pub fn observe(&mut self, scan: Option<Region>) -> Option<TrackerReport> {
        match scan {
            Some(region) => self.found(region),
            None => {
                if self.current.is_none() {
                    return None;
                }
                self.misses += 1;
                if self.misses < self.loss_threshold {
                    return None;
                }
                self.current = None;
                self.misses = 0;
                Some(TrackerReport::Lost)
            }
        }
    }

    /// Feeds an on-demand scan: resets the miss counter and never reports loss.
    pub fn fresh_scan(&mut self, scan: Option<Region>) -> Option<TrackerReport> {
        match scan {
            Some(region) => self.found(region),
            None => {
                self.misses = 0;
                None
            }
        }
    }

    fn found(&mut self, region: Region) -> Option<TrackerReport> {
        self.misses = 0;
        let changed = self
            .current
            .map_or(true, |c| region.differs_beyond(&c, self.tolerance));
        if !changed {
            return None;
        }
        self.current = Some(region);
        Some(TrackerReport::Found(region))
    }
}

impl Default for RegionTracker {
    fn default() -> Self {
        Self::new(LOSS_THRESHOLD_SCANS, REGION_TOLERANCE_PX)
    }
}
