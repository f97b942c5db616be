use serde::{Deserialize, Serialize};
use std::fmt;

pub const FULL_CIRCLE: f64 = 360.0;

/// One angular range of the wheel and the prize it pays out.
///
/// Bounds are half-open (`min_degree <= angle < max_degree`). A segment whose
/// `min_degree` is greater than its `max_degree` wraps through 0 degrees and
/// covers `[min_degree, 360) ∪ [0, max_degree)`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PrizeSegment {
    pub min_degree: f64,
    pub max_degree: f64,
    pub amount: u32,
}

impl PrizeSegment {
    pub const fn new(min_degree: f64, max_degree: f64, amount: u32) -> Self {
        Self { min_degree, max_degree, amount }
    }

    pub fn wraps(&self) -> bool {
        self.min_degree > self.max_degree
    }

    pub fn contains(&self, normalized: f64) -> bool {
        if self.wraps() {
            normalized >= self.min_degree || normalized < self.max_degree
        } else {
            normalized >= self.min_degree && normalized < self.max_degree
        }
    }

    pub fn width(&self) -> f64 {
        if self.wraps() {
            (FULL_CIRCLE - self.min_degree) + self.max_degree
        } else {
            self.max_degree - self.min_degree
        }
    }

    // Non-empty [start, end) pieces inside [0, 360).
    fn intervals(&self) -> Vec<(f64, f64)> {
        if self.wraps() {
            [(self.min_degree, FULL_CIRCLE), (0.0, self.max_degree)]
                .into_iter()
                .filter(|(start, end)| start < end)
                .collect()
        } else {
            vec![(self.min_degree, self.max_degree)]
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrizeTableError {
    Empty,
    InvalidBounds { index: usize, min_degree: f64, max_degree: f64 },
    ZeroAmount { index: usize },
    Gap { at: f64 },
    Overlap { at: f64 },
}

impl fmt::Display for PrizeTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "prize table has no segments"),
            Self::InvalidBounds { index, min_degree, max_degree } => write!(
                f,
                "segment {} has invalid bounds [{}, {})",
                index, min_degree, max_degree
            ),
            Self::ZeroAmount { index } => write!(f, "segment {} has a zero prize amount", index),
            Self::Gap { at } => write!(f, "no segment covers {} degrees", at),
            Self::Overlap { at } => write!(f, "segments overlap at {} degrees", at),
        }
    }
}

impl std::error::Error for PrizeTableError {}

/// Anything that can turn a wheel angle into a prize amount.
pub trait PrizeResolver: Send + Sync {
    fn resolve_prize(&self, angle_degrees: f64) -> u32;
}

/// Maps any angle onto `[0, 360)`.
pub fn normalize_angle(angle_degrees: f64) -> f64 {
    let normalized = ((angle_degrees % FULL_CIRCLE) + FULL_CIRCLE) % FULL_CIRCLE;
    // -1e-20 + 360 rounds to exactly 360
    if normalized >= FULL_CIRCLE {
        0.0
    } else {
        normalized
    }
}

/// An immutable set of segments that partitions the whole circle.
#[derive(Debug, Clone, PartialEq)]
pub struct PrizeTable {
    segments: Vec<PrizeSegment>,
    fallback_amount: u32,
}

impl PrizeTable {
    /// Validates that `segments` cover `[0, 360)` exactly once. The fallback
    /// amount starts out as the lowest configured prize.
    pub fn new(segments: Vec<PrizeSegment>) -> Result<Self, PrizeTableError> {
        if segments.is_empty() {
            return Err(PrizeTableError::Empty);
        }

        let mut intervals = Vec::with_capacity(segments.len() + 1);
        for (index, segment) in segments.iter().enumerate() {
            let in_range = |d: f64| d.is_finite() && (0.0..=FULL_CIRCLE).contains(&d);
            if !in_range(segment.min_degree)
                || !in_range(segment.max_degree)
                || segment.min_degree == segment.max_degree
                || segment.min_degree >= FULL_CIRCLE
            {
                return Err(PrizeTableError::InvalidBounds {
                    index,
                    min_degree: segment.min_degree,
                    max_degree: segment.max_degree,
                });
            }
            if segment.amount == 0 {
                return Err(PrizeTableError::ZeroAmount { index });
            }
            intervals.extend(segment.intervals());
        }

        intervals.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut covered_to = 0.0;
        for (start, end) in intervals {
            if start > covered_to {
                return Err(PrizeTableError::Gap { at: covered_to });
            }
            if start < covered_to {
                return Err(PrizeTableError::Overlap { at: start });
            }
            covered_to = end;
        }
        if covered_to < FULL_CIRCLE {
            return Err(PrizeTableError::Gap { at: covered_to });
        }

        let fallback_amount = segments.iter().map(|s| s.amount).min().unwrap_or_default();
        Ok(Self { segments, fallback_amount })
    }

    pub fn with_fallback(mut self, amount: u32) -> Self {
        self.fallback_amount = amount;
        self
    }

    pub fn segments(&self) -> &[PrizeSegment] {
        &self.segments
    }

    pub fn fallback_amount(&self) -> u32 {
        self.fallback_amount
    }

    /// Returns the prize for the wheel resting at `angle_degrees`.
    ///
    /// Never fails: multi-revolution and negative angles are normalized first,
    /// and inputs that match nothing (NaN, infinities) pay the fallback amount.
    pub fn resolve_prize(&self, angle_degrees: f64) -> u32 {
        let normalized = normalize_angle(angle_degrees);
        let amount = self
            .segments
            .iter()
            .find(|segment| segment.contains(normalized))
            .map(|segment| segment.amount)
            .unwrap_or(self.fallback_amount);

        log::debug!(
            "Rotation: {}, Normalized: {}, Prize: {}",
            angle_degrees,
            normalized,
            amount
        );
        amount
    }

    /// Every configured amount, duplicates kept, highest first.
    pub fn list_prize_amounts(&self) -> Vec<u32> {
        let mut amounts: Vec<u32> = self.segments.iter().map(|s| s.amount).collect();
        amounts.sort_unstable_by(|a, b| b.cmp(a));
        amounts
    }

    /// Chance of landing on `amount` under a uniformly random angle.
    pub fn probability_of(&self, amount: u32) -> f64 {
        let width: f64 = self
            .segments
            .iter()
            .filter(|s| s.amount == amount)
            .map(PrizeSegment::width)
            .sum();
        width / FULL_CIRCLE
    }
}

impl Default for PrizeTable {
    /// Six 60 degree tiers, with the 100 tier split across the top of the wheel.
    fn default() -> Self {
        Self {
            segments: DEFAULT_SEGMENTS.to_vec(),
            fallback_amount: DEFAULT_FALLBACK_AMOUNT,
        }
    }
}

impl PrizeResolver for PrizeTable {
    fn resolve_prize(&self, angle_degrees: f64) -> u32 {
        PrizeTable::resolve_prize(self, angle_degrees)
    }
}

pub const DEFAULT_FALLBACK_AMOUNT: u32 = 100;

// Pointer at 12 o'clock, 0 degrees = top
pub const DEFAULT_SEGMENTS: [PrizeSegment; 7] = [
    PrizeSegment::new(330.0, 360.0, 100),
    PrizeSegment::new(0.0, 30.0, 100),
    PrizeSegment::new(30.0, 90.0, 500),
    PrizeSegment::new(90.0, 150.0, 200),
    PrizeSegment::new(150.0, 210.0, 20),
    PrizeSegment::new(210.0, 270.0, 50),
    PrizeSegment::new(270.0, 330.0, 300),
];
