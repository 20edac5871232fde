//! Guest grade ladder. Tier is a pure function of the lifetime buy-point sum.

use super::entities::Grade;

/// Ascending thresholds: lifetime buy points required to hold each tier.
const LADDER: [(Grade, i64); 7] = [
    (Grade::Centurion, 10_000_000),
    (Grade::Platinum, 3_000_000),
    (Grade::Gold, 1_000_000),
    (Grade::Silver, 500_000),
    (Grade::Bronze, 300_000),
    (Grade::Orange, 100_000),
    (Grade::Green, 0),
];

/// A guest can jump multiple tiers in one evaluation; there is no forced
/// single-step progression.
pub fn grade_for_points(total_buy_points: i64) -> Grade {
    for (grade, threshold) in LADDER {
        if total_buy_points >= threshold {
            return grade;
        }
    }
    Grade::Green
}
