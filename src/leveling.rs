//! Level curve shared by text XP and voice minutes.
//!
//! A profile only ever stores its raw total; the level and the progress
//! toward the next one are re-derived from that total on every read.

/// Additional points needed to advance from `level` to `level + 1`.
pub fn threshold(level: u32) -> u64 {
    let level = u64::from(level);
    5 * level * level + 50 * level + 100
}

/// Level plus the computed-on-read progress fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelProgress {
    pub level: u32,
    /// Points earned since the last level boundary.
    pub progress: u64,
    /// Points still missing for the next level.
    pub to_next: u64,
}

/// Derive level and progress from a raw total.
///
/// Loops until the remainder fits under the current threshold, so a single
/// large adjustment crossing several boundaries still lands on the right
/// level.
pub fn progress_for(total: u64) -> LevelProgress {
    let mut level = 0u32;
    let mut remaining = total;
    while remaining >= threshold(level) {
        remaining -= threshold(level);
        level += 1;
    }
    LevelProgress {
        level,
        progress: remaining,
        to_next: threshold(level) - remaining,
    }
}

/// Level for a raw total.
pub fn level_for(total: u64) -> u32 {
    progress_for(total).level
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Total points needed to reach `level` starting from zero
    fn cumulative(level: u32) -> u64 {
        (0..level).map(threshold).sum()
    }

    #[test]
    fn test_first_threshold() {
        assert_eq!(threshold(0), 100);
        assert_eq!(threshold(1), 155);
        assert_eq!(threshold(2), 220);
    }

    #[test]
    fn test_fresh_profile_progress() {
        let p = progress_for(0);
        assert_eq!(p.level, 0);
        assert_eq!(p.progress, 0);
        assert_eq!(p.to_next, 100);
    }

    #[test]
    fn test_level_bounds_invariant() {
        for total in [0, 1, 99, 100, 101, 254, 255, 256, 1000, 48_000, 1_000_000] {
            let level = level_for(total);
            assert!(cumulative(level) <= total, "total {}", total);
            assert!(total < cumulative(level + 1), "total {}", total);
        }
    }

    #[test]
    fn test_single_boundary_crossing() {
        assert_eq!(level_for(99), 0);
        assert_eq!(level_for(100), 1);
        let p = progress_for(100);
        assert_eq!(p.progress, 0);
        assert_eq!(p.to_next, 155);
    }

    #[test]
    fn test_multi_boundary_crossing() {
        // 100 + 155 + 220 = 475 points reaches exactly level 3
        assert_eq!(cumulative(3), 475);
        assert_eq!(level_for(474), 2);
        assert_eq!(level_for(475), 3);
        // A large jump derives in one call
        let p = progress_for(480);
        assert_eq!(p.level, 3);
        assert_eq!(p.progress, 5);
        assert_eq!(p.to_next, threshold(3) - 5);
    }
}
