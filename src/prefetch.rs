//! Prefetch planner — which panel indices to warm around the focus.
//!
//! Pure integer arithmetic; filtering against the cache and the pending
//! set happens in the controller.

/// Panels to warm on each side of the focus by default.
pub const DEFAULT_RADIUS: usize = 8;

/// Compute the ordered, de-duplicated window of neighbor indices around
/// `current`, excluding `current` itself.
///
/// Near a boundary the window does not shrink: radius that cannot be
/// spent on the clipped side is reallocated to the opposite side, so the
/// planner keeps warming the same number of panels at index 0 as in the
/// middle of the collection (`current = 0` with radius 8/8 yields
/// `1..=16`, not `1..=8`).
pub fn plan_window(current: usize, max_index: usize, behind: usize, ahead: usize) -> Vec<usize> {
    let mut behind = behind;
    let mut ahead = ahead;

    // Reallocate unusable radius to the opposite side
    if current < behind {
        ahead += behind - current;
        behind = current;
    } else if current + ahead > max_index {
        let overshoot = current + ahead - max_index;
        behind += overshoot;
        ahead -= overshoot;
    }

    let lo = current.saturating_sub(behind);
    let hi = (current + ahead).min(max_index);

    let mut window = Vec::with_capacity(hi.saturating_sub(lo) + 1);
    for i in lo..=hi {
        if i != current && !window.contains(&i) {
            window.push(i);
        }
    }
    window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_collection_window_is_symmetric() {
        let w = plan_window(50, 100, 8, 8);
        let expected: Vec<usize> = (42..=58).filter(|&i| i != 50).collect();
        assert_eq!(w, expected);
        assert_eq!(w.len(), 16);
    }

    #[test]
    fn window_stays_full_width_at_left_edge() {
        // At index 0 the unusable behind-radius is reallocated ahead: 1..=16
        let w = plan_window(0, 100, 8, 8);
        let expected: Vec<usize> = (1..=16).collect();
        assert_eq!(w, expected);
    }

    #[test]
    fn window_stays_full_width_at_right_edge() {
        let w = plan_window(100, 100, 8, 8);
        let expected: Vec<usize> = (84..=99).collect();
        assert_eq!(w, expected);
        assert_eq!(w.len(), 16);
    }

    #[test]
    fn partial_clip_reallocates() {
        // current=2: only 2 usable behind, the other 6 go ahead
        let w = plan_window(2, 100, 8, 8);
        let expected: Vec<usize> = (0..=16).filter(|&i| i != 2).collect();
        assert_eq!(w, expected);
    }

    #[test]
    fn collection_smaller_than_window() {
        let w = plan_window(1, 3, 8, 8);
        assert_eq!(w, vec![0, 2, 3]);
    }

    #[test]
    fn single_panel_collection() {
        assert!(plan_window(0, 0, 8, 8).is_empty());
    }

    #[test]
    fn excludes_current_and_stays_in_bounds() {
        for current in 0..=20 {
            let w = plan_window(current, 20, 8, 8);
            assert!(!w.contains(&current));
            assert!(w.iter().all(|&i| i <= 20));
            // De-duplicated
            let mut sorted = w.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), w.len());
        }
    }
}
