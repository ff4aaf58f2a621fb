//! Choosing the one circle to measure.

use std::cmp::Ordering;

use volumetra_types::CircleCandidate;

/// Total order over candidates, greatest = preferred.
///
/// Higher `score` wins; ties go to more center votes, then to the smaller
/// radius (a concentric outer ring is more often a rim or shadow than the
/// object itself).
pub fn rank(a: &CircleCandidate, b: &CircleCandidate) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then(a.votes.cmp(&b.votes))
        .then(b.radius_px.total_cmp(&a.radius_px))
}

/// The best candidate under [`rank`], or `None` when there are none.
///
/// When several candidates compare equal the first one seen is kept, so the
/// result is deterministic for a given detector output.
pub fn select(candidates: impl IntoIterator<Item = CircleCandidate>) -> Option<CircleCandidate> {
    candidates.into_iter().reduce(|best, next| {
        if rank(&next, &best) == Ordering::Greater {
            next
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn candidate(radius_px: f64, score: f64, votes: u32) -> CircleCandidate {
        CircleCandidate {
            center_x: 100.0,
            center_y: 100.0,
            radius_px,
            score,
            votes,
        }
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert_eq!(select(Vec::new()), None);
    }

    #[test]
    fn highest_score_wins_regardless_of_size() {
        let chosen = select(vec![candidate(40.0, 0.9, 80), candidate(30.0, 0.95, 60)]).unwrap();
        assert_eq!(chosen.radius_px, 30.0);
    }

    #[test]
    fn equal_scores_prefer_more_votes() {
        let chosen = select(vec![candidate(30.0, 0.8, 40), candidate(50.0, 0.8, 90)]).unwrap();
        assert_eq!(chosen.votes, 90);
    }

    #[test]
    fn full_tie_prefers_smaller_radius() {
        let chosen = select(vec![candidate(50.0, 0.8, 40), candidate(35.0, 0.8, 40)]).unwrap();
        assert_eq!(chosen.radius_px, 35.0);
    }

    #[test]
    fn identical_candidates_keep_first() {
        let mut first = candidate(30.0, 0.7, 50);
        first.center_x = 1.0;
        let mut second = first;
        second.center_x = 2.0;
        assert_eq!(select(vec![first, second]).unwrap().center_x, 1.0);
    }

    fn arb_candidate() -> impl Strategy<Value = CircleCandidate> {
        (1.0f64..300.0, 0.0f64..=1.0, 0u32..500).prop_map(|(r, s, v)| candidate(r, s, v))
    }

    proptest! {
        #[test]
        fn selected_candidate_is_maximal(cands in prop::collection::vec(arb_candidate(), 1..20)) {
            let chosen = select(cands.clone()).unwrap();
            prop_assert!(cands.contains(&chosen));
            for c in &cands {
                prop_assert!(rank(&chosen, c) != Ordering::Less);
                prop_assert!(chosen.score >= c.score);
            }
        }
    }
}
