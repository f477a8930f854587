//! Urgency scoring for tracked PRs.
//!
//! Scores are computed on every read from the stored records, never
//! cached. The rules are deliberately simple integer bumps so the
//! resulting ranking stays explainable: every rule that fires appends a
//! sign-prefixed reason string.

use chrono::{DateTime, Duration, Utc};

use crate::types::{TrackedPr, zero_time};

/// A PR's total score plus the rendered reasons behind it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Score {
    pub total: i64,
    pub reasons: Vec<String>,
}

impl Score {
    fn new() -> Self {
        Self { total: 0, reasons: Vec::new() }
    }

    fn add(&mut self, points: i64, reason: impl AsRef<str>) {
        self.total += points;
        self.reasons.push(format!("+{}: {}", points, reason.as_ref()));
    }

    fn remove(&mut self, points: i64, reason: impl AsRef<str>) {
        self.total -= points;
        self.reasons.push(format!("-{}: {}", points, reason.as_ref()));
    }
}

/// Score a PR for the acting user at the given instant.
///
/// These rules should be revisited often, and the points tweaked.
///
/// # Panics
///
/// Panics when `now` is the zero/unset timestamp. An unset clock is a
/// caller bug, not bad remote data, and must not produce a silently
/// wrong stale-PR assessment.
pub fn score_pr(pr: &TrackedPr, username: &str, now: DateTime<Utc>) -> Score {
    assert!(
        now != zero_time(),
        "score_pr() requires a real clock reading, got the zero timestamp"
    );

    let mut score = Score::new();

    if pr.author == username {
        // our pr
        if pr.review_status == "APPROVED" {
            score.add(100, "Own PR is approved, should be a simple merge");
        }

        if pr.review_status == "CHANGES_REQUESTED" {
            score.add(50, "Someone wants you to change something");
        }

        if !pr.last_pr_commenter.is_empty() && pr.last_pr_commenter != username {
            // someone might have asked us something
            score.add(10, format!("Someone else commented last ({})", pr.last_pr_commenter));
        }

        if pr.is_draft {
            score.remove(10, "PR is my draft");
        }

        if pr.review_requested_from.is_empty() {
            score.add(10, "You should add reviewers");
        }

        if pr.last_updated < now - Duration::days(14) {
            score.add(11, "Your PR has not been updated in a while, you should take actions");
        }
    } else {
        // someone else's pr, or ours but the username is not set
        if pr.review_status == "APPROVED" {
            score.remove(100, "PR is someone else's and is approved");
        }

        if pr.review_status == "CHANGES_REQUESTED" {
            score.remove(100, "Changes are already requested");
        }

        if pr.is_draft {
            if pr.last_updated < now - Duration::days(5) {
                score.remove(70, "PR is someone else's old draft");
            } else {
                score.remove(10, "PR is someone else's draft");
            }
        }

        // reward short prs
        let diff = pr.additions.abs() + pr.deletions.abs();
        if diff < 50 {
            score.add(50, format!("PR is small, {diff} loc changed is <50"));
        } else if diff < 150 {
            score.add(30, format!("PR is smallish, {diff} loc changed is <150"));
        } else if diff <= 300 {
            score.add(20, format!("PR is bigger, {diff} loc changed is <=300"));
        } else {
            score.add(10, format!("PR is bigish, {diff} loc changed is >300"));
        }
    }

    if pr.threads_actionable > 0 {
        // flat bonus, not scaled by thread count
        score.add(
            80,
            format!(
                "Someone asked us something, or reacted to our comment ({} comments)",
                pr.threads_actionable
            ),
        );
    }

    if pr.threads_waiting > 0 {
        score.remove(
            10,
            format!("Someone should respond to our comments ({} comments)", pr.threads_waiting),
        );
    }

    // The "+N: " prefix sorts before "-N: ", so additions render first.
    score.reasons.sort();

    if pr.buried {
        // applied after the sort; the bury reason always renders last
        score.remove(1000, "PR is buried");
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own_pr() -> TrackedPr {
        TrackedPr {
            url: "https://github.com/acme/api/pull/1".to_string(),
            author: "currentUser".to_string(),
            last_updated: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn new_prs_hint_about_adding_reviewers() {
        let pr = own_pr();
        assert_eq!(score_pr(&pr, "currentUser", Utc::now()).total, 10);
    }

    #[test]
    fn inactive_prs_score_zero_before_any_interaction() {
        let pr = TrackedPr {
            review_requested_from: vec!["otherUser".to_string()],
            ..own_pr()
        };
        assert_eq!(score_pr(&pr, "currentUser", Utc::now()).total, 0);
    }

    #[test]
    fn inactive_prs_are_bumped_after_a_while() {
        let now = Utc::now();
        let pr = TrackedPr {
            last_updated: now - Duration::days(15),
            review_requested_from: vec!["otherUser".to_string()],
            ..own_pr()
        };
        assert_eq!(score_pr(&pr, "currentUser", now).total, 11);
    }

    #[test]
    fn approved_own_pr_scores_a_clean_hundred() {
        let pr = TrackedPr {
            review_status: "APPROVED".to_string(),
            review_requested_from: vec!["otherUser".to_string()],
            ..own_pr()
        };
        assert_eq!(score_pr(&pr, "currentUser", Utc::now()).total, 100);
    }

    #[test]
    fn lower_loc_never_scores_strictly_lower() {
        // all else equal: fewer changed lines must never rank below more
        let sizes = [(2, 3), (30, 19), (70, 60), (200, 90), (400, 150)];
        for own in [false, true] {
            let author = if own { "currentUser" } else { "author" };
            let totals: Vec<i64> = sizes
                .iter()
                .map(|&(a, d)| {
                    let pr = TrackedPr {
                        author: author.to_string(),
                        additions: a,
                        deletions: d,
                        last_updated: Utc::now(),
                        ..Default::default()
                    };
                    score_pr(&pr, "currentUser", Utc::now()).total
                })
                .collect();
            for pair in totals.windows(2) {
                assert!(pair[0] >= pair[1], "smaller PR outranked by larger: {totals:?}");
            }
        }
    }

    #[test]
    fn actionable_threads_add_a_flat_bonus() {
        let base = TrackedPr {
            author: "author".to_string(),
            last_updated: Utc::now(),
            ..Default::default()
        };
        let one = TrackedPr { threads_actionable: 1, ..base.clone() };
        let five = TrackedPr { threads_actionable: 5, ..base.clone() };
        let none = score_pr(&base, "currentUser", Utc::now()).total;
        assert_eq!(score_pr(&one, "currentUser", Utc::now()).total, none + 80);
        // not scaled by count
        assert_eq!(
            score_pr(&five, "currentUser", Utc::now()).total,
            score_pr(&one, "currentUser", Utc::now()).total
        );
    }

    #[test]
    fn waiting_threads_subtract_a_flat_ten() {
        let pr = TrackedPr {
            author: "author".to_string(),
            additions: 10,
            threads_waiting: 3,
            last_updated: Utc::now(),
            ..Default::default()
        };
        assert_eq!(score_pr(&pr, "currentUser", Utc::now()).total, 50 - 10);
    }

    #[test]
    fn buried_pr_sinks_by_a_thousand_and_reason_renders_last() {
        let pr = TrackedPr {
            review_status: "APPROVED".to_string(),
            review_requested_from: vec!["otherUser".to_string()],
            buried: true,
            ..own_pr()
        };
        let score = score_pr(&pr, "currentUser", Utc::now());
        assert_eq!(score.total, 100 - 1000);
        assert_eq!(score.reasons.last().unwrap(), "-1000: PR is buried");
    }

    #[test]
    fn reasons_sort_additions_before_subtractions() {
        let pr = TrackedPr {
            review_status: "APPROVED".to_string(),
            is_draft: true,
            ..own_pr()
        };
        let score = score_pr(&pr, "currentUser", Utc::now());
        let first_minus = score.reasons.iter().position(|r| r.starts_with('-')).unwrap();
        assert!(score.reasons[..first_minus].iter().all(|r| r.starts_with('+')));
        assert!(score.reasons[first_minus..].iter().all(|r| r.starts_with('-')));
    }

    #[test]
    fn someone_elses_stale_draft_sinks_further_than_a_fresh_one() {
        let now = Utc::now();
        let fresh = TrackedPr {
            author: "author".to_string(),
            is_draft: true,
            last_updated: now,
            ..Default::default()
        };
        let stale = TrackedPr {
            last_updated: now - Duration::days(6),
            ..fresh.clone()
        };
        let fresh_score = score_pr(&fresh, "currentUser", now).total;
        let stale_score = score_pr(&stale, "currentUser", now).total;
        assert_eq!(fresh_score, 50 - 10);
        assert_eq!(stale_score, 50 - 70);
    }

    #[test]
    #[should_panic(expected = "real clock reading")]
    fn zero_now_is_a_caller_bug() {
        score_pr(&own_pr(), "currentUser", zero_time());
    }
}
