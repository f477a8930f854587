//! Review-thread triage: who owes the next move in each conversation.
//!
//! Pure functions over already-parsed thread data; safe to call from
//! anywhere, no I/O and no shared state.

use crate::types::{ReviewThread, ThreadComment};

/// Thread counts for one PR, summed across all qualifying threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadCounts {
    /// Threads requiring the acting user to respond or acknowledge.
    pub actionable: u32,
    /// Threads where the acting user spoke last and awaits the other party.
    pub waiting: u32,
}

fn user_reacted(comment: &ThreadComment, username: &str) -> bool {
    comment.reactors.iter().any(|r| r == username)
}

fn someone_else_reacted(comment: &ThreadComment, username: &str) -> bool {
    comment.reactors.iter().any(|r| r != username)
}

/// Classify a PR's review threads for the acting user.
///
/// Resolved, outdated, collapsed, and empty threads are skipped. For the
/// rest, the first matching rule wins per thread.
pub fn classify_threads(author: &str, username: &str, threads: &[ReviewThread]) -> ThreadCounts {
    let own_pr = author == username;
    let mut counts = ThreadCounts::default();

    for thread in threads {
        if thread.is_collapsed || thread.is_outdated || thread.is_resolved {
            continue;
        }

        // the API types allow comment-less threads; nothing to triage
        let (Some(first), Some(last)) = (thread.comments.first(), thread.comments.last()) else {
            continue;
        };

        let i_commented_last = last.author == username;
        let i_reacted_to_last = user_reacted(last, username);

        if own_pr && !i_commented_last && !i_reacted_to_last {
            // someone else has the last word on our pr and we haven't
            // acknowledged it with a reaction
            counts.actionable += 1;
            continue;
        }

        if own_pr && i_commented_last && someone_else_reacted(last, username) {
            // they reacted to our last comment; an acknowledgment is
            // outstanding from us even though we spoke last
            counts.actionable += 1;
            continue;
        }

        if !own_pr && i_commented_last {
            // we hold the last word; the owner should reply or resolve
            counts.waiting += 1;
            continue;
        }

        if first.author == username && !i_commented_last && !i_reacted_to_last {
            // we started the thread and someone else has the last word
            counts.actionable += 1;
            continue;
        }

        // remaining case: someone else started the thread, we commented
        // in the middle, and someone else holds the last word
    }

    counts
}
