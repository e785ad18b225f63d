// src/poll.rs
//
// Pure state-transition logic for a single poll. No I/O happens here, so
// every transition is deterministic given its inputs.
use std::collections::BTreeSet;

use uuid::Uuid;

use crate::error::SyncError;
use crate::models::{ActorId, Poll, PollOption};

pub const MIN_OPTIONS: usize = 2;

/// Validate inputs and build a fresh poll with empty voter sets.
pub fn create(question: &str, options: &[String], creator: &ActorId) -> Result<Poll, SyncError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(SyncError::InvalidInput(
            "poll question must not be empty".into(),
        ));
    }
    if creator.is_blank() {
        return Err(SyncError::InvalidInput(
            "poll creator must not be empty".into(),
        ));
    }
    if options.len() < MIN_OPTIONS {
        return Err(SyncError::InvalidInput(format!(
            "a poll needs at least {MIN_OPTIONS} options"
        )));
    }
    let mut built = Vec::with_capacity(options.len());
    for text in options {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::InvalidInput(
                "poll options must not be empty".into(),
            ));
        }
        built.push(PollOption {
            text: text.to_string(),
            voters: BTreeSet::new(),
        });
    }
    Ok(Poll {
        id: Uuid::new_v4().to_string(),
        question: question.to_string(),
        options: built,
        created_by: creator.clone(),
        version: 0,
    })
}

/// Apply a vote. Returns whether the poll changed; re-voting the same
/// option is a no-op and leaves the version untouched, so a duplicated or
/// retried request can never double-count.
pub fn vote(poll: &mut Poll, option_index: usize, actor: &ActorId) -> Result<bool, SyncError> {
    check_index(poll, option_index)?;
    if actor.is_blank() {
        return Err(SyncError::InvalidInput("voter must not be empty".into()));
    }
    if poll.options[option_index].voters.contains(actor) {
        return Ok(false);
    }
    // Single-choice semantics: moving to a new option drops any prior vote
    // in the same transition.
    for option in &mut poll.options {
        option.voters.remove(actor);
    }
    poll.options[option_index].voters.insert(actor.clone());
    poll.version += 1;
    Ok(true)
}

/// Withdraw a vote. Idempotent no-op if the actor is not a voter of the
/// given option.
pub fn unvote(poll: &mut Poll, option_index: usize, actor: &ActorId) -> Result<bool, SyncError> {
    check_index(poll, option_index)?;
    if poll.options[option_index].voters.remove(actor) {
        poll.version += 1;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Only the creator may remove a poll. The administrative override lives
/// with the authority, not here.
pub fn authorize_removal(poll: &Poll, requester: &ActorId) -> Result<(), SyncError> {
    if &poll.created_by == requester {
        Ok(())
    } else {
        Err(SyncError::Unauthorized)
    }
}

pub fn total_votes(poll: &Poll) -> usize {
    poll.options.iter().map(PollOption::votes).sum()
}

/// Share of the total vote, rounded. Zero when nobody has voted yet.
pub fn percentage(poll: &Poll, option_index: usize) -> u32 {
    let total = total_votes(poll);
    if total == 0 {
        return 0;
    }
    let votes = poll.options.get(option_index).map_or(0, PollOption::votes);
    ((votes as f64 / total as f64) * 100.0).round() as u32
}

fn check_index(poll: &Poll, option_index: usize) -> Result<(), SyncError> {
    if option_index >= poll.options.len() {
        return Err(SyncError::OutOfRange {
            index: option_index,
            len: poll.options.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(name: &str) -> ActorId {
        ActorId(name.to_string())
    }

    fn tea_or_coffee() -> Poll {
        create(
            "Tea or coffee?",
            &["Tea".to_string(), "Coffee".to_string()],
            &actor("alice"),
        )
        .unwrap()
    }

    #[test]
    fn create_rejects_bad_input() {
        let opts = vec!["Tea".to_string(), "Coffee".to_string()];
        assert!(matches!(
            create("   ", &opts, &actor("alice")),
            Err(SyncError::InvalidInput(_))
        ));
        assert!(matches!(
            create("Tea or coffee?", &["Tea".to_string()], &actor("alice")),
            Err(SyncError::InvalidInput(_))
        ));
        assert!(matches!(
            create(
                "Tea or coffee?",
                &["Tea".to_string(), "  ".to_string()],
                &actor("alice")
            ),
            Err(SyncError::InvalidInput(_))
        ));
        assert!(matches!(
            create("Tea or coffee?", &opts, &actor("  ")),
            Err(SyncError::InvalidInput(_))
        ));
    }

    #[test]
    fn create_trims_and_starts_at_version_zero() {
        let poll = create(
            "  Tea or coffee?  ",
            &[" Tea ".to_string(), "Coffee".to_string()],
            &actor("alice"),
        )
        .unwrap();
        assert_eq!(poll.question, "Tea or coffee?");
        assert_eq!(poll.options[0].text, "Tea");
        assert_eq!(poll.version, 0);
        assert!(poll.options.iter().all(|o| o.voters.is_empty()));
    }

    #[test]
    fn vote_is_idempotent() {
        let mut poll = tea_or_coffee();
        assert!(vote(&mut poll, 0, &actor("bob")).unwrap());
        let after_first = poll.clone();
        assert!(!vote(&mut poll, 0, &actor("bob")).unwrap());
        assert_eq!(poll, after_first);
        assert_eq!(poll.version, 1);
    }

    #[test]
    fn vote_moves_between_options() {
        let mut poll = tea_or_coffee();
        vote(&mut poll, 0, &actor("bob")).unwrap();
        vote(&mut poll, 1, &actor("bob")).unwrap();
        assert!(poll.options[0].voters.is_empty());
        assert!(poll.options[1].voters.contains(&actor("bob")));
        assert_eq!(total_votes(&poll), 1);
        assert_eq!(percentage(&poll, 1), 100);
        assert_eq!(poll.version, 2);
    }

    #[test]
    fn vote_rejects_out_of_range() {
        let mut poll = tea_or_coffee();
        assert_eq!(
            vote(&mut poll, 2, &actor("bob")),
            Err(SyncError::OutOfRange { index: 2, len: 2 })
        );
        assert_eq!(poll.version, 0);
    }

    #[test]
    fn unvote_inverts_a_fresh_vote() {
        let before = tea_or_coffee();
        let mut poll = before.clone();
        vote(&mut poll, 0, &actor("bob")).unwrap();
        unvote(&mut poll, 0, &actor("bob")).unwrap();
        assert_eq!(poll.options, before.options);
        assert_eq!(poll.version, 2);
    }

    #[test]
    fn unvote_by_a_stranger_is_a_no_op() {
        let mut poll = tea_or_coffee();
        assert!(!unvote(&mut poll, 0, &actor("mallory")).unwrap());
        assert_eq!(poll.version, 0);
    }

    #[test]
    fn percentage_is_zero_without_votes() {
        let poll = tea_or_coffee();
        assert_eq!(percentage(&poll, 0), 0);
        assert_eq!(percentage(&poll, 1), 0);
    }

    #[test]
    fn percentage_rounds() {
        let mut poll = create(
            "Pick one",
            &["a".to_string(), "b".to_string(), "c".to_string()],
            &actor("alice"),
        )
        .unwrap();
        vote(&mut poll, 0, &actor("u1")).unwrap();
        vote(&mut poll, 0, &actor("u2")).unwrap();
        vote(&mut poll, 1, &actor("u3")).unwrap();
        assert_eq!(percentage(&poll, 0), 67);
        assert_eq!(percentage(&poll, 1), 33);
        assert_eq!(percentage(&poll, 2), 0);
    }

    #[test]
    fn removal_is_creator_only() {
        let poll = tea_or_coffee();
        let before = poll.clone();
        assert_eq!(
            authorize_removal(&poll, &actor("bob")),
            Err(SyncError::Unauthorized)
        );
        assert_eq!(poll, before);
        assert!(authorize_removal(&poll, &actor("alice")).is_ok());
    }
}
