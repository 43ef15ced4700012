//! Listing visibility predicate.
//!
//! A [`NoteFilter`] is chosen once per listing from the caller and the
//! optional owner filter, then evaluated either in memory ([`NoteFilter::matches`])
//! or rendered to SQL by the Postgres repository. In every branch the expiry
//! check applies to the whole visibility rule.

use quill_core::{Note, Timestamp, UserId, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteFilter {
    /// Every note owned by `owner`, whatever its visibility.
    OwnedBy { owner: UserId },
    /// Only the public notes owned by `owner`.
    PublicOwnedBy { owner: UserId },
    /// Public notes, notes owned by `user`, and notes granted to `user`.
    VisibleTo { user: UserId },
    /// Public notes only.
    PublicOnly,
}

impl NoteFilter {
    /// Pick the visibility rule for a listing, in priority order:
    /// own listing, someone else's listing, authenticated, anonymous.
    pub fn for_caller(caller: Option<UserId>, filter_by_user_id: Option<UserId>) -> Self {
        match (filter_by_user_id, caller) {
            (Some(owner), Some(caller)) if owner == caller => NoteFilter::OwnedBy { owner },
            (Some(owner), _) => NoteFilter::PublicOwnedBy { owner },
            (None, Some(user)) => NoteFilter::VisibleTo { user },
            (None, None) => NoteFilter::PublicOnly,
        }
    }

    /// Evaluate the predicate for one note. `granted` says whether the
    /// filter's user holds an access grant on it.
    pub fn matches(&self, note: &Note, granted: bool, now: Timestamp) -> bool {
        if note.is_expired_at(now) {
            return false;
        }
        let public = note.visibility == Visibility::Public;
        match *self {
            NoteFilter::OwnedBy { owner } => note.is_owned_by(owner),
            NoteFilter::PublicOwnedBy { owner } => note.is_owned_by(owner) && public,
            NoteFilter::VisibleTo { user } => public || note.is_owned_by(user) || granted,
            NoteFilter::PublicOnly => public,
        }
    }

    /// User whose grants participate in the predicate, if any.
    pub fn grantee(&self) -> Option<UserId> {
        match *self {
            NoteFilter::VisibleTo { user } => Some(user),
            _ => None,
        }
    }
}
