use tracing::warn;

use crate::types::ApiError;

/// The outcome of an ownership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

impl Access {
    pub fn require(self) -> Result<(), ApiError> {
        match self {
            Access::Allow => Ok(()),
            Access::Deny => Err(ApiError::Forbidden),
        }
    }
}

/// Anything whose mutation is restricted to a single author.
pub trait Owned {
    /// The `article_users` id of the author.
    fn owner_id(&self) -> i32;

    fn describe(&self) -> String;
}

/// Participants are compared by their `article_users` id.
pub trait Participant {
    fn participant_id(&self) -> i32;
}

pub fn authorize<P: Participant, T: Owned>(requester: &P, target: &T) -> Access {
    if requester.participant_id() == target.owner_id() {
        Access::Allow
    } else {
        warn!(
            requester = requester.participant_id(),
            owner = target.owner_id(),
            "denied mutation of {}",
            target.describe()
        );
        Access::Deny
    }
}
