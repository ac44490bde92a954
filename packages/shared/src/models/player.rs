use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PlayerId = String;

/// Immutable snapshot of a player taken when they join the queue.
/// The identity subsystem owns the real profile; the orchestrator never mutates this copy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    pub rating: i32,
    #[serde(default)]
    pub anonymous: bool,
}

impl Player {
    pub fn new(id: &str, display_name: &str, rating: i32) -> Self {
        Player {
            id: id.to_string(),
            display_name: display_name.to_string(),
            avatar_ref: None,
            rating,
            anonymous: false,
        }
    }

    /// Guest players are not known to the identity subsystem and start at the default rating.
    pub fn guest(id: Option<&str>, display_name: &str, avatar_ref: Option<String>, rating: i32) -> Self {
        Player {
            id: id
                .map(str::to_string)
                .unwrap_or_else(|| format!("guest-{}", Uuid::new_v4())),
            display_name: display_name.to_string(),
            avatar_ref,
            rating,
            anonymous: true,
        }
    }

    pub fn with_avatar(mut self, avatar_ref: &str) -> Self {
        self.avatar_ref = Some(avatar_ref.to_string());
        self
    }

    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            avatar_ref: self.avatar_ref.clone(),
            rating: self.rating,
        }
    }
}

/// What one player is allowed to see about the other.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PublicProfile {
    pub id: PlayerId,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    pub rating: i32,
}
