//! Narrow interfaces onto services that live outside the room core.
//!
//! The core never fetches avatars or profiles itself. A session is handed a
//! [`Collaborators`] bundle and calls through it when it needs a display URL
//! or a name that the roster does not carry.

use std::collections::HashMap;
use std::sync::Arc;

/// Turns an opaque avatar reference into a URL the UI can display.
///
/// Implementations must be pure: the same reference always maps to the same URL.
pub trait AvatarResolver: Send + Sync + 'static {
    fn avatar_url(&self, avatar_ref: &str) -> String;
}

impl<F> AvatarResolver for F
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    fn avatar_url(&self, avatar_ref: &str) -> String {
        self(avatar_ref)
    }
}

/// Looks up a user's display name. Results may be stale.
pub trait ProfileLookup: Send + Sync + 'static {
    fn display_name(&self, user_id: &str) -> Option<String>;
}

impl ProfileLookup for HashMap<String, String> {
    fn display_name(&self, user_id: &str) -> Option<String> {
        self.get(user_id).cloned()
    }
}

/// Resolves `{base}/{avatar_ref}`, or `default_url` for an empty reference.
#[derive(Debug, Clone)]
pub struct AvatarUrlPrefix {
    base: String,
    default_url: String,
}

impl AvatarUrlPrefix {
    pub fn new(base: impl Into<String>, default_url: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_owned();
        Self {
            base,
            default_url: default_url.into(),
        }
    }
}

impl AvatarResolver for AvatarUrlPrefix {
    fn avatar_url(&self, avatar_ref: &str) -> String {
        if avatar_ref.is_empty() {
            self.default_url.clone()
        } else {
            format!("{}/{}", self.base, avatar_ref)
        }
    }
}

/// Knows nobody. Names then come from the roster alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProfiles;

impl ProfileLookup for NoProfiles {
    fn display_name(&self, _user_id: &str) -> Option<String> {
        None
    }
}

/// The external services a session consults.
#[derive(Clone)]
pub struct Collaborators {
    pub avatars: Arc<dyn AvatarResolver>,
    pub profiles: Arc<dyn ProfileLookup>,
}

impl Collaborators {
    pub fn new(avatars: impl AvatarResolver, profiles: impl ProfileLookup) -> Self {
        Self {
            avatars: Arc::new(avatars),
            profiles: Arc::new(profiles),
        }
    }

    #[must_use]
    pub fn with_avatars(mut self, avatars: impl AvatarResolver) -> Self {
        self.avatars = Arc::new(avatars);
        self
    }

    #[must_use]
    pub fn with_profiles(mut self, profiles: impl ProfileLookup) -> Self {
        self.profiles = Arc::new(profiles);
        self
    }
}

impl Default for Collaborators {
    /// Avatar references are passed through unchanged; no profiles.
    fn default() -> Self {
        Self::new(|avatar_ref: &str| avatar_ref.to_owned(), NoProfiles)
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn prefix_resolver_joins_and_falls_back() {
        let avatars = AvatarUrlPrefix::new(
            "https://cdn.example/avatars/",
            "https://cdn.example/default.png",
        );
        assert_eq!(avatars.avatar_url("fox"), "https://cdn.example/avatars/fox");
        assert_eq!(avatars.avatar_url(""), "https://cdn.example/default.png");
    }

    #[test]
    fn closures_and_maps_plug_in() {
        let profiles: HashMap<String, String> = [("u1".to_string(), "Ada".to_string())].into();
        let collaborators =
            Collaborators::new(|r: &str| format!("/img/{r}.png"), profiles);
        assert_eq!(collaborators.avatars.avatar_url("owl"), "/img/owl.png");
        assert_eq!(collaborators.profiles.display_name("u1").as_deref(), Some("Ada"));
        assert_eq!(collaborators.profiles.display_name("u2"), None);
    }

    #[test]
    fn default_passes_references_through() {
        let collaborators = Collaborators::default();
        assert_eq!(collaborators.avatars.avatar_url("cat"), "cat");
        assert!(collaborators.profiles.display_name("anyone").is_none());
    }
}
