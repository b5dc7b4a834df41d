//! Runtime configuration for workflows and read views.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration shared by [`Workflows`](crate::Workflows) and
/// [`ReadViews`](crate::ReadViews).
///
/// All fields have defaults matching the backend layout the app was built
/// against, so partial configuration files deserialize cleanly.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use meetup_sync::SyncConfig;
///
/// let config = SyncConfig {
///     request_timeout: Some(Duration::from_secs(10)),
///     ..SyncConfig::default()
/// };
/// assert_eq!(config.meetups_path, "meetups");
/// assert_eq!(config.featured_count, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Collection holding meetup documents. Also the blob prefix for images.
    ///
    /// Default: `"meetups"`.
    pub meetups_path: String,

    /// Collection holding per-user data (`<users_path>/<uid>/registrations`).
    ///
    /// Default: `"users"`.
    pub users_path: String,

    /// How many meetups [`ReadViews::featured`](crate::ReadViews::featured) returns.
    ///
    /// Default: 5.
    pub featured_count: usize,

    /// Upper bound on each individual remote call.
    ///
    /// `None` waits indefinitely, in which case a call that never resolves
    /// keeps `loading` set until its future is dropped.
    ///
    /// Default: `None`.
    pub request_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            meetups_path: "meetups".to_owned(),
            users_path: "users".to_owned(),
            featured_count: 5,
            request_timeout: None,
        }
    }
}

impl SyncConfig {
    /// `<meetups_path>/<id>`
    pub fn meetup_path(&self, id: &str) -> String {
        format!("{}/{id}", self.meetups_path)
    }

    /// Blob path for a meetup image: `<meetups_path>/<id><extension>`.
    ///
    /// `extension` includes its leading dot, or is empty.
    pub fn image_path(&self, id: &str, extension: &str) -> String {
        format!("{}/{id}{extension}", self.meetups_path)
    }

    /// `<users_path>/<uid>/registrations`
    pub fn registrations_path(&self, uid: &str) -> String {
        format!("{}/{uid}/registrations", self.users_path)
    }

    /// `<users_path>/<uid>/registrations/<key>`
    pub fn registration_path(&self, uid: &str, key: &str) -> String {
        format!("{}/{key}", self.registrations_path(uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths() {
        let config = SyncConfig::default();
        assert_eq!(config.meetup_path("m1"), "meetups/m1");
        assert_eq!(config.image_path("m1", ".png"), "meetups/m1.png");
        assert_eq!(config.image_path("m1", ""), "meetups/m1");
        assert_eq!(config.registrations_path("u1"), "users/u1/registrations");
        assert_eq!(
            config.registration_path("u1", "k9"),
            "users/u1/registrations/k9"
        );
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{ "meetups_path": "events" }"#).expect("valid config");
        assert_eq!(config.meetups_path, "events");
        assert_eq!(config.users_path, "users");
        assert_eq!(config.featured_count, 5);
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.meetup_path("e1"), "events/e1");
    }

    #[test]
    fn timeout_roundtrips_through_json() {
        let config = SyncConfig {
            request_timeout: Some(Duration::from_millis(1500)),
            ..SyncConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SyncConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
