//! Domain types: meetups, users, and the request payloads that create or
//! change them.
//!
//! No I/O occurs here. Conversion to and from the remote record shape lives
//! next to the types so the workflows never touch raw JSON keys directly.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Format a timestamp the way meetup dates are stored remotely.
///
/// Produces RFC 3339 with millisecond precision and a `Z` suffix,
/// e.g. `2024-01-01T00:00:00.000Z`.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A meetup held in the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meetup {
    /// Key assigned by the remote document store.
    pub id: String,
    pub title: String,
    pub location: String,
    pub description: String,
    /// Durable URL of the uploaded image. `None` until the upload completes.
    #[serde(rename = "imageURL")]
    pub image_url: Option<String>,
    /// ISO-8601 date string.
    pub date: String,
    /// Id of the user who created the meetup.
    pub creator_id: String,
}

impl Meetup {
    /// Build a meetup from its remote key and stored record.
    pub fn from_record(id: impl Into<String>, record: MeetupRecord) -> Self {
        Self {
            id: id.into(),
            title: record.title,
            location: record.location,
            description: record.description,
            image_url: record.image_url,
            date: record.date,
            creator_id: record.creator_id,
        }
    }

    /// Parse [`date`](Meetup::date) as RFC 3339.
    ///
    /// Returns `None` for dates that do not parse; such meetups sort last.
    pub fn parsed_date(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.date)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }

    /// Overwrite the fields present in `patch`.
    ///
    /// Absent fields and empty strings leave the current value unchanged.
    pub fn apply_patch(&mut self, patch: &MeetupPatch) {
        if let Some(title) = non_empty(&patch.title) {
            self.title = title.to_owned();
        }
        if let Some(location) = non_empty(&patch.location) {
            self.location = location.to_owned();
        }
        if let Some(description) = non_empty(&patch.description) {
            self.description = description.to_owned();
        }
        if let Some(date) = &patch.date {
            self.date = format_date(date);
        }
    }
}

/// Remote document shape of a meetup (everything except its key).
///
/// Missing string fields decode as empty strings so a partially written
/// record (e.g. one whose image upload never finished) still loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeetupRecord {
    pub title: String,
    pub location: String,
    pub description: String,
    #[serde(rename = "imageURL", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub date: String,
    pub creator_id: String,
}

/// Image payload attached to a new meetup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    /// Original file name; only its extension is kept for the storage path.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Image payload from its original file name and raw bytes.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Everything from the last dot of the file name, or `""` if there is
    /// no dot. A dotfile such as `.png` keeps its whole name.
    ///
    /// # Examples
    ///
    /// ```
    /// use meetup_sync::ImageUpload;
    ///
    /// assert_eq!(ImageUpload::new("photo.final.png", vec![]).extension(), ".png");
    /// assert_eq!(ImageUpload::new(".png", vec![]).extension(), ".png");
    /// assert_eq!(ImageUpload::new("README", vec![]).extension(), "");
    /// ```
    pub fn extension(&self) -> String {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| format!(".{ext}"))
            .unwrap_or_default()
    }
}

/// Everything needed to create a meetup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetupDraft {
    pub title: String,
    pub location: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub image: ImageUpload,
    /// Creator override. When `None`, the signed-in user is the creator.
    pub creator_id: Option<String>,
}

impl MeetupDraft {
    /// Remote record for this draft, without an image URL.
    pub(crate) fn to_record(&self, creator_id: &str) -> MeetupRecord {
        MeetupRecord {
            title: self.title.clone(),
            location: self.location.clone(),
            description: self.description.clone(),
            image_url: None,
            date: format_date(&self.date),
            creator_id: creator_id.to_owned(),
        }
    }
}

/// Partial update of a meetup.
///
/// `None` and empty strings mean "keep the current value".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetupPatch {
    pub title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl MeetupPatch {
    /// Patch that only changes the title.
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Remote fields to write: only the ones that carry a value.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(title) = non_empty(&self.title) {
            fields.insert("title".to_owned(), Value::from(title));
        }
        if let Some(location) = non_empty(&self.location) {
            fields.insert("location".to_owned(), Value::from(location));
        }
        if let Some(description) = non_empty(&self.description) {
            fields.insert("description".to_owned(), Value::from(description));
        }
        if let Some(date) = &self.date {
            fields.insert("date".to_owned(), Value::from(format_date(date)));
        }
        fields
    }

    /// Returns `true` if applying this patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.to_fields().is_empty()
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// The signed-in user and their meetup registrations.
///
/// `registration_keys` maps a meetup id to the remote key of the
/// registration record, which is needed to delete it later. Its key set is
/// always a subset of `registered_meetups`; the fields are private so the
/// two can only change together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    registered_meetups: BTreeSet<String>,
    registration_keys: BTreeMap<String, String>,
}

impl User {
    /// A user with no registrations.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Rebuild a user from `(registration_key, meetup_id)` pairs.
    ///
    /// If a meetup was registered more than once, the last key wins.
    pub fn from_registrations<I, K, M>(id: impl Into<String>, registrations: I) -> Self
    where
        I: IntoIterator<Item = (K, M)>,
        K: Into<String>,
        M: Into<String>,
    {
        let mut user = Self::new(id);
        for (key, meetup_id) in registrations {
            let meetup_id = meetup_id.into();
            user.registered_meetups.insert(meetup_id.clone());
            user.registration_keys.insert(meetup_id, key.into());
        }
        user
    }

    /// Ids of every meetup the user is registered for.
    pub fn registered_meetups(&self) -> &BTreeSet<String> {
        &self.registered_meetups
    }

    /// Whether the user is registered for `meetup_id`.
    pub fn is_registered(&self, meetup_id: &str) -> bool {
        self.registered_meetups.contains(meetup_id)
    }

    /// Remote key of the registration for `meetup_id`, if known.
    pub fn registration_key(&self, meetup_id: &str) -> Option<&str> {
        self.registration_keys.get(meetup_id).map(String::as_str)
    }

    /// Iterate `(meetup_id, registration_key)` pairs.
    pub fn registration_keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.registration_keys
            .iter()
            .map(|(m, k)| (m.as_str(), k.as_str()))
    }

    /// Record a registration. Returns `false` (and changes nothing) if the
    /// meetup is already registered.
    pub(crate) fn register(&mut self, meetup_id: &str, registration_key: &str) -> bool {
        if self.registered_meetups.contains(meetup_id) {
            return false;
        }
        self.registered_meetups.insert(meetup_id.to_owned());
        self.registration_keys
            .insert(meetup_id.to_owned(), registration_key.to_owned());
        true
    }

    /// Drop a registration. Returns `false` if it was not present.
    pub(crate) fn unregister(&mut self, meetup_id: &str) -> bool {
        self.registration_keys.remove(meetup_id);
        self.registered_meetups.remove(meetup_id)
    }
}

/// Email/password pair handed to the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Credentials from an email address and password.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

// Keep passwords out of logs and panic messages.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Which identity provider verb [`authenticate`](crate::Workflows::authenticate) calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Create a new account.
    SignUp,
    /// Sign in to an existing account.
    SignIn,
}
