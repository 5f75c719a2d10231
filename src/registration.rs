use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use crate::i18n::{Language, TranslationKey, t};

/// One of the four enrollment tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Participant,
    Exhibitor,
    Speaker,
    Television,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Participant,
        Category::Exhibitor,
        Category::Speaker,
        Category::Television,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Participant => "participant",
            Category::Exhibitor => "exhibitor",
            Category::Speaker => "speaker",
            Category::Television => "television",
        }
    }

    /// Translated label, as shown in the dashboard and the export
    pub fn label(self, language: Language) -> &'static str {
        let key = match self {
            Category::Participant => TranslationKey::CategoryParticipant,
            Category::Exhibitor => TranslationKey::CategoryExhibitor,
            Category::Speaker => TranslationKey::CategorySpeaker,
            Category::Television => TranslationKey::CategoryTelevision,
        };
        t(key, language)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review status of a registration.
///
/// Transitions are not guarded: an administrator may move a registration to
/// any status at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    #[default]
    Pending,
    Confirmed,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Rejected => "rejected",
        }
    }

    pub fn label(self, language: Language) -> &'static str {
        let key = match self {
            RegistrationStatus::Pending => TranslationKey::Pending,
            RegistrationStatus::Confirmed => TranslationKey::Confirmed,
            RegistrationStatus::Rejected => TranslationKey::Rejected,
        };
        t(key, language)
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(RegistrationStatus::Pending),
            "confirmed" => Ok(RegistrationStatus::Confirmed),
            "rejected" => Ok(RegistrationStatus::Rejected),
            other => Err(format!("Unknown status: {}", other)),
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored registration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// `{unix-millis}-{7 random base36 chars}`, never changes after creation
    pub id: String,

    pub full_name: String,

    pub email: String,

    #[serde(default)]
    pub national_id: String,

    #[serde(default)]
    pub phone: String,

    #[serde(default)]
    pub category: Category,

    #[serde(default)]
    pub status: RegistrationStatus,

    pub submission_date: DateTime<Utc>,

    #[serde(default)]
    pub attachment_names: Vec<String>,

    /// Shareable link to the cloud folder holding the attachments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_drive_folder_url: Option<String>,
}

impl Registration {
    /// Build a pending registration from a validated form.
    pub fn from_form(
        form: &RegistrationForm,
        folder_url: Option<String>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Registration {
            id: new_registration_id(submitted_at),
            full_name: form.full_name.trim().to_string(),
            email: form.email.trim().to_string(),
            national_id: form.national_id.trim().to_string(),
            phone: form.phone.trim().to_string(),
            category: form.category,
            status: RegistrationStatus::Pending,
            submission_date: submitted_at,
            attachment_names: form.attachments.iter().map(|a| a.name.clone()).collect(),
            one_drive_folder_url: folder_url,
        }
    }
}

/// An in-memory file handed over by the registrant
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        let content_type = content_type.into();
        Attachment {
            name: name.into(),
            content_type: if content_type.is_empty() {
                "application/octet-stream".to_string()
            } else {
                content_type
            },
            data,
        }
    }
}

/// Transient form state, discarded once the submission is persisted
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub full_name: String,
    pub email: String,
    pub national_id: String,
    pub phone: String,
    pub category: Category,
    pub attachments: Vec<Attachment>,
}

impl RegistrationForm {
    /// Append files, skipping names that are already attached.
    pub fn add_attachments(&mut self, files: impl IntoIterator<Item = Attachment>) {
        let mut seen: HashSet<String> = self.attachments.iter().map(|a| a.name.clone()).collect();
        for file in files {
            if seen.insert(file.name.clone()) {
                self.attachments.push(file);
            }
        }
    }

    /// Presence check only: no email or phone format validation.
    ///
    /// # Arguments
    /// * `require_national_id` - Whether a blank national ID is rejected
    /// * `language` - Language of the error message
    ///
    /// # Returns
    /// * `AppResult<()>` - `Validation` with the "all fields" message when a
    ///   required field is blank or no file is attached
    pub fn validate(&self, require_national_id: bool, language: Language) -> AppResult<()> {
        let blank = |s: &str| s.trim().is_empty();

        let missing_field = blank(&self.full_name)
            || blank(&self.email)
            || blank(&self.phone)
            || (require_national_id && blank(&self.national_id));

        if missing_field || self.attachments.is_empty() {
            return Err(AppError::Validation(
                t(TranslationKey::ValidationErrorAllFields, language).to_string(),
            ));
        }

        Ok(())
    }
}

/// Fields the admin edit dialog may change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub category: Option<Category>,
    pub status: Option<RegistrationStatus>,
}

impl RegistrationPatch {
    pub fn status(status: RegistrationStatus) -> Self {
        RegistrationPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == RegistrationPatch::default()
    }

    /// Set one field from its JSON name, e.g. `("status", "confirmed")`.
    pub fn set(&mut self, field: &str, value: &str) -> Result<(), String> {
        match field {
            "fullName" => self.full_name = Some(value.to_string()),
            "email" => self.email = Some(value.to_string()),
            "nationalId" => self.national_id = Some(value.to_string()),
            "phone" => self.phone = Some(value.to_string()),
            "category" => self.category = Some(value.parse()?),
            "status" => self.status = Some(value.parse()?),
            other => return Err(format!("Field cannot be edited: {}", other)),
        }
        Ok(())
    }

    /// Overwrite the fields present in the patch; id, date, attachments and
    /// folder link are left untouched.
    pub fn apply(&self, registration: &mut Registration) {
        if let Some(v) = &self.full_name {
            registration.full_name = v.clone();
        }
        if let Some(v) = &self.email {
            registration.email = v.clone();
        }
        if let Some(v) = &self.national_id {
            registration.national_id = v.clone();
        }
        if let Some(v) = &self.phone {
            registration.phone = v.clone();
        }
        if let Some(v) = self.category {
            registration.category = v;
        }
        if let Some(v) = self.status {
            registration.status = v;
        }
    }
}

const ID_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 7;

pub fn new_registration_id(at: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char)
        .collect();

    format!("{}-{}", at.timestamp_millis(), suffix)
}
