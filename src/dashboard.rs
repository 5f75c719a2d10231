//! Admin dashboard operations: list, sort, filter, status changes, edits and
//! deletes over the active repository.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::i18n::Language;
use crate::registration::{Registration, RegistrationPatch, RegistrationStatus};
use crate::store::RegistrationRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    SubmissionDate,
    FullName,
    Email,
    NationalId,
    Category,
    Status,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submissionDate" | "date" => Ok(SortKey::SubmissionDate),
            "fullName" | "name" => Ok(SortKey::FullName),
            "email" => Ok(SortKey::Email),
            "nationalId" => Ok(SortKey::NationalId),
            "category" => Ok(SortKey::Category),
            "status" => Ok(SortKey::Status),
            other => Err(format!("Unknown sort column: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(format!("Unknown sort direction: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortConfig {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortConfig {
    /// Newest first
    fn default() -> Self {
        SortConfig {
            key: SortKey::SubmissionDate,
            direction: SortDirection::Descending,
        }
    }
}

impl SortConfig {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        SortConfig { key, direction }
    }

    /// Clicking a column: ascending first, descending when it is already
    /// the ascending column.
    pub fn toggle(current: Option<SortConfig>, key: SortKey) -> SortConfig {
        let direction = match current {
            Some(c) if c.key == key && c.direction == SortDirection::Ascending => {
                SortDirection::Descending
            }
            _ => SortDirection::Ascending,
        };
        SortConfig { key, direction }
    }
}

enum SortValue<'a> {
    Date(DateTime<Utc>),
    Text(&'a str),
}

fn sort_value<'a>(reg: &'a Registration, key: SortKey, language: Language) -> Option<SortValue<'a>> {
    let text = |s: &'a str| {
        if s.trim().is_empty() {
            None
        } else {
            Some(SortValue::Text(s))
        }
    };

    match key {
        SortKey::SubmissionDate => Some(SortValue::Date(reg.submission_date)),
        SortKey::FullName => text(reg.full_name.as_str()),
        SortKey::Email => text(reg.email.as_str()),
        SortKey::NationalId => text(reg.national_id.as_str()),
        SortKey::Category => text(reg.category.label(language)),
        SortKey::Status => text(reg.status.label(language)),
    }
}

/// Case- and accent-insensitive comparison first, exact comparison to break
/// ties.
pub fn collate(a: &str, b: &str) -> Ordering {
    fold(a).cmp(&fold(b)).then_with(|| a.cmp(b))
}

fn fold(s: &str) -> String {
    s.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ä' | 'ã' | 'å' => 'a',
            'ç' => 'c',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ò' | 'ó' | 'ô' | 'ö' | 'õ' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'ÿ' => 'y',
            'أ' | 'إ' | 'آ' => 'ا',
            other => other,
        })
        .collect()
}

fn compare(a: &Registration, b: &Registration, config: SortConfig, language: Language) -> Ordering {
    // empty values go last whatever the direction
    match (sort_value(a, config.key, language), sort_value(b, config.key, language)) {
        (None, None) => a.id.cmp(&b.id),
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let ord = match (x, y) {
                (SortValue::Date(x), SortValue::Date(y)) => x.cmp(&y),
                (SortValue::Text(x), SortValue::Text(y)) => collate(x, y),
                _ => Ordering::Equal,
            }
            .then_with(|| a.id.cmp(&b.id));

            match config.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        }
    }
}

pub fn sort_registrations(registrations: &mut [Registration], config: SortConfig, language: Language) {
    registrations.sort_by(|a, b| compare(a, b, config, language));
}

/// Case-insensitive substring match on full name, email and the translated
/// category label. A blank query keeps everything.
pub fn matches_filter(registration: &Registration, query: &str, language: Language) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }

    [
        registration.full_name.as_str(),
        registration.email.as_str(),
        registration.category.label(language),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&needle))
}

pub fn filter_registrations(
    registrations: Vec<Registration>,
    query: &str,
    language: Language,
) -> Vec<Registration> {
    registrations
        .into_iter()
        .filter(|r| matches_filter(r, query, language))
        .collect()
}

/// What the admin is currently looking at
#[derive(Debug, Clone, Default)]
pub struct DashboardView {
    pub sort: SortConfig,
    pub filter: Option<String>,
    pub language: Language,
}

impl DashboardView {
    pub fn apply(&self, registrations: Vec<Registration>) -> Vec<Registration> {
        let mut rows = match &self.filter {
            Some(query) => filter_registrations(registrations, query, self.language),
            None => registrations,
        };
        sort_registrations(&mut rows, self.sort, self.language);
        rows
    }
}

#[derive(Clone)]
pub struct Dashboard {
    repository: Arc<dyn RegistrationRepository>,
}

impl Dashboard {
    pub fn new(repository: Arc<dyn RegistrationRepository>) -> Self {
        Dashboard { repository }
    }

    /// Load every registration and apply the view's filter and sort.
    ///
    /// # Arguments
    /// * `view` - Sort column and direction, filter text and display language
    ///
    /// # Returns
    /// * `AppResult<Vec<Registration>>` - The rows as the dashboard shows them
    pub async fn list(&self, view: &DashboardView) -> AppResult<Vec<Registration>> {
        Ok(view.apply(self.repository.list().await?))
    }

    /// Fetch one registration, `NotFound` when the id is unknown.
    pub async fn get(&self, id: &str) -> AppResult<Registration> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Registration {} not found", id)))
    }

    /// Move a registration to `status`. Any status may follow any other.
    ///
    /// # Arguments
    /// * `id` - Registration id
    /// * `status` - The new status
    ///
    /// # Returns
    /// * `AppResult<Registration>` - The updated record, or `NotFound`
    pub async fn set_status(&self, id: &str, status: RegistrationStatus) -> AppResult<Registration> {
        self.edit(id, &RegistrationPatch::status(status)).await
    }

    /// Apply `patch` to the stored registration and write it back.
    ///
    /// Last write wins; there is no version check.
    ///
    /// # Arguments
    /// * `id` - Registration id
    /// * `patch` - Fields to overwrite; absent fields keep their value
    ///
    /// # Returns
    /// * `AppResult<Registration>` - The record as stored, or `NotFound`
    pub async fn edit(&self, id: &str, patch: &RegistrationPatch) -> AppResult<Registration> {
        let mut registration = self.get(id).await?;
        patch.apply(&mut registration);
        self.repository.update(&registration).await?;

        log::info!("registration {} updated (status {})", id, registration.status);
        Ok(registration)
    }

    /// Remove a registration. Unknown ids are not an error.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.repository.delete(id).await?;
        log::info!("registration {} deleted", id);
        Ok(())
    }
}
