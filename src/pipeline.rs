//! Submission pipeline: validate, archive attachments, persist.

use chrono::Utc;
use std::sync::Arc;

use crate::cloud::{CloudError, CloudStorage};
use crate::error::{AppError, AppResult};
use crate::i18n::{Language, TranslationKey, t};
use crate::registration::{Registration, RegistrationForm};
use crate::store::RegistrationRepository;

#[derive(Clone)]
pub struct SubmissionPipeline {
    storage: Arc<dyn CloudStorage>,
    repository: Arc<dyn RegistrationRepository>,
    require_national_id: bool,
}

impl SubmissionPipeline {
    pub fn new(
        storage: Arc<dyn CloudStorage>,
        repository: Arc<dyn RegistrationRepository>,
        require_national_id: bool,
    ) -> Self {
        SubmissionPipeline {
            storage,
            repository,
            require_national_id,
        }
    }

    pub fn repository(&self) -> &Arc<dyn RegistrationRepository> {
        &self.repository
    }

    /// Run a submission through to a stored, pending registration.
    ///
    /// # Arguments
    /// * `form` - The registrant's fields and attachments
    /// * `language` - Language of any error message returned
    ///
    /// # Returns
    /// * `AppResult<Registration>` - The stored record. Nothing is stored when
    ///   validation or the upload fails; files already uploaded stay in the
    ///   drive.
    pub async fn submit(&self, form: RegistrationForm, language: Language) -> AppResult<Registration> {
        form.validate(self.require_national_id, language)?;

        let folder_url = self
            .storage
            .upload_batch(&form.attachments, &form.full_name)
            .await
            .map_err(|e| upload_failure(e, self.storage.provider(), language))?;

        let registration = Registration::from_form(&form, folder_url, Utc::now());
        self.repository.insert(&registration).await?;

        log::info!(
            "registration {} stored ({} attachment(s), category {})",
            registration.id,
            registration.attachment_names.len(),
            registration.category
        );
        Ok(registration)
    }
}

fn upload_failure(error: CloudError, provider: &str, language: Language) -> AppError {
    log::error!("{} upload failed: {}", provider, error);

    match error {
        CloudError::InvalidFolderName => {
            AppError::Validation(t(TranslationKey::ValidationErrorAllFields, language).to_string())
        }
        e if e.is_auth() => AppError::Upload(t(TranslationKey::UploadAuthError, language).to_string()),
        _ => AppError::Upload(t(TranslationKey::UploadError, language).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::DisabledStorage;
    use crate::registration::{Attachment, Category, RegistrationStatus};
    use crate::store::{BlobRepository, MemoryBlobStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingStorage {
        error: fn() -> CloudError,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CloudStorage for FailingStorage {
        fn provider(&self) -> &'static str {
            "failing"
        }

        async fn upload_batch(
            &self,
            _files: &[Attachment],
            _folder_name: &str,
        ) -> Result<Option<String>, CloudError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    fn jane() -> RegistrationForm {
        RegistrationForm {
            full_name: "Jane Doe".to_string(),
            email: "jane@x.com".to_string(),
            national_id: "A1".to_string(),
            phone: "123".to_string(),
            attachments: vec![Attachment::new("cv.pdf", "application/pdf", b"%PDF".to_vec())],
            ..Default::default()
        }
    }

    fn repository() -> Arc<BlobRepository<MemoryBlobStore>> {
        Arc::new(BlobRepository::new(MemoryBlobStore::new()))
    }

    #[tokio::test]
    async fn stores_pending_participant() {
        let repo = repository();
        let pipeline = SubmissionPipeline::new(Arc::new(DisabledStorage), repo.clone(), true);

        let before = Utc::now();
        let stored = pipeline.submit(jane(), Language::Fr).await.unwrap();

        assert_eq!(stored.category, Category::Participant);
        assert_eq!(stored.status, RegistrationStatus::Pending);
        assert!(stored.submission_date >= before && stored.submission_date <= Utc::now());
        assert_eq!(stored.one_drive_folder_url, None);
        assert_eq!(repo.list().await.unwrap(), vec![stored]);
    }

    #[tokio::test]
    async fn invalid_form_never_uploads_or_persists() {
        let repo = repository();
        let storage = Arc::new(FailingStorage {
            error: || CloudError::InvalidFolderName,
            calls: AtomicUsize::new(0),
        });
        let pipeline = SubmissionPipeline::new(storage.clone(), repo.clone(), true);

        let mut form = jane();
        form.attachments.clear();

        assert!(matches!(
            pipeline.submit(form, Language::Ar).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(storage.calls.load(Ordering::SeqCst), 0);
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_failure_is_localized_and_not_persisted() {
        let repo = repository();
        let storage = Arc::new(FailingStorage {
            error: || CloudError::Api {
                provider: "OneDrive",
                status: 507,
                message: "quota".to_string(),
            },
            calls: AtomicUsize::new(0),
        });
        let pipeline = SubmissionPipeline::new(storage, repo.clone(), true);

        match pipeline.submit(jane(), Language::Fr).await {
            Err(AppError::Upload(msg)) => {
                assert_eq!(msg, t(TranslationKey::UploadError, Language::Fr))
            }
            other => panic!("expected upload error, got {:?}", other),
        }
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_token_gets_its_own_message() {
        let storage = Arc::new(FailingStorage {
            error: || CloudError::Token("invalid_grant".to_string()),
            calls: AtomicUsize::new(0),
        });
        let pipeline = SubmissionPipeline::new(storage, repository(), true);

        match pipeline.submit(jane(), Language::Ar).await {
            Err(AppError::Upload(msg)) => {
                assert_eq!(msg, t(TranslationKey::UploadAuthError, Language::Ar))
            }
            other => panic!("expected upload error, got {:?}", other),
        }
    }
}
