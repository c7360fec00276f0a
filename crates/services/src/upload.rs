use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{FlashcardApi, UploadFile};
use crate::error::UploadError;

/// Result for one file of a batch; failures never abort the rest.
#[derive(Debug)]
pub struct UploadOutcome {
    pub file_name: String,
    /// Storage key on success.
    pub result: Result<String, UploadError>,
}

impl UploadOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Two-step uploads: request a target, then transfer the bytes.
#[derive(Clone)]
pub struct UploadService {
    api: Arc<dyn FlashcardApi>,
}

impl UploadService {
    #[must_use]
    pub fn new(api: Arc<dyn FlashcardApi>) -> Self {
        Self { api }
    }

    /// Upload a single file.
    ///
    /// # Errors
    ///
    /// Returns `UploadError` naming the step that failed.
    pub async fn upload(&self, file: &UploadFile) -> Result<String, UploadError> {
        if file.bytes.is_empty() {
            return Err(UploadError::EmptyFile(file.name.clone()));
        }
        let target = self
            .api
            .request_upload_target(file)
            .await
            .map_err(UploadError::Target)?;
        self.api
            .upload_bytes(&target, file)
            .await
            .map_err(UploadError::Transfer)?;
        Ok(target.key)
    }

    /// Upload files one after another, in order.
    pub async fn upload_all(&self, files: &[UploadFile]) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let result = self.upload(file).await;
            match &result {
                Ok(key) => info!(file = %file.name, key = %key, "uploaded file"),
                Err(err) => warn!(file = %file.name, error = %err, "upload failed"),
            }
            outcomes.push(UploadOutcome {
                file_name: file.name.clone(),
                result,
            });
        }
        outcomes
    }
}
