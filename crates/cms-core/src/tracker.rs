//! Upload status tracking.
//!
//! `created -> running -> completed | failed`. The fact table is created on
//! the move to `running`; progress is written only after an append has
//! committed, so `loaded_record` never runs ahead of the fact table.

use tracing::{info, warn};

use cms_model::{FactTableTemplate, NewUpload, UploadStatus};
use cms_store::{FactStore, QualifiedTable, StatusStore};

use crate::error::{EtlError, Result};

pub struct UploadTracker<'s, S: StatusStore + FactStore + ?Sized> {
    store: &'s S,
    upload_id: i64,
    fact_table: QualifiedTable,
    status: UploadStatus,
    loaded: i64,
    message: String,
}

impl<'s, S: StatusStore + FactStore + ?Sized> UploadTracker<'s, S> {
    /// Inserts the status row; the store assigns the upload id.
    pub fn create(store: &'s S, star_schema: &str, upload: &NewUpload) -> Result<Self> {
        let upload_id = store.insert_upload(upload)?;
        info!(upload_id, label = %upload.upload_label, "upload created");
        Ok(Self {
            store,
            upload_id,
            fact_table: QualifiedTable::new(star_schema, FactTableTemplate::table_name(upload_id)),
            status: UploadStatus::Created,
            loaded: 0,
            message: String::new(),
        })
    }

    pub fn upload_id(&self) -> i64 {
        self.upload_id
    }

    pub fn fact_table(&self) -> &QualifiedTable {
        &self.fact_table
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn loaded(&self) -> i64 {
        self.loaded
    }

    fn transition(&mut self, to: UploadStatus) -> Result<()> {
        self.check_transition(to)?;
        self.status = to;
        Ok(())
    }

    fn check_transition(&self, to: UploadStatus) -> Result<()> {
        let allowed = matches!(
            (self.status, to),
            (UploadStatus::Created, UploadStatus::Running)
                | (UploadStatus::Running, UploadStatus::Completed)
                | (
                    UploadStatus::Created | UploadStatus::Running,
                    UploadStatus::Failed
                )
        );
        if !allowed {
            return Err(EtlError::InvalidTransition {
                upload_id: self.upload_id,
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    /// Creates the upload's fact table and marks the upload running.
    pub fn start(&mut self, template: &FactTableTemplate) -> Result<()> {
        self.transition(UploadStatus::Running)?;
        self.store.create_fact_table(&self.fact_table, template)?;
        self.store
            .set_status(self.upload_id, UploadStatus::Running, None)?;
        Ok(())
    }

    /// Records rows that are already committed to the fact table.
    pub fn record_chunk(&mut self, appended: usize, message: &str) -> Result<()> {
        if self.status != UploadStatus::Running {
            return Err(EtlError::InvalidTransition {
                upload_id: self.upload_id,
                from: self.status,
                to: UploadStatus::Running,
            });
        }
        self.loaded += appended as i64;
        self.message = message.to_string();
        self.store
            .update_progress(self.upload_id, self.loaded, message)?;
        Ok(())
    }

    /// Writes the final count and marks the upload completed.
    ///
    /// The in-memory status moves only once both writes succeed, so a failed
    /// write can still be recorded with [`UploadTracker::fail`].
    pub fn complete(&mut self) -> Result<i64> {
        self.check_transition(UploadStatus::Completed)?;
        self.store
            .update_progress(self.upload_id, self.loaded, &self.message)?;
        self.store
            .set_status(self.upload_id, UploadStatus::Completed, None)?;
        self.status = UploadStatus::Completed;
        info!(upload_id = self.upload_id, loaded_record = self.loaded, "upload completed");
        Ok(self.loaded)
    }

    /// Marks the upload failed with the error text, leaving the count alone.
    ///
    /// Best effort: a failure to record the failure is only logged.
    pub fn fail(&mut self, error: &EtlError) {
        if self.transition(UploadStatus::Failed).is_err() {
            warn!(
                upload_id = self.upload_id,
                status = %self.status,
                error = %error,
                "upload already finished; failure not recorded"
            );
            return;
        }
        let text = error.to_string();
        if let Err(status_err) =
            self.store
                .set_status(self.upload_id, UploadStatus::Failed, Some(&text))
        {
            warn!(
                upload_id = self.upload_id,
                error = %status_err,
                "could not record upload failure"
            );
        }
        warn!(upload_id = self.upload_id, error = %text, "upload failed");
    }
}
