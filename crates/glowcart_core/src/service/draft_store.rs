//! Pending booking draft persistence.
//!
//! # Responsibility
//! - Keep the single `pending_booking` slot and the attachment blob store in
//!   step for one service at a time.
//! - Discard stale drafts (other service) together with their files.
//!
//! # Invariants
//! - Files are written before the draft that references them.
//! - A draft is only ever returned together with its own files.
//! - Clearing a draft always clears the files of its scope.

use crate::model::draft::{AttachmentMeta, DraftFile, PendingBookingDraft};
use crate::repo::file_repo::FileStore;
use crate::repo::slot_repo::{load_json, save_json, SlotStore, PENDING_BOOKING_SLOT};
use crate::repo::{RepoError, RepoResult};
use log::{info, warn};

/// Draft plus the attachment bytes it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDraft {
    pub draft: PendingBookingDraft,
    pub files: Vec<DraftFile>,
}

/// Injectable draft store over a slot backend and a blob backend.
pub struct DraftStore<S: SlotStore, F: FileStore> {
    slots: S,
    files: F,
}

impl<S: SlotStore, F: FileStore> DraftStore<S, F> {
    pub fn new(slots: S, files: F) -> Self {
        Self { slots, files }
    }

    /// Slot backend shared with other per-device state.
    pub fn slots(&self) -> &S {
        &self.slots
    }

    pub fn save_draft(&self, draft: &PendingBookingDraft) -> RepoResult<()> {
        save_json(&self.slots, PENDING_BOOKING_SLOT, draft)
    }

    pub fn load_draft(&self) -> RepoResult<Option<PendingBookingDraft>> {
        load_json(&self.slots, PENDING_BOOKING_SLOT)
    }

    /// Clears the draft slot only. Returns whether a draft existed.
    pub fn clear_draft(&self) -> RepoResult<bool> {
        self.slots.clear_slot(PENDING_BOOKING_SLOT)
    }

    /// Replaces the file set of `scope_id`.
    pub fn save_files(&self, scope_id: &str, files: &[DraftFile]) -> RepoResult<()> {
        self.files.replace_files(scope_id, files)
    }

    /// Files of `scope_id`; empty when none were saved.
    pub fn get_files(&self, scope_id: &str) -> RepoResult<Vec<DraftFile>> {
        self.files.list_files(scope_id)
    }

    pub fn clear_files(&self, scope_id: &str) -> RepoResult<usize> {
        self.files.delete_files(scope_id)
    }

    /// Persists a draft and its files as one logical unit.
    ///
    /// A previous draft for another service is discarded first.
    pub fn store(&self, draft: &PendingBookingDraft, files: &[DraftFile]) -> RepoResult<()> {
        let mut orphans_possible = false;
        match self.load_draft() {
            Ok(Some(previous)) if previous.service_id != draft.service_id => {
                self.clear_files(&previous.service_id)?;
            }
            Ok(_) => {}
            Err(err @ RepoError::Serialization { .. }) => {
                warn!("event=draft_save module=draft status=previous_unreadable error={err}");
                orphans_possible = true;
            }
            Err(err) => return Err(err),
        }
        self.save_files(&draft.service_id, files)?;
        self.save_draft(draft)?;
        if orphans_possible {
            self.purge_orphan_files()?;
        }
        info!(
            "event=draft_save module=draft status=ok service_id={} files={}",
            draft.service_id,
            files.len()
        );
        Ok(())
    }

    /// Reads the draft for `service_id` together with its files.
    ///
    /// A draft for another service, or one that can no longer be decoded, is
    /// stale: it is cleared with its files and `None` is returned.
    pub fn load_for_service(&self, service_id: &str) -> RepoResult<Option<StoredDraft>> {
        let draft = match self.load_draft() {
            Ok(draft) => draft,
            Err(RepoError::Serialization { .. }) => {
                warn!("event=draft_load module=draft status=discarded reason=undecodable");
                self.clear_draft()?;
                self.clear_files(service_id)?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let Some(mut draft) = draft else {
            // Files without a draft are orphans of an interrupted save.
            self.clear_files(service_id)?;
            return Ok(None);
        };

        if draft.service_id != service_id {
            info!(
                "event=draft_load module=draft status=discarded reason=stale_scope draft_service_id={} service_id={}",
                draft.service_id, service_id
            );
            self.discard(&draft.service_id)?;
            self.clear_files(service_id)?;
            return Ok(None);
        }

        let files = self.get_files(service_id)?;
        let metas: Vec<AttachmentMeta> = files.iter().map(DraftFile::meta).collect();
        if metas != draft.attachments {
            warn!(
                "event=draft_load module=draft status=repaired service_id={} expected_files={} found_files={}",
                service_id,
                draft.attachments.len(),
                files.len()
            );
            draft.attachments = metas;
            self.save_draft(&draft)?;
        }

        Ok(Some(StoredDraft { draft, files }))
    }

    /// Clears the draft slot and the files of `scope_id`.
    pub fn discard(&self, scope_id: &str) -> RepoResult<()> {
        self.clear_draft()?;
        let removed = self.clear_files(scope_id)?;
        info!(
            "event=draft_clear module=draft status=ok service_id={} files={}",
            scope_id, removed
        );
        Ok(())
    }

    /// Clears whatever draft is stored, with its files.
    pub fn discard_current(&self) -> RepoResult<()> {
        match self.load_draft() {
            Ok(Some(draft)) => self.discard(&draft.service_id),
            Ok(None) => Ok(()),
            Err(RepoError::Serialization { .. }) => self.clear_draft().map(|_| ()),
            Err(err) => Err(err),
        }
    }

    /// Deletes file sets no stored draft refers to.
    pub fn purge_orphan_files(&self) -> RepoResult<usize> {
        let keep = match self.load_draft() {
            Ok(draft) => draft.map(|draft| draft.service_id),
            Err(RepoError::Serialization { .. }) => None,
            Err(err) => return Err(err),
        };
        let mut removed = 0;
        for scope in self.files.list_scopes()? {
            if keep.as_deref() != Some(scope.as_str()) {
                removed += self.clear_files(&scope)?;
            }
        }
        if removed > 0 {
            info!("event=draft_purge module=draft status=ok files={removed}");
        }
        Ok(removed)
    }
}
