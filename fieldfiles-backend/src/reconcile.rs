//! Keeps the association rows of one record field in line with a desired,
//! ordered list of attachment ids.
//!
//! Rows already present keep their `order`. New rows take the index of
//! their id in the desired list. Nothing here takes a lock, so two
//! concurrent calls for the same field can interleave their writes.

use std::collections::HashSet;

use fieldfiles_shared::{AttachmentError, AttachmentKind, FieldConfig};
use tracing::{debug, error, info, instrument};

use crate::db::AttachmentStore;
use crate::entity::{AssocRow, Attachment};

/// What one reconciliation changed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub removed: u64,
    pub added: u64,
    /// Desired ids that didn't resolve to an attachment
    pub skipped: u64,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        self.removed == 0 && self.added == 0
    }
}

/// The delta between the stored and desired id lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ChangePlan {
    pub to_delete: Vec<String>,
    /// `(position in the desired list, id)`
    pub to_add: Vec<(usize, String)>,
}

/// Numeric ids compare by value, so `"07"` and `"7"` are the same id.
fn canonical_id(id: &str) -> String {
    let id = id.trim();
    id.parse::<i64>()
        .map(|n| n.to_string())
        .unwrap_or_else(|_| id.to_string())
}

pub(crate) fn plan_changes(current: &[String], desired: &[String]) -> ChangePlan {
    let current: Vec<String> = current.iter().map(|id| canonical_id(id)).collect();
    let desired: Vec<String> = desired.iter().map(|id| canonical_id(id)).collect();

    let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
    let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();

    let mut plan = ChangePlan::default();

    let mut seen = HashSet::new();
    for id in &current {
        if !desired_set.contains(id.as_str()) && seen.insert(id.as_str()) {
            plan.to_delete.push(id.clone());
        }
    }

    let mut seen = HashSet::new();
    for (position, id) in desired.iter().enumerate() {
        if !current_set.contains(id.as_str()) && seen.insert(id.as_str()) {
            plan.to_add.push((position, id.clone()));
        }
    }

    plan
}

#[derive(Clone, Debug)]
pub struct Reconciler {
    store: AttachmentStore,
}

impl Reconciler {
    pub fn new(store: AttachmentStore) -> Self {
        Self { store }
    }

    /// Makes the field hold exactly the resolvable ids of `desired_ids`.
    ///
    /// Removals run before additions. A failure part way leaves whatever
    /// was already applied in place; calling again with the same input
    /// finishes the job.
    #[instrument(level = "debug", skip(self, desired_ids, field), fields(model = %field.model_name, field = %field.field_name, kind = %field.kind))]
    pub async fn reconcile_field(
        &self,
        model_id: &str,
        desired_ids: &[String],
        field: &FieldConfig,
    ) -> Result<ReconcileSummary, AttachmentError> {
        let current_rows = self
            .store
            .find_rows_for_field(field.kind, &field.model_name, model_id, &field.field_name)
            .await
            .inspect_err(|err| error!(?err, "Failed to load association rows"))?;

        if desired_ids.is_empty() && current_rows.is_empty() {
            return Ok(ReconcileSummary::default());
        }

        let current_ids: Vec<String> = current_rows
            .iter()
            .map(|row| row.attachment_id.to_string())
            .collect();
        let plan = plan_changes(&current_ids, desired_ids);
        debug!(
            to_delete = plan.to_delete.len(),
            to_add = plan.to_add.len(),
            "Planned field changes"
        );

        let mut summary = ReconcileSummary {
            removed: self.remove(model_id, &plan.to_delete, field).await?,
            ..Default::default()
        };

        let (added, skipped) = self.add(model_id, &plan.to_add, field).await?;
        summary.added = added;
        summary.skipped = skipped;

        if !summary.is_noop() {
            info!(
                model_id,
                removed = summary.removed,
                added = summary.added,
                skipped = summary.skipped,
                "Reconciled field"
            );
        }
        Ok(summary)
    }

    /// Same as [`Reconciler::reconcile_field`], taking the attachments
    /// themselves.
    pub async fn reconcile_field_with(
        &self,
        model_id: &str,
        attachments: &[Attachment],
        field: &FieldConfig,
    ) -> Result<ReconcileSummary, AttachmentError> {
        if let Some(other) = attachments.iter().find(|a| a.kind != field.kind) {
            return Err(AttachmentError::Validation(format!(
                "{} {} can't be stored in {} field {}.{}",
                other.kind, other.id, field.kind, field.model_name, field.field_name
            )));
        }
        let ids: Vec<String> = attachments.iter().map(Attachment::id_string).collect();
        self.reconcile_field(model_id, &ids, field).await
    }

    /// Unlinks everything in one field of a record.
    pub async fn clear_field(
        &self,
        model_id: &str,
        field: &FieldConfig,
    ) -> Result<u64, AttachmentError> {
        let removed = self
            .store
            .clear_field(field.kind, &field.model_name, model_id, &field.field_name)
            .await
            .inspect_err(|err| error!(?err, "Failed to clear field"))?;
        debug!(model = %field.model_name, model_id, field = %field.field_name, removed, "Cleared field");
        Ok(removed)
    }

    /// Unlinks everything in every field of a record, for when the record
    /// itself goes away.
    pub async fn clear_record(
        &self,
        model_name: &str,
        model_id: &str,
        kind: AttachmentKind,
    ) -> Result<u64, AttachmentError> {
        let removed = self
            .store
            .clear_record(kind, model_name, model_id)
            .await
            .inspect_err(|err| error!(?err, "Failed to clear record"))?;
        debug!(model = model_name, model_id, %kind, removed, "Cleared record");
        Ok(removed)
    }

    async fn remove(
        &self,
        model_id: &str,
        to_delete: &[String],
        field: &FieldConfig,
    ) -> Result<u64, AttachmentError> {
        // current ids come from the store, so they are always numeric
        let ids: Vec<i64> = to_delete
            .iter()
            .filter_map(|id| id.parse::<i64>().ok())
            .collect();
        self.store
            .delete_rows_for_field(field.kind, &field.model_name, model_id, &field.field_name, &ids)
            .await
            .inspect_err(|err| error!(?err, "Failed to delete association rows"))
    }

    async fn add(
        &self,
        model_id: &str,
        to_add: &[(usize, String)],
        field: &FieldConfig,
    ) -> Result<(u64, u64), AttachmentError> {
        if to_add.is_empty() {
            return Ok((0, 0));
        }

        let ids: Vec<String> = to_add.iter().map(|(_, id)| id.clone()).collect();
        let found = self
            .store
            .find_attachments_by_ids(field.kind, &ids)
            .await
            .inspect_err(|err| error!(?err, "Failed to resolve attachments"))?;

        let mut rows = Vec::with_capacity(found.len());
        for (position, id) in to_add {
            match found.get(id) {
                Some(attachment) => rows.push(AssocRow::new(
                    &field.model_name,
                    model_id,
                    &field.field_name,
                    attachment.id,
                    i32::try_from(*position).unwrap_or(i32::MAX),
                )),
                None => debug!(%id, "Skipping unknown attachment id"),
            }
        }

        self.store
            .create_rows(field.kind, &rows)
            .await
            .inspect_err(|err| error!(?err, "Failed to create association rows"))?;

        let added = rows.len() as u64;
        Ok((added, to_add.len() as u64 - added))
    }
}
