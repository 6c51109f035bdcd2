use sea_orm::{DeriveIden, FromQueryResult};
use serde::{Deserialize, Serialize};

/// Columns shared by `fileassocs` and `imageassocs`. The column pointing at
/// the attachment differs per kind, see [`AttachmentKind::assoc_column`].
#[derive(Copy, Clone, Debug, DeriveIden)]
pub enum AssocColumn {
    Id,
    #[sea_orm(iden = "modelName")]
    ModelName,
    #[sea_orm(iden = "modelId")]
    ModelId,
    Field,
    Order,
    #[sea_orm(iden = "createdAt")]
    CreatedAt,
    #[sea_orm(iden = "updatedAt")]
    UpdatedAt,
}

/// Alias the per-kind attachment column is selected under, so one row type
/// reads both association tables.
pub const ATTACHMENT_ID_ALIAS: &str = "attachmentId";

/// Links one attachment to one field of one owning record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct AssocRow {
    pub id: i64,
    #[sea_orm(from_alias = "modelName")]
    pub model_name: String,
    /// Stored as a string so owners with non-numeric ids work too
    #[sea_orm(from_alias = "modelId")]
    pub model_id: String,
    pub field: String,
    #[sea_orm(from_alias = "attachmentId")]
    pub attachment_id: i64,
    /// Rank within `(model_name, model_id, field)`
    pub order: i32,
}

impl AssocRow {
    /// An unsaved row
    pub fn new(model_name: &str, model_id: &str, field: &str, attachment_id: i64, order: i32) -> Self {
        Self {
            id: 0,
            model_name: model_name.to_string(),
            model_id: model_id.to_string(),
            field: field.to_string(),
            attachment_id,
            order,
        }
    }
}
