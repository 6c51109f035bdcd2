use chrono::{DateTime, Utc};
use fieldfiles_shared::{AttachmentKind, ExtraData, StyleUrls};
use sea_orm::{DbErr, DeriveIden, FromQueryResult, QueryResult};
use serde::{Deserialize, Serialize};

/// Columns shared by the `files` and `images` tables.
#[derive(Copy, Clone, Debug, DeriveIden)]
pub enum AttachmentColumn {
    Id,
    Label,
    Description,
    Name,
    Size,
    Active,
    #[sea_orm(iden = "originalName")]
    OriginalName,
    Mime,
    Extension,
    #[sea_orm(iden = "storageName")]
    StorageName,
    Urls,
    #[sea_orm(iden = "extraData")]
    ExtraData,
    #[sea_orm(iden = "creatorId")]
    CreatorId,
    #[sea_orm(iden = "createdAt")]
    CreatedAt,
    #[sea_orm(iden = "updatedAt")]
    UpdatedAt,
}

pub const ATTACHMENT_COLUMNS: [AttachmentColumn; 15] = [
    AttachmentColumn::Id,
    AttachmentColumn::Label,
    AttachmentColumn::Description,
    AttachmentColumn::Name,
    AttachmentColumn::Size,
    AttachmentColumn::Active,
    AttachmentColumn::OriginalName,
    AttachmentColumn::Mime,
    AttachmentColumn::Extension,
    AttachmentColumn::StorageName,
    AttachmentColumn::Urls,
    AttachmentColumn::ExtraData,
    AttachmentColumn::CreatorId,
    AttachmentColumn::CreatedAt,
    AttachmentColumn::UpdatedAt,
];

/// One uploaded file or image
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Store generated, 0 until the first save
    pub id: i64,
    pub kind: AttachmentKind,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Unique storage key, `<uuid>.<ext>`
    pub name: String,
    pub size: Option<i64>,
    pub active: bool,
    pub original_name: String,
    pub mime: Option<String>,
    pub extension: Option<String>,
    /// Which storage backend holds the bytes
    pub storage_name: String,
    pub urls: StyleUrls,
    pub extra_data: Option<ExtraData>,
    pub creator_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attachment {
    /// A new, unsaved attachment.
    pub fn new(kind: AttachmentKind, name: String, original_name: String, storage_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            kind,
            label: None,
            description: None,
            name,
            size: None,
            active: true,
            original_name,
            mime: None,
            extension: None,
            storage_name: storage_name.to_string(),
            urls: StyleUrls::new(),
            extra_data: None,
            creator_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id == 0
    }

    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    /// URL for a style, falling back to the original.
    pub fn url(&self, style: &str) -> Option<&str> {
        self.urls.get(style).or_else(|| self.urls.original())
    }

    /// Storage key with any extension removed
    pub fn name_stem(&self) -> &str {
        name_stem(&self.name)
    }

    pub(crate) fn from_row(kind: AttachmentKind, row: &QueryResult) -> Result<Self, DbErr> {
        Ok((kind, AttachmentRecord::from_query_result(row, "")?).into())
    }
}

/// A row of `files` or `images` as stored, JSON columns still raw.
#[derive(Debug, FromQueryResult)]
pub struct AttachmentRecord {
    pub id: i64,
    pub label: Option<String>,
    pub description: Option<String>,
    pub name: String,
    pub size: Option<i64>,
    pub active: bool,
    #[sea_orm(from_alias = "originalName")]
    pub original_name: Option<String>,
    pub mime: Option<String>,
    pub extension: Option<String>,
    #[sea_orm(from_alias = "storageName")]
    pub storage_name: Option<String>,
    pub urls: Option<String>,
    #[sea_orm(from_alias = "extraData")]
    pub extra_data: Option<String>,
    #[sea_orm(from_alias = "creatorId")]
    pub creator_id: Option<i64>,
    #[sea_orm(from_alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[sea_orm(from_alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<(AttachmentKind, AttachmentRecord)> for Attachment {
    fn from((kind, record): (AttachmentKind, AttachmentRecord)) -> Self {
        Self {
            id: record.id,
            kind,
            label: record.label,
            description: record.description,
            name: record.name,
            size: record.size,
            active: record.active,
            original_name: record.original_name.unwrap_or_default(),
            mime: record.mime,
            extension: record.extension,
            storage_name: record.storage_name.unwrap_or_default(),
            urls: record
                .urls
                .map(|raw| StyleUrls::from_json_lossy(&raw))
                .unwrap_or_default(),
            extra_data: record
                .extra_data
                .and_then(|raw| ExtraData::from_json_lossy(&raw)),
            creator_id: record.creator_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// `abc.webp` -> `abc`
pub fn name_stem(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}
