//! Cli things
//!

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use fieldfiles_shared::{AttachmentError, AttachmentKind, FieldConfig};
use serde_json::{json, Value};

use crate::db::AttachmentQuery;
use crate::upload::UploadMetadata;
use crate::AppState;

pub fn db_path_default() -> String {
    shellexpand::tilde("~/.cache/fieldfiles.sqlite3").to_string()
}

#[derive(Parser, Debug)]
#[clap(name = "fieldfiles", about = "Ordered file and image attachments for arbitrary records")]
pub struct CliOpts {
    #[clap(long, help = "Path to the database file", env = "FIELDFILES_DB_PATH")]
    pub db_path: Option<PathBuf>,

    #[clap(long, help = "Path to a TOML configuration file", env = "FIELDFILES_CONFIG")]
    pub config: Option<PathBuf>,

    #[clap(long, help = "Enable debug logging")]
    pub debug: bool,

    #[clap(subcommand)]
    pub command: Command,
}

/// Which field of which record
#[derive(Args, Debug, Clone)]
pub struct FieldArgs {
    #[clap(long, default_value = "file", help = "file or image")]
    pub kind: AttachmentKind,
    #[clap(long, help = "Model name of the owning record")]
    pub model: String,
    #[clap(long, help = "Id of the owning record")]
    pub id: String,
    #[clap(long, help = "Field name on the owning record")]
    pub field: String,
}

impl FieldArgs {
    pub fn config(&self) -> FieldConfig {
        FieldConfig::new(self.kind, &self.model, &self.field)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create or update the database tables
    Migrate,
    /// Store a file and print the new attachment
    Upload {
        #[clap(long, default_value = "file")]
        kind: AttachmentKind,
        #[clap(long, help = "Storage backend, defaults to the configured one")]
        storage: Option<String>,
        #[clap(long, help = "Original file name, defaults to the path's file name")]
        name: Option<String>,
        #[clap(long)]
        label: Option<String>,
        #[clap(long)]
        description: Option<String>,
        #[clap(long)]
        creator: Option<i64>,
        path: PathBuf,
    },
    /// Set the attachments of a field, in order. No ids empties the field.
    Attach {
        #[clap(flatten)]
        field: FieldArgs,
        ids: Vec<String>,
    },
    /// Show the attachments of a field in order
    List {
        #[clap(flatten)]
        field: FieldArgs,
        #[clap(long)]
        limit: Option<u64>,
    },
    /// Search attachments
    Search {
        #[clap(long, default_value = "file")]
        kind: AttachmentKind,
        #[clap(long)]
        query: Option<String>,
        #[clap(long)]
        creator: Option<i64>,
        #[clap(long, default_value_t = 50)]
        limit: u64,
        #[clap(long, default_value_t = 0)]
        offset: u64,
    },
    /// Show one attachment by id or name
    Show {
        #[clap(long, default_value = "file")]
        kind: AttachmentKind,
        key: String,
    },
    /// Print the URL of an image style, generating it if needed
    Style {
        key: String,
        style: String,
        #[clap(long, help = "Regenerate even when already generated")]
        reset: bool,
    },
    /// Delete every generated style of an image
    ResetStyles { key: String },
    /// Mark every style of an image for regeneration
    Reprocess { key: String },
    /// Unlink everything from a field
    Clear {
        #[clap(flatten)]
        field: FieldArgs,
    },
    /// Delete an attachment record
    Delete {
        #[clap(long, default_value = "file")]
        kind: AttachmentKind,
        key: String,
    },
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, AttachmentError> {
    serde_json::to_value(value)
        .map_err(|err| AttachmentError::Validation(format!("failed to serialize output: {err}")))
}

/// Runs one command, returning what to print.
pub async fn run(state: &AppState, command: Command) -> Result<Value, AttachmentError> {
    match command {
        // opening the database already applied the migrations
        Command::Migrate => Ok(json!({ "migrated": true })),
        Command::Upload {
            kind,
            storage,
            name,
            label,
            description,
            creator,
            path,
        } => {
            let original_name = name.unwrap_or_else(|| {
                path.file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default()
            });
            let metadata = UploadMetadata {
                original_name,
                label,
                description,
                creator_id: creator,
            };
            let attachment = state
                .uploads
                .upload(kind, &path, metadata, storage.as_deref())
                .await?;
            to_json(&attachment)
        }
        Command::Attach { field, ids } => {
            let summary = state
                .reconciler
                .reconcile_field(&field.id, &ids, &field.config())
                .await?;
            let attachments = state
                .store
                .find_attachments_in_field(field.kind, &field.model, &field.id, &field.field, None)
                .await?;
            Ok(json!({
                "removed": summary.removed,
                "added": summary.added,
                "skipped": summary.skipped,
                "attachments": to_json(&attachments)?,
            }))
        }
        Command::List { field, limit } => {
            let attachments = state
                .store
                .find_attachments_in_field(field.kind, &field.model, &field.id, &field.field, limit)
                .await?;
            to_json(&attachments)
        }
        Command::Search {
            kind,
            query,
            creator,
            limit,
            offset,
        } => {
            let (attachments, total) = state
                .store
                .query(
                    kind,
                    &AttachmentQuery {
                        search: query,
                        creator_id: creator,
                        active_only: false,
                        limit,
                        offset,
                    },
                )
                .await?;
            Ok(json!({ "total": total, "attachments": to_json(&attachments)? }))
        }
        Command::Show { kind, key } => to_json(&find(state, kind, &key).await?),
        Command::Style { key, style, reset } => {
            let mut attachment = find(state, AttachmentKind::Image, &key).await?;
            let url = match reset {
                true => state.styles.resolve_style_forced(&mut attachment, &style).await?,
                false => state.styles.resolve_style(&mut attachment, &style).await?,
            };
            Ok(json!({ "style": style, "url": url }))
        }
        Command::ResetStyles { key } => {
            let mut attachment = find(state, AttachmentKind::Image, &key).await?;
            state.styles.reset_styles(&mut attachment).await?;
            to_json(&attachment)
        }
        Command::Reprocess { key } => {
            let mut attachment = find(state, AttachmentKind::Image, &key).await?;
            state.styles.reprocess(&mut attachment).await?;
            to_json(&attachment)
        }
        Command::Clear { field } => {
            let removed = state
                .reconciler
                .clear_field(&field.id, &field.config())
                .await?;
            Ok(json!({ "removed": removed }))
        }
        Command::Delete { kind, key } => {
            let attachment = find(state, kind, &key).await?;
            state.store.delete(&attachment).await?;
            Ok(json!({ "deleted": attachment.id }))
        }
    }
}

async fn find(
    state: &AppState,
    kind: AttachmentKind,
    key: &str,
) -> Result<crate::entity::Attachment, AttachmentError> {
    state
        .store
        .find_by_id(kind, key)
        .await?
        .ok_or_else(|| AttachmentError::NotFound(format!("{kind} {key}")))
}
