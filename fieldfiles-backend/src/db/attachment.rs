use std::collections::HashMap;

use chrono::Utc;
use fieldfiles_shared::{AttachmentError, AttachmentKind};
use sea_orm::sea_query::{Alias, Cond, Expr, Func, LikeExpr, Order, Query, SimpleExpr};
use sea_orm::{ConnectionTrait, DbErr};
use tracing::debug;

use super::AttachmentStore;
use crate::entity::attachment::name_stem;
use crate::entity::{Attachment, AttachmentColumn, ATTACHMENT_COLUMNS};

/// Filters for listing attachments of one kind.
#[derive(Clone, Debug, Default)]
pub struct AttachmentQuery {
    /// Case-insensitive match against name, original name, label and description
    pub search: Option<String>,
    pub creator_id: Option<i64>,
    pub active_only: bool,
    /// 0 means no limit
    pub limit: u64,
    pub offset: u64,
}

impl AttachmentStore {
    /// Looks an attachment up by numeric id or by name.
    ///
    /// For images a bare name also matches a stored name that carries an
    /// extension, so `abc` finds `abc.webp`.
    pub async fn find_by_id(
        &self,
        kind: AttachmentKind,
        key: &str,
    ) -> Result<Option<Attachment>, AttachmentError> {
        let key = key.trim();
        if key.is_empty() {
            return Ok(None);
        }

        let mut cond = Cond::any().add(Expr::col(AttachmentColumn::Name).eq(key));
        if let Ok(id) = key.parse::<i64>() {
            cond = cond.add(Expr::col(AttachmentColumn::Id).eq(id));
        }
        if kind == AttachmentKind::Image {
            let stem = name_stem(key);
            if !stem.is_empty() {
                cond = cond
                    .add(Expr::col(AttachmentColumn::Name).eq(stem))
                    .add(Expr::col(AttachmentColumn::Name).like(like_pattern(format!("{}.%", escape_like(stem)))));
            }
        }

        let stmt = Query::select()
            .columns(ATTACHMENT_COLUMNS)
            .from(Alias::new(kind.table()))
            .cond_where(cond)
            .order_by(AttachmentColumn::Id, Order::Asc)
            .limit(1)
            .to_owned();

        let backend = self.conn.get_database_backend();
        match self.conn.query_one(backend.build(&stmt)).await? {
            Some(row) => Ok(Some(Attachment::from_row(kind, &row)?)),
            None => Ok(None),
        }
    }

    /// Fetches every attachment whose id is listed, keyed by the id's string
    /// form. Ids that don't parse or don't exist are simply absent.
    pub async fn find_attachments_by_ids(
        &self,
        kind: AttachmentKind,
        ids: &[String],
    ) -> Result<HashMap<String, Attachment>, AttachmentError> {
        let numeric: Vec<i64> = ids
            .iter()
            .filter_map(|id| id.trim().parse::<i64>().ok())
            .collect();
        if numeric.is_empty() {
            return Ok(HashMap::new());
        }

        let stmt = Query::select()
            .columns(ATTACHMENT_COLUMNS)
            .from(Alias::new(kind.table()))
            .and_where(Expr::col(AttachmentColumn::Id).is_in(numeric))
            .to_owned();

        let backend = self.conn.get_database_backend();
        let rows = self.conn.query_all(backend.build(&stmt)).await?;
        let mut res = HashMap::with_capacity(rows.len());
        for row in rows {
            let attachment = Attachment::from_row(kind, &row)?;
            res.insert(attachment.id_string(), attachment);
        }
        Ok(res)
    }

    /// Inserts when the attachment has no id yet, otherwise writes every
    /// column back.
    pub async fn save(&self, attachment: &mut Attachment) -> Result<(), AttachmentError> {
        attachment.updated_at = Utc::now();
        let table = Alias::new(attachment.kind.table());
        let backend = self.conn.get_database_backend();

        if attachment.is_new() {
            let mut stmt = Query::insert()
                .into_table(table)
                .columns(ATTACHMENT_COLUMNS.into_iter().skip(1))
                .values_panic(column_values(attachment).into_iter().map(|(_, v)| v))
                .to_owned();

            attachment.id = if backend.support_returning() {
                stmt.returning_col(AttachmentColumn::Id);
                let row = self
                    .conn
                    .query_one(backend.build(&stmt))
                    .await?
                    .ok_or_else(|| DbErr::RecordNotInserted)?;
                row.try_get("", "id")?
            } else {
                let res = self.conn.execute(backend.build(&stmt)).await?;
                res.last_insert_id() as i64
            };
            debug!(kind = %attachment.kind, id = attachment.id, name = %attachment.name, "Created attachment");
        } else {
            let stmt = Query::update()
                .table(table)
                .values(column_values(attachment))
                .and_where(Expr::col(AttachmentColumn::Id).eq(attachment.id))
                .to_owned();
            let res = self.conn.execute(backend.build(&stmt)).await?;
            if res.rows_affected() == 0 {
                return Err(AttachmentError::NotFound(format!(
                    "{} {}",
                    attachment.kind, attachment.id
                )));
            }
        }
        Ok(())
    }

    /// Removes the attachment record. Association rows pointing at it are
    /// left alone, the next reconciliation of their field drops them.
    pub async fn delete(&self, attachment: &Attachment) -> Result<(), AttachmentError> {
        let stmt = Query::delete()
            .from_table(Alias::new(attachment.kind.table()))
            .and_where(Expr::col(AttachmentColumn::Id).eq(attachment.id))
            .to_owned();
        let backend = self.conn.get_database_backend();
        let res = self.conn.execute(backend.build(&stmt)).await?;
        if res.rows_affected() == 0 {
            return Err(AttachmentError::NotFound(format!(
                "{} {}",
                attachment.kind, attachment.id
            )));
        }
        debug!(kind = %attachment.kind, id = attachment.id, "Deleted attachment");
        Ok(())
    }

    /// Newest first, along with the total number of matches ignoring paging.
    pub async fn query(
        &self,
        kind: AttachmentKind,
        query: &AttachmentQuery,
    ) -> Result<(Vec<Attachment>, u64), AttachmentError> {
        let mut cond = Cond::all();
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            let mut any = Cond::any();
            for column in [
                AttachmentColumn::Name,
                AttachmentColumn::OriginalName,
                AttachmentColumn::Label,
                AttachmentColumn::Description,
            ] {
                any = any.add(
                    Expr::expr(Func::lower(Expr::col(column))).like(like_pattern(pattern.clone())),
                );
            }
            cond = cond.add(any);
        }
        if let Some(creator_id) = query.creator_id {
            cond = cond.add(Expr::col(AttachmentColumn::CreatorId).eq(creator_id));
        }
        if query.active_only {
            cond = cond.add(Expr::col(AttachmentColumn::Active).eq(true));
        }

        let backend = self.conn.get_database_backend();

        let count_stmt = Query::select()
            .expr_as(Func::count(Expr::col(AttachmentColumn::Id)), Alias::new("total"))
            .from(Alias::new(kind.table()))
            .cond_where(cond.clone())
            .to_owned();
        let total: i64 = match self.conn.query_one(backend.build(&count_stmt)).await? {
            Some(row) => row.try_get("", "total")?,
            None => 0,
        };

        let mut stmt = Query::select()
            .columns(ATTACHMENT_COLUMNS)
            .from(Alias::new(kind.table()))
            .cond_where(cond)
            .order_by(AttachmentColumn::CreatedAt, Order::Desc)
            .order_by(AttachmentColumn::Id, Order::Desc)
            .to_owned();
        if query.limit > 0 {
            stmt.limit(query.limit).offset(query.offset);
        }

        let rows = self.conn.query_all(backend.build(&stmt)).await?;
        let attachments = rows
            .iter()
            .map(|row| Attachment::from_row(kind, row))
            .collect::<Result<Vec<_>, DbErr>>()?;
        Ok((attachments, total.max(0) as u64))
    }
}

/// Every column except the id, in [`ATTACHMENT_COLUMNS`] order.
fn column_values(attachment: &Attachment) -> Vec<(AttachmentColumn, SimpleExpr)> {
    vec![
        (AttachmentColumn::Label, attachment.label.clone().into()),
        (AttachmentColumn::Description, attachment.description.clone().into()),
        (AttachmentColumn::Name, attachment.name.clone().into()),
        (AttachmentColumn::Size, attachment.size.into()),
        (AttachmentColumn::Active, attachment.active.into()),
        (AttachmentColumn::OriginalName, attachment.original_name.clone().into()),
        (AttachmentColumn::Mime, attachment.mime.clone().into()),
        (AttachmentColumn::Extension, attachment.extension.clone().into()),
        (AttachmentColumn::StorageName, attachment.storage_name.clone().into()),
        (AttachmentColumn::Urls, attachment.urls.to_json().into()),
        (
            AttachmentColumn::ExtraData,
            attachment.extra_data.as_ref().map(|extra| extra.to_json()).into(),
        ),
        (AttachmentColumn::CreatorId, attachment.creator_id.into()),
        (AttachmentColumn::CreatedAt, attachment.created_at.into()),
        (AttachmentColumn::UpdatedAt, attachment.updated_at.into()),
    ]
}

/// Escapes `%` and `_` for use inside a LIKE pattern.
fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn like_pattern(pattern: String) -> LikeExpr {
    LikeExpr::new(pattern).escape('\\')
}
