use chrono::Utc;
use fieldfiles_shared::{AttachmentError, AttachmentKind};
use sea_orm::sea_query::{Alias, Expr, Order, Query};
use sea_orm::{ConnectionTrait, DbErr, FromQueryResult};
use tracing::debug;

use super::AttachmentStore;
use crate::entity::{
    AssocColumn, AssocRow, Attachment, AttachmentColumn, AttachmentRecord, ATTACHMENT_COLUMNS,
    ATTACHMENT_ID_ALIAS,
};

/// An attachment row joined with the field it is linked through.
#[derive(FromQueryResult)]
struct FieldAttachment {
    field: String,
    #[sea_orm(nested)]
    record: AttachmentRecord,
}

impl AttachmentStore {
    /// Every association row of one field, dangling ones included.
    pub async fn find_rows_for_field(
        &self,
        kind: AttachmentKind,
        model_name: &str,
        model_id: &str,
        field: &str,
    ) -> Result<Vec<AssocRow>, AttachmentError> {
        let stmt = Query::select()
            .columns([
                AssocColumn::Id,
                AssocColumn::ModelName,
                AssocColumn::ModelId,
                AssocColumn::Field,
                AssocColumn::Order,
            ])
            .expr_as(
                Expr::col(Alias::new(kind.assoc_column())),
                Alias::new(ATTACHMENT_ID_ALIAS),
            )
            .from(Alias::new(kind.assoc_table()))
            .and_where(Expr::col(AssocColumn::ModelName).eq(model_name))
            .and_where(Expr::col(AssocColumn::ModelId).eq(model_id))
            .and_where(Expr::col(AssocColumn::Field).eq(field))
            .order_by(AssocColumn::Order, Order::Asc)
            .order_by(AssocColumn::Id, Order::Asc)
            .to_owned();

        let backend = self.conn.get_database_backend();
        let rows = self.conn.query_all(backend.build(&stmt)).await?;
        Ok(rows
            .iter()
            .map(|row| AssocRow::from_query_result(row, ""))
            .collect::<Result<Vec<_>, DbErr>>()?)
    }

    /// Deletes the rows of one field pointing at any of `attachment_ids` in a
    /// single statement. Returns how many rows went away.
    pub async fn delete_rows_for_field(
        &self,
        kind: AttachmentKind,
        model_name: &str,
        model_id: &str,
        field: &str,
        attachment_ids: &[i64],
    ) -> Result<u64, AttachmentError> {
        if attachment_ids.is_empty() {
            return Ok(0);
        }

        let stmt = Query::delete()
            .from_table(Alias::new(kind.assoc_table()))
            .and_where(Expr::col(AssocColumn::ModelName).eq(model_name))
            .and_where(Expr::col(AssocColumn::ModelId).eq(model_id))
            .and_where(Expr::col(AssocColumn::Field).eq(field))
            .and_where(Expr::col(Alias::new(kind.assoc_column())).is_in(attachment_ids.iter().copied()))
            .to_owned();

        let backend = self.conn.get_database_backend();
        let res = self.conn.execute(backend.build(&stmt)).await?;
        debug!(
            %kind, model_name, model_id, field,
            removed = res.rows_affected(),
            "Removed association rows"
        );
        Ok(res.rows_affected())
    }

    /// Inserts all rows in one statement. Row ids are ignored.
    pub async fn create_rows(
        &self,
        kind: AttachmentKind,
        rows: &[AssocRow],
    ) -> Result<(), AttachmentError> {
        if rows.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut stmt = Query::insert();
        stmt.into_table(Alias::new(kind.assoc_table())).columns([
            Alias::new("modelName"),
            Alias::new("modelId"),
            Alias::new("field"),
            Alias::new("order"),
            Alias::new(kind.assoc_column()),
            Alias::new("createdAt"),
            Alias::new("updatedAt"),
        ]);
        for row in rows {
            stmt.values_panic([
                row.model_name.clone().into(),
                row.model_id.clone().into(),
                row.field.clone().into(),
                row.order.into(),
                row.attachment_id.into(),
                now.into(),
                now.into(),
            ]);
        }

        let backend = self.conn.get_database_backend();
        self.conn.execute(backend.build(&stmt)).await?;
        debug!(%kind, created = rows.len(), "Created association rows");
        Ok(())
    }

    /// Attachments linked to one field, in display order.
    pub async fn find_attachments_in_field(
        &self,
        kind: AttachmentKind,
        model_name: &str,
        model_id: &str,
        field: &str,
        limit: Option<u64>,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        self.find_linked(kind, model_name, model_id, Some(field), limit)
            .await
    }

    /// Attachments linked to any field of one record, grouped by field.
    pub async fn find_attachments_in_record(
        &self,
        kind: AttachmentKind,
        model_name: &str,
        model_id: &str,
    ) -> Result<Vec<(String, Attachment)>, AttachmentError> {
        let assoc = Alias::new(kind.assoc_table());
        let stmt = linked_select(kind)
            .column((assoc.clone(), AssocColumn::Field))
            .and_where(Expr::col((assoc.clone(), AssocColumn::ModelName)).eq(model_name))
            .and_where(Expr::col((assoc.clone(), AssocColumn::ModelId)).eq(model_id))
            .order_by((assoc.clone(), AssocColumn::Field), Order::Asc)
            .order_by((assoc.clone(), AssocColumn::Order), Order::Asc)
            .order_by((assoc, AssocColumn::Id), Order::Asc)
            .to_owned();

        let backend = self.conn.get_database_backend();
        let rows = self.conn.query_all(backend.build(&stmt)).await?;
        rows.iter()
            .map(|row| {
                let linked = FieldAttachment::from_query_result(row, "")?;
                Ok((linked.field, Attachment::from((kind, linked.record))))
            })
            .collect()
    }

    async fn find_linked(
        &self,
        kind: AttachmentKind,
        model_name: &str,
        model_id: &str,
        field: Option<&str>,
        limit: Option<u64>,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        let assoc = Alias::new(kind.assoc_table());
        let mut stmt = linked_select(kind)
            .and_where(Expr::col((assoc.clone(), AssocColumn::ModelName)).eq(model_name))
            .and_where(Expr::col((assoc.clone(), AssocColumn::ModelId)).eq(model_id))
            .order_by((assoc.clone(), AssocColumn::Order), Order::Asc)
            .order_by((assoc.clone(), AssocColumn::Id), Order::Asc)
            .to_owned();
        if let Some(field) = field {
            stmt.and_where(Expr::col((assoc, AssocColumn::Field)).eq(field));
        }
        if let Some(limit) = limit {
            stmt.limit(limit);
        }

        let backend = self.conn.get_database_backend();
        let rows = self.conn.query_all(backend.build(&stmt)).await?;
        Ok(rows
            .iter()
            .map(|row| Attachment::from_row(kind, row))
            .collect::<Result<Vec<_>, DbErr>>()?)
    }

    /// Drops every row of one field. The attachments themselves stay.
    pub async fn clear_field(
        &self,
        kind: AttachmentKind,
        model_name: &str,
        model_id: &str,
        field: &str,
    ) -> Result<u64, AttachmentError> {
        let stmt = Query::delete()
            .from_table(Alias::new(kind.assoc_table()))
            .and_where(Expr::col(AssocColumn::ModelName).eq(model_name))
            .and_where(Expr::col(AssocColumn::ModelId).eq(model_id))
            .and_where(Expr::col(AssocColumn::Field).eq(field))
            .to_owned();
        let backend = self.conn.get_database_backend();
        Ok(self.conn.execute(backend.build(&stmt)).await?.rows_affected())
    }

    /// Drops every row of every field of one record.
    pub async fn clear_record(
        &self,
        kind: AttachmentKind,
        model_name: &str,
        model_id: &str,
    ) -> Result<u64, AttachmentError> {
        let stmt = Query::delete()
            .from_table(Alias::new(kind.assoc_table()))
            .and_where(Expr::col(AssocColumn::ModelName).eq(model_name))
            .and_where(Expr::col(AssocColumn::ModelId).eq(model_id))
            .to_owned();
        let backend = self.conn.get_database_backend();
        Ok(self.conn.execute(backend.build(&stmt)).await?.rows_affected())
    }
}

/// Attachment columns joined through the association table, so rows whose
/// attachment is gone never show up.
fn linked_select(kind: AttachmentKind) -> sea_orm::sea_query::SelectStatement {
    let table = Alias::new(kind.table());
    let assoc = Alias::new(kind.assoc_table());
    Query::select()
        .columns(ATTACHMENT_COLUMNS.map(|column| (table.clone(), column)))
        .from(table.clone())
        .inner_join(
            assoc.clone(),
            Expr::col((assoc, Alias::new(kind.assoc_column())))
                .equals((table, AttachmentColumn::Id)),
        )
        .to_owned()
}
