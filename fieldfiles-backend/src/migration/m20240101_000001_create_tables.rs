use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in ["files", "images"] {
            manager.create_table(attachment_table(table)).await?;
        }

        for (table, fk_column) in [("fileassocs", "fileId"), ("imageassocs", "imageId")] {
            manager.create_table(assoc_table(table, fk_column)).await?;

            // reconciliation always filters on the owning field
            manager
                .create_index(
                    Index::create()
                        .name(format!("idx_{table}_field"))
                        .table(Alias::new(table))
                        .col(Assoc::ModelName)
                        .col(Assoc::ModelId)
                        .col(Assoc::Field)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in ["imageassocs", "fileassocs", "images", "files"] {
            manager
                .drop_table(Table::drop().table(Alias::new(table)).to_owned())
                .await?;
        }

        Ok(())
    }
}

fn attachment_table(table: &str) -> TableCreateStatement {
    Table::create()
        .table(Alias::new(table))
        .if_not_exists()
        .col(
            ColumnDef::new(Attachment::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(Attachment::Label).string())
        .col(ColumnDef::new(Attachment::Description).text())
        .col(ColumnDef::new(Attachment::Name).string().not_null().unique_key())
        .col(ColumnDef::new(Attachment::Size).big_integer())
        .col(
            ColumnDef::new(Attachment::Active)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(ColumnDef::new(Attachment::OriginalName).string())
        .col(ColumnDef::new(Attachment::Mime).string())
        .col(ColumnDef::new(Attachment::Extension).string())
        .col(ColumnDef::new(Attachment::StorageName).string())
        .col(ColumnDef::new(Attachment::Urls).text())
        .col(ColumnDef::new(Attachment::ExtraData).text())
        .col(ColumnDef::new(Attachment::CreatorId).big_integer())
        .col(
            ColumnDef::new(Attachment::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(Attachment::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned()
}

fn assoc_table(table: &str, fk_column: &str) -> TableCreateStatement {
    Table::create()
        .table(Alias::new(table))
        .if_not_exists()
        .col(
            ColumnDef::new(Assoc::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(Assoc::ModelName).string().not_null())
        .col(ColumnDef::new(Assoc::ModelId).string().not_null())
        .col(ColumnDef::new(Assoc::Field).string().not_null())
        .col(ColumnDef::new(Assoc::Order).integer().not_null().default(0))
        .col(ColumnDef::new(Alias::new(fk_column)).big_integer().not_null())
        .col(
            ColumnDef::new(Assoc::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(Assoc::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned()
}

#[derive(DeriveIden)]
enum Attachment {
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

#[derive(DeriveIden)]
enum Assoc {
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
