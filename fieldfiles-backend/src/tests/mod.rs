use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use fieldfiles_shared::{AttachmentError, AttachmentKind, FieldConfig, ORIGINAL_STYLE};
use image::{Rgb, RgbImage};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

use crate::blobstore::{logical_path, MemoryStorage, Storages};
use crate::cli::{run, Command, FieldArgs};
use crate::config::UploadConfig;
use crate::db::{start_db, AttachmentQuery, AttachmentStore};
use crate::entity::{AssocRow, Attachment};
use crate::processor::{ImageProcessor, RasterProcessor, ResizeOptions};
use crate::upload::UploadMetadata;
use crate::AppState;

static INIT: Once = Once::new();

/// Counts resizes and hands them to the real processor.
#[derive(Default)]
struct CountingProcessor {
    calls: AtomicUsize,
    inner: RasterProcessor,
}

#[async_trait]
impl ImageProcessor for CountingProcessor {
    async fn resize(
        &self,
        source: &Path,
        dest: &Path,
        options: &ResizeOptions,
    ) -> Result<(), AttachmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resize(source, dest, options).await
    }
}

struct FailingProcessor;

#[async_trait]
impl ImageProcessor for FailingProcessor {
    async fn resize(&self, _: &Path, _: &Path, _: &ResizeOptions) -> Result<(), AttachmentError> {
        Err(AttachmentError::Processor("out of pixels".to_string()))
    }
}

async fn setup_with(processor: Arc<dyn ImageProcessor>) -> (AppState, Arc<MemoryStorage>) {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                "fieldfiles_backend=debug,sea_orm_migration=warn",
            ))
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
    let memory = Arc::new(MemoryStorage::new("memory", "http://localhost/uploads"));
    let db = start_db(None).await.expect("Failed to start test DB");
    let state = AppState::build(
        db,
        Storages::new(memory.clone()),
        processor,
        UploadConfig::default(),
    );
    (state, memory)
}

async fn setup() -> (AppState, Arc<MemoryStorage>) {
    setup_with(Arc::new(RasterProcessor::default())).await
}

/// A saved attachment without any bytes behind it
async fn saved(state: &AppState, kind: AttachmentKind, original_name: &str) -> Attachment {
    let mut attachment = Attachment::new(
        kind,
        format!("{}.txt", Uuid::new_v4()),
        original_name.to_string(),
        "memory",
    );
    state.store.save(&mut attachment).await.expect("save");
    attachment
}

async fn rows(state: &AppState, field: &FieldConfig, model_id: &str) -> Vec<AssocRow> {
    state
        .store
        .find_rows_for_field(field.kind, &field.model_name, model_id, &field.field_name)
        .await
        .expect("rows")
}

/// `(attachment id, order)` pairs in stored order
async fn placements(state: &AppState, field: &FieldConfig, model_id: &str) -> Vec<(i64, i32)> {
    rows(state, field, model_id)
        .await
        .into_iter()
        .map(|row| (row.attachment_id, row.order))
        .collect()
}

fn ids(attachments: &[&Attachment]) -> Vec<String> {
    attachments.iter().map(|a| a.id_string()).collect()
}

fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(width, height, Rgb([30, 120, 200]))
        .save(&path)
        .expect("write png");
    path
}

#[tokio::test]
async fn test_failing_setup_db() {
    // I sure hope this path isn't writeable!
    start_db(Some(
        &format!("/asdfasdf{}/asd{}fsadfdf", Uuid::new_v4(), Uuid::new_v4()).into(),
    ))
    .await
    .expect_err("Should fail to open DB");
}

#[tokio::test]
async fn test_reconcile_into_empty_field() {
    let (state, _) = setup().await;
    let field = FieldConfig::files("post", "attachments");
    let a = saved(&state, AttachmentKind::File, "a.txt").await;
    let b = saved(&state, AttachmentKind::File, "b.txt").await;

    let summary = state
        .reconciler
        .reconcile_field("1", &ids(&[&a, &b]), &field)
        .await
        .expect("reconcile");
    assert_eq!((summary.removed, summary.added, summary.skipped), (0, 2, 0));
    assert_eq!(placements(&state, &field, "1").await, vec![(a.id, 0), (b.id, 1)]);

    // other records and fields are untouched
    assert!(placements(&state, &field, "2").await.is_empty());
    assert!(placements(&state, &FieldConfig::files("post", "other"), "1")
        .await
        .is_empty());
}

#[tokio::test]
async fn test_reconcile_replaces_everything() {
    let (state, _) = setup().await;
    let field = FieldConfig::images("user", "gallery");
    let a = saved(&state, AttachmentKind::Image, "a.png").await;
    let b = saved(&state, AttachmentKind::Image, "b.png").await;
    let c = saved(&state, AttachmentKind::Image, "c.png").await;

    state
        .reconciler
        .reconcile_field("9", &ids(&[&a]), &field)
        .await
        .expect("reconcile");
    assert_eq!(placements(&state, &field, "9").await, vec![(a.id, 0)]);

    let summary = state
        .reconciler
        .reconcile_field("9", &ids(&[&b, &c]), &field)
        .await
        .expect("reconcile");
    assert_eq!((summary.removed, summary.added), (1, 2));
    assert_eq!(placements(&state, &field, "9").await, vec![(b.id, 0), (c.id, 1)]);

    // the attachment itself survives losing its last row
    assert!(state
        .store
        .find_by_id(AttachmentKind::Image, &a.id_string())
        .await
        .expect("find")
        .is_some());
}

#[tokio::test]
async fn test_reconcile_partial_overlap_keeps_survivor_order() {
    let (state, _) = setup().await;
    let field = FieldConfig::files("post", "docs");
    let mut all = Vec::new();
    for name in ["a", "b", "c", "d", "e", "f"] {
        all.push(saved(&state, AttachmentKind::File, name).await);
    }
    let [a, b, c, d, e, f] = [&all[0], &all[1], &all[2], &all[3], &all[4], &all[5]];

    state
        .reconciler
        .reconcile_field("1", &ids(&[a, b, c, d]), &field)
        .await
        .expect("reconcile");

    let summary = state
        .reconciler
        .reconcile_field("1", &ids(&[c, d, e, f]), &field)
        .await
        .expect("reconcile");
    assert_eq!((summary.removed, summary.added), (2, 2));

    // c and d keep 2 and 3, e and f land at their desired indices
    let mut stored = placements(&state, &field, "1").await;
    stored.sort();
    assert_eq!(stored, vec![(c.id, 2), (d.id, 3), (e.id, 2), (f.id, 3)]);

    let listed: Vec<i64> = state
        .store
        .find_attachments_in_field(AttachmentKind::File, "post", "1", "docs", None)
        .await
        .expect("list")
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(listed, vec![c.id, e.id, d.id, f.id]);
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let (state, _) = setup().await;
    let field = FieldConfig::files("post", "docs");
    let a = saved(&state, AttachmentKind::File, "a").await;
    let b = saved(&state, AttachmentKind::File, "b").await;
    let desired = ids(&[&b, &a]);

    state
        .reconciler
        .reconcile_field("1", &desired, &field)
        .await
        .expect("reconcile");
    let before = rows(&state, &field, "1").await;

    let summary = state
        .reconciler
        .reconcile_field("1", &desired, &field)
        .await
        .expect("reconcile");
    assert!(summary.is_noop());
    // same row ids means nothing was deleted and re-created
    assert_eq!(rows(&state, &field, "1").await, before);
}

#[tokio::test]
async fn test_reconcile_empty_to_empty() {
    let (state, _) = setup().await;
    let field = FieldConfig::files("post", "docs");
    let summary = state
        .reconciler
        .reconcile_field("1", &[], &field)
        .await
        .expect("reconcile");
    assert_eq!(summary, Default::default());
    assert!(rows(&state, &field, "1").await.is_empty());
}

#[tokio::test]
async fn test_reconcile_skips_unknown_ids() {
    let (state, _) = setup().await;
    let field = FieldConfig::files("post", "docs");
    let a = saved(&state, AttachmentKind::File, "a").await;
    // an image id isn't a file id
    let image = saved(&state, AttachmentKind::Image, "i").await;

    let desired = vec![
        "999999".to_string(),
        a.id_string(),
        "not-a-number".to_string(),
        a.id_string(),
        (image.id + 1000).to_string(),
    ];
    let summary = state
        .reconciler
        .reconcile_field("1", &desired, &field)
        .await
        .expect("reconcile");
    assert_eq!((summary.added, summary.skipped), (1, 3));
    assert_eq!(placements(&state, &field, "1").await, vec![(a.id, 1)]);
}

#[tokio::test]
async fn test_reconcile_drops_dangling_rows() {
    let (state, _) = setup().await;
    let field = FieldConfig::files("post", "docs");
    let a = saved(&state, AttachmentKind::File, "a").await;
    let b = saved(&state, AttachmentKind::File, "b").await;
    state
        .reconciler
        .reconcile_field("1", &ids(&[&a, &b]), &field)
        .await
        .expect("reconcile");

    state.store.delete(&a).await.expect("delete");
    // the row stays, but listing hides it
    assert_eq!(rows(&state, &field, "1").await.len(), 2);
    let listed = state
        .store
        .find_attachments_in_field(AttachmentKind::File, "post", "1", "docs", None)
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);

    let summary = state
        .reconciler
        .reconcile_field("1", &ids(&[&b]), &field)
        .await
        .expect("reconcile");
    assert_eq!(summary.removed, 1);
    assert_eq!(placements(&state, &field, "1").await, vec![(b.id, 1)]);
}

#[tokio::test]
async fn test_reconcile_store_failure_keeps_earlier_steps() {
    let (state, _) = setup().await;
    let field = FieldConfig::files("post", "docs");
    let a = saved(&state, AttachmentKind::File, "a").await;
    let b = saved(&state, AttachmentKind::File, "b").await;
    state
        .reconciler
        .reconcile_field("1", &ids(&[&a]), &field)
        .await
        .expect("reconcile");

    // the attachment lookup runs after the delete, so this breaks the add step only
    let conn = state.store.conn();
    conn.execute_unprepared("ALTER TABLE files RENAME TO files_gone")
        .await
        .expect("rename");
    let res = state
        .reconciler
        .reconcile_field("1", &ids(&[&b]), &field)
        .await;
    assert!(matches!(res, Err(AttachmentError::Store(_))));
    assert!(placements(&state, &field, "1").await.is_empty());

    conn.execute_unprepared("ALTER TABLE files_gone RENAME TO files")
        .await
        .expect("rename back");
    let summary = state
        .reconciler
        .reconcile_field("1", &ids(&[&b]), &field)
        .await
        .expect("retry");
    assert_eq!((summary.removed, summary.added, summary.skipped), (0, 1, 0));
    assert_eq!(placements(&state, &field, "1").await, vec![(b.id, 0)]);
}

#[tokio::test]
async fn test_reconcile_with_objects() {
    let (state, _) = setup().await;
    let field = FieldConfig::images("user", "avatar");
    let image = saved(&state, AttachmentKind::Image, "me.png").await;
    let file = saved(&state, AttachmentKind::File, "me.txt").await;

    let summary = state
        .reconciler
        .reconcile_field_with("4", std::slice::from_ref(&image), &field)
        .await
        .expect("reconcile");
    assert_eq!(summary.added, 1);

    let res = state
        .reconciler
        .reconcile_field_with("4", &[file], &field)
        .await;
    assert!(matches!(res, Err(AttachmentError::Validation(_))));
    assert_eq!(placements(&state, &field, "4").await, vec![(image.id, 0)]);
}

#[tokio::test]
async fn test_clear_field_and_record() {
    let (state, _) = setup().await;
    let docs = FieldConfig::files("post", "docs");
    let extra = FieldConfig::files("post", "extra");
    let a = saved(&state, AttachmentKind::File, "a").await;
    let b = saved(&state, AttachmentKind::File, "b").await;

    for field in [&docs, &extra] {
        state
            .reconciler
            .reconcile_field("1", &ids(&[&a, &b]), field)
            .await
            .expect("reconcile");
    }
    state
        .reconciler
        .reconcile_field("2", &ids(&[&a]), &docs)
        .await
        .expect("reconcile");

    let in_record = state
        .store
        .find_attachments_in_record(AttachmentKind::File, "post", "1")
        .await
        .expect("record");
    let fields: Vec<&str> = in_record.iter().map(|(field, _)| field.as_str()).collect();
    assert_eq!(fields, vec!["docs", "docs", "extra", "extra"]);

    assert_eq!(state.reconciler.clear_field("1", &docs).await.expect("clear"), 2);
    assert!(rows(&state, &docs, "1").await.is_empty());
    assert_eq!(rows(&state, &extra, "1").await.len(), 2);

    assert_eq!(
        state
            .reconciler
            .clear_record("post", "1", AttachmentKind::File)
            .await
            .expect("clear"),
        2
    );
    assert!(rows(&state, &extra, "1").await.is_empty());
    // another record keeps its rows
    assert_eq!(rows(&state, &docs, "2").await.len(), 1);
}

#[tokio::test]
async fn test_store_empty_inputs_skip_the_database() {
    // any query against a disconnected store fails
    let store = AttachmentStore::new(DatabaseConnection::Disconnected);
    assert_eq!(
        store
            .delete_rows_for_field(AttachmentKind::File, "post", "1", "docs", &[])
            .await
            .expect("empty delete"),
        0
    );
    store
        .create_rows(AttachmentKind::Image, &[])
        .await
        .expect("empty create");
    assert!(store
        .find_attachments_by_ids(AttachmentKind::File, &["abc".to_string()])
        .await
        .expect("nothing numeric")
        .is_empty());
    assert!(store
        .find_by_id(AttachmentKind::File, "  ")
        .await
        .expect("blank key")
        .is_none());
}

#[tokio::test]
async fn test_find_by_id_or_name() {
    let (state, _) = setup().await;
    let mut image = Attachment::new(
        AttachmentKind::Image,
        "5f1c2a.webp".to_string(),
        "cat.png".to_string(),
        "memory",
    );
    state.store.save(&mut image).await.expect("save");
    let file = saved(&state, AttachmentKind::File, "notes.txt").await;

    for key in [image.id_string(), "5f1c2a.webp".into(), "5f1c2a".into(), "5f1c2a.png".into()] {
        let found = state
            .store
            .find_by_id(AttachmentKind::Image, &key)
            .await
            .expect("find");
        assert_eq!(found.map(|a| a.id), Some(image.id), "lookup by {key}");
    }

    // files only match their exact name
    assert_eq!(
        state
            .store
            .find_by_id(AttachmentKind::File, &file.name)
            .await
            .expect("find")
            .map(|a| a.id),
        Some(file.id)
    );
    assert!(state
        .store
        .find_by_id(AttachmentKind::File, file.name_stem())
        .await
        .expect("find")
        .is_none());
    assert!(state
        .store
        .find_by_id(AttachmentKind::Image, "missing")
        .await
        .expect("find")
        .is_none());
}

#[tokio::test]
async fn test_corrupt_serialized_columns_read_as_empty() {
    let (state, _) = setup().await;
    let mut image = saved(&state, AttachmentKind::Image, "cat.png").await;
    image.urls.set(ORIGINAL_STYLE, "http://x/original.png");
    state.store.save(&mut image).await.expect("save");

    state
        .store
        .conn()
        .execute_unprepared(&format!(
            "UPDATE images SET urls = '{{not json', \"extraData\" = '[1,' WHERE id = {}",
            image.id
        ))
        .await
        .expect("corrupt row");

    let found = state
        .store
        .find_by_id(AttachmentKind::Image, &image.id_string())
        .await
        .expect("degraded read")
        .expect("still found");
    assert!(found.urls.is_empty());
    assert!(found.extra_data.is_none());
    assert_eq!(found.original_name, "cat.png");
}

#[tokio::test]
async fn test_save_update_and_delete() {
    let (state, _) = setup().await;
    let mut file = saved(&state, AttachmentKind::File, "a.txt").await;
    assert!(file.id > 0);
    let created = file.created_at;

    file.label = Some("Quarterly report".to_string());
    file.extra_data = Some(fieldfiles_shared::ExtraData::default());
    state.store.save(&mut file).await.expect("update");

    let found = state
        .store
        .find_by_id(AttachmentKind::File, &file.id_string())
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(found.label.as_deref(), Some("Quarterly report"));
    assert!(found.extra_data.is_some());
    assert_eq!(found.created_at.timestamp(), created.timestamp());
    assert!(found.updated_at >= found.created_at);

    state.store.delete(&file).await.expect("delete");
    assert!(state
        .store
        .find_by_id(AttachmentKind::File, &file.id_string())
        .await
        .expect("find")
        .is_none());
    assert!(matches!(
        state.store.delete(&file).await,
        Err(AttachmentError::NotFound(_))
    ));
    assert!(matches!(
        state.store.save(&mut file).await,
        Err(AttachmentError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_query_search_and_paging() {
    let (state, _) = setup().await;
    for (name, creator) in [("Invoice 1.pdf", 1), ("invoice 2.pdf", 1), ("holiday.jpg", 2)] {
        let mut file = saved(&state, AttachmentKind::File, name).await;
        file.creator_id = Some(creator);
        state.store.save(&mut file).await.expect("save");
    }

    let (found, total) = state
        .store
        .query(
            AttachmentKind::File,
            &AttachmentQuery {
                search: Some("INVOICE".to_string()),
                limit: 1,
                ..Default::default()
            },
        )
        .await
        .expect("query");
    assert_eq!(total, 2);
    assert_eq!(found.len(), 1);

    let (found, total) = state
        .store
        .query(
            AttachmentKind::File,
            &AttachmentQuery {
                creator_id: Some(2),
                ..Default::default()
            },
        )
        .await
        .expect("query");
    assert_eq!(total, 1);
    assert_eq!(found[0].original_name, "holiday.jpg");

    let (_, total) = state
        .store
        .query(
            AttachmentKind::File,
            &AttachmentQuery {
                search: Some("100%".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("query");
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_upload_file() {
    let (state, memory) = setup().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("upload.bin");
    std::fs::write(&path, "name,total\nwidget,3\n").expect("write");

    let attachment = state
        .uploads
        .upload(
            AttachmentKind::File,
            &path,
            UploadMetadata {
                label: Some("Stock".to_string()),
                ..UploadMetadata::new("stock.csv")
            },
            None,
        )
        .await
        .expect("upload");

    assert!(attachment.id > 0);
    assert_eq!(attachment.extension.as_deref(), Some("csv"));
    assert_eq!(attachment.mime.as_deref(), Some("text/csv"));
    assert!(attachment.name.ends_with(".csv"));
    assert_eq!(attachment.size, Some(20));
    assert_eq!(attachment.storage_name, "memory");

    let stored = logical_path(ORIGINAL_STYLE, &attachment);
    assert_eq!(
        memory.get(&stored).await.as_deref(),
        Some("name,total\nwidget,3\n".as_bytes())
    );
    assert_eq!(
        attachment.urls.original(),
        Some(format!("http://localhost/uploads/{stored}").as_str())
    );

    let found = state
        .store
        .find_by_id(AttachmentKind::File, &attachment.name)
        .await
        .expect("find")
        .expect("saved");
    assert_eq!(found.id, attachment.id);
    assert_eq!(found.urls, attachment.urls);
    assert_eq!(found.label.as_deref(), Some("Stock"));
    assert_eq!(found.original_name, "stock.csv");
    assert_eq!(found.size, Some(20));
}

#[tokio::test]
async fn test_upload_image_is_converted() {
    let (state, memory) = setup().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_png(dir.path(), "wide.png", 3000, 1000);

    let image = state
        .uploads
        .upload(AttachmentKind::Image, &path, UploadMetadata::new("wide.png"), None)
        .await
        .expect("upload");

    assert_eq!(image.extension.as_deref(), Some("webp"));
    assert_eq!(image.mime.as_deref(), Some("image/webp"));
    assert!(image.name.ends_with(".webp"));

    let bytes = memory
        .get(&logical_path(ORIGINAL_STYLE, &image))
        .await
        .expect("original stored");
    assert_eq!(image.size, Some(bytes.len() as i64));
    let decoded = image::load_from_memory(&bytes).expect("decode");
    assert_eq!((decoded.width(), decoded.height()), (2560, 853));

    let config = UploadConfig::default();
    for (style, _) in config.derived_styles() {
        assert_eq!(
            image.urls.get(style),
            Some(config.placeholder_url(style, &image.name).as_str())
        );
    }
}

#[tokio::test]
async fn test_upload_ignored_format_is_untouched() {
    let processor = Arc::new(CountingProcessor::default());
    let (state, memory) = setup_with(processor.clone()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("anim");
    // a gif header is enough for detection
    let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;".to_vec();
    std::fs::write(&path, &gif).expect("write");

    let image = state
        .uploads
        .upload(AttachmentKind::Image, &path, UploadMetadata::new("dance.gif"), None)
        .await
        .expect("upload");
    assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(image.extension.as_deref(), Some("gif"));
    assert_eq!(image.mime.as_deref(), Some("image/gif"));
    assert!(image.name.ends_with(".gif"));
    assert_eq!(
        memory.get(&logical_path(ORIGINAL_STYLE, &image)).await,
        Some(gif)
    );
}

#[tokio::test]
async fn test_upload_failure_saves_nothing() {
    let (state, memory) = setup_with(Arc::new(FailingProcessor)).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_png(dir.path(), "cat.png", 10, 10);

    let res = state
        .uploads
        .upload(AttachmentKind::Image, &path, UploadMetadata::new("cat.png"), None)
        .await;
    assert!(matches!(res, Err(AttachmentError::Processor(_))));

    let (_, total) = state
        .store
        .query(AttachmentKind::Image, &AttachmentQuery::default())
        .await
        .expect("query");
    assert_eq!(total, 0);
    assert!(memory.is_empty().await);

    // unreadable source
    let res = state
        .uploads
        .upload(
            AttachmentKind::File,
            &dir.path().join("missing.txt"),
            UploadMetadata::new("missing.txt"),
            None,
        )
        .await;
    assert!(matches!(res, Err(AttachmentError::Validation(_))));

    // unknown backend
    let res = state
        .uploads
        .upload(
            AttachmentKind::File,
            &path,
            UploadMetadata::new("cat.png"),
            Some("carrier-pigeon"),
        )
        .await;
    assert!(matches!(res, Err(AttachmentError::Validation(_))));
    assert!(memory.is_empty().await);
}

#[tokio::test]
async fn test_upload_store_failure_removes_blob() {
    let (state, memory) = setup().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "remember the milk\n").expect("write");

    state
        .store
        .conn()
        .execute_unprepared("DROP TABLE files")
        .await
        .expect("drop table");
    let res = state
        .uploads
        .upload(AttachmentKind::File, &path, UploadMetadata::new("notes.txt"), None)
        .await;
    assert!(matches!(res, Err(AttachmentError::Store(_))));
    assert!(memory.is_empty().await);
}

#[tokio::test]
async fn test_style_generated_once() {
    let processor = Arc::new(CountingProcessor::default());
    let (state, memory) = setup_with(processor.clone()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_png(dir.path(), "square.png", 600, 600);

    let mut image = state
        .uploads
        .upload(AttachmentKind::Image, &path, UploadMetadata::new("square.png"), None)
        .await
        .expect("upload");
    assert_eq!(processor.calls.load(Ordering::SeqCst), 1);

    let url = state
        .styles
        .resolve_style(&mut image, "thumbnail")
        .await
        .expect("thumbnail");
    let thumb_path = logical_path("thumbnail", &image);
    assert_eq!(url, format!("http://localhost/uploads/{thumb_path}"));
    assert_eq!(processor.calls.load(Ordering::SeqCst), 2);

    let bytes = memory.get(&thumb_path).await.expect("thumbnail stored");
    let decoded = image::load_from_memory(&bytes).expect("decode");
    assert_eq!((decoded.width(), decoded.height()), (150, 150));

    // persisted, and served from the record from now on
    let mut reloaded = state
        .store
        .find_by_id(AttachmentKind::Image, &image.id_string())
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(reloaded.urls.get("thumbnail"), Some(url.as_str()));
    let again = state
        .styles
        .resolve_style(&mut reloaded, "thumbnail")
        .await
        .expect("cached");
    assert_eq!(again, url);
    assert_eq!(processor.calls.load(Ordering::SeqCst), 2);

    state
        .styles
        .resolve_style_forced(&mut reloaded, "thumbnail")
        .await
        .expect("forced");
    assert_eq!(processor.calls.load(Ordering::SeqCst), 3);

    assert_eq!(
        state
            .styles
            .resolve_style(&mut reloaded, ORIGINAL_STYLE)
            .await
            .ok()
            .as_deref(),
        image.urls.original()
    );
    assert!(matches!(
        state.styles.resolve_style(&mut reloaded, "poster").await,
        Err(AttachmentError::Validation(_))
    ));
}

#[tokio::test]
async fn test_style_missing_original() {
    let (state, _) = setup().await;
    let mut image = saved(&state, AttachmentKind::Image, "ghost.png").await;
    let res = state.styles.resolve_style(&mut image, "thumbnail").await;
    assert!(matches!(
        res,
        Err(AttachmentError::Storage(fieldfiles_shared::StorageError::NotFound(_)))
    ));

    let mut file = saved(&state, AttachmentKind::File, "doc.txt").await;
    assert!(matches!(
        state.styles.resolve_style(&mut file, "thumbnail").await,
        Err(AttachmentError::Validation(_))
    ));
}

#[tokio::test]
async fn test_reset_and_reprocess_styles() {
    let (state, memory) = setup().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_png(dir.path(), "cat.png", 800, 400);
    let mut image = state
        .uploads
        .upload(AttachmentKind::Image, &path, UploadMetadata::new("cat.png"), None)
        .await
        .expect("upload");
    let config = UploadConfig::default();

    state
        .styles
        .resolve_style(&mut image, "medium")
        .await
        .expect("medium");
    let medium_path = logical_path("medium", &image);
    assert!(memory.contains(&medium_path).await);

    state.styles.reset_styles(&mut image).await.expect("reset");
    assert!(!memory.contains(&medium_path).await);
    assert!(memory.contains(&logical_path(ORIGINAL_STYLE, &image)).await);
    assert_eq!(
        image.urls.get("medium"),
        Some(config.placeholder_url("medium", &image.name).as_str())
    );

    state
        .styles
        .resolve_style(&mut image, "medium")
        .await
        .expect("medium again");
    state.styles.reprocess(&mut image).await.expect("reprocess");
    let reloaded = state
        .store
        .find_by_id(AttachmentKind::Image, &image.name)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(
        reloaded.urls.get("medium"),
        Some(config.placeholder_url("medium", &image.name).as_str())
    );
    assert_eq!(reloaded.urls.original(), image.urls.original());
}

#[tokio::test]
async fn test_cli_attach_and_list() {
    let state = AppState::test().await;
    let a = saved(&state, AttachmentKind::File, "a.txt").await;
    let b = saved(&state, AttachmentKind::File, "b.txt").await;
    let field = FieldArgs {
        kind: AttachmentKind::File,
        model: "post".to_string(),
        id: "3".to_string(),
        field: "docs".to_string(),
    };

    let out = run(
        &state,
        Command::Attach {
            field: field.clone(),
            ids: ids(&[&b, &a]),
        },
    )
    .await
    .expect("attach");
    assert_eq!(out["added"], 2);
    assert_eq!(out["attachments"][0]["id"], b.id);

    let out = run(
        &state,
        Command::List {
            field: field.clone(),
            limit: Some(1),
        },
    )
    .await
    .expect("list");
    assert_eq!(out.as_array().map(Vec::len), Some(1));

    let out = run(&state, Command::Clear { field }).await.expect("clear");
    assert_eq!(out["removed"], 2);

    let res = run(
        &state,
        Command::Show {
            kind: AttachmentKind::File,
            key: "nope".to_string(),
        },
    )
    .await;
    assert!(matches!(res, Err(AttachmentError::NotFound(_))));
}
