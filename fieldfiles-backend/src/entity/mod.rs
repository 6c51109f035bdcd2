pub mod assoc;
pub mod attachment;

pub use assoc::{AssocColumn, AssocRow, ATTACHMENT_ID_ALIAS};
pub use attachment::{Attachment, AttachmentColumn, AttachmentRecord, ATTACHMENT_COLUMNS};
