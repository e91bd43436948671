use std::path::Path;

use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum What {
    BulkRequest,
    BulkResponseOk,
    BulkResponseErr,
    DeleteIndex,
}

impl What {
    pub fn as_str(&self) -> &'static str {
        match self {
            What::BulkRequest => "BulkRequest",
            What::BulkResponseOk => "BulkResponseOk",
            What::BulkResponseErr => "BulkResponseErr",
            What::DeleteIndex => "DeleteIndex",
        }
    }
}

/// Append-only record of everything sent to the bulk endpoint.
#[derive(Debug)]
pub struct AuditBuilder {
    file_handler: File,
}

impl AuditBuilder {
    pub async fn new(file_name: &Path) -> std::io::Result<Self> {
        if let Some(parent) = file_name.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file_handler = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_name)
            .await?;

        Ok(Self { file_handler })
    }

    /// Writes one entry: a `# <what> <index>` header followed by `data`.
    pub async fn append(&mut self, what: What, index: &str, data: &str) -> std::io::Result<()> {
        let mut entry = format!("# {} {}\n", what.as_str(), index);
        entry.push_str(data);
        if !data.ends_with('\n') {
            entry.push('\n');
        }
        self.file_handler.write_all(entry.as_bytes()).await?;
        self.file_handler.flush().await?;
        Ok(())
    }
}
