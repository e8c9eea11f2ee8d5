//! File and chunk records and their status machine.

use crate::checksum::Checksum;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Status of a file or of a single chunk.
///
/// Files and chunks share one machine; the chunk machine drives the file
/// machine through the chunk-write path:
///
/// ```text
///            init
///             |
///             v
///       INITIALIZED <------ resume ------ FAILED
///             |                             ^
///             | write begins                | write fails
///             v                             |
///       IN_PROGRESS ------ write ok ---> UPLOADED
///
///       DELETE_IN_PROGRESS: set on the file and all chunks while the
///       delete fan-out runs; the row removal itself is the tombstone.
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    #[serde(rename = "INITIALIZED")]
    Initialized,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "UPLOADED")]
    Uploaded,
    #[serde(rename = "DELETE_IN_PROGRESS")]
    DeleteInProgress,
}

impl FileStatus {
    /// The canonical string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "INITIALIZED",
            Self::InProgress => "IN_PROGRESS",
            Self::Failed => "FAILED",
            Self::Uploaded => "UPLOADED",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
        }
    }

    /// Parse from the database representation.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "INITIALIZED" => Ok(Self::Initialized),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "FAILED" => Ok(Self::Failed),
            "UPLOADED" => Ok(Self::Uploaded),
            "DELETE_IN_PROGRESS" => Ok(Self::DeleteInProgress),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }

    /// Whether a file in this status can accept chunk writes.
    pub fn accepts_chunks(&self) -> bool {
        matches!(self, Self::Initialized | Self::InProgress)
    }

    /// Whether a failed or stalled upload in this status can be resumed.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::InProgress | Self::Failed)
    }

    /// Whether this status belongs to the delete family.
    pub fn is_deleting(&self) -> bool {
        matches!(self, Self::DeleteInProgress)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated file name.
///
/// Names are the unique namespace key on the server and become a directory
/// name under the base storage dir, so path separators and dot entries are
/// rejected outright.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileName(String);

impl FileName {
    /// Parse and validate a file name.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() {
            return Err(crate::Error::InvalidFileName("empty name".to_string()));
        }
        if s.len() > crate::MAX_FILE_NAME_LEN {
            return Err(crate::Error::InvalidFileName(format!(
                "name exceeds {} bytes",
                crate::MAX_FILE_NAME_LEN
            )));
        }
        if s == "." || s == ".." {
            return Err(crate::Error::InvalidFileName(s.to_string()));
        }
        if s.contains('/') || s.contains('\\') {
            return Err(crate::Error::InvalidFileName(format!(
                "path separators not allowed: {s}"
            )));
        }
        if s.chars().any(|c| c.is_control()) {
            return Err(crate::Error::InvalidFileName(
                "control characters not allowed".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FileName {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<FileName> for String {
    fn from(n: FileName) -> Self {
        n.0
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileName({})", self.0)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file record as tracked by the server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct File {
    /// Server-assigned identifier, also the upload id.
    pub id: u64,
    /// Unique name within the namespace.
    pub name: String,
    /// Declared total byte length.
    pub size: u64,
    /// Hex SHA-256 of the full content.
    pub checksum: Checksum,
    /// Declared uniform chunk size (the last chunk may be smaller).
    pub chunk_size: u64,
    /// Current status.
    pub status: FileStatus,
    /// Number of chunks the file is split into.
    pub total_chunks: u64,
    /// Number of chunks in UPLOADED status.
    pub uploaded_chunks: u64,
    /// When the record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the record was last updated (any status change).
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Number of chunks a file of `size` bytes splits into at `chunk_size`.
pub fn total_chunks_for(size: u64, chunk_size: u64) -> crate::Result<u64> {
    if chunk_size == 0 {
        return Err(crate::Error::InvalidChunkSize(chunk_size));
    }
    Ok(size.div_ceil(chunk_size))
}
