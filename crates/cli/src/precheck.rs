//! Upload precheck: the client half of the cross-actor state machine.

use depot_core::api::FileStatsResponse;
use depot_core::{Checksum, FileStatus};
use time::{Duration, OffsetDateTime};

/// What the orchestrator should do after observing the server's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrecheckAction {
    /// No conflicting entry: start a fresh upload.
    ProceedWithInit,
    /// A resumable entry with the same content exists: init with is_reupload.
    ProceedWithReUpload,
    /// A conflicting entry exists: offer to delete it and retry.
    SuggestExistingEntryDeletion,
    /// Nothing to do, or the server is busy with this file.
    Exits(ExitReason),
}

/// Why the precheck decided to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// The same content is already fully uploaded.
    AlreadyUploaded,
    /// Another client is uploading the same content right now.
    UploadBusy,
}

/// The local file's identity, as observed before contacting the server.
#[derive(Clone, Debug)]
pub struct LocalFile {
    pub size: u64,
    pub checksum: Checksum,
}

/// Decide the post-precheck action.
///
/// Decision table (the content comparison runs first; "same" means equal
/// checksum and size):
///
/// | remote state               | action                         |
/// |----------------------------|--------------------------------|
/// | absent                     | ProceedWithInit                |
/// | different content          | SuggestExistingEntryDeletion   |
/// | same, UPLOADED             | Exits(AlreadyUploaded)         |
/// | same, INITIALIZED          | ProceedWithInit                |
/// | same, FAILED               | ProceedWithReUpload            |
/// | same, IN_PROGRESS, orphan  | ProceedWithReUpload            |
/// | same, IN_PROGRESS, live    | Exits(UploadBusy)              |
/// | DELETE_*                   | SuggestExistingEntryDeletion   |
///
/// An IN_PROGRESS entry is orphaned when its `updated_at` is older than the
/// server's upload timeout: the client holding it died without fail recovery
/// (server crash, power loss), so the entry is eligible for takeover.
pub fn decide(
    local: &LocalFile,
    remote: Option<&FileStatsResponse>,
    now: OffsetDateTime,
) -> PrecheckAction {
    let Some(remote) = remote else {
        return PrecheckAction::ProceedWithInit;
    };

    if remote.status.is_deleting() {
        return PrecheckAction::SuggestExistingEntryDeletion;
    }

    let same_content = remote.checksum == local.checksum && remote.size == local.size;
    if !same_content {
        return PrecheckAction::SuggestExistingEntryDeletion;
    }

    match remote.status {
        FileStatus::Uploaded => PrecheckAction::Exits(ExitReason::AlreadyUploaded),
        FileStatus::Initialized => PrecheckAction::ProceedWithInit,
        FileStatus::Failed => PrecheckAction::ProceedWithReUpload,
        FileStatus::InProgress => {
            let timeout = Duration::seconds(remote.upload_timeout_second as i64);
            let orphaned = remote.updated_at < now - timeout;
            if orphaned {
                PrecheckAction::ProceedWithReUpload
            } else {
                PrecheckAction::Exits(ExitReason::UploadBusy)
            }
        }
        FileStatus::DeleteInProgress => PrecheckAction::SuggestExistingEntryDeletion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> LocalFile {
        LocalFile {
            size: 11,
            checksum: Checksum::compute(b"hello world"),
        }
    }

    fn remote(status: FileStatus, age_seconds: i64) -> FileStatsResponse {
        let now = OffsetDateTime::now_utc();
        FileStatsResponse {
            id: 1,
            name: "hello.txt".to_string(),
            size: 11,
            checksum: Checksum::compute(b"hello world"),
            status,
            total_chunks: 3,
            uploaded_chunks: 1,
            created_at: now - Duration::seconds(age_seconds),
            updated_at: now - Duration::seconds(age_seconds),
            upload_timeout_second: 300,
        }
    }

    #[test]
    fn test_absent_remote_proceeds() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(decide(&local(), None, now), PrecheckAction::ProceedWithInit);
    }

    #[test]
    fn test_different_content_suggests_deletion() {
        let now = OffsetDateTime::now_utc();
        let mut stats = remote(FileStatus::Uploaded, 60);
        stats.checksum = Checksum::compute(b"other content");
        assert_eq!(
            decide(&local(), Some(&stats), now),
            PrecheckAction::SuggestExistingEntryDeletion
        );

        let mut stats = remote(FileStatus::Uploaded, 60);
        stats.size = 999;
        assert_eq!(
            decide(&local(), Some(&stats), now),
            PrecheckAction::SuggestExistingEntryDeletion
        );
    }

    #[test]
    fn test_same_content_by_status() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            decide(&local(), Some(&remote(FileStatus::Uploaded, 60)), now),
            PrecheckAction::Exits(ExitReason::AlreadyUploaded)
        );
        assert_eq!(
            decide(&local(), Some(&remote(FileStatus::Initialized, 60)), now),
            PrecheckAction::ProceedWithInit
        );
        assert_eq!(
            decide(&local(), Some(&remote(FileStatus::Failed, 60)), now),
            PrecheckAction::ProceedWithReUpload
        );
    }

    #[test]
    fn test_in_progress_orphan_detection() {
        let now = OffsetDateTime::now_utc();

        // Updated recently: another client is live.
        assert_eq!(
            decide(&local(), Some(&remote(FileStatus::InProgress, 60)), now),
            PrecheckAction::Exits(ExitReason::UploadBusy)
        );

        // Updated two timeouts ago: orphaned, eligible for takeover.
        assert_eq!(
            decide(&local(), Some(&remote(FileStatus::InProgress, 600)), now),
            PrecheckAction::ProceedWithReUpload
        );
    }

    #[test]
    fn test_delete_family_suggests_deletion() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            decide(
                &local(),
                Some(&remote(FileStatus::DeleteInProgress, 60)),
                now
            ),
            PrecheckAction::SuggestExistingEntryDeletion
        );
    }
}
