//! Release of per-record local artifacts.

use tapestry_media::remove_file_if_exists;
use tapestry_models::PostRecord;

use crate::logging::RecordLogger;

/// Delete the record's local files and clear their paths.
///
/// Files that are already gone are fine; removal failures are logged and
/// the path is cleared anyway, since the batch directory is removed last.
pub async fn release_artifacts(record: PostRecord) -> PostRecord {
    let logger = RecordLogger::new(record.post_id.as_str(), "cleanup");

    for path in record.local_artifacts() {
        if let Err(e) = remove_file_if_exists(path).await {
            logger.log_failure(&format!("could not remove {}: {}", path.display(), e));
        }
    }

    PostRecord {
        local_video_path: None,
        local_audio_path: None,
        local_speech_path: None,
        ..record
    }
}
