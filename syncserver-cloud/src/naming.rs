//! Blob names in cloud storage.

use syncserver_types::{DeviceId, FileId, FileVersion};

/// Every version of every file gets its own blob:
/// `"{fileUUID}.{deviceUUID}.{fileVersion}"`.
pub fn cloud_file_name(
    file_id: &FileId,
    device_id: &DeviceId,
    file_version: FileVersion,
) -> String {
    format!("{file_id}.{device_id}.{file_version}")
}
