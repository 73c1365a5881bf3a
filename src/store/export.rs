//! Copying attachment files out of the Messages store

use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::{IMessageError, Result};
use crate::types::Attachment;

/// Expand `~` in a destination and require it to be absolute
pub fn destination_path(raw: &str) -> Result<PathBuf> {
    let path = PathBuf::from(shellexpand::tilde(raw.trim()).into_owned());
    if raw.trim().is_empty() || !path.is_absolute() {
        return Err(IMessageError::InvalidArgument(format!(
            "destination_path must be an absolute path: {:?}",
            raw
        )));
    }
    Ok(path)
}

fn refuse_overwrite(destination: &Path) -> IMessageError {
    IMessageError::InvalidArgument(format!(
        "Refusing to overwrite existing file: {}",
        destination.display()
    ))
}

/// Stream `reader` into a file that must not exist yet.
///
/// A failed copy removes the partial file so a retry is not refused.
fn write_new(reader: &mut impl Read, destination: &Path) -> Result<u64> {
    // create_new also catches a file created after the exists() check
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => refuse_overwrite(destination),
            _ => IMessageError::Io(e),
        })?;

    match io::copy(reader, &mut writer).and_then(|bytes| writer.sync_all().map(|_| bytes)) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            drop(writer);
            if let Err(cleanup) = fs::remove_file(destination) {
                tracing::warn!(
                    "Could not remove partial file {}: {}",
                    destination.display(),
                    cleanup
                );
            }
            Err(IMessageError::Io(e))
        }
    }
}

/// Copy the attachment's file to `destination`, creating parent directories.
///
/// Never overwrites: an existing destination is `InvalidArgument`. Returns
/// the source path and the number of bytes copied.
pub fn copy_attachment(attachment: &Attachment, destination: &Path) -> Result<(PathBuf, u64)> {
    let source = attachment.path.as_deref().map(PathBuf::from).ok_or_else(|| {
        IMessageError::NotFound(format!("Attachment {} has no file on disk", attachment.id))
    })?;
    if !source.is_file() {
        return Err(IMessageError::NotFound(format!(
            "Attachment file is missing: {}",
            source.display()
        )));
    }

    if destination.exists() {
        return Err(refuse_overwrite(destination));
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut reader = fs::File::open(&source)?;
    let bytes = write_new(&mut reader, destination)?;

    tracing::debug!(
        "Copied attachment {} to {} ({} bytes)",
        attachment.id,
        destination.display(),
        bytes
    );
    Ok((source, bytes))
}
