//! Credential file relocation

use std::io;
use std::path::Path;

use tokio::fs;

/// What happened to one credential file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relocation {
    Moved,
    /// A file of the same name was already at the destination; both left alone
    DestinationExists,
    /// Source and destination are the same file
    InPlace,
}

/// Move `source` to `destination`, never overwriting.
///
/// Creates the destination directory if needed. Falls back to copy + remove
/// when a rename crosses filesystems.
pub async fn relocate_credential(source: &Path, destination: &Path) -> io::Result<Relocation> {
    if source == destination {
        return Ok(Relocation::InPlace);
    }

    if fs::try_exists(destination).await? {
        tracing::debug!(
            source = %source.display(),
            destination = %destination.display(),
            "Destination exists, not relocating"
        );
        return Ok(Relocation::DestinationExists);
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }

    if let Err(e) = fs::rename(source, destination).await {
        tracing::debug!(error = %e, "Rename failed, copying instead");
        fs::copy(source, destination).await?;
        fs::remove_file(source).await?;
    }

    Ok(Relocation::Moved)
}
