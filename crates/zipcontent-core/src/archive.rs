//! Locating members inside zip archives.
//!
//! [`ArchiveMemberLocator::locate`] opens the archive, normalizes the member
//! path and looks the entry up by exact name. The resulting
//! [`MemberDescriptor`] owns the open archive; reading the member consumes it,
//! so the archive is closed as soon as the chosen body no longer needs it.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use zip::ZipArchive;

use crate::body::{ByteStream, StreamSettings};
use crate::error::{ContentError, ContentResult};

/// Entry served for directory requests.
pub const INDEX_FILE: &str = "index.html";

type Archive = ZipArchive<BufReader<File>>;

/// Appends [`INDEX_FILE`] to empty and directory-style member paths.
pub fn normalize_member_path(member_path: &str) -> String {
    if member_path.is_empty() || member_path.ends_with('/') {
        format!("{member_path}{INDEX_FILE}")
    } else {
        member_path.to_string()
    }
}

/// Resolves member paths inside zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveMemberLocator;

impl ArchiveMemberLocator {
    /// Creates a locator.
    pub fn new() -> Self {
        Self
    }

    /// Opens `archive_path` and finds `member_path` inside it.
    ///
    /// `archive_filename` is only used in error messages. Runs on the blocking
    /// pool; the archive handle moves into the returned descriptor.
    pub async fn locate(
        &self,
        archive_path: PathBuf,
        archive_filename: &str,
        member_path: &str,
    ) -> ContentResult<MemberDescriptor> {
        let archive_filename = archive_filename.to_string();
        let member_path = member_path.to_string();
        tokio::task::spawn_blocking(move || {
            Self::locate_blocking(&archive_path, &archive_filename, &member_path)
        })
        .await?
    }

    /// Blocking variant of [`locate`](Self::locate).
    pub fn locate_blocking(
        archive_path: &Path,
        archive_filename: &str,
        member_path: &str,
    ) -> ContentResult<MemberDescriptor> {
        let member = normalize_member_path(member_path);

        let file = File::open(archive_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ContentError::archive_not_found(archive_filename)
            } else {
                ContentError::Io(e)
            }
        })?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let Some(index) = archive.index_for_name(&member) else {
            tracing::debug!(
                archive = archive_filename,
                member = %member,
                entries = archive.len(),
                "member not found in archive"
            );
            return Err(ContentError::member_not_found(member, archive_filename));
        };

        let size = archive.by_index(index)?.size();
        tracing::debug!(archive = archive_filename, member = %member, size, "located member");

        Ok(MemberDescriptor {
            path: member,
            size,
            index,
            archive,
        })
    }
}

/// A located archive member, holding the open archive it lives in.
pub struct MemberDescriptor {
    path: String,
    size: u64,
    index: usize,
    archive: Archive,
}

impl MemberDescriptor {
    /// Normalized member path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Uncompressed size recorded in the archive's central directory.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads the whole member into memory and closes the archive.
    pub async fn read_all(self) -> ContentResult<Bytes> {
        tokio::task::spawn_blocking(move || self.read_all_blocking()).await?
    }

    /// Blocking variant of [`read_all`](Self::read_all).
    pub fn read_all_blocking(mut self) -> ContentResult<Bytes> {
        let mut entry = self.archive.by_index(self.index)?;
        let capacity = usize::try_from(entry.size()).unwrap_or(0);
        let mut content = Vec::with_capacity(capacity);
        entry.read_to_end(&mut content)?;
        Ok(Bytes::from(content))
    }

    /// Turns the member into a lazily read stream.
    ///
    /// The archive moves into the stream's producer and is closed when the
    /// member has been fully sent or the stream is dropped.
    pub fn into_stream(self, settings: StreamSettings) -> ByteStream {
        let Self {
            index, mut archive, ..
        } = self;
        ByteStream::spawn(settings, move |sender| {
            let entry = archive.by_index(index).map_err(std::io::Error::other)?;
            sender.pump(entry)
        })
    }
}

impl std::fmt::Debug for MemberDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberDescriptor")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
