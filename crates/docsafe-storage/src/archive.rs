//! ZIP archives of several stored objects.

use crate::keys::BucketClass;
use crate::traits::{ObjectBackend, StorageError, StorageResult};
use futures::StreamExt;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

/// One object to place in an archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub class: BucketClass,
    pub key: String,
    pub filename: String,
}

/// Sanitize filename for archive entry to prevent path traversal.
/// Extracts only the base name (strips path components like `../`).
pub fn sanitize_archive_filename(filename: &str, fallback: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or(fallback)
        .to_string()
}

/// Make `name` unique within `taken` by appending ` (n)` before the extension.
fn unique_entry_name(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name.as_str(), ""),
    };

    let mut n = 1;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Build a deflate-compressed ZIP archive of `entries`.
///
/// The archive is assembled in memory and only returned once every object has
/// been read, so a failed retrieval never yields a partial archive.
pub async fn create_zip_archive(
    backend: &dyn ObjectBackend,
    entries: &[ArchiveEntry],
) -> StorageResult<Vec<u8>> {
    use zip::write::{FileOptions, ZipWriter};
    use zip::CompressionMethod;

    let zip_err = |e: zip::result::ZipError| StorageError::BackendError(format!("ZIP: {}", e));

    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(std::io::Cursor::new(&mut buffer));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);
        let mut taken = HashSet::new();

        for (index, entry) in entries.iter().enumerate() {
            let mut stream = backend.get_stream(entry.class, &entry.key).await?;

            let fallback = format!("document_{}", index + 1);
            let name = unique_entry_name(
                sanitize_archive_filename(&entry.filename, &fallback),
                &mut taken,
            );

            zip.start_file(name.as_str(), options).map_err(zip_err)?;
            while let Some(chunk) = stream.next().await {
                zip.write_all(&chunk?)?;
            }
        }

        zip.finish().map_err(zip_err)?;
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_archive_filename() {
        assert_eq!(
            sanitize_archive_filename("../../../etc/passwd", "fallback"),
            "passwd"
        );
        assert_eq!(
            sanitize_archive_filename("reports/q3.pdf", "fallback"),
            "q3.pdf"
        );
        assert_eq!(sanitize_archive_filename("..", "fallback"), "fallback");
        assert_eq!(sanitize_archive_filename("", "fallback"), "fallback");
        assert_eq!(sanitize_archive_filename("invoice.pdf", "fallback"), "invoice.pdf");
    }

    #[test]
    fn test_duplicate_entry_names_are_numbered() {
        let mut taken = HashSet::new();
        assert_eq!(unique_entry_name("a.pdf".into(), &mut taken), "a.pdf");
        assert_eq!(unique_entry_name("a.pdf".into(), &mut taken), "a (1).pdf");
        assert_eq!(unique_entry_name("a.pdf".into(), &mut taken), "a (2).pdf");
        assert_eq!(unique_entry_name("README".into(), &mut taken), "README");
        assert_eq!(unique_entry_name("README".into(), &mut taken), "README (1)");
        assert_eq!(unique_entry_name(".env".into(), &mut taken), ".env");
        assert_eq!(unique_entry_name(".env".into(), &mut taken), ".env (1)");
    }
}
