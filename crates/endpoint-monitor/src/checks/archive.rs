use std::io::{Cursor, Read};

use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Zip(#[from] ZipError),
    #[error("failed to read archive entry: {0}")]
    Read(#[from] std::io::Error),
    #[error("archive contains no files")]
    Empty,
}

/// Upper bound on the capacity reserved per archive byte before inflating.
const MAX_RATIO: usize = 16;

/// What an archive held.
#[derive(Debug, PartialEq, Eq)]
pub enum Unpacked {
    Single { file_name: String, bytes: Vec<u8> },
    MultiFile { files: usize },
}

/// Local file header or empty-archive signature.
pub fn looks_like_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06")
}

/// Open a zip archive and unwrap it if it holds exactly one file.
/// Directory entries do not count.
pub fn unpack(bytes: &[u8]) -> Result<Unpacked, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut files = Vec::new();
    for index in 0..archive.len() {
        if !archive.by_index(index)?.is_dir() {
            files.push(index);
        }
    }

    match files.as_slice() {
        [] => Err(ArchiveError::Empty),
        [index] => {
            let mut entry = archive.by_index(*index)?;
            let file_name = entry.name().to_owned();
            // the declared size is untrusted header data
            let declared = usize::try_from(entry.size()).unwrap_or(usize::MAX);
            let capacity = declared.min(bytes.len().saturating_mul(MAX_RATIO));
            let mut content = Vec::with_capacity(capacity);
            entry.read_to_end(&mut content)?;
            Ok(Unpacked::Single { file_name, bytes: content })
        }
        many => Ok(Unpacked::MultiFile { files: many.len() }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::*;

    pub(crate) fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_single_file_is_unwrapped() {
        let bytes = zip_of(&[("sites.gml", b"<a/>")]);

        assert!(looks_like_zip(&bytes));
        assert_eq!(
            unpack(&bytes).unwrap(),
            Unpacked::Single { file_name: "sites.gml".into(), bytes: b"<a/>".to_vec() }
        );
    }

    #[test]
    fn test_multi_file_is_reported() {
        let bytes = zip_of(&[("a.gml", b"<a/>"), ("b.gml", b"<b/>")]);
        assert_eq!(unpack(&bytes).unwrap(), Unpacked::MultiFile { files: 2 });
    }

    /// Overwrite the uncompressed size in every local and central header.
    fn with_declared_size(mut bytes: Vec<u8>, size: u32) -> Vec<u8> {
        let size = size.to_le_bytes();
        for offset in 0..bytes.len().saturating_sub(4) {
            let field = match &bytes[offset..offset + 4] {
                b"PK\x03\x04" => offset + 22,
                b"PK\x01\x02" => offset + 24,
                _ => continue,
            };
            bytes[field..field + 4].copy_from_slice(&size);
        }
        bytes
    }

    #[test]
    fn test_declared_size_is_not_trusted() {
        let bytes = with_declared_size(zip_of(&[("sites.gml", b"<a/>")]), 0xFFFF_FFF0);

        match unpack(&bytes) {
            Ok(Unpacked::Single { bytes, .. }) => {
                assert_eq!(bytes, b"<a/>");
                assert!(bytes.capacity() <= 16 * 1024);
            }
            other => assert!(matches!(other, Err(ArchiveError::Read(_) | ArchiveError::Zip(_)))),
        }
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(!looks_like_zip(b"<html>not found</html>"));
        assert!(unpack(b"<html>not found</html>").is_err());
    }
}
