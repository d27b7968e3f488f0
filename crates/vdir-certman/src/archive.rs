//! Downloaded certificate archives.
//!
//! The CA delivers a batch as a ZIP holding one PKCS12 file. Archives are
//! written to `<storage>/<batch_id>.zip` before anything is extracted, so a
//! download that fails later in the pipeline can be inspected by hand.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::CertManError;

/// Directory of downloaded archives.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    dir: PathBuf,
}

impl ArchiveStore {
    /// Use `dir`, which must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name of a batch archive.
    pub fn filename(batch_id: i64) -> String {
        format!("{batch_id}.zip")
    }

    pub fn path_for(&self, batch_id: i64) -> PathBuf {
        self.dir.join(Self::filename(batch_id))
    }

    /// Write an archive, replacing any earlier download of the same batch.
    pub fn save(&self, batch_id: i64, archive: &[u8]) -> Result<PathBuf, CertManError> {
        let path = self.path_for(batch_id);
        std::fs::write(&path, archive)?;
        tracing::info!(batch_id, path = %path.display(), bytes = archive.len(), "certificate archive saved");
        Ok(path)
    }

    /// Read a previously saved archive.
    pub fn load(&self, batch_id: i64) -> Result<Vec<u8>, CertManError> {
        Ok(std::fs::read(self.path_for(batch_id))?)
    }
}

/// The single file in a batch archive.
///
/// Zero files or more than one are malformed: a multi-file archive cannot be
/// matched to the one VASP the batch was requested for.
pub fn single_entry(batch_id: i64, archive: &[u8]) -> Result<Vec<u8>, CertManError> {
    let malformed = |reason: String| CertManError::Archive { batch_id, reason };

    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| malformed(format!("not a zip archive: {e}")))?;
    match zip.len() {
        0 => return Err(malformed("archive contains no certificates".into())),
        1 => {}
        n => return Err(malformed(format!("archive contains {n} files, expected 1"))),
    }

    let mut entry = zip
        .by_index(0)
        .map_err(|e| malformed(format!("could not open archive entry: {e}")))?;
    let mut contents = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut contents)
        .map_err(|e| malformed(format!("could not read archive entry: {e}")))?;
    Ok(contents)
}

#[cfg(test)]
pub(crate) fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
