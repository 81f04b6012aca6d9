//! Publishing report documents to disk.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use super::assembler::ReportDocument;
use crate::error::{HumdataError, Result};
use crate::pipeline::CancelFlag;

impl ReportDocument {
    /// Write the document to `path` atomically.
    ///
    /// The JSON is written to a temporary file in the destination directory
    /// and renamed over `path` only once fully written; on any failure, or
    /// if `cancel` is set first, the previous file at `path` is untouched.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use humdata::{CancelFlag, ReportDocument};
    /// # fn example(report: &ReportDocument) -> humdata::Result<()> {
    /// report.publish("output/report.json", &CancelFlag::new())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn publish(&self, path: impl AsRef<Path>, cancel: &CancelFlag) -> Result<()> {
        self.publish_with(path, cancel, |writer, document| {
            serde_json::to_writer_pretty(&mut *writer, document).map_err(io::Error::from)?;
            writer.write_all(b"\n")
        })
    }

    /// Like [`publish`](Self::publish) with a custom serialiser.
    pub fn publish_with<F>(&self, path: impl AsRef<Path>, cancel: &CancelFlag, write: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Write, &ReportDocument) -> io::Result<()>,
    {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| HumdataError::io(dir, e))?;
        }

        let temp = NamedTempFile::new_in(dir).map_err(|e| HumdataError::io(dir, e))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            write(&mut writer, self).map_err(|e| HumdataError::io(temp.path(), e))?;
            writer.flush().map_err(|e| HumdataError::io(temp.path(), e))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| HumdataError::io(temp.path(), e))?;

        // Dropping the temp file removes it.
        if cancel.is_cancelled() {
            return Err(HumdataError::Cancelled);
        }

        temp.persist(path).map_err(|e| HumdataError::io(path, e.error))?;
        log::info!("published report to {}", path.display());
        Ok(())
    }

    /// Read a previously published document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| HumdataError::io(path, e))?;
        let document = serde_json::from_reader(BufReader::new(file))?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::assembler::{ReportValue, WORLD_KEY};
    use crate::schema::FieldValue;
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn document(value: i64) -> ReportDocument {
        let mut entry = IndexMap::new();
        entry.insert("Idps".to_string(), ReportValue::Field(FieldValue::Integer(value)));
        let mut data = IndexMap::new();
        data.insert(WORLD_KEY.to_string(), entry);
        ReportDocument {
            data,
            metadata: IndexMap::new(),
        }
    }

    #[test]
    fn test_publish_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("report.json");

        document(5).publish(&path, &CancelFlag::new()).unwrap();
        assert_eq!(ReportDocument::load(&path).unwrap(), document(5));
    }

    #[test]
    fn test_failed_write_keeps_previous_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        document(5).publish(&path, &CancelFlag::new()).unwrap();
        let before = fs::read(&path).unwrap();

        let result = document(9).publish_with(&path, &CancelFlag::new(), |writer, _| {
            writer.write_all(b"{\"data\": {")?;
            Err(io::Error::other("disk full"))
        });

        assert!(matches!(result, Err(HumdataError::Io { .. })));
        assert_eq!(fs::read(&path).unwrap(), before);
        // Only the published report remains.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_cancel_before_rename() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = document(5).publish(&path, &cancel);
        assert!(matches!(result, Err(HumdataError::Cancelled)));
        assert!(!path.exists());
    }
}
