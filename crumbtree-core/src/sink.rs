// Product record hand-off

use crate::error::{CrawlError, Result};
use crumbtree_scanner::ProductRecord;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Receives product records keyed by slug. Whether an upsert creates or
/// updates is up to the implementation.
pub trait ProductSink {
    fn upsert(&mut self, record: &ProductRecord) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one JSON object per line. A slug seen earlier in the run is
/// skipped, so the file holds the first record per slug.
///
/// The file is opened on the first write or on `finish`, never before: a run
/// that fails before any page is fetched leaves an existing file untouched.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    seen: HashSet<String>,
    written: usize,
}

impl JsonLinesSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            seen: HashSet::new(),
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => self.open()?,
        };
        Ok(self.writer.insert(writer))
    }

    fn open(&self) -> Result<BufWriter<File>> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| CrawlError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = File::create(&self.path).map_err(|e| self.write_error(e))?;
        Ok(BufWriter::new(file))
    }

    fn write_error(&self, source: std::io::Error) -> CrawlError {
        CrawlError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl ProductSink for JsonLinesSink {
    fn upsert(&mut self, record: &ProductRecord) -> Result<()> {
        if !self.seen.insert(record.slug.clone()) {
            return Ok(());
        }

        let line = serde_json::to_string(record).map_err(|source| CrawlError::Serialize {
            what: "product record",
            source,
        })?;
        let path = self.path.clone();
        writeln!(self.writer()?, "{}", line)
            .map_err(|source| CrawlError::Write { path, source })?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let path = self.path.clone();
        self.writer()?
            .flush()
            .map_err(|source| CrawlError::Write { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crumbtree_scanner::product::extract_product;
    use crumbtree_scanner::normalize;
    use tempfile::TempDir;

    fn record(name: &str, path: &str) -> ProductRecord {
        let url = normalize(&format!("https://shop.example{}", path)).unwrap();
        extract_product(&format!("<html><body><h1>{}</h1></body></html>", name), &url).unwrap()
    }

    #[test]
    fn test_json_lines_first_record_per_slug() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/products.jsonl");
        let mut sink = JsonLinesSink::new(&path);

        sink.upsert(&record("Drill X", "/p/drill-x")).unwrap();
        sink.upsert(&record("Drill X (copy)", "/p/drill-x")).unwrap();
        sink.upsert(&record("Saw Y", "/p/saw-y")).unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.written(), 2);
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], "Drill X");
        assert_eq!(lines[0]["slug"], "drill-x");
        assert_eq!(lines[1]["slug"], "saw-y");
    }

    #[test]
    fn test_file_untouched_until_first_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("products.jsonl");
        fs::write(&path, "{\"slug\":\"kept\"}\n").unwrap();

        let sink = JsonLinesSink::new(&path);
        drop(sink);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"slug\":\"kept\"}\n");

        let mut sink = JsonLinesSink::new(dir.path().join("empty/products.jsonl"));
        sink.finish().unwrap();
        assert_eq!(fs::read_to_string(sink.path()).unwrap(), "");
    }
}
