//! In-memory access to the tables of a zipped static feed.

use std::io::{Cursor, Read};

use tracing::debug;
use zip::ZipArchive;

use crate::feed::csv_table::CsvTable;
use crate::models::types::{Result, TransitError};

pub struct FeedArchive<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> FeedArchive<'a> {
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        debug!(entries = archive.len(), "opened feed archive");
        Ok(Self { archive })
    }

    /// Entry name for a table, ignoring any directory the publisher zipped
    /// the feed under (`gtfs/stops.txt` matches `stops`).
    fn entry_name(&self, table: &str) -> Option<String> {
        let file_name = format!("{table}.txt");
        self.archive
            .file_names()
            .find(|name| name.rsplit('/').next() == Some(file_name.as_str()))
            .map(str::to_string)
    }

    /// Parse a table if the archive contains it
    pub fn table(&mut self, table: &str) -> Result<Option<CsvTable>> {
        let Some(name) = self.entry_name(table) else {
            return Ok(None);
        };

        let mut entry = self.archive.by_name(&name)?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| TransitError::Decode(format!("{name}: {e}")))?;

        let parsed = CsvTable::parse(&bytes)?;
        debug!(table, rows = parsed.len(), "parsed feed table");
        Ok(Some(parsed))
    }

    /// Parse a table the feed cannot do without
    pub fn required_table(&mut self, table: &str) -> Result<CsvTable> {
        self.table(table)?
            .ok_or_else(|| TransitError::MissingTable(table.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod test_archive {
    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Zip `(file name, contents)` pairs into an in-memory archive
    pub fn zip_entries(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}
