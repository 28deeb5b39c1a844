use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Result, Write};
use std::path::Path;

use super::records::EngineRecord;

#[derive(Serialize)]
struct TraceEntry<'a> {
  image: usize,
  group: usize,
  #[serde(flatten)]
  record: &'a EngineRecord,
}

/// Writes engine records as JSON lines, one invocation after another.
pub struct TraceWriter<W: Write> {
  writer: W,
  lines: usize,
}

impl TraceWriter<BufWriter<File>> {
  pub fn create(path: &Path) -> Result<Self> {
    Ok(Self::new(BufWriter::new(File::create(path)?)))
  }
}

impl<W: Write> TraceWriter<W> {
  pub fn new(writer: W) -> Self {
    Self { writer, lines: 0 }
  }

  pub fn write_records(&mut self, image: usize, group: usize, records: &[EngineRecord]) -> Result<()> {
    for record in records {
      let entry = TraceEntry { image, group, record };
      serde_json::to_writer(&mut self.writer, &entry)?;
      writeln!(self.writer)?;
      self.lines += 1;
    }
    Ok(())
  }

  pub fn lines(&self) -> usize {
    self.lines
  }

  pub fn finish(mut self) -> Result<W> {
    self.writer.flush()?;
    Ok(self.writer)
  }
}
