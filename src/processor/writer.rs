use std::io::Write;

use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::error::Error;
use crate::operator::ColumnDescriptor;

/// Writes the header and data records of one table.
///
/// Fields holding the delimiter, a quote or a line break are quoted, with
/// quotes doubled. Everything else is written as-is.
pub struct CsvRowWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvRowWriter<W> {
    pub fn new(inner: W) -> Self {
        let writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(inner);
        Self { writer }
    }

    pub fn write_header(&mut self, columns: &[ColumnDescriptor]) -> Result<(), Error> {
        self.writer
            .write_record(columns.iter().map(|c| c.name.as_str()))?;
        Ok(())
    }

    pub fn write_record(&mut self, fields: &[String]) -> Result<(), Error> {
        self.writer.write_record(fields)?;
        Ok(())
    }

    /// Flushes and hands back the underlying sink.
    pub fn into_inner(self) -> Result<W, Error> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(std::io::Error::new(e.error().kind(), e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(columns: &[&str], rows: &[&[&str]]) -> String {
        let mut writer = CsvRowWriter::new(Vec::new());
        let columns: Vec<ColumnDescriptor> = columns
            .iter()
            .map(|name| ColumnDescriptor::new(*name, "varchar"))
            .collect();
        writer.write_header(&columns).unwrap();
        for row in rows {
            let fields: Vec<String> = row.iter().map(|f| f.to_string()).collect();
            writer.write_record(&fields).unwrap();
        }
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_header_and_records() {
        let out = written(&["id", "name"], &[&["1", "x"], &["2", "y"]]);
        assert_eq!(out, "id,name\n1,x\n2,y\n");
    }

    #[test]
    fn test_quoting() {
        let out = written(
            &["a", "b", "c", "d"],
            &[&["x,y", "say \"hi\"", "line\nbreak", "plain"]],
        );
        assert_eq!(
            out,
            "a,b,c,d\n\"x,y\",\"say \"\"hi\"\"\",\"line\nbreak\",plain\n"
        );
    }

    #[test]
    fn test_header_only() {
        let out = written(&["only"], &[]);
        assert_eq!(out, "only\n");
    }

    #[test]
    fn test_empty_single_field_is_quoted() {
        let out = written(&["note"], &[&[""]]);
        assert_eq!(out, "note\n\"\"\n");
    }
}
