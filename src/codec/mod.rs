//! Line codec for dump files
//!
//! Every record occupies exactly one line: a compact JSON object with
//! `id`, `type` and `source` fields followed by `\n`. Decoding is strict
//! about those fields and nothing else; the contents of `source` are
//! never inspected beyond "object or null".

use std::io::BufRead;

use tracing::trace;

use crate::error::{DecodeError, DumpError, Result};
use crate::record::Record;

/// Encoder/decoder for the one-record-per-line dump format.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineCodec;

impl LineCodec {
    pub fn new() -> Self {
        Self
    }

    /// Append the encoded form of `record`, newline included, to `buf`.
    ///
    /// # Arguments
    /// * `record` - Record to encode
    /// * `buf` - Output buffer, appended to
    ///
    /// # Returns
    /// * `Result<()>` - Success or serialization error
    pub fn encode_into(&self, record: &Record, buf: &mut Vec<u8>) -> Result<()> {
        serde_json::to_writer(&mut *buf, record)
            .map_err(|e| DumpError::encoding(&format!("record {}", record.id), e))?;
        buf.push(b'\n');
        Ok(())
    }

    /// Encode one record to a freshly allocated line.
    pub fn encode(&self, record: &Record) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64 + record.source_json().map_or(0, str::len));
        self.encode_into(record, &mut buf)?;
        Ok(buf)
    }

    /// Decode one line back into a record.
    ///
    /// A trailing `\n` or `\r\n` is ignored.
    ///
    /// # Arguments
    /// * `line` - Raw line bytes
    ///
    /// # Returns
    /// * `Result<Record, DecodeError>` - Decoded record or the reason the line was rejected
    pub fn decode(&self, line: &[u8]) -> std::result::Result<Record, DecodeError> {
        let line = trim_line_end(line);
        // serde would also accept the sequence form of the struct
        if line.iter().find(|b| !b.is_ascii_whitespace()) != Some(&b'{') {
            return Err(DecodeError::Malformed("line is not a JSON object".to_string()));
        }
        let record: Record = serde_json::from_slice(line)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }
}

/// Outcome of reading one non-blank line.
#[derive(Debug)]
pub struct DecodedLine {
    /// 1-based line number within the stream
    pub line: u64,
    pub record: std::result::Result<Record, DecodeError>,
}

/// Iterator over the records of a newline-delimited stream.
///
/// Blank lines are skipped. A line that fails to decode is yielded as a
/// [`DecodedLine`] carrying the error so the caller can log it and carry
/// on; only failures of the underlying reader end the iteration with an
/// `Err`.
pub struct RecordLines<R> {
    reader: R,
    codec: LineCodec,
    buf: Vec<u8>,
    line: u64,
}

impl<R: BufRead> RecordLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            codec: LineCodec::new(),
            buf: Vec::with_capacity(8 * 1024),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for RecordLines<R> {
    type Item = std::io::Result<DecodedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
            self.line += 1;

            if trim_line_end(&self.buf).iter().all(u8::is_ascii_whitespace) {
                trace!("Skipping blank line {}", self.line);
                continue;
            }

            return Some(Ok(DecodedLine {
                line: self.line,
                record: self.codec.decode(&self.buf),
            }));
        }
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_encode_is_single_terminated_line() {
        let record = Record::from_value("a1", "doc", &json!({"name": "Alice\nSmith"})).unwrap();
        let line = LineCodec::new().encode(&record).unwrap();

        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn test_absent_source_encodes_as_null() {
        let record = Record::new("a1", "", None);
        let line = LineCodec::new().encode(&record).unwrap();
        assert_eq!(
            String::from_utf8(line).unwrap(),
            "{\"id\":\"a1\",\"type\":\"\",\"source\":null}\n"
        );
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let codec = LineCodec::new();
        let sources = [
            json!({}),
            json!({"nested": {"list": [1, 2.5, "x", null, true]}, "unicode": "żółw 🐢"}),
            json!({"big": 12345678901234567890u64, "neg": -1e-9}),
        ];

        for (i, source) in sources.iter().enumerate() {
            let record = Record::from_value(format!("id-{i}"), "type", source).unwrap();
            let decoded = codec.decode(&codec.encode(&record).unwrap()).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn test_decode_tolerates_crlf() {
        let codec = LineCodec::new();
        let record = codec
            .decode(b"{\"id\":\"x\",\"type\":\"t\",\"source\":{\"a\":1}}\r\n")
            .unwrap();
        assert_eq!(record.id, "x");
        assert_eq!(record.source_json(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_decode_missing_type_defaults_to_empty() {
        let record = LineCodec::new()
            .decode(b"{\"id\":\"x\",\"source\":{}}")
            .unwrap();
        assert_eq!(record.doc_type, "");
    }

    #[test]
    fn test_decode_rejections() {
        let codec = LineCodec::new();

        assert!(matches!(
            codec.decode(b"{\"id\":\"x\",\"source\":"),
            Err(DecodeError::Malformed(_))
        ));
        assert_eq!(
            codec.decode(b"{\"type\":\"t\",\"source\":{}}"),
            Err(DecodeError::MissingId)
        );
        assert_eq!(
            codec.decode(b"{\"id\":\"x\",\"source\":\"text\"}"),
            Err(DecodeError::InvalidSource("string"))
        );
        assert!(matches!(codec.decode(b"[1,2]"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_array_shaped_record() {
        let codec = LineCodec::new();
        assert_eq!(
            codec.decode(br#"["x","t",{"a":1}]"#),
            Err(DecodeError::Malformed("line is not a JSON object".to_string()))
        );
        assert!(matches!(codec.decode(b"  \"x\""), Err(DecodeError::Malformed(_))));

        // Leading whitespace before the object is fine
        let record = codec.decode(br#"  {"id":"x","type":"t","source":{"a":1}}"#).unwrap();
        assert_eq!(record.id, "x");
    }

    #[test]
    fn test_record_lines_skips_blank_and_reports_bad_lines() {
        let input = concat!(
            "{\"id\":\"1\",\"type\":\"\",\"source\":{}}\n",
            "\n",
            "not json\n",
            "{\"id\":\"2\",\"type\":\"\",\"source\":null}"
        );
        let lines: Vec<DecodedLine> = RecordLines::new(Cursor::new(input))
            .collect::<std::io::Result<_>>()
            .unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].line, 1);
        assert_eq!(lines[0].record.as_ref().unwrap().id, "1");
        assert_eq!(lines[1].line, 3);
        assert!(lines[1].record.is_err());
        assert_eq!(lines[2].line, 4);
        assert_eq!(lines[2].record.as_ref().unwrap().id, "2");
    }
}
