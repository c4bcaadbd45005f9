//! Minimal NDEF (NFC Data Exchange Format) record walker for `data ndef`.

use crate::errors::{ArgError, Result};

/// Type Name Format values from the NDEF 1.0 spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tnf {
    Empty,
    WellKnown,
    MediaType,
    AbsoluteUri,
    External,
    Unknown,
    Unchanged,
    Reserved,
}

impl Tnf {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Tnf::Empty,
            1 => Tnf::WellKnown,
            2 => Tnf::MediaType,
            3 => Tnf::AbsoluteUri,
            4 => Tnf::External,
            5 => Tnf::Unknown,
            6 => Tnf::Unchanged,
            _ => Tnf::Reserved,
        }
    }
}

/// URI identifier-code abbreviations for well-known `U` records.
const URI_PREFIXES: [&str; 24] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
];

#[derive(Debug, Clone)]
pub struct NdefRecord {
    pub message_begin: bool,
    pub message_end: bool,
    pub chunked: bool,
    pub short_record: bool,
    pub tnf: Tnf,
    pub record_type: Vec<u8>,
    pub id: Vec<u8>,
    pub payload: Vec<u8>,
}

impl NdefRecord {
    /// Human-readable gist of the record.
    pub fn describe(&self) -> String {
        match (self.tnf, self.record_type.as_slice()) {
            (Tnf::WellKnown, b"U") => {
                let (prefix, rest) = match self.payload.split_first() {
                    Some((&code, rest)) => (
                        URI_PREFIXES.get(code as usize).copied().unwrap_or(""),
                        rest,
                    ),
                    None => ("", &[][..]),
                };
                format!("URI: {}{}", prefix, String::from_utf8_lossy(rest))
            }
            (Tnf::WellKnown, b"T") => {
                // text records lead with a status byte and a language code
                let text = match self.payload.split_first() {
                    Some((&status, rest)) => {
                        let lang_len = (status & 0x3f) as usize;
                        String::from_utf8_lossy(rest.get(lang_len..).unwrap_or(&[])).into_owned()
                    }
                    None => String::new(),
                };
                format!("Text: {text}")
            }
            _ => format!(
                "{:?} type '{}' payload {} bytes",
                self.tnf,
                String::from_utf8_lossy(&self.record_type),
                self.payload.len()
            ),
        }
    }
}

fn truncated(offset: usize) -> crate::errors::CoreError {
    ArgError::InvalidValue {
        name: "ndef data",
        value: offset as i64,
    }
    .into()
}

/// Walk every record of an NDEF message.
pub fn parse_message(data: &[u8]) -> Result<Vec<NdefRecord>> {
    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        let header = data[pos];
        let message_begin = header & 0x80 != 0;
        let message_end = header & 0x40 != 0;
        let chunked = header & 0x20 != 0;
        let short_record = header & 0x10 != 0;
        let has_id = header & 0x08 != 0;
        let tnf = Tnf::from_bits(header);
        pos += 1;

        let type_len = *data.get(pos).ok_or_else(|| truncated(pos))? as usize;
        pos += 1;
        let payload_len = if short_record {
            let len = *data.get(pos).ok_or_else(|| truncated(pos))? as usize;
            pos += 1;
            len
        } else {
            let raw = data.get(pos..pos + 4).ok_or_else(|| truncated(pos))?;
            pos += 4;
            u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
        };
        let id_len = if has_id {
            let len = *data.get(pos).ok_or_else(|| truncated(pos))? as usize;
            pos += 1;
            len
        } else {
            0
        };

        let record_type = data
            .get(pos..pos + type_len)
            .ok_or_else(|| truncated(pos))?
            .to_vec();
        pos += type_len;
        let id = data
            .get(pos..pos + id_len)
            .ok_or_else(|| truncated(pos))?
            .to_vec();
        pos += id_len;
        let payload = data
            .get(pos..pos + payload_len)
            .ok_or_else(|| truncated(pos))?
            .to_vec();
        pos += payload_len;

        let is_end = message_end;
        records.push(NdefRecord {
            message_begin,
            message_end,
            chunked,
            short_record,
            tnf,
            record_type,
            id,
            payload,
        });
        if is_end {
            break;
        }
    }
    if records.is_empty() {
        return Err(truncated(0));
    }
    Ok(records)
}
