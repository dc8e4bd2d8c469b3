//! receive-pack request and response parsing.
//!
//! The request starts with ref update commands, one pkt-line each, the
//! first carrying the client's capabilities after a NUL byte; a flush ends
//! the command list and the packfile follows. When `report-status` was
//! requested the response carries a per-ref verdict, side-band wrapped if a
//! side-band capability was negotiated.

use crate::gitproxy::error::ProtocolError;
use crate::gitproxy::events::RefUpdate;
use crate::gitproxy::pktline::{demux_sideband, PktLineReader};
use crate::storage::CommitId;

const OID_HEX_LEN: usize = 40;

/// The command section of a receive-pack request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub updates: Vec<RefUpdate>,
    pub capabilities: Vec<String>,
}

impl UpdateRequest {
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut request = UpdateRequest::default();
        let mut reader = PktLineReader::new(body);

        for line in reader.read_until_flush()? {
            let line = line.strip_suffix(b"\n").unwrap_or(line);
            if line.starts_with(b"shallow ") {
                continue;
            }

            let (command, caps) = match line.iter().position(|&b| b == 0) {
                Some(nul) => (&line[..nul], Some(&line[nul + 1..])),
                None => (line, None),
            };
            if let Some(caps) = caps {
                request.capabilities = String::from_utf8_lossy(caps)
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
            }
            request.updates.push(parse_command(command)?);
        }
        Ok(request)
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c == name)
    }

    pub fn uses_sideband(&self) -> bool {
        self.has_capability("side-band-64k") || self.has_capability("side-band")
    }

    pub fn wants_report(&self) -> bool {
        self.has_capability("report-status") || self.has_capability("report-status-v2")
    }
}

fn parse_command(command: &[u8]) -> Result<RefUpdate, ProtocolError> {
    let invalid = || ProtocolError::InvalidCommand(String::from_utf8_lossy(command).into_owned());

    let text = std::str::from_utf8(command).map_err(|_| invalid())?;
    let mut parts = text.splitn(3, ' ');
    let (Some(old), Some(new), Some(ref_name)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if ref_name.is_empty() {
        return Err(invalid());
    }

    Ok(RefUpdate {
        old: parse_oid(old).ok_or_else(invalid)?,
        new: parse_oid(new).ok_or_else(invalid)?,
        ref_name: ref_name.to_string(),
    })
}

fn parse_oid(hex: &str) -> Option<CommitId> {
    if hex.len() != OID_HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    CommitId::from_hex(hex).ok()
}

/// The verdicts from a `report-status` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStatus {
    pub unpack_ok: bool,
    /// refs reported `ng`
    pub rejected: Vec<String>,
}

impl ReportStatus {
    pub fn parse(response: &[u8], sideband: bool) -> Result<Self, ProtocolError> {
        let demuxed;
        let data = if sideband {
            demuxed = demux_sideband(response)?;
            &demuxed[..]
        } else {
            response
        };

        let mut status = ReportStatus::default();
        for line in PktLineReader::new(data).read_until_flush()? {
            let line = String::from_utf8_lossy(line);
            let line = line.trim_end_matches('\n');
            if let Some(result) = line.strip_prefix("unpack ") {
                status.unpack_ok = result == "ok";
            } else if let Some(rest) = line.strip_prefix("ng ") {
                let ref_name = rest.split(' ').next().unwrap_or(rest);
                status.rejected.push(ref_name.to_string());
            }
        }
        Ok(status)
    }

    pub fn accepted(&self, update: &RefUpdate) -> bool {
        self.unpack_ok && !self.rejected.iter().any(|r| *r == update.ref_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gitproxy::pktline::{PktLineWriter, BAND_DATA, BAND_PROGRESS};

    const A: &str = "1111111111111111111111111111111111111111";
    const B: &str = "2222222222222222222222222222222222222222";

    fn request_body() -> Vec<u8> {
        let mut writer = PktLineWriter::new();
        writer.write(format!("{} {} refs/heads/master\0report-status side-band-64k agent=git/2.43.0\n", A, B).as_bytes());
        writer.write(format!("{} {} refs/tags/v1\n", CommitId::ZERO_HEX, B).as_bytes());
        writer.flush();
        let mut body = writer.into_bytes();
        body.extend_from_slice(b"PACK\x00\x00\x00\x02");
        body
    }

    #[test]
    fn test_parse_update_request() {
        let request = UpdateRequest::parse(&request_body()).unwrap();
        assert_eq!(request.updates.len(), 2);
        assert_eq!(request.updates[0].old.to_hex(), A);
        assert_eq!(request.updates[0].ref_name, "refs/heads/master");
        assert!(request.updates[1].old.is_zero());
        assert_eq!(request.updates[1].ref_name, "refs/tags/v1");
        assert!(request.wants_report());
        assert!(request.uses_sideband());
        assert!(request.has_capability("agent=git/2.43.0"));
    }

    #[test]
    fn test_parse_skips_shallow_lines() {
        let mut writer = PktLineWriter::new();
        writer.write(format!("shallow {}", A).as_bytes());
        writer.write(format!("{} {} refs/heads/master\0report-status", A, B).as_bytes());
        writer.flush();
        let request = UpdateRequest::parse(&writer.into_bytes()).unwrap();
        assert_eq!(request.updates.len(), 1);
        assert!(!request.uses_sideband());
    }

    #[test]
    fn test_parse_rejects_bad_commands() {
        let mut writer = PktLineWriter::new();
        writer.write(b"abc def refs/heads/master\n");
        writer.flush();
        assert!(matches!(
            UpdateRequest::parse(&writer.into_bytes()),
            Err(ProtocolError::InvalidCommand(_))
        ));

        let mut writer = PktLineWriter::new();
        writer.write(format!("{} {}\n", A, B).as_bytes());
        writer.flush();
        assert!(UpdateRequest::parse(&writer.into_bytes()).is_err());
    }

    #[test]
    fn test_report_status_plain() {
        let mut writer = PktLineWriter::new();
        writer.write_str("unpack ok");
        writer.write_str("ok refs/heads/master");
        writer.write_str("ng refs/tags/v1 already exists");
        writer.flush();

        let status = ReportStatus::parse(&writer.into_bytes(), false).unwrap();
        assert!(status.unpack_ok);
        assert_eq!(status.rejected, vec!["refs/tags/v1".to_string()]);

        let request = UpdateRequest::parse(&request_body()).unwrap();
        assert!(status.accepted(&request.updates[0]));
        assert!(!status.accepted(&request.updates[1]));
    }

    #[test]
    fn test_report_status_sideband() {
        let mut inner = PktLineWriter::new();
        inner.write_str("unpack index-pack abnormal exit");
        inner.write_str("ng refs/heads/master unpacker error");
        inner.flush();

        let mut outer = PktLineWriter::new();
        outer.write(&[&[BAND_PROGRESS][..], b"Counting objects\n"].concat());
        outer.write(&[&[BAND_DATA][..], &inner.into_bytes()[..]].concat());
        outer.flush();

        let status = ReportStatus::parse(&outer.into_bytes(), true).unwrap();
        assert!(!status.unpack_ok);
        let request = UpdateRequest::parse(&request_body()).unwrap();
        assert!(!status.accepted(&request.updates[1]));
    }
}
