//! pkt-line framing.
//!
//! Git frames protocol messages as 4 hex digits of length (including the
//! prefix itself) followed by the payload. `0000` is a flush packet, `0001`
//! a delimiter and `0002` a response end.

use tracing::debug;

use crate::gitproxy::error::ProtocolError;

/// Flush packet (marks end of message)
pub const FLUSH_PKT: &[u8] = b"0000";

/// Largest pkt-line, prefix included.
pub const MAX_PKT_LINE: usize = 65520;

/// Frame `data` as one pkt-line.
pub fn pkt_line(data: &[u8]) -> Vec<u8> {
    let mut pkt = format!("{:04x}", data.len() + 4).into_bytes();
    pkt.extend_from_slice(data);
    pkt
}

/// A pkt-line entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine<'a> {
    Flush,
    Delimiter,
    ResponseEnd,
    Data(&'a [u8]),
}

/// Reads pkt-lines from a buffer.
pub struct PktLineReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PktLineReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read the next pkt-line, `None` at the end of the buffer.
    pub fn read(&mut self) -> Result<Option<PktLine<'a>>, ProtocolError> {
        if self.pos == self.data.len() {
            return Ok(None);
        }
        if self.pos + 4 > self.data.len() {
            return Err(ProtocolError::Truncated);
        }

        let len_hex =
            std::str::from_utf8(&self.data[self.pos..self.pos + 4]).map_err(|_| ProtocolError::InvalidLength)?;
        let len = usize::from_str_radix(len_hex, 16).map_err(|_| ProtocolError::InvalidLength)?;

        let special = match len {
            0 => Some(PktLine::Flush),
            1 => Some(PktLine::Delimiter),
            2 => Some(PktLine::ResponseEnd),
            3 => return Err(ProtocolError::TooSmall),
            _ => None,
        };
        if let Some(special) = special {
            self.pos += 4;
            return Ok(Some(special));
        }

        if len > MAX_PKT_LINE {
            return Err(ProtocolError::TooLarge);
        }
        if self.pos + len > self.data.len() {
            return Err(ProtocolError::Truncated);
        }

        let payload = &self.data[self.pos + 4..self.pos + len];
        self.pos += len;
        Ok(Some(PktLine::Data(payload)))
    }

    /// Read data lines up to the next flush (or the end of the buffer).
    pub fn read_until_flush(&mut self) -> Result<Vec<&'a [u8]>, ProtocolError> {
        let mut lines = Vec::new();
        loop {
            match self.read()? {
                Some(PktLine::Flush) | Some(PktLine::ResponseEnd) | None => break,
                Some(PktLine::Delimiter) => continue,
                Some(PktLine::Data(data)) => lines.push(data),
            }
        }
        Ok(lines)
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

/// Builds pkt-line output.
#[derive(Default)]
pub struct PktLineWriter {
    buffer: Vec<u8>,
}

impl PktLineWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(&pkt_line(data));
    }

    /// Write `s` followed by a newline.
    pub fn write_str(&mut self, s: &str) {
        self.write(format!("{}\n", s).as_bytes());
    }

    pub fn flush(&mut self) {
        self.buffer.extend_from_slice(FLUSH_PKT);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Side-band channel numbers.
pub const BAND_DATA: u8 = 1;
pub const BAND_PROGRESS: u8 = 2;
pub const BAND_ERROR: u8 = 3;

/// Collect the primary (band 1) payload of a side-band multiplexed stream.
///
/// Progress is dropped and error messages are logged. Reading stops at the
/// first flush.
pub fn demux_sideband(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut reader = PktLineReader::new(data);
    let mut out = Vec::new();
    for line in reader.read_until_flush()? {
        match line.split_first() {
            Some((&BAND_DATA, payload)) => out.extend_from_slice(payload),
            Some((&BAND_PROGRESS, _)) => {}
            Some((&BAND_ERROR, message)) => {
                debug!(message = %String::from_utf8_lossy(message).trim_end(), "side-band error message")
            }
            Some((band, _)) => debug!(band, "ignoring unknown side-band channel"),
            None => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkt_line() {
        assert_eq!(pkt_line(b"# service=git-upload-pack\n"), b"001e# service=git-upload-pack\n".to_vec());
        assert_eq!(pkt_line(b""), b"0004".to_vec());
    }

    #[test]
    fn test_reader() {
        let data = b"0009hello0000000aworld\n0001";
        let mut reader = PktLineReader::new(data);
        assert_eq!(reader.read().unwrap(), Some(PktLine::Data(b"hello")));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Flush));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Data(b"world\n")));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Delimiter));
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn test_reader_errors() {
        assert_eq!(PktLineReader::new(b"00").read(), Err(ProtocolError::Truncated));
        assert_eq!(PktLineReader::new(b"zzzz").read(), Err(ProtocolError::InvalidLength));
        assert_eq!(PktLineReader::new(b"0003").read(), Err(ProtocolError::TooSmall));
        assert_eq!(PktLineReader::new(b"0010abc").read(), Err(ProtocolError::Truncated));
    }

    #[test]
    fn test_read_until_flush_leaves_remaining() {
        let data = b"0008abcd0000PACK";
        let mut reader = PktLineReader::new(data);
        assert_eq!(reader.read_until_flush().unwrap(), vec![&b"abcd"[..]]);
        assert_eq!(reader.remaining(), b"PACK");
    }

    #[test]
    fn test_writer() {
        let mut writer = PktLineWriter::new();
        writer.write_str("# service=git-receive-pack");
        writer.flush();
        assert_eq!(writer.into_bytes(), b"001f# service=git-receive-pack\n0000".to_vec());
    }

    #[test]
    fn test_demux_sideband() {
        let mut inner = PktLineWriter::new();
        inner.write_str("unpack ok");
        inner.flush();
        let inner = inner.into_bytes();

        let mut outer = PktLineWriter::new();
        let mut progress = vec![BAND_PROGRESS];
        progress.extend_from_slice(b"Resolving deltas\n");
        outer.write(&progress);
        let mut data = vec![BAND_DATA];
        data.extend_from_slice(&inner);
        outer.write(&data);
        outer.write(&[BAND_ERROR, b'x']);
        outer.flush();

        assert_eq!(demux_sideband(&outer.into_bytes()).unwrap(), inner);
    }
}
