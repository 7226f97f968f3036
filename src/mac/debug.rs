//! PCAP capture of exchanged LLCP frames.
//!
//! Files use LINKTYPE_NFC_LLCP (245): every record carries a two-byte
//! pseudo-header (adapter number, direction flags) before the LLCP PDU, so
//! Wireshark dissects captures directly.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Direction of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by this device
    Sent,
    /// Received from the peer
    Received,
}

impl Direction {
    const fn flags(self) -> u8 {
        match self {
            Self::Sent => 0x01,
            Self::Received => 0x00,
        }
    }
}

/// Thread-safe PCAP writer.
#[derive(Clone)]
pub struct PcapRecorder {
    inner: Arc<Mutex<PcapWriter>>,
}

impl PcapRecorder {
    /// Create a capture at `path`, truncating any existing file.
    pub fn create(path: &Path) -> io::Result<Self> {
        let writer = PcapWriter::new(File::create(path)?)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(writer)),
        })
    }

    /// Append one frame stamped with the current time.
    pub fn record(&self, direction: Direction, frame: &[u8]) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("pcap recorder poisoned"))?;
        guard.write_frame(SystemTime::now(), direction, frame)
    }
}

impl std::fmt::Debug for PcapRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcapRecorder").finish_non_exhaustive()
    }
}

struct PcapWriter {
    out: BufWriter<File>,
}

impl PcapWriter {
    fn new(file: File) -> io::Result<Self> {
        let mut out = BufWriter::new(file);
        out.write_all(&global_header())?;
        out.flush()?;
        Ok(Self { out })
    }

    fn write_frame(&mut self, timestamp: SystemTime, direction: Direction, frame: &[u8]) -> io::Result<()> {
        let (sec, usec) = micros(timestamp);
        let captured = frame.len().min(PCAP_SNAPLEN as usize - PSEUDO_HEADER_LEN);
        let length = u32::try_from(captured + PSEUDO_HEADER_LEN).unwrap_or(PCAP_SNAPLEN);

        let mut header = [0u8; 16];
        header[0..4].copy_from_slice(&sec.to_le_bytes());
        header[4..8].copy_from_slice(&usec.to_le_bytes());
        header[8..12].copy_from_slice(&length.to_le_bytes());
        header[12..16].copy_from_slice(&length.to_le_bytes());

        self.out.write_all(&header)?;
        self.out.write_all(&[ADAPTER, direction.flags()])?;
        self.out.write_all(&frame[..captured])?;
        self.out.flush()
    }
}

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const PCAP_VERSION_MAJOR: u16 = 2;
const PCAP_VERSION_MINOR: u16 = 4;
const PCAP_SNAPLEN: u32 = 65_535;
const LINKTYPE_NFC_LLCP: u32 = 245;
const PSEUDO_HEADER_LEN: usize = 2;
const ADAPTER: u8 = 0;

fn global_header() -> [u8; 24] {
    let mut header = [0u8; 24];
    header[0..4].copy_from_slice(&PCAP_MAGIC.to_le_bytes());
    header[4..6].copy_from_slice(&PCAP_VERSION_MAJOR.to_le_bytes());
    header[6..8].copy_from_slice(&PCAP_VERSION_MINOR.to_le_bytes());
    // thiszone and sigfigs stay zero
    header[16..20].copy_from_slice(&PCAP_SNAPLEN.to_le_bytes());
    header[20..24].copy_from_slice(&LINKTYPE_NFC_LLCP.to_le_bytes());
    header
}

fn micros(timestamp: SystemTime) -> (u32, u32) {
    let duration = timestamp.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = u32::try_from(duration.as_secs()).unwrap_or(u32::MAX);
    (secs, duration.subsec_micros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_layout() {
        let path = std::env::temp_dir().join(format!("llcp-capture-{}.pcap", std::process::id()));
        let recorder = PcapRecorder::create(&path).unwrap();
        recorder.record(Direction::Sent, &[0x06, 0x41]).unwrap();
        recorder.record(Direction::Received, &[0x00, 0x00]).unwrap();

        let data = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.len(), 24 + 2 * (16 + 4));
        assert_eq!(&data[20..24], &245u32.to_le_bytes());
        // first record: caplen 4, pseudo-header then PDU
        assert_eq!(&data[32..36], &4u32.to_le_bytes());
        assert_eq!(&data[40..44], &[0x00, 0x01, 0x06, 0x41]);
        assert_eq!(&data[60..64], &[0x00, 0x00, 0x00, 0x00]);
    }
}
