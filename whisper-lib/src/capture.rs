//! Receive-side capture abstraction.
//!
//! NIC bring-up is an external concern; the pipeline only depends on the
//! burst-receive contract below. `ReplayProvider` is the offline
//! implementation shipped with the binary: it replays a pcap trace through
//! the configured queues so the full pipeline runs without hardware.

use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use pcap_file::pcap::PcapReader;

use crate::error::{Result, WhisperError};

/// One raw frame delivered by a receive queue.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// L2 bytes as captured.
    pub data: Vec<u8>,
    /// Capture timestamp, seconds.
    pub timestamp: f64,
}

/// Burst, non-blocking receive endpoint of one RX queue.
///
/// `burst_receive` appends at most `max` frames to `out` and returns the
/// number appended; zero means the queue is currently empty. Implementations
/// absorb transient receive errors internally, the pipeline never sees them.
pub trait RxQueue: Send {
    fn burst_receive(&mut self, out: &mut Vec<RawFrame>, max: usize) -> usize;
}

/// Provides the RX queues of one configured port.
pub trait SourceProvider {
    /// Opens `rx_queues` receive queues on `port`. Fails when the port is
    /// unknown or cannot supply that many queues.
    fn open(&mut self, port: u16, rx_queues: u16) -> Result<Vec<Box<dyn RxQueue>>>;
}

/// The packets of one loaded trace, shared by every queue replaying it.
struct ReplayTape {
    frames: VecDeque<RawFrame>,
}

impl ReplayTape {
    fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            WhisperError::Capture(format!("cannot open trace {}: {e}", path.display()))
        })?;
        let mut reader = PcapReader::new(file)
            .map_err(|e| WhisperError::Capture(format!("bad pcap {}: {e}", path.display())))?;

        let mut frames = VecDeque::new();
        while let Some(pkt) = reader.next_packet() {
            let pkt = pkt
                .map_err(|e| WhisperError::Capture(format!("bad pcap {}: {e}", path.display())))?;
            frames.push_back(RawFrame {
                data: pkt.data.into_owned(),
                timestamp: pkt.timestamp.as_secs_f64(),
            });
        }
        Ok(Self { frames })
    }
}

/// One RX queue view onto a shared replay tape.
///
/// All queues of all ports pull from the same tape, which emulates RSS
/// spreading one traffic stream across queues. Once the tape runs dry the
/// queue reports empty forever.
pub struct ReplayQueue {
    tape: Arc<Mutex<ReplayTape>>,
}

impl RxQueue for ReplayQueue {
    fn burst_receive(&mut self, out: &mut Vec<RawFrame>, max: usize) -> usize {
        let mut tape = self.tape.lock().unwrap_or_else(PoisonError::into_inner);
        let n = tape.frames.len().min(max);
        out.extend(tape.frames.drain(..n));
        n
    }
}

/// Opens replay queues backed by one pcap trace.
pub struct ReplayProvider {
    tape: Arc<Mutex<ReplayTape>>,
}

impl ReplayProvider {
    pub fn from_trace<P: AsRef<Path>>(path: P) -> Result<Self> {
        let tape = ReplayTape::load(path.as_ref())?;
        Ok(Self { tape: Arc::new(Mutex::new(tape)) })
    }
}

impl SourceProvider for ReplayProvider {
    fn open(&mut self, _port: u16, rx_queues: u16) -> Result<Vec<Box<dyn RxQueue>>> {
        let mut queues: Vec<Box<dyn RxQueue>> = Vec::with_capacity(rx_queues.into());
        for _ in 0..rx_queues {
            queues.push(Box::new(ReplayQueue { tape: Arc::clone(&self.tape) }));
        }
        Ok(queues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcap_file::pcap::{PcapPacket, PcapWriter};
    use std::borrow::Cow;
    use std::io::Write;
    use std::time::Duration;

    fn write_trace(frames: &[(f64, &[u8])]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("tmp file");
        {
            let mut writer = PcapWriter::new(tmp.as_file_mut()).expect("pcap header");
            for &(ts, data) in frames {
                let pkt = PcapPacket {
                    timestamp: Duration::from_secs_f64(ts),
                    orig_len: data.len() as u32,
                    data: Cow::Borrowed(data),
                };
                writer.write_packet(&pkt).expect("write packet");
            }
        }
        tmp.as_file_mut().flush().expect("flush");
        tmp
    }

    #[test]
    fn replay_queues_share_one_tape() {
        let tmp = write_trace(&[(1.0, &[1u8; 60]), (1.5, &[2u8; 60]), (2.0, &[3u8; 60])]);
        let mut provider = ReplayProvider::from_trace(tmp.path()).expect("load trace");
        let mut queues = provider.open(0, 2).expect("open queues");

        let mut out = Vec::new();
        assert_eq!(queues[0].burst_receive(&mut out, 2), 2);
        assert_eq!(queues[1].burst_receive(&mut out, 2), 1);
        assert_eq!(queues[1].burst_receive(&mut out, 2), 0);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].data[0], 1);
        assert!((out[1].timestamp - 1.5).abs() < 1e-9);
    }
}
