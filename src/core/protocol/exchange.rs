//! Blocking command/response primitives run on a worker thread.

use crate::core::protocol::frame::{Command, Frame, LineBuffer};
use crate::core::transport::TransportLink;
use crate::domain::error::{BridgeError, BridgeResult};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Bytes requested per read call
pub const READ_CHUNK_SIZE: usize = 1024;

/// Timing of one receive loop
#[derive(Debug, Clone, Copy)]
pub struct ReceiveOptions {
    /// Overall wall-clock deadline, never extended
    pub timeout: Duration,
    /// Budget of a single `read_chunk` call
    pub poll_interval: Duration,
}

fn lock_link(
    link: &Mutex<Box<dyn TransportLink>>,
) -> BridgeResult<std::sync::MutexGuard<'_, Box<dyn TransportLink>>> {
    link.lock()
        .map_err(|_| BridgeError::IoFault("link lock poisoned".to_string()))
}

/// Write one framed command. The output buffer is purged first; a failed
/// purge is only logged.
pub fn write_command(
    link: &Mutex<Box<dyn TransportLink>>,
    command: &Command,
    timeout: Duration,
) -> BridgeResult<()> {
    let bytes = command.encode();
    let mut link = lock_link(link)?;

    if let Err(e) = link.purge(false, true) {
        warn!("Failed to purge output buffer before {}: {}", command.name(), e);
    }

    link.write_bytes(&bytes, timeout)?;
    debug!("Sent {} bytes: {}", bytes.len(), hex::encode(&bytes));
    Ok(())
}

/// Read lines until an `IR_RAW:` frame arrives or the deadline passes.
///
/// The waiting line and unrecognized lines are dropped. `cancelled` is polled
/// between reads so a closing session is noticed within one poll interval.
/// The link lock is held only for a single read so `close` can interleave.
pub fn receive_payload<F>(
    link: &Mutex<Box<dyn TransportLink>>,
    options: ReceiveOptions,
    cancelled: F,
) -> BridgeResult<String>
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + options.timeout;
    let mut lines = LineBuffer::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        if cancelled() {
            return Err(BridgeError::Closed);
        }

        let now = Instant::now();
        if now >= deadline {
            debug!("No payload within {:?} ({} bytes pending)", options.timeout, lines.pending());
            return Err(BridgeError::Timeout);
        }
        let budget = options.poll_interval.min(deadline - now);

        let n = lock_link(link)?.read_chunk(&mut chunk, budget)?;
        if n == 0 {
            continue;
        }
        debug!("Received {} bytes: {}", n, hex::encode(&chunk[..n]));
        lines.push(&chunk[..n]);

        while let Some(line) = lines.next_line() {
            match Frame::classify(&line) {
                Frame::Payload(payload) => return Ok(payload),
                Frame::Waiting => debug!("Device armed, waiting for IR signal"),
                Frame::Unrecognized(other) if other.is_empty() => {}
                Frame::Unrecognized(other) => debug!("Discarding unrecognized frame: {}", other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Step {
        Bytes(&'static [u8]),
        Fault,
    }

    struct ScriptLink {
        steps: VecDeque<Step>,
        reads: Arc<AtomicUsize>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    type Harness = (Mutex<Box<dyn TransportLink>>, Arc<AtomicUsize>, Arc<Mutex<Vec<u8>>>);

    impl ScriptLink {
        fn boxed(steps: Vec<Step>) -> Harness {
            let reads = Arc::new(AtomicUsize::new(0));
            let written = Arc::new(Mutex::new(Vec::new()));
            let link = ScriptLink {
                steps: steps.into(),
                reads: Arc::clone(&reads),
                written: Arc::clone(&written),
            };
            let boxed: Box<dyn TransportLink> = Box::new(link);
            (Mutex::new(boxed), reads, written)
        }
    }

    impl TransportLink for ScriptLink {
        fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> BridgeResult<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.steps.pop_front() {
                Some(Step::Bytes(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(bytes);
                    Ok(bytes.len())
                }
                Some(Step::Fault) => Err(BridgeError::IoFault("unplugged".to_string())),
                None => {
                    std::thread::sleep(timeout);
                    Ok(0)
                }
            }
        }

        fn write_bytes(&mut self, data: &[u8], _timeout: Duration) -> BridgeResult<()> {
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        fn set_control_lines(&mut self, _dtr: bool, _rts: bool) -> BridgeResult<()> {
            Ok(())
        }

        fn purge(&mut self, _input: bool, _output: bool) -> BridgeResult<()> {
            Err(BridgeError::IoFault("purge unsupported".to_string()))
        }

        fn close(&mut self) {}
    }

    fn options(timeout_ms: u64) -> ReceiveOptions {
        ReceiveOptions {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_waiting_line_is_skipped() {
        let (link, _, _) = ScriptLink::boxed(vec![
            Step::Bytes(b"Waiting for IR"),
            Step::Bytes(b" signal...\r\n"),
            Step::Bytes(b"IR_RAW:1,"),
            Step::Bytes(b"2,3\r\n"),
        ]);
        let payload = receive_payload(&link, options(1000), || false).unwrap();
        assert_eq!(payload, "IR_RAW:1,2,3");
    }

    #[test]
    fn test_unrecognized_frames_are_discarded() {
        let (link, _, _) = ScriptLink::boxed(vec![
            Step::Bytes(b"READY\n\n"),
            Step::Bytes(b"IR_RAW:42\n"),
        ]);
        assert_eq!(receive_payload(&link, options(1000), || false).unwrap(), "IR_RAW:42");
    }

    #[test]
    fn test_silence_times_out() {
        let (link, _, _) = ScriptLink::boxed(vec![Step::Bytes(b"Waiting for IR signal...\n")]);
        let start = Instant::now();
        let result = receive_payload(&link, options(100), || false);
        assert!(matches!(result, Err(BridgeError::Timeout)));
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_fault_aborts_immediately() {
        let (link, reads, _) = ScriptLink::boxed(vec![Step::Bytes(b"Wait"), Step::Fault]);
        let start = Instant::now();
        let result = receive_payload(&link, options(5000), || false);
        assert!(matches!(result, Err(BridgeError::IoFault(_))));
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancellation_is_observed_between_reads() {
        let (link, _, _) = ScriptLink::boxed(Vec::new());
        let cancelled = AtomicBool::new(true);
        let result = receive_payload(&link, options(5000), || cancelled.load(Ordering::SeqCst));
        assert!(matches!(result, Err(BridgeError::Closed)));
    }

    #[test]
    fn test_write_command_frames_and_survives_purge_failure() {
        let (link, _, written) = ScriptLink::boxed(Vec::new());
        let command = Command::send("IR_RAW:1,2,3").unwrap();
        write_command(&link, &command, Duration::from_millis(100)).unwrap();
        assert_eq!(written.lock().unwrap().as_slice(), b"SEND:IR_RAW:1,2,3\n");
    }
}
