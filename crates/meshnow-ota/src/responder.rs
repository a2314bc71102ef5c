use std::sync::Arc;

use meshnow_crypto::KeyValueStore;
use meshnow_transport::NodeEvent;
use parking_lot::Mutex;

use crate::bitmap::Bitmap;
use crate::chunk::{chunk_len, packet_num, CHUNK_SIZE};
use crate::error::OtaError;
use crate::messages::{StatusCode, StatusMsg};
use crate::partition::ImageWriter;
use crate::persisted::{self, PersistedOtaState};

/// Default `progress_report_interval` (spec §8 scenario S3 "one per 10% if
/// default interval=10").
const DEFAULT_REPORT_INTERVAL_PCT: u32 = 10;

struct Job {
    sha256: [u8; 16],
    total_size: u32,
    written_size: u32,
    bitmap: Bitmap,
    last_reported_pct: u32,
}

/// Responder-side OTA state machine (spec §4.G "Responder state machine").
/// Generic over the partition writer so tests can run against
/// [`crate::partition::FakePartition`].
pub struct OtaResponder<W: ImageWriter> {
    writer: Arc<W>,
    kv: Arc<dyn KeyValueStore>,
    job: Mutex<Option<Job>>,
}

impl<W: ImageWriter> OtaResponder<W> {
    pub fn new(writer: Arc<W>, kv: Arc<dyn KeyValueStore>) -> Self {
        let job = persisted::load(kv.as_ref()).map(|p| Job {
            sha256: p.sha256,
            total_size: p.total_size,
            written_size: p.written_size,
            bitmap: Bitmap::from_bytes(&p.bitmap, packet_num(p.total_size) as usize),
            last_reported_pct: 0,
        });
        Self {
            writer,
            kv,
            job: Mutex::new(job),
        }
    }

    /// Handles an incoming `STATUS` probe/poll, spec §4.G.
    pub fn handle_status(&self, incoming: &StatusMsg) -> StatusMsg {
        if incoming.sha256 == self.writer.running_sha256() {
            return StatusMsg {
                sha256: incoming.sha256,
                error_code: StatusCode::Finish,
                packet_num: incoming.packet_num,
                total_size: incoming.total_size,
                written_size: 0,
                progress_index: incoming.progress_index,
                stripe: None,
            };
        }

        let mut job = self.job.lock();
        let same_job = job
            .as_ref()
            .map(|j| j.sha256 == incoming.sha256 && j.total_size == incoming.total_size)
            .unwrap_or(false);

        if !same_job {
            if self.writer.begin(incoming.total_size).is_err() {
                return StatusMsg {
                    sha256: incoming.sha256,
                    error_code: StatusCode::FirmwareNotInit,
                    packet_num: incoming.packet_num,
                    total_size: incoming.total_size,
                    written_size: 0,
                    progress_index: incoming.progress_index,
                    stripe: None,
                };
            }
            let new_job = Job {
                sha256: incoming.sha256,
                total_size: incoming.total_size,
                written_size: 0,
                bitmap: Bitmap::zeros(packet_num(incoming.total_size) as usize),
                last_reported_pct: 0,
            };
            persisted::save(
                self.kv.as_ref(),
                &PersistedOtaState {
                    sha256: new_job.sha256,
                    total_size: new_job.total_size,
                    written_size: new_job.written_size,
                    bitmap: new_job.bitmap.as_bytes().to_vec(),
                },
            );
            *job = Some(new_job);
            return StatusMsg {
                sha256: incoming.sha256,
                error_code: StatusCode::FirmwareNotInit,
                packet_num: incoming.packet_num,
                total_size: incoming.total_size,
                written_size: 0,
                progress_index: incoming.progress_index,
                stripe: None,
            };
        }

        let j = job.as_ref().unwrap();
        StatusMsg {
            sha256: j.sha256,
            error_code: StatusCode::InProgress,
            packet_num: packet_num(j.total_size),
            total_size: j.total_size,
            written_size: j.written_size,
            progress_index: incoming.progress_index,
            stripe: Some(j.bitmap.stripe(incoming.progress_index as usize)),
        }
    }

    /// Handles an incoming `DATA(seq)` chunk, spec §4.G. Returns
    /// `Some(event)` when a progress report or finish is due.
    pub fn handle_data(&self, seq: u16, data: &[u8]) -> Result<Option<NodeEvent>, OtaError> {
        let mut job_guard = self.job.lock();
        let job = job_guard.as_mut().ok_or(OtaError::InvalidArg)?;

        if seq as u32 * CHUNK_SIZE as u32 > job.total_size {
            return Err(OtaError::InvalidArg);
        }
        if job.bitmap.is_set(seq as usize) {
            return Ok(None); // duplicate, ack by silence
        }

        let expect_len = chunk_len(seq, job.total_size);
        if data.len() != expect_len {
            return Err(OtaError::FirmwareDownload);
        }

        self.writer.write(seq as u32 * CHUNK_SIZE as u32, data).map_err(|e| {
            tracing::warn!(seq, error = ?e, "flash write failed, dropping chunk");
            OtaError::FirmwareDownload
        })?;
        job.bitmap.set(seq as usize);
        job.written_size += data.len() as u32;

        let percent = job.written_size as u64 * 100 / job.total_size.max(1) as u64;
        let finished = job.written_size == job.total_size;

        let mut event = None;
        if finished || percent as u32 >= job.last_reported_pct + DEFAULT_REPORT_INTERVAL_PCT {
            job.last_reported_pct = percent as u32;
            persisted::save(
                self.kv.as_ref(),
                &PersistedOtaState {
                    sha256: job.sha256,
                    total_size: job.total_size,
                    written_size: job.written_size,
                    bitmap: job.bitmap.as_bytes().to_vec(),
                },
            );
            event = Some(NodeEvent::OtaStatus {
                addr: meshnow_wire::Mac::BROADCAST,
                percent: percent as u8,
            });
        }

        if finished {
            self.writer.end().map_err(|e| {
                tracing::warn!(error = ?e, "finalizing firmware partition failed");
                OtaError::FirmwareDownload
            })?;
            self.writer.set_boot_partition().map_err(|e| {
                tracing::warn!(error = ?e, "setting boot partition failed");
                OtaError::FirmwarePartition
            })?;
            persisted::erase(self.kv.as_ref());
            *job_guard = None;
            return Ok(Some(NodeEvent::OtaFinish { addr: meshnow_wire::Mac::BROADCAST }));
        }

        Ok(event)
    }

    /// `stop()`, spec §4.G: moves `error_code` to `STOP`, zeroes progress,
    /// persists nothing, and the caller broadcasts the returned `STATUS`.
    pub fn stop(&self) -> StatusMsg {
        let mut job = self.job.lock();
        let (sha256, total_size, packet_num_) = job
            .as_ref()
            .map(|j| (j.sha256, j.total_size, packet_num(j.total_size)))
            .unwrap_or(([0; 16], 0, 0));
        *job = None;
        StatusMsg {
            sha256,
            error_code: StatusCode::Stop,
            packet_num: packet_num_,
            total_size,
            written_size: 0,
            progress_index: 0,
            stripe: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::FakePartition;
    use meshnow_crypto::InMemoryStore;

    fn new_responder(image_len: usize) -> OtaResponder<FakePartition> {
        let writer = Arc::new(FakePartition::new(vec![0u8; image_len]));
        let kv = Arc::new(InMemoryStore::new());
        OtaResponder::new(writer, kv)
    }

    #[test]
    fn fresh_status_opens_a_new_job() {
        let responder = new_responder(10_000);
        let probe = StatusMsg {
            sha256: [9; 16],
            error_code: StatusCode::InProgress,
            packet_num: 45,
            total_size: 10_000,
            written_size: 0,
            progress_index: 0,
            stripe: None,
        };
        let reply = responder.handle_status(&probe);
        assert_eq!(reply.error_code, StatusCode::FirmwareNotInit);
    }

    #[test]
    fn bitmap_and_written_size_are_monotonic_until_finish() {
        let responder = new_responder(10_000);
        let probe = StatusMsg {
            sha256: [9; 16],
            error_code: StatusCode::InProgress,
            packet_num: 45,
            total_size: 10_000,
            written_size: 0,
            progress_index: 0,
            stripe: None,
        };
        responder.handle_status(&probe);

        let mut last_written = 0u32;
        for seq in 0..45u16 {
            let len = chunk_len(seq, 10_000);
            let result = responder.handle_data(seq, &vec![seq as u8; len]).unwrap();
            let job = responder.job.lock();
            let written = job.as_ref().map(|j| j.written_size).unwrap_or(10_000);
            assert!(written >= last_written);
            last_written = written;
            drop(job);
            if seq == 44 {
                assert!(matches!(result, Some(NodeEvent::OtaFinish { .. })));
            }
        }
        assert_eq!(last_written, 10_000);
    }

    #[test]
    fn seq_past_packet_num_is_rejected() {
        let responder = new_responder(10_000);
        responder.handle_status(&StatusMsg {
            sha256: [9; 16],
            error_code: StatusCode::InProgress,
            packet_num: 45,
            total_size: 10_000,
            written_size: 0,
            progress_index: 0,
            stripe: None,
        });
        // 45 * 226 = 10170 > 10000: one past the last valid chunk (0..=44).
        let result = responder.handle_data(45, &[0u8; 1]);
        assert!(matches!(result, Err(OtaError::InvalidArg)));
    }

    #[test]
    fn duplicate_chunk_is_ignored() {
        let responder = new_responder(500);
        responder.handle_status(&StatusMsg {
            sha256: [1; 16],
            error_code: StatusCode::InProgress,
            packet_num: packet_num(500),
            total_size: 500,
            written_size: 0,
            progress_index: 0,
            stripe: None,
        });
        let len = chunk_len(0, 500);
        responder.handle_data(0, &vec![1u8; len]).unwrap();
        let result = responder.handle_data(0, &vec![1u8; len]).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn resume_after_simulated_crash_reports_existing_bitmap() {
        let writer = Arc::new(FakePartition::new(vec![0u8; 10_000]));
        let kv = Arc::new(InMemoryStore::new());
        {
            let responder = OtaResponder::new(writer.clone(), kv.clone());
            responder.handle_status(&StatusMsg {
                sha256: [3; 16],
                error_code: StatusCode::InProgress,
                packet_num: 45,
                total_size: 10_000,
                written_size: 0,
                progress_index: 0,
                stripe: None,
            });
            for seq in 0..27u16 {
                let len = chunk_len(seq, 10_000);
                responder.handle_data(seq, &vec![7u8; len]).unwrap();
            }
            // Simulated crash: responder dropped without finishing.
        }

        // "Reboot": a fresh responder loads persisted state from the same kv.
        let responder = OtaResponder::new(writer, kv);
        let reply = responder.handle_status(&StatusMsg {
            sha256: [3; 16],
            error_code: StatusCode::InProgress,
            packet_num: 45,
            total_size: 10_000,
            written_size: 0,
            progress_index: 0,
            stripe: None,
        });
        assert_eq!(reply.error_code, StatusCode::InProgress);
        let stripe = reply.stripe.unwrap();
        for seq in 0..27usize {
            assert_eq!(stripe[seq / 8] & (1 << (seq % 8)), 1 << (seq % 8));
        }
        assert_eq!(stripe[27 / 8] & (1 << (27 % 8)), 0);
    }
}
