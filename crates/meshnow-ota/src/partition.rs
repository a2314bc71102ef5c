use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::OtaError;

/// Read side of firmware storage (spec §9: "model as two small traits,
/// `ImageReader` ... and `ImageWriter`"). Implemented by the OTA initiator
/// over the image it intends to distribute.
pub trait ImageReader: Send + Sync {
    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), OtaError>;
}

/// Write side of firmware storage, implemented by the OTA responder over
/// its inactive partition.
pub trait ImageWriter: Send + Sync {
    fn begin(&self, total_size: u32) -> Result<(), OtaError>;
    fn write(&self, offset: u32, data: &[u8]) -> Result<(), OtaError>;
    fn end(&self) -> Result<(), OtaError>;
    fn set_boot_partition(&self) -> Result<(), OtaError>;
    /// Truncated SHA-256 (first 16 bytes) of the currently running image
    /// (spec §4.G: "Compare incoming `sha256` with the currently running
    /// partition's SHA-256").
    fn running_sha256(&self) -> [u8; 16];
}

fn truncated_sha256(data: &[u8]) -> [u8; 16] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[0..16]);
    out
}

/// RAM-backed fake partition pair for tests and the demo binary (spec §9:
/// "Testing uses a RAM-backed fake").
pub struct FakePartition {
    running: Mutex<Vec<u8>>,
    staging: Mutex<Vec<u8>>,
    began: Mutex<bool>,
}

impl FakePartition {
    pub fn new(running_image: Vec<u8>) -> Self {
        Self {
            running: Mutex::new(running_image),
            staging: Mutex::new(Vec::new()),
            began: Mutex::new(false),
        }
    }

    /// Snapshot of the staged (written-so-far) image, for test assertions.
    pub fn staged_image(&self) -> Vec<u8> {
        self.staging.lock().clone()
    }

    /// Promotes the staged image to "running", simulating a reboot into the
    /// newly flashed partition.
    pub fn promote_staged_to_running(&self) {
        let staged = self.staging.lock().clone();
        *self.running.lock() = staged;
    }
}

impl ImageReader for FakePartition {
    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), OtaError> {
        let running = self.running.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > running.len() {
            return Err(OtaError::InvalidArg);
        }
        buf.copy_from_slice(&running[start..end]);
        Ok(())
    }
}

impl ImageWriter for FakePartition {
    fn begin(&self, total_size: u32) -> Result<(), OtaError> {
        *self.staging.lock() = vec![0u8; total_size as usize];
        *self.began.lock() = true;
        Ok(())
    }

    fn write(&self, offset: u32, data: &[u8]) -> Result<(), OtaError> {
        if !*self.began.lock() {
            return Err(OtaError::FirmwarePartition);
        }
        let mut staging = self.staging.lock();
        let start = offset as usize;
        let end = start + data.len();
        if end > staging.len() {
            return Err(OtaError::FirmwareDownload);
        }
        staging[start..end].copy_from_slice(data);
        Ok(())
    }

    fn end(&self) -> Result<(), OtaError> {
        *self.began.lock() = false;
        Ok(())
    }

    fn set_boot_partition(&self) -> Result<(), OtaError> {
        Ok(())
    }

    fn running_sha256(&self) -> [u8; 16] {
        truncated_sha256(&self.running.lock())
    }
}

/// Truncated SHA-256 of an arbitrary image buffer, used by initiators and
/// tests to compute the identity carried in `STATUS.sha256`.
pub fn image_sha256(image: &[u8]) -> [u8; 16] {
    truncated_sha256(image)
}
