/// OTA errors, spec §7.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    InvalidArg,
    FirmwareDownload,
    FirmwarePartition,
    FirmwareIncomplete,
    DeviceNoExist,
    SendPacketLoss,
}

impl std::fmt::Display for OtaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArg => f.write_str("invalid argument"),
            Self::FirmwareDownload => f.write_str("partition write failed"),
            Self::FirmwarePartition => f.write_str("no valid inactive partition"),
            Self::FirmwareIncomplete => f.write_str("retries exhausted with responders still unfinished"),
            Self::DeviceNoExist => f.write_str("no responder answered the status poll"),
            Self::SendPacketLoss => f.write_str("status round received only partial responses"),
        }
    }
}

impl std::fmt::Debug for OtaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for OtaError {}
