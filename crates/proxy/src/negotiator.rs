//! Accessory negotiator
//!
//! Runs the control-transfer handshake that asks an Android device to
//! switch into accessory mode:
//!
//! 1. get-protocol: read the AOA version (1 or 2)
//! 2. send-string: identification, only with manufacturer and model set
//! 3. set-audio-mode: only on AOAv2 and when requested
//! 4. start: the device disconnects and re-enumerates as an accessory
//!
//! The negotiator does not wait for the device to come back; the next
//! invocation finds it at the same topology address.

use common::{ControlTransport, Error, Result};
use protocol::identity::encode_string;
use protocol::{
    AUDIO_MODE_ENABLED, AoaRequest, AoaVersion, IdentificationRecord, REQUEST_TYPE_VENDOR_IN,
    REQUEST_TYPE_VENDOR_OUT,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a device was left alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsupported {
    /// The device stalled the get-protocol request
    RequestNotSupported,
    /// get-protocol failed for another reason
    TransferFailed(rusb::Error),
    /// The response was too short to hold a version
    TruncatedResponse(usize),
    /// The device reported a version other than 1 or 2
    UnknownVersion(AoaVersion),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// No further transfers were issued
    Unsupported(Unsupported),
    /// The start request went out
    Started {
        version: AoaVersion,
        identified: bool,
        audio: bool,
    },
}

/// Drives the handshake over any control transport
pub struct Negotiator<'a, C: ControlTransport> {
    transport: &'a C,
    identity: &'a IdentificationRecord,
    audio: bool,
    timeout: Duration,
}

impl<'a, C: ControlTransport> Negotiator<'a, C> {
    pub fn new(
        transport: &'a C,
        identity: &'a IdentificationRecord,
        audio: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            identity,
            audio,
            timeout,
        }
    }

    pub fn negotiate(&self) -> Result<NegotiationOutcome> {
        let version = match self.query_version() {
            Ok(version) => version,
            Err(reason) => {
                match &reason {
                    Unsupported::RequestNotSupported => warn!(
                        "Device does not support AOA mode (control request was not supported by the device)"
                    ),
                    Unsupported::TransferFailed(e) => warn!(
                        "Device responded to AOA version request with an error: {}",
                        e
                    ),
                    Unsupported::TruncatedResponse(len) => warn!(
                        "Device does not support AOA mode (version response was {} bytes)",
                        len
                    ),
                    Unsupported::UnknownVersion(version) => warn!(
                        "Device does not support AOA mode (version should be 1 or 2, but is {})",
                        version.0
                    ),
                }
                return Ok(NegotiationOutcome::Unsupported(reason));
            }
        };
        info!("Device supports {}", version);

        let identified = if self.identity.is_complete() {
            self.send_identification()?;
            true
        } else {
            debug!("Manufacturer or model empty, skipping identification");
            false
        };

        let audio = self.audio && version.supports_audio();
        if audio {
            self.out_request("set-audio-mode", AoaRequest::SetAudioMode, AUDIO_MODE_ENABLED, 0, &[])?;
            debug!("Requested audio output");
        } else if self.audio {
            warn!("Audio requested but {} has no audio support", version);
        }

        self.out_request("start", AoaRequest::Start, 0, 0, &[])?;
        info!("Requested accessory mode; the device will re-enumerate");

        Ok(NegotiationOutcome::Started {
            version,
            identified,
            audio,
        })
    }

    fn query_version(&self) -> std::result::Result<AoaVersion, Unsupported> {
        let mut buf = [0u8; 2];
        let len = self
            .transport
            .read_control(
                REQUEST_TYPE_VENDOR_IN,
                AoaRequest::GetProtocol.code(),
                0,
                0,
                &mut buf,
                self.timeout,
            )
            .map_err(|e| match e {
                rusb::Error::Pipe => Unsupported::RequestNotSupported,
                other => Unsupported::TransferFailed(other),
            })?;

        let version = AoaVersion::from_response(&buf[..len])
            .map_err(|_| Unsupported::TruncatedResponse(len))?;

        if !version.is_supported() {
            return Err(Unsupported::UnknownVersion(version));
        }
        Ok(version)
    }

    fn send_identification(&self) -> Result<()> {
        for (field, value) in self.identity.fields() {
            self.out_request(
                field.name(),
                AoaRequest::SendString,
                0,
                field.index(),
                &encode_string(value),
            )?;
            debug!("Sent {} string ({} bytes)", field.name(), value.len());
        }
        Ok(())
    }

    fn out_request(
        &self,
        step: &'static str,
        request: AoaRequest,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<()> {
        self.transport
            .write_control(
                REQUEST_TYPE_VENDOR_OUT,
                request.code(),
                value,
                index,
                data,
                self.timeout,
            )
            .map_err(|source| Error::Control { step, source })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::MockControl;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn test_version_query_is_vendor_in() {
        let control = MockControl::with_version(1);
        let identity = IdentificationRecord::default();
        Negotiator::new(&control, &identity, false, TIMEOUT)
            .negotiate()
            .unwrap();

        let first = &control.calls()[0];
        assert_eq!(first.request_type, REQUEST_TYPE_VENDOR_IN);
        assert_eq!(first.request, 51);
    }

    #[test]
    fn test_truncated_response() {
        let control = MockControl::new();
        control.push_read(Ok(vec![1]));
        let identity = IdentificationRecord::default();
        let outcome = Negotiator::new(&control, &identity, false, TIMEOUT)
            .negotiate()
            .unwrap();

        assert_eq!(
            outcome,
            NegotiationOutcome::Unsupported(Unsupported::TruncatedResponse(1))
        );
        assert_eq!(control.requests(), vec![51]);
    }
}
