//! HID channel
//!
//! Registers a HID descriptor with an accessory-mode device and streams
//! input reports to it over control transfers. Input is line based: the
//! first non-empty line is the base64 descriptor, every following line
//! one base64 report.

use common::{ControlTransport, Error, Result};
use protocol::{
    AoaRequest, HID_INDEX, HidDescriptor, HidReport, ProtocolError, REQUEST_TYPE_VENDOR_OUT,
};
use std::io::BufRead;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a HID session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HidOutcome {
    /// Input ended before a descriptor line
    NoDescriptor,
    /// The descriptor line could not be used; nothing was sent
    DescriptorRejected(ProtocolError),
    /// Input reached end-of-file (or a read error) after registration
    Completed { reports_sent: usize },
    /// A report line was malformed or too large
    Aborted {
        reports_sent: usize,
        reason: ProtocolError,
    },
}

pub struct HidChannel<'a, C: ControlTransport> {
    transport: &'a C,
    max_packet_size: usize,
    settle_delay: Duration,
    timeout: Duration,
}

impl<'a, C: ControlTransport> HidChannel<'a, C> {
    pub fn new(
        transport: &'a C,
        max_packet_size: usize,
        settle_delay: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            max_packet_size: max_packet_size.max(1),
            settle_delay,
            timeout,
        }
    }

    /// Register the descriptor read from `input`, then forward reports
    /// until the input ends. The device is unregistered on every exit
    /// path once registration was attempted.
    pub fn run<B: BufRead>(&self, mut input: B) -> Result<HidOutcome> {
        let Some(line) = read_line(&mut input)? else {
            info!("No HID descriptor received");
            return Ok(HidOutcome::NoDescriptor);
        };

        let descriptor = match HidDescriptor::from_base64_line(&line) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Rejecting HID descriptor: {}", e);
                return Ok(HidOutcome::DescriptorRejected(e));
            }
        };

        if let Err(e) = self.register(&descriptor) {
            self.unregister();
            return Err(e);
        }
        info!("Registered HID descriptor ({} bytes)", descriptor.len());

        std::thread::sleep(self.settle_delay);

        let outcome = self.forward_reports(&mut input);
        self.unregister();
        Ok(outcome)
    }

    fn register(&self, descriptor: &HidDescriptor) -> Result<()> {
        self.send(AoaRequest::RegisterHid, descriptor.len(), &[])
            .map_err(|source| Error::Control {
                step: "register-hid",
                source,
            })?;

        for chunk in descriptor.chunks(self.max_packet_size) {
            self.send(AoaRequest::SetHidReportDesc, chunk.offset, chunk.data)
                .map_err(|source| Error::Control {
                    step: "set-hid-report-desc",
                    source,
                })?;
            debug!("Sent descriptor chunk at offset {}", chunk.offset);
        }
        Ok(())
    }

    fn forward_reports<B: BufRead>(&self, input: &mut B) -> HidOutcome {
        let mut reports_sent = 0;
        let mut line = String::new();

        loop {
            line.clear();
            match input.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Error reading HID input: {}", e);
                    break;
                }
            }
            if line.trim().is_empty() {
                continue;
            }

            let report = match HidReport::from_base64_line(&line, self.max_packet_size) {
                Ok(report) => report,
                Err(reason) => {
                    warn!("Stopping HID event loop: {}", reason);
                    return HidOutcome::Aborted {
                        reports_sent,
                        reason,
                    };
                }
            };

            match self.send(AoaRequest::SendHidEvent, 0, report.as_bytes()) {
                Ok(()) => reports_sent += 1,
                Err(e) => warn!("Failed to send HID event: {}", e),
            }
        }

        debug!("HID input ended after {} reports", reports_sent);
        HidOutcome::Completed { reports_sent }
    }

    fn unregister(&self) {
        if let Err(e) = self.send(AoaRequest::UnregisterHid, 0, &[]) {
            debug!("Unregistering HID device failed: {}", e);
        }
    }

    fn send(&self, request: AoaRequest, index: u16, data: &[u8]) -> rusb::Result<()> {
        self.transport.write_control(
            REQUEST_TYPE_VENDOR_OUT,
            request.code(),
            HID_INDEX,
            index,
            data,
            self.timeout,
        )?;
        Ok(())
    }
}

/// First non-blank line, or None at end of input
fn read_line<B: BufRead>(input: &mut B) -> Result<Option<String>> {
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            return Ok(Some(line));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::MockControl;
    use std::io::Cursor;

    fn channel(control: &MockControl) -> HidChannel<'_, MockControl> {
        HidChannel::new(control, 64, Duration::ZERO, Duration::from_millis(10))
    }

    #[test]
    fn test_blank_lines_before_descriptor() {
        let mut input = Cursor::new("\n  \nBQE=\n");
        assert_eq!(read_line(&mut input).unwrap().as_deref(), Some("BQE=\n"));
        assert_eq!(read_line(&mut input).unwrap(), None);
    }

    #[test]
    fn test_empty_input_sends_nothing() {
        let control = MockControl::new();
        let outcome = channel(&control).run(Cursor::new("")).unwrap();
        assert_eq!(outcome, HidOutcome::NoDescriptor);
        assert!(control.calls().is_empty());
    }

    #[test]
    fn test_malformed_descriptor_sends_nothing() {
        let control = MockControl::new();
        let outcome = channel(&control).run(Cursor::new("not base64!\n")).unwrap();
        assert!(matches!(
            outcome,
            HidOutcome::DescriptorRejected(ProtocolError::InvalidBase64(_))
        ));
        assert!(control.calls().is_empty());
    }

    #[test]
    fn test_registration_failure_unregisters() {
        let control = MockControl::new();
        control.fail_request(AoaRequest::SetHidReportDesc.code(), rusb::Error::Io);

        let err = channel(&control).run(Cursor::new("BQEJAg==\n")).unwrap_err();
        assert!(matches!(
            err,
            Error::Control {
                step: "set-hid-report-desc",
                ..
            }
        ));
        assert_eq!(control.requests(), vec![54, 56, 55]);
    }
}
