//! `SmartCardPlatform`: the boundary between the relay client and a
//! physical (or mocked) card reader.

use relay_protocol::apdu::{ApduCommand, ApduResponse};

/// Capability a Cardhost uses to reach a physical smart card reader.
/// The relay core only ever talks to this trait — swapping in a real
/// PC/SC-backed implementation needs no change anywhere else.
pub trait SmartCardPlatform: Send + Sync {
    /// Human-readable identifiers of available readers/devices.
    fn enumerate(&self) -> Vec<String>;

    /// Transmit a command APDU and return the response.
    fn transmit(&self, command: &ApduCommand) -> ApduResponse;
}

/// A canned-response reader for environments with no physical hardware.
/// Recognizes a SELECT (`INS=0xA4`) and answers with a fixed FCI
/// template and `9000`; anything else gets `6D00` (instruction not
/// supported).
pub struct MockSmartCardPlatform {
    fci: Vec<u8>,
}

impl Default for MockSmartCardPlatform {
    fn default() -> Self {
        Self { fci: vec![0x6F, 0x02, 0x84, 0x00] }
    }
}

impl MockSmartCardPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SmartCardPlatform for MockSmartCardPlatform {
    fn enumerate(&self) -> Vec<String> {
        vec!["mock-reader-0".to_string()]
    }

    fn transmit(&self, command: &ApduCommand) -> ApduResponse {
        const INS_SELECT: u8 = 0xA4;
        if command.ins == INS_SELECT {
            ApduResponse::ok(&self.fci)
        } else {
            ApduResponse::with_sw(&[], 0x6D00)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_returns_fci_and_success() {
        let mock = MockSmartCardPlatform::new();
        let cmd = ApduCommand { cla: 0x00, ins: 0xA4, p1: 0x04, p2: 0x00, data: None, le: None };
        let resp = mock.transmit(&cmd);
        assert_eq!(resp.sw, "9000");
        assert!(!resp.data_hex.is_empty());
    }

    #[test]
    fn unknown_instruction_is_not_supported() {
        let mock = MockSmartCardPlatform::new();
        let cmd = ApduCommand { cla: 0x00, ins: 0xB0, p1: 0x00, p2: 0x00, data: None, le: None };
        let resp = mock.transmit(&cmd);
        assert_eq!(resp.sw, "6D00");
    }
}
