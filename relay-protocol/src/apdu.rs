//! APDU command/response types and hex (de)serialization.
//!
//! The relay never looks inside a `Frame.payload` — these types exist for
//! the peers (Controller building commands, Cardhost parsing them and
//! encoding responses) and for tests that need to assert on decoded
//! fields rather than raw hex.

use serde::{Deserialize, Serialize};

/// An ISO 7816-4 command APDU: header + optional data + optional expected length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Option<Vec<u8>>,
    /// Expected response length. `None` = no Le byte. `Some(0)` with
    /// extended encoding means "no upper bound" (65536); in short form
    /// `Some(0)` means 256, matching ISO 7816-4.
    pub le: Option<u32>,
}

/// Wire shape of `apdu.command`'s `Frame.payload`: just the encoded bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApduCommandWire {
    pub hex: String,
}

/// Wire shape of `apdu.response`'s `Frame.payload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApduResponse {
    #[serde(rename = "dataHex")]
    pub data_hex: String,
    /// 4 hex chars — the status word, e.g. "9000".
    pub sw: String,
}

impl ApduResponse {
    pub fn ok(data: &[u8]) -> Self {
        Self {
            data_hex: to_hex(data),
            sw: "9000".to_string(),
        }
    }

    pub fn with_sw(data: &[u8], sw: u16) -> Self {
        Self {
            data_hex: to_hex(data),
            sw: format!("{sw:04X}"),
        }
    }

    pub fn data(&self) -> Result<Vec<u8>, ApduError> {
        parse_hex(&self.data_hex)
    }

    pub fn sw_bytes(&self) -> Result<[u8; 2], ApduError> {
        let bytes = parse_hex(&self.sw)?;
        bytes.try_into().map_err(|_| ApduError::BadLength)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ApduError {
    #[error("invalid hex encoding")]
    BadHex,
    #[error("command shorter than the 4-byte APDU header")]
    TooShort,
    #[error("apdu length fields don't match the byte count")]
    BadLength,
}

/// Hex-encode bytes (lowercase, no separators) — the wire form every
/// APDU payload uses.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string back to bytes. Accepts upper or lower case.
pub fn parse_hex(s: &str) -> Result<Vec<u8>, ApduError> {
    hex::decode(s).map_err(|_| ApduError::BadHex)
}

impl ApduCommand {
    /// Encode to raw bytes, choosing short or extended length encoding
    /// per ISO 7816-4: extended when Lc or Le exceeds the short-form range.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.cla, self.ins, self.p1, self.p2];
        let data = self.data.as_deref().unwrap_or(&[]);
        let lc = data.len();
        let needs_extended = lc > 255 || matches!(self.le, Some(le) if le > 256);

        if !needs_extended {
            if lc > 0 {
                out.push(lc as u8);
                out.extend_from_slice(data);
            }
            if let Some(le) = self.le {
                out.push(if le >= 256 { 0 } else { le as u8 });
            }
        } else {
            if lc > 0 {
                out.push(0x00);
                out.push((lc >> 8) as u8);
                out.push((lc & 0xFF) as u8);
                out.extend_from_slice(data);
                if let Some(le) = self.le {
                    let le_val = if le >= 65536 { 0 } else { le };
                    out.push((le_val >> 8) as u8);
                    out.push((le_val & 0xFF) as u8);
                }
            } else if let Some(le) = self.le {
                out.push(0x00);
                let le_val = if le >= 65536 { 0 } else { le };
                out.push((le_val >> 8) as u8);
                out.push((le_val & 0xFF) as u8);
            }
        }
        out
    }

    /// Parse raw bytes back into a command. Inverse of `to_bytes` for
    /// any value that function can produce.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ApduError> {
        if bytes.len() < 4 {
            return Err(ApduError::TooShort);
        }
        let (cla, ins, p1, p2) = (bytes[0], bytes[1], bytes[2], bytes[3]);
        let body = &bytes[4..];

        if body.is_empty() {
            return Ok(Self { cla, ins, p1, p2, data: None, le: None });
        }

        if body[0] != 0x00 {
            // Short form.
            if body.len() == 1 {
                // Le only.
                let le = if body[0] == 0 { 256 } else { body[0] as u32 };
                return Ok(Self { cla, ins, p1, p2, data: None, le: Some(le) });
            }
            let lc = body[0] as usize;
            if body.len() == 1 + lc {
                return Ok(Self {
                    cla,
                    ins,
                    p1,
                    p2,
                    data: Some(body[1..1 + lc].to_vec()),
                    le: None,
                });
            }
            if body.len() == 1 + lc + 1 {
                let le_byte = body[1 + lc];
                let le = if le_byte == 0 { 256 } else { le_byte as u32 };
                return Ok(Self {
                    cla,
                    ins,
                    p1,
                    p2,
                    data: Some(body[1..1 + lc].to_vec()),
                    le: Some(le),
                });
            }
            return Err(ApduError::BadLength);
        }

        // Extended form: leading 0x00 marker.
        if body.len() == 3 {
            let le_val = ((body[1] as u32) << 8) | body[2] as u32;
            let le = if le_val == 0 { 65536 } else { le_val };
            return Ok(Self { cla, ins, p1, p2, data: None, le: Some(le) });
        }
        if body.len() >= 3 {
            let lc = ((body[1] as usize) << 8) | body[2] as usize;
            if body.len() == 3 + lc {
                return Ok(Self {
                    cla,
                    ins,
                    p1,
                    p2,
                    data: Some(body[3..3 + lc].to_vec()),
                    le: None,
                });
            }
            if body.len() == 3 + lc + 2 {
                let le_val = ((body[3 + lc] as u32) << 8) | body[3 + lc + 1] as u32;
                let le = if le_val == 0 { 65536 } else { le_val };
                return Ok(Self {
                    cla,
                    ins,
                    p1,
                    p2,
                    data: Some(body[3..3 + lc].to_vec()),
                    le: Some(le),
                });
            }
        }
        Err(ApduError::BadLength)
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, ApduError> {
        let bytes = parse_hex(s)?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips() {
        let bytes = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00];
        assert_eq!(parse_hex(&to_hex(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn select_command_round_trips() {
        // SELECT applet, as used in the happy-path e2e scenario.
        let cmd = ApduCommand {
            cla: 0x00,
            ins: 0xA4,
            p1: 0x04,
            p2: 0x00,
            data: Some(parse_hex("A000000003000000").unwrap()),
            le: None,
        };
        let hex = cmd.to_hex();
        assert_eq!(hex, "00a4040008a000000003000000");
        assert_eq!(ApduCommand::from_hex(&hex).unwrap(), cmd);
    }

    #[test]
    fn extended_length_command_round_trips() {
        let data = vec![0xAB; 300];
        let cmd = ApduCommand {
            cla: 0x00,
            ins: 0xCA,
            p1: 0x9F,
            p2: 0x7F,
            data: Some(data.clone()),
            le: Some(300),
        };
        let bytes = cmd.to_bytes();
        assert_eq!(&bytes[..4], &[0x00, 0xCA, 0x9F, 0x7F]);
        assert_eq!(bytes[4], 0x00, "extended marker byte");
        let decoded = ApduCommand::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn le_only_short_form_round_trips() {
        let cmd = ApduCommand { cla: 0x00, ins: 0xC0, p1: 0x00, p2: 0x00, data: None, le: Some(256) };
        let bytes = cmd.to_bytes();
        assert_eq!(bytes, vec![0x00, 0xC0, 0x00, 0x00, 0x00]);
        assert_eq!(ApduCommand::from_bytes(&bytes).unwrap(), cmd);
    }

    #[test]
    fn apdu_response_wire_shape() {
        let resp = ApduResponse::ok(&[]);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["sw"], "9000");
        assert_eq!(json["dataHex"], "");
    }

    #[test]
    fn bad_hex_is_an_error_not_a_panic() {
        assert_eq!(parse_hex("zz"), Err(ApduError::BadHex));
        assert_eq!(ApduCommand::from_hex("00"), Err(ApduError::TooShort));
    }
}
