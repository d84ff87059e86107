//! Accessory identification strings

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Longest string a send-string request carries, excluding the terminator
pub const MAX_IDENTITY_FIELD_LEN: usize = 255;

/// String index (wIndex) of each identification field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum IdentityField {
    Manufacturer = 0,
    Model = 1,
    Description = 2,
    Version = 3,
    Url = 4,
    Serial = 5,
}

impl IdentityField {
    /// Fields in the order they are sent
    pub const ALL: [IdentityField; 6] = [
        Self::Manufacturer,
        Self::Model,
        Self::Description,
        Self::Version,
        Self::Url,
        Self::Serial,
    ];

    pub fn index(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Manufacturer => "manufacturer",
            Self::Model => "model",
            Self::Description => "description",
            Self::Version => "version",
            Self::Url => "url",
            Self::Serial => "serial",
        }
    }
}

/// What the accessory tells the Android device about itself
///
/// Android matches manufacturer and model against the accessory filters of
/// installed apps; the remaining fields are only displayed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentificationRecord {
    pub manufacturer: String,
    pub model: String,
    pub version: String,
    pub serial: String,
    pub description: String,
    pub url: String,
}

impl Default for IdentificationRecord {
    fn default() -> Self {
        Self {
            manufacturer: "aoa-proxy".to_string(),
            model: "generic-device".to_string(),
            version: "0.1".to_string(),
            serial: String::new(),
            description: String::new(),
            url: String::new(),
        }
    }
}

impl IdentificationRecord {
    /// Identification is only sent when both manufacturer and model are set
    pub fn is_complete(&self) -> bool {
        !self.manufacturer.is_empty() && !self.model.is_empty()
    }

    pub fn field(&self, field: IdentityField) -> &str {
        match field {
            IdentityField::Manufacturer => &self.manufacturer,
            IdentityField::Model => &self.model,
            IdentityField::Description => &self.description,
            IdentityField::Version => &self.version,
            IdentityField::Url => &self.url,
            IdentityField::Serial => &self.serial,
        }
    }

    /// Fields paired with their string index, in send order
    pub fn fields(&self) -> impl Iterator<Item = (IdentityField, &str)> {
        IdentityField::ALL.into_iter().map(|f| (f, self.field(f)))
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in self.fields() {
            if value.len() > MAX_IDENTITY_FIELD_LEN {
                return Err(ProtocolError::FieldTooLong {
                    field: field.name(),
                    len: value.len(),
                    max: MAX_IDENTITY_FIELD_LEN,
                });
            }
            if value.as_bytes().contains(&0) {
                return Err(ProtocolError::FieldContainsNul {
                    field: field.name(),
                });
            }
        }
        Ok(())
    }
}

/// Encode a send-string payload: the string bytes, cut at 255, plus a NUL
pub fn encode_string(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let len = bytes.len().min(MAX_IDENTITY_FIELD_LEN);
    let mut payload = Vec::with_capacity(len + 1);
    payload.extend_from_slice(&bytes[..len]);
    payload.push(0);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_order_matches_indices() {
        let indices: Vec<u16> = IdentityField::ALL.iter().map(|f| f.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_completeness() {
        let mut record = IdentificationRecord::default();
        assert!(record.is_complete());

        record.model.clear();
        assert!(!record.is_complete());

        record.model = "m".to_string();
        record.manufacturer.clear();
        assert!(!record.is_complete());
    }

    #[test]
    fn test_encode_string_terminates() {
        assert_eq!(encode_string("abc"), b"abc\0".to_vec());
        assert_eq!(encode_string(""), vec![0]);

        let long = "x".repeat(300);
        let payload = encode_string(&long);
        assert_eq!(payload.len(), 256);
        assert_eq!(payload[255], 0);
    }

    #[test]
    fn test_validate() {
        let mut record = IdentificationRecord::default();
        assert!(record.validate().is_ok());

        record.url = "u".repeat(256);
        assert!(matches!(
            record.validate(),
            Err(ProtocolError::FieldTooLong { field: "url", .. })
        ));

        record.url = "a\0b".to_string();
        assert_eq!(
            record.validate(),
            Err(ProtocolError::FieldContainsNul { field: "url" })
        );
    }
}
