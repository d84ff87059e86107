//! AOA vendor requests and accessory-mode identifiers

use std::fmt;

/// Google's vendor id, used by every device in accessory mode
pub const ACCESSORY_VENDOR_ID: u16 = 0x18d1;

/// Product ids a device enumerates with once in accessory mode
pub const ACCESSORY_PRODUCT_IDS: [u16; 6] = [0x2d00, 0x2d01, 0x2d02, 0x2d03, 0x2d04, 0x2d05];

/// bmRequestType for vendor requests to the device, device-to-host
pub const REQUEST_TYPE_VENDOR_IN: u8 = 0xc0;

/// bmRequestType for vendor requests to the device, host-to-device
pub const REQUEST_TYPE_VENDOR_OUT: u8 = 0x40;

/// wValue for set-audio-mode selecting 2-channel 16-bit PCM
pub const AUDIO_MODE_ENABLED: u16 = 1;

/// AOA vendor request codes (bRequest)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AoaRequest {
    GetProtocol = 51,
    SendString = 52,
    Start = 53,
    RegisterHid = 54,
    UnregisterHid = 55,
    SetHidReportDesc = 56,
    SendHidEvent = 57,
    SetAudioMode = 58,
}

impl AoaRequest {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AoaRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GetProtocol => "get-protocol",
            Self::SendString => "send-string",
            Self::Start => "start",
            Self::RegisterHid => "register-hid",
            Self::UnregisterHid => "unregister-hid",
            Self::SetHidReportDesc => "set-hid-report-desc",
            Self::SendHidEvent => "send-hid-event",
            Self::SetAudioMode => "set-audio-mode",
        };
        f.write_str(name)
    }
}

/// Returns true iff the ids identify a device already in accessory mode
pub fn is_accessory_mode(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == ACCESSORY_VENDOR_ID && ACCESSORY_PRODUCT_IDS.contains(&product_id)
}

/// Interface combination an accessory-mode device exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessoryProduct {
    Accessory,
    AccessoryAdb,
    Audio,
    AudioAdb,
    AccessoryAudio,
    AccessoryAudioAdb,
}

impl AccessoryProduct {
    pub fn from_ids(vendor_id: u16, product_id: u16) -> Option<Self> {
        if vendor_id != ACCESSORY_VENDOR_ID {
            return None;
        }
        match product_id {
            0x2d00 => Some(Self::Accessory),
            0x2d01 => Some(Self::AccessoryAdb),
            0x2d02 => Some(Self::Audio),
            0x2d03 => Some(Self::AudioAdb),
            0x2d04 => Some(Self::AccessoryAudio),
            0x2d05 => Some(Self::AccessoryAudioAdb),
            _ => None,
        }
    }

    /// Whether the bulk accessory interface is present
    pub fn has_accessory_interface(&self) -> bool {
        !matches!(self, Self::Audio | Self::AudioAdb)
    }
}

impl fmt::Display for AccessoryProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accessory => "accessory",
            Self::AccessoryAdb => "accessory + adb",
            Self::Audio => "audio",
            Self::AudioAdb => "audio + adb",
            Self::AccessoryAudio => "accessory + audio",
            Self::AccessoryAudioAdb => "accessory + audio + adb",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessory_mode_ids() {
        for pid in 0x2d00..=0x2d05 {
            assert!(is_accessory_mode(ACCESSORY_VENDOR_ID, pid));
        }
    }

    #[test]
    fn test_adjacent_ids_rejected() {
        assert!(!is_accessory_mode(ACCESSORY_VENDOR_ID, 0x2cff));
        assert!(!is_accessory_mode(ACCESSORY_VENDOR_ID, 0x2d06));
        assert!(!is_accessory_mode(0x18d0, 0x2d00));
        assert!(!is_accessory_mode(0x18d2, 0x2d01));
    }

    #[test]
    fn test_product_variants_agree_with_predicate() {
        for pid in 0x2c00..=0x2e00u16 {
            assert_eq!(
                AccessoryProduct::from_ids(ACCESSORY_VENDOR_ID, pid).is_some(),
                is_accessory_mode(ACCESSORY_VENDOR_ID, pid)
            );
        }
        assert_eq!(AccessoryProduct::from_ids(0x04e8, 0x2d00), None);
    }

    #[test]
    fn test_audio_only_variants() {
        assert!(!AccessoryProduct::Audio.has_accessory_interface());
        assert!(!AccessoryProduct::AudioAdb.has_accessory_interface());
        assert!(AccessoryProduct::AccessoryAudioAdb.has_accessory_interface());
    }

    #[test]
    fn test_request_codes() {
        assert_eq!(AoaRequest::GetProtocol.code(), 51);
        assert_eq!(AoaRequest::SetAudioMode.code(), 58);
        assert_eq!(AoaRequest::SendHidEvent.to_string(), "send-hid-event");
    }
}
