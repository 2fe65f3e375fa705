use crate::cip::message::ResponseStatus;

pub const STATUS_SUCCESS: u8 = 0x00;
pub const STATUS_CONNECTION_FAILURE: u8 = 0x01;
pub const STATUS_PATH_DESTINATION_UNKNOWN: u8 = 0x05;
pub const STATUS_PARTIAL_TRANSFER: u8 = 0x06;
pub const STATUS_SERVICE_NOT_SUPPORTED: u8 = 0x08;
pub const STATUS_ATTRIBUTE_NOT_SUPPORTED: u8 = 0x14;

/// Reduces an optional response status to its general status code.
///
/// Some adapters omit the status block entirely. That case is reported as
/// success (`0`) together with `None`, so callers can tell it apart from an
/// explicit success when logging.
pub fn status_details(status: Option<&ResponseStatus>) -> (u8, Option<&ResponseStatus>) {
    match status {
        Some(status) => (status.general, Some(status)),
        None => (STATUS_SUCCESS, None),
    }
}

pub const fn general_status_name(code: u8) -> &'static str {
    match code {
        0x00 => "success",
        0x01 => "connection failure",
        0x02 => "resource unavailable",
        0x03 => "invalid parameter value",
        0x04 => "path segment error",
        0x05 => "path destination unknown",
        0x06 => "partial transfer",
        0x08 => "service not supported",
        0x09 => "invalid attribute value",
        0x0C => "object state conflict",
        0x0E => "attribute not settable",
        0x10 => "device state conflict",
        0x13 => "not enough data",
        0x14 => "attribute not supported",
        0x15 => "too much data",
        0x16 => "object does not exist",
        0x1E => "embedded service error",
        0x20 => "invalid parameter",
        0x26 => "path size invalid",
        _ => "vendor specific or reserved",
    }
}

#[cfg(test)]
mod tests {
    use super::{general_status_name, status_details, STATUS_PARTIAL_TRANSFER};
    use crate::cip::message::ResponseStatus;
    use alloc::vec;

    #[test]
    fn missing_status_counts_as_success() {
        let (code, status) = status_details(None);
        assert_eq!(code, 0);
        assert!(status.is_none());
    }

    #[test]
    fn present_status_is_returned() {
        let status = ResponseStatus {
            general: STATUS_PARTIAL_TRANSFER,
            additional: vec![0x0100],
        };
        let (code, found) = status_details(Some(&status));
        assert_eq!(code, 6);
        assert_eq!(found, Some(&status));
        assert_eq!(general_status_name(code), "partial transfer");
    }
}
