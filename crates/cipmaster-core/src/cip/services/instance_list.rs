use crate::DecodeError;
use alloc::vec::Vec;

/// Vendor-specific service returning the instance ids of a class as
/// little-endian u32 values. A general status of 0x06 marks a partial list.
pub const SERVICE_GET_INSTANCE_LIST: u8 = 0x4B;

pub fn decode_instance_list(data: &[u8]) -> Result<Vec<u32>, DecodeError> {
    if data.len() % 4 != 0 {
        return Err(DecodeError::InvalidLength);
    }
    Ok(data
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::decode_instance_list;
    use crate::DecodeError;

    #[test]
    fn decodes_consecutive_ids() {
        let data = [1, 0, 0, 0, 0x00, 0x01, 0, 0];
        assert_eq!(decode_instance_list(&data).unwrap(), vec![1, 256]);
    }

    #[test]
    fn trailing_partial_id_is_an_error() {
        assert_eq!(
            decode_instance_list(&[1, 0, 0]).unwrap_err(),
            DecodeError::InvalidLength
        );
    }
}
