use byteorder::{LittleEndian, ReadBytesExt};

use crate::{Error, ErrorKind};

/// NetBIOS-style names are limited to 15 characters; the 16th byte of the
/// wire format is the name suffix.
pub const MAX_NETBIOS_NAME_LENGTH: usize = 15;

pub fn string_to_utf16(value: &str) -> Vec<u8> {
    value
        .encode_utf16()
        .flat_map(|i| i.to_le_bytes().to_vec())
        .collect::<Vec<u8>>()
}

pub fn bytes_to_utf16_string(mut value: &[u8]) -> String {
    let mut value_u16 = vec![0x00; value.len() / 2];
    value
        .read_u16_into::<LittleEndian>(value_u16.as_mut())
        .expect("read_u16_into cannot fail at this point");

    String::from_utf16_lossy(value_u16.as_ref())
}

/// Rejects empty and oversized computer/domain names. Called before any
/// network interaction so that a bad name never produces side effects.
pub fn validate_netbios_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(Error::new(ErrorKind::InvalidParameter, "empty NetBIOS name"));
    }

    if name.chars().count() > MAX_NETBIOS_NAME_LENGTH {
        return Err(Error::new(
            ErrorKind::InvalidParameter,
            format!("NetBIOS name too long: {} characters", name.chars().count()),
        ));
    }

    Ok(())
}
