pub mod des;
mod rc4;

use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
pub use rc4::Rc4;

use crate::{Error, ErrorKind};

pub const HASH_SIZE: usize = 16;

pub fn compute_md4(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut context = Md4::new();
    let mut result = [0x00; HASH_SIZE];
    context.update(data);
    result.clone_from_slice(&context.finalize());

    result
}

pub fn compute_md5(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut context = Md5::new();
    let mut result = [0x00; HASH_SIZE];
    context.update(data);
    result.clone_from_slice(&context.finalize());

    result
}

pub fn compute_hmac_md5(key: &[u8], input: &[u8]) -> crate::Result<[u8; HASH_SIZE]> {
    let mut mac = Hmac::<Md5>::new_from_slice(key)
        .map_err(|e| Error::new(ErrorKind::Unsuccessful, format!("Failed to compute hmac md5: {}", e)))?;
    let mut result = [0x00; HASH_SIZE];
    mac.update(input);
    result.clone_from_slice(&mac.finalize().into_bytes());

    Ok(result)
}
