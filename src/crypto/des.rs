//! DES challenge-response primitives shared by the LM/NTLM matcher and the
//! secure-channel credential chain. Keys travel as 7-byte halves and are
//! expanded to the 8-byte parity form right before encryption.

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;

pub const DES_BLOCK_SIZE: usize = 8;
pub const DES_KEY_SIZE: usize = 7;
pub const CHALLENGE_RESPONSE_SIZE: usize = 24;

fn get_7_bits(input: &[u8; DES_BLOCK_SIZE], start_bit: usize) -> u8 {
    let byte_index = start_bit / 8;
    let bit_offset = start_bit % 8;

    let word = if byte_index + 1 < input.len() {
        u16::from_be_bytes([input[byte_index], input[byte_index + 1]])
    } else {
        (input[byte_index] as u16) << 8
    };

    let shift = 15 - (bit_offset + 7);

    ((word >> shift) as u8) & 0xFE
}

fn set_odd_parity(key: &mut [u8; DES_BLOCK_SIZE]) {
    for byte in key.iter_mut() {
        if byte.count_ones() % 2 == 0 {
            *byte ^= 1;
        }
    }
}

/// Expands a 7-byte key half into the 8-byte odd-parity form DES expects.
pub fn expand_des_key(key: &[u8; DES_KEY_SIZE]) -> [u8; DES_BLOCK_SIZE] {
    let mut padded = [0x00; DES_BLOCK_SIZE];
    padded[..DES_KEY_SIZE].copy_from_slice(key);

    let mut expanded = [0x00; DES_BLOCK_SIZE];
    for (i, slot) in expanded.iter_mut().enumerate() {
        *slot = get_7_bits(&padded, i * 7);
    }

    set_odd_parity(&mut expanded);

    expanded
}

/// Single-block DES encryption under a 7-byte key half.
pub fn des_encrypt(key: &[u8; DES_KEY_SIZE], data: &[u8; DES_BLOCK_SIZE]) -> [u8; DES_BLOCK_SIZE] {
    let expanded = expand_des_key(key);
    let cipher = Des::new(GenericArray::from_slice(&expanded));

    let mut block = GenericArray::clone_from_slice(data);
    cipher.encrypt_block(&mut block);

    block.into()
}

/// The DESL operation: the 16-byte hash is padded to 21 bytes, split into
/// three key halves and each half encrypts the same 8-byte challenge.
pub fn des_long(hash: &[u8; 16], challenge: &[u8; DES_BLOCK_SIZE]) -> [u8; CHALLENGE_RESPONSE_SIZE] {
    let mut padded = [0x00; DES_KEY_SIZE * 3];
    padded[..16].copy_from_slice(hash);

    let mut response = [0x00; CHALLENGE_RESPONSE_SIZE];
    for (i, chunk) in padded.chunks_exact(DES_KEY_SIZE).enumerate() {
        let key: [u8; DES_KEY_SIZE] = chunk.try_into().expect("chunks_exact yields 7-byte chunks");
        response[i * DES_BLOCK_SIZE..(i + 1) * DES_BLOCK_SIZE].copy_from_slice(&des_encrypt(&key, challenge));
    }

    response
}
