//! SS58 address handling
//!
//! Origins come off the wire in whatever SS58 format the submitting tool
//! used; balances are keyed by the chain's canonical form, so every address
//! is re-encoded with the configured network prefix before use.

use crate::{Error, Result};

const SS58_CHECKSUM_PREAMBLE: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;
const PUBKEY_LEN: usize = 32;

/// Decode an SS58 address into its network prefix and 32-byte account id.
pub fn decode_ss58(address: &str) -> Result<(u16, [u8; PUBKEY_LEN])> {
    let data = bs58::decode(address)
        .into_vec()
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))?;

    let (prefix, prefix_len) = match data.first() {
        Some(&b @ 0..=63) => (b as u16, 1),
        Some(&b @ 64..=127) => {
            if data.len() < 2 {
                return Err(Error::InvalidAddress(address.to_string()));
            }
            let lower = (b << 2) | (data[1] >> 6);
            let upper = data[1] & 0b0011_1111;
            ((lower as u16) | ((upper as u16) << 8), 2)
        }
        _ => return Err(Error::InvalidAddress(address.to_string())),
    };

    if data.len() != prefix_len + PUBKEY_LEN + CHECKSUM_LEN {
        return Err(Error::InvalidAddress(format!(
            "{}: unexpected length {}",
            address,
            data.len()
        )));
    }

    let body_end = prefix_len + PUBKEY_LEN;
    let expected = ss58_checksum(&data[..body_end]);
    if data[body_end..] != expected[..CHECKSUM_LEN] {
        return Err(Error::InvalidAddress(format!("{}: bad checksum", address)));
    }

    let mut pubkey = [0u8; PUBKEY_LEN];
    pubkey.copy_from_slice(&data[prefix_len..body_end]);
    Ok((prefix, pubkey))
}

/// Encode a 32-byte account id under the given network prefix.
pub fn encode_ss58(prefix: u16, pubkey: &[u8; PUBKEY_LEN]) -> String {
    let mut data = Vec::with_capacity(2 + PUBKEY_LEN + CHECKSUM_LEN);
    if prefix < 64 {
        data.push(prefix as u8);
    } else {
        // Two-byte form: 14-bit ident packed per the SS58 registry layout.
        let ident = prefix & 0b0011_1111_1111_1111;
        data.push(((ident & 0b1111_1100) >> 2) as u8 | 0b0100_0000);
        data.push((ident >> 8) as u8 | ((ident & 0b0000_0011) << 6) as u8);
    }
    data.extend_from_slice(pubkey);
    let checksum = ss58_checksum(&data);
    data.extend_from_slice(&checksum[..CHECKSUM_LEN]);
    bs58::encode(data).into_string()
}

/// Re-encode an address with the chain's canonical network prefix.
pub fn canonicalize_address(address: &str, prefix: u16) -> Result<String> {
    let (_, pubkey) = decode_ss58(address)?;
    Ok(encode_ss58(prefix, &pubkey))
}

fn ss58_checksum(data: &[u8]) -> [u8; 64] {
    let mut state = blake2b_simd::State::new();
    state.update(SS58_CHECKSUM_PREAMBLE);
    state.update(data);
    *state.finalize().as_array()
}
