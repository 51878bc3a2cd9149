//! The DHX (Diffie-Hellman + CAST5) login handshake: `gvfsafpserver.c`'s
//! `dhx_login`, ported arithmetic-for-arithmetic.

use cast5::Cast5;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};
use num_bigint::BigUint;
use rand::RngCore;

use crate::command::{AfpCommandType, Command};
use crate::connection::PendingConnection;
use crate::error::Error;
use crate::result::AfpResultCode;

const PRIME: [u8; 16] = [
    0xBA, 0x28, 0x73, 0xDF, 0xB0, 0x60, 0x57, 0xD4, 0x3F, 0x20, 0x24, 0x74, 0x4C, 0xEE, 0xE7, 0x5B,
];
const BASE: u8 = 7;
const C2S_IV: [u8; 8] = *b"LWallace";
const S2C_IV: [u8; 8] = *b"CJalbert";

pub const UAM_NAME: &str = "DHCAST128";

type Cast5CbcEnc = Encryptor<Cast5>;
type Cast5CbcDec = Decryptor<Cast5>;

/// Serialize a `BigUint` into exactly 16 big-endian bytes, left-padding
/// with zeros (the source's `memmove`-and-zero dance after `gcry_mpi_print`
/// when the printed value is shorter than 16 bytes).
fn to_16_bytes_be(v: &BigUint) -> [u8; 16] {
    let raw = v.to_bytes_be();
    let mut out = [0u8; 16];
    let start = 16 - raw.len().min(16);
    out[start..].copy_from_slice(&raw[raw.len().saturating_sub(16)..]);
    out
}

/// Drive the full DHX login exchange over a `PendingConnection` (i.e.
/// before the multiplexer task exists — this issues its requests via
/// `send_command_sync`/`read_reply_sync`, per the bootstrap Open Question
/// resolution).
pub async fn login(
    conn: &mut PendingConnection,
    version: &str,
    username: &str,
    password: &str,
) -> Result<(), Error> {
    if password.len() > 64 {
        return Err(Error::PermissionDenied);
    }

    let prime = BigUint::from_bytes_be(&PRIME);
    let base = BigUint::from(BASE);

    let mut ra_bytes = [0u8; 32];
    loop {
        rand::thread_rng().fill_bytes(&mut ra_bytes);
        if ra_bytes.iter().any(|&b| b != 0) {
            break;
        }
    }
    // Clear bit 255 (the top bit of a 256-bit big-endian value) so ra < p/2.
    ra_bytes[0] &= 0x7F;
    let ra = BigUint::from_bytes_be(&ra_bytes);

    let ma = base.modpow(&ra, &prime);
    let ma_buf = to_16_bytes_be(&ma);

    let mut login_cmd = Command::new(AfpCommandType::Login);
    login_cmd.put_pascal(version.as_bytes());
    login_cmd.put_pascal(UAM_NAME.as_bytes());
    login_cmd.put_pascal(username.as_bytes());
    login_cmd.pad_to_even();
    login_cmd.put_bytes(&ma_buf);

    conn.send_command_sync(login_cmd).await?;
    let mut reply = conn.read_reply_sync().await?;

    if reply.result_code() != AfpResultCode::AuthContinue {
        return Err(match reply.result_code() {
            AfpResultCode::UserNotAuth => Error::PermissionDenied,
            _ => Error::LoginFailed,
        });
    }

    let id = reply.read_u16()?;
    let mb_buf = reply.read_raw(16)?;
    let nonce_ciphertext = reply.read_raw(32)?;

    let mb = BigUint::from_bytes_be(&mb_buf);
    let key = mb.modpow(&ra, &prime);
    let key_buf = to_16_bytes_be(&key);

    let mut nonce_plain = nonce_ciphertext.to_vec();
    let decryptor = Cast5CbcDec::new_from_slices(&key_buf, &S2C_IV)
        .map_err(|e| Error::malformed(format!("bad DHX key/IV: {e}")))?;
    let decrypted = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut nonce_plain)
        .map_err(|e| Error::malformed(format!("DHX nonce decrypt failed: {e}")))?;

    let nonce = BigUint::from_bytes_be(&decrypted[..16]);
    let nonce_plus_one = nonce + 1u32;
    let nonce_plus_one_buf = to_16_bytes_be(&nonce_plus_one);

    let mut answer = [0u8; 80];
    answer[..16].copy_from_slice(&nonce_plus_one_buf);
    let pw_bytes = password.as_bytes();
    answer[16..16 + pw_bytes.len()].copy_from_slice(pw_bytes);

    let encryptor = Cast5CbcEnc::new_from_slices(&key_buf, &C2S_IV)
        .map_err(|e| Error::malformed(format!("bad DHX key/IV: {e}")))?;
    let mut answer_buf = answer.to_vec();
    encryptor
        .encrypt_padded_mut::<NoPadding>(&mut answer_buf, 80)
        .map_err(|e| Error::malformed(format!("DHX answer encrypt failed: {e}")))?;

    let mut cont_cmd = Command::new(AfpCommandType::LoginCont);
    cont_cmd.put_u8(0);
    cont_cmd.put_u16(id);
    cont_cmd.put_bytes(&answer_buf);

    conn.send_command_sync(cont_cmd).await?;
    let cont_reply = conn.read_reply_sync().await?;

    match cont_reply.result_code() {
        AfpResultCode::NoError => Ok(()),
        AfpResultCode::UserNotAuth => Err(Error::PermissionDenied),
        _ => Err(Error::LoginFailed),
    }
}

/// Used only by tests: expose the DHX constants so S2-style pinned vectors
/// can be checked without re-deriving them.
#[cfg(test)]
pub(crate) fn test_constants() -> (&'static [u8; 16], u8, &'static [u8; 8], &'static [u8; 8]) {
    (&PRIME, BASE, &C2S_IV, &S2C_IV)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prime_and_ivs_match_the_protocol() {
        let (prime, base, c2s, s2c) = test_constants();
        assert_eq!(prime.len(), 16);
        assert_eq!(base, 7);
        assert_eq!(c2s, b"LWallace");
        assert_eq!(s2c, b"CJalbert");
    }

    #[test]
    fn ma_serializes_to_exactly_16_bytes() {
        let prime = BigUint::from_bytes_be(&PRIME);
        let base = BigUint::from(BASE);
        let ra = BigUint::from(12345u32);
        let ma = base.modpow(&ra, &prime);
        let buf = to_16_bytes_be(&ma);
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn encrypt_then_decrypt_round_trips_the_answer() {
        let key = [0x11u8; 16];
        let nonce_plus_one = [0x22u8; 16];
        let mut plain = [0u8; 80];
        plain[..16].copy_from_slice(&nonce_plus_one);
        plain[16..19].copy_from_slice(b"pwd");

        let mut buf = plain.to_vec();
        let enc = Cast5CbcEnc::new_from_slices(&key, &C2S_IV).unwrap();
        enc.encrypt_padded_mut::<NoPadding>(&mut buf, 80).unwrap();

        let dec = Cast5CbcDec::new_from_slices(&key, &C2S_IV).unwrap();
        let decrypted = dec.decrypt_padded_mut::<NoPadding>(&mut buf).unwrap();
        assert_eq!(decrypted, &plain[..]);
    }
}
