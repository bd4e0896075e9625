//! Scenario 3: MS-SMB2 3.0 signing key derivation reference vector.

use dittofs_core::smb::{Dialect, SessionCryptoState};

fn from_hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

#[test]
fn smb30_signing_key_matches_reference_vector() {
    let session_key = from_hex("7CD451825D0450D235424E44BA6E78CC");
    let expected = from_hex("0B7E9C5CAC36C0F6EA9AB275298CEDCE");

    let state = SessionCryptoState::derive_all_keys(Dialect::Smb300, &session_key, 0, None, false, true, true);

    assert_eq!(state.signing_key, expected);
}
