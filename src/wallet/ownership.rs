//! Wallet ownership verification.

use alloy::primitives::{Address, Signature};

/// Check that `signature_hex` is an EIP-191 personal signature of `message`
/// by `address`.
///
/// Malformed signatures verify as `false`. Addresses compare as 20-byte
/// values, so checksum casing does not matter.
pub fn verify_signature(address: Address, signature_hex: &str, message: &str) -> bool {
    let hex_str = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
    let bytes = match alloy::hex::decode(hex_str) {
        Ok(b) => b,
        Err(_) => return false,
    };

    let signature = match Signature::try_from(bytes.as_slice()) {
        Ok(s) => s,
        Err(_) => return false,
    };

    match signature.recover_address_from_msg(message.as_bytes()) {
        Ok(recovered) => recovered == address,
        Err(e) => {
            tracing::debug!(error = %e, "Signature recovery failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;

    const MESSAGE: &str = "Sign to verify wallet ownership";

    #[test]
    fn test_valid_signature() {
        let signer = PrivateKeySigner::random();
        let sig = signer.sign_message_sync(MESSAGE.as_bytes()).unwrap();
        let hex = format!("0x{}", alloy::hex::encode(sig.as_bytes()));
        assert!(verify_signature(signer.address(), &hex, MESSAGE));
        // Accepts the unprefixed form too.
        assert!(verify_signature(signer.address(), &hex[2..], MESSAGE));
    }

    #[test]
    fn test_wrong_address_or_message() {
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();
        let sig = signer.sign_message_sync(MESSAGE.as_bytes()).unwrap();
        let hex = alloy::hex::encode(sig.as_bytes());
        assert!(!verify_signature(other.address(), &hex, MESSAGE));
        assert!(!verify_signature(signer.address(), &hex, "another message"));
    }

    #[test]
    fn test_malformed_signature() {
        let signer = PrivateKeySigner::random();
        assert!(!verify_signature(signer.address(), "0xzz", MESSAGE));
        assert!(!verify_signature(signer.address(), "0x1234", MESSAGE));
    }
}
