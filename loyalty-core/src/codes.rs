//! Redemption code derivation
//!
//! Voucher codes are derived deterministically from the voucher's key tuple
//! (customer, merchant, offer, seed) with SHA-256, so the same redemption
//! always yields the same code and distinct seeds never collide in practice.
//! The alphabet omits easily-confused characters (0/O, 1/I/L).

use crate::types::AccountId;
use sha2::{Digest, Sha256};

/// Code alphabet: uppercase letters and digits minus 0, 1, I, L, O
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Human-presentable code prefix
const CODE_PREFIX: &str = "RV";

/// Derive the redemption code for a voucher key tuple
///
/// Format: `RV-XXXX-XXXX`.
pub fn redemption_code(
    customer: &AccountId,
    merchant: &AccountId,
    offer_name: &str,
    voucher_seed: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(customer.as_bytes());
    hasher.update([0u8]);
    hasher.update(merchant.as_bytes());
    hasher.update([0u8]);
    hasher.update(offer_name.as_bytes());
    hasher.update(voucher_seed.to_be_bytes());
    let digest = hasher.finalize();

    let chars: Vec<char> = digest[..8]
        .iter()
        .map(|b| CODE_ALPHABET[(*b as usize) % CODE_ALPHABET.len()] as char)
        .collect();

    format!(
        "{}-{}-{}",
        CODE_PREFIX,
        chars[..4].iter().collect::<String>(),
        chars[4..].iter().collect::<String>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_deterministic() {
        let customer = AccountId::new("wallet-1");
        let merchant = AccountId::new("merchant-1");

        let code1 = redemption_code(&customer, &merchant, "Free Coffee", 7);
        let code2 = redemption_code(&customer, &merchant, "Free Coffee", 7);
        assert_eq!(code1, code2);
    }

    #[test]
    fn test_distinct_seeds_distinct_codes() {
        let customer = AccountId::new("wallet-1");
        let merchant = AccountId::new("merchant-1");

        let code1 = redemption_code(&customer, &merchant, "Free Coffee", 1);
        let code2 = redemption_code(&customer, &merchant, "Free Coffee", 2);
        assert_ne!(code1, code2);
    }

    #[test]
    fn test_code_format() {
        let code = redemption_code(
            &AccountId::new("wallet-1"),
            &AccountId::new("merchant-1"),
            "Free Coffee",
            7,
        );

        assert_eq!(code.len(), 12);
        assert!(code.starts_with("RV-"));
        assert_eq!(code.as_bytes()[7], b'-');
        for c in code[3..].chars().filter(|c| *c != '-') {
            assert!(CODE_ALPHABET.contains(&(c as u8)), "unexpected char {}", c);
        }
    }
}
