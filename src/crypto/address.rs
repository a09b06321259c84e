//! Recipient address validation.
//!
//! This is a syntactic gate run before any network call: a transfer to an
//! address that fails here is rejected locally without touching an RPC node.
//! Bitcoin additionally goes through full checksum decoding, since the regex
//! alone cannot catch a corrupted bech32 payload.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::domain::Network;
use crate::core::errors::WalletError;

static BTC_LEGACY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[13][1-9A-HJ-NP-Za-km-z]{24,33}$").unwrap()
});
static BTC_BECH32_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^bc1[02-9ac-hj-np-z]{39,59}$").unwrap()
});
static ETH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap());
static ALGO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z2-7]{58}$").unwrap());
static SOL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").unwrap()
});

pub struct AddressValidator;

impl AddressValidator {
    /// True when `address` is well-formed for `network`. Leading and
    /// trailing whitespace is tolerated; anything else is not.
    pub fn is_valid(network: Network, address: &str) -> bool {
        let address = address.trim();
        if address.is_empty() {
            return false;
        }
        match network {
            Network::Bitcoin => Self::is_valid_bitcoin(address),
            Network::Ethereum => ETH_RE.is_match(address),
            Network::Algorand => {
                ALGO_RE.is_match(address)
                    && crate::blockchain::algorand::decode_address(address).is_ok()
            }
            Network::Solana => {
                SOL_RE.is_match(address)
                    && bs58::decode(address).into_vec().map(|b| b.len() == 32).unwrap_or(false)
            }
        }
    }

    /// [`is_valid`](Self::is_valid) with an error carrying the offending
    /// input, for send paths that must fail loudly.
    pub fn require_valid(network: Network, address: &str) -> Result<(), WalletError> {
        if Self::is_valid(network, address) {
            Ok(())
        } else {
            Err(WalletError::InvalidAddress(format!(
                "not a valid {network} address: {}",
                address.trim()
            )))
        }
    }

    fn is_valid_bitcoin(address: &str) -> bool {
        if !BTC_LEGACY_RE.is_match(address) && !BTC_BECH32_RE.is_match(address) {
            return false;
        }
        bitcoin::Address::from_str(address)
            .map(|a| a.require_network(bitcoin::Network::Bitcoin).is_ok())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_good_addresses() {
        assert!(AddressValidator::is_valid(
            Network::Bitcoin,
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
        ));
        assert!(AddressValidator::is_valid(
            Network::Bitcoin,
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"
        ));
        assert!(AddressValidator::is_valid(
            Network::Ethereum,
            "0x9858EfFD232B4033E47d90003D41EC34EcaEda94"
        ));
        assert!(AddressValidator::is_valid(
            Network::Algorand,
            "7ZUECA7HFLZTXENRV24SHLU4AVPUTMTTDUFUBNBD64C73F3UHRTHAIOF6Q"
        ));
        assert!(AddressValidator::is_valid(
            Network::Solana,
            "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T"
        ));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert!(AddressValidator::is_valid(
            Network::Ethereum,
            "  0x9858EfFD232B4033E47d90003D41EC34EcaEda94\n"
        ));
    }

    #[test]
    fn rejects_empty_and_cross_network() {
        assert!(!AddressValidator::is_valid(Network::Bitcoin, ""));
        assert!(!AddressValidator::is_valid(Network::Bitcoin, "   "));
        // an ETH address is not a BTC address and vice versa
        assert!(!AddressValidator::is_valid(
            Network::Bitcoin,
            "0x9858EfFD232B4033E47d90003D41EC34EcaEda94"
        ));
        assert!(!AddressValidator::is_valid(
            Network::Ethereum,
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
        ));
    }

    #[test]
    fn rejects_corrupted_payloads() {
        // flip one bech32 character: regex still matches, checksum does not
        assert!(!AddressValidator::is_valid(
            Network::Bitcoin,
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyv"
        ));
        // wrong length hex
        assert!(!AddressValidator::is_valid(
            Network::Ethereum,
            "0x9858EfFD232B4033E47d90003D41EC34EcaEda9"
        ));
        // Algorand checksum break: swap the final two characters
        assert!(!AddressValidator::is_valid(
            Network::Algorand,
            "7ZUECA7HFLZTXENRV24SHLU4AVPUTMTTDUFUBNBD64C73F3UHRTHAIOFQ6"
        ));
        // 31-byte bs58 payload
        assert!(!AddressValidator::is_valid(
            Network::Solana,
            "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4"
        ));
    }

    #[test]
    fn rejects_length_off_by_one() {
        // one character appended to a canonical address
        assert!(!AddressValidator::is_valid(
            Network::Bitcoin,
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyuq"
        ));
        assert!(!AddressValidator::is_valid(
            Network::Ethereum,
            "0x9858EfFD232B4033E47d90003D41EC34EcaEda94a"
        ));
        assert!(!AddressValidator::is_valid(
            Network::Algorand,
            "7ZUECA7HFLZTXENRV24SHLU4AVPUTMTTDUFUBNBD64C73F3UHRTHAIOF6QA"
        ));
        assert!(!AddressValidator::is_valid(
            Network::Solana,
            "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4Ta"
        ));
        // one character removed
        assert!(!AddressValidator::is_valid(
            Network::Bitcoin,
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fy"
        ));
        assert!(!AddressValidator::is_valid(
            Network::Algorand,
            "7ZUECA7HFLZTXENRV24SHLU4AVPUTMTTDUFUBNBD64C73F3UHRTHAIOF6"
        ));
    }

    #[test]
    fn require_valid_reports_trimmed_input() {
        let err = AddressValidator::require_valid(Network::Ethereum, " nope ").unwrap_err();
        match err {
            WalletError::InvalidAddress(msg) => {
                assert!(msg.contains("nope"));
                assert!(!msg.contains(" nope "));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
