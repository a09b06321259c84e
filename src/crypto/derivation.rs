//! Deterministic per-network key derivation.
//!
//! All four account sets come from one BIP-39 seed:
//!
//! * Bitcoin   BIP-84  `m/84'/0'/0'/0/0`   secp256k1, P2WPKH
//! * Ethereum  BIP-44  `m/44'/60'/0'/0/0`  secp256k1, keccak address
//! * Solana    SLIP-0010 `m/44'/501'/0'/0'` ed25519, hardened-only
//! * Algorand  native scheme, ed25519 from the first 32 seed bytes
//!
//! Derivation is pure: same seed in, same keys and addresses out.

use std::collections::BTreeMap;

use bitcoin::Network as BtcNetwork;
use coins_bip32::xkeys::{Parent, XPriv};
use ed25519_dalek::SigningKey as EdSigningKey;
use ethers::signers::{LocalWallet, Signer};
use ethers::utils::to_checksum;
use hmac::{Hmac, Mac};
use k256::ecdsa::SigningKey as K256SigningKey;
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::blockchain::algorand::encode_address as encode_algorand_address;
use crate::core::domain::{Network, PerNetworkAccount, PrivateKey};
use crate::core::errors::WalletError;
use crate::crypto::mnemonic::Seed;

type HmacSha512 = Hmac<Sha512>;

pub const BITCOIN_PATH: &str = "m/84'/0'/0'/0/0";
pub const ETHEREUM_PATH: &str = "m/44'/60'/0'/0/0";
pub const SOLANA_PATH: &str = "m/44'/501'/0'/0'";
pub const ALGORAND_PATH: &str = "native";

pub struct KeyDerivationEngine;

impl KeyDerivationEngine {
    /// Derive every supported network's account from one seed phrase.
    pub fn derive_all(seed: &Seed) -> Result<BTreeMap<Network, PerNetworkAccount>, WalletError> {
        let seed_bytes = seed.to_seed_bytes()?;
        let mut accounts = BTreeMap::new();
        for network in Network::ALL {
            accounts.insert(network, Self::derive_account(&seed_bytes, network)?);
        }
        Ok(accounts)
    }

    /// The spending key for a single network. Never persisted; callers hold
    /// it only for the lifetime of one signing operation.
    pub fn derive_private_key(seed: &Seed, network: Network) -> Result<PrivateKey, WalletError> {
        let seed_bytes = seed.to_seed_bytes()?;
        match network {
            Network::Bitcoin => Ok(PrivateKey::new(secp256k1_key(&seed_bytes, BITCOIN_PATH)?)),
            Network::Ethereum => Ok(PrivateKey::new(secp256k1_key(&seed_bytes, ETHEREUM_PATH)?)),
            Network::Solana => {
                let (key, _) = slip10_ed25519(&seed_bytes, SOLANA_PATH)?;
                Ok(PrivateKey::new(key))
            }
            Network::Algorand => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&seed_bytes[..32]);
                Ok(PrivateKey::new(key))
            }
        }
    }

    fn derive_account(
        seed_bytes: &[u8; 64],
        network: Network,
    ) -> Result<PerNetworkAccount, WalletError> {
        match network {
            Network::Bitcoin => {
                let key = Zeroizing::new(secp256k1_key(seed_bytes, BITCOIN_PATH)?);
                let signing = K256SigningKey::from_bytes((&*key).into())
                    .map_err(|e| WalletError::Crypto(format!("bitcoin key: {e}")))?;
                let pubkey = signing.verifying_key().to_encoded_point(true);
                let btc_pubkey = bitcoin::PublicKey::from_slice(pubkey.as_bytes())
                    .map_err(|e| WalletError::Crypto(format!("bitcoin pubkey: {e}")))?;
                let address = bitcoin::Address::p2wpkh(&btc_pubkey, BtcNetwork::Bitcoin)
                    .map_err(|e| WalletError::Crypto(format!("p2wpkh address: {e}")))?;
                Ok(PerNetworkAccount {
                    network,
                    derivation_path: BITCOIN_PATH.to_string(),
                    public_key_hex: hex::encode(pubkey.as_bytes()),
                    address: address.to_string(),
                })
            }
            Network::Ethereum => {
                let key = Zeroizing::new(secp256k1_key(seed_bytes, ETHEREUM_PATH)?);
                let wallet = LocalWallet::from_bytes(&*key)
                    .map_err(|e| WalletError::Crypto(format!("ethereum key: {e}")))?;
                let signing = K256SigningKey::from_bytes((&*key).into())
                    .map_err(|e| WalletError::Crypto(format!("ethereum pubkey: {e}")))?;
                let pubkey = signing.verifying_key().to_encoded_point(true);
                Ok(PerNetworkAccount {
                    network,
                    derivation_path: ETHEREUM_PATH.to_string(),
                    public_key_hex: hex::encode(pubkey.as_bytes()),
                    address: to_checksum(&wallet.address(), None),
                })
            }
            Network::Solana => {
                let (key, _) = slip10_ed25519(seed_bytes, SOLANA_PATH)?;
                let key = Zeroizing::new(key);
                let signing = EdSigningKey::from_bytes(&key);
                let pubkey = signing.verifying_key().to_bytes();
                Ok(PerNetworkAccount {
                    network,
                    derivation_path: SOLANA_PATH.to_string(),
                    public_key_hex: hex::encode(pubkey),
                    address: bs58::encode(pubkey).into_string(),
                })
            }
            Network::Algorand => {
                let mut key = Zeroizing::new([0u8; 32]);
                key.copy_from_slice(&seed_bytes[..32]);
                let signing = EdSigningKey::from_bytes(&key);
                let pubkey = signing.verifying_key().to_bytes();
                Ok(PerNetworkAccount {
                    network,
                    derivation_path: ALGORAND_PATH.to_string(),
                    public_key_hex: hex::encode(pubkey),
                    address: encode_algorand_address(&pubkey),
                })
            }
        }
    }
}

/// BIP-32 secp256k1 derivation along a full path string.
fn secp256k1_key(seed_bytes: &[u8; 64], path: &str) -> Result<[u8; 32], WalletError> {
    let mut xpriv = XPriv::root_from_seed(seed_bytes.as_slice(), None)
        .map_err(|e| WalletError::Crypto(format!("bip32 root: {e}")))?;
    for index in parse_path(path)? {
        xpriv = xpriv
            .derive_child(index)
            .map_err(|e| WalletError::Crypto(format!("bip32 derive {path}: {e}")))?;
    }
    let signing: &K256SigningKey = xpriv.as_ref();
    Ok(signing.to_bytes().into())
}

/// Path components as raw child indices, hardened bit applied.
fn parse_path(path: &str) -> Result<Vec<u32>, WalletError> {
    let mut components = Vec::new();
    for (i, part) in path.split('/').enumerate() {
        if i == 0 {
            if part != "m" {
                return Err(WalletError::Crypto(format!("path must start with m: {path}")));
            }
            continue;
        }
        let (digits, hardened) = match part.strip_suffix('\'') {
            Some(digits) => (digits, true),
            None => (part, false),
        };
        let index: u32 = digits
            .parse()
            .map_err(|e| WalletError::Crypto(format!("bad path component {part}: {e}")))?;
        components.push(if hardened { index | 0x8000_0000 } else { index });
    }
    Ok(components)
}

/// SLIP-0010 ed25519 derivation. Only hardened steps exist for this curve;
/// a non-hardened component in `path` is an error.
fn slip10_ed25519(
    seed_bytes: &[u8; 64],
    path: &str,
) -> Result<([u8; 32], [u8; 32]), WalletError> {
    let mut mac = HmacSha512::new_from_slice(b"ed25519 seed")
        .map_err(|e| WalletError::Crypto(format!("hmac init: {e}")))?;
    mac.update(seed_bytes);
    let digest = mac.finalize().into_bytes();

    let mut key = [0u8; 32];
    let mut chain_code = [0u8; 32];
    key.copy_from_slice(&digest[..32]);
    chain_code.copy_from_slice(&digest[32..]);

    for index in parse_path(path)? {
        if index & 0x8000_0000 == 0 {
            return Err(WalletError::Crypto(format!(
                "ed25519 derivation requires hardened steps: {path}"
            )));
        }
        let mut mac = HmacSha512::new_from_slice(&chain_code)
            .map_err(|e| WalletError::Crypto(format!("hmac init: {e}")))?;
        mac.update(&[0u8]);
        mac.update(&key);
        mac.update(&index.to_be_bytes());
        let digest = mac.finalize().into_bytes();
        key.copy_from_slice(&digest[..32]);
        chain_code.copy_from_slice(&digest[32..]);
    }

    Ok((key, chain_code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::mnemonic::SeedManager;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn derivation_is_deterministic() {
        let seed = SeedManager::import(PHRASE).unwrap();
        let a = KeyDerivationEngine::derive_all(&seed).unwrap();
        let b = KeyDerivationEngine::derive_all(&seed).unwrap();
        assert_eq!(a.len(), 4);
        for network in Network::ALL {
            assert_eq!(a[&network].address, b[&network].address);
            assert_eq!(a[&network].public_key_hex, b[&network].public_key_hex);
        }
    }

    #[test]
    fn known_vector_addresses() {
        let seed = SeedManager::import(PHRASE).unwrap();
        let accounts = KeyDerivationEngine::derive_all(&seed).unwrap();
        // BIP-84 test vector for the all-abandon phrase
        assert_eq!(
            accounts[&Network::Bitcoin].address,
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
        );
        // BIP-44 ETH account 0 for the same phrase
        assert_eq!(
            accounts[&Network::Ethereum].address,
            "0x9858EfFD232B4033E47d90003D41EC34EcaEda94"
        );
    }

    #[test]
    fn address_shapes() {
        let seed = SeedManager::generate().unwrap();
        let accounts = KeyDerivationEngine::derive_all(&seed).unwrap();
        assert!(accounts[&Network::Bitcoin].address.starts_with("bc1"));
        assert!(accounts[&Network::Ethereum].address.starts_with("0x"));
        assert_eq!(accounts[&Network::Ethereum].address.len(), 42);
        assert_eq!(accounts[&Network::Algorand].address.len(), 58);
        let sol = &accounts[&Network::Solana].address;
        assert!((32..=44).contains(&sol.len()));
    }

    #[test]
    fn different_seeds_diverge() {
        let a = KeyDerivationEngine::derive_all(&SeedManager::generate().unwrap()).unwrap();
        let b = KeyDerivationEngine::derive_all(&SeedManager::generate().unwrap()).unwrap();
        for network in Network::ALL {
            assert_ne!(a[&network].address, b[&network].address);
        }
    }

    #[test]
    fn slip10_rejects_non_hardened_components() {
        let seed = SeedManager::import(PHRASE).unwrap();
        let bytes = seed.to_seed_bytes().unwrap();
        assert!(slip10_ed25519(&bytes, "m/44'/501'/0'/0").is_err());
    }

    #[test]
    fn slip10_master_vector() {
        // SLIP-0010 ed25519 test vector 1: seed 000102030405060708090a0b0c0d0e0f,
        // chain m/0' key 68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3
        let short: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
        let mut mac = HmacSha512::new_from_slice(b"ed25519 seed").unwrap();
        mac.update(&short);
        let digest = mac.finalize().into_bytes();
        let mut key = [0u8; 32];
        let mut cc = [0u8; 32];
        key.copy_from_slice(&digest[..32]);
        cc.copy_from_slice(&digest[32..]);
        let mut mac = HmacSha512::new_from_slice(&cc).unwrap();
        mac.update(&[0u8]);
        mac.update(&key);
        mac.update(&(0u32 | 0x8000_0000).to_be_bytes());
        let digest = mac.finalize().into_bytes();
        assert_eq!(
            hex::encode(&digest[..32]),
            "68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3"
        );
    }
}
