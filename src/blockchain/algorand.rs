//! Algorand adapter over algod's REST API.
//!
//! Transactions are hand-encoded in Algorand's canonical msgpack form:
//! string keys in byte order, zero and empty fields omitted. The signature
//! covers the domain-separated bytes `"TX" || msgpack(txn)`. Addresses are
//! RFC 4648 base32 (no padding) over `pubkey || sha512_256(pubkey)[28..32]`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signer as _, SigningKey as EdSigningKey};
use serde::Deserialize;
use sha2::{Digest, Sha512_256};
use tracing::{info, instrument};

use crate::blockchain::traits::{ChainAdapter, SendOptions, TransactionInfo};
use crate::core::config::AlgorandConfig;
use crate::core::domain::Network;
use crate::core::errors::WalletError;
use crate::crypto::derivation::KeyDerivationEngine;
use crate::crypto::mnemonic::Seed;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const CHECKSUM_LEN: usize = 4;

/// Base32-encode without padding.
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer = 0u64;
    let mut bits = 0u32;
    for &byte in data {
        buffer = (buffer << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn base32_decode(encoded: &str) -> Result<Vec<u8>, WalletError> {
    let mut out = Vec::with_capacity(encoded.len() * 5 / 8);
    let mut buffer = 0u64;
    let mut bits = 0u32;
    for ch in encoded.bytes() {
        let value = BASE32_ALPHABET
            .iter()
            .position(|&a| a == ch)
            .ok_or_else(|| WalletError::InvalidAddress(format!("algorand: bad base32 byte {ch:#x}")))?;
        buffer = (buffer << 5) | value as u64;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }
    Ok(out)
}

/// Public key to the 58-character address form.
pub fn encode_address(pubkey: &[u8; 32]) -> String {
    let digest = Sha512_256::digest(pubkey);
    let mut payload = [0u8; 32 + CHECKSUM_LEN];
    payload[..32].copy_from_slice(pubkey);
    payload[32..].copy_from_slice(&digest[32 - CHECKSUM_LEN..]);
    base32_encode(&payload)
}

/// Address back to the public key, verifying length and checksum.
pub fn decode_address(address: &str) -> Result<[u8; 32], WalletError> {
    let payload = base32_decode(address.trim())?;
    if payload.len() != 32 + CHECKSUM_LEN {
        return Err(WalletError::InvalidAddress(format!(
            "algorand: decoded to {} bytes",
            payload.len()
        )));
    }
    let mut pubkey = [0u8; 32];
    pubkey.copy_from_slice(&payload[..32]);
    let digest = Sha512_256::digest(pubkey);
    if payload[32..] != digest[32 - CHECKSUM_LEN..] {
        return Err(WalletError::InvalidAddress("algorand: checksum mismatch".to_string()));
    }
    Ok(pubkey)
}

/// Minimal canonical msgpack writer. Only the encodings Algorand payment
/// transactions need.
struct MsgpackWriter {
    out: Vec<u8>,
}

impl MsgpackWriter {
    fn new() -> Self {
        Self { out: Vec::new() }
    }

    fn map_header(&mut self, len: usize) {
        debug_assert!(len < 16);
        self.out.push(0x80 | len as u8);
    }

    fn str(&mut self, s: &str) {
        let bytes = s.as_bytes();
        debug_assert!(bytes.len() < 32);
        self.out.push(0xa0 | bytes.len() as u8);
        self.out.extend_from_slice(bytes);
    }

    fn bin(&mut self, data: &[u8]) {
        debug_assert!(data.len() < 256);
        self.out.push(0xc4);
        self.out.push(data.len() as u8);
        self.out.extend_from_slice(data);
    }

    fn uint(&mut self, value: u64) {
        if value < 0x80 {
            self.out.push(value as u8);
        } else if value <= u64::from(u8::MAX) {
            self.out.push(0xcc);
            self.out.push(value as u8);
        } else if value <= u64::from(u16::MAX) {
            self.out.push(0xcd);
            self.out.extend_from_slice(&(value as u16).to_be_bytes());
        } else if value <= u64::from(u32::MAX) {
            self.out.push(0xce);
            self.out.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.out.push(0xcf);
            self.out.extend_from_slice(&value.to_be_bytes());
        }
    }
}

struct PaymentTxn {
    amount: u64,
    fee: u64,
    first_valid: u64,
    genesis_id: String,
    genesis_hash: [u8; 32],
    last_valid: u64,
    note: Option<Vec<u8>>,
    receiver: [u8; 32],
    sender: [u8; 32],
}

impl PaymentTxn {
    /// Canonical encoding: keys in byte order, zero-value fields omitted.
    fn encode(&self) -> Vec<u8> {
        let mut fields = 7usize; // fee, fv, gh, lv, rcv, snd, type
        if self.amount > 0 {
            fields += 1;
        }
        if !self.genesis_id.is_empty() {
            fields += 1;
        }
        if self.note.as_ref().map(|n| !n.is_empty()).unwrap_or(false) {
            fields += 1;
        }

        let mut w = MsgpackWriter::new();
        w.map_header(fields);
        if self.amount > 0 {
            w.str("amt");
            w.uint(self.amount);
        }
        w.str("fee");
        w.uint(self.fee);
        w.str("fv");
        w.uint(self.first_valid);
        if !self.genesis_id.is_empty() {
            w.str("gen");
            w.str(&self.genesis_id);
        }
        w.str("gh");
        w.bin(&self.genesis_hash);
        w.str("lv");
        w.uint(self.last_valid);
        if let Some(note) = self.note.as_ref().filter(|n| !n.is_empty()) {
            w.str("note");
            w.bin(note);
        }
        w.str("rcv");
        w.bin(&self.receiver);
        w.str("snd");
        w.bin(&self.sender);
        w.str("type");
        w.str("pay");
        w.out
    }

    /// `{"sig": ..., "txn": ...}` with the signature over `"TX" || txn`.
    fn sign(self, key: &EdSigningKey) -> Vec<u8> {
        let txn_bytes = self.encode();
        let mut domain_separated = Vec::with_capacity(2 + txn_bytes.len());
        domain_separated.extend_from_slice(b"TX");
        domain_separated.extend_from_slice(&txn_bytes);
        let signature = key.sign(&domain_separated);

        let mut w = MsgpackWriter::new();
        w.map_header(2);
        w.str("sig");
        w.bin(&signature.to_bytes());
        w.str("txn");
        w.out.extend_from_slice(&txn_bytes);
        w.out
    }
}

#[derive(Debug, Deserialize)]
struct SuggestedParams {
    #[serde(rename = "genesis-id")]
    genesis_id: String,
    #[serde(rename = "genesis-hash")]
    genesis_hash: String,
    #[serde(rename = "last-round")]
    last_round: u64,
    #[serde(rename = "min-fee")]
    min_fee: u64,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Debug, Deserialize)]
struct IndexerResponse {
    transactions: Vec<IndexerTx>,
}

#[derive(Debug, Deserialize)]
struct IndexerTx {
    id: String,
    #[serde(rename = "payment-transaction")]
    payment: Option<IndexerPayment>,
    #[serde(rename = "round-time")]
    round_time: Option<u64>,
    #[serde(rename = "confirmed-round")]
    confirmed_round: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct IndexerPayment {
    amount: u64,
}

pub struct AlgorandAdapter {
    config: AlgorandConfig,
    client: reqwest::Client,
}

impl AlgorandAdapter {
    pub fn new(config: AlgorandConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn algod_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.algod_url.trim_end_matches('/'))
    }

    async fn suggested_params(&self) -> Result<SuggestedParams, WalletError> {
        self.client
            .get(self.algod_url("/v2/transactions/params"))
            .send()
            .await
            .map_err(|e| WalletError::from_http("algod params", e))?
            .error_for_status()
            .map_err(|e| WalletError::from_http("algod params", e))?
            .json()
            .await
            .map_err(|e| WalletError::from_http("algod params decode", e))
    }

    async fn account_info(&self, address: &str) -> Result<AccountInfo, WalletError> {
        self.client
            .get(self.algod_url(&format!("/v2/accounts/{address}")))
            .send()
            .await
            .map_err(|e| WalletError::from_http("algod account", e))?
            .error_for_status()
            .map_err(|e| WalletError::from_http("algod account", e))?
            .json()
            .await
            .map_err(|e| WalletError::from_http("algod account decode", e))
    }
}

#[async_trait]
impl ChainAdapter for AlgorandAdapter {
    fn network(&self) -> Network {
        Network::Algorand
    }

    async fn get_balance(&self, address: &str) -> Result<u128, WalletError> {
        decode_address(address)?;
        Ok(self.account_info(address).await?.amount as u128)
    }

    async fn get_recent_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<TransactionInfo>, WalletError> {
        let Some(indexer) = &self.config.indexer_url else {
            return Ok(Vec::new());
        };
        let url = format!(
            "{}/v2/accounts/{address}/transactions?limit=20",
            indexer.trim_end_matches('/')
        );
        let response: IndexerResponse = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WalletError::from_http("indexer transactions", e))?
            .error_for_status()
            .map_err(|e| WalletError::from_http("indexer transactions", e))?
            .json()
            .await
            .map_err(|e| WalletError::from_http("indexer decode", e))?;

        Ok(response
            .transactions
            .into_iter()
            .map(|tx| TransactionInfo {
                txid: tx.id,
                amount: tx.payment.map(|p| p.amount as u128),
                timestamp: tx.round_time,
                confirmed: tx.confirmed_round.is_some(),
            })
            .collect())
    }

    #[instrument(skip(self, seed, options), fields(network = "algorand"))]
    async fn send(
        &self,
        seed: &Seed,
        to: &str,
        amount: u128,
        options: &SendOptions,
    ) -> Result<String, WalletError> {
        let receiver = decode_address(to)?;
        let amount: u64 = amount
            .try_into()
            .map_err(|_| WalletError::InsufficientFunds("amount exceeds microalgo range".to_string()))?;

        let key = KeyDerivationEngine::derive_private_key(seed, Network::Algorand)?;
        let signing = key.with_secret(|bytes| EdSigningKey::from_bytes(bytes));
        let sender = signing.verifying_key().to_bytes();
        let sender_address = encode_address(&sender);

        let params = self.suggested_params().await?;
        let fee = params.min_fee;

        let balance = self.account_info(&sender_address).await?.amount;
        let needed = amount
            .checked_add(fee)
            .ok_or_else(|| WalletError::InsufficientFunds("amount overflow".to_string()))?;
        if balance < needed {
            return Err(WalletError::InsufficientFunds(format!(
                "need {needed} microalgo, have {balance} microalgo"
            )));
        }

        let genesis_hash: [u8; 32] = BASE64
            .decode(&params.genesis_hash)
            .map_err(|e| WalletError::NetworkUnavailable(format!("algod genesis hash: {e}")))?
            .try_into()
            .map_err(|_| WalletError::NetworkUnavailable("algod genesis hash length".to_string()))?;

        let txn = PaymentTxn {
            amount,
            fee,
            first_valid: params.last_round,
            genesis_id: params.genesis_id,
            genesis_hash,
            last_valid: params.last_round + self.config.validity_window,
            note: options.note.clone(),
            receiver,
            sender,
        };
        let signed = txn.sign(&signing);

        let response = self
            .client
            .post(self.algod_url("/v2/transactions"))
            .header("Content-Type", "application/x-binary")
            .body(signed)
            .send()
            .await
            .map_err(|e| WalletError::from_http("algod submit", e))?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(WalletError::BroadcastFailed(format!("algod rejected txn: {detail}")));
        }
        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| WalletError::from_http("algod submit decode", e))?;
        info!(txid = %submitted.tx_id, amount_microalgo = amount, "algorand transfer broadcast");
        Ok(submitted.tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base32_roundtrip() {
        let vectors: [&[u8]; 7] = [b"", b"f", b"fo", b"foo", b"foob", b"fooba", b"foobar"];
        for data in vectors {
            assert_eq!(base32_decode(&base32_encode(data)).unwrap(), data);
        }
        // RFC 4648 vector, padding stripped
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
    }

    #[test]
    fn address_roundtrip_and_checksum() {
        let pubkey = [7u8; 32];
        let address = encode_address(&pubkey);
        assert_eq!(address.len(), 58);
        assert_eq!(decode_address(&address).unwrap(), pubkey);

        // corrupt one checksum character
        let mut corrupted: Vec<char> = address.chars().collect();
        let last = corrupted[57];
        corrupted[57] = if last == 'A' { 'B' } else { 'A' };
        let corrupted: String = corrupted.into_iter().collect();
        assert!(matches!(
            decode_address(&corrupted).unwrap_err(),
            WalletError::InvalidAddress(_)
        ));
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(decode_address("MZXW6YTBOI").is_err());
    }

    fn sample_txn(amount: u64, note: Option<Vec<u8>>) -> PaymentTxn {
        PaymentTxn {
            amount,
            fee: 1_000,
            first_valid: 40_000_000,
            genesis_id: "mainnet-v1.0".to_string(),
            genesis_hash: [3u8; 32],
            last_valid: 40_001_000,
            note,
            receiver: [1u8; 32],
            sender: [2u8; 32],
        }
    }

    #[test]
    fn canonical_encoding_sorts_keys_and_omits_zero_fields() {
        let bytes = sample_txn(5_000, None).encode();
        // 9 fields: amt fee fv gen gh lv rcv snd type
        assert_eq!(bytes[0], 0x80 | 9);
        let positions: Vec<usize> = ["amt", "fee", "fv", "gen", "gh", "lv", "rcv", "snd", "type"]
            .iter()
            .map(|k| {
                bytes
                    .windows(k.len())
                    .position(|w| w == k.as_bytes())
                    .unwrap_or_else(|| panic!("key {k} missing"))
            })
            .collect();
        assert!(positions.windows(2).all(|p| p[0] < p[1]), "keys out of order");

        // zero amount drops the amt field entirely
        let zero = sample_txn(0, None).encode();
        assert_eq!(zero[0], 0x80 | 8);
        assert!(zero.windows(3).all(|w| w != b"amt"));
    }

    #[test]
    fn note_is_included_when_present() {
        let bytes = sample_txn(1, Some(b"invoice 42".to_vec())).encode();
        assert_eq!(bytes[0], 0x80 | 10);
        assert!(bytes.windows(10).any(|w| w == b"invoice 42"));
    }

    #[test]
    fn signed_envelope_is_sig_then_txn() {
        let key = EdSigningKey::from_bytes(&[9u8; 32]);
        let bytes = sample_txn(5_000, None).sign(&key);
        assert_eq!(bytes[0], 0x80 | 2);
        // "sig" fixstr then bin8 of 64 bytes
        assert_eq!(&bytes[1..5], &[0xa3, b's', b'i', b'g']);
        assert_eq!(bytes[5], 0xc4);
        assert_eq!(bytes[6], 64);
        assert_eq!(&bytes[71..75], &[0xa3, b't', b'x', b'n']);
    }

    #[test]
    fn signature_covers_domain_separated_bytes() {
        use ed25519_dalek::Verifier;
        let key = EdSigningKey::from_bytes(&[9u8; 32]);
        let txn = sample_txn(5_000, None);
        let txn_bytes = txn.encode();
        let signed = sample_txn(5_000, None).sign(&key);

        let sig_bytes: [u8; 64] = signed[7..71].try_into().unwrap();
        let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        let mut message = b"TX".to_vec();
        message.extend_from_slice(&txn_bytes);
        assert!(key.verifying_key().verify(&message, &signature).is_ok());
    }

    #[test]
    fn uint_width_selection() {
        let mut w = MsgpackWriter::new();
        w.uint(5);
        w.uint(200);
        w.uint(40_000);
        w.uint(70_000);
        w.uint(5_000_000_000);
        assert_eq!(w.out[0], 5);
        assert_eq!(w.out[1], 0xcc);
        assert_eq!(w.out[3], 0xcd);
        assert_eq!(w.out[6], 0xce);
        assert_eq!(w.out[11], 0xcf);
    }
}
