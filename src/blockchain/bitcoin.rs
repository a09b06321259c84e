//! Bitcoin adapter over an esplora-compatible REST API.
//!
//! Spends are P2WPKH only, matching the BIP-84 derivation used for the
//! wallet's receive address. Coin selection is greedy largest-first with a
//! flat fee; sub-dust change is folded into the fee instead of creating an
//! unspendable output.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, EcdsaSighashType, Network as BtcNetwork, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::blockchain::traits::{ChainAdapter, SendOptions, TransactionInfo};
use crate::core::config::BitcoinConfig;
use crate::core::domain::Network;
use crate::core::errors::WalletError;
use crate::crypto::derivation::KeyDerivationEngine;
use crate::crypto::mnemonic::Seed;

/// Outputs below this are unspendable in practice and are folded into the
/// fee rather than created as change.
const DUST_SAT: u64 = 546;

#[derive(Debug, Deserialize)]
struct AddressStats {
    chain_stats: TxoStats,
}

#[derive(Debug, Deserialize)]
struct TxoStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct Utxo {
    txid: String,
    vout: u32,
    value: u64,
    status: UtxoStatus,
}

#[derive(Debug, Clone, Deserialize)]
struct UtxoStatus {
    confirmed: bool,
    block_time: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HistoryTx {
    txid: String,
    status: UtxoStatus,
    vout: Vec<HistoryVout>,
}

#[derive(Debug, Deserialize)]
struct HistoryVout {
    scriptpubkey_address: Option<String>,
    value: u64,
}

/// An unsigned spend. Signing consumes it, so a signed transaction can
/// never be amended afterwards.
struct DraftTransaction {
    tx: Transaction,
    inputs: Vec<Utxo>,
    our_script: ScriptBuf,
}

struct SignedTransaction {
    txid: String,
    hex: String,
}

impl DraftTransaction {
    fn sign(mut self, secret: &SecretKey) -> Result<SignedTransaction, WalletError> {
        let secp = Secp256k1::new();
        let pubkey = secret.public_key(&secp);

        let mut witnesses = Vec::with_capacity(self.inputs.len());
        {
            let mut cache = SighashCache::new(&self.tx);
            for (index, input) in self.inputs.iter().enumerate() {
                let sighash = cache
                    .p2wpkh_signature_hash(
                        index,
                        &self.our_script,
                        Amount::from_sat(input.value),
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| WalletError::Crypto(format!("sighash: {e}")))?;
                let msg = Message::from_digest(sighash.to_byte_array());
                let sig = secp.sign_ecdsa(&msg, secret);

                let mut sig_bytes = sig.serialize_der().to_vec();
                sig_bytes.push(EcdsaSighashType::All as u8);

                let mut witness = Witness::new();
                witness.push(&sig_bytes);
                witness.push(pubkey.serialize());
                witnesses.push(witness);
            }
        }
        for (input, witness) in self.tx.input.iter_mut().zip(witnesses) {
            input.witness = witness;
        }

        Ok(SignedTransaction {
            txid: self.tx.txid().to_string(),
            hex: bitcoin::consensus::encode::serialize_hex(&self.tx),
        })
    }
}

pub struct BitcoinAdapter {
    config: BitcoinConfig,
    client: reqwest::Client,
}

impl BitcoinAdapter {
    pub fn new(config: BitcoinConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.esplora_url.trim_end_matches('/'))
    }

    async fn fetch_utxos(&self, address: &str) -> Result<Vec<Utxo>, WalletError> {
        let utxos: Vec<Utxo> = self
            .client
            .get(self.url(&format!("/address/{address}/utxo")))
            .send()
            .await
            .map_err(|e| WalletError::from_http("esplora utxo", e))?
            .error_for_status()
            .map_err(|e| WalletError::from_http("esplora utxo", e))?
            .json()
            .await
            .map_err(|e| WalletError::from_http("esplora utxo decode", e))?;
        Ok(utxos.into_iter().filter(|u| u.status.confirmed).collect())
    }

    /// Largest-first selection until inputs cover `amount + fee`.
    fn select_utxos(mut utxos: Vec<Utxo>, target: u64) -> Result<(Vec<Utxo>, u64), WalletError> {
        utxos.sort_by(|a, b| b.value.cmp(&a.value));
        let mut selected = Vec::new();
        let mut total = 0u64;
        for utxo in utxos {
            total += utxo.value;
            selected.push(utxo);
            if total >= target {
                return Ok((selected, total));
            }
        }
        Err(WalletError::InsufficientFunds(format!(
            "need {target} sat, confirmed utxos total {total} sat"
        )))
    }

    fn build_draft(
        &self,
        selected: Vec<Utxo>,
        total_in: u64,
        amount: u64,
        to_script: ScriptBuf,
        our_script: ScriptBuf,
    ) -> Result<DraftTransaction, WalletError> {
        let mut inputs = Vec::with_capacity(selected.len());
        for utxo in &selected {
            let txid = Txid::from_str(&utxo.txid)
                .map_err(|e| WalletError::Internal(format!("esplora txid: {e}")))?;
            inputs.push(TxIn {
                previous_output: OutPoint { txid, vout: utxo.vout },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            });
        }

        let mut outputs = vec![TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: to_script,
        }];
        let change = total_in - amount - self.config.flat_fee_sat;
        if change >= DUST_SAT {
            outputs.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: our_script.clone(),
            });
        } else if change > 0 {
            debug!(change_sat = change, "folding sub-dust change into fee");
        }

        Ok(DraftTransaction {
            tx: Transaction {
                version: Version::TWO,
                lock_time: LockTime::ZERO,
                input: inputs,
                output: outputs,
            },
            inputs: selected,
            our_script,
        })
    }

    async fn broadcast(&self, hex: &str) -> Result<(), WalletError> {
        let response = self
            .client
            .post(self.url("/tx"))
            .body(hex.to_string())
            .send()
            .await
            .map_err(|e| WalletError::from_http("esplora broadcast", e))?;
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(WalletError::BroadcastFailed(format!("esplora rejected tx: {detail}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainAdapter for BitcoinAdapter {
    fn network(&self) -> Network {
        Network::Bitcoin
    }

    async fn get_balance(&self, address: &str) -> Result<u128, WalletError> {
        let stats: AddressStats = self
            .client
            .get(self.url(&format!("/address/{address}")))
            .send()
            .await
            .map_err(|e| WalletError::from_http("esplora address", e))?
            .error_for_status()
            .map_err(|e| WalletError::from_http("esplora address", e))?
            .json()
            .await
            .map_err(|e| WalletError::from_http("esplora address decode", e))?;
        let confirmed = stats
            .chain_stats
            .funded_txo_sum
            .saturating_sub(stats.chain_stats.spent_txo_sum);
        Ok(confirmed as u128)
    }

    async fn get_recent_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<TransactionInfo>, WalletError> {
        let txs: Vec<HistoryTx> = self
            .client
            .get(self.url(&format!("/address/{address}/txs")))
            .send()
            .await
            .map_err(|e| WalletError::from_http("esplora history", e))?
            .error_for_status()
            .map_err(|e| WalletError::from_http("esplora history", e))?
            .json()
            .await
            .map_err(|e| WalletError::from_http("esplora history decode", e))?;

        Ok(txs
            .into_iter()
            .map(|tx| {
                let received: u64 = tx
                    .vout
                    .iter()
                    .filter(|v| v.scriptpubkey_address.as_deref() == Some(address))
                    .map(|v| v.value)
                    .sum();
                TransactionInfo {
                    txid: tx.txid,
                    amount: (received > 0).then_some(received as u128),
                    timestamp: tx.status.block_time,
                    confirmed: tx.status.confirmed,
                }
            })
            .collect())
    }

    #[instrument(skip(self, seed, _options), fields(network = "bitcoin"))]
    async fn send(
        &self,
        seed: &Seed,
        to: &str,
        amount: u128,
        _options: &SendOptions,
    ) -> Result<String, WalletError> {
        let amount: u64 = amount
            .try_into()
            .map_err(|_| WalletError::InsufficientFunds("amount exceeds 21M BTC".to_string()))?;
        let to_addr = bitcoin::Address::from_str(to)
            .map_err(|e| WalletError::InvalidAddress(format!("bitcoin: {e}")))?
            .require_network(BtcNetwork::Bitcoin)
            .map_err(|e| WalletError::InvalidAddress(format!("bitcoin: {e}")))?;

        let key = KeyDerivationEngine::derive_private_key(seed, Network::Bitcoin)?;
        let secp = Secp256k1::new();
        let (secret, our_addr) = key.with_secret(|bytes| -> Result<_, WalletError> {
            let secret = SecretKey::from_slice(bytes)
                .map_err(|e| WalletError::Crypto(format!("bitcoin key: {e}")))?;
            let pubkey = bitcoin::PublicKey::new(secret.public_key(&secp));
            let addr = bitcoin::Address::p2wpkh(&pubkey, BtcNetwork::Bitcoin)
                .map_err(|e| WalletError::Crypto(format!("p2wpkh: {e}")))?;
            Ok((secret, addr))
        })?;

        let utxos = self.fetch_utxos(&our_addr.to_string()).await?;
        let target = amount
            .checked_add(self.config.flat_fee_sat)
            .ok_or_else(|| WalletError::InsufficientFunds("amount overflow".to_string()))?;
        let (selected, total_in) = Self::select_utxos(utxos, target)?;

        let draft = self.build_draft(
            selected,
            total_in,
            amount,
            to_addr.script_pubkey(),
            our_addr.script_pubkey(),
        )?;
        let signed = draft.sign(&secret)?;

        self.broadcast(&signed.hex).await?;
        info!(txid = %signed.txid, amount_sat = amount, "bitcoin transfer broadcast");
        Ok(signed.txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utxo(txid: u8, value: u64) -> Utxo {
        Utxo {
            txid: hex::encode([txid; 32]),
            vout: 0,
            value,
            status: UtxoStatus { confirmed: true, block_time: Some(1_700_000_000) },
        }
    }

    #[test]
    fn selection_prefers_largest_first() {
        let utxos = vec![utxo(1, 1_000), utxo(2, 50_000), utxo(3, 5_000)];
        let (selected, total) = BitcoinAdapter::select_utxos(utxos, 40_000).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(total, 50_000);
    }

    #[test]
    fn selection_accumulates_until_target() {
        let utxos = vec![utxo(1, 30_000), utxo(2, 20_000), utxo(3, 10_000)];
        let (selected, total) = BitcoinAdapter::select_utxos(utxos, 55_000).unwrap();
        assert_eq!(selected.len(), 3);
        assert_eq!(total, 60_000);
    }

    #[test]
    fn selection_fails_when_short() {
        let err = BitcoinAdapter::select_utxos(vec![utxo(1, 500)], 1_000).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds(_)));
    }

    #[test]
    fn sub_dust_change_is_dropped() {
        let adapter = BitcoinAdapter::new(BitcoinConfig::default(), reqwest::Client::new());
        let our = bitcoin::Address::from_str("bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu")
            .unwrap()
            .assume_checked();
        let to = bitcoin::Address::from_str("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4")
            .unwrap()
            .assume_checked();

        // total 10_000, amount 8_600, flat fee 1_000 => change 400 < dust
        let draft = adapter
            .build_draft(
                vec![utxo(1, 10_000)],
                10_000,
                8_600,
                to.script_pubkey(),
                our.script_pubkey(),
            )
            .unwrap();
        assert_eq!(draft.tx.output.len(), 1);
        assert_eq!(draft.tx.output[0].value, Amount::from_sat(8_600));
    }

    #[test]
    fn change_above_dust_gets_its_own_output() {
        let adapter = BitcoinAdapter::new(BitcoinConfig::default(), reqwest::Client::new());
        let our = bitcoin::Address::from_str("bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu")
            .unwrap()
            .assume_checked();
        let to = bitcoin::Address::from_str("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4")
            .unwrap()
            .assume_checked();

        let draft = adapter
            .build_draft(
                vec![utxo(1, 50_000)],
                50_000,
                8_600,
                to.script_pubkey(),
                our.script_pubkey(),
            )
            .unwrap();
        assert_eq!(draft.tx.output.len(), 2);
        assert_eq!(draft.tx.output[1].value, Amount::from_sat(50_000 - 8_600 - 1_000));
        assert_eq!(draft.tx.output[1].script_pubkey, our.script_pubkey());
    }
}
