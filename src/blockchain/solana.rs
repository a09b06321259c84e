//! Solana adapter over the JSON-RPC API.
//!
//! Messages are serialized by hand in the v0-legacy wire format: a 3-byte
//! header, shortvec-prefixed account and instruction lists, and the recent
//! blockhash. Native transfers use the system program; token transfers use
//! the SPL token program's TransferChecked with associated token accounts
//! derived as off-curve PDAs.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signer as _, SigningKey as EdSigningKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::blockchain::traits::{
    ChainAdapter, SendOptions, TokenTransfer, TransactionInfo, TransferStatus,
};
use crate::core::config::SolanaConfig;
use crate::core::domain::Network;
use crate::core::errors::WalletError;
use crate::crypto::derivation::KeyDerivationEngine;
use crate::crypto::mnemonic::Seed;

const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";
const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
const ATA_PROGRAM: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

const SYSTEM_TRANSFER_TAG: u32 = 2;
const SPL_TRANSFER_CHECKED_TAG: u8 = 12;

type Pubkey = [u8; 32];

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ValueWrapper<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct BlockhashInfo {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
struct SignatureStatus {
    #[serde(rename = "confirmationStatus")]
    confirmation_status: Option<String>,
    err: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SignatureInfo {
    signature: String,
    #[serde(rename = "blockTime")]
    block_time: Option<u64>,
    #[serde(rename = "confirmationStatus")]
    confirmation_status: Option<String>,
}

fn parse_pubkey(encoded: &str) -> Result<Pubkey, WalletError> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| WalletError::InvalidAddress(format!("solana: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| WalletError::InvalidAddress("solana: key is not 32 bytes".to_string()))
}

/// Shortvec (compact-u16) length prefix.
fn push_shortvec_len(out: &mut Vec<u8>, mut len: usize) {
    loop {
        let mut byte = (len & 0x7f) as u8;
        len >>= 7;
        if len != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            return;
        }
    }
}

struct Instruction {
    program: Pubkey,
    /// (pubkey, is_signer, is_writable)
    accounts: Vec<(Pubkey, bool, bool)>,
    data: Vec<u8>,
}

/// Orders accounts (signers, then writable, then readonly), builds the
/// legacy message and signs it. Consumed by [`sign`](Self::sign) so the
/// payload cannot change after signing.
struct DraftMessage {
    fee_payer: Pubkey,
    instructions: Vec<Instruction>,
    recent_blockhash: Pubkey,
}

impl DraftMessage {
    fn compile(&self) -> Vec<u8> {
        // fee payer first, then writable non-signers, then readonly
        let mut writable: Vec<Pubkey> = Vec::new();
        let mut readonly: Vec<Pubkey> = Vec::new();
        for ix in &self.instructions {
            for (key, _, is_writable) in &ix.accounts {
                if *key == self.fee_payer {
                    continue;
                }
                if *is_writable {
                    if !writable.contains(key) {
                        writable.push(*key);
                    }
                } else if !readonly.contains(key) && !writable.contains(key) {
                    readonly.push(*key);
                }
            }
            if !readonly.contains(&ix.program) && !writable.contains(&ix.program) {
                readonly.push(ix.program);
            }
        }
        readonly.retain(|k| !writable.contains(k));

        let mut accounts = vec![self.fee_payer];
        accounts.extend(writable);
        let num_readonly_unsigned = readonly.len() as u8;
        accounts.extend(readonly);

        let index_of = |key: &Pubkey| -> u8 {
            accounts.iter().position(|k| k == key).unwrap_or_default() as u8
        };

        let mut out = Vec::new();
        out.push(1); // num_required_signatures: fee payer only
        out.push(0); // num_readonly_signed_accounts
        out.push(num_readonly_unsigned);

        push_shortvec_len(&mut out, accounts.len());
        for key in &accounts {
            out.extend_from_slice(key);
        }
        out.extend_from_slice(&self.recent_blockhash);

        push_shortvec_len(&mut out, self.instructions.len());
        for ix in &self.instructions {
            out.push(index_of(&ix.program));
            push_shortvec_len(&mut out, ix.accounts.len());
            for (key, _, _) in &ix.accounts {
                out.push(index_of(key));
            }
            push_shortvec_len(&mut out, ix.data.len());
            out.extend_from_slice(&ix.data);
        }
        out
    }

    /// Base64 wire transaction: shortvec of signatures, then the message.
    fn sign(self, key: &EdSigningKey) -> String {
        let message = self.compile();
        let signature = key.sign(&message);

        let mut wire = Vec::with_capacity(1 + 64 + message.len());
        push_shortvec_len(&mut wire, 1);
        wire.extend_from_slice(&signature.to_bytes());
        wire.extend_from_slice(&message);
        BASE64.encode(wire)
    }
}

fn system_transfer(from: Pubkey, to: Pubkey, lamports: u64) -> Result<Instruction, WalletError> {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_TAG.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    Ok(Instruction {
        program: parse_pubkey(SYSTEM_PROGRAM)?,
        accounts: vec![(from, true, true), (to, false, true)],
        data,
    })
}

fn spl_transfer_checked(
    owner: Pubkey,
    source_ata: Pubkey,
    mint: Pubkey,
    dest_ata: Pubkey,
    amount: u64,
    decimals: u8,
) -> Result<Instruction, WalletError> {
    let mut data = Vec::with_capacity(10);
    data.push(SPL_TRANSFER_CHECKED_TAG);
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);
    Ok(Instruction {
        program: parse_pubkey(TOKEN_PROGRAM)?,
        accounts: vec![
            (source_ata, false, true),
            (mint, false, false),
            (dest_ata, false, true),
            (owner, true, false),
        ],
        data,
    })
}

fn is_on_curve(candidate: &Pubkey) -> bool {
    CompressedEdwardsY(*candidate).decompress().is_some()
}

/// Associated token account of `wallet` for `mint`: the first off-curve
/// PDA found walking the bump seed down from 255.
fn derive_associated_token_account(wallet: &Pubkey, mint: &Pubkey) -> Result<Pubkey, WalletError> {
    let token_program = parse_pubkey(TOKEN_PROGRAM)?;
    let ata_program = parse_pubkey(ATA_PROGRAM)?;
    for bump in (0u8..=255).rev() {
        let mut hasher = Sha256::new();
        hasher.update(wallet);
        hasher.update(token_program);
        hasher.update(mint);
        hasher.update([bump]);
        hasher.update(ata_program);
        hasher.update(PDA_MARKER);
        let candidate: Pubkey = hasher.finalize().into();
        if !is_on_curve(&candidate) {
            return Ok(candidate);
        }
    }
    Err(WalletError::Crypto("no off-curve associated token account".to_string()))
}

pub struct SolanaAdapter {
    config: SolanaConfig,
    client: reqwest::Client,
}

impl SolanaAdapter {
    pub fn new(config: SolanaConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, WalletError> {
        let request = RpcRequest { jsonrpc: "2.0", id: 1, method, params };
        let response: RpcResponse<T> = self
            .client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::from_http(method, e))?
            .error_for_status()
            .map_err(|e| WalletError::from_http(method, e))?
            .json()
            .await
            .map_err(|e| WalletError::from_http(method, e))?;

        if let Some(err) = response.error {
            return Err(WalletError::NetworkUnavailable(format!(
                "{method}: rpc error {}: {}",
                err.code, err.message
            )));
        }
        response
            .result
            .ok_or_else(|| WalletError::NetworkUnavailable(format!("{method}: empty result")))
    }

    async fn latest_blockhash(&self) -> Result<Pubkey, WalletError> {
        let wrapper: ValueWrapper<BlockhashInfo> =
            self.rpc("getLatestBlockhash", json!([])).await?;
        let bytes = bs58::decode(&wrapper.value.blockhash)
            .into_vec()
            .map_err(|e| WalletError::NetworkUnavailable(format!("blockhash decode: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| WalletError::NetworkUnavailable("blockhash length".to_string()))
    }

    /// Poll until the signature confirms, errors, or the poll budget runs
    /// out. The transaction is already on the wire here, so a failed poll
    /// never fails the transfer; running out of budget leaves it submitted.
    async fn await_confirmation(&self, signature: &str) -> Result<TransferStatus, WalletError> {
        for _ in 0..self.config.confirm_polls {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            let wrapper: ValueWrapper<Vec<Option<SignatureStatus>>> =
                match self.rpc("getSignatureStatuses", json!([[signature]])).await {
                    Ok(wrapper) => wrapper,
                    Err(err) => {
                        warn!(signature = %signature, error = %err, "status poll failed");
                        continue;
                    }
                };
            if let Some(Some(status)) = wrapper.value.into_iter().next() {
                if let Some(err) = status.err {
                    return Err(WalletError::BroadcastFailed(format!(
                        "transaction failed on chain: {err}"
                    )));
                }
                match status.confirmation_status.as_deref() {
                    Some("confirmed") | Some("finalized") => return Ok(TransferStatus::Confirmed),
                    _ => {}
                }
            }
        }
        warn!(signature = %signature, "confirmation polling budget exhausted");
        Ok(TransferStatus::Submitted)
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn network(&self) -> Network {
        Network::Solana
    }

    async fn get_balance(&self, address: &str) -> Result<u128, WalletError> {
        parse_pubkey(address)?;
        let wrapper: ValueWrapper<u64> = self.rpc("getBalance", json!([address])).await?;
        Ok(wrapper.value as u128)
    }

    async fn get_recent_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<TransactionInfo>, WalletError> {
        parse_pubkey(address)?;
        let signatures: Vec<SignatureInfo> = self
            .rpc("getSignaturesForAddress", json!([address, {"limit": 20}]))
            .await?;
        Ok(signatures
            .into_iter()
            .map(|info| TransactionInfo {
                txid: info.signature,
                // amounts require per-transaction lookups; the listing
                // endpoint does not carry them
                amount: None,
                timestamp: info.block_time,
                confirmed: matches!(
                    info.confirmation_status.as_deref(),
                    Some("confirmed") | Some("finalized")
                ),
            })
            .collect())
    }

    #[instrument(skip(self, seed, options), fields(network = "solana"))]
    async fn send(
        &self,
        seed: &Seed,
        to: &str,
        amount: u128,
        options: &SendOptions,
    ) -> Result<String, WalletError> {
        let to_key = parse_pubkey(to)?;
        let amount: u64 = amount
            .try_into()
            .map_err(|_| WalletError::InsufficientFunds("amount exceeds lamport range".to_string()))?;

        let key = KeyDerivationEngine::derive_private_key(seed, Network::Solana)?;
        let signing = key.with_secret(|bytes| EdSigningKey::from_bytes(bytes));
        let from_key = signing.verifying_key().to_bytes();
        let from_address = bs58::encode(from_key).into_string();

        let instruction = match &options.token {
            None => {
                let balance = self.get_balance(&from_address).await?;
                if balance < amount as u128 {
                    return Err(WalletError::InsufficientFunds(format!(
                        "need {amount} lamports, have {balance} lamports"
                    )));
                }
                system_transfer(from_key, to_key, amount)?
            }
            Some(TokenTransfer { mint, decimals }) => {
                let mint = parse_pubkey(mint)?;
                let source = derive_associated_token_account(&from_key, &mint)?;
                let dest = derive_associated_token_account(&to_key, &mint)?;
                debug!(
                    source = %bs58::encode(source).into_string(),
                    dest = %bs58::encode(dest).into_string(),
                    "token transfer via associated accounts"
                );
                spl_transfer_checked(from_key, source, mint, dest, amount, *decimals)?
            }
        };

        let draft = DraftMessage {
            fee_payer: from_key,
            instructions: vec![instruction],
            recent_blockhash: self.latest_blockhash().await?,
        };
        let wire = draft.sign(&signing);

        let signature: String = self
            .rpc("sendTransaction", json!([wire, {"encoding": "base64"}]))
            .await
            .map_err(|e| match e {
                WalletError::NetworkUnavailable(msg) if msg.contains("rpc error") => {
                    WalletError::BroadcastFailed(msg)
                }
                other => other,
            })?;

        let status = self.await_confirmation(&signature).await?;
        info!(txid = %signature, amount_lamports = amount, ?status, "solana transfer broadcast");
        Ok(signature)
    }
}
