//! Signed extrinsic payloads.

use alloy::primitives::{keccak256, Address, B256};
use alloy::signers::Signature;

use crate::blockchain::types::{BlockchainError, BlockchainResult, Call};
use crate::blockchain::wallet::Wallet;

/// A signed, not yet final call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedExtrinsic {
    pub signer: Address,
    pub chain_id: u64,
    pub nonce: u64,
    pub tip: u128,
    pub call: Call,
    pub signature: Signature,
}

/// Hash of everything the signature commits to.
///
/// Layout: `chain_id ‖ nonce ‖ tip ‖ call`, integers big-endian.
fn payload_hash(chain_id: u64, nonce: u64, tip: u128, call: &Call) -> B256 {
    let mut bytes = Vec::with_capacity(8 + 8 + 16 + 64);
    bytes.extend_from_slice(&chain_id.to_be_bytes());
    bytes.extend_from_slice(&nonce.to_be_bytes());
    bytes.extend_from_slice(&tip.to_be_bytes());
    encode_call(call, &mut bytes);
    keccak256(bytes)
}

/// `0x00 ‖ real ‖ proxy type (0xff when unforced) ‖ inner call` for proxy calls,
/// `0x01 ‖ pallet ‖ method ‖ args as JSON` (each length-prefixed) for runtime calls.
fn encode_call(call: &Call, out: &mut Vec<u8>) {
    match call {
        Call::Proxy {
            real,
            force_proxy_type,
            call,
        } => {
            out.push(0x00);
            out.extend_from_slice(real.as_slice());
            out.push(force_proxy_type.map_or(u8::MAX, |t| t as u8));
            encode_call(call, out);
        }
        Call::Runtime {
            pallet,
            method,
            args,
        } => {
            out.push(0x01);
            encode_bytes(pallet.as_bytes(), out);
            encode_bytes(method.as_bytes(), out);
            encode_bytes(args.to_string().as_bytes(), out);
        }
    }
}

fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(bytes);
}

impl SignedExtrinsic {
    /// Sign `call` with `wallet` at the given nonce.
    pub async fn sign(
        wallet: &Wallet,
        call: Call,
        nonce: u64,
        tip: Option<u128>,
    ) -> BlockchainResult<Self> {
        let tip = tip.unwrap_or_default();
        let hash = payload_hash(wallet.chain_id(), nonce, tip, &call);
        let signature = wallet.sign_hash(hash).await?;

        Ok(Self {
            signer: wallet.address(),
            chain_id: wallet.chain_id(),
            nonce,
            tip,
            call,
            signature,
        })
    }

    /// Hash of the signed payload, used to identify the extrinsic.
    pub fn hash(&self) -> B256 {
        let payload = payload_hash(self.chain_id, self.nonce, self.tip, &self.call);
        let mut bytes = Vec::with_capacity(32 + 65);
        bytes.extend_from_slice(payload.as_slice());
        bytes.extend_from_slice(&self.signature.as_bytes());
        keccak256(bytes)
    }

    /// Check that the signature was produced by `self.signer`.
    pub fn verify(&self) -> BlockchainResult<()> {
        let hash = payload_hash(self.chain_id, self.nonce, self.tip, &self.call);
        let recovered = self
            .signature
            .recover_address_from_prehash(&hash)
            .map_err(|e| BlockchainError::Transport(format!("Invalid signature: {}", e)))?;

        if recovered != self.signer {
            return Err(BlockchainError::Transport(format!(
                "Bad signature: recovered {} but extrinsic claims {}",
                recovered, self.signer
            )));
        }
        Ok(())
    }
}
