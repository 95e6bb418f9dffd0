//! Transaction building, signing, and submission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use pincraft_core::ContractErrorCode;
use pincraft_crypto::SigningKeypair;

use crate::rpc::{ContractInvocation, LedgerRpcClient};

/// Fee charged when simulation reports none.
const BASE_FEE: i64 = 100;

/// A contract invocation envelope ready for submission.
///
/// The signature covers the canonical JSON of every other field.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEnvelope {
    pub source: String,
    pub contract_id: String,
    pub function: String,
    pub args: Value,
    pub fee: i64,
    pub nonce: u64,
    pub network_passphrase: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

impl TransactionEnvelope {
    /// Bytes the signature is computed over: the envelope serialized with
    /// an empty signature field (which serde then omits).
    pub fn signable_bytes(&self) -> Vec<u8> {
        let unsigned = TransactionEnvelope {
            signature: String::new(),
            ..self.clone()
        };
        serde_json::to_vec(&unsigned).unwrap_or_default()
    }
}

/// How one invocation resolved.
#[derive(Debug, Clone)]
pub enum InvokeOutcome {
    Success {
        tx_hash: String,
        return_value: Option<Value>,
    },
    /// The contract itself refused, in simulation or on-chain.
    ContractError(ContractErrorCode),
    /// Transport, RPC, or simulation infrastructure failure; retryable.
    Transport(String),
}

/// Builds, simulates, signs, and submits contract invocations.
pub struct ContractInvoker {
    rpc: Arc<LedgerRpcClient>,
    contract_id: String,
    network_passphrase: String,
    keypair: SigningKeypair,
    nonce: AtomicU64,
}

impl ContractInvoker {
    pub fn new(
        rpc: Arc<LedgerRpcClient>,
        contract_id: &str,
        network_passphrase: &str,
        keypair: SigningKeypair,
    ) -> Self {
        Self {
            rpc,
            contract_id: contract_id.to_string(),
            network_passphrase: network_passphrase.to_string(),
            keypair,
            nonce: AtomicU64::new(1),
        }
    }

    pub fn address(&self) -> String {
        self.keypair.address()
    }

    /// Simulate, sign, and submit `function(args)` as the operator.
    pub async fn invoke(&self, function: &str, args: Value) -> InvokeOutcome {
        let source = self.address();
        let invocation = ContractInvocation {
            contract_id: self.contract_id.clone(),
            function: function.to_string(),
            args: args.clone(),
            source: source.clone(),
        };

        let simulation = match self.rpc.simulate(&invocation).await {
            Ok(sim) => sim,
            Err(e) => return InvokeOutcome::Transport(e.to_string()),
        };
        if let Some(error) = simulation.error {
            return match ContractErrorCode::classify(&error) {
                Some(code) => InvokeOutcome::ContractError(code),
                None => InvokeOutcome::Transport(format!("simulation failed: {error}")),
            };
        }

        let mut envelope = TransactionEnvelope {
            source,
            contract_id: self.contract_id.clone(),
            function: function.to_string(),
            args,
            fee: simulation.min_resource_fee.unwrap_or(BASE_FEE),
            nonce: self.nonce.fetch_add(1, Ordering::Relaxed),
            network_passphrase: self.network_passphrase.clone(),
            signature: String::new(),
        };
        let signature = self.keypair.sign(&envelope.signable_bytes());
        envelope.signature = hex::encode(signature);

        let envelope_value = match serde_json::to_value(&envelope) {
            Ok(v) => v,
            Err(e) => return InvokeOutcome::Transport(e.to_string()),
        };
        let response = match self.rpc.send(&envelope_value).await {
            Ok(r) => r,
            Err(e) => return InvokeOutcome::Transport(e.to_string()),
        };

        if let Some(error) = response.error {
            return match ContractErrorCode::classify(&error) {
                Some(code) => InvokeOutcome::ContractError(code),
                None => InvokeOutcome::Transport(format!("tx failed: {error}")),
            };
        }
        if response.status == "FAILED" {
            warn!(function, hash = %response.hash, "transaction failed without error detail");
            return InvokeOutcome::Transport("transaction failed".to_string());
        }

        debug!(function, hash = %response.hash, "transaction submitted");
        InvokeOutcome::Success {
            tx_hash: response.hash,
            return_value: response.return_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pincraft_crypto::verify_detached;

    fn envelope() -> TransactionEnvelope {
        TransactionEnvelope {
            source: "abcd".into(),
            contract_id: "CC".into(),
            function: "collect_pin".into(),
            args: serde_json::json!(["abcd", 1]),
            fee: 100,
            nonce: 7,
            network_passphrase: "Pincraft Test Network ; 2025".into(),
            signature: String::new(),
        }
    }

    #[test]
    fn test_signable_bytes_exclude_signature() {
        let mut env = envelope();
        let unsigned = env.signable_bytes();
        env.signature = "ff".repeat(64);
        assert_eq!(env.signable_bytes(), unsigned);
        assert!(!String::from_utf8_lossy(&unsigned).contains("signature"));
    }

    #[test]
    fn test_envelope_signature_round_trip() {
        let keypair = SigningKeypair::generate();
        let mut env = envelope();
        env.source = keypair.address();

        let sig = keypair.sign(&env.signable_bytes());
        env.signature = hex::encode(sig);

        assert!(verify_detached(
            &keypair.public_key_bytes(),
            &env.signable_bytes(),
            &sig
        ));
    }
}
