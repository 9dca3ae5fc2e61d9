//! Client of the remote validity prover

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rollup_core::{Bytes32, CompressedValidityWitness, ValidityPublicInputs, WitnessError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ProverMode};

/// Malformed proof blob
#[derive(Debug, Error)]
pub enum ProofBlobError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("proof blob is {actual} bytes, need at least {expected}")]
    TooShort { expected: usize, actual: usize },

    #[error("invalid public inputs: {0}")]
    PublicInputs(#[from] WitnessError),
}

/// Validity proof as returned by the prover
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidityProof {
    pub public_inputs: Vec<u64>,
    /// Opaque proof bytes
    pub proof: Vec<u8>,
}

impl ValidityProof {
    /// Proof carrying only `public_inputs`, produced in mock mode
    pub fn mock(public_inputs: &ValidityPublicInputs) -> Self {
        Self { public_inputs: public_inputs.to_u64_vec(), proof: Vec::new() }
    }

    /// `u32 LE count ‖ count × u64 LE ‖ proof bytes`, base64 encoded
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(4 + 8 * self.public_inputs.len() + self.proof.len());
        bytes.extend_from_slice(&(self.public_inputs.len() as u32).to_le_bytes());
        for value in &self.public_inputs {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes.extend_from_slice(&self.proof);
        STANDARD.encode(bytes)
    }

    pub fn decode(blob: &str) -> Result<Self, ProofBlobError> {
        let bytes = STANDARD.decode(blob)?;
        let count_bytes: [u8; 4] = bytes
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or(ProofBlobError::TooShort { expected: 4, actual: bytes.len() })?;
        let count = u32::from_le_bytes(count_bytes) as usize;

        let end = 4 + 8 * count;
        if bytes.len() < end {
            return Err(ProofBlobError::TooShort { expected: end, actual: bytes.len() });
        }
        let public_inputs = bytes[4..end]
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();

        Ok(Self { public_inputs, proof: bytes[end..].to_vec() })
    }

    /// Leading public inputs decoded as validity public inputs
    pub fn validity_public_inputs(&self) -> Result<ValidityPublicInputs, ProofBlobError> {
        Ok(ValidityPublicInputs::from_u64_slice(&self.public_inputs)?)
    }
}

/// Body of `POST /proof`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    pub block_hash: Bytes32,
    pub validity_witness: CompressedValidityWitness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_validity_proof: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequestResponse {
    pub success: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `GET /proof/{blockHash}`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofStatusResponse {
    pub success: bool,
    #[serde(default)]
    pub proof: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Validity prover client
#[derive(Debug)]
pub struct ValidityProver {
    config: Config,
    http_client: reqwest::Client,
}

impl ValidityProver {
    pub fn new(config: Config) -> Self {
        match config.prover_mode {
            ProverMode::Mock => info!("validity prover initialized in MOCK mode"),
            ProverMode::Remote => info!(url = %config.prover_url, "validity prover initialized in REMOTE mode"),
        }
        Self { config, http_client: reqwest::Client::new() }
    }

    /// Prove one transition and wait for the result.
    ///
    /// `local` are the public inputs computed by the node. Mock mode returns
    /// them as the proof.
    pub async fn prove(
        &self,
        block_hash: Bytes32,
        witness: CompressedValidityWitness,
        prev_proof: Option<&ValidityProof>,
        local: &ValidityPublicInputs,
    ) -> Result<ValidityProof> {
        if self.config.prover_mode.is_mock() {
            debug!(%block_hash, "mock proving");
            return Ok(ValidityProof::mock(local));
        }

        self.request_proof(&ProofRequest {
            block_hash,
            validity_witness: witness,
            prev_validity_proof: prev_proof.map(ValidityProof::encode),
        })
        .await?;
        self.wait_for_proof(block_hash).await
    }

    async fn request_proof(&self, request: &ProofRequest) -> Result<()> {
        let url = format!("{}/proof", self.config.prover_url);
        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("failed to send proof request to {url}"))?
            .json::<ProofRequestResponse>()
            .await
            .context("failed to parse proof request response")?;

        if !response.success {
            bail!(
                "prover rejected request for block {}: {} {}",
                request.block_hash,
                response.code.unwrap_or_default(),
                response.message.unwrap_or_default()
            );
        }
        info!(block_hash = %request.block_hash, "proof requested");
        Ok(())
    }

    async fn wait_for_proof(&self, block_hash: Bytes32) -> Result<ValidityProof> {
        let url = format!("{}/proof/{block_hash}", self.config.prover_url);
        for attempt in 1..=self.config.proof_poll_max_attempts {
            let response = self
                .http_client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("failed to poll {url}"))?
                .json::<ProofStatusResponse>()
                .await
                .context("failed to parse proof status response")?;

            if !response.success {
                bail!("proof of block {block_hash} failed: {}", response.error_message.unwrap_or_default());
            }
            if let Some(blob) = response.proof {
                info!(%block_hash, attempt, "proof received");
                return ValidityProof::decode(&blob).map_err(|e| anyhow!("proof of block {block_hash}: {e}"));
            }

            debug!(%block_hash, attempt, "proof pending");
            tokio::time::sleep(self.config.proof_poll_interval()).await;
        }

        warn!(%block_hash, attempts = self.config.proof_poll_max_attempts, "gave up waiting for proof");
        bail!("proof of block {block_hash} not ready after {} polls", self.config.proof_poll_max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use rollup_core::{BlockBuilderStorage, PermissiveVerifier, SenderType};

    use super::*;

    fn sample_pis() -> ValidityPublicInputs {
        let mut pis = ValidityPublicInputs::genesis();
        pis.public_state.block_number = 3;
        pis.is_valid_block = true;
        pis
    }

    #[test]
    fn test_blob_layout() {
        let proof = ValidityProof { public_inputs: vec![1, u64::MAX], proof: vec![0xaa, 0xbb] };
        let bytes = STANDARD.decode(proof.encode()).unwrap();
        assert_eq!(&bytes[..4], &[2, 0, 0, 0]);
        assert_eq!(&bytes[4..12], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[20..], &[0xaa, 0xbb]);
        assert_eq!(ValidityProof::decode(&proof.encode()).unwrap(), proof);
    }

    #[test]
    fn test_decode_rejects_short_blobs() {
        assert!(matches!(ValidityProof::decode(&STANDARD.encode([1, 0])), Err(ProofBlobError::TooShort { .. })));
        let truncated = STANDARD.encode([2, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            ValidityProof::decode(&truncated),
            Err(ProofBlobError::TooShort { expected: 20, actual: 12 })
        ));
        assert!(matches!(ValidityProof::decode("not base64!"), Err(ProofBlobError::Base64(_))));
    }

    #[test]
    fn test_mock_proof_carries_public_inputs() {
        let pis = sample_pis();
        let proof = ValidityProof::mock(&pis);
        assert_eq!(proof.validity_public_inputs().unwrap(), pis);
        assert!(ValidityProof { public_inputs: vec![0; 10], proof: vec![] }.validity_public_inputs().is_err());
    }

    fn sample_witness() -> (Bytes32, CompressedValidityWitness, ValidityPublicInputs) {
        let mut storage = BlockBuilderStorage::new();
        let content = rollup_core::BlockContent {
            sender_type: SenderType::PublicKey,
            senders: vec![rollup_core::BlockSender {
                public_key: rollup_core::Sender::Real(rollup_core::U256::from(77u64)),
                account_id: 0,
                is_signed: true,
            }],
            tx_tree_root: Bytes32::ZERO,
            agg_pubkey: Default::default(),
            agg_signature: Default::default(),
            message_point: Default::default(),
        };
        let block = content.to_posted_block(&storage.latest_block(), storage.deposit_tree_root()).unwrap();
        let witness = storage.generate_block(&content, block).unwrap();
        let witness = storage.apply_block(witness, &PermissiveVerifier).unwrap();
        let compressed = witness.compress(storage.next_account_id() - 1).unwrap();
        (block.hash(), compressed, storage.validity_public_inputs(1).unwrap())
    }

    #[test]
    fn test_proof_request_wire_format() {
        let (hash, witness, _) = sample_witness();
        let request = ProofRequest { block_hash: hash, validity_witness: witness, prev_validity_proof: None };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["blockHash"], serde_json::json!(hash.to_string()));
        assert!(json.get("prevValidityProof").is_none());
        let block_merkle_proof = &json["validityWitness"]["validityTransitionWitness"]["blockMerkleProof"];
        assert!(block_merkle_proof.is_array());

        let back: ProofRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.validity_witness, request.validity_witness);
    }

    #[tokio::test]
    async fn test_mock_mode_skips_http() {
        let (hash, witness, pis) = sample_witness();
        let prover = ValidityProver::new(Config { prover_url: "http://127.0.0.1:1".to_string(), ..Config::default() });
        let proof = prover.prove(hash, witness, None, &pis).await.unwrap();
        assert_eq!(proof.validity_public_inputs().unwrap(), pis);
    }

    #[derive(Clone)]
    struct FakeProver {
        polls: Arc<AtomicU32>,
        blob: String,
    }

    async fn handle_request(Json(request): Json<ProofRequest>) -> Json<ProofRequestResponse> {
        let success = request.validity_witness.decompress().is_ok();
        Json(ProofRequestResponse { success, code: None, message: None })
    }

    async fn handle_status(State(fake): State<FakeProver>, Path(_hash): Path<String>) -> Json<ProofStatusResponse> {
        let polls = fake.polls.fetch_add(1, Ordering::SeqCst);
        let proof = (polls >= 1).then(|| fake.blob.clone());
        Json(ProofStatusResponse { success: true, proof, error_message: None })
    }

    #[tokio::test]
    async fn test_remote_mode_polls_until_ready() {
        let (hash, witness, pis) = sample_witness();
        let fake = FakeProver { polls: Arc::new(AtomicU32::new(0)), blob: ValidityProof::mock(&pis).encode() };
        let app = Router::new()
            .route("/proof", post(handle_request))
            .route("/proof/:hash", get(handle_status))
            .with_state(fake.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let prover = ValidityProver::new(Config {
            prover_url: format!("http://{addr}"),
            prover_mode: ProverMode::Remote,
            proof_poll_interval: 0,
            ..Config::default()
        });
        let proof = prover.prove(hash, witness, None, &pis).await.unwrap();
        assert_eq!(proof.validity_public_inputs().unwrap(), pis);
        assert_eq!(fake.polls.load(Ordering::SeqCst), 2);
    }
}
