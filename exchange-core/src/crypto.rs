//! Detached signature pipeline
//!
//! Entities are signed as compact three-segment signatures
//! (`header..signature`, base64url) over the canonical digest. The
//! payload segment travels empty and is reconstructed from the digest
//! before verification.
//!
//! Signing and key resolution are injected capabilities behind
//! [`SignerResolver`], so production resolvers (networked DID
//! resolution, HSM-backed keys) and the in-memory development store
//! are interchangeable.

use crate::types::Did;
use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Signature algorithms the pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Ed25519 (JWS name `EdDSA`)
    Ed25519,
}

impl SignatureAlgorithm {
    /// JWS `alg` header value
    pub fn jws_name(self) -> &'static str {
        match self {
            SignatureAlgorithm::Ed25519 => "EdDSA",
        }
    }

    fn from_jws_name(name: &str) -> Result<Self> {
        match name {
            "EdDSA" => Ok(SignatureAlgorithm::Ed25519),
            other => Err(Error::MalformedSignature(format!(
                "unsupported algorithm '{other}'"
            ))),
        }
    }
}

/// Outcome of resolving a key reference
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    /// Identity controlling the key
    pub controller: Did,
    /// Raw public key bytes
    pub public_key: Vec<u8>,
    /// Algorithm the key is used with
    pub algorithm: SignatureAlgorithm,
}

/// Injected signing and key-resolution capability
///
/// Implementations may be networked or async internally; the core
/// calls them as blocking operations and only requires that failures
/// surface as [`Error::DidResolution`] or
/// [`Error::NoMatchingVerificationMethod`].
pub trait SignerResolver: Send + Sync {
    /// Produce a compact detached signature over `digest` with a key
    /// controlled by `identity`
    fn sign(&self, identity: &Did, digest: &[u8; 32]) -> Result<String>;

    /// Resolve a `kid` key reference to its controlling identity and
    /// public key
    fn resolve(&self, key_id: &str) -> Result<ResolvedKey>;
}

/// Compact signature header
#[derive(Debug, Serialize, Deserialize)]
struct SignatureHeader {
    alg: Option<String>,
    kid: Option<String>,
}

/// Verify a detached compact signature over `digest`
///
/// Runs the full pipeline: presence, structure, header fields, key
/// resolution, signer identity match, and finally the cryptographic
/// check. Each stage fails with its own error kind and nothing is
/// downgraded.
pub fn verify_detached(
    resolver: &dyn SignerResolver,
    digest: &[u8; 32],
    signature: Option<&str>,
    expected_signer: &Did,
) -> Result<()> {
    let signature = signature.ok_or(Error::SignatureMissing)?;

    let parts: Vec<&str> = signature.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::MalformedSignature(format!(
            "expected 3 dot-separated segments, got {}",
            parts.len()
        )));
    }
    if !parts[1].is_empty() {
        return Err(Error::MalformedSignature(
            "payload segment must be empty in transit".to_string(),
        ));
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(parts[0])
        .map_err(|e| Error::MalformedSignature(format!("header is not base64url: {e}")))?;
    let header: SignatureHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| Error::MalformedSignature(format!("header is not JSON: {e}")))?;

    let alg = header
        .alg
        .filter(|a| !a.is_empty())
        .ok_or_else(|| Error::MalformedSignature("header missing 'alg'".to_string()))?;
    let kid = header
        .kid
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::MalformedSignature("header missing 'kid'".to_string()))?;
    let algorithm = SignatureAlgorithm::from_jws_name(&alg)?;

    let signature_bytes = URL_SAFE_NO_PAD
        .decode(parts[2])
        .map_err(|e| Error::MalformedSignature(format!("signature is not base64url: {e}")))?;

    // Re-attach the digest as the payload to rebuild the signed bytes.
    let signing_input = signing_input(parts[0], digest);

    let key = resolver.resolve(&kid)?;

    if &key.controller != expected_signer {
        return Err(Error::SignerMismatch {
            expected: expected_signer.to_string(),
            actual: key.controller.to_string(),
        });
    }

    if key.algorithm != algorithm {
        return Err(Error::SignatureInvalid(format!(
            "header declares {} but key uses {}",
            alg,
            key.algorithm.jws_name()
        )));
    }

    match algorithm {
        SignatureAlgorithm::Ed25519 => {
            let pk_bytes: [u8; 32] = key
                .public_key
                .as_slice()
                .try_into()
                .map_err(|_| Error::SignatureInvalid("invalid public key length".to_string()))?;
            let verifying_key = VerifyingKey::from_bytes(&pk_bytes)
                .map_err(|e| Error::SignatureInvalid(e.to_string()))?;

            let sig_bytes: [u8; 64] = signature_bytes
                .as_slice()
                .try_into()
                .map_err(|_| Error::SignatureInvalid("invalid signature length".to_string()))?;
            let signature = Signature::from_bytes(&sig_bytes);

            verifying_key
                .verify(signing_input.as_bytes(), &signature)
                .map_err(|e| Error::SignatureInvalid(e.to_string()))
        }
    }
}

fn signing_input(header_b64: &str, digest: &[u8; 32]) -> String {
    format!("{}.{}", header_b64, URL_SAFE_NO_PAD.encode(digest))
}

// =========================================================================
// IN-MEMORY KEY STORE (development / test implementation)
// =========================================================================

/// Software Ed25519 key store keyed by identity
///
/// Development stand-in for a real resolver, the production capability
/// being injected by the caller. One key per identity, referenced as
/// `<did>#key-1`.
#[derive(Default)]
pub struct InMemoryDidStore {
    keys: HashMap<String, SigningKey>,
}

impl InMemoryDidStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh random key for `did`
    pub fn add_identity(&mut self, did: &str) -> Did {
        let signing_key = SigningKey::from_bytes(&rand::random::<[u8; 32]>());
        self.keys.insert(did.to_string(), signing_key);
        Did::new(did)
    }

    /// Register a key derived from `seed` for `did`
    pub fn add_identity_with_seed(&mut self, did: &str, seed: [u8; 32]) -> Did {
        self.keys.insert(did.to_string(), SigningKey::from_bytes(&seed));
        Did::new(did)
    }

    fn key_for(&self, did: &str) -> Result<&SigningKey> {
        self.keys
            .get(did)
            .ok_or_else(|| Error::DidResolution(format!("unknown identity '{did}'")))
    }
}

impl SignerResolver for InMemoryDidStore {
    fn sign(&self, identity: &Did, digest: &[u8; 32]) -> Result<String> {
        let key = self.key_for(identity.as_str())?;

        let header = serde_json::to_vec(&SignatureHeader {
            alg: Some(SignatureAlgorithm::Ed25519.jws_name().to_string()),
            kid: Some(format!("{}#key-1", identity)),
        })?;
        let header_b64 = URL_SAFE_NO_PAD.encode(header);

        let signature = key.sign(signing_input(&header_b64, digest).as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

        // Detached form: the payload segment stays empty on the wire.
        Ok(format!("{header_b64}..{signature_b64}"))
    }

    fn resolve(&self, key_id: &str) -> Result<ResolvedKey> {
        let (did, fragment) = key_id.split_once('#').ok_or_else(|| {
            Error::NoMatchingVerificationMethod(format!("'{key_id}' has no key fragment"))
        })?;

        let key = self.key_for(did)?;

        if fragment != "key-1" {
            return Err(Error::NoMatchingVerificationMethod(format!(
                "identity '{did}' has no verification method '{fragment}'"
            )));
        }

        Ok(ResolvedKey {
            controller: Did::new(did),
            public_key: key.verifying_key().to_bytes().to_vec(),
            algorithm: SignatureAlgorithm::Ed25519,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(dids: &[&str]) -> InMemoryDidStore {
        let mut store = InMemoryDidStore::new();
        for did in dids {
            store.add_identity(did);
        }
        store
    }

    #[test]
    fn test_sign_then_verify() {
        let store = store_with(&["did:ex:alice"]);
        let alice = Did::new("did:ex:alice");
        let digest = [7u8; 32];

        let sig = store.sign(&alice, &digest).unwrap();
        assert!(verify_detached(&store, &digest, Some(&sig), &alice).is_ok());
    }

    #[test]
    fn test_verify_rejects_missing_signature() {
        let store = store_with(&["did:ex:alice"]);
        let err =
            verify_detached(&store, &[0u8; 32], None, &Did::new("did:ex:alice")).unwrap_err();
        assert!(matches!(err, Error::SignatureMissing));
    }

    #[test]
    fn test_verify_rejects_wrong_segment_count() {
        let store = store_with(&["did:ex:alice"]);
        let err = verify_detached(
            &store,
            &[0u8; 32],
            Some("only.two"),
            &Did::new("did:ex:alice"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedSignature(_)));
    }

    #[test]
    fn test_verify_rejects_header_without_kid() {
        let store = store_with(&["did:ex:alice"]);
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"EdDSA"}"#);
        let err = verify_detached(
            &store,
            &[0u8; 32],
            Some(&format!("{header}..c2ln")),
            &Did::new("did:ex:alice"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedSignature(_)));
    }

    #[test]
    fn test_verify_rejects_tampered_digest() {
        let store = store_with(&["did:ex:alice"]);
        let alice = Did::new("did:ex:alice");

        let sig = store.sign(&alice, &[7u8; 32]).unwrap();
        let mut tampered = [7u8; 32];
        tampered[31] ^= 0x01;

        let err = verify_detached(&store, &tampered, Some(&sig), &alice).unwrap_err();
        assert!(matches!(err, Error::SignatureInvalid(_)));
    }

    #[test]
    fn test_verify_rejects_impersonation() {
        // Mallory signs with her own valid key but claims to be Alice.
        let store = store_with(&["did:ex:alice", "did:ex:mallory"]);
        let digest = [9u8; 32];

        let sig = store.sign(&Did::new("did:ex:mallory"), &digest).unwrap();
        let err =
            verify_detached(&store, &digest, Some(&sig), &Did::new("did:ex:alice")).unwrap_err();
        assert!(matches!(err, Error::SignerMismatch { .. }));
    }

    #[test]
    fn test_resolution_failures_pass_through() {
        let store = store_with(&["did:ex:alice"]);
        let alice = Did::new("did:ex:alice");
        let digest = [1u8; 32];
        let sig = store.sign(&alice, &digest).unwrap();

        // Same signature, but verified against a store that never saw
        // Alice: the resolver failure surfaces unchanged.
        let empty = InMemoryDidStore::new();
        let err = verify_detached(&empty, &digest, Some(&sig), &alice).unwrap_err();
        assert!(matches!(err, Error::DidResolution(_)));
    }

    #[test]
    fn test_resolve_unknown_fragment() {
        let store = store_with(&["did:ex:alice"]);
        let err = store.resolve("did:ex:alice#key-9").unwrap_err();
        assert!(matches!(err, Error::NoMatchingVerificationMethod(_)));
    }

    #[test]
    fn test_seeded_signing_is_deterministic() {
        let mut a = InMemoryDidStore::new();
        let mut b = InMemoryDidStore::new();
        a.add_identity_with_seed("did:ex:pfi", [42u8; 32]);
        b.add_identity_with_seed("did:ex:pfi", [42u8; 32]);

        let digest = [3u8; 32];
        let pfi = Did::new("did:ex:pfi");
        assert_eq!(a.sign(&pfi, &digest).unwrap(), b.sign(&pfi, &digest).unwrap());
    }
}
