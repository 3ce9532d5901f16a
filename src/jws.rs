// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

//! Minimal JWS compact-serialization handling.
//!
//! Only the pieces signed App Store payloads actually use are implemented: a
//! strongly-typed header with an `ES256`-only algorithm allow-list, and
//! signature verification against a P-256 key resolved from the `x5c`
//! certificate chain. Decoding the header into a typed structure up front
//! (instead of probing an untyped map) closes off algorithm-confusion
//! attacks before any cryptographic operation runs.

use ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use serde::Deserialize;
use thiserror::Error;

use crate::{base64, hash::sha256};

/// The only signature algorithm accepted in verified mode.
pub(crate) const ALLOWED_ALG: &str = "ES256";

/// Errors from JWS parsing or signature verification.
///
/// These are deliberately coarse; the dispatcher maps them all to a generic
/// verification failure, and details go to the log.
#[derive(Debug, Error, Eq, PartialEq)]
pub(crate) enum JwsError {
    /// The token is not three base64url segments, or a segment fails to
    /// decode.
    #[error("token is not a valid JWS compact serialization")]
    Malformed,

    /// The signature does not verify under the resolved public key.
    #[error("token signature is invalid")]
    SignatureMismatch,
}

/// Typed JWS protected header.
///
/// Unknown fields are ignored; only the fields that drive verification are
/// modeled.
#[derive(Debug, Deserialize)]
pub(crate) struct JwsHeader {
    /// Signature algorithm name.
    pub alg: Option<String>,

    /// Certificate chain, leaf first, as standard base 64 DER.
    pub x5c: Option<Vec<String>>,
}

/// A compact token split into its three segments. No segment is trusted
/// until `verify_es256` has succeeded.
pub(crate) struct SignedPayload<'a> {
    header_b64: &'a str,
    claims_b64: &'a str,
    signature_b64: &'a str,
}

impl<'a> SignedPayload<'a> {
    /// Split a compact token into its three dot-separated segments.
    pub(crate) fn split(token: &'a str) -> Result<Self, JwsError> {
        let mut segments = token.split('.');

        match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(header_b64), Some(claims_b64), Some(signature_b64), None) => Ok(Self {
                header_b64,
                claims_b64,
                signature_b64,
            }),
            _ => Err(JwsError::Malformed),
        }
    }

    /// Decode the protected header into its typed form.
    pub(crate) fn header(&self) -> Result<JwsHeader, JwsError> {
        let raw = base64::decode_url_safe(self.header_b64).map_err(|_| JwsError::Malformed)?;
        serde_json::from_slice(&raw).map_err(|_| JwsError::Malformed)
    }

    /// Decode the claims segment. The result is untrusted bytes until the
    /// signature has been verified.
    pub(crate) fn claims(&self) -> Result<Vec<u8>, JwsError> {
        base64::decode_url_safe(self.claims_b64).map_err(|_| JwsError::Malformed)
    }

    /// Verify the ES256 signature over the signing input with the given
    /// key.
    ///
    /// JWS ECDSA signatures are already in fixed-width P1363 (`r || s`)
    /// form, so no DER conversion is involved on this path.
    pub(crate) fn verify_es256(&self, public_key: &VerifyingKey) -> Result<(), JwsError> {
        let raw_signature =
            base64::decode_url_safe(self.signature_b64).map_err(|_| JwsError::Malformed)?;

        let signature =
            Signature::from_slice(&raw_signature).map_err(|_| JwsError::SignatureMismatch)?;

        let signing_input = format!("{}.{}", self.header_b64, self.claims_b64);
        let digest = sha256(signing_input.as_bytes());

        public_key
            .verify_prehash(&digest, &signature)
            .map_err(|_| JwsError::SignatureMismatch)
    }
}
