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

//! Certificate chain verification against the configured trusted roots.

use asn1_rs::{oid, Oid};
use chrono::{DateTime, Utc};
use ecdsa::signature::hazmat::PrehashVerifier;
use log::debug;
use x509_parser::{
    certificate::X509Certificate, prelude::FromDer, time::ASN1Time, x509::SubjectPublicKeyInfo,
};

use crate::{
    base64, hash, ocsp,
    verifier::{
        cache::VerifiedChainCache,
        error::{VerificationError, VerificationStatus},
    },
};

/// Verified chains are exactly leaf, intermediate, root.
pub(crate) const EXPECTED_CHAIN_LENGTH: usize = 3;

/// Verifies `x5c` chains and resolves them to a leaf signing key.
///
/// The verifier holds the trusted root set it was constructed with and a
/// bounded cache of chains that already passed online verification.
pub(crate) struct ChainVerifier {
    root_certificates: Vec<Vec<u8>>,
    enable_online_checks: bool,
    pub(crate) cache: VerifiedChainCache,
}

impl ChainVerifier {
    pub(crate) fn new(root_certificates: Vec<Vec<u8>>, enable_online_checks: bool) -> Self {
        Self {
            root_certificates,
            enable_online_checks,
            cache: VerifiedChainCache::new(),
        }
    }

    /// Verify a leaf-first certificate chain and return the leaf's
    /// SEC1-encoded P-256 public key.
    ///
    /// The full pipeline runs in order: chain length, parseability, issuer
    /// linkage and signatures down to a trusted root, validity windows at
    /// `effective_date`, App Store marker extensions, and (in online mode)
    /// an OCSP check of both issued certificates. A cache hit on the exact
    /// same chain short-circuits everything.
    pub(crate) fn verify(
        &self,
        certificates: &[String],
        effective_date: DateTime<Utc>,
    ) -> Result<Vec<u8>, VerificationError> {
        let now = Utc::now();
        let cache_key = certificates.concat();

        if self.enable_online_checks {
            if let Some(public_key) = self.cache.get(&cache_key, now) {
                debug!("chain cache hit; skipping verification");
                return Ok(public_key);
            }
        }

        if certificates.len() != EXPECTED_CHAIN_LENGTH {
            return Err(VerificationError::new(
                VerificationStatus::InvalidChainLength,
                format!(
                    "expected {EXPECTED_CHAIN_LENGTH} certificates in x5c, found {}",
                    certificates.len()
                ),
            ));
        }

        let ders = certificates
            .iter()
            .map(|cert| base64::decode(cert))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| {
                VerificationError::new(
                    VerificationStatus::InvalidCertificate,
                    "x5c certificate is not valid base64",
                )
            })?;

        let leaf = parse_certificate(&ders[0])?;
        let intermediate = parse_certificate(&ders[1])?;
        parse_certificate(&ders[2])?;

        if leaf.issuer() != intermediate.subject() || !verify_issued(&leaf, &intermediate) {
            return Err(VerificationError::new(
                VerificationStatus::VerificationFailure,
                "leaf certificate was not issued by the intermediate",
            ));
        }

        let mut trusted_root: Option<(X509Certificate<'_>, &Vec<u8>)> = None;
        for root_der in &self.root_certificates {
            let root = parse_certificate(root_der)?;
            if intermediate.issuer() == root.subject() && verify_issued(&intermediate, &root) {
                trusted_root = Some((root, root_der));
                break;
            }
        }
        let Some((root, root_der)) = trusted_root else {
            return Err(VerificationError::new(
                VerificationStatus::VerificationFailure,
                "intermediate certificate does not chain to a trusted root",
            ));
        };

        let at = ASN1Time::from_timestamp(effective_date.timestamp()).map_err(|_| {
            VerificationError::new(
                VerificationStatus::VerificationFailure,
                "effective date is not representable",
            )
        })?;
        for (cert, position) in [
            (&leaf, "leaf"),
            (&intermediate, "intermediate"),
            (&root, "root"),
        ] {
            if !cert.validity().is_valid_at(at) {
                return Err(VerificationError::new(
                    VerificationStatus::VerificationFailure,
                    format!("{position} certificate is not valid at the effective date"),
                ));
            }
        }

        if !has_extension(&leaf, &RECEIPT_SIGNING_OID) {
            return Err(VerificationError::new(
                VerificationStatus::VerificationFailure,
                "leaf certificate lacks the receipt signing extension",
            ));
        }
        if !has_extension(&intermediate, &WWDR_INTERMEDIATE_OID) {
            return Err(VerificationError::new(
                VerificationStatus::VerificationFailure,
                "intermediate certificate lacks the WWDR extension",
            ));
        }

        let public_key = p256_key_bytes(&leaf).ok_or_else(|| {
            VerificationError::new(
                VerificationStatus::VerificationFailure,
                "leaf public key is not an EC P-256 key",
            )
        })?;

        if self.enable_online_checks {
            for (cert_der, issuer_der) in [(&ders[1], root_der), (&ders[0], &ders[1])] {
                ocsp::check_revocation_status(cert_der, issuer_der).map_err(|err| {
                    let status = if err.is_retryable() {
                        VerificationStatus::RetryableVerificationFailure
                    } else {
                        VerificationStatus::VerificationFailure
                    };
                    VerificationError::new(status, format!("OCSP check failed: {err}"))
                })?;
            }

            self.cache.save(cache_key, public_key.clone(), now);
        }

        Ok(public_key)
    }
}

fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, VerificationError> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|_| {
            VerificationError::new(
                VerificationStatus::InvalidCertificate,
                "certificate is not parseable DER",
            )
        })
}

fn has_extension(cert: &X509Certificate<'_>, oid: &Oid<'static>) -> bool {
    cert.extensions().iter().any(|ext| ext.oid == *oid)
}

/// SEC1 point bytes of the certificate's public key, if it is an EC key on
/// P-256.
fn p256_key_bytes(cert: &X509Certificate<'_>) -> Option<Vec<u8>> {
    let spki = cert.public_key();
    if spki.algorithm.algorithm != EC_PUBLIC_KEY_OID {
        return None;
    }

    let curve = spki.algorithm.parameters.as_ref()?.as_oid().ok()?;
    if curve != PRIME256V1_OID {
        return None;
    }

    Some(spki.subject_public_key.data.to_vec())
}

/// ECDSA signature algorithms accepted on certificates and OCSP responses.
#[derive(Clone, Copy)]
pub(crate) enum SignatureAlgorithm {
    EcdsaWithSha256,
    EcdsaWithSha384,
}

/// Map a dotted signature algorithm OID to a supported algorithm.
pub(crate) fn signature_algorithm(oid: &str) -> Option<SignatureAlgorithm> {
    match oid {
        "1.2.840.10045.4.3.2" => Some(SignatureAlgorithm::EcdsaWithSha256),
        "1.2.840.10045.4.3.3" => Some(SignatureAlgorithm::EcdsaWithSha384),
        _ => None,
    }
}

/// Check that `cert`'s signature verifies under `issuer`'s public key.
/// Subject/issuer name linkage is the caller's concern.
pub(crate) fn verify_issued(cert: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> bool {
    let Some(algorithm) = signature_algorithm(&cert.signature_algorithm.algorithm.to_id_string())
    else {
        return false;
    };

    verify_der_signature(
        issuer.public_key(),
        algorithm,
        cert.signature_value.as_ref(),
        cert.tbs_certificate.as_ref(),
    )
}

/// Verify a DER-encoded ECDSA signature over `data` with the key in `spki`.
///
/// Certificate and OCSP signatures are DER ECDSA-Sig-Value structures, so
/// they are converted to fixed-width P1363 form for the rust-native
/// verifiers. P-256 and P-384 issuer keys are supported.
pub(crate) fn verify_der_signature(
    spki: &SubjectPublicKeyInfo<'_>,
    algorithm: SignatureAlgorithm,
    signature_der: &[u8],
    data: &[u8],
) -> bool {
    if spki.algorithm.algorithm != EC_PUBLIC_KEY_OID {
        return false;
    }
    let Some(curve) = spki
        .algorithm
        .parameters
        .as_ref()
        .and_then(|params| params.as_oid().ok())
    else {
        return false;
    };

    let digest = match algorithm {
        SignatureAlgorithm::EcdsaWithSha256 => hash::sha256(data),
        SignatureAlgorithm::EcdsaWithSha384 => hash::sha384(data),
    };
    let key_bytes = &spki.subject_public_key.data;

    if curve == PRIME256V1_OID {
        let Some(signature) = der_to_p1363(signature_der, 32)
            .and_then(|raw| p256::ecdsa::Signature::from_slice(&raw).ok())
        else {
            return false;
        };
        let Ok(key) = p256::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes) else {
            return false;
        };
        key.verify_prehash(&digest, &signature).is_ok()
    } else if curve == SECP384R1_OID {
        let Some(signature) = der_to_p1363(signature_der, 48)
            .and_then(|raw| p384::ecdsa::Signature::from_slice(&raw).ok())
        else {
            return false;
        };
        let Ok(key) = p384::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes) else {
            return false;
        };
        key.verify_prehash(&digest, &signature).is_ok()
    } else {
        false
    }
}

/// Convert a DER ECDSA-Sig-Value (SEQUENCE of two INTEGERs) into P1363
/// `r || s` form with fixed-width components.
fn der_to_p1363(signature: &[u8], component_len: usize) -> Option<Vec<u8>> {
    use x509_parser::der_parser::der::{parse_der_integer, parse_der_sequence_defined_g};

    let (_, (r, s)) = parse_der_sequence_defined_g(|content, _| {
        let (rest, r) = parse_der_integer(content)?;
        let (rest, s) = parse_der_integer(rest)?;
        Ok((rest, (r, s)))
    })(signature)
    .ok()?;

    let mut out = vec![0u8; component_len * 2];
    write_component(&mut out[..component_len], r.as_slice().ok()?)?;
    write_component(&mut out[component_len..], s.as_slice().ok()?)?;
    Some(out)
}

/// Right-align one integer component into its fixed-width slot, stripping
/// the DER sign-padding zero if present.
fn write_component(slot: &mut [u8], component: &[u8]) -> Option<()> {
    let significant = match component.iter().position(|&byte| byte != 0) {
        Some(first) => &component[first..],
        None => &[],
    };

    if significant.len() > slot.len() {
        return None;
    }

    let pad = slot.len() - significant.len();
    slot[pad..].copy_from_slice(significant);
    Some(())
}

const EC_PUBLIC_KEY_OID: Oid<'static> = oid!(1.2.840 .10045 .2 .1);
const PRIME256V1_OID: Oid<'static> = oid!(1.2.840 .10045 .3 .1 .7);
const SECP384R1_OID: Oid<'static> = oid!(1.3.132 .0 .34);
const RECEIPT_SIGNING_OID: Oid<'static> = oid!(1.2.840 .113635 .100 .6 .11 .1);
const WWDR_INTERMEDIATE_OID: Oid<'static> = oid!(1.2.840 .113635 .100 .6 .2 .1);
