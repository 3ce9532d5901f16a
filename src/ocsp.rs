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

//! Live revocation checking over OCSP.
//!
//! One certificate is checked per request against the responder named in
//! its authority-information-access extension. Only a signed, fresh
//! response with a definitive `good` status passes; anything the responder
//! says about a different certificate is ignored.

use std::io::Read;

use chrono::Utc;
use log::warn;
use rasn::prelude::*;
use rasn_ocsp::{BasicOcspResponse, CertId, CertStatus, OcspResponseStatus, ResponderId};
use rasn_pkix::Certificate;
use thiserror::Error;
use x509_parser::{
    certificate::X509Certificate,
    der_parser::{oid, Oid},
    extensions::{GeneralName, ParsedExtension},
    prelude::FromDer,
};

use crate::{hash, verifier::chain};

/// Per-request network timeout.
const REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Cap on the response body; genuine OCSP responses are a few KB.
const MAX_RESPONSE_BYTES: u64 = 1_000_000;

/// Errors raised during an OCSP check.
///
/// Only transport-layer failures are retryable. A definitive responder
/// answer that is anything other than `good`, or a response that fails
/// validation, is final.
#[derive(Debug, Error)]
pub(crate) enum OcspError {
    /// The certificate names no OCSP responder.
    #[error("certificate carries no OCSP responder URL")]
    NoResponderUrl,

    /// The certificate or its issuer could not be decoded for the request.
    #[error("certificate could not be encoded into an OCSP request")]
    InvalidCertificate,

    /// Network-layer failure reaching the responder, or the responder asked
    /// us to come back later.
    #[error("OCSP transport failure: {0}")]
    Transport(String),

    /// The responder rejected the request outright.
    #[error("OCSP responder answered {0}")]
    Unsuccessful(String),

    /// The response body is not a decodable OCSP response.
    #[error("OCSP response is malformed")]
    MalformedResponse,

    /// The response signature does not verify under the responder's or the
    /// issuer's key.
    #[error("OCSP response signature is invalid")]
    BadSignature,

    /// The response carries no single response for the requested
    /// certificate.
    #[error("OCSP response does not cover the requested certificate")]
    NoMatchingResponse,

    /// The matching single response is outside its validity window.
    #[error("OCSP response is stale or not yet valid")]
    StaleResponse,

    /// The responder answered definitively with a non-good status.
    #[error("OCSP certificate status is {0}")]
    NotGood(&'static str),
}

impl OcspError {
    /// Whether retrying the same check could plausibly succeed.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Ask the certificate's OCSP responder whether it has been revoked.
///
/// `Ok(())` means a validated responder said `good`. Responder URLs are
/// tried in certificate order; a transport failure moves on to the next
/// URL, while any received response is taken as the answer.
pub(crate) fn check_revocation_status(cert_der: &[u8], issuer_der: &[u8]) -> Result<(), OcspError> {
    let (_, cert) =
        X509Certificate::from_der(cert_der).map_err(|_| OcspError::InvalidCertificate)?;
    let (_, issuer) =
        X509Certificate::from_der(issuer_der).map_err(|_| OcspError::InvalidCertificate)?;

    let responder_urls = extract_responder_urls(&cert);
    if responder_urls.is_empty() {
        return Err(OcspError::NoResponderUrl);
    }

    let (request_der, cert_id) = build_request(cert_der, issuer_der)?;

    let mut last_error = OcspError::NoResponderUrl;
    for responder_url in responder_urls {
        match fetch(&responder_url, &request_der) {
            Ok(response_der) => return validate_response(&response_der, &cert_id, &issuer),
            Err(err) => {
                warn!("OCSP fetch from {responder_url} failed: {err}");
                last_error = err;
            }
        }
    }

    Err(last_error)
}

/// OCSP responder URLs from the authority-information-access extension.
fn extract_responder_urls(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut urls = Vec::new();

    let Ok(extensions) = cert.extensions_map() else {
        return urls;
    };
    let Some(aia) = extensions.get(&AUTHORITY_INFO_ACCESS_OID) else {
        return urls;
    };
    let ParsedExtension::AuthorityInfoAccess(aia) = aia.parsed_extension() else {
        return urls;
    };

    for access in &aia.accessdescs {
        if access.access_method == AD_OCSP_OID {
            if let GeneralName::URI(uri) = access.access_location {
                urls.push(uri.to_string());
            }
        }
    }

    urls
}

/// Build the DER-encoded unsigned request and the `CertId` to look for in
/// the response. `CertId` hashes are defined over SHA-1.
fn build_request(cert_der: &[u8], issuer_der: &[u8]) -> Result<(Vec<u8>, CertId), OcspError> {
    let subject: Certificate =
        rasn::der::decode(cert_der).map_err(|_| OcspError::InvalidCertificate)?;
    let issuer: Certificate =
        rasn::der::decode(issuer_der).map_err(|_| OcspError::InvalidCertificate)?;

    let issuer_name_raw = rasn::der::encode(&issuer.tbs_certificate.subject)
        .map_err(|_| OcspError::InvalidCertificate)?;
    let issuer_key_raw = issuer
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .as_raw_slice();

    let sha1_oid =
        rasn::types::Oid::new(&[1, 3, 14, 3, 2, 26]).ok_or(OcspError::InvalidCertificate)?;
    let hash_algorithm = rasn_pkix::AlgorithmIdentifier {
        algorithm: rasn::types::ObjectIdentifier::from(sha1_oid),
        parameters: Some(Any::new(
            rasn::der::encode(&()).map_err(|_| OcspError::InvalidCertificate)?,
        )),
        // Many OCSP responders expect this to be NULL not None.
    };

    let cert_id = CertId {
        hash_algorithm,
        issuer_name_hash: OctetString::from(hash::sha1(&issuer_name_raw)),
        issuer_key_hash: OctetString::from(hash::sha1(issuer_key_raw)),
        serial_number: subject.tbs_certificate.serial_number,
    };

    let request = rasn_ocsp::OcspRequest {
        tbs_request: rasn_ocsp::TbsRequest {
            version: rasn_ocsp::Version::from(0u8),
            requestor_name: None,
            request_list: vec![rasn_ocsp::Request {
                req_cert: cert_id.clone(),
                single_request_extensions: None,
            }],
            request_extensions: None,
        },
        optional_signature: None,
    };

    let request_der = rasn::der::encode(&request).map_err(|_| OcspError::InvalidCertificate)?;
    Ok((request_der, cert_id))
}

/// POST the request to one responder and return the raw response body.
fn fetch(responder_url: &str, request_der: &[u8]) -> Result<Vec<u8>, OcspError> {
    let parsed = url::Url::parse(responder_url)
        .map_err(|_| OcspError::Transport("responder URL is not parseable".to_string()))?;

    let response = ureq::post(parsed.as_str())
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
        .set("Content-Type", "application/ocsp-request")
        .send_bytes(request_der)
        .map_err(|err| OcspError::Transport(err.to_string()))?;

    if response.status() != 200 {
        return Err(OcspError::Transport(format!(
            "responder returned HTTP {}",
            response.status()
        )));
    }

    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut body)
        .map_err(|err| OcspError::Transport(err.to_string()))?;

    Ok(body)
}

/// Decode and validate one responder answer for `request_cert_id`.
fn validate_response(
    response_der: &[u8],
    request_cert_id: &CertId,
    issuer: &X509Certificate<'_>,
) -> Result<(), OcspError> {
    let response: rasn_ocsp::OcspResponse =
        rasn::der::decode(response_der).map_err(|_| OcspError::MalformedResponse)?;

    match response.status {
        OcspResponseStatus::Successful => {}
        OcspResponseStatus::TryLater | OcspResponseStatus::InternalError => {
            return Err(OcspError::Transport(
                "responder asked to retry later".to_string(),
            ));
        }
        other => return Err(OcspError::Unsuccessful(format!("{other:?}"))),
    }

    let bytes = response.bytes.ok_or(OcspError::MalformedResponse)?;
    let basic: BasicOcspResponse =
        rasn::der::decode(&bytes.response).map_err(|_| OcspError::MalformedResponse)?;

    let tbs = rasn::der::encode(&basic.tbs_response_data)
        .map_err(|_| OcspError::MalformedResponse)?;
    let algorithm = chain::signature_algorithm(&basic.signature_algorithm.algorithm.to_string())
        .ok_or(OcspError::BadSignature)?;
    let signature = basic.signature.as_raw_slice();

    // Prefer an embedded delegated-responder certificate; it must match the
    // responder id and itself be issued by the issuer under check. Failing
    // that, the issuer may have signed the response directly.
    let mut signed = false;
    if let Some(responder_certs) = &basic.certs {
        for candidate in responder_certs {
            if !responder_id_matches(&basic.tbs_response_data.responder_id, candidate) {
                continue;
            }
            let Ok(candidate_der) = rasn::der::encode(candidate) else {
                continue;
            };
            if responder_signature_verifies(&candidate_der, issuer, algorithm, signature, &tbs) {
                signed = true;
                break;
            }
        }
    }
    if !signed {
        signed = chain::verify_der_signature(issuer.public_key(), algorithm, signature, &tbs);
    }
    if !signed {
        return Err(OcspError::BadSignature);
    }

    let now = Utc::now().timestamp();
    for single in &basic.tbs_response_data.responses {
        if !cert_id_matches(&single.cert_id, request_cert_id) {
            continue;
        }

        if now < single.this_update.timestamp() {
            return Err(OcspError::StaleResponse);
        }
        if let Some(next_update) = &single.next_update {
            if now > next_update.timestamp() {
                return Err(OcspError::StaleResponse);
            }
        }

        return match &single.cert_status {
            CertStatus::Good => Ok(()),
            CertStatus::Revoked(_) => Err(OcspError::NotGood("revoked")),
            CertStatus::Unknown(_) => Err(OcspError::NotGood("unknown")),
        };
    }

    Err(OcspError::NoMatchingResponse)
}

/// Whether a candidate responder certificate is the one the response names.
fn responder_id_matches(responder_id: &ResponderId, candidate: &Certificate) -> bool {
    match responder_id {
        ResponderId::ByName(name) => *name == candidate.tbs_certificate.subject,
        ResponderId::ByKey(key_hash) => {
            let candidate_hash = hash::sha1(
                candidate
                    .tbs_certificate
                    .subject_public_key_info
                    .subject_public_key
                    .as_raw_slice(),
            );
            *key_hash == candidate_hash
        }
    }
}

/// Whether the response signature verifies under a delegated responder
/// certificate that was itself issued by `issuer`.
fn responder_signature_verifies(
    responder_der: &[u8],
    issuer: &X509Certificate<'_>,
    algorithm: chain::SignatureAlgorithm,
    signature: &[u8],
    tbs: &[u8],
) -> bool {
    let Ok((_, responder)) = X509Certificate::from_der(responder_der) else {
        return false;
    };

    if responder.issuer() != issuer.subject() || !chain::verify_issued(&responder, issuer) {
        return false;
    }

    chain::verify_der_signature(responder.public_key(), algorithm, signature, tbs)
}

/// `CertId` equality modulo the hash algorithm's parameter encoding;
/// responders differ on NULL versus absent parameters.
fn cert_id_matches(a: &CertId, b: &CertId) -> bool {
    a.hash_algorithm.algorithm == b.hash_algorithm.algorithm
        && a.issuer_name_hash == b.issuer_name_hash
        && a.issuer_key_hash == b.issuer_key_hash
        && a.serial_number == b.serial_number
}

const AD_OCSP_OID: Oid<'static> = oid!(1.3.6 .1 .5 .5 .7 .48 .1);
const AUTHORITY_INFO_ACCESS_OID: Oid<'static> = oid!(1.3.6 .1 .5 .5 .7 .1 .1);
