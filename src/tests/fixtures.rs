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

//! In-house test material: a deterministic three-certificate P-256 chain
//! built with rasn_pkix, an ES256 token signer, and small DER builders for
//! the receipt tests. Keys come from fixed seeds so fixtures are stable
//! across runs without an RNG dependency.

use chrono::{DateTime, Duration, Utc};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use rasn::types::{
    Any, BitString, Integer, ObjectIdentifier, OctetString, PrintableString, SetOf,
};
use rasn_pkix::{
    AlgorithmIdentifier, AttributeTypeAndValue, Certificate, Extension, Extensions, Name,
    RelativeDistinguishedName, SubjectPublicKeyInfo, TbsCertificate, Time, Validity, Version,
};

use crate::base64;

const EC_PUBLIC_KEY_OID: &[u32] = &[1, 2, 840, 10045, 2, 1];
const PRIME256V1_OID: &[u32] = &[1, 2, 840, 10045, 3, 1, 7];
const ECDSA_WITH_SHA256_OID: &[u32] = &[1, 2, 840, 10045, 4, 3, 2];
const CN_OID: &[u32] = &[2, 5, 4, 3];

pub(crate) const RECEIPT_SIGNING_OID: &[u32] = &[1, 2, 840, 113635, 100, 6, 11, 1];
pub(crate) const WWDR_INTERMEDIATE_OID: &[u32] = &[1, 2, 840, 113635, 100, 6, 2, 1];

/// A leaf/intermediate/root chain plus the leaf signing key.
pub(crate) struct TestChain {
    pub leaf_key: SigningKey,
    pub leaf_der: Vec<u8>,
    pub intermediate_der: Vec<u8>,
    pub root_der: Vec<u8>,
}

impl TestChain {
    /// The chain as it appears in an `x5c` header: leaf first, standard
    /// base 64.
    pub(crate) fn x5c(&self) -> Vec<String> {
        vec![
            base64::encode(&self.leaf_der),
            base64::encode(&self.intermediate_der),
            base64::encode(&self.root_der),
        ]
    }

    /// Trust-anchor set containing just this chain's root.
    pub(crate) fn roots(&self) -> Vec<Vec<u8>> {
        vec![self.root_der.clone()]
    }
}

/// Knobs for building deliberately broken chains.
pub(crate) struct ChainOptions {
    pub leaf_marker: bool,
    pub intermediate_marker: bool,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl Default for ChainOptions {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            leaf_marker: true,
            intermediate_marker: true,
            not_before: now - Duration::days(1),
            not_after: now + Duration::days(365),
        }
    }
}

/// A well-formed chain valid around the current time.
pub(crate) fn test_chain() -> TestChain {
    test_chain_with(ChainOptions::default())
}

pub(crate) fn test_chain_with(options: ChainOptions) -> TestChain {
    let root_key = signing_key(0x01);
    let intermediate_key = signing_key(0x02);
    let leaf_key = signing_key(0x03);

    let root_name = name("Test Root CA");
    let intermediate_name = name("Test Intermediate CA");
    let leaf_name = name("Test Receipt Signing");

    let validity = Validity {
        not_before: Time::Utc(options.not_before),
        not_after: Time::Utc(options.not_after),
    };

    let root_der = build_cert(&CertSpec {
        serial: 1,
        issuer: &root_name,
        subject: &root_name,
        subject_key: &root_key,
        issuer_key: &root_key,
        marker: None,
        validity: &validity,
    });

    let intermediate_der = build_cert(&CertSpec {
        serial: 2,
        issuer: &root_name,
        subject: &intermediate_name,
        subject_key: &intermediate_key,
        issuer_key: &root_key,
        marker: options.intermediate_marker.then_some(WWDR_INTERMEDIATE_OID),
        validity: &validity,
    });

    let leaf_der = build_cert(&CertSpec {
        serial: 3,
        issuer: &intermediate_name,
        subject: &leaf_name,
        subject_key: &leaf_key,
        issuer_key: &intermediate_key,
        marker: options.leaf_marker.then_some(RECEIPT_SIGNING_OID),
        validity: &validity,
    });

    TestChain {
        leaf_key,
        leaf_der,
        intermediate_der,
        root_der,
    }
}

/// A deterministic P-256 key from a one-byte seed.
pub(crate) fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

fn oid(components: &[u32]) -> ObjectIdentifier {
    ObjectIdentifier::new(components.to_vec()).unwrap()
}

fn name(common_name: &str) -> Name {
    let printable = PrintableString::try_from(common_name.to_string()).unwrap();
    let value = rasn::der::encode(&printable).unwrap();

    let mut set = SetOf::new();
    set.insert(AttributeTypeAndValue {
        r#type: oid(CN_OID),
        value: Any::new(value),
    });

    Name::RdnSequence(vec![RelativeDistinguishedName::from(set)])
}

fn ec_spki(key: &SigningKey) -> SubjectPublicKeyInfo {
    let point = key.verifying_key().to_encoded_point(false);

    SubjectPublicKeyInfo {
        algorithm: AlgorithmIdentifier {
            algorithm: oid(EC_PUBLIC_KEY_OID),
            parameters: Some(Any::new(rasn::der::encode(&oid(PRIME256V1_OID)).unwrap())),
        },
        subject_public_key: BitString::from_slice(point.as_bytes()),
    }
}

struct CertSpec<'a> {
    serial: i64,
    issuer: &'a Name,
    subject: &'a Name,
    subject_key: &'a SigningKey,
    issuer_key: &'a SigningKey,
    marker: Option<&'static [u32]>,
    validity: &'a Validity,
}

fn build_cert(spec: &CertSpec<'_>) -> Vec<u8> {
    let signature_algorithm = AlgorithmIdentifier {
        algorithm: oid(ECDSA_WITH_SHA256_OID),
        parameters: None,
    };

    // Marker extensions carry an ASN.1 NULL payload, as the real ones do.
    let extensions = spec.marker.map(|marker| {
        Extensions::from(vec![Extension {
            extn_id: oid(marker),
            critical: false,
            extn_value: OctetString::from(vec![0x05, 0x00]),
        }])
    });

    let tbs = TbsCertificate {
        version: Version::V3,
        serial_number: Integer::from(spec.serial),
        signature: signature_algorithm.clone(),
        issuer: spec.issuer.clone(),
        validity: spec.validity.clone(),
        subject: spec.subject.clone(),
        subject_public_key_info: ec_spki(spec.subject_key),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions,
    };

    let tbs_der = rasn::der::encode(&tbs).unwrap();
    let signature: Signature = spec.issuer_key.sign(&tbs_der);

    let certificate = Certificate {
        tbs_certificate: tbs,
        signature_algorithm,
        signature_value: BitString::from_slice(signature.to_der().as_bytes()),
    };

    rasn::der::encode(&certificate).unwrap()
}

/// Sign claims as an ES256 compact token with this chain in the header.
pub(crate) fn sign_token(claims: &serde_json::Value, chain: &TestChain) -> String {
    let header = serde_json::json!({ "alg": "ES256", "x5c": chain.x5c() });
    sign_token_with_header(claims, &header, &chain.leaf_key)
}

/// Sign claims with an arbitrary header and key, for malformed-token cases.
pub(crate) fn sign_token_with_header(
    claims: &serde_json::Value,
    header: &serde_json::Value,
    key: &SigningKey,
) -> String {
    let header_b64 = base64::encode_url_safe(header.to_string().as_bytes());
    let claims_b64 = base64::encode_url_safe(claims.to_string().as_bytes());

    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature: Signature = key.sign(signing_input.as_bytes());
    let signature_b64 = base64::encode_url_safe(&signature.to_bytes().to_vec());

    format!("{header_b64}.{claims_b64}.{signature_b64}")
}

/// Encode BER/DER length octets (definite form).
pub(crate) fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }

    let mut octets = Vec::new();
    let mut remaining = len;
    while remaining > 0 {
        octets.insert(0, (remaining & 0xFF) as u8);
        remaining >>= 8;
    }

    let mut out = vec![0x80 | octets.len() as u8];
    out.extend_from_slice(&octets);
    out
}

/// One tag-length-value construct with a single identifier octet.
pub(crate) fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&encode_length(content.len()));
    out.extend_from_slice(content);
    out
}
