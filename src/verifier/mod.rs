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

//! Verification and decoding of signed App Store payloads.
//!
//! [`SignedDataVerifier`] is the entry point: one instance per app and
//! environment, holding the trusted roots, the configured identity, and a
//! cache of chains that already passed online verification. Each payload
//! kind has its own `verify_and_decode_*` method; they share one
//! verification pipeline and differ only in the identity checks applied to
//! the decoded claims.

pub(crate) mod cache;
pub(crate) mod chain;
mod error;

use chrono::{DateTime, Utc};
use log::info;
use p256::ecdsa::VerifyingKey;
use serde::de::DeserializeOwned;

use crate::{
    environment::Environment,
    jws::{SignedPayload, ALLOWED_ALG},
    models::{
        AppTransaction, JwsRenewalInfoDecodedPayload, JwsTransactionDecodedPayload,
        RealtimeRequestDecodedPayload, ResponseBodyV2DecodedPayload,
    },
    verifier::chain::ChainVerifier,
};

pub use error::{VerificationError, VerificationStatus};

/// Identity and environment checks applied to a decoded payload. Each
/// payload kind carries different identity fields, so each has its own
/// policy naming which checks apply and where the fields live.
struct PayloadPolicy<T> {
    /// Where to find the bundle identifier, if this kind carries one.
    bundle_id: Option<fn(&T) -> Option<&str>>,

    /// Where to find the app identifier, if this kind carries one. Only
    /// enforced against a production verifier.
    app_apple_id: Option<fn(&T) -> Option<i64>>,

    /// Where to find the environment claim.
    environment: Option<fn(&T) -> Option<Environment>>,

    /// Whether the verifier's `allow_any_environment` override applies to
    /// this kind. Never honored for payload kinds that drive server-side
    /// entitlement decisions.
    honor_any_environment: bool,
}

const RENEWAL_INFO_POLICY: PayloadPolicy<JwsRenewalInfoDecodedPayload> = PayloadPolicy {
    bundle_id: None,
    app_apple_id: None,
    environment: Some(|payload| payload.environment),
    honor_any_environment: true,
};

const TRANSACTION_POLICY: PayloadPolicy<JwsTransactionDecodedPayload> = PayloadPolicy {
    bundle_id: Some(|payload| payload.bundle_id.as_deref()),
    app_apple_id: None,
    environment: Some(|payload| payload.environment),
    honor_any_environment: true,
};

const NOTIFICATION_POLICY: PayloadPolicy<ResponseBodyV2DecodedPayload> = PayloadPolicy {
    bundle_id: Some(notification_bundle_id),
    app_apple_id: Some(notification_app_apple_id),
    environment: Some(notification_environment),
    honor_any_environment: true,
};

const APP_TRANSACTION_POLICY: PayloadPolicy<AppTransaction> = PayloadPolicy {
    bundle_id: Some(|payload| payload.bundle_id.as_deref()),
    app_apple_id: Some(|payload| payload.app_apple_id),
    environment: Some(|payload| payload.receipt_type),
    honor_any_environment: false,
};

const REALTIME_REQUEST_POLICY: PayloadPolicy<RealtimeRequestDecodedPayload> = PayloadPolicy {
    bundle_id: None,
    app_apple_id: Some(|payload| payload.app_apple_id),
    environment: Some(|payload| payload.environment),
    honor_any_environment: false,
};

/// Verifies signed App Store payloads and decodes them into typed form.
///
/// An instance is bound to one app (bundle identifier plus App Store app
/// identifier) and one expected environment. Construction is cheap apart
/// from holding the root certificates; instances are `Sync` and meant to be
/// shared across request-handling threads.
pub struct SignedDataVerifier {
    chain_verifier: ChainVerifier,
    enable_online_checks: bool,
    environment: Environment,
    bundle_id: String,
    app_apple_id: Option<i64>,
    allow_any_environment: bool,
}

impl SignedDataVerifier {
    /// Create a verifier.
    ///
    /// `root_certificates` are DER-encoded trust anchors; every verified
    /// chain must terminate at one of them. `enable_online_checks` turns on
    /// OCSP revocation checking (and with it the chain cache).
    /// `app_apple_id` is required when the environment is
    /// [`Environment::Production`], because production payloads are checked
    /// against it.
    pub fn new(
        root_certificates: Vec<Vec<u8>>,
        enable_online_checks: bool,
        environment: Environment,
        bundle_id: impl Into<String>,
        app_apple_id: Option<i64>,
    ) -> Result<Self, VerificationError> {
        if environment == Environment::Production && app_apple_id.is_none() {
            return Err(VerificationError::new(
                VerificationStatus::VerificationFailure,
                "app_apple_id is required when the environment is Production",
            ));
        }

        Ok(Self {
            chain_verifier: ChainVerifier::new(root_certificates, enable_online_checks),
            enable_online_checks,
            environment,
            bundle_id: bundle_id.into(),
            app_apple_id,
            allow_any_environment: false,
        })
    }

    /// Accept payloads whose environment differs from the configured one,
    /// for payload kinds where that is safe. Kinds that drive entitlement
    /// decisions (app transactions and realtime requests) always enforce
    /// the configured environment.
    pub fn with_any_environment_allowed(mut self, allow: bool) -> Self {
        self.allow_any_environment = allow;
        self
    }

    /// Verify and decode signed renewal information, e.g. the
    /// `signedRenewalInfo` field of a notification or API response.
    pub fn verify_and_decode_renewal_info(
        &self,
        signed_renewal_info: &str,
    ) -> Result<JwsRenewalInfoDecodedPayload, VerificationError> {
        let payload = self.decode_signed_payload(signed_renewal_info)?;
        self.apply_policy(&payload, &RENEWAL_INFO_POLICY)?;
        Ok(payload)
    }

    /// Verify and decode a signed transaction, e.g. the
    /// `signedTransactionInfo` field of a notification or API response.
    pub fn verify_and_decode_signed_transaction(
        &self,
        signed_transaction: &str,
    ) -> Result<JwsTransactionDecodedPayload, VerificationError> {
        let payload = self.decode_signed_payload(signed_transaction)?;
        self.apply_policy(&payload, &TRANSACTION_POLICY)?;
        Ok(payload)
    }

    /// Verify and decode the signed payload of a version 2 App Store server
    /// notification.
    ///
    /// Signed tokens nested inside the notification (transaction and
    /// renewal info) are not verified here; pass them to their own
    /// `verify_and_decode_*` methods.
    pub fn verify_and_decode_notification(
        &self,
        signed_payload: &str,
    ) -> Result<ResponseBodyV2DecodedPayload, VerificationError> {
        let payload = self.decode_signed_payload(signed_payload)?;
        self.apply_policy(&payload, &NOTIFICATION_POLICY)?;
        Ok(payload)
    }

    /// Verify and decode a signed app transaction.
    pub fn verify_and_decode_app_transaction(
        &self,
        signed_app_transaction: &str,
    ) -> Result<AppTransaction, VerificationError> {
        let payload = self.decode_signed_payload(signed_app_transaction)?;
        self.apply_policy(&payload, &APP_TRANSACTION_POLICY)?;
        Ok(payload)
    }

    /// Verify and decode a signed realtime request sent by the App Store to
    /// the developer's server.
    pub fn verify_and_decode_realtime_request(
        &self,
        signed_request: &str,
    ) -> Result<RealtimeRequestDecodedPayload, VerificationError> {
        let payload = self.decode_signed_payload(signed_request)?;
        self.apply_policy(&payload, &REALTIME_REQUEST_POLICY)?;
        Ok(payload)
    }

    /// The shared pipeline: split the token, verify the chain and
    /// signature, and decode the claims into their typed form.
    ///
    /// In the test environments there is no trust chain to verify, so the
    /// claims are decoded directly.
    fn decode_signed_payload<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<T, VerificationError> {
        let payload = SignedPayload::split(token).map_err(verification_failure)?;

        if self.environment.skips_signature_verification() {
            let claims = payload.claims().map_err(verification_failure)?;
            return serde_json::from_slice(&claims).map_err(|_| {
                VerificationError::new(
                    VerificationStatus::VerificationFailure,
                    "claims do not decode to the expected payload shape",
                )
            });
        }

        let header = payload.header().map_err(verification_failure)?;
        if header.alg.as_deref() != Some(ALLOWED_ALG) {
            return Err(VerificationError::new(
                VerificationStatus::VerificationFailure,
                "token does not use the ES256 algorithm",
            ));
        }
        let certificates = match header.x5c {
            Some(certificates) if !certificates.is_empty() => certificates,
            _ => {
                return Err(VerificationError::new(
                    VerificationStatus::VerificationFailure,
                    "token carries no x5c certificate chain",
                ));
            }
        };

        let claims = payload.claims().map_err(verification_failure)?;
        let claims: serde_json::Value = serde_json::from_slice(&claims).map_err(|_| {
            VerificationError::new(
                VerificationStatus::VerificationFailure,
                "claims are not a JSON object",
            )
        })?;

        let effective_date = self.effective_date(&claims);
        let public_key = self.chain_verifier.verify(&certificates, effective_date)?;

        let verifying_key = VerifyingKey::from_sec1_bytes(&public_key).map_err(|_| {
            VerificationError::new(
                VerificationStatus::VerificationFailure,
                "leaf public key is not usable for ES256",
            )
        })?;
        payload
            .verify_es256(&verifying_key)
            .map_err(verification_failure)?;

        serde_json::from_value(claims).map_err(|_| {
            VerificationError::new(
                VerificationStatus::VerificationFailure,
                "claims do not decode to the expected payload shape",
            )
        })
    }

    /// The point in time certificate validity is checked against.
    ///
    /// With online checks the current time is authoritative. Offline, the
    /// payload's own signing date is used so that archived payloads stay
    /// verifiable after their chain expires; app transactions carry it as
    /// `receiptCreationDate` instead of `signedDate`.
    fn effective_date(&self, claims: &serde_json::Value) -> DateTime<Utc> {
        if self.enable_online_checks {
            return Utc::now();
        }

        let signed_date_ms = claims
            .get("signedDate")
            .and_then(serde_json::Value::as_i64)
            .or_else(|| {
                claims
                    .get("receiptCreationDate")
                    .and_then(serde_json::Value::as_i64)
            });

        match signed_date_ms.and_then(DateTime::from_timestamp_millis) {
            Some(date) => date,
            None => Utc::now(),
        }
    }

    /// Check the decoded claims against the configured identity and
    /// environment, per this payload kind's policy.
    fn apply_policy<T>(
        &self,
        payload: &T,
        policy: &PayloadPolicy<T>,
    ) -> Result<(), VerificationError> {
        // The unverified test environments skip identity checks too; their
        // payloads are tool-generated and carry whatever the tool put there.
        if self.environment.skips_signature_verification() {
            return Ok(());
        }

        if let Some(extract) = policy.bundle_id {
            if extract(payload) != Some(self.bundle_id.as_str()) {
                return Err(VerificationError::new(
                    VerificationStatus::InvalidAppIdentifier,
                    "payload bundle identifier does not match the configured one",
                ));
            }
        }

        if let Some(extract) = policy.app_apple_id {
            if self.environment == Environment::Production && extract(payload) != self.app_apple_id
            {
                return Err(VerificationError::new(
                    VerificationStatus::InvalidAppIdentifier,
                    "payload app identifier does not match the configured one",
                ));
            }
        }

        if let Some(extract) = policy.environment {
            match extract(payload) {
                Some(environment) if environment == self.environment => {}
                Some(environment)
                    if policy.honor_any_environment && self.allow_any_environment =>
                {
                    info!(
                        "accepting {environment} payload in a {} verifier",
                        self.environment
                    );
                }
                Some(environment) => {
                    return Err(VerificationError::new(
                        VerificationStatus::InvalidEnvironment,
                        format!(
                            "payload environment {environment} does not match {}",
                            self.environment
                        ),
                    ));
                }
                None => {
                    return Err(VerificationError::new(
                        VerificationStatus::InvalidEnvironment,
                        "payload carries no environment",
                    ));
                }
            }
        }

        Ok(())
    }
}

fn verification_failure(err: crate::jws::JwsError) -> VerificationError {
    VerificationError::new(VerificationStatus::VerificationFailure, err.to_string())
}

/// Bundle identifier of whichever notification sub-object is populated.
fn notification_bundle_id(payload: &ResponseBodyV2DecodedPayload) -> Option<&str> {
    if let Some(data) = &payload.data {
        return data.bundle_id.as_deref();
    }
    if let Some(summary) = &payload.summary {
        return summary.bundle_id.as_deref();
    }
    if let Some(token) = &payload.external_purchase_token {
        return token.bundle_id.as_deref();
    }
    payload
        .app_data
        .as_ref()
        .and_then(|app_data| app_data.bundle_id.as_deref())
}

/// App identifier of whichever notification sub-object is populated.
fn notification_app_apple_id(payload: &ResponseBodyV2DecodedPayload) -> Option<i64> {
    if let Some(data) = &payload.data {
        return data.app_apple_id;
    }
    if let Some(summary) = &payload.summary {
        return summary.app_apple_id;
    }
    if let Some(token) = &payload.external_purchase_token {
        return token.app_apple_id;
    }
    payload
        .app_data
        .as_ref()
        .and_then(|app_data| app_data.app_apple_id)
}

/// Environment a notification applies to.
///
/// External purchase tokens carry no environment field; a `SANDBOX` prefix
/// on the purchase identifier marks the sandbox, anything else is
/// production.
fn notification_environment(payload: &ResponseBodyV2DecodedPayload) -> Option<Environment> {
    if let Some(data) = &payload.data {
        return data.environment;
    }
    if let Some(summary) = &payload.summary {
        return summary.environment;
    }
    if let Some(app_data) = &payload.app_data {
        return app_data.environment;
    }

    payload
        .external_purchase_token
        .as_ref()
        .map(|token| match &token.external_purchase_id {
            Some(id) if id.starts_with("SANDBOX") => Environment::Sandbox,
            _ => Environment::Production,
        })
}
