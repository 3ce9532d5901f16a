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

use chrono::{Duration, Utc};
use serde_json::json;

use crate::{
    base64,
    tests::fixtures::{
        sign_token, sign_token_with_header, signing_key, test_chain, test_chain_with,
        ChainOptions, TestChain,
    },
    Environment, SignedDataVerifier, VerificationStatus,
};

const BUNDLE_ID: &str = "com.example.app";
const APP_APPLE_ID: i64 = 1234;

fn sandbox_verifier(chain: &TestChain) -> SignedDataVerifier {
    SignedDataVerifier::new(chain.roots(), false, Environment::Sandbox, BUNDLE_ID, None).unwrap()
}

fn production_verifier(chain: &TestChain) -> SignedDataVerifier {
    SignedDataVerifier::new(
        chain.roots(),
        false,
        Environment::Production,
        BUNDLE_ID,
        Some(APP_APPLE_ID),
    )
    .unwrap()
}

fn transaction_claims(environment: &str) -> serde_json::Value {
    json!({
        "bundleId": BUNDLE_ID,
        "productId": "com.example.product",
        "transactionId": "100000123",
        "originalTransactionId": "100000123",
        "environment": environment,
        "type": "Auto-Renewable Subscription",
        "signedDate": Utc::now().timestamp_millis(),
    })
}

#[test]
fn verifies_and_decodes_a_transaction() {
    let chain = test_chain();
    let token = sign_token(&transaction_claims("Sandbox"), &chain);

    let payload = sandbox_verifier(&chain)
        .verify_and_decode_signed_transaction(&token)
        .unwrap();

    assert_eq!(payload.bundle_id.as_deref(), Some(BUNDLE_ID));
    assert_eq!(payload.transaction_id.as_deref(), Some("100000123"));
    assert_eq!(payload.environment, Some(Environment::Sandbox));
    assert_eq!(
        payload.product_type.as_deref(),
        Some("Auto-Renewable Subscription")
    );
}

#[test]
fn wrong_bundle_id_is_rejected() {
    let chain = test_chain();
    let mut claims = transaction_claims("Sandbox");
    claims["bundleId"] = json!("com.example.other");
    let token = sign_token(&claims, &chain);

    let err = sandbox_verifier(&chain)
        .verify_and_decode_signed_transaction(&token)
        .unwrap_err();
    assert_eq!(err.status(), VerificationStatus::InvalidAppIdentifier);
}

#[test]
fn environment_mismatch_is_rejected() {
    let chain = test_chain();
    let token = sign_token(&transaction_claims("Production"), &chain);

    let err = sandbox_verifier(&chain)
        .verify_and_decode_signed_transaction(&token)
        .unwrap_err();
    assert_eq!(err.status(), VerificationStatus::InvalidEnvironment);
}

#[test]
fn missing_environment_is_rejected() {
    let chain = test_chain();
    let mut claims = transaction_claims("Sandbox");
    claims.as_object_mut().unwrap().remove("environment");
    let token = sign_token(&claims, &chain);

    let err = sandbox_verifier(&chain)
        .verify_and_decode_signed_transaction(&token)
        .unwrap_err();
    assert_eq!(err.status(), VerificationStatus::InvalidEnvironment);
}

#[test]
fn environment_override_applies_to_transactions() {
    let chain = test_chain();
    let token = sign_token(&transaction_claims("Production"), &chain);

    let verifier = sandbox_verifier(&chain).with_any_environment_allowed(true);
    let payload = verifier
        .verify_and_decode_signed_transaction(&token)
        .unwrap();
    assert_eq!(payload.environment, Some(Environment::Production));
}

#[test]
fn environment_override_never_applies_to_app_transactions() {
    let chain = test_chain();
    let claims = json!({
        "receiptType": "Production",
        "bundleId": BUNDLE_ID,
        "applicationVersion": "1.2.3",
        "receiptCreationDate": Utc::now().timestamp_millis(),
    });
    let token = sign_token(&claims, &chain);

    let verifier = sandbox_verifier(&chain).with_any_environment_allowed(true);
    let err = verifier
        .verify_and_decode_app_transaction(&token)
        .unwrap_err();
    assert_eq!(err.status(), VerificationStatus::InvalidEnvironment);
}

#[test]
fn environment_override_never_applies_to_realtime_requests() {
    let chain = test_chain();
    let claims = json!({
        "requestIdentifier": "9f26b95b-d71a-49bc-9b69-04f625f974c2",
        "appAppleId": APP_APPLE_ID,
        "environment": "Production",
        "signedDate": Utc::now().timestamp_millis(),
    });
    let token = sign_token(&claims, &chain);

    let verifier = sandbox_verifier(&chain).with_any_environment_allowed(true);
    let err = verifier
        .verify_and_decode_realtime_request(&token)
        .unwrap_err();
    assert_eq!(err.status(), VerificationStatus::InvalidEnvironment);
}

#[test]
fn decodes_an_app_transaction() {
    let chain = test_chain();
    let claims = json!({
        "receiptType": "Sandbox",
        "bundleId": BUNDLE_ID,
        "applicationVersion": "1.2.3",
        "receiptCreationDate": Utc::now().timestamp_millis(),
    });
    let token = sign_token(&claims, &chain);

    let payload = sandbox_verifier(&chain)
        .verify_and_decode_app_transaction(&token)
        .unwrap();
    assert_eq!(payload.receipt_type, Some(Environment::Sandbox));
    assert_eq!(payload.application_version.as_deref(), Some("1.2.3"));
}

#[test]
fn decodes_a_realtime_request() {
    let chain = test_chain();
    let claims = json!({
        "requestIdentifier": "9f26b95b-d71a-49bc-9b69-04f625f974c2",
        "environment": "Sandbox",
        "signedDate": Utc::now().timestamp_millis(),
    });
    let token = sign_token(&claims, &chain);

    let payload = sandbox_verifier(&chain)
        .verify_and_decode_realtime_request(&token)
        .unwrap();
    assert_eq!(
        payload.request_identifier.as_deref(),
        Some("9f26b95b-d71a-49bc-9b69-04f625f974c2")
    );
}

#[test]
fn renewal_info_checks_environment_only() {
    let chain = test_chain();

    // No bundle identifier anywhere in the claims; the renewal-info policy
    // must not require one.
    let claims = json!({
        "originalTransactionId": "100000123",
        "autoRenewStatus": 1,
        "environment": "Sandbox",
        "signedDate": Utc::now().timestamp_millis(),
    });
    let token = sign_token(&claims, &chain);

    let payload = sandbox_verifier(&chain)
        .verify_and_decode_renewal_info(&token)
        .unwrap();
    assert_eq!(payload.auto_renew_status, Some(1));
}

#[test]
fn production_verifier_requires_an_app_apple_id() {
    let chain = test_chain();
    let result = SignedDataVerifier::new(
        chain.roots(),
        false,
        Environment::Production,
        BUNDLE_ID,
        None,
    );
    let err = result.err().unwrap();
    assert_eq!(err.status(), VerificationStatus::VerificationFailure);
}

#[test]
fn notification_identity_is_checked_against_the_data_object() {
    let chain = test_chain();
    let claims = json!({
        "notificationType": "SUBSCRIBED",
        "notificationUUID": "002e14d5-51f5-4503-b5a8-c3a1af68eb20",
        "signedDate": Utc::now().timestamp_millis(),
        "data": {
            "environment": "Production",
            "appAppleId": APP_APPLE_ID,
            "bundleId": BUNDLE_ID,
        },
    });
    let token = sign_token(&claims, &chain);

    let payload = production_verifier(&chain)
        .verify_and_decode_notification(&token)
        .unwrap();
    assert_eq!(payload.notification_type.as_deref(), Some("SUBSCRIBED"));

    let mut claims = claims;
    claims["data"]["appAppleId"] = json!(9999);
    let token = sign_token(&claims, &chain);

    let err = production_verifier(&chain)
        .verify_and_decode_notification(&token)
        .unwrap_err();
    assert_eq!(err.status(), VerificationStatus::InvalidAppIdentifier);
}

#[test]
fn external_purchase_token_environment_is_inferred_from_its_id() {
    let chain = test_chain();

    let claims = json!({
        "notificationType": "EXTERNAL_PURCHASE_TOKEN_CREATED",
        "signedDate": Utc::now().timestamp_millis(),
        "externalPurchaseToken": {
            "externalPurchaseId": "SANDBOX_b2158121-7af9",
            "bundleId": BUNDLE_ID,
        },
    });
    let token = sign_token(&claims, &chain);
    assert!(sandbox_verifier(&chain)
        .verify_and_decode_notification(&token)
        .is_ok());

    let mut claims = claims;
    claims["externalPurchaseToken"]["externalPurchaseId"] = json!("b2158121-7af9");
    let token = sign_token(&claims, &chain);

    let err = sandbox_verifier(&chain)
        .verify_and_decode_notification(&token)
        .unwrap_err();
    assert_eq!(err.status(), VerificationStatus::InvalidEnvironment);
}

#[test]
fn test_environments_decode_without_verification() {
    let verifier = SignedDataVerifier::new(
        Vec::new(),
        false,
        Environment::Xcode,
        BUNDLE_ID,
        None,
    )
    .unwrap();

    // No x5c and a signature that never verifies.
    let header = base64::encode_url_safe(b"{\"alg\":\"ES256\"}");
    let claims = transaction_claims("Xcode");
    let claims_b64 = base64::encode_url_safe(claims.to_string().as_bytes());
    let signature = base64::encode_url_safe(b"not a signature");
    let token = format!("{header}.{claims_b64}.{signature}");

    let payload = verifier
        .verify_and_decode_signed_transaction(&token)
        .unwrap();
    assert_eq!(payload.environment, Some(Environment::Xcode));
}

#[test]
fn non_es256_tokens_are_rejected() {
    let chain = test_chain();
    let header = json!({ "alg": "RS256", "x5c": chain.x5c() });
    let token = sign_token_with_header(
        &transaction_claims("Sandbox"),
        &header,
        &chain.leaf_key,
    );

    let err = sandbox_verifier(&chain)
        .verify_and_decode_signed_transaction(&token)
        .unwrap_err();
    assert_eq!(err.status(), VerificationStatus::VerificationFailure);
}

#[test]
fn tokens_without_a_chain_are_rejected() {
    let chain = test_chain();
    let token = sign_token_with_header(
        &transaction_claims("Sandbox"),
        &json!({ "alg": "ES256" }),
        &chain.leaf_key,
    );

    let err = sandbox_verifier(&chain)
        .verify_and_decode_signed_transaction(&token)
        .unwrap_err();
    assert_eq!(err.status(), VerificationStatus::VerificationFailure);
}

#[test]
fn tokens_signed_by_the_wrong_key_are_rejected() {
    let chain = test_chain();
    let header = json!({ "alg": "ES256", "x5c": chain.x5c() });
    let token = sign_token_with_header(
        &transaction_claims("Sandbox"),
        &header,
        &signing_key(0x42),
    );

    let err = sandbox_verifier(&chain)
        .verify_and_decode_signed_transaction(&token)
        .unwrap_err();
    assert_eq!(err.status(), VerificationStatus::VerificationFailure);
}

#[test]
fn malformed_tokens_are_rejected() {
    let chain = test_chain();
    let verifier = sandbox_verifier(&chain);

    for token in ["", "a.b", "a.b.c.d", "!!!.!!!.!!!"] {
        let err = verifier
            .verify_and_decode_signed_transaction(token)
            .unwrap_err();
        assert_eq!(
            err.status(),
            VerificationStatus::VerificationFailure,
            "token {token:?}"
        );
    }
}

#[test]
fn archived_payloads_verify_at_their_signing_date() {
    // A chain that expired a month ago, and a payload signed while it was
    // still valid.
    let chain = test_chain_with(ChainOptions {
        not_before: Utc::now() - Duration::days(400),
        not_after: Utc::now() - Duration::days(30),
        ..ChainOptions::default()
    });

    let mut claims = transaction_claims("Sandbox");
    claims["signedDate"] = json!((Utc::now() - Duration::days(60)).timestamp_millis());
    let token = sign_token(&claims, &chain);

    assert!(sandbox_verifier(&chain)
        .verify_and_decode_signed_transaction(&token)
        .is_ok());

    // Without a signing date the chain is checked against the current time
    // and fails.
    let mut claims = transaction_claims("Sandbox");
    claims.as_object_mut().unwrap().remove("signedDate");
    let token = sign_token(&claims, &chain);

    let err = sandbox_verifier(&chain)
        .verify_and_decode_signed_transaction(&token)
        .unwrap_err();
    assert_eq!(err.status(), VerificationStatus::VerificationFailure);
}
