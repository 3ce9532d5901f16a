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

//! Typed decoded payloads, one per signed payload kind.
//!
//! All date fields are milliseconds since the Unix epoch, as transmitted.
//! Every field is optional: the claims are attacker-influenced until the
//! signature has been verified, and the server adds fields over time.

use serde::Deserialize;

use crate::environment::Environment;

/// Decoded subscription renewal information.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwsRenewalInfoDecodedPayload {
    /// Environment the renewal info was signed in.
    pub environment: Option<Environment>,

    /// Original transaction identifier of the subscription.
    pub original_transaction_id: Option<String>,

    /// Product identifier the subscription will renew to.
    pub auto_renew_product_id: Option<String>,

    /// Currently subscribed product identifier.
    pub product_id: Option<String>,

    /// Auto-renew preference (0 = off, 1 = on).
    pub auto_renew_status: Option<i32>,

    /// Time the payload was signed.
    pub signed_date: Option<i64>,

    /// Earliest start date of the current run of subscription periods.
    pub recent_subscription_start_date: Option<i64>,
}

/// Decoded in-app purchase transaction.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwsTransactionDecodedPayload {
    /// Bundle identifier of the app the purchase was made in.
    pub bundle_id: Option<String>,

    /// Product identifier of the purchased item.
    pub product_id: Option<String>,

    /// Unique identifier of this transaction.
    pub transaction_id: Option<String>,

    /// Identifier of the first transaction in the chain of renewals.
    pub original_transaction_id: Option<String>,

    /// Environment the transaction was signed in.
    pub environment: Option<Environment>,

    /// Product type, e.g. `Auto-Renewable Subscription`.
    #[serde(rename = "type")]
    pub product_type: Option<String>,

    /// Purchase date.
    pub purchase_date: Option<i64>,

    /// Time the payload was signed.
    pub signed_date: Option<i64>,

    /// Ownership relation, e.g. `PURCHASED` or `FAMILY_SHARED`.
    pub in_app_ownership_type: Option<String>,
}

/// Decoded App Store server notification (version 2).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBodyV2DecodedPayload {
    /// Notification type, e.g. `SUBSCRIBED`.
    pub notification_type: Option<String>,

    /// Notification subtype, if any.
    pub subtype: Option<String>,

    /// Unique identifier of this notification delivery.
    #[serde(rename = "notificationUUID")]
    pub notification_uuid: Option<String>,

    /// Notification schema version.
    pub version: Option<String>,

    /// Time the payload was signed.
    pub signed_date: Option<i64>,

    /// App metadata and signed transaction info. Exactly one of `data`,
    /// `summary`, `external_purchase_token`, and `app_data` is populated.
    pub data: Option<NotificationData>,

    /// Summary of a completed bulk operation.
    pub summary: Option<NotificationSummary>,

    /// External purchase token, for external-purchase notifications.
    pub external_purchase_token: Option<ExternalPurchaseToken>,

    /// App-level metadata, for app-scoped notifications.
    pub app_data: Option<NotificationAppData>,
}

/// App metadata and signed transaction info carried by most notifications.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Environment the notification applies to.
    pub environment: Option<Environment>,

    /// App Store identifier of the app.
    pub app_apple_id: Option<i64>,

    /// Bundle identifier of the app.
    pub bundle_id: Option<String>,

    /// Version of the app the notification applies to.
    pub bundle_version: Option<String>,

    /// Signed transaction token, verifiable separately.
    pub signed_transaction_info: Option<String>,

    /// Signed renewal-info token, verifiable separately.
    pub signed_renewal_info: Option<String>,

    /// Subscription status at the time of the notification.
    pub status: Option<i32>,
}

/// Summary of a completed bulk operation (e.g. a subscription-extension
/// request covering many subscribers).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSummary {
    /// Environment the operation ran in.
    pub environment: Option<Environment>,

    /// App Store identifier of the app.
    pub app_apple_id: Option<i64>,

    /// Bundle identifier of the app.
    pub bundle_id: Option<String>,

    /// Product identifier the operation applied to.
    pub product_id: Option<String>,

    /// Identifier of the originating request.
    pub request_identifier: Option<String>,

    /// Number of subscribers the operation succeeded for.
    pub succeeded_count: Option<i64>,

    /// Number of subscribers the operation failed for.
    pub failed_count: Option<i64>,
}

/// Token describing a purchase made through an external purchase system.
///
/// This payload carries no environment field; the environment is inferred
/// from the purchase identifier (a `SANDBOX` prefix marks the sandbox).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalPurchaseToken {
    /// Unique identifier of the external purchase.
    pub external_purchase_id: Option<String>,

    /// Time the token was created.
    pub token_creation_date: Option<i64>,

    /// App Store identifier of the app.
    pub app_apple_id: Option<i64>,

    /// Bundle identifier of the app.
    pub bundle_id: Option<String>,
}

/// App-level metadata carried by app-scoped notifications.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAppData {
    /// Environment the notification applies to.
    pub environment: Option<Environment>,

    /// App Store identifier of the app.
    pub app_apple_id: Option<i64>,

    /// Bundle identifier of the app.
    pub bundle_id: Option<String>,
}

/// Decoded app transaction: signed information about the app download
/// itself rather than an in-app purchase.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppTransaction {
    /// Environment the app transaction was signed in. The field is named
    /// `receiptType` on the wire for historical reasons.
    pub receipt_type: Option<Environment>,

    /// App Store identifier of the app.
    pub app_apple_id: Option<i64>,

    /// Bundle identifier of the app.
    pub bundle_id: Option<String>,

    /// Version of the app the transaction was created for.
    pub application_version: Option<String>,

    /// App version the user originally purchased.
    pub original_application_version: Option<String>,

    /// Identifier of the downloaded app version.
    pub version_external_identifier: Option<i64>,

    /// Time the app transaction was signed.
    pub receipt_creation_date: Option<i64>,

    /// Original purchase date of the app.
    pub original_purchase_date: Option<i64>,

    /// Opaque value used for on-device verification.
    pub device_verification: Option<String>,

    /// Nonce paired with `device_verification`.
    pub device_verification_nonce: Option<String>,
}

/// Decoded realtime request sent by the App Store to the developer's server
/// while a user interaction is in flight.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeRequestDecodedPayload {
    /// Unique identifier of this request.
    pub request_identifier: Option<String>,

    /// App Store identifier of the app.
    pub app_apple_id: Option<i64>,

    /// Bundle identifier of the app.
    pub bundle_id: Option<String>,

    /// Environment the request was signed in.
    pub environment: Option<Environment>,

    /// Time the payload was signed.
    pub signed_date: Option<i64>,
}
