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

//! Best-effort transaction identifier extraction from legacy receipts.
//!
//! These receipts carry no signature this crate can anchor to a trusted
//! root, so nothing here is authoritative: the extractors answer "what
//! transaction does this blob claim to describe" and the caller is expected
//! to confirm it against the server. "No identifier present" is a success
//! (`Ok(None)`), never conflated with a parse error.

pub mod asn1;

use thiserror::Error;

use crate::{
    base64,
    receipt::asn1::{Asn1Cursor, Asn1Error, Tag, Value},
};

/// Errors raised while decoding a receipt blob.
///
/// These are local format errors about the caller's input, deliberately
/// separate from the signed-payload verification statuses: a malformed
/// receipt is not a security judgment about an issuer.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// The receipt (or a nested field of it) is not valid base 64.
    #[error("receipt is not valid base64")]
    InvalidBase64,

    /// The blob decoded but does not match the fixed receipt schema.
    #[error("receipt does not match the expected structure")]
    MalformedReceipt,

    /// Structural BER/DER failure while walking the receipt.
    #[error(transparent)]
    Asn1(#[from] Asn1Error),
}

/// PKCS#7 signed-data content type.
const SIGNED_DATA_OID: &str = "1.2.840.113549.1.7.2";

/// Receipt attribute type marking an in-app purchase array.
const IN_APP_ARRAY_TYPE: i64 = 17;

/// In-app attribute type carrying the transaction identifier.
const TRANSACTION_ID_TYPE: i64 = 1703;

/// In-app attribute type carrying the original transaction identifier.
const ORIGINAL_TRANSACTION_ID_TYPE: i64 = 1705;

/// Extract a transaction identifier from a base64-encoded PKCS#7 app
/// receipt.
///
/// The receipt payload is walked along the one structural path App Store
/// receipts are known to use; this is not a general PKCS#7 parser, and any
/// other shape is a [`ReceiptError`]. A receipt with no in-app purchase
/// attributes yields `Ok(None)`.
pub fn extract_transaction_id_from_app_receipt(
    app_receipt: &str,
) -> Result<Option<String>, ReceiptError> {
    let der = base64::decode(app_receipt).map_err(|_| ReceiptError::InvalidBase64)?;
    let mut cursor = Asn1Cursor::with_indefinite_lengths(&der);

    // ContentInfo ::= SEQUENCE { contentType OID, content [0] EXPLICIT }
    cursor.enter()?;
    match cursor.read()? {
        (_, Value::ObjectIdentifier(oid)) if oid == SIGNED_DATA_OID => {}
        _ => return Err(ReceiptError::MalformedReceipt),
    }
    cursor.enter()?; // content [0]

    // SignedData ::= SEQUENCE { version, digestAlgorithms, contentInfo, .. }
    cursor.enter()?;
    cursor.read()?; // version
    cursor.read()?; // digestAlgorithms

    // Encapsulated content: SEQUENCE { contentType OID, [0] OCTET STRING }
    cursor.enter()?;
    cursor.read()?; // contentType
    cursor.enter()?; // [0]

    let (tag, value) = cursor.read()?;
    if tag.class != 0 || tag.number != 4 {
        return Err(ReceiptError::MalformedReceipt);
    }
    let mut payload = value
        .as_octet_string()
        .ok_or(ReceiptError::MalformedReceipt)?;

    // One sandbox/test-tool variant wraps the payload in a constructed
    // OCTET STRING holding the real primitive one; unwrap a single level.
    if tag.constructed {
        let mut inner = Asn1Cursor::with_indefinite_lengths(payload);
        match inner.read()? {
            (_, Value::OctetString(bytes)) => payload = bytes,
            _ => return Err(ReceiptError::MalformedReceipt),
        }
    }

    find_in_app_transaction_id(payload)
}

/// Walk the receipt attribute SET looking for the in-app purchase array,
/// then scan each purchase for a transaction identifier.
fn find_in_app_transaction_id(payload: &[u8]) -> Result<Option<String>, ReceiptError> {
    let mut cursor = Asn1Cursor::with_indefinite_lengths(payload);
    cursor.enter()?; // attribute SET

    while has_next_value(&cursor) {
        cursor.enter()?; // attribute SEQUENCE

        if read_attribute_type(&mut cursor)? == IN_APP_ARRAY_TYPE {
            cursor.read()?; // attribute version
            let (_, value) = cursor.read()?;
            let purchase = value
                .as_octet_string()
                .ok_or(ReceiptError::MalformedReceipt)?;

            if let Some(id) = find_purchase_transaction_id(purchase)? {
                return Ok(Some(id));
            }
        }

        cursor.leave()?;
    }

    Ok(None)
}

/// Scan one in-app purchase attribute SET for a transaction identifier
/// (type 1703) or original transaction identifier (type 1705).
fn find_purchase_transaction_id(purchase: &[u8]) -> Result<Option<String>, ReceiptError> {
    let mut cursor = Asn1Cursor::with_indefinite_lengths(purchase);
    cursor.enter()?; // attribute SET

    while has_next_value(&cursor) {
        cursor.enter()?; // attribute SEQUENCE

        let attribute_type = read_attribute_type(&mut cursor)?;
        if attribute_type == TRANSACTION_ID_TYPE || attribute_type == ORIGINAL_TRANSACTION_ID_TYPE
        {
            cursor.read()?; // attribute version
            let (_, value) = cursor.read()?;
            let raw = value
                .as_octet_string()
                .ok_or(ReceiptError::MalformedReceipt)?;

            // The attribute value is itself a DER-encoded string.
            let mut inner = Asn1Cursor::with_indefinite_lengths(raw);
            return match inner.read()? {
                (_, Value::Text(text)) => Ok(Some(text.to_string())),
                _ => Err(ReceiptError::MalformedReceipt),
            };
        }

        cursor.leave()?;
    }

    Ok(None)
}

/// Read the leading INTEGER type tag of an attribute SEQUENCE.
fn read_attribute_type(cursor: &mut Asn1Cursor<'_>) -> Result<i64, ReceiptError> {
    match cursor.read()? {
        (_, Value::Integer(value)) => Ok(value),
        _ => Err(ReceiptError::MalformedReceipt),
    }
}

/// True while the current frame still holds a real value. An end-of-content
/// marker (left behind by indefinite-length encodings) counts as the end.
fn has_next_value(cursor: &Asn1Cursor<'_>) -> bool {
    if cursor.remaining() == 0 {
        return false;
    }

    !matches!(
        cursor.peek(),
        Ok(Tag {
            class: 0,
            constructed: false,
            number: 0,
        })
    )
}

/// Extract the transaction identifier from a base64-encoded legacy
/// (non-ASN.1) transaction receipt.
///
/// The format is a bracketed plain-text key/value blob; no grammar is
/// parsed beyond two fixed extractions: the base64 `purchase-info` field,
/// and the `transaction-id` field inside it. A receipt missing either
/// field yields `Ok(None)`.
pub fn extract_transaction_id_from_transaction_receipt(
    transaction_receipt: &str,
) -> Result<Option<String>, ReceiptError> {
    let decoded = base64::decode(transaction_receipt).map_err(|_| ReceiptError::InvalidBase64)?;
    let text = String::from_utf8_lossy(&decoded);

    let Some(purchase_info_b64) = extract_field(&text, "purchase-info") else {
        return Ok(None);
    };

    let purchase_info =
        base64::decode(purchase_info_b64).map_err(|_| ReceiptError::InvalidBase64)?;
    let purchase_text = String::from_utf8_lossy(&purchase_info);

    Ok(extract_field(&purchase_text, "transaction-id").map(str::to_string))
}

/// Find `"key" = "value";` in a bracketed plain-text receipt and return the
/// value.
fn extract_field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("\"{key}\" = \"");
    let start = text.find(&needle)? + needle.len();
    let rest = &text[start..];
    let end = rest.find("\";")?;
    Some(&rest[..end])
}
