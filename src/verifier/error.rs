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

use std::fmt;

use thiserror::Error;

/// Status attached to every verification failure. Success carries no
/// status, only the typed decoded payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerificationStatus {
    /// Generic structural or cryptographic rejection: bad signature, chain
    /// that doesn't reach a trusted root, missing required certificate
    /// extension, or malformed input.
    VerificationFailure,

    /// Decoded bundle identifier or application identifier disagrees with
    /// the verifier's configuration.
    InvalidAppIdentifier,

    /// A supplied certificate (root or chain member) is not parseable
    /// base 64 or DER.
    InvalidCertificate,

    /// The `x5c` header did not contain exactly three certificates.
    InvalidChainLength,

    /// Decoded environment disagrees with the verifier's configuration and
    /// no override applies.
    InvalidEnvironment,

    /// A network-layer failure while contacting an OCSP responder. The
    /// verifier never retries internally; retrying is at the caller's
    /// discretion.
    RetryableVerificationFailure,
}

impl VerificationStatus {
    /// Whether a retry of the same call could plausibly succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RetryableVerificationFailure)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VerificationFailure => "VERIFICATION_FAILURE",
            Self::InvalidAppIdentifier => "INVALID_APP_IDENTIFIER",
            Self::InvalidCertificate => "INVALID_CERTIFICATE",
            Self::InvalidChainLength => "INVALID_CHAIN_LENGTH",
            Self::InvalidEnvironment => "INVALID_ENVIRONMENT",
            Self::RetryableVerificationFailure => "RETRYABLE_VERIFICATION_FAILURE",
        };
        f.write_str(name)
    }
}

/// A failed verification, carrying one of the [`VerificationStatus`]
/// codes and a human-readable message for the log.
#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct VerificationError {
    status: VerificationStatus,
    message: String,
}

impl VerificationError {
    pub(crate) fn new(status: VerificationStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Status code describing the failure.
    pub fn status(&self) -> VerificationStatus {
        self.status
    }
}
