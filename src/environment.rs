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

//! The server environment a payload was produced in.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server environment a signed payload claims to originate from, or that a
/// verifier is configured to expect.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Environment {
    /// The live App Store.
    Production,

    /// The App Store sandbox.
    Sandbox,

    /// Local testing inside Xcode. Payloads in this environment carry no
    /// usable trust chain.
    Xcode,

    /// StoreKit local-testing tooling. Payloads in this environment carry no
    /// usable trust chain.
    LocalTesting,
}

impl Environment {
    /// The two non-production test environments decode payloads without any
    /// signature verification; there is no real trust chain to verify
    /// against.
    pub(crate) fn skips_signature_verification(self) -> bool {
        matches!(self, Self::Xcode | Self::LocalTesting)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "Production"),
            Self::Sandbox => write!(f, "Sandbox"),
            Self::Xcode => write!(f, "Xcode"),
            Self::LocalTesting => write!(f, "LocalTesting"),
        }
    }
}
