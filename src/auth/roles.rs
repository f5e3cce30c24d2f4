// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal roles and the capabilities each one carries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Role carried in the `role` claim.
///
/// | Role        | Vaults & intents | Audit trail / pool | Worker registry | Relay owner contexts |
/// |-------------|------------------|--------------------|-----------------|----------------------|
/// | `client`    | own only         | -                  | -               | own only             |
/// | `auditor`   | -                | read               | -               | -                    |
/// | `custodian` | -                | -                  | -               | any                  |
/// | `admin`     | -                | read               | deactivate      | any                  |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    /// Vault owner. Tokens without a recognised role get this one.
    #[default]
    Client,
    Auditor,
    /// Decryption custodian forwarding owner requests to the gateway.
    Custodian,
}

impl Role {
    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }

    /// Pool balances and the audit trail.
    pub fn can_audit(self) -> bool {
        matches!(self, Role::Admin | Role::Auditor)
    }

    /// Submit owner decryption contexts on behalf of another principal.
    pub fn can_relay_owner_contexts(self) -> bool {
        matches!(self, Role::Admin | Role::Custodian)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
            Role::Auditor => "auditor",
            Role::Custodian => "custodian",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "client" => Ok(Role::Client),
            "auditor" => Ok(Role::Auditor),
            "custodian" => Ok(Role::Custodian),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
