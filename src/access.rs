// Role-based access control and user credentials

use crate::core::{salted_sha256, validate_field};
use crate::error::{LedgerError, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SALT_SIZE: usize = 16;

/// Ledger user role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    ReadOnly,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::ReadOnly => "read-only",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "nurse" => Ok(Role::Nurse),
            "read-only" | "readonly" => Ok(Role::ReadOnly),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Action::Read => write!(f, "read"),
            Action::Write => write!(f, "write"),
        }
    }
}

/// Decides whether a role may perform an action on a resource
pub trait AccessPolicy {
    fn allows(&self, role: Role, resource: &str, action: Action) -> bool;

    /// `allows` as a Result carrying an AccessDenied error
    fn authorize(&self, role: Role, resource: &str, action: Action) -> Result<()> {
        if self.allows(role, resource, action) {
            Ok(())
        } else {
            log::warn!("Access denied: {} {} {}", role, action, resource);
            Err(LedgerError::AccessDenied {
                role: role.to_string(),
                action: action.to_string(),
                resource: resource.to_string(),
            })
        }
    }
}

/// Fixed role table: nurses may only write vitals and medication records
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPolicy;

impl AccessPolicy for StaticPolicy {
    fn allows(&self, role: Role, resource: &str, action: Action) -> bool {
        match role {
            Role::Admin => true,
            Role::Doctor => true,
            Role::Nurse => match action {
                Action::Read => true,
                Action::Write => matches!(resource, "vitals" | "medication"),
            },
            Role::ReadOnly => action == Action::Read,
        }
    }
}

/// User credentials with a salted SHA256 password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(with = "hex_bytes")]
    password_hash: [u8; 32],
    #[serde(with = "hex_bytes")]
    salt: [u8; SALT_SIZE],
    pub role: Role,
}

impl User {
    /// Create a user with a fresh random salt
    pub fn new(username: &str, password: &str, role: Role) -> Result<Self> {
        validate_field("username", username)?;
        if password.is_empty() {
            return Err(LedgerError::validation("password", "must not be empty"));
        }

        let mut salt = [0u8; SALT_SIZE];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| crate::core::CipherError::Rng(e.to_string()))?;

        Ok(Self {
            username: username.to_string(),
            password_hash: salted_sha256(password.as_bytes(), &salt),
            salt,
            role,
        })
    }

    pub fn verify_password(&self, password: &str) -> bool {
        salted_sha256(password.as_bytes(), &self.salt) == self.password_hash
    }
}

mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(bytes: &[u8; N], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(d: D) -> Result<[u8; N], D::Error> {
        let text = String::deserialize(d)?;
        let bytes = hex::decode(&text).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| D::Error::custom(format!("expected {} bytes, got {}", N, v.len())))
    }
}
