//! Who may act on a credential
//!
//! Registration and authentication live outside the relayer; it only needs the role and
//! organization of an address, provided by a [PrincipalDirectory].

use crate::error::ConfigError;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Debug, fs, path::Path};

/// Platform role of a principal
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Platform administrator, may act on every credential
    Admin,
    #[default]
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub address: Address,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub role: Role,
}

/// Lookup of principals by address
pub trait PrincipalDirectory: Send + Sync + Debug {
    fn principal(&self, address: &Address) -> Option<Principal>;
}

/// Directory loaded once at startup
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    principals: HashMap<Address, Principal>,
}

impl StaticDirectory {
    pub fn new(principals: impl IntoIterator<Item = Principal>) -> Self {
        Self { principals: principals.into_iter().map(|p| (p.address, p)).collect() }
    }

    /// Reads a JSON array of principals
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid { name: "directory file", reason };
        let content = fs::read_to_string(path).map_err(|err| invalid(err.to_string()))?;
        let principals: Vec<Principal> =
            serde_json::from_str(&content).map_err(|err| invalid(err.to_string()))?;
        Ok(Self::new(principals))
    }

    /// Grants the admin role to `admins`, keeping their organization if known
    pub fn with_admins(mut self, admins: &[Address]) -> Self {
        for address in admins {
            self.principals
                .entry(*address)
                .or_insert_with(|| Principal {
                    address: *address,
                    organization: None,
                    role: Role::Admin,
                })
                .role = Role::Admin;
        }
        self
    }
}

impl PrincipalDirectory for StaticDirectory {
    fn principal(&self, address: &Address) -> Option<Principal> {
        self.principals.get(address).cloned()
    }
}

/// Whether `caller` may verify, reject or revoke a credential issued by `issuer`
///
/// Allowed are the issuer itself, platform administrators and members of the issuer's
/// organization.
pub fn is_authorized(
    directory: &dyn PrincipalDirectory,
    caller: &Address,
    issuer: &Address,
) -> bool {
    if caller == issuer {
        return true;
    }

    let Some(caller) = directory.principal(caller) else {
        return false;
    };
    if caller.role == Role::Admin {
        return true;
    }

    match (caller.organization, directory.principal(issuer).and_then(|p| p.organization)) {
        (Some(caller_org), Some(issuer_org)) => caller_org == issuer_org,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(byte: u8, organization: Option<&str>) -> Principal {
        Principal {
            address: Address::repeat_byte(byte),
            organization: organization.map(String::from),
            role: Role::Member,
        }
    }

    #[test]
    fn authorization_rules() {
        let admin = Address::repeat_byte(0xad);
        let directory = StaticDirectory::new([
            member(1, Some("acme")),
            member(2, Some("acme")),
            member(3, Some("globex")),
            member(4, None),
        ])
        .with_admins(&[admin]);
        let issuer = Address::repeat_byte(1);

        assert!(is_authorized(&directory, &issuer, &issuer));
        assert!(is_authorized(&directory, &admin, &issuer));
        assert!(is_authorized(&directory, &Address::repeat_byte(2), &issuer));
        assert!(!is_authorized(&directory, &Address::repeat_byte(3), &issuer));
        assert!(!is_authorized(&directory, &Address::repeat_byte(4), &issuer));
        assert!(!is_authorized(&directory, &Address::repeat_byte(9), &issuer));
        // no organization on either side
        assert!(!is_authorized(&directory, &Address::repeat_byte(4), &Address::repeat_byte(8)));
    }

    #[test]
    fn directory_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("directory.json");
        fs::write(
            &path,
            r#"[
                {"address": "0x0101010101010101010101010101010101010101", "organization": "acme"},
                {"address": "0x0202020202020202020202020202020202020202", "role": "admin"}
            ]"#,
        )
        .unwrap();

        let directory = StaticDirectory::from_file(&path).unwrap();
        assert_eq!(directory.principal(&Address::repeat_byte(1)), Some(member(1, Some("acme"))));
        assert_eq!(directory.principal(&Address::repeat_byte(2)).unwrap().role, Role::Admin);

        fs::write(&path, "not json").unwrap();
        assert!(matches!(StaticDirectory::from_file(&path), Err(ConfigError::Invalid { .. })));
    }
}
