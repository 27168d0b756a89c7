//! Claims-based principals

use serde::{Deserialize, Serialize};

/// Short role claim type checked before roles are resolved
pub const ROLE_CLAIM: &str = "role";

/// Long-form role claim type, added alongside [`ROLE_CLAIM`]
pub const ROLE_CLAIM_URI: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";

/// Display name claim type
pub const NAME_CLAIM: &str = "name";

/// A single statement about a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// A set of claims issued together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// How the identity was authenticated; `None` for unauthenticated
    /// identities such as those carrying derived claims
    pub authentication_type: Option<String>,
    pub claims: Vec<Claim>,
}

impl Identity {
    pub fn new(authentication_type: Option<String>, claims: Vec<Claim>) -> Self {
        Self {
            authentication_type,
            claims,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authentication_type.is_some()
    }
}

/// The user behind a request, made of one or more identities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub identities: Vec<Identity>,
}

impl Principal {
    /// A principal with no identities
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A principal with one authenticated identity
    pub fn authenticated(authentication_type: impl Into<String>, claims: Vec<Claim>) -> Self {
        Self {
            identities: vec![Identity::new(Some(authentication_type.into()), claims)],
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identities.iter().any(Identity::is_authenticated)
    }

    pub fn add_identity(&mut self, identity: Identity) {
        self.identities.push(identity);
    }

    /// All claims across identities
    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.identities.iter().flat_map(|i| i.claims.iter())
    }

    /// Whether any claim has exactly this type
    pub fn has_claim_type(&self, claim_type: &str) -> bool {
        self.claims().any(|c| c.claim_type == claim_type)
    }

    /// Value of the first claim of this type, compared case-insensitively
    pub fn find_first(&self, claim_type: &str) -> Option<&str> {
        self.claims()
            .find(|c| c.claim_type.eq_ignore_ascii_case(claim_type))
            .map(|c| c.value.as_str())
    }

    /// Roles carried by either role claim type
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self
            .claims()
            .filter(|c| c.claim_type == ROLE_CLAIM || c.claim_type == ROLE_CLAIM_URI)
            .map(|c| c.value.as_str())
            .collect();
        roles.sort_unstable();
        roles.dedup();
        roles
    }

    pub fn is_in_role(&self, role: &str) -> bool {
        self.roles().contains(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_first_ignores_claim_type_case() {
        let principal = Principal::authenticated(
            "Fake",
            vec![Claim::new("preferred_username", "Maria")],
        );
        assert_eq!(principal.find_first("Preferred_UserName"), Some("Maria"));
        assert!(principal.is_authenticated());
        assert!(!principal.has_claim_type(ROLE_CLAIM));
    }

    #[test]
    fn test_roles_from_added_identity() {
        let mut principal = Principal::authenticated("Fake", vec![]);
        principal.add_identity(Identity::new(
            None,
            vec![
                Claim::new(ROLE_CLAIM, "admin"),
                Claim::new(ROLE_CLAIM_URI, "admin"),
            ],
        ));
        assert_eq!(principal.roles(), vec!["admin"]);
        assert!(principal.is_in_role("admin"));
        assert!(!principal.is_in_role("user"));
    }

    #[test]
    fn test_anonymous() {
        let principal = Principal::anonymous();
        assert!(!principal.is_authenticated());
        assert_eq!(principal.claims().count(), 0);
    }
}
