//! Authorization policies evaluated against a [`Principal`]

use super::principal::Principal;

/// Authorization policy for an operation
#[derive(Debug, Clone)]
pub enum AuthPolicy {
    /// Public access (no auth required)
    Public,

    /// Any authenticated user
    Authenticated,

    /// User must have one of these roles
    HasRole(Vec<String>),

    /// Combination of policies (AND)
    And(Vec<AuthPolicy>),

    /// Combination of policies (OR)
    Or(Vec<AuthPolicy>),

    /// Custom policy function
    Custom(fn(&Principal) -> bool),
}

impl AuthPolicy {
    /// Check if the principal satisfies this policy
    pub fn check(&self, principal: &Principal) -> bool {
        match self {
            AuthPolicy::Public => true,

            AuthPolicy::Authenticated => principal.is_authenticated(),

            AuthPolicy::HasRole(required_roles) => {
                principal.is_authenticated()
                    && required_roles.iter().any(|r| principal.is_in_role(r))
            }

            AuthPolicy::And(policies) => policies.iter().all(|p| p.check(principal)),

            AuthPolicy::Or(policies) => policies.iter().any(|p| p.check(principal)),

            AuthPolicy::Custom(f) => f(principal),
        }
    }

    /// Whether failing this policy means the caller must authenticate first
    pub fn requires_authentication(&self) -> bool {
        !matches!(self, AuthPolicy::Public)
    }

    /// Parse policy from string (for YAML config)
    ///
    /// `role:a,b` accepts any of the listed roles.
    pub fn parse_policy(s: &str) -> Self {
        match s {
            "public" => AuthPolicy::Public,
            "authenticated" => AuthPolicy::Authenticated,
            s => match s.strip_prefix("role:") {
                Some(roles) => AuthPolicy::HasRole(
                    roles
                        .split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string)
                        .collect(),
                ),
                None => AuthPolicy::Authenticated,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::principal::{Claim, ROLE_CLAIM};

    fn user_with_roles(roles: &[&str]) -> Principal {
        Principal::authenticated(
            "Test",
            roles.iter().map(|r| Claim::new(ROLE_CLAIM, *r)).collect(),
        )
    }

    #[test]
    fn test_policy_check() {
        let admin = user_with_roles(&["admin"]);
        assert!(AuthPolicy::Authenticated.check(&admin));
        assert!(AuthPolicy::HasRole(vec!["admin".into()]).check(&admin));
        assert!(!AuthPolicy::HasRole(vec!["IT".into()]).check(&admin));

        let anonymous = Principal::anonymous();
        assert!(AuthPolicy::Public.check(&anonymous));
        assert!(!AuthPolicy::Authenticated.check(&anonymous));
    }

    #[test]
    fn test_policy_check_and_one_fails() {
        let viewer = user_with_roles(&["readonly"]);
        let policy = AuthPolicy::And(vec![
            AuthPolicy::Authenticated,
            AuthPolicy::HasRole(vec!["admin".into()]),
        ]);
        assert!(!policy.check(&viewer));
    }

    #[test]
    fn test_policy_check_or_one_passes() {
        let user = user_with_roles(&["user"]);
        let policy = AuthPolicy::Or(vec![
            AuthPolicy::HasRole(vec!["admin".into()]),
            AuthPolicy::HasRole(vec!["user".into()]),
        ]);
        assert!(policy.check(&user));
    }

    #[test]
    fn test_policy_check_custom() {
        fn has_two_identities(p: &Principal) -> bool {
            p.identities.len() == 2
        }
        let policy = AuthPolicy::Custom(has_two_identities);
        assert!(!policy.check(&user_with_roles(&[])));
    }

    #[test]
    fn test_parse_policy() {
        assert!(matches!(AuthPolicy::parse_policy("public"), AuthPolicy::Public));
        assert!(matches!(
            AuthPolicy::parse_policy("authenticated"),
            AuthPolicy::Authenticated
        ));
        match AuthPolicy::parse_policy("role:admin, IT") {
            AuthPolicy::HasRole(roles) => assert_eq!(roles, vec!["admin", "IT"]),
            other => panic!("Expected HasRole, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_policy_unknown_defaults_to_authenticated() {
        assert!(matches!(
            AuthPolicy::parse_policy("something_unknown"),
            AuthPolicy::Authenticated
        ));
    }
}
