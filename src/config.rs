use bitflags::bitflags;

use crate::utils::validate_netbios_name;

/// How this server participates in a domain. Pass-through validation is only
/// ever attempted for a domain member; a standalone server always resolves
/// logons against its own credential store.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ServerRole {
    Standalone,
    DomainMember,
}

bitflags! {
    /// Challenge-response methods the local matcher is allowed to try.
    /// Each generation can be enabled or disabled independently.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct AuthPolicy: u32 {
        const LM = 0x0000_0001;
        const NTLM = 0x0000_0002;
        const LMV2 = 0x0000_0004;
        const NTLMV2 = 0x0000_0008;
    }
}

impl Default for AuthPolicy {
    fn default() -> Self {
        AuthPolicy::all()
    }
}

/// Static configuration of the authentication engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub role: ServerRole,
    pub computer_name: String,
    pub domain_name: String,
    pub policy: AuthPolicy,
}

impl EngineConfig {
    /// Both names are NetBIOS-style and are validated up front, before the
    /// configuration can reach any code path that talks to the network.
    /// A standalone server has no domain and may leave the name empty; a
    /// domain member must name one.
    pub fn new(role: ServerRole, computer_name: &str, domain_name: &str) -> crate::Result<Self> {
        validate_netbios_name(computer_name)?;
        if role == ServerRole::DomainMember || !domain_name.is_empty() {
            validate_netbios_name(domain_name)?;
        }

        Ok(Self {
            role,
            computer_name: computer_name.to_owned(),
            domain_name: domain_name.to_owned(),
            policy: AuthPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: AuthPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn oversized_computer_name_is_rejected() {
        let err = EngineConfig::new(ServerRole::DomainMember, "WORKSTATION-0001", "CORP").unwrap_err();

        assert_eq!(err.error_type, ErrorKind::InvalidParameter);
    }

    #[test]
    fn standalone_server_accepts_an_empty_domain() {
        let config = EngineConfig::new(ServerRole::Standalone, "SRV01", "").unwrap();

        assert!(config.domain_name.is_empty());
    }

    #[test]
    fn domain_member_requires_a_domain() {
        let err = EngineConfig::new(ServerRole::DomainMember, "SRV01", "").unwrap_err();

        assert_eq!(err.error_type, ErrorKind::InvalidParameter);
    }

    #[test]
    fn oversized_domain_is_rejected_for_standalone_too() {
        let err = EngineConfig::new(ServerRole::Standalone, "SRV01", "ADOMAINNAMETOOLONG").unwrap_err();

        assert_eq!(err.error_type, ErrorKind::InvalidParameter);
    }

    #[test]
    fn default_policy_enables_every_method() {
        let config = EngineConfig::new(ServerRole::Standalone, "SRV01", "CORP").unwrap();

        assert!(config.policy.contains(AuthPolicy::LM | AuthPolicy::NTLM | AuthPolicy::LMV2 | AuthPolicy::NTLMV2));
    }
}
