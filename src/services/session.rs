//! Session identity resolution.
//!
//! Coding assistants disagree on header spelling, so the resolver
//! accepts a small alias set for each field. Explicit request
//! parameters win over headers, headers win over the configured
//! defaults. Whether a field was actually supplied (rather than
//! defaulted) is preserved, since some operations refuse to run
//! against the default session.

use crate::config::{IdentityConfig, IdentityPolicy};
use crate::models::Session;
use crate::{Error, Result};
use axum::http::HeaderMap;

/// Accepted spellings for the user id header.
const USER_HEADERS: &[&str] = &["x-user-id", "user-id", "user_id"];

/// Accepted spellings for the session id header.
const SESSION_HEADERS: &[&str] = &["mcp-session-id", "x-session-id", "session-id", "session_id"];

/// A resolved identity plus where its parts came from.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    /// The identity the request operates under.
    pub session: Session,
    /// Whether the user id was supplied rather than defaulted.
    pub user_supplied: bool,
    /// Whether the session id was supplied rather than defaulted.
    pub session_supplied: bool,
}

impl ResolvedSession {
    /// Fails with [`Error::SessionRequired`] unless the session id was
    /// actually supplied by the caller.
    pub fn require_supplied_session(&self) -> Result<&Session> {
        if self.session_supplied {
            Ok(&self.session)
        } else {
            Err(Error::SessionRequired)
        }
    }
}

/// Resolves (user, session) identity for each request.
#[derive(Debug, Clone)]
pub struct SessionResolver {
    config: IdentityConfig,
}

impl SessionResolver {
    /// Creates a resolver from the identity configuration.
    #[must_use]
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    /// Resolves the request identity.
    ///
    /// Under the strict policy a request with no user id anywhere fails
    /// with [`Error::MissingIdentity`]; under the permissive policy the
    /// configured defaults are substituted. An absent session id always
    /// falls back to the default session, but the fallback is recorded
    /// so session-bound operations can refuse it.
    pub fn resolve(
        &self,
        headers: &HeaderMap,
        explicit_user: Option<&str>,
        explicit_session: Option<&str>,
    ) -> Result<ResolvedSession> {
        let user = non_empty(explicit_user).or_else(|| first_header(headers, USER_HEADERS));
        let session =
            non_empty(explicit_session).or_else(|| first_header(headers, SESSION_HEADERS));

        let (user_id, user_supplied) = match user {
            Some(user) => (user, true),
            None => {
                if self.config.policy == IdentityPolicy::Strict {
                    return Err(Error::MissingIdentity);
                }
                (self.config.default_user_id.clone(), false)
            }
        };

        let (session_id, session_supplied) = session.map_or_else(
            || (self.config.default_session_id.clone(), false),
            |session| (session, true),
        );

        let mut session = Session::new(user_id, session_id)
            .with_agent_ids(self.config.agent_ids.clone());
        if let Some(group_id) = &self.config.group_id {
            session = session.with_group_id(group_id.clone());
        }

        Ok(ResolvedSession {
            session,
            user_supplied,
            session_supplied,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// A blank or non-UTF-8 value does not claim the alias; the scan
// continues to the next spelling.
fn first_header(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver(policy: IdentityPolicy) -> SessionResolver {
        SessionResolver::new(IdentityConfig {
            policy,
            ..IdentityConfig::default()
        })
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_explicit_beats_header() {
        let resolver = resolver(IdentityPolicy::Permissive);
        let headers = headers(&[("x-user-id", "header-user"), ("mcp-session-id", "header-s")]);

        let resolved = resolver
            .resolve(&headers, Some("param-user"), None)
            .unwrap();
        assert_eq!(resolved.session.user_id, "param-user");
        assert_eq!(resolved.session.session_id, "header-s");
        assert!(resolved.user_supplied);
        assert!(resolved.session_supplied);
    }

    #[test]
    fn test_header_aliases() {
        let resolver = resolver(IdentityPolicy::Permissive);
        for alias in USER_HEADERS {
            let headers = headers(&[(alias, "alice")]);
            let resolved = resolver.resolve(&headers, None, None).unwrap();
            assert_eq!(resolved.session.user_id, "alice", "alias {alias}");
        }
        for alias in SESSION_HEADERS {
            let headers = headers(&[(alias, "sess-9")]);
            let resolved = resolver.resolve(&headers, None, None).unwrap();
            assert_eq!(resolved.session.session_id, "sess-9", "alias {alias}");
        }
    }

    #[test]
    fn test_permissive_defaults() {
        let resolver = resolver(IdentityPolicy::Permissive);
        let resolved = resolver.resolve(&HeaderMap::new(), None, None).unwrap();
        assert_eq!(resolved.session.user_id, "default_user");
        assert_eq!(resolved.session.session_id, "default_session");
        assert!(!resolved.user_supplied);
        assert!(!resolved.session_supplied);
        assert!(matches!(
            resolved.require_supplied_session(),
            Err(Error::SessionRequired)
        ));
    }

    #[test]
    fn test_strict_rejects_missing_user() {
        let resolver = resolver(IdentityPolicy::Strict);
        assert!(matches!(
            resolver.resolve(&HeaderMap::new(), None, None),
            Err(Error::MissingIdentity)
        ));

        // A supplied user is enough even without a session.
        let headers = headers(&[("user_id", "alice")]);
        let resolved = resolver.resolve(&headers, None, None).unwrap();
        assert_eq!(resolved.session.user_id, "alice");
        assert!(!resolved.session_supplied);
    }

    #[test]
    fn test_configured_group_and_agents_are_stamped() {
        let resolver = SessionResolver::new(IdentityConfig {
            group_id: Some("platform".to_string()),
            agent_ids: vec!["cursor".to_string()],
            ..IdentityConfig::default()
        });
        let resolved = resolver.resolve(&HeaderMap::new(), None, None).unwrap();
        assert_eq!(resolved.session.group_id.as_deref(), Some("platform"));
        assert_eq!(resolved.session.agent_ids, vec!["cursor".to_string()]);
    }

    #[test]
    fn test_blank_values_are_absent() {
        let resolver = resolver(IdentityPolicy::Permissive);
        let headers = headers(&[("x-user-id", "  ")]);
        let resolved = resolver.resolve(&headers, Some(""), None).unwrap();
        assert!(!resolved.user_supplied);
        assert_eq!(resolved.session.user_id, "default_user");
    }

    #[test]
    fn test_blank_alias_does_not_mask_later_alias() {
        let resolver = resolver(IdentityPolicy::Permissive);
        let headers = headers(&[("x-user-id", "  "), ("user-id", "alice")]);
        let resolved = resolver.resolve(&headers, None, None).unwrap();
        assert!(resolved.user_supplied);
        assert_eq!(resolved.session.user_id, "alice");
    }
}
