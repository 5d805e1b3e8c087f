//! Infra-tagged environment values.
//!
//! Every value a package exports is stored as `<infra>:<raw>` so it can be
//! resolved later by the backend that produced it.

use std::sync::Arc;

use hereya_iac::EnvMap;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::infrastructure::InfrastructureRegistry;

/// Prefix marking a masked secret in resolved output.
pub const SECRET_PREFIX: &str = "secret://";

/// `tag("v", "local") == "local:v"`.
pub fn tag(value: &str, infra: &str) -> String {
    format!("{}:{}", infra, value)
}

/// Tag every value of an exported env map.
pub fn tag_env(env: &EnvMap, infra: &str) -> EnvMap {
    env.iter()
        .map(|(key, value)| (key.clone(), tag(value, infra)))
        .collect()
}

/// Split a tagged value at the first `:` into `(infra, raw)`.
pub fn split(tagged: &str) -> CoreResult<(&str, &str)> {
    match tagged.split_once(':') {
        Some((infra, raw)) if !infra.is_empty() => Ok((infra, raw)),
        _ => Err(CoreError::EnvResolutionFailure {
            value: tagged.to_string(),
            reason: "value carries no infrastructure tag".to_string(),
        }),
    }
}

/// Resolves tagged values through the infrastructure registry.
#[derive(Debug, Clone)]
pub struct EnvNamespace {
    infra: Arc<InfrastructureRegistry>,
}

impl EnvNamespace {
    pub fn new(infra: Arc<InfrastructureRegistry>) -> Self {
        Self { infra }
    }

    /// Resolve one tagged value. With `mark_secret`, secret values come back
    /// as `secret://<value>`.
    pub async fn resolve(&self, tagged: &str, mark_secret: bool) -> CoreResult<String> {
        let (infra, raw) = split(tagged)?;
        let adapter = self
            .infra
            .get(infra)
            .ok_or_else(|| CoreError::EnvResolutionFailure {
                value: tagged.to_string(),
                reason: format!("unknown infrastructure type '{}'", infra),
            })?;

        let resolved = adapter.resolve_env(raw).await?;
        if mark_secret && resolved.is_secret {
            return Ok(format!("{}{}", SECRET_PREFIX, resolved.value));
        }
        Ok(resolved.value)
    }

    /// Resolve every value of a tagged env map.
    pub async fn resolve_all(&self, env: &EnvMap, mark_secret: bool) -> CoreResult<EnvMap> {
        let mut resolved = EnvMap::new();
        for (key, tagged) in env {
            debug!("Resolving env {}", key);
            resolved.insert(key.clone(), self.resolve(tagged, mark_secret).await?);
        }
        Ok(resolved)
    }
}

/// Replace secret values with a fixed mask for display.
pub fn mask_secrets(env: &EnvMap) -> EnvMap {
    env.iter()
        .map(|(key, value)| {
            let shown = if value.starts_with(SECRET_PREFIX) {
                "****".to_string()
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{InfrastructureAdapter, ResolvedEnvValue};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording {
        name: &'static str,
        secret: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl InfrastructureAdapter for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn resolve_env(&self, value: &str) -> CoreResult<ResolvedEnvValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ResolvedEnvValue {
                value: value.to_uppercase(),
                is_secret: self.secret,
            })
        }
    }

    fn namespace() -> (EnvNamespace, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let local_calls = Arc::new(AtomicUsize::new(0));
        let aws_calls = Arc::new(AtomicUsize::new(0));
        let mut registry = InfrastructureRegistry::new();
        registry.register(Arc::new(Recording {
            name: "local",
            secret: false,
            calls: local_calls.clone(),
        }));
        registry.register(Arc::new(Recording {
            name: "aws",
            secret: true,
            calls: aws_calls.clone(),
        }));
        (EnvNamespace::new(Arc::new(registry)), local_calls, aws_calls)
    }

    #[test]
    fn test_tag_and_split() {
        assert_eq!(tag("v", "local"), "local:v");
        assert_eq!(split("aws:arn:aws:ssm:x").unwrap(), ("aws", "arn:aws:ssm:x"));
        assert!(split("untagged").is_err());
        assert!(split(":v").is_err());
    }

    #[tokio::test]
    async fn test_local_value_reaches_only_local() {
        let (ns, local_calls, aws_calls) = namespace();

        let value = ns.resolve(&tag("v", "local"), true).await.unwrap();

        assert_eq!(value, "V");
        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
        assert_eq!(aws_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_secret_marking() {
        let (ns, _, _) = namespace();
        assert_eq!(ns.resolve("aws:pw", true).await.unwrap(), "secret://PW");
        assert_eq!(ns.resolve("aws:pw", false).await.unwrap(), "PW");
    }

    #[tokio::test]
    async fn test_unknown_infra_is_resolution_failure() {
        let (ns, _, _) = namespace();
        let err = ns.resolve("gcp:v", false).await.unwrap_err();
        assert!(matches!(err, CoreError::EnvResolutionFailure { .. }));
    }

    #[tokio::test]
    async fn test_resolve_all_and_mask() {
        let (ns, _, _) = namespace();
        let mut env = EnvMap::new();
        env.insert("A".to_string(), "local:a".to_string());
        env.insert("B".to_string(), "aws:b".to_string());

        let resolved = ns.resolve_all(&env, true).await.unwrap();
        let masked = mask_secrets(&resolved);

        assert_eq!(masked["A"], "A");
        assert_eq!(masked["B"], "****");
    }
}
