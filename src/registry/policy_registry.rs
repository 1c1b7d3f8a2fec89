//! # Type Policy Registry
//!
//! Holds the [`TypePolicy`] for every registered task type. Updates are validated before
//! they are stored, so a failed update leaves the previous policy untouched.
//!
//! Dispatch reads the policy fresh on every scheduling pass, which makes an update
//! effective for every task that has not been dispatched yet. A running task keeps the
//! timeout captured when it was dispatched.

use crate::constants::events;
use crate::error::{Result, SchedulerError};
use crate::models::{TypePolicy, TypePolicyUpdate};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

#[derive(Debug, Default)]
pub struct TypePolicyRegistry {
    policies: RwLock<HashMap<String, TypePolicy>>,
}

impl TypePolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the policy for `task_type`.
    pub fn register_type(&self, task_type: &str, policy: TypePolicy) -> Result<()> {
        if task_type.trim().is_empty() {
            return Err(SchedulerError::ValidationError(
                "task type must not be empty".to_string(),
            ));
        }
        policy.validate()?;

        info!(
            event = events::POLICY_REGISTERED,
            task_type = %task_type,
            concurrency = policy.concurrency,
            timeout_ms = policy.timeout.as_millis() as u64,
            max_retries = policy.max_retries,
            "Registered task type policy"
        );

        self.policies.write().insert(task_type.to_string(), policy);
        Ok(())
    }

    /// Merge `update` into the existing policy and return the new policy.
    pub fn update_policy(&self, task_type: &str, update: &TypePolicyUpdate) -> Result<TypePolicy> {
        let mut policies = self.policies.write();
        let current = policies
            .get(task_type)
            .ok_or_else(|| SchedulerError::type_not_found(task_type))?;

        let merged = current.merged(update);
        merged.validate()?;

        info!(
            event = events::POLICY_UPDATED,
            task_type = %task_type,
            concurrency = merged.concurrency,
            timeout_ms = merged.timeout.as_millis() as u64,
            max_retries = merged.max_retries,
            "Updated task type policy"
        );

        policies.insert(task_type.to_string(), merged.clone());
        Ok(merged)
    }

    pub fn get_policy(&self, task_type: &str) -> Result<TypePolicy> {
        self.policies
            .read()
            .get(task_type)
            .cloned()
            .ok_or_else(|| SchedulerError::type_not_found(task_type))
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.policies.read().contains_key(task_type)
    }

    /// Registered types in a stable order.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.policies.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn snapshot(&self) -> BTreeMap<String, TypePolicy> {
        self.policies
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_register_and_get() {
        let registry = TypePolicyRegistry::new();
        registry
            .register_type("email", TypePolicy::new(2, Duration::from_secs(5), 3))
            .unwrap();

        let policy = registry.get_policy("email").unwrap();
        assert_eq!(policy.concurrency, 2);
        assert!(registry.contains("email"));
        assert_eq!(registry.types(), vec!["email".to_string()]);
    }

    #[test]
    fn test_register_rejects_invalid_policy() {
        let registry = TypePolicyRegistry::new();
        let err = registry
            .register_type("email", TypePolicy::new(0, Duration::from_secs(5), 3))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(!registry.contains("email"));
    }

    #[test]
    fn test_register_rejects_empty_type() {
        let registry = TypePolicyRegistry::new();
        assert!(registry.register_type("  ", TypePolicy::default()).is_err());
    }

    #[test]
    fn test_get_unknown_type_is_not_found() {
        let registry = TypePolicyRegistry::new();
        assert!(registry.get_policy("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_merges_and_validates() {
        let registry = TypePolicyRegistry::new();
        registry
            .register_type("sync", TypePolicy::new(1, Duration::from_secs(5), 3))
            .unwrap();

        let updated = registry
            .update_policy("sync", &TypePolicyUpdate::default().concurrency(4))
            .unwrap();
        assert_eq!(updated.concurrency, 4);
        assert_eq!(updated.max_retries, 3);

        let err = registry
            .update_policy("sync", &TypePolicyUpdate::default().concurrency(0))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(registry.get_policy("sync").unwrap().concurrency, 4);
    }

    #[test]
    fn test_update_unknown_type_is_not_found() {
        let registry = TypePolicyRegistry::new();
        let err = registry
            .update_policy("missing", &TypePolicyUpdate::default().max_retries(1))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
