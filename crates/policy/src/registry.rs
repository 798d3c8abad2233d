use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use common::{Error, Result};

use crate::baselines::{Baseline, BaselineRule};
use crate::config::PolicyConfig;
use crate::{Policy, PolicyKind};

/// Every policy taking part in a run, plus which one is under evaluation.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    policies: Vec<Arc<dyn Policy>>,
    agent: Option<usize>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build baselines from config. `max_exposure` is the environment's upper
    /// exposure bound, used when a policy does not set its own.
    pub fn from_config(configs: &[PolicyConfig], max_exposure: f64) -> Result<Self> {
        let mut registry = Self::new();
        for cfg in configs {
            let policy = build_policy(cfg, max_exposure)
                .map_err(|e| Error::Config(format!("policy '{}': {e}", cfg.name)))?;
            info!(name = %cfg.name, kind = %cfg.policy_type, agent = cfg.agent, "Registered policy");
            if cfg.agent {
                registry.register_agent(policy)?;
            } else {
                registry.register(policy)?;
            }
        }
        Ok(registry)
    }

    /// Add a baseline. Names must be unique.
    pub fn register(&mut self, policy: Arc<dyn Policy>) -> Result<()> {
        if self.get(policy.name()).is_some() {
            return Err(Error::Config(format!(
                "duplicate policy name '{}'",
                policy.name()
            )));
        }
        self.policies.push(policy);
        Ok(())
    }

    /// Add the policy under evaluation. At most one per run.
    pub fn register_agent(&mut self, policy: Arc<dyn Policy>) -> Result<()> {
        if let Some(existing) = self.agent() {
            return Err(Error::Config(format!(
                "policy '{}' is already the agent, cannot also mark '{}'",
                existing.name(),
                policy.name()
            )));
        }
        self.register(policy)?;
        self.agent = Some(self.policies.len() - 1);
        Ok(())
    }

    pub fn policies(&self) -> &[Arc<dyn Policy>] {
        &self.policies
    }

    pub fn agent(&self) -> Option<&Arc<dyn Policy>> {
        self.agent.map(|i| &self.policies[i])
    }

    pub fn baselines(&self) -> impl Iterator<Item = &Arc<dyn Policy>> {
        self.policies
            .iter()
            .enumerate()
            .filter(move |(i, _)| Some(*i) != self.agent)
            .map(|(_, p)| p)
    }

    /// First baseline of the given kind, used as the comparison reference.
    pub fn reference(&self, kind: PolicyKind) -> Option<&Arc<dyn Policy>> {
        self.baselines().find(|p| p.kind() == kind)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Policy>> {
        self.policies.iter().find(|p| p.name() == name)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

// ─── Policy builders ──────────────────────────────────────────────────────────

fn build_policy(cfg: &PolicyConfig, max_exposure: f64) -> std::result::Result<Arc<dyn Policy>, String> {
    let exposure = param_f64(&cfg.params, "max_exposure", max_exposure);
    if !exposure.is_finite() {
        return Err("max_exposure must be finite".into());
    }
    let rule = match cfg.policy_type.as_str() {
        "buy_hold" => BaselineRule::BuyAndHold {
            max_exposure: exposure,
        },
        "avoid_earnings" => {
            let window = param_usize(&cfg.params, "window", 5);
            BaselineRule::AvoidEarnings {
                max_exposure: exposure,
                window_before: param_usize(&cfg.params, "window_before", window),
                window_after: param_usize(&cfg.params, "window_after", window),
            }
        }
        "flat" => {
            let fraction = param_f64(&cfg.params, "fraction", 0.5);
            if !fraction.is_finite() {
                return Err("fraction must be finite".into());
            }
            BaselineRule::FlatExposure { fraction }
        }
        other => return Err(format!("unknown type '{other}'")),
    };
    Ok(Arc::new(Baseline::new(cfg.name.clone(), rule)))
}

fn param_f64(params: &HashMap<String, toml::Value>, key: &str, default: f64) -> f64 {
    params
        .get(key)
        .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
        .unwrap_or(default)
}

fn param_usize(params: &HashMap<String, toml::Value>, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(|v| v.as_integer())
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExternalAgent;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Tables {
        #[serde(rename = "policy")]
        policies: Vec<PolicyConfig>,
    }

    fn file(raw: &str) -> Tables {
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn builds_baselines_with_params() {
        let cfg = file(
            r#"
            [[policy]]
            type = "buy_hold"
            name = "bh"

            [[policy]]
            type = "avoid_earnings"
            name = "avoid"
            [policy.params]
            window_before = 3
            window_after = 1

            [[policy]]
            type = "flat"
            name = "third"
            agent = true
            [policy.params]
            fraction = 0.33
            "#,
        );
        let reg = PolicyRegistry::from_config(&cfg.policies, 1.0).unwrap();
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.agent().unwrap().name(), "third");
        assert_eq!(reg.baselines().count(), 2);
        assert_eq!(reg.reference(PolicyKind::BuyAndHold).unwrap().name(), "bh");
        assert_eq!(reg.reference(PolicyKind::AvoidEarnings).unwrap().name(), "avoid");
        // The agent is never its own reference.
        assert!(reg.reference(PolicyKind::FlatExposure).is_none());
    }

    #[test]
    fn integer_params_are_accepted_as_floats() {
        let cfg = file(
            r#"
            [[policy]]
            type = "buy_hold"
            name = "levered"
            [policy.params]
            max_exposure = 2
            "#,
        );
        let reg = PolicyRegistry::from_config(&cfg.policies, 1.0).unwrap();
        let p = reg.get("levered").unwrap();
        assert_eq!(p.kind(), PolicyKind::BuyAndHold);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let cfg = file("[[policy]]\ntype = \"momentum\"\nname = \"m\"");
        assert!(matches!(
            PolicyRegistry::from_config(&cfg.policies, 1.0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn duplicate_names_and_agents_are_rejected() {
        let dup = file(
            "[[policy]]\ntype = \"buy_hold\"\nname = \"x\"\n[[policy]]\ntype = \"flat\"\nname = \"x\"",
        );
        assert!(PolicyRegistry::from_config(&dup.policies, 1.0).is_err());

        let two_agents = file(
            "[[policy]]\ntype = \"buy_hold\"\nname = \"a\"\nagent = true\n[[policy]]\ntype = \"flat\"\nname = \"b\"\nagent = true",
        );
        assert!(PolicyRegistry::from_config(&two_agents.policies, 1.0).is_err());
    }

    #[test]
    fn external_agent_can_be_registered() {
        let mut reg = PolicyRegistry::new();
        reg.register(Arc::new(Baseline::buy_and_hold(1.0))).unwrap();
        reg.register_agent(Arc::new(ExternalAgent::new("ppo", |o| {
            if o.earnings_flag > 0.5 {
                0.0
            } else {
                1.0
            }
        })))
        .unwrap();
        assert_eq!(reg.agent().unwrap().kind(), PolicyKind::External);
        assert_eq!(reg.baselines().count(), 1);
    }
}
