use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One `[[policy]]` table of the experiment file.
///
/// Example:
/// ```toml
/// [[policy]]
/// type = "buy_hold"
/// name = "buy_hold"
///
/// [[policy]]
/// type = "avoid_earnings"
/// name = "avoid_earnings"
///
/// [policy.params]
/// window = 5
///
/// [[policy]]
/// type = "flat"
/// name = "half"
/// agent = true
///
/// [policy.params]
/// fraction = 0.5
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Policy type identifier: "buy_hold", "avoid_earnings" or "flat".
    #[serde(rename = "type")]
    pub policy_type: String,
    /// Name used in logs, output rows and artifact file names.
    pub name: String,
    /// Marks the policy under evaluation; every other policy is a baseline.
    #[serde(default)]
    pub agent: bool,
    /// Type-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}
