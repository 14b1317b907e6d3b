//! Constraint records
//!
//! Constraints steer snapshot generation in the external engine. They are
//! persisted verbatim on every version; only [`Constraint::scope`] is
//! interpreted here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What part of the architecture a constraint addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintScope {
    /// Whole-application operations (add/remove/replace nodes)
    Application,
    /// Construct-level operations
    Construct,
    /// Require or forbid an edge
    Edge,
    /// Set a property on an existing resource
    Resource,
}

impl ConstraintScope {
    /// Scopes that can add or remove graph elements
    #[inline]
    #[must_use]
    pub fn is_topological(self) -> bool {
        !matches!(self, Self::Resource)
    }
}

/// A structured instruction for the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Constraint scope
    pub scope: ConstraintScope,

    /// Operator, e.g. `add`, `remove`, `must_exist`, `equals`
    pub operator: String,

    /// Target resource or edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Node for application-scope constraints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    /// Remaining fields, kept as given
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Constraint {
    /// Create a constraint with no target
    #[must_use]
    pub fn new(scope: ConstraintScope, operator: impl Into<String>) -> Self {
        Self {
            scope,
            operator: operator.into(),
            target: None,
            node: None,
            extra: Map::new(),
        }
    }

    /// Resource-scope constraint on `target`
    #[must_use]
    pub fn resource(operator: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(ConstraintScope::Resource, operator).with_target(target)
    }

    /// Edge-scope constraint on `target` (`<source> -> <target>`)
    #[must_use]
    pub fn edge(operator: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(ConstraintScope::Edge, operator).with_target(target)
    }

    /// Application-scope constraint on `node`
    #[must_use]
    pub fn application(operator: impl Into<String>, node: impl Into<String>) -> Self {
        let mut c = Self::new(ConstraintScope::Application, operator);
        c.node = Some(node.into());
        c
    }

    /// Set the target
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attach an extra field (e.g. `property`, `value`)
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_resource_scope_is_non_topological() {
        assert!(!ConstraintScope::Resource.is_topological());
        assert!(ConstraintScope::Edge.is_topological());
        assert!(ConstraintScope::Application.is_topological());
        assert!(ConstraintScope::Construct.is_topological());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = json!({
            "scope": "resource",
            "operator": "equals",
            "target": "aws:rds_instance:db",
            "property": "instance_class",
            "value": "db.t3.large"
        });
        let constraint: Constraint = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(constraint.scope, ConstraintScope::Resource);
        assert_eq!(constraint.extra["property"], "instance_class");
        assert_eq!(serde_json::to_value(&constraint).unwrap(), raw);
    }

    #[test]
    fn builders_fill_expected_fields() {
        let c = Constraint::application("add", "aws:lambda:worker");
        assert_eq!(c.scope, ConstraintScope::Application);
        assert_eq!(c.node.as_deref(), Some("aws:lambda:worker"));

        let c = Constraint::resource("equals", "aws:lambda:api").with_field("value", 1024);
        assert_eq!(c.target.as_deref(), Some("aws:lambda:api"));
        assert_eq!(c.extra["value"], 1024);
    }
}
