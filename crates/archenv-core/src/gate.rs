//! Topological-change gate
//!
//! Two checkpoints around one engine invocation. [`check_constraints`] screens
//! the proposed constraints before the engine runs; [`check_diff`] screens the
//! realized diff afterwards. Restricted environments must pass both: an
//! engine can replace a resource without any add/remove constraint.
//!
//! Environments tagged `default` always pass.

use archenv_store::{Constraint, Environment, EnvironmentKey};
use archenv_topology::TopologyDiff;
use std::fmt;

/// Why the gate refused a run
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    environment: EnvironmentKey,
    constraints: Vec<Constraint>,
    diff: Option<TopologyDiff>,
}

impl Rejection {
    /// Rejection by offending constraints
    #[must_use]
    pub fn from_constraints(environment: EnvironmentKey, constraints: Vec<Constraint>) -> Self {
        Self {
            environment,
            constraints,
            diff: None,
        }
    }

    /// Rejection by realized diff
    #[must_use]
    pub fn from_diff(environment: EnvironmentKey, diff: TopologyDiff) -> Self {
        Self {
            environment,
            constraints: Vec::new(),
            diff: Some(diff),
        }
    }

    /// Rejected environment
    #[inline]
    #[must_use]
    pub fn environment(&self) -> &EnvironmentKey {
        &self.environment
    }

    /// Offending constraints; empty for diff rejections
    #[inline]
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Topological part of the realized diff, for diff rejections
    #[inline]
    #[must_use]
    pub fn realized_diff(&self) -> Option<&TopologyDiff> {
        self.diff.as_ref()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topological changes are not allowed in environment {}",
            self.environment
        )?;
        match &self.diff {
            Some(diff) => write!(
                f,
                ": engine output adds or removes {} resource(s) and {} edge(s)",
                diff.resources.len(),
                diff.edges.len()
            ),
            None => write!(
                f,
                ": {} constraint(s) target application, construct or edge scope",
                self.constraints.len()
            ),
        }
    }
}

impl std::error::Error for Rejection {}

/// Static check on proposed constraints
///
/// # Errors
/// Rejection carrying every constraint whose scope is topological
pub fn check_constraints(
    environment: &Environment,
    constraints: &[Constraint],
) -> Result<(), Rejection> {
    if environment.allows_topological_changes() {
        return Ok(());
    }

    let offending: Vec<Constraint> = constraints
        .iter()
        .filter(|c| c.scope.is_topological())
        .cloned()
        .collect();
    if offending.is_empty() {
        return Ok(());
    }

    tracing::warn!(
        environment = %environment.key(),
        offending = offending.len(),
        "rejected topological constraints"
    );
    Err(Rejection::from_constraints(environment.key(), offending))
}

/// Dynamic check on the realized diff
///
/// Any ADDED or REMOVED entry is rejected, including a resource that an
/// engine run replaced under a new id.
///
/// # Errors
/// Rejection carrying the topological entries of `diff`
pub fn check_diff(environment: &Environment, diff: &TopologyDiff) -> Result<(), Rejection> {
    if environment.allows_topological_changes() || !diff.has_topological_changes() {
        return Ok(());
    }

    let topological = diff.topological_changes();
    tracing::warn!(
        environment = %environment.key(),
        resources = topological.resources.len(),
        edges = topological.edges.len(),
        "rejected topological engine output"
    );
    Err(Rejection::from_diff(environment.key(), topological))
}

#[cfg(test)]
mod tests {
    use super::*;
    use archenv_store::{ConstraintScope, EnvironmentTags};
    use archenv_topology::{diff, Topology};

    fn restricted() -> Environment {
        Environment::new("shop", "prod", EnvironmentTags::restricted())
    }

    fn default_env() -> Environment {
        Environment::new("shop", "default", EnvironmentTags::default_environment())
    }

    fn topology(src: &str) -> Topology {
        src.parse().unwrap()
    }

    #[test]
    fn resource_constraints_pass_restricted() {
        let constraints = vec![
            Constraint::resource("equals", "aws:rds_instance:db").with_field("value", "db.t3.large"),
            Constraint::resource("add", "aws:lambda:api"),
        ];
        assert!(check_constraints(&restricted(), &constraints).is_ok());
    }

    #[test]
    fn topological_constraints_are_collected() {
        let constraints = vec![
            Constraint::resource("equals", "aws:lambda:api"),
            Constraint::edge("must_exist", "aws:lambda:api -> aws:rds_instance:db"),
            Constraint::application("add", "aws:sqs_queue:jobs"),
            Constraint::new(ConstraintScope::Construct, "remove"),
        ];
        let rejection = check_constraints(&restricted(), &constraints).unwrap_err();
        assert_eq!(rejection.constraints().len(), 3);
        assert!(rejection
            .constraints()
            .iter()
            .all(|c| c.scope != ConstraintScope::Resource));
        assert!(rejection.realized_diff().is_none());
    }

    #[test]
    fn default_environment_accepts_everything() {
        let constraints = vec![Constraint::application("remove", "aws:lambda:api")];
        assert!(check_constraints(&default_env(), &constraints).is_ok());

        let before = topology("resources:\n  aws:lambda:api: {}\n");
        let after = topology("resources:\n  aws:lambda:worker: {}\n");
        assert!(check_diff(&default_env(), &diff(&after, &before, false)).is_ok());
    }

    #[test]
    fn property_changes_pass_dynamic_check() {
        let before = topology("resources:\n  aws:lambda:api: {memory: 512}\n");
        let after = topology("resources:\n  aws:lambda:api: {memory: 1024}\n");
        let realized = diff(&after, &before, true);
        assert!(realized.has_differences());
        assert!(check_diff(&restricted(), &realized).is_ok());
    }

    #[test]
    fn added_resource_fails_dynamic_check() {
        let before = topology("resources:\n  aws:lambda:api: {memory: 512}\n");
        let after = topology(
            "resources:\n  aws:lambda:api: {memory: 1024}\n  aws:sqs_queue:jobs: {}\n\
             edges:\n  aws:lambda:api -> aws:sqs_queue:jobs:\n",
        );
        let rejection = check_diff(&restricted(), &diff(&after, &before, true)).unwrap_err();
        let realized = rejection.realized_diff().unwrap();
        assert_eq!(realized.resources.len(), 1);
        assert_eq!(realized.edges.len(), 1);
        assert!(rejection.to_string().contains("1 resource(s) and 1 edge(s)"));
    }
}
