//! Authorization engine: the single gate in front of every mutation.
//!
//! Decisions are a pure function of the actor, the resource kind, the action
//! and the static capability matrix. Nothing is cached between calls; callers
//! resolve the actor's current role before asking.

mod capabilities;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{Actor, Role};

pub use capabilities::{Action, Capabilities, ResourceKind, lookup};

/// What to do with an action verb that is not read/create/update/delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnmappedActionPolicy {
    /// Permissive fallback kept from the legacy permission check.
    #[default]
    Allow,
    Deny,
}

impl UnmappedActionPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    /// No authenticated actor.
    NoIdentity,
    /// The matrix has no true cell for this request.
    NotPermitted {
        role: Role,
        kind: String,
        action: Action,
    },
    /// Unclassified verb under a deny policy.
    UnmappedAction { verb: String },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::NoIdentity => write!(f, "no-identity"),
            DenyReason::NotPermitted { role, kind, action } => {
                write!(f, "role '{}' may not {} {}", role, action, kind)
            }
            DenyReason::UnmappedAction { verb } => {
                write!(f, "action '{}' is not permitted", verb)
            }
        }
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Turn a deny into a rejected operation.
    pub fn into_result(self) -> AppResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AppError::Forbidden(reason.to_string())),
        }
    }
}

/// Stateless authorization engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authorizer {
    unmapped_action_policy: UnmappedActionPolicy,
}

impl Authorizer {
    pub fn new(unmapped_action_policy: UnmappedActionPolicy) -> Self {
        Self {
            unmapped_action_policy,
        }
    }

    pub fn unmapped_action_policy(&self) -> UnmappedActionPolicy {
        self.unmapped_action_policy
    }

    /// Authorize a controller-style verb (`index`, `create`, `destroy`, ...).
    pub fn authorize(&self, actor: Option<&Actor>, kind: &ResourceKind, verb: &str) -> Decision {
        let Some(actor) = actor else {
            return Decision::Deny(DenyReason::NoIdentity);
        };
        if actor.role.is_admin() {
            return Decision::Allow;
        }

        match Action::classify(verb) {
            Some(action) => self.check(actor, kind, action),
            None => match self.unmapped_action_policy {
                UnmappedActionPolicy::Allow => Decision::Allow,
                UnmappedActionPolicy::Deny => Decision::Deny(DenyReason::UnmappedAction {
                    verb: verb.to_string(),
                }),
            },
        }
    }

    /// Authorize an already classified action.
    pub fn authorize_action(
        &self,
        actor: Option<&Actor>,
        kind: &ResourceKind,
        action: Action,
    ) -> Decision {
        let Some(actor) = actor else {
            return Decision::Deny(DenyReason::NoIdentity);
        };
        self.check(actor, kind, action)
    }

    /// Shorthand for services: authorize and turn a deny into `AppError::Forbidden`.
    pub fn require(&self, actor: &Actor, kind: ResourceKind, action: Action) -> AppResult<()> {
        let decision = self.authorize_action(Some(actor), &kind, action);
        if let Decision::Deny(ref reason) = decision {
            tracing::info!(
                actor_id = %actor.id,
                role = %actor.role,
                kind = %kind,
                action = %action,
                "Authorization denied: {}",
                reason
            );
        }
        decision.into_result()
    }

    fn check(&self, actor: &Actor, kind: &ResourceKind, action: Action) -> Decision {
        if actor.role.is_admin() {
            return Decision::Allow;
        }

        let permitted = match lookup(actor.role, kind) {
            Some(caps) => caps.permits(action),
            // Unmapped kinds are low-sensitivity reads for every authenticated role
            None => !action.is_mutating(),
        };

        if permitted {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::NotPermitted {
                role: actor.role,
                kind: kind.to_string(),
                action,
            })
        }
    }
}

/// Authorize with the default (permissive) unmapped-action policy.
pub fn authorize(actor: Option<&Actor>, kind: &ResourceKind, verb: &str) -> Decision {
    Authorizer::default().authorize(actor, kind, verb)
}
