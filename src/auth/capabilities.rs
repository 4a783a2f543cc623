//! Static capability matrix and request classification.

use serde::Serialize;

use crate::models::Role;

/// Kind of record an action targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    TestCase,
    TestRun,
    AutomationScript,
    Ticket,
    User,
    Document,
    Comment,
    /// Settings administration (the former admin-only feature gate)
    Setting,
    /// Any kind without a matrix entry (dashboards, analytics, ...)
    Other(String),
}

impl ResourceKind {
    /// Parse a resource name as used by the gateway; singular, plural and
    /// dashed spellings are accepted.
    pub fn parse(s: &str) -> Self {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "test_case" | "test_cases" => Self::TestCase,
            "test_run" | "test_runs" => Self::TestRun,
            "automation_script" | "automation_scripts" => Self::AutomationScript,
            "ticket" | "tickets" => Self::Ticket,
            "user" | "users" => Self::User,
            "document" | "documents" => Self::Document,
            "comment" | "comments" => Self::Comment,
            "setting" | "settings" => Self::Setting,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::TestCase => "test_case",
            Self::TestRun => "test_run",
            Self::AutomationScript => "automation_script",
            Self::Ticket => "ticket",
            Self::User => "user",
            Self::Document => "document",
            Self::Comment => "comment",
            Self::Setting => "setting",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capability class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Read, Action::Create, Action::Update, Action::Delete];

    /// Classify a controller-style verb. `None` means the verb is unmapped.
    pub fn classify(verb: &str) -> Option<Self> {
        match verb.trim().to_lowercase().as_str() {
            "index" | "show" | "list" | "read" | "get" => Some(Self::Read),
            "create" | "new" => Some(Self::Create),
            "update" | "edit" | "patch" => Some(Self::Update),
            "destroy" | "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the matrix: what a role may do with one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub read: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl Capabilities {
    pub const NONE: Self = Self::new(false, false, false, false);
    pub const READ: Self = Self::new(true, false, false, false);
    pub const READ_CREATE: Self = Self::new(true, true, false, false);
    pub const READ_WRITE: Self = Self::new(true, true, true, false);
    pub const FULL: Self = Self::new(true, true, true, true);

    pub const fn new(read: bool, create: bool, update: bool, delete: bool) -> Self {
        Self {
            read,
            create,
            update,
            delete,
        }
    }

    pub fn permits(&self, action: Action) -> bool {
        match action {
            Action::Read => self.read,
            Action::Create => self.create,
            Action::Update => self.update,
            Action::Delete => self.delete,
        }
    }
}

/// Matrix lookup. `None` means the kind has no entry for this role.
///
/// Admin holds every capability on every kind, including unmapped ones.
pub fn lookup(role: Role, kind: &ResourceKind) -> Option<Capabilities> {
    use Capabilities as C;
    use ResourceKind as K;

    if role.is_admin() {
        return Some(C::FULL);
    }

    let caps = match (role, kind) {
        (_, K::Other(_)) => return None,
        (_, K::Setting) => C::NONE,
        (_, K::User) => C::READ,

        (Role::Manager, _) => C::FULL,

        (Role::Developer, K::TestCase | K::TestRun) => C::READ,
        (Role::Developer, K::AutomationScript | K::Ticket | K::Document | K::Comment) => {
            C::READ_WRITE
        }

        (Role::Tester, K::Document) => C::READ_CREATE,
        (Role::Tester, K::TestCase | K::TestRun | K::AutomationScript | K::Ticket | K::Comment) => {
            C::READ_WRITE
        }

        (Role::Admin, _) => C::FULL,
    };

    Some(caps)
}
