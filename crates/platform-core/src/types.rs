//! Shared value objects passed to every action invocation.
//!
//! An [`ActionContext`] is built fresh for each call and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role that bypasses every permission check.
pub const SYSTEM_ADMIN_ROLE: &str = "system-admin";

// =============================================================================
// Timestamp
// =============================================================================

/// Milliseconds since the Unix epoch (UTC).
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// Whole minutes elapsed between `self` and `later` (zero if `later` is earlier).
    pub fn minutes_until(&self, later: Timestamp) -> u64 {
        let delta = later.0 - self.0;
        if delta <= 0 {
            0
        } else {
            (delta / 60_000) as u64
        }
    }
}

// =============================================================================
// Caller identity
// =============================================================================

/// The authenticated user on whose behalf an action runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub organization_roles: Vec<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_system_admin(&self) -> bool {
        self.has_role(SYSTEM_ADMIN_ROLE)
    }
}

/// The tenant the caller is acting within.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationContext {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

// =============================================================================
// Page / navigation state
// =============================================================================

/// Default state, props and metadata a page controller hands to its actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    #[serde(default)]
    pub page_id: String,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl PageContext {
    pub fn for_page(page_id: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            ..Self::default()
        }
    }
}

/// A single breadcrumb entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub label: String,
    pub path: String,
}

/// Where the caller currently is in the console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationContext {
    /// Name of the router driving navigation (e.g. "app").
    #[serde(default)]
    pub router: Option<String>,
    pub current_path: String,
    #[serde(default)]
    pub breadcrumbs: Vec<Breadcrumb>,
}

impl Default for NavigationContext {
    fn default() -> Self {
        Self {
            router: None,
            current_path: "/".to_string(),
            breadcrumbs: Vec::new(),
        }
    }
}

/// Per-call bundle of user, organization, page and navigation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionContext {
    pub user: UserContext,
    #[serde(default)]
    pub organization: Option<OrganizationContext>,
    #[serde(default)]
    pub page: PageContext,
    #[serde(default)]
    pub navigation: NavigationContext,
    pub timestamp: Timestamp,
}

impl ActionContext {
    /// Build a context for `user` stamped with the current time.
    pub fn for_user(user: UserContext) -> Self {
        Self {
            user,
            organization: None,
            page: PageContext::default(),
            navigation: NavigationContext::default(),
            timestamp: Timestamp::now(),
        }
    }

    pub fn with_page(mut self, page: PageContext) -> Self {
        self.page = page;
        self
    }

    pub fn with_organization(mut self, organization: OrganizationContext) -> Self {
        self.organization = Some(organization);
        self
    }

    pub fn with_navigation(mut self, navigation: NavigationContext) -> Self {
        self.navigation = navigation;
        self
    }
}
