//! Free-text and filtered search over the action index.
//!
//! Candidates are first narrowed by the query's filters (all must hold),
//! then scored against the free-text query and ranked.

use platform_core::config::DiscoveryConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::types::{ActionCategory, ActionDefinition};

const NAME_SCORE: u32 = 10;
const DESCRIPTION_SCORE: u32 = 5;
const TAG_SCORE: u32 = 3;
const CATEGORY_SCORE: u32 = 2;
const ID_SCORE: u32 = 1;

/// Search request. Every field is optional; unset filters do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionQuery {
    pub query: Option<String>,
    pub category: Option<ActionCategory>,
    pub tags: Vec<String>,
    pub permissions: Vec<String>,
    pub page_id: Option<String>,
    pub limit: Option<usize>,
}

impl ActionQuery {
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: ActionCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn with_page(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One ranked hit.
#[derive(Debug, Clone)]
pub struct DiscoveredAction {
    /// `pageId.actionId`
    pub full_id: String,
    pub page_id: String,
    pub action: Arc<ActionDefinition>,
    pub score: u32,
}

impl DiscoveredAction {
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.full_id,
            "pageId": self.page_id,
            "name": self.action.name,
            "description": self.action.description,
            "category": self.action.category,
            "permissions": self.action.permissions,
            "tags": self.action.metadata.tags,
            "score": self.score,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionDiscoveryResult {
    pub actions: Vec<DiscoveredAction>,
    /// Candidates that passed the filters, before truncation.
    pub total_found: usize,
    /// Score of the top hit, zero when empty.
    pub confidence: u32,
    pub suggestions: Vec<String>,
    pub related_queries: Vec<String>,
}

impl ActionDiscoveryResult {
    pub fn to_value(&self) -> Value {
        json!({
            "actions": self.actions.iter().map(DiscoveredAction::to_value).collect::<Vec<_>>(),
            "totalFound": self.total_found,
            "confidence": self.confidence,
            "suggestions": self.suggestions,
            "relatedQueries": self.related_queries,
        })
    }
}

/// Stateless ranking over an index snapshot.
#[derive(Debug, Clone, Default)]
pub struct ActionDiscoveryService {
    config: DiscoveryConfig,
}

impl ActionDiscoveryService {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Filter, score and rank `index` entries of `(full_id, action)`.
    ///
    /// Ties keep the index's encounter order.
    pub fn discover<'a, I>(&self, index: I, query: &ActionQuery) -> ActionDiscoveryResult
    where
        I: IntoIterator<Item = (&'a str, &'a Arc<ActionDefinition>)>,
    {
        let needle = query
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let mut hits: Vec<DiscoveredAction> = index
            .into_iter()
            .filter_map(|(full_id, action)| {
                let page_id = page_of(full_id);
                if !passes_filters(page_id, action, query) {
                    return None;
                }
                let score = needle.as_deref().map_or(0, |q| score(action, q));
                Some(DiscoveredAction {
                    full_id: full_id.to_string(),
                    page_id: page_id.to_string(),
                    action: Arc::clone(action),
                    score,
                })
            })
            .collect();

        let total_found = hits.len();
        // sort_by is stable
        hits.sort_by(|a, b| b.score.cmp(&a.score));
        hits.truncate(query.limit.unwrap_or(self.config.default_limit));

        let confidence = hits.first().map_or(0, |hit| hit.score);

        let mut suggestions: Vec<String> = Vec::new();
        for example in hits.iter().flat_map(|h| h.action.metadata.examples.iter()) {
            if suggestions.len() >= self.config.max_suggestions {
                break;
            }
            if !suggestions.contains(&example.description) {
                suggestions.push(example.description.clone());
            }
        }

        let mut related_queries: Vec<String> = Vec::new();
        for hit in &hits {
            if related_queries.len() >= self.config.max_related_queries {
                break;
            }
            let related = format!("{} actions", hit.action.category);
            if !related_queries.contains(&related) {
                related_queries.push(related);
            }
        }

        tracing::debug!(
            query = needle.as_deref().unwrap_or(""),
            total_found,
            returned = hits.len(),
            confidence,
            "Action discovery"
        );

        ActionDiscoveryResult {
            actions: hits,
            total_found,
            confidence,
            suggestions,
            related_queries,
        }
    }
}

fn page_of(full_id: &str) -> &str {
    full_id.rsplit_once('.').map_or(full_id, |(page, _)| page)
}

fn passes_filters(page_id: &str, action: &ActionDefinition, query: &ActionQuery) -> bool {
    if query.page_id.as_deref().is_some_and(|p| p != page_id) {
        return false;
    }
    if query.category.is_some_and(|c| c != action.category) {
        return false;
    }
    if !query.permissions.is_empty()
        && !action.permissions.iter().any(|p| query.permissions.contains(p))
    {
        return false;
    }
    if !query.tags.is_empty()
        && !action
            .metadata
            .tags
            .iter()
            .any(|t| query.tags.iter().any(|q| q.eq_ignore_ascii_case(t)))
    {
        return false;
    }
    true
}

/// Additive relevance of `action` for an already lowercased query.
fn score(action: &ActionDefinition, needle: &str) -> u32 {
    let mut score = 0;
    if action.name.to_lowercase().contains(needle) {
        score += NAME_SCORE;
    }
    if action.description.to_lowercase().contains(needle) {
        score += DESCRIPTION_SCORE;
    }
    for tag in &action.metadata.tags {
        if tag.to_lowercase().contains(needle) {
            score += TAG_SCORE;
        }
    }
    if action.category.to_string().contains(needle) {
        score += CATEGORY_SCORE;
    }
    if action.id.to_lowercase().contains(needle) {
        score += ID_SCORE;
    }
    score
}
