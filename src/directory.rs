//! The category directory: the household's two-level taxonomy, ranked by how often each category
//! is used, and the validated add/update/delete operations on it.

use crate::api::{ApiError, ExpenseStore, AUTH_REQUIRED_MESSAGE};
use crate::auth::AuthGate;
use crate::model::{Category, CategoryId};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("{}", AUTH_REQUIRED_MESSAGE)]
    ReadOnly,
    #[error("Both the major and the minor category are required.")]
    EmptyName,
    #[error("The category '{main} > {sub}' already exists.")]
    Duplicate { main: String, sub: String },
    #[error(transparent)]
    Remote(#[from] ApiError),
}

/// A major category and its minors, both ranked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MajorGroup {
    pub name: String,
    /// Total usage of every minor under this major.
    pub count: i64,
    pub minors: Vec<Category>,
}

/// Orders labels the way a person would scan them: case-insensitively, falling back to code
/// point order so that the result is total.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Groups `categories` by major and ranks both levels by usage count, most used first, with ties
/// ordered by [`compare_labels`].
pub fn rank(categories: &[Category]) -> Vec<MajorGroup> {
    let mut groups: Vec<MajorGroup> = Vec::new();
    for category in categories {
        match groups.iter_mut().find(|g| g.name == category.main_category) {
            Some(group) => {
                group.count += category.count;
                group.minors.push(category.clone());
            }
            None => groups.push(MajorGroup {
                name: category.main_category.clone(),
                count: category.count,
                minors: vec![category.clone()],
            }),
        }
    }
    groups.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| compare_labels(&a.name, &b.name))
    });
    for group in &mut groups {
        group.minors.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| compare_labels(&a.sub_category, &b.sub_category))
        });
    }
    groups
}

pub struct CategoryDirectory {
    store: Arc<dyn ExpenseStore>,
    gate: AuthGate,
    categories: Vec<Category>,
    ranked: Vec<MajorGroup>,
}

impl CategoryDirectory {
    /// An empty directory. Call [`CategoryDirectory::load`] to fill it.
    pub fn new(store: Arc<dyn ExpenseStore>, gate: AuthGate) -> Self {
        Self {
            store,
            gate,
            categories: Vec::new(),
            ranked: Vec::new(),
        }
    }

    /// Fetches every category and re-ranks. On failure the previous contents are kept.
    pub async fn load(&mut self) -> Result<(), DirectoryError> {
        let categories = self.store.list_categories().await?;
        debug!("Loaded {} categories", categories.len());
        self.ranked = rank(&categories);
        self.categories = categories;
        Ok(())
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn groups(&self) -> &[MajorGroup] {
        &self.ranked
    }

    /// Major names, most used first.
    pub fn major_categories(&self) -> Vec<&str> {
        self.ranked.iter().map(|g| g.name.as_str()).collect()
    }

    /// Minor names under `major`, most used first. Empty for an unknown major.
    pub fn minor_categories(&self, major: &str) -> Vec<&str> {
        self.ranked
            .iter()
            .find(|g| g.name == major)
            .map(|g| g.minors.iter().map(|c| c.sub_category.as_str()).collect())
            .unwrap_or_default()
    }

    /// The ordered `(major, [minor...])` choices for a two-level picker.
    pub fn categories_for_dropdown(&self) -> Vec<(String, Vec<String>)> {
        self.ranked
            .iter()
            .map(|g| {
                (
                    g.name.clone(),
                    g.minors.iter().map(|c| c.sub_category.clone()).collect(),
                )
            })
            .collect()
    }

    pub fn contains(&self, main: &str, sub: &str) -> bool {
        self.categories.iter().any(|c| c.is_pair(main, sub))
    }

    pub async fn add(&mut self, main: &str, sub: &str) -> Result<Category, DirectoryError> {
        let (main, sub) = self.validate(main, sub, None)?;
        let created = self.store.create_category(&main, &sub).await?;
        info!("Added category '{main} > {sub}'");
        self.load().await?;
        Ok(created)
    }

    pub async fn update(
        &mut self,
        id: &CategoryId,
        main: &str,
        sub: &str,
    ) -> Result<Category, DirectoryError> {
        let (main, sub) = self.validate(main, sub, Some(id))?;
        let updated = self.store.update_category(id, &main, &sub).await?;
        info!("Renamed category {id} to '{main} > {sub}'");
        self.load().await?;
        Ok(updated)
    }

    pub async fn delete(&mut self, id: &CategoryId) -> Result<(), DirectoryError> {
        if !self.gate.can_write() {
            return Err(DirectoryError::ReadOnly);
        }
        self.store.delete_category(id).await?;
        info!("Deleted category {id}");
        self.load().await
    }

    /// Checks capability, trims both names and rejects empty names and pairs that already exist
    /// (other than the category `except` itself).
    fn validate(
        &self,
        main: &str,
        sub: &str,
        except: Option<&CategoryId>,
    ) -> Result<(String, String), DirectoryError> {
        if !self.gate.can_write() {
            return Err(DirectoryError::ReadOnly);
        }
        let (main, sub) = (main.trim(), sub.trim());
        if main.is_empty() || sub.is_empty() {
            return Err(DirectoryError::EmptyName);
        }
        let duplicate = self
            .categories
            .iter()
            .any(|c| Some(&c.id) != except && c.is_pair(main, sub));
        if duplicate {
            return Err(DirectoryError::Duplicate {
                main: main.to_string(),
                sub: sub.to_string(),
            });
        }
        Ok((main.to_string(), sub.to_string()))
    }
}
