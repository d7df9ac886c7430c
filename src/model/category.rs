use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The opaque identifier of a category row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(String);

impl CategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CategoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A (major, minor) category pair together with how many expenses use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Category {
    pub id: CategoryId,
    pub main_category: String,
    pub sub_category: String,
    #[serde(default)]
    pub count: i64,
}

impl Category {
    pub fn new(
        id: impl Into<String>,
        main_category: impl Into<String>,
        sub_category: impl Into<String>,
        count: i64,
    ) -> Self {
        Self {
            id: CategoryId::new(id),
            main_category: main_category.into(),
            sub_category: sub_category.into(),
            count,
        }
    }

    /// True if this category is the pair `(main, sub)`.
    pub fn is_pair(&self, main: &str, sub: &str) -> bool {
        self.main_category == main && self.sub_category == sub
    }
}
