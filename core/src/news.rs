/// News posts published to the platform landing page.
///
/// Administrators create and edit posts; the public listing only shows
/// published ones. A public read bumps the view counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsPost {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub views: u64,
    pub created_at: DateTime<Utc>,
}

impl NewsPost {
    pub fn new(
        title: &str,
        content: &str,
        category: &str,
        publish: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: content.to_string(),
            category: category.to_string(),
            is_published: publish,
            published_at: if publish { Some(now) } else { None },
            views: 0,
            created_at: now,
        }
    }
}

/// Partial update applied by the admin edit endpoint; `None` leaves a field
/// unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub is_published: Option<bool>,
}

impl NewsPost {
    pub fn apply(&mut self, update: NewsUpdate, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(content) = update.content {
            self.content = content;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(publish) = update.is_published {
            if publish && !self.is_published {
                self.published_at = Some(now);
            }
            self.is_published = publish;
        }
    }
}
