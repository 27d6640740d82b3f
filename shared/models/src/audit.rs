//! Audit and soft-delete fields shared by every soft-deletable record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creation, modification and deletion stamps, embedded in each record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditFields {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
}

impl AuditFields {
    pub fn new(actor: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            created_by: actor.map(str::to_string),
            updated_by: actor.map(str::to_string),
            deleted_at: None,
            deleted_by: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn touch(&mut self, actor: Option<&str>) {
        self.updated_at = Utc::now();
        if actor.is_some() {
            self.updated_by = actor.map(str::to_string);
        }
    }

    pub fn mark_deleted(&mut self, actor: Option<&str>) {
        let now = Utc::now();
        self.deleted_at = Some(now);
        self.deleted_by = actor.map(str::to_string);
        self.updated_at = now;
    }

    pub fn restore(&mut self, actor: Option<&str>) {
        self.deleted_at = None;
        self.deleted_by = None;
        self.touch(actor);
    }
}

impl Default for AuditFields {
    fn default() -> Self {
        Self::new(None)
    }
}

/// How a delete request removes a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Stamp `deleted_at`; the row stays restorable.
    Soft,
    /// Remove the row and cascade to owned children.
    Hard,
}

impl DeleteMode {
    pub fn from_permanent(permanent: bool) -> Self {
        if permanent {
            Self::Hard
        } else {
            Self::Soft
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatistics {
    pub total: i64,
    pub active: i64,
    pub deleted: i64,
}

impl EntityStatistics {
    pub fn from_counts(total: i64, deleted: i64) -> Self {
        Self {
            total,
            active: total - deleted,
            deleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_delete_and_restore() {
        let mut audit = AuditFields::new(Some("admin"));
        assert!(!audit.is_deleted());

        audit.mark_deleted(Some("planner"));
        assert!(audit.is_deleted());
        assert_eq!(audit.deleted_by.as_deref(), Some("planner"));

        audit.restore(Some("admin"));
        assert!(!audit.is_deleted());
        assert!(audit.deleted_by.is_none());
        assert_eq!(audit.updated_by.as_deref(), Some("admin"));
    }

    #[test]
    fn test_statistics_from_counts() {
        let stats = EntityStatistics::from_counts(10, 3);
        assert_eq!(stats.active, 7);
    }
}
