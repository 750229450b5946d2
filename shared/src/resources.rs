use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ErrorInfo;

/// Collections exposed by the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Users,
    Groups,
    Subscriptions,
    Quizzes,
    News,
    AudioNotifications,
    Invoices,
    Transactions,
    Support,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        Self::Users,
        Self::Groups,
        Self::Subscriptions,
        Self::Quizzes,
        Self::News,
        Self::AudioNotifications,
        Self::Invoices,
        Self::Transactions,
        Self::Support,
    ];

    /// Path below the API root.
    pub const fn path(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Groups => "groups",
            Self::Subscriptions => "subscriptions",
            Self::Quizzes => "quizzes",
            Self::News => "news",
            Self::AudioNotifications => "audio-notifications",
            Self::Invoices => "invoices",
            Self::Transactions => "transactions",
            Self::Support => "support",
        }
    }

    /// Fields the screen's search box looks at.
    pub const fn default_search_fields(self) -> &'static [&'static str] {
        match self {
            Self::Users => &["name", "email", "phone"],
            Self::Groups => &["name", "description"],
            Self::Subscriptions => &["name", "plan", "status"],
            Self::Quizzes => &["title", "category"],
            Self::News => &["title", "author"],
            Self::AudioNotifications => &["title", "description"],
            Self::Invoices => &["invoiceNumber", "customerName", "status"],
            Self::Transactions => &["reference", "userName", "status"],
            Self::Support => &["subject", "email", "status"],
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Users => "Users",
            Self::Groups => "Groups",
            Self::Subscriptions => "Subscriptions",
            Self::Quizzes => "Quizzes",
            Self::News => "News",
            Self::AudioNotifications => "Audio notifications",
            Self::Invoices => "Invoices",
            Self::Transactions => "Transactions",
            Self::Support => "Support",
        }
    }

    /// Whether create/edit forms for this collection carry a file input.
    pub const fn accepts_uploads(self) -> bool {
        matches!(self, Self::News | Self::AudioNotifications | Self::Quizzes)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for ResourceKind {
    type Err = ErrorInfo;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().trim_matches('/');
        Self::ALL
            .into_iter()
            .find(|kind| kind.path().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ErrorInfo::invalid_request(format!("unknown resource '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_unique() {
        let mut paths: Vec<_> = ResourceKind::ALL.iter().map(|k| k.path()).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), ResourceKind::ALL.len());
    }

    #[test]
    fn test_every_kind_has_search_fields() {
        for kind in ResourceKind::ALL {
            assert!(!kind.default_search_fields().is_empty(), "{kind}");
        }
    }

    #[test]
    fn test_parse_from_path() {
        assert_eq!("/users/".parse::<ResourceKind>().unwrap(), ResourceKind::Users);
        assert_eq!(
            "Audio-Notifications".parse::<ResourceKind>().unwrap(),
            ResourceKind::AudioNotifications
        );
        assert!("widgets".parse::<ResourceKind>().is_err());
    }
}
