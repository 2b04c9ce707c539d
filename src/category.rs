//! Policy categories and their fixed priority order.
//!
//! Declaration order IS the tie-break priority (Privacy first). Ties between
//! categories at the same blended score are resolved by this order so that
//! repeated evaluation always names the same top category.

use serde::{Deserialize, Serialize};

/// Enumerated policy class a piece of text can violate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Privacy,
    Toxic,
    Promotion,
    Misinformation,
    OffTopic,
}

impl Category {
    /// All categories in priority order (highest priority first).
    pub const ALL: [Category; 5] = [
        Category::Privacy,
        Category::Toxic,
        Category::Promotion,
        Category::Misinformation,
        Category::OffTopic,
    ];

    /// Human-readable label used in explanation reasons.
    pub fn label(self) -> &'static str {
        match self {
            Category::Privacy => "Privacy / PII",
            Category::Toxic => "Toxic / Harassment",
            Category::Promotion => "Promotion / Advertising",
            Category::Misinformation => "Misinformation",
            Category::OffTopic => "Off-topic / Irrelevant",
        }
    }

    /// Categories whose MEDIUM-tier hits may auto-flag without human review.
    pub fn default_high_signal() -> Vec<Category> {
        vec![
            Category::Privacy,
            Category::Toxic,
            Category::Promotion,
            Category::Misinformation,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_declaration_order() {
        assert!(Category::Privacy < Category::Toxic);
        assert!(Category::Toxic < Category::Promotion);
        assert!(Category::Promotion < Category::Misinformation);
        assert!(Category::Misinformation < Category::OffTopic);
    }

    #[test]
    fn serde_round_trip_uses_snake_case() {
        let v = serde_json::to_value(Category::OffTopic).unwrap();
        assert_eq!(v, serde_json::json!("off_topic"));
        let c: Category = serde_json::from_value(serde_json::json!("privacy")).unwrap();
        assert_eq!(c, Category::Privacy);
    }

    #[test]
    fn off_topic_is_not_high_signal() {
        assert!(!Category::default_high_signal().contains(&Category::OffTopic));
    }
}
