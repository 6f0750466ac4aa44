use scene::records::IndoorOutdoor;
use serde::{Deserialize, Serialize};

/// Maps a ride category to an icon when any keyword occurs in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconRule {
    pub keywords: Vec<String>,
    pub icon: String,
}

impl IconRule {
    pub fn new(icon: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            icon: icon.into(),
        }
    }

    fn matches(&self, category_lower: &str) -> bool {
        self.keywords.iter().any(|k| category_lower.contains(k.as_str()))
    }
}

/// Icon lookup for the detail surface. First matching rule wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbology {
    pub rules: Vec<IconRule>,
    pub fallback_icon: String,
    pub indoor_badge: String,
    pub outdoor_badge: String,
}

impl Default for Symbology {
    fn default() -> Self {
        Self {
            rules: vec![
                IconRule::new("icon.swing", &["swing", "그네"]),
                IconRule::new("icon.slide", &["slide", "미끄럼"]),
                IconRule::new("icon.seesaw", &["seesaw", "시소"]),
                IconRule::new("icon.climbing", &["climb", "정글짐", "등반"]),
                IconRule::new("icon.sandbox", &["sand", "모래"]),
                IconRule::new("icon.spring_rider", &["spring", "흔들"]),
                IconRule::new("icon.combination", &["combination", "조합"]),
            ],
            fallback_icon: "icon.playground".to_string(),
            indoor_badge: "badge.indoor".to_string(),
            outdoor_badge: "badge.outdoor".to_string(),
        }
    }
}

impl Symbology {
    pub fn icon_for_category(&self, category: &str) -> &str {
        let lower = category.trim().to_lowercase();
        if lower.is_empty() {
            return self.fallback_icon.as_str();
        }
        self.rules
            .iter()
            .find(|r| r.matches(&lower))
            .map(|r| r.icon.as_str())
            .unwrap_or(self.fallback_icon.as_str())
    }

    pub fn badge_for(&self, kind: IndoorOutdoor) -> Option<&str> {
        match kind {
            IndoorOutdoor::Indoor => Some(self.indoor_badge.as_str()),
            IndoorOutdoor::Outdoor => Some(self.outdoor_badge.as_str()),
            IndoorOutdoor::Unknown => None,
        }
    }
}
