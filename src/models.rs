use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Fixed excerpt shown instead of protected content / 受保护内容的固定占位摘要
///
/// Used wherever a preview would otherwise leak encrypted, confidential or
/// integrity-unverified plaintext.
pub const PROTECTED_EXCERPT: &str = "[protected content]";

/// Security profile of an article / 文章安全级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityProfile {
    #[default]
    Standard,
    Sensitive,
    Confidential,
}

impl SecurityProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Sensitive => "sensitive",
            Self::Confidential => "confidential",
        }
    }

    /// Parse, clamping unknown values to `standard` / 解析，未知值回落为 standard
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "sensitive" => Self::Sensitive,
            "confidential" => Self::Confidential,
            _ => Self::Standard,
        }
    }
}

impl Serialize for SecurityProfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SecurityProfile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Persisted documents may be hand-edited; clamp anything unknown
        let v = serde_json::Value::deserialize(deserializer)?;
        Ok(v.as_str().map(Self::from_str_loose).unwrap_or_default())
    }
}

/// Who may see an article / 可见范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    All,
    Restricted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Restricted => "restricted",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "restricted" => Self::Restricted,
            _ => Self::All,
        }
    }
}

impl Serialize for Visibility {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Visibility {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = serde_json::Value::deserialize(deserializer)?;
        Ok(v.as_str().map(Self::from_str_loose).unwrap_or_default())
    }
}

/// Strict boolean coercion for untrusted documents / 严格布尔值解析
///
/// Only a literal JSON `true` counts; strings, numbers and other junk from a
/// hand-edited file never silently become `true`.
pub(crate) fn de_strict_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(matches!(v, serde_json::Value::Bool(true)))
}

/// Security-annotated article summary / 带安全标注的文章摘要
///
/// What the store hands out when enumerating articles. The `excerpt` is
/// already redacted by the store for protected content.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ArticleSummary {
    pub slug: String,
    pub title: String,
    pub category_id: String,
    pub category_name: String,
    pub security_profile: SecurityProfile,
    #[serde(deserialize_with = "de_strict_bool")]
    pub sensitive: bool,
    pub visibility: Visibility,
    pub allowed_users: Vec<String>,
    pub allowed_groups: Vec<String>,
    #[serde(deserialize_with = "de_strict_bool")]
    pub encrypted: bool,
    pub tags: Vec<String>,
    pub excerpt: String,
    pub updated_at: String,
    pub updated_by: String,
}

/// Fully resolved article / 完整文章
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    #[serde(flatten)]
    pub summary: ArticleSummary,
    pub content: String,
    /// Whether content may be exposed to search / 内容是否可用于搜索
    ///
    /// False when the article is encrypted, confidential, or its checksum
    /// failed verification.
    pub content_safe: bool,
}

/// Draft used by the write path / 写入用草稿
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleDraft {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub category_id: String,
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub security_profile: SecurityProfile,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub allowed_users: Vec<String>,
    #[serde(default)]
    pub allowed_groups: Vec<String>,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content: String,
    #[serde(default)]
    pub updated_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_clamps_unknown() {
        assert_eq!(SecurityProfile::from_str_loose("Confidential"), SecurityProfile::Confidential);
        assert_eq!(SecurityProfile::from_str_loose("top-secret"), SecurityProfile::Standard);
        assert_eq!(Visibility::from_str_loose("restricted"), Visibility::Restricted);
        assert_eq!(Visibility::from_str_loose("everyone"), Visibility::All);
    }

    #[test]
    fn test_strict_bool_rejects_truthy_junk() {
        let s: ArticleSummary =
            serde_json::from_str(r#"{"slug":"a","encrypted":"yes","sensitive":1}"#).unwrap();
        assert!(!s.encrypted);
        assert!(!s.sensitive);

        let s: ArticleSummary = serde_json::from_str(r#"{"slug":"a","encrypted":true}"#).unwrap();
        assert!(s.encrypted);
    }
}
