/// Text and slug utility functions / 文本与 slug 工具函数
use once_cell::sync::Lazy;
use regex::Regex;

/// Normalize a slug: trim + lowercase / 规范化 slug
///
/// Slugs are the unique keys of both the article store and the index, so
/// every boundary runs the same normalization.
pub fn normalize_slug(slug: &str) -> String {
    slug.trim().to_lowercase()
}

/// Normalize a search term / 规范化搜索词
pub fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}

/// Lowercase and collapse all whitespace runs to single spaces / 小写并压缩空白
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

static MD_CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static MD_INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]*`").unwrap());
static MD_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static MD_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static MD_HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());
static MD_MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[#>*_~|]+").unwrap());

/// Strip markdown syntax, keeping the readable text / 去除 markdown 语法
pub fn strip_markdown(content: &str) -> String {
    let text = MD_CODE_FENCE.replace_all(content, " ");
    let text = MD_INLINE_CODE.replace_all(&text, " ");
    let text = MD_IMAGE.replace_all(&text, " ");
    let text = MD_LINK.replace_all(&text, "$1");
    let text = MD_HTML_TAG.replace_all(&text, " ");
    MD_MARKUP.replace_all(&text, " ").to_string()
}

/// Truncate to at most `max_chars` characters / 按字符数截断
///
/// Counts chars, not bytes, so multi-byte text never splits mid-codepoint.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Derive a bounded preview from markdown content / 从正文派生摘要
pub fn derive_excerpt(content: &str, max_chars: usize) -> String {
    let stripped = strip_markdown(content);
    let flat = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&flat, max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello\n\tWorld  "), "hello world");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_strip_markdown() {
        let md = "# Title\n\nSome [link](https://example.com) and `code` here.\n```rust\nfn x() {}\n```\nDone.";
        let text = normalize_text(&strip_markdown(md));
        assert!(text.contains("link"));
        assert!(!text.contains("https://example.com"));
        assert!(!text.contains("fn x"));
        assert!(text.contains("done"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        let long = "a".repeat(20);
        let cut = truncate_chars(&long, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with('…'));
        // 多字节字符不截断 / never split multi-byte chars
        let zh = "中文内容测试";
        assert_eq!(truncate_chars(zh, 3).chars().count(), 3);
    }

    #[test]
    fn test_derive_excerpt() {
        let excerpt = derive_excerpt("## Backup\n\nRun the *nightly* job.", 100);
        assert_eq!(excerpt, "Backup Run the nightly job.");
    }
}
