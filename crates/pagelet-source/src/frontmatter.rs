//! Frontmatter extraction and parsing.

use serde::{Deserialize, Serialize};

/// Parsed frontmatter of a page file.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PageMeta {
    /// Page title
    #[serde(default)]
    pub title: String,

    /// Slug override; defaults to the file stem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    /// Whether the page is visible to app users
    #[serde(default)]
    pub published: bool,
}

/// Extract frontmatter from a page file.
///
/// Returns the parsed frontmatter and the remaining content after the frontmatter block.
pub fn extract_frontmatter(source: &str) -> Result<(Option<PageMeta>, &str), FrontmatterError> {
    let trimmed = source.trim_start();

    if !trimmed.starts_with("---") {
        return Ok((None, source));
    }

    let after_open = &trimmed[3..];
    let Some(close_pos) = after_open.find("\n---") else {
        return Err(FrontmatterError::Unclosed);
    };

    let yaml_content = after_open[..close_pos].trim();
    let remaining = &after_open[close_pos + 4..];

    let meta: PageMeta = if yaml_content.is_empty() {
        PageMeta::default()
    } else {
        serde_yaml::from_str(yaml_content).map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?
    };

    Ok((Some(meta), remaining.trim_start()))
}

/// Errors that can occur when parsing frontmatter.
#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("Unclosed frontmatter block - missing closing ---")]
    Unclosed,

    #[error("Invalid YAML in frontmatter: {0}")]
    InvalidYaml(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_valid_frontmatter() {
        let source = r#"---
title: Welcome
slug: home
published: true
---

return <View />;
"#;

        let (meta, content) = extract_frontmatter(source).unwrap();
        let meta = meta.unwrap();

        assert_eq!(meta.title, "Welcome");
        assert_eq!(meta.slug.as_deref(), Some("home"));
        assert!(meta.published);
        assert!(content.starts_with("return <View />;"));
    }

    #[test]
    fn handles_no_frontmatter() {
        let source = "return <Text>Hi</Text>;";

        let (meta, content) = extract_frontmatter(source).unwrap();

        assert!(meta.is_none());
        assert_eq!(content, source);
    }

    #[test]
    fn missing_fields_default() {
        let (meta, _) = extract_frontmatter("---\ntitle: Draft\n---\nreturn null;").unwrap();
        assert_eq!(
            meta.unwrap(),
            PageMeta {
                title: "Draft".to_string(),
                slug: None,
                published: false,
            }
        );
    }

    #[test]
    fn errors_on_unclosed_frontmatter() {
        let result = extract_frontmatter("---\ntitle: Test\nreturn <View/>;");
        assert!(matches!(result, Err(FrontmatterError::Unclosed)));
    }

    #[test]
    fn errors_on_invalid_yaml() {
        let result = extract_frontmatter("---\ntitle: [invalid yaml\n---\n");
        assert!(matches!(result, Err(FrontmatterError::InvalidYaml(_))));
    }
}
