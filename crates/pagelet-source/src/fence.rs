//! Fenced code block extraction.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};

/// Language tag of a code fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FenceLanguage {
    Jsx,
    JavaScript,
    /// A fence without an info string
    #[default]
    Untagged,
    Other,
}

impl FenceLanguage {
    /// Parse language from a code fence info string.
    pub fn from_info(info: &str) -> Self {
        let lang = info.split_whitespace().next().unwrap_or("");
        match lang.to_lowercase().as_str() {
            "" => Self::Untagged,
            "jsx" => Self::Jsx,
            "js" | "javascript" => Self::JavaScript,
            _ => Self::Other,
        }
    }

    /// Whether a fence in this language holds component source.
    pub fn is_component_source(&self) -> bool {
        matches!(self, Self::Jsx | Self::JavaScript | Self::Untagged)
    }
}

/// A fenced code block.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeFence {
    pub language: FenceLanguage,

    /// Block content without surrounding whitespace
    pub source: String,
}

/// Errors from strict code extraction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FenceError {
    #[error("Response contains no fenced code block")]
    NoCodeBlock,

    #[error("Fenced code block is empty")]
    Empty,
}

/// All fenced code blocks in document order. Indented blocks are ignored.
pub fn find_fences(text: &str) -> Vec<CodeFence> {
    let mut fences = Vec::new();
    let mut current: Option<(FenceLanguage, String)> = None;

    for event in Parser::new(text) {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                current = Some((FenceLanguage::from_info(&info), String::new()));
            }
            Event::Text(chunk) => {
                if let Some((_, ref mut source)) = current {
                    source.push_str(&chunk);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((language, source)) = current.take() {
                    fences.push(CodeFence {
                        language,
                        source: source.trim().to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    fences
}

/// Component source from an AI response.
///
/// Prefers the first fence tagged `jsx`, `javascript`, `js` or untagged,
/// then the first fence of any language. Text without fences is returned
/// unchanged.
pub fn extract_code(text: &str) -> String {
    let fences = find_fences(text);
    fences
        .iter()
        .find(|fence| fence.language.is_component_source())
        .or_else(|| fences.first())
        .map(|fence| fence.source.clone())
        .unwrap_or_else(|| text.to_string())
}

/// Like [`extract_code`], but a response without a non-empty fence is an error.
pub fn require_code(text: &str) -> Result<String, FenceError> {
    let fences = find_fences(text);
    let fence = fences
        .iter()
        .find(|fence| fence.language.is_component_source())
        .or_else(|| fences.first())
        .ok_or(FenceError::NoCodeBlock)?;
    if fence.source.is_empty() {
        return Err(FenceError::Empty);
    }
    Ok(fence.source.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_language() {
        assert_eq!(FenceLanguage::from_info("jsx"), FenceLanguage::Jsx);
        assert_eq!(FenceLanguage::from_info("JavaScript title=x"), FenceLanguage::JavaScript);
        assert_eq!(FenceLanguage::from_info(""), FenceLanguage::Untagged);
        assert_eq!(FenceLanguage::from_info("bash"), FenceLanguage::Other);
    }

    #[test]
    fn extracts_first_component_fence() {
        let response = r#"Here is your screen:

```bash
npm install
```

```jsx
const App = () => <View />;
return <App />;
```

```js
return null;
```
"#;
        assert_eq!(extract_code(response), "const App = () => <View />;\nreturn <App />;");
    }

    #[test]
    fn accepts_untagged_fence() {
        assert_eq!(extract_code("```\nreturn <View/>;\n```"), "return <View/>;");
    }

    #[test]
    fn falls_back_to_any_fence() {
        assert_eq!(extract_code("```tsx\nreturn <Text/>;\n```"), "return <Text/>;");
    }

    #[test]
    fn text_without_fences_is_unchanged() {
        let text = "return <View/>;\n";
        assert_eq!(extract_code(text), text);
    }

    #[test]
    fn strict_extraction_reports_missing_fences() {
        assert_eq!(require_code("just prose"), Err(FenceError::NoCodeBlock));
        assert_eq!(require_code("```jsx\n```"), Err(FenceError::Empty));
        assert_eq!(require_code("```js\nreturn 1;\n```").unwrap(), "return 1;");
    }
}
