//! Page files: frontmatter plus component source.

use crate::frontmatter::{extract_frontmatter, FrontmatterError, PageMeta};

/// A parsed page file.
#[derive(Debug, Clone, PartialEq)]
pub struct PageFile {
    /// Frontmatter, when the file has any
    pub meta: Option<PageMeta>,

    /// Component source handed to the transpiler
    pub source: String,
}

/// Split a page file into frontmatter and component source.
pub fn parse_page(text: &str) -> Result<PageFile, FrontmatterError> {
    let (meta, source) = extract_frontmatter(text)?;
    Ok(PageFile {
        meta,
        source: source.to_string(),
    })
}

/// Write a page file back out; the inverse of [`parse_page`].
pub fn render_page(meta: &PageMeta, source: &str) -> String {
    let mut out = String::from("---\n");
    out.push_str(&format!("title: {}\n", yaml_string(&meta.title)));
    if let Some(slug) = &meta.slug {
        out.push_str(&format!("slug: {}\n", yaml_string(slug)));
    }
    out.push_str(&format!("published: {}\n", meta.published));
    out.push_str("---\n\n");
    out.push_str(source);
    if !source.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// A YAML scalar that always reads back as the same string.
fn yaml_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_page_with_frontmatter() {
        let page = parse_page("---\ntitle: Home\n---\n\nreturn <View />;\n").unwrap();
        assert_eq!(page.meta.unwrap().title, "Home");
        assert_eq!(page.source, "return <View />;\n");
    }

    #[test]
    fn plain_source_has_no_meta() {
        let page = parse_page("return <View />;").unwrap();
        assert_eq!(page.meta, None);
        assert_eq!(page.source, "return <View />;");
    }

    #[test]
    fn rendered_pages_parse_back() {
        let meta = PageMeta {
            title: "Say \"hi\": now".to_string(),
            slug: Some("greeting".to_string()),
            published: true,
        };
        let text = render_page(&meta, "return <Text>hi</Text>;");
        let page = parse_page(&text).unwrap();
        assert_eq!(page.meta, Some(meta));
        assert_eq!(page.source, "return <Text>hi</Text>;\n");
    }
}
