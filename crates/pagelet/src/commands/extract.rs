//! AI response extraction command.

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use pagelet_source::{extract_code, require_code};

/// Run the extract command.
pub fn run(file: Option<&Path>, strict: bool) -> Result<()> {
    let text = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            text
        }
    };

    println!("{}", extract(&text, strict)?);
    Ok(())
}

fn extract(text: &str, strict: bool) -> Result<String> {
    if strict {
        Ok(require_code(text)?)
    } else {
        Ok(extract_code(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lenient_extraction_passes_text_through() {
        assert_eq!(extract("return null;", false).unwrap(), "return null;");
    }

    #[test]
    fn strict_extraction_requires_a_fence() {
        assert!(extract("Sure! Here you go.", true).is_err());
        assert_eq!(
            extract("Sure!\n\n```jsx\nreturn <View/>;\n```\n", true).unwrap(),
            "return <View/>;"
        );
    }
}
