//! Initialize a pagelet project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pagelet_source::{render_page, PageMeta};

/// Run the init command.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing pagelet...");

    let root = config_path.parent().unwrap_or(Path::new(""));
    scaffold(config_path, &root.join("pages"), yes)?;

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'pagelet dev' to start the live preview server.");

    Ok(())
}

fn scaffold(config_path: &Path, pages_dir: &Path, yes: bool) -> Result<()> {
    if !config_path.exists() || yes {
        fs::write(config_path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        tracing::info!("Created {}", config_path.display());
    } else {
        tracing::warn!("{} already exists. Use --yes to overwrite.", config_path.display());
    }

    fs::create_dir_all(pages_dir).context("Failed to create pages directory")?;

    let home_path = pages_dir.join("home.jsx");
    if !home_path.exists() || yes {
        let meta = PageMeta {
            title: "Home".to_string(),
            slug: Some("home".to_string()),
            published: false,
        };
        fs::write(&home_path, render_page(&meta, DEFAULT_HOME)).context("Failed to write home.jsx")?;
        tracing::info!("Created {}", home_path.display());
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Pagelet Configuration

[pages]
# Page sources (*.jsx)
dir = "pages"

[store]
# Compiled page records (JSON)
dir = ".pagelet/records"

[sandbox]
# Evaluation budget per host-to-sandbox entry
max_steps = 5000000
max_call_depth = 200
max_array_length = 1048576
max_string_length = 67108864

[preview]
# Exposed to pages as props.route.params
route_params = {}

[server]
host = "127.0.0.1"
port = 7878
"#;

const DEFAULT_HOME: &str = r##"const styles = StyleSheet.create({
  container: { flex: 1, padding: 24, justifyContent: "center" },
  title: { fontSize: 24, fontWeight: "600", marginBottom: 12 },
  button: { backgroundColor: "#2563eb", padding: 12, borderRadius: 8 },
  label: { color: "#fff", textAlign: "center" },
});

const Home = () => {
  const [count, setCount] = useState(0);

  return (
    <SafeAreaView style={styles.container}>
      <Text style={styles.title}>Hello from pagelet</Text>
      <TouchableOpacity style={styles.button} onPress={() => setCount(count + 1)}>
        <Text style={styles.label}>Tapped {count} times</Text>
      </TouchableOpacity>
    </SafeAreaView>
  );
};

return <Home />;
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use pagelet_source::parse_page;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn scaffolds_config_and_home_page() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("pagelet.toml");
        let pages_dir = dir.path().join("pages");

        scaffold(&config_path, &pages_dir, false).unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.server.port, 7878);

        let home = fs::read_to_string(pages_dir.join("home.jsx")).unwrap();
        let page = parse_page(&home).unwrap();
        assert_eq!(page.meta.unwrap().slug.as_deref(), Some("home"));
        assert!(page.source.ends_with("return <Home />;\n"));
    }

    #[test]
    fn keeps_existing_files_without_yes() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("pagelet.toml");
        fs::write(&config_path, "[server]\nport = 1\n").unwrap();

        scaffold(&config_path, &dir.path().join("pages"), false).unwrap();
        assert_eq!(fs::read_to_string(&config_path).unwrap(), "[server]\nport = 1\n");

        scaffold(&config_path, &dir.path().join("pages"), true).unwrap();
        assert_eq!(fs::read_to_string(&config_path).unwrap(), DEFAULT_CONFIG);
    }

    #[test]
    fn starter_page_renders() {
        let json = crate::commands::check::check_source(
            Default::default(),
            Default::default(),
            DEFAULT_HOME.to_string(),
        )
        .unwrap();
        assert!(json.contains("Hello from pagelet"));
    }
}
