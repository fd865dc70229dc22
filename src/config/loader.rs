//! Loads [`ServerConfig`] from a YAML file via the `config` crate, then runs
//! [`ServerConfigValidator`] over the result.

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, eyre};
use config::{Config, File, FileFormat};

use crate::config::{models::ServerConfig, validation::ServerConfigValidator};

/// Reads and validates the configuration at `path`. Any failure here is
/// startup-fatal; callers are expected to log the error and exit rather than
/// attempt to recover.
pub async fn load_config(path: &str) -> Result<ServerConfig> {
    let path = path.to_string();
    tokio::task::spawn_blocking(move || load_config_sync(&path))
        .await
        .wrap_err("config loading task panicked")?
}

fn load_config_sync(path: &str) -> Result<ServerConfig> {
    let config_path = Path::new(path);
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml,
    };

    let settings = Config::builder()
        .add_source(File::new(path, format))
        .build()
        .wrap_err_with(|| format!("failed to read configuration file '{path}'"))?;

    let parsed: ServerConfig = settings
        .try_deserialize()
        .wrap_err("configuration does not match the expected schema")?;

    ServerConfigValidator::validate(&parsed).map_err(|e| eyre!(e))?;

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write fixture");
        file
    }

    #[tokio::test]
    async fn loads_a_minimal_valid_config() {
        let file = write_fixture(
            r#"
server:
  bind_ip: "0.0.0.0"
  bind_port: 8080
balancer:
  routing_strategy: hybrid
services:
  - name: users
    path_prefix: /api/users
    strategy: round_robin
    backends:
      - "http://127.0.0.1:9001"
      - "http://127.0.0.1:9002"
"#,
        );

        let config = load_config(file.path().to_str().unwrap())
            .await
            .expect("config loads");
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.server.bind_port, 8080);
    }

    #[tokio::test]
    async fn rejects_config_with_no_services() {
        let file = write_fixture(
            r#"
server:
  bind_ip: "0.0.0.0"
  bind_port: 8080
"#,
        );

        let result = load_config(file.path().to_str().unwrap()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let result = load_config("/nonexistent/path/to/config").await;
        assert!(result.is_err());
    }
}
