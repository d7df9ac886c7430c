use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory with an initial `config.json` and an empty server database.
///
/// # Arguments
/// - `hodol_home` - The directory that will be the root of data directory, e.g. `$HOME/hodol`
/// - `api_url` - Where client commands reach the API
/// - `token` - The household token client commands present; may be empty
///
/// # Errors
/// - Returns an error if the directory is already initialized or any file operation fails.
pub async fn init(hodol_home: &Path, api_url: &str, token: &str) -> Result<Out<()>> {
    let config = Config::create(hodol_home, api_url, token)
        .await
        .context("Unable to create the data directory and configs")?;
    Ok(format!(
        "Successfully created the hodol directory at {}",
        config.root().display()
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_twice() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("hodol");
        let out = init(&home, "http://localhost:3001/api", "doldol")
            .await
            .unwrap();
        assert!(out.message().starts_with("Successfully created"));
        assert!(home.join("config.json").is_file());
        assert!(init(&home, "http://localhost:3001/api", "").await.is_err());
    }
}
