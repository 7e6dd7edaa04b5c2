//! Collection of manifest text from the places a `-f` flag can point: local files,
//! directories of manifests, `-` for stdin, and http(s) urls. Inputs are concatenated
//! in the order given, and directory entries are visited in name order so runs are
//! deterministic.

use crate::manifest::parse_manifests;
use crate::resource::DesiredObject;

use anyhow::{anyhow, bail, Context};
use hyper::client::HttpConnector;
use hyper_openssl::HttpsConnector;

use std::io::Read;
use std::path::Path;

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Reads and decodes every manifest named by `filenames`. `-` selects stdin and must
/// be the only input when used.
pub async fn read_sources(
    filenames: &[String],
    recursive: bool,
) -> anyhow::Result<Vec<DesiredObject>> {
    if filenames.iter().any(|f| f == "-") {
        if filenames.len() != 1 {
            bail!("'-f -' reads from stdin and cannot be combined with other inputs");
        }
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("failed to read manifests from stdin")?;
        return parse_manifests(&input).context("failed to decode manifests from stdin");
    }

    let mut docs = Vec::new();
    for filename in filenames {
        if filename.starts_with("http://") || filename.starts_with("https://") {
            let input = fetch_url(filename).await?;
            let mut decoded = parse_manifests(&input)
                .with_context(|| format!("failed to decode manifests from url '{}'", filename))?;
            docs.append(&mut decoded);
        } else {
            read_path(Path::new(filename), recursive, &mut docs)?;
        }
    }
    Ok(docs)
}

fn read_path(path: &Path, recursive: bool, docs: &mut Vec<DesiredObject>) -> anyhow::Result<()> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("failed to read manifest path '{}'", path.display()))?;

    if metadata.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(path)
            .with_context(|| format!("failed to list directory '{}'", path.display()))?
            .collect::<Result<_, _>>()
            .with_context(|| format!("failed to list directory '{}'", path.display()))?;
        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let entry_path = entry.path();
            if entry_path.is_dir() {
                if recursive {
                    read_path(&entry_path, recursive, docs)?;
                }
            } else if has_manifest_extension(&entry_path) {
                read_path(&entry_path, recursive, docs)?;
            }
        }
        return Ok(());
    }

    // a file named directly is always read, whatever its extension
    let input = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest file '{}'", path.display()))?;
    let mut decoded = parse_manifests(&input)
        .with_context(|| format!("failed to decode manifests in '{}'", path.display()))?;
    docs.append(&mut decoded);
    Ok(())
}

fn has_manifest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MANIFEST_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

async fn fetch_url(url: &str) -> anyhow::Result<String> {
    let https = HttpsConnector::new().context("failed to initialize TLS for manifest fetch")?;
    let client: hyper::Client<HttpsConnector<HttpConnector>> =
        hyper::Client::builder().build(https);

    let uri: hyper::Uri = url
        .parse()
        .with_context(|| format!("invalid manifest url '{}'", url))?;
    let response = client
        .get(uri)
        .await
        .with_context(|| format!("failed to fetch manifest url '{}'", url))?;
    if !response.status().is_success() {
        return Err(anyhow!(
            "manifest url '{}' returned status {}",
            url,
            response.status()
        ));
    }
    let body = hyper::body::to_bytes(response.into_body())
        .await
        .with_context(|| format!("failed to read manifest body from '{}'", url))?;
    String::from_utf8(body.to_vec())
        .with_context(|| format!("manifest body from '{}' is not valid utf-8", url))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognizes_manifest_extensions() {
        assert!(has_manifest_extension(Path::new("deploy.yaml")));
        assert!(has_manifest_extension(Path::new("deploy.yml")));
        assert!(has_manifest_extension(Path::new("deploy.json")));
        assert!(!has_manifest_extension(Path::new("notes.txt")));
        assert!(!has_manifest_extension(Path::new("Makefile")));
    }

    #[tokio::test]
    async fn stdin_cannot_be_combined_with_files() {
        let inputs = vec!["-".to_owned(), "app.yaml".to_owned()];
        let result = read_sources(&inputs, false).await;
        assert!(result.is_err());
    }
}
