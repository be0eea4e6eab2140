// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fetch-and-untar helper for tool bootstrap.
//!
//! The driver only needs "get this HTTPS tarball unpacked into that
//! directory"; the trait seam keeps the managers testable without a
//! network.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::DriverError;

/// Download a gzipped tarball and unpack it.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_untar(&self, url: &str, dest: &Path) -> Result<(), DriverError>;
}

/// The real thing: reqwest + gzip + tar.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_untar(&self, url: &str, dest: &Path) -> Result<(), DriverError> {
        info!(url, dest = %dest.display(), "fetching tarball");
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;

        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let decoder = flate2::read::GzDecoder::new(bytes.as_ref());
            let mut archive = tar::Archive::new(decoder);
            archive.unpack(&dest).map_err(|source| DriverError::Io {
                path: dest.clone(),
                source,
            })
        })
        .await
        .map_err(|join_err| DriverError::Io {
            path: std::path::PathBuf::from("<untar task>"),
            source: std::io::Error::other(join_err),
        })??;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! A fetcher that "unpacks" a fixed file set, for tests.

    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct FakeFetcher {
        pub calls: Mutex<Vec<String>>,
        pub files: Vec<(String, Vec<u8>)>,
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch_untar(&self, url: &str, dest: &Path) -> Result<(), DriverError> {
            self.calls.lock().push(url.to_string());
            for (name, contents) in &self.files {
                let path = dest.join(name);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|source| DriverError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                std::fs::write(&path, contents).map_err(|source| DriverError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
            Ok(())
        }
    }
}
