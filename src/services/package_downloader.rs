use crate::{
    DEFAULT_REQUEST_TIMEOUT_SECS, NuGetError, PackageId, PackageIdentity, ResolutionContext,
    ports::SourceRepository,
};
use futures::{StreamExt, stream::FuturesUnordered};
use semver::Version;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Talks to sources for the three things execution needs: bytes, latest
/// versions and which source has a package.
#[derive(Debug, Clone)]
pub struct PackageDownloader {
    request_timeout: Duration,
}

impl Default for PackageDownloader {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}

impl PackageDownloader {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Reads the package into memory. Any source failure becomes `DownloadFailed`.
    pub async fn download(
        &self,
        source: &Arc<dyn SourceRepository>,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<Vec<u8>, NuGetError> {
        let source_name = source.package_source().name.clone();
        let failed = |message: String| NuGetError::DownloadFailed {
            package: identity.to_string(),
            source_name: source_name.clone(),
            message,
        };

        let work = async {
            let resource = source
                .download_resource()
                .await?
                .ok_or_else(|| NuGetError::source_error(&source_name, "source cannot download packages"))?;
            resource.download(identity, token).await
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => return Err(NuGetError::Cancelled),
            outcome = tokio::time::timeout(self.request_timeout, work) => outcome,
        };

        match outcome {
            Ok(Ok(bytes)) => {
                debug!("Downloaded {} ({} bytes) from '{}'", identity, bytes.len(), source_name);
                Ok(bytes)
            }
            Ok(Err(NuGetError::Cancelled)) => Err(NuGetError::Cancelled),
            Ok(Err(e)) => Err(failed(e.to_string())),
            Err(_) => Err(failed("the request timed out".to_string())),
        }
    }

    /// Highest version of `id` across `sources`, queried concurrently.
    ///
    /// A failing source is skipped; the error is returned only when every source failed.
    pub async fn latest_version(
        &self,
        sources: &[Arc<dyn SourceRepository>],
        id: &PackageId,
        context: &ResolutionContext,
        token: &CancellationToken,
    ) -> Result<Option<Version>, NuGetError> {
        let mut probes: FuturesUnordered<_> = sources
            .iter()
            .map(|source| async move {
                let work = async {
                    match source.metadata_resource().await? {
                        Some(metadata) => {
                            metadata
                                .latest_version(
                                    id,
                                    context.include_prerelease,
                                    context.include_unlisted,
                                    token,
                                )
                                .await
                        }
                        None => Ok(None),
                    }
                };
                match tokio::time::timeout(self.request_timeout, work).await {
                    Ok(result) => result.map_err(|e| (source.package_source().name.clone(), e)),
                    Err(_) => Err((
                        source.package_source().name.clone(),
                        NuGetError::source_error(source.package_source().name.clone(), "the request timed out"),
                    )),
                }
            })
            .collect();

        let mut latest: Option<Version> = None;
        let mut first_error = None;
        let mut answered = 0usize;

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return Err(NuGetError::Cancelled),
                next = probes.next() => next,
            };
            match next {
                Some(Ok(version)) => {
                    answered += 1;
                    if version > latest {
                        latest = version;
                    }
                }
                Some(Err((_, NuGetError::Cancelled))) => return Err(NuGetError::Cancelled),
                Some(Err((name, e))) => {
                    warn!("Unable to get the latest version of '{}' from '{}': {}", id, name, e);
                    first_error.get_or_insert(e);
                }
                None => break,
            }
        }

        match first_error {
            Some(e) if answered == 0 => Err(e),
            _ => Ok(latest),
        }
    }

    /// The first source to report that it has `identity`.
    ///
    /// Probes run concurrently under one timeout; the first hit cancels the rest.
    pub async fn find_source_with_package(
        &self,
        sources: &[Arc<dyn SourceRepository>],
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<Option<Arc<dyn SourceRepository>>, NuGetError> {
        let probe_token = token.child_token();

        let search = async {
            let mut probes: FuturesUnordered<_> = sources
                .iter()
                .map(|source| {
                    let probe_token = probe_token.clone();
                    async move {
                        let found = match source.metadata_resource().await {
                            Ok(Some(metadata)) => tokio::select! {
                                _ = probe_token.cancelled() => Ok(false),
                                found = metadata.exists(identity, &probe_token) => found,
                            },
                            Ok(None) => Ok(false),
                            Err(e) => Err(e),
                        };
                        (source, found)
                    }
                })
                .collect();

            while let Some((source, found)) = probes.next().await {
                match found {
                    Ok(true) => {
                        probe_token.cancel();
                        return Some(source.clone());
                    }
                    Ok(false) => {}
                    Err(e) => debug!("'{}' could not check {}: {}", source.package_source().name, identity, e),
                }
            }
            None
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => return Err(NuGetError::Cancelled),
            outcome = tokio::time::timeout(self.request_timeout, search) => outcome,
        };
        probe_token.cancel();

        match outcome {
            Ok(found) => Ok(found),
            Err(_) => {
                warn!("Timed out looking for a source with {}", identity);
                Ok(None)
            }
        }
    }
}
