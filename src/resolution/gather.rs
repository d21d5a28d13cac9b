use crate::{
    DEFAULT_MAX_DEGREE_OF_PARALLELISM, DEFAULT_REQUEST_TIMEOUT_SECS, DependencyBehavior,
    NuGetError, PackageId, PackageIdentity, ResolutionContext, SourceDependencyInfo,
    TargetFramework, ports::SourceRepository,
};
use futures::{StreamExt, TryStreamExt, stream};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Inputs of one gather run.
#[derive(Clone)]
pub struct GatherContext {
    /// Exact identities that must come from the primary sources.
    pub primary_targets: Vec<PackageIdentity>,
    /// Ids whose every version is requested from the primary sources.
    pub primary_target_ids: Vec<PackageId>,
    pub installed_packages: Vec<PackageIdentity>,
    pub target_framework: TargetFramework,
    pub primary_sources: Vec<Arc<dyn SourceRepository>>,
    pub all_sources: Vec<Arc<dyn SourceRepository>>,
    pub packages_folder_source: Option<Arc<dyn SourceRepository>>,
    pub resolution_context: ResolutionContext,
    pub allow_downgrades: bool,
    pub is_update_all: bool,
    pub max_degree_of_parallelism: usize,
    pub request_timeout: Duration,
}

impl GatherContext {
    pub fn new(
        target_framework: TargetFramework,
        primary_sources: Vec<Arc<dyn SourceRepository>>,
        all_sources: Vec<Arc<dyn SourceRepository>>,
        resolution_context: ResolutionContext,
    ) -> Self {
        Self {
            primary_targets: Vec::new(),
            primary_target_ids: Vec::new(),
            installed_packages: Vec::new(),
            target_framework,
            primary_sources,
            all_sources,
            packages_folder_source: None,
            resolution_context,
            allow_downgrades: false,
            is_update_all: false,
            max_degree_of_parallelism: DEFAULT_MAX_DEGREE_OF_PARALLELISM,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_primary_targets(mut self, targets: Vec<PackageIdentity>) -> Self {
        self.primary_targets = targets;
        self
    }

    pub fn with_primary_target_ids(mut self, ids: Vec<PackageId>) -> Self {
        self.primary_target_ids = ids;
        self
    }

    pub fn with_installed_packages(mut self, installed: Vec<PackageIdentity>) -> Self {
        self.installed_packages = installed;
        self
    }

    pub fn with_packages_folder_source(mut self, source: Arc<dyn SourceRepository>) -> Self {
        self.packages_folder_source = Some(source);
        self
    }

    pub fn with_allow_downgrades(mut self, allow: bool) -> Self {
        self.allow_downgrades = allow;
        self
    }

    pub fn with_update_all(mut self, is_update_all: bool) -> Self {
        self.is_update_all = is_update_all;
        self
    }

    pub fn with_max_degree_of_parallelism(mut self, max: usize) -> Self {
        self.max_degree_of_parallelism = max.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

struct GatherRequest {
    order: usize,
    source: Arc<dyn SourceRepository>,
    id: PackageId,
    version: Option<Version>,
    ignore_errors: bool,
    is_installed: bool,
}

struct GatherResult {
    order: usize,
    is_installed: bool,
    packages: Vec<SourceDependencyInfo>,
}

/// Collects dependency information for the targets, the installed packages
/// and everything reachable from them.
pub async fn gather(
    context: &GatherContext,
    token: &CancellationToken,
) -> Result<Vec<SourceDependencyInfo>, NuGetError> {
    Gatherer::new(context).run(token).await
}

struct Gatherer<'a> {
    context: &'a GatherContext,
    queue: VecDeque<GatherRequest>,
    results: Vec<GatherResult>,
    ids_searched: BTreeSet<PackageId>,
    next_order: usize,
}

impl<'a> Gatherer<'a> {
    fn new(context: &'a GatherContext) -> Self {
        Self {
            context,
            queue: VecDeque::new(),
            results: Vec::new(),
            ids_searched: BTreeSet::new(),
            next_order: 0,
        }
    }

    fn next_order(&mut self) -> usize {
        let order = self.next_order;
        self.next_order += 1;
        order
    }

    fn queue_work(
        &mut self,
        primary: bool,
        id: &PackageId,
        version: Option<&Version>,
        ignore_errors: bool,
        is_installed: bool,
    ) {
        let sources = if primary {
            self.context.primary_sources.clone()
        } else {
            self.context.all_sources.clone()
        };
        for source in sources {
            let order = self.next_order();
            self.queue.push_back(GatherRequest {
                order,
                source,
                id: id.clone(),
                version: version.cloned(),
                ignore_errors,
                is_installed,
            });
        }
    }

    async fn run(mut self, token: &CancellationToken) -> Result<Vec<SourceDependencyInfo>, NuGetError> {
        let started = Instant::now();
        check_cancelled(token)?;

        let context = self.context;
        let mut primary_ids: BTreeSet<PackageId> = BTreeSet::new();
        for target in &context.primary_targets {
            self.ids_searched.insert(target.id.clone());
            primary_ids.insert(target.id.clone());
            self.queue_work(true, &target.id, Some(&target.version), false, false);
        }
        for id in &context.primary_target_ids {
            self.ids_searched.insert(id.clone());
            primary_ids.insert(id.clone());
            self.queue_work(true, id, None, false, false);
        }

        self.gather_installed(&primary_ids, token).await?;

        loop {
            check_cancelled(token)?;
            self.run_queued(token).await?;

            let current = self.merged_results(false);
            if self.context.resolution_context.dependency_behavior != DependencyBehavior::Ignore {
                let installed = self.merged_results(true);
                let closure = closure_ids(&current, &installed, &self.ids_searched);
                let missing: Vec<PackageId> = closure
                    .into_iter()
                    .filter(|id| !self.ids_searched.contains(id))
                    .collect();

                for id in missing {
                    debug!("Gathering dependency '{}' from all sources", id);
                    self.ids_searched.insert(id.clone());
                    self.queue_work(false, &id, None, true, false);
                }
            }

            if self.queue.is_empty() {
                debug!("Total number of results gathered: {}", self.results.len());
                break;
            }
        }

        check_cancelled(token)?;
        let combined = self.merged_results(false);

        if !self.context.is_update_all {
            for id in &primary_ids {
                if combined.iter().any(|p| p.id() == id) {
                    continue;
                }
                let package = self
                    .context
                    .primary_targets
                    .iter()
                    .find(|t| &t.id == id)
                    .map_or_else(|| id.to_string(), ToString::to_string);
                let sources = self
                    .context
                    .primary_sources
                    .iter()
                    .map(|s| s.package_source().source.clone())
                    .collect::<Vec<_>>()
                    .join(",");
                return Err(NuGetError::gather(format!(
                    "Package '{}' is not found in the following primary source(s): '{}'. Please verify all your online package sources are available, and that the package id and version are specified correctly.",
                    package, sources
                )));
            }
        }

        info!(
            "Gathered {} package(s) in {:?}",
            combined.len(),
            started.elapsed()
        );
        Ok(combined)
    }

    /// Installed packages come from the packages folder when present there.
    async fn gather_installed(
        &mut self,
        primary_ids: &BTreeSet<PackageId>,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        let context = self.context;
        let local = match &context.packages_folder_source {
            Some(source) => source
                .dependency_info_resource()
                .await?
                .map(|resource| (source.clone(), resource)),
            None => None,
        };

        for installed in &context.installed_packages {
            if primary_ids.contains(&installed.id) {
                continue;
            }

            let found = match &local {
                Some((source, resource)) => resource
                    .resolve_package(installed, &context.target_framework, token)
                    .await?
                    .map(|info| info.with_source(source.clone())),
                None => None,
            };

            match found {
                Some(info) => {
                    let order = self.next_order();
                    self.results.push(GatherResult {
                        order,
                        is_installed: true,
                        packages: vec![info],
                    });
                }
                None => {
                    debug!("Installed package '{}' is missing from the packages folder", installed);
                    self.queue_work(false, &installed.id, Some(&installed.version), true, true);
                }
            }
        }
        Ok(())
    }

    async fn run_queued(&mut self, token: &CancellationToken) -> Result<(), NuGetError> {
        let batch: Vec<GatherRequest> = self.queue.drain(..).collect();
        if batch.is_empty() {
            return Ok(());
        }

        let context = self.context;
        let finished: Vec<GatherResult> = stream::iter(batch)
            .map(|request| fetch(context, request, token))
            .buffer_unordered(context.max_degree_of_parallelism.max(1))
            .try_collect()
            .await?;

        self.results.extend(finished);
        Ok(())
    }

    /// Results in request order, first instance of each identity wins.
    fn merged_results(&self, installed_only: bool) -> Vec<SourceDependencyInfo> {
        let mut ordered: Vec<&GatherResult> = self
            .results
            .iter()
            .filter(|r| !installed_only || r.is_installed)
            .collect();
        ordered.sort_by_key(|r| r.order);

        let installed: BTreeSet<&PackageIdentity> = self.context.installed_packages.iter().collect();
        let include_unlisted = self.context.resolution_context.include_unlisted;

        let mut merged: BTreeMap<PackageIdentity, SourceDependencyInfo> = BTreeMap::new();
        for package in ordered.into_iter().flat_map(|r| r.packages.iter()) {
            if !package.listed && !include_unlisted && !installed.contains(&package.identity) {
                continue;
            }
            merged
                .entry(package.identity.clone())
                .or_insert_with(|| package.clone());
        }

        if !self.context.allow_downgrades {
            for current in &self.context.installed_packages {
                merged.retain(|identity, _| identity.id != current.id || identity.version >= current.version);
            }
        }

        merged.into_values().collect()
    }
}

async fn fetch(
    context: &GatherContext,
    request: GatherRequest,
    token: &CancellationToken,
) -> Result<GatherResult, NuGetError> {
    let source_name = request.source.package_source().source.clone();
    let work = lookup(context, &request, token);

    let outcome = tokio::select! {
        _ = token.cancelled() => return Err(NuGetError::Cancelled),
        outcome = tokio::time::timeout(context.request_timeout, work) => outcome,
    };

    let packages = match outcome {
        Ok(Ok(packages)) => packages,
        Ok(Err(NuGetError::Cancelled)) => return Err(NuGetError::Cancelled),
        Ok(Err(e)) if request.ignore_errors => {
            warn!("Ignoring failure of '{}' for '{}': {}", source_name, request.id, e);
            Vec::new()
        }
        Ok(Err(e)) => {
            return Err(NuGetError::gather(format!(
                "Unable to gather package '{}' from source '{}': {}",
                request.id, source_name, e
            )));
        }
        Err(_) if request.ignore_errors => {
            warn!("Request for '{}' to '{}' timed out", request.id, source_name);
            Vec::new()
        }
        Err(_) => {
            return Err(NuGetError::gather(format!(
                "Unable to gather package '{}' from source '{}': the request timed out",
                request.id, source_name
            )));
        }
    };

    Ok(GatherResult {
        order: request.order,
        is_installed: request.is_installed,
        packages,
    })
}

async fn lookup(
    context: &GatherContext,
    request: &GatherRequest,
    token: &CancellationToken,
) -> Result<Vec<SourceDependencyInfo>, NuGetError> {
    let Some(resource) = request.source.dependency_info_resource().await? else {
        return Ok(Vec::new());
    };

    let infos = match &request.version {
        Some(version) => {
            let identity = PackageIdentity::new(request.id.clone(), version.clone());
            resource
                .resolve_package(&identity, &context.target_framework, token)
                .await?
                .into_iter()
                .collect()
        }
        None => {
            resource
                .resolve_packages(&request.id, &context.target_framework, token)
                .await?
        }
    };

    Ok(infos
        .into_iter()
        .map(|info| info.with_source(request.source.clone()))
        .collect())
}

/// Ids around the searched packages that still need gathering: their
/// dependencies, their parents, installed ids not found yet and dependency
/// ids with no results at all.
fn closure_ids(
    current: &[SourceDependencyInfo],
    installed: &[SourceDependencyInfo],
    ids_searched: &BTreeSet<PackageId>,
) -> BTreeSet<PackageId> {
    let mut closure = BTreeSet::new();
    let found: BTreeSet<&PackageId> = current.iter().map(|p| p.id()).collect();

    for package in current {
        if ids_searched.contains(package.id()) {
            closure.extend(package.dependencies.iter().map(|d| d.id.clone()));
        }
        if package.dependencies.iter().any(|d| ids_searched.contains(&d.id)) {
            closure.insert(package.id().clone());
        }
        closure.extend(
            package
                .dependencies
                .iter()
                .filter(|d| !found.contains(&d.id))
                .map(|d| d.id.clone()),
        );
    }

    closure.extend(
        installed
            .iter()
            .map(|p| p.id())
            .filter(|id| !found.contains(id))
            .cloned(),
    );

    closure
}

fn check_cancelled(token: &CancellationToken) -> Result<(), NuGetError> {
    if token.is_cancelled() {
        Err(NuGetError::Cancelled)
    } else {
        Ok(())
    }
}
