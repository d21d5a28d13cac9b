use crate::{PackageSource, ports::{SourceRepository, SourceRepositoryFactory}};
use std::sync::Arc;

/// An immutable snapshot of the configured sources.
///
/// Resolutions hold on to the snapshot they started with; `reload` builds a
/// new one instead of changing this one underneath them.
#[derive(Clone)]
pub struct SourceRepositoryProvider {
    factory: Arc<dyn SourceRepositoryFactory>,
    repositories: Arc<[Arc<dyn SourceRepository>]>,
}

impl SourceRepositoryProvider {
    pub fn new(factory: Arc<dyn SourceRepositoryFactory>, sources: &[PackageSource]) -> Self {
        let repositories = sources.iter().map(|s| factory.create(s)).collect();
        Self {
            factory,
            repositories,
        }
    }

    /// Every repository, disabled ones included, in configuration order.
    pub fn repositories(&self) -> &[Arc<dyn SourceRepository>] {
        &self.repositories
    }

    pub fn enabled(&self) -> Vec<Arc<dyn SourceRepository>> {
        self.repositories
            .iter()
            .filter(|r| r.package_source().enabled)
            .cloned()
            .collect()
    }

    pub fn find(&self, source: &PackageSource) -> Option<Arc<dyn SourceRepository>> {
        self.repositories
            .iter()
            .find(|r| r.package_source() == source)
            .cloned()
    }

    /// Returns the repository for `source`, creating one when it is not part of the snapshot.
    pub fn create(&self, source: &PackageSource) -> Arc<dyn SourceRepository> {
        self.find(source).unwrap_or_else(|| self.factory.create(source))
    }

    pub fn reload(&self, sources: &[PackageSource]) -> Self {
        Self::new(self.factory.clone(), sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::test_support::NamedSource;

    struct Factory;

    impl SourceRepositoryFactory for Factory {
        fn create(&self, source: &PackageSource) -> Arc<dyn SourceRepository> {
            Arc::new(NamedSource(source.clone()))
        }
    }

    #[test]
    fn test_reload_leaves_old_snapshot_untouched() {
        let first = SourceRepositoryProvider::new(
            Arc::new(Factory),
            &[
                PackageSource::new("one", "https://one.example/"),
                PackageSource::new("two", "https://two.example/").disabled(),
            ],
        );
        assert_eq!(first.repositories().len(), 2);
        assert_eq!(first.enabled().len(), 1);

        let second = first.reload(&[PackageSource::new("three", "https://three.example/")]);
        assert_eq!(second.repositories()[0].package_source().name, "three");
        assert_eq!(first.repositories()[0].package_source().name, "one");
    }
}
