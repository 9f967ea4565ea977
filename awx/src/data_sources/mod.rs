//! Data source implementations

pub mod lists;
pub mod lookup;
pub mod roles;

use std::collections::HashMap;
use tfplug::data_source::DataSourceWithConfigure;
use tfplug::provider::DataSourceFactory;

fn factory<D, F>(make: F) -> DataSourceFactory
where
    D: DataSourceWithConfigure + 'static,
    F: Fn() -> D + Send + Sync + 'static,
{
    Box::new(move || -> Box<dyn DataSourceWithConfigure> { Box::new(make()) })
}

/// Every data source of the provider keyed by type name
pub fn factories() -> HashMap<String, DataSourceFactory> {
    let mut factories = HashMap::new();
    for spec in lookup::LOOKUPS {
        factories.insert(
            spec.type_name().to_string(),
            factory(move || lookup::LookupDataSource::new(spec)),
        );
    }
    for spec in lists::LISTS.iter().copied() {
        factories.insert(
            spec.type_name.to_string(),
            factory(move || lists::ListDataSource::new(spec)),
        );
    }
    for spec in roles::ROLES {
        factories.insert(
            spec.type_name.to_string(),
            factory(move || roles::RoleDataSource::new(spec)),
        );
    }
    factories
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfplug::data_source::DataSource;

    #[test]
    fn every_data_source_is_registered_once() {
        let expected = lookup::LOOKUPS.len() + lists::LISTS.len() + roles::ROLES.len();
        let factories = factories();
        assert_eq!(factories.len(), expected);

        for name in ["awx_user", "awx_inventory_group", "awx_credentials", "awx_project_role"] {
            let data_source = factories[name]();
            assert_eq!(data_source.type_name(), name);
        }
    }
}
