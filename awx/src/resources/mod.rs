//! Resource implementations

pub mod association;
pub mod catalog;
pub mod credentials;
pub mod job_template_launch;
pub mod object;
pub mod setting;
pub mod settings_map;

use std::collections::HashMap;
use tfplug::provider::ResourceFactory;
use tfplug::resource::ResourceWithConfigure;

fn factory<R, F>(make: F) -> ResourceFactory
where
    R: ResourceWithConfigure + 'static,
    F: Fn() -> R + Send + Sync + 'static,
{
    Box::new(move || -> Box<dyn ResourceWithConfigure> { Box::new(make()) })
}

/// Every resource of the provider keyed by type name
pub fn factories() -> HashMap<String, ResourceFactory> {
    let mut factories = HashMap::new();

    let objects = catalog::OBJECTS.iter().chain(credentials::TYPED_CREDENTIALS);
    for spec in objects.copied() {
        factories.insert(
            spec.type_name.to_string(),
            factory(move || object::ObjectResource::new(spec)),
        );
    }
    for spec in association::all() {
        factories.insert(
            spec.type_name.to_string(),
            factory(move || association::AssociationResource::new(spec)),
        );
    }
    for spec in settings_map::MAP_ENTRIES.iter().copied() {
        factories.insert(
            spec.type_name.to_string(),
            factory(move || settings_map::MapEntryResource::new(spec)),
        );
    }
    factories.insert(
        settings_map::TEAM_ATTRIBUTES_TYPE_NAME.to_string(),
        factory(settings_map::TeamAttributesResource::new),
    );
    factories.insert(
        setting::TYPE_NAME.to_string(),
        factory(setting::SettingResource::new),
    );
    factories.insert(
        job_template_launch::TYPE_NAME.to_string(),
        factory(job_template_launch::JobTemplateLaunchResource::new),
    );
    factories
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfplug::resource::Resource;

    #[test]
    fn every_resource_is_registered_once() {
        let expected = catalog::OBJECTS.len()
            + credentials::TYPED_CREDENTIALS.len()
            + association::all().count()
            + settings_map::MAP_ENTRIES.len()
            + 3;
        let factories = factories();
        assert_eq!(factories.len(), expected);

        for name in [
            "awx_organization",
            "awx_credential_machine",
            "awx_job_template_credential",
            "awx_settings_ldap_team_map",
            "awx_settings_saml_team_attributes",
            "awx_setting",
            "awx_job_template_launch",
        ] {
            let resource = factories[name]();
            assert_eq!(resource.type_name(), name);
        }
    }
}
