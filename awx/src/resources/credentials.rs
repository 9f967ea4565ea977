//! Credentials of the built-in AWX credential types
//!
//! Each one is a credential with a fixed type whose inputs are separate
//! attributes. Secret inputs are never read back from AWX.

use super::object::{CredentialTypeRef, Field, ObjectSpec};

macro_rules! credential_fields {
    ($($input:expr),* $(,)?) => {
        &[
            Field::string("name").required(),
            Field::string("description"),
            Field::reference("organization_id", "organization").required(),
            $($input.input(),)*
        ]
    };
}

const fn typed(
    type_name: &'static str,
    description: &'static str,
    credential_type: CredentialTypeRef,
    fields: &'static [Field],
) -> ObjectSpec {
    ObjectSpec {
        type_name,
        kind: "Credential",
        description,
        collection: "credentials",
        parent: None,
        credential_type: Some(credential_type),
        fields,
    }
}

const MACHINE_FIELDS: &[Field] = credential_fields![
    Field::string("username"),
    Field::string("password").sensitive(),
    Field::string("ssh_key_data").sensitive(),
    Field::string("ssh_public_key_data"),
    Field::string("ssh_key_unlock").sensitive(),
    Field::string("become_method"),
    Field::string("become_username"),
    Field::string("become_password").sensitive(),
];

pub static MACHINE: ObjectSpec = typed(
    "awx_credential_machine",
    "Manages a machine (SSH) credential",
    CredentialTypeRef::Id(1),
    MACHINE_FIELDS,
);

const SCM_FIELDS: &[Field] = credential_fields![
    Field::string("username"),
    Field::string("password").sensitive(),
    Field::string("ssh_key_data").sensitive(),
    Field::string("ssh_key_unlock").sensitive(),
];

pub static SCM: ObjectSpec = typed(
    "awx_credential_scm",
    "Manages a source control credential",
    CredentialTypeRef::Id(2),
    SCM_FIELDS,
);

const VAULT_FIELDS: &[Field] = credential_fields![
    Field::string("vault_password").required().sensitive(),
    Field::string("vault_id"),
];

pub static VAULT: ObjectSpec = typed(
    "awx_credential_vault",
    "Manages an Ansible Vault credential",
    CredentialTypeRef::Id(3),
    VAULT_FIELDS,
);

const AZURE_RM_FIELDS: &[Field] = credential_fields![
    Field::string("subscription").required(),
    Field::string("tenant").required(),
    Field::string("username"),
    Field::string("password").sensitive(),
    Field::string("client"),
    Field::string("secret").sensitive(),
    Field::string("cloud_environment"),
];

pub static AZURE_RESOURCE_MANAGER: ObjectSpec = typed(
    "awx_credential_azure_resource_manager",
    "Manages a Microsoft Azure Resource Manager credential",
    CredentialTypeRef::Id(11),
    AZURE_RM_FIELDS,
);

const GCE_FIELDS: &[Field] = credential_fields![
    Field::string("username").required(),
    Field::string("project").required(),
    Field::string("ssh_key_data").required().sensitive(),
];

pub static GOOGLE_COMPUTE_ENGINE: ObjectSpec = typed(
    "awx_credential_google_compute_engine",
    "Manages a Google Compute Engine credential",
    CredentialTypeRef::Name("Google Compute Engine"),
    GCE_FIELDS,
);

const GITHUB_TOKEN_FIELDS: &[Field] =
    credential_fields![Field::string("token").required().sensitive()];

pub static GITHUB_TOKEN: ObjectSpec = typed(
    "awx_credential_github_token",
    "Manages a GitHub personal access token credential",
    CredentialTypeRef::Name("GitHub Personal Access Token"),
    GITHUB_TOKEN_FIELDS,
);

const GALAXY_FIELDS: &[Field] = credential_fields![
    Field::string("url").required(),
    Field::string("auth_url"),
    Field::string("token").sensitive(),
];

pub static GALAXY: ObjectSpec = typed(
    "awx_credential_galaxy",
    "Manages an Ansible Galaxy or Automation Hub token credential",
    CredentialTypeRef::Name("Ansible Galaxy/Automation Hub API Token"),
    GALAXY_FIELDS,
);

const AZURE_KEY_VAULT_FIELDS: &[Field] = credential_fields![
    Field::string("url").required(),
    Field::string("client").required(),
    Field::string("secret").required().sensitive(),
    Field::string("tenant").required(),
];

pub static AZURE_KEY_VAULT: ObjectSpec = typed(
    "awx_credential_azure_key_vault",
    "Manages a Microsoft Azure Key Vault lookup credential",
    CredentialTypeRef::Name("Microsoft Azure Key Vault"),
    AZURE_KEY_VAULT_FIELDS,
);

const HASHIVAULT_SECRET_FIELDS: &[Field] = credential_fields![
    Field::string("url").required(),
    Field::string("token").required().sensitive(),
    Field::string("cacert"),
    Field::string("api_version").default_str("v1").one_of(&["v1", "v2"]),
];

pub static HASHIVAULT_SECRET: ObjectSpec = typed(
    "awx_credential_hashivault_secret",
    "Manages a HashiCorp Vault secret lookup credential",
    CredentialTypeRef::Name("HashiCorp Vault Secret Lookup"),
    HASHIVAULT_SECRET_FIELDS,
);

const HASHIVAULT_SIGNED_SSH_FIELDS: &[Field] = credential_fields![
    Field::string("url").required(),
    Field::string("token").required().sensitive(),
    Field::string("cacert"),
    Field::string("role_id"),
    Field::string("secret_id").sensitive(),
    Field::string("namespace"),
    Field::string("kubernetes_role"),
    Field::string("default_auth_path"),
];

pub static HASHIVAULT_SIGNED_SSH: ObjectSpec = typed(
    "awx_credential_hashivault_signed_ssh",
    "Manages a HashiCorp Vault signed SSH credential",
    CredentialTypeRef::Name("HashiCorp Vault Signed SSH"),
    HASHIVAULT_SIGNED_SSH_FIELDS,
);

pub static TYPED_CREDENTIALS: &[&ObjectSpec] = &[
    &MACHINE,
    &SCM,
    &VAULT,
    &AZURE_RESOURCE_MANAGER,
    &GOOGLE_COMPUTE_ENGINE,
    &GITHUB_TOKEN,
    &GALAXY,
    &AZURE_KEY_VAULT,
    &HASHIVAULT_SECRET,
    &HASHIVAULT_SIGNED_SSH,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::object::Location;
    use serde_json::json;
    use tfplug::types::{Dynamic, DynamicValue};

    #[test]
    fn inputs_are_located_in_the_inputs_object() {
        for spec in TYPED_CREDENTIALS {
            assert_eq!(spec.field("name").unwrap().location, Location::Body);
            assert_eq!(
                spec.field("organization_id").unwrap().location,
                Location::Body
            );
            assert!(spec
                .fields
                .iter()
                .skip(3)
                .all(|f| f.location == Location::Input));
        }
    }

    #[test]
    fn secret_inputs_are_not_read_back() {
        let token = GITHUB_TOKEN.field("token").unwrap();
        assert!(token.sensitive && token.is_user_owned());

        let api = json!({"inputs": {"token": "$encrypted$"}});
        assert_eq!(
            token.from_api(&api, &Dynamic::from("ghp_x")),
            Dynamic::from("ghp_x")
        );
    }

    #[test]
    fn machine_credentials_keep_public_fields_in_sync() {
        let api = json!({"id": 3, "name": "m", "organization": 1,
                         "inputs": {"username": "deploy", "password": "$encrypted$"}});
        let state = MACHINE.state_from_api(&api, &DynamicValue::object(), false);
        let map = state.value.as_map().unwrap();

        assert_eq!(map.get("username"), Some(&Dynamic::from("deploy")));
        assert_eq!(map.get("password"), Some(&Dynamic::Null));
        assert_eq!(map.get("id"), Some(&Dynamic::from("3")));
    }
}
