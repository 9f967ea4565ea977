//! AWX object types managed through the generic object resource

use super::object::{Field, ObjectSpec, ParentRoute};

pub static ORGANIZATION: ObjectSpec = ObjectSpec {
    type_name: "awx_organization",
    kind: "Organization",
    description: "Manages an AWX organization",
    collection: "organizations",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required().describe("Name of this organization"),
        Field::string("description").default_str(""),
        Field::int("max_hosts")
            .default_int(0)
            .describe("Maximum number of hosts allowed to be managed by this organization"),
        Field::string("custom_virtualenv").describe("Local absolute file path containing a custom Python virtualenv to use"),
        Field::int("default_environment").describe("Default execution environment for jobs run by this organization"),
    ],
};

pub static TEAM: ObjectSpec = ObjectSpec {
    type_name: "awx_team",
    kind: "Team",
    description: "Manages an AWX team",
    collection: "teams",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::reference("organization_id", "organization").required(),
        Field::string("description"),
    ],
};

pub static USER: ObjectSpec = ObjectSpec {
    type_name: "awx_user",
    kind: "User",
    description: "Manages an AWX user",
    collection: "users",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("username").required(),
        Field::string("password").write_only(),
        Field::string("email"),
        Field::string("first_name"),
        Field::string("last_name"),
        Field::bool("is_superuser"),
        Field::bool("is_system_auditor"),
    ],
};

pub static INVENTORY: ObjectSpec = ObjectSpec {
    type_name: "awx_inventory",
    kind: "Inventory",
    description: "Manages an AWX inventory",
    collection: "inventories",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::reference("organization_id", "organization").required(),
        Field::string("description"),
        Field::string("kind").describe("Kind of inventory: empty for a regular inventory, or smart"),
        Field::string("host_filter").describe("Filter applied to hosts of a smart inventory"),
        Field::json("variables").describe("Inventory variables as JSON or YAML"),
    ],
};

pub static HOST: ObjectSpec = ObjectSpec {
    type_name: "awx_host",
    kind: "Host",
    description: "Manages a host in an AWX inventory",
    collection: "hosts",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::reference("inventory_id", "inventory").required().force_new(),
        Field::string("description"),
        Field::bool("enabled").default_bool(true),
        Field::string("instance_id"),
        Field::json("variables"),
    ],
};

pub static INVENTORY_GROUP: ObjectSpec = ObjectSpec {
    type_name: "awx_inventory_group",
    kind: "Group",
    description: "Manages a group in an AWX inventory",
    collection: "groups",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::reference("inventory_id", "inventory").required().force_new(),
        Field::string("description"),
        Field::json("variables"),
    ],
};

pub static INVENTORY_SOURCE: ObjectSpec = ObjectSpec {
    type_name: "awx_inventory_source",
    kind: "Inventory Source",
    description: "Manages an AWX inventory source",
    collection: "inventory_sources",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::reference("inventory_id", "inventory").required().force_new(),
        Field::string("description"),
        Field::string("source").default_str("scm"),
        Field::reference("source_project_id", "source_project"),
        Field::string("source_path"),
        Field::reference("credential_id", "credential"),
        Field::bool("overwrite").default_bool(true),
        Field::bool("overwrite_vars").default_bool(true),
        Field::bool("update_on_launch").default_bool(true),
        Field::int("update_cache_timeout").default_int(30),
        Field::int("verbosity").default_int(1),
        Field::string("enabled_var"),
        Field::string("enabled_value"),
        Field::string("host_filter"),
        Field::json("source_vars"),
        Field::int("execution_environment"),
    ],
};

pub static INSTANCE_GROUP: ObjectSpec = ObjectSpec {
    type_name: "awx_instance_group",
    kind: "Instance Group",
    description: "Manages an AWX instance group",
    collection: "instance_groups",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::bool("is_container_group"),
        Field::int("policy_instance_minimum").default_int(0),
        Field::int("policy_instance_percentage").default_int(0),
        Field::json("pod_spec_override"),
    ],
};

pub static EXECUTION_ENVIRONMENT: ObjectSpec = ObjectSpec {
    type_name: "awx_execution_environment",
    kind: "Execution Environment",
    description: "Manages an AWX execution environment",
    collection: "execution_environments",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::string("image").required().describe("Full image location, including the container registry"),
        Field::int("organization"),
        Field::string("description"),
        Field::int("credential"),
        Field::string("pull").one_of(&["", "always", "missing", "never"]),
    ],
};

pub static PROJECT: ObjectSpec = ObjectSpec {
    type_name: "awx_project",
    kind: "Project",
    description: "Manages an AWX project",
    collection: "projects",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::reference("organization_id", "organization").required(),
        Field::string("description"),
        Field::string("scm_type").one_of(&["", "git", "svn", "insights", "archive"]),
        Field::string("scm_url"),
        Field::string("scm_branch"),
        Field::reference("scm_credential_id", "credential"),
        Field::bool("scm_clean"),
        Field::bool("scm_delete_on_update"),
        Field::bool("scm_update_on_launch"),
        Field::int("scm_update_cache_timeout"),
        Field::string("local_path").describe("Directory under PROJECTS_ROOT holding a manual project"),
    ],
};

pub static JOB_TEMPLATE: ObjectSpec = ObjectSpec {
    type_name: "awx_job_template",
    kind: "Job Template",
    description: "Manages an AWX job template",
    collection: "job_templates",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::string("job_type")
            .default_str("run")
            .one_of(&["run", "check"]),
        Field::reference("inventory_id", "inventory"),
        Field::reference("project_id", "project"),
        Field::string("playbook"),
        Field::int("forks"),
        Field::string("limit"),
        Field::int("verbosity"),
        Field::json("extra_vars"),
        Field::string("job_tags"),
        Field::string("skip_tags"),
        Field::bool("become_enabled"),
        Field::bool("ask_diff_mode_on_launch"),
        Field::bool("ask_variables_on_launch"),
        Field::bool("ask_limit_on_launch"),
        Field::bool("ask_tags_on_launch"),
        Field::bool("ask_skip_tags_on_launch"),
        Field::bool("ask_job_type_on_launch"),
        Field::bool("ask_verbosity_on_launch"),
        Field::bool("ask_inventory_on_launch"),
        Field::bool("ask_credential_on_launch"),
        Field::int("execution_environment"),
        Field::bool("allow_simultaneous"),
        Field::string("description"),
    ],
};

pub static WORKFLOW_JOB_TEMPLATE: ObjectSpec = ObjectSpec {
    type_name: "awx_workflow_job_template",
    kind: "Workflow Job Template",
    description: "Manages an AWX workflow job template",
    collection: "workflow_job_templates",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::reference("organization_id", "organization"),
        Field::string("description"),
        Field::reference("inventory_id", "inventory"),
        Field::string("limit"),
        Field::string("scm_branch"),
        Field::json("extra_vars"),
        Field::bool("survey_enabled"),
        Field::bool("allow_simultaneous"),
        Field::bool("ask_variables_on_launch"),
        Field::bool("ask_inventory_on_launch"),
        Field::bool("ask_scm_branch_on_launch"),
        Field::bool("ask_limit_on_launch"),
        Field::string("webhook_service").one_of(&["", "github", "gitlab"]),
    ],
};

macro_rules! workflow_node_fields {
    ($($extra:expr),* $(,)?) => {
        &[
            $($extra,)*
            Field::json_object("extra_data"),
            Field::reference("inventory_id", "inventory"),
            Field::string("scm_branch"),
            Field::string("job_type").default_str("run"),
            Field::string("job_tags"),
            Field::string("skip_tags"),
            Field::string("limit"),
            Field::bool("diff_mode"),
            Field::int("verbosity").default_int(0),
            Field::reference("workflow_job_template_id", "workflow_job_template").required(),
            Field::reference("unified_job_template_id", "unified_job_template").required(),
            Field::bool("all_parents_must_converge").default_bool(true),
            Field::string("identifier").required(),
        ]
    };
}

pub static WORKFLOW_JOB_TEMPLATE_NODE: ObjectSpec = ObjectSpec {
    type_name: "awx_workflow_job_template_node",
    kind: "Workflow Job Template Node",
    description: "Manages a node of an AWX workflow job template",
    collection: "workflow_job_template_nodes",
    parent: None,
    credential_type: None,
    fields: workflow_node_fields!(),
};

const CHILD_NODE_FIELDS: &[Field] = workflow_node_fields!(Field::reference(
    "workflow_job_template_node_id",
    "workflow_job_template_node"
)
.required()
.force_new()
.local());

const fn child_node(type_name: &'static str, relation: &'static str) -> ObjectSpec {
    ObjectSpec {
        type_name,
        kind: "Workflow Job Template Node",
        description: "Manages a workflow node that runs after its parent node",
        collection: "workflow_job_template_nodes",
        parent: Some(ParentRoute {
            field: "workflow_job_template_node_id",
            collection: "workflow_job_template_nodes",
            relation,
        }),
        credential_type: None,
        fields: CHILD_NODE_FIELDS,
    }
}

pub static WORKFLOW_JOB_TEMPLATE_NODE_SUCCESS: ObjectSpec =
    child_node("awx_workflow_job_template_node_success", "success_nodes");
pub static WORKFLOW_JOB_TEMPLATE_NODE_FAILURE: ObjectSpec =
    child_node("awx_workflow_job_template_node_failure", "failure_nodes");
pub static WORKFLOW_JOB_TEMPLATE_NODE_ALWAYS: ObjectSpec =
    child_node("awx_workflow_job_template_node_always", "always_nodes");

const RRULE: Field = Field::string("rrule")
    .required()
    .pattern("^DTSTART", "an iCal recurrence rule starting with DTSTART");

pub static SCHEDULE: ObjectSpec = ObjectSpec {
    type_name: "awx_schedule",
    kind: "Schedule",
    description: "Manages an AWX schedule",
    collection: "schedules",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        RRULE,
        Field::reference("unified_job_template_id", "unified_job_template").required(),
        Field::string("description"),
        Field::bool("enabled").default_bool(true),
        Field::int("inventory"),
        Field::json_object("extra_data"),
    ],
};

pub static WORKFLOW_JOB_TEMPLATE_SCHEDULE: ObjectSpec = ObjectSpec {
    type_name: "awx_workflow_job_template_schedule",
    kind: "Schedule",
    description: "Manages a schedule of an AWX workflow job template",
    collection: "schedules",
    parent: Some(ParentRoute {
        field: "workflow_job_template_id",
        collection: "workflow_job_templates",
        relation: "schedules",
    }),
    credential_type: None,
    fields: &[
        Field::reference("workflow_job_template_id", "unified_job_template")
            .required()
            .force_new()
            .local(),
        Field::string("name").required(),
        RRULE,
        Field::string("description"),
        Field::bool("enabled").default_bool(true),
        Field::int("inventory"),
        Field::json_object("extra_data"),
    ],
};

pub static NOTIFICATION_TEMPLATE: ObjectSpec = ObjectSpec {
    type_name: "awx_notification_template",
    kind: "Notification Template",
    description: "Manages an AWX notification template",
    collection: "notification_templates",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::reference("organization_id", "organization").required(),
        Field::string("notification_type").required().one_of(&[
            "email",
            "grafana",
            "irc",
            "mattermost",
            "pagerduty",
            "rocketchat",
            "slack",
            "twilio",
            "webhook",
        ]),
        Field::json_object("notification_configuration").sensitive(),
        Field::string("description"),
    ],
};

pub static CREDENTIAL_TYPE: ObjectSpec = ObjectSpec {
    type_name: "awx_credential_type",
    kind: "Credential Type",
    description: "Manages a custom AWX credential type",
    collection: "credential_types",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::string("description"),
        Field::string("kind").default_str("cloud").one_of(&["cloud", "net"]),
        Field::json_object("inputs").required().describe("Input schema as a JSON document"),
        Field::json_object("injectors").required().describe("Injector configuration as a JSON document"),
    ],
};

pub static CREDENTIAL: ObjectSpec = ObjectSpec {
    type_name: "awx_credential",
    kind: "Credential",
    description: "Manages an AWX credential of any credential type",
    collection: "credentials",
    parent: None,
    credential_type: None,
    fields: &[
        Field::string("name").required(),
        Field::reference("organization_id", "organization").required(),
        Field::reference("credential_type_id", "credential_type").required(),
        Field::string("description"),
        Field::json_object("inputs").required().sensitive(),
    ],
};

pub static CREDENTIAL_INPUT_SOURCE: ObjectSpec = ObjectSpec {
    type_name: "awx_credential_input_source",
    kind: "Credential Input Source",
    description: "Links a credential input to an external secret lookup",
    collection: "credential_input_sources",
    parent: None,
    credential_type: None,
    fields: &[
        Field::reference("target_credential_id", "target_credential")
            .required()
            .force_new(),
        Field::reference("source_credential_id", "source_credential").required(),
        Field::string("input_field_name").required(),
        Field::json_object("metadata"),
        Field::string("description"),
    ],
};

pub static OBJECTS: &[&ObjectSpec] = &[
    &ORGANIZATION,
    &TEAM,
    &USER,
    &INVENTORY,
    &HOST,
    &INVENTORY_GROUP,
    &INVENTORY_SOURCE,
    &INSTANCE_GROUP,
    &EXECUTION_ENVIRONMENT,
    &PROJECT,
    &JOB_TEMPLATE,
    &WORKFLOW_JOB_TEMPLATE,
    &WORKFLOW_JOB_TEMPLATE_NODE,
    &WORKFLOW_JOB_TEMPLATE_NODE_SUCCESS,
    &WORKFLOW_JOB_TEMPLATE_NODE_FAILURE,
    &WORKFLOW_JOB_TEMPLATE_NODE_ALWAYS,
    &SCHEDULE,
    &WORKFLOW_JOB_TEMPLATE_SCHEDULE,
    &NOTIFICATION_TEMPLATE,
    &CREDENTIAL_TYPE,
    &CREDENTIAL,
    &CREDENTIAL_INPUT_SOURCE,
];
