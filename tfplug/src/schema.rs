//! Schema types and builders for tfplug
//!
//! This module provides the schema system for defining resource and data source
//! schemas, including attribute types, blocks, and validation hooks.

use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// AttributeType defines the type system for Terraform attributes
/// This must match Terraform's type system exactly
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    String,
    Number, // Always f64
    Bool,
    List(Box<AttributeType>),               // Ordered, allows duplicates
    Set(Box<AttributeType>),                // Unordered, no duplicates
    Map(Box<AttributeType>),                // String keys only
    Object(HashMap<String, AttributeType>), // Fixed structure
}

impl AttributeType {
    /// cty type descriptor, e.g. `"string"` or `["list","number"]`
    pub fn to_json(&self) -> Value {
        match self {
            AttributeType::String => json!("string"),
            AttributeType::Number => json!("number"),
            AttributeType::Bool => json!("bool"),
            AttributeType::List(elem) => json!(["list", elem.to_json()]),
            AttributeType::Set(elem) => json!(["set", elem.to_json()]),
            AttributeType::Map(elem) => json!(["map", elem.to_json()]),
            AttributeType::Object(fields) => {
                let fields: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.to_json()))
                    .collect();
                json!(["object", fields])
            }
        }
    }

    /// Encoded type bytes as carried in the schema protobuf
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }

    /// Whether a value fits this type. Null and unknown fit every type.
    pub fn accepts(&self, value: &Dynamic) -> bool {
        match (self, value) {
            (_, Dynamic::Null) | (_, Dynamic::Unknown) => true,
            (AttributeType::String, Dynamic::String(_)) => true,
            (AttributeType::Number, Dynamic::Number(_)) => true,
            (AttributeType::Bool, Dynamic::Bool(_)) => true,
            (AttributeType::List(elem), Dynamic::List(items))
            | (AttributeType::Set(elem), Dynamic::List(items)) => {
                items.iter().all(|item| elem.accepts(item))
            }
            (AttributeType::Map(elem), Dynamic::Map(entries)) => {
                entries.values().all(|item| elem.accepts(item))
            }
            (AttributeType::Object(fields), Dynamic::Map(entries)) => entries
                .iter()
                .all(|(k, v)| fields.get(k).is_some_and(|ty| ty.accepts(v))),
            _ => false,
        }
    }

    /// Fill in every object attribute Terraform expects so the value
    /// matches the declared shape.
    pub fn conform(&self, value: Dynamic) -> Dynamic {
        match (self, value) {
            (AttributeType::List(elem), Dynamic::List(items))
            | (AttributeType::Set(elem), Dynamic::List(items)) => {
                Dynamic::List(items.into_iter().map(|v| elem.conform(v)).collect())
            }
            (AttributeType::Map(elem), Dynamic::Map(entries)) => Dynamic::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, elem.conform(v)))
                    .collect(),
            ),
            (AttributeType::Object(fields), Dynamic::Map(mut entries)) => Dynamic::Map(
                fields
                    .iter()
                    .map(|(name, ty)| {
                        let v = entries.remove(name).unwrap_or(Dynamic::Null);
                        (name.clone(), ty.conform(v))
                    })
                    .collect(),
            ),
            (_, other) => other,
        }
    }
}

/// Schema is returned by providers/resources/data sources
/// Version is used for state migration
#[derive(Debug, Clone)]
pub struct Schema {
    pub version: i64, // Increment when schema changes require migration
    pub block: Block, // Root block containing all attributes
}

impl Schema {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.block.attribute(name)
    }
}

/// Block represents a configuration block
#[derive(Debug, Clone)]
pub struct Block {
    pub version: i64,
    pub attributes: Vec<Attribute>,
    pub block_types: Vec<NestedBlock>,
    pub description: String,
    pub description_kind: StringKind,
    pub deprecated: bool,
}

impl Block {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn nested_block(&self, name: &str) -> Option<&NestedBlock> {
        self.block_types.iter().find(|b| b.type_name == name)
    }

    /// Shape an object value to this block: every attribute and nested block
    /// present, anything the block does not declare dropped.
    pub fn conform(&self, value: Dynamic) -> Dynamic {
        let mut entries = match value {
            Dynamic::Map(entries) => entries,
            other => return other,
        };

        let mut out = HashMap::with_capacity(self.attributes.len() + self.block_types.len());
        for attr in &self.attributes {
            let v = entries.remove(&attr.name).unwrap_or(Dynamic::Null);
            out.insert(attr.name.clone(), attr.r#type.conform(v));
        }
        for nested in &self.block_types {
            let v = entries.remove(&nested.type_name).unwrap_or(Dynamic::Null);
            out.insert(nested.type_name.clone(), nested.conform(v));
        }
        Dynamic::Map(out)
    }
}

/// Attribute represents a single configuration attribute
#[derive(Clone)]
pub struct Attribute {
    pub name: String,
    pub r#type: AttributeType,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub validators: Vec<Arc<dyn Validator>>,
    pub plan_modifiers: Vec<Arc<dyn PlanModifier>>,
    pub default: Option<Arc<dyn Default>>,
    pub deprecated: bool,
}

// Manual Debug implementation since validators/modifiers don't implement Debug
impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("type", &self.r#type)
            .field("description", &self.description)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("sensitive", &self.sensitive)
            .field(
                "validators",
                &format!("{} validators", self.validators.len()),
            )
            .field(
                "plan_modifiers",
                &format!("{} plan modifiers", self.plan_modifiers.len()),
            )
            .field("default", &self.default.is_some())
            .field("deprecated", &self.deprecated)
            .finish()
    }
}

/// NestedBlock represents a nested configuration block
#[derive(Debug, Clone)]
pub struct NestedBlock {
    pub type_name: String,
    pub block: Block,
    pub nesting: NestingMode,
    pub min_items: i64,
    pub max_items: i64,
}

impl NestedBlock {
    pub fn conform(&self, value: Dynamic) -> Dynamic {
        match (self.nesting, value) {
            (NestingMode::List | NestingMode::Set, Dynamic::Null) => Dynamic::List(Vec::new()),
            (NestingMode::List | NestingMode::Set, Dynamic::List(items)) => Dynamic::List(
                items.into_iter().map(|v| self.block.conform(v)).collect(),
            ),
            (NestingMode::Map, Dynamic::Null) => Dynamic::Map(HashMap::new()),
            (NestingMode::Map, Dynamic::Map(entries)) => Dynamic::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, self.block.conform(v)))
                    .collect(),
            ),
            (_, other) => self.block.conform(other),
        }
    }
}

/// NestingMode defines how nested blocks are structured
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NestingMode {
    Invalid,
    Single,
    List,
    Set,
    Map,
    Group,
}

/// StringKind represents the format of string values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StringKind {
    Plain,
    Markdown,
}

/// Validator performs validation on attribute values during planning
/// Implement this for custom validation logic
pub trait Validator: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Perform validation
    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse;
}

/// Request for validators
pub struct ValidatorRequest {
    pub config_value: DynamicValue,
    pub path: AttributePath,
}

/// Response from validators
pub struct ValidatorResponse {
    pub diagnostics: Vec<Diagnostic>,
}

/// PlanModifier modifies planned values during planning
/// Common uses: RequiresReplace, UseStateForUnknown
pub trait PlanModifier: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Modify the planned value
    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse;
}

/// Request for plan modifiers
pub struct PlanModifierRequest {
    pub config_value: DynamicValue,
    pub state_value: DynamicValue,
    pub plan_value: DynamicValue,
    /// Whole planned object, as planned so far
    pub plan: DynamicValue,
    pub path: AttributePath,
}

/// Response from plan modifiers
pub struct PlanModifierResponse {
    pub plan_value: DynamicValue,
    pub requires_replace: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Default provides default values for optional attributes
/// Called when attribute is not set in configuration
pub trait Default: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Provide default value
    fn default_value(&self, request: DefaultRequest) -> DefaultResponse;
}

/// Request for default values
pub struct DefaultRequest {
    pub path: AttributePath,
}

/// Response with default value
pub struct DefaultResponse {
    pub value: DynamicValue,
}

/// AttributeBuilder provides fluent API for building attributes
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    /// Create a new attribute builder
    pub fn new(name: &str, type_: AttributeType) -> Self {
        Self {
            attribute: Attribute {
                name: name.to_string(),
                r#type: type_,
                description: String::new(),
                required: false,
                optional: false,
                computed: false,
                sensitive: false,
                validators: Vec::new(),
                plan_modifiers: Vec::new(),
                default: None,
                deprecated: false,
            },
        }
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.attribute.description = desc.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.attribute.required = true;
        self.attribute.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.attribute.optional = true;
        self.attribute.required = false;
        self
    }

    pub fn computed(mut self) -> Self {
        self.attribute.computed = true;
        self
    }

    /// Mark as sensitive (hidden)
    pub fn sensitive(mut self) -> Self {
        self.attribute.sensitive = true;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.attribute.deprecated = true;
        self
    }

    pub fn validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.attribute.validators.push(Arc::from(validator));
        self
    }

    pub fn plan_modifier(mut self, modifier: Box<dyn PlanModifier>) -> Self {
        self.attribute.plan_modifiers.push(Arc::from(modifier));
        self
    }

    /// Changing the attribute replaces the remote object
    pub fn requires_replace(self) -> Self {
        self.plan_modifier(Box::new(crate::plan_modifier::RequiresReplaceIfChanged))
    }

    /// Set default. Terraform only accepts planned values for attributes it
    /// considers computed, so the attribute becomes optional + computed.
    pub fn default(mut self, default: Box<dyn Default>) -> Self {
        self.attribute.default = Some(Arc::from(default));
        self.attribute.optional = true;
        self.attribute.required = false;
        self.attribute.computed = true;
        self
    }

    pub fn build(self) -> Attribute {
        self.attribute
    }
}

/// SchemaBuilder provides fluent API for building schemas
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            schema: Schema {
                version: 0,
                block: Block {
                    version: 0,
                    attributes: Vec::new(),
                    block_types: Vec::new(),
                    description: String::new(),
                    description_kind: StringKind::Plain,
                    deprecated: false,
                },
            },
        }
    }

    /// Set schema version
    pub fn version(mut self, version: i64) -> Self {
        self.schema.version = version;
        self.schema.block.version = version;
        self
    }

    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.schema.block.attributes.push(attr);
        self
    }

    pub fn block(mut self, block: NestedBlock) -> Self {
        self.schema.block.block_types.push(block);
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.schema.block.description = desc.to_string();
        self
    }

    pub fn description_kind(mut self, kind: StringKind) -> Self {
        self.schema.block.description_kind = kind;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.schema.block.deprecated = true;
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

impl std::default::Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a repeated nested block (`name { ... }` written any number of times)
pub fn list_block(name: &str, description: &str, attributes: Vec<Attribute>) -> NestedBlock {
    NestedBlock {
        type_name: name.to_string(),
        block: Block {
            version: 0,
            attributes,
            block_types: Vec::new(),
            description: description.to_string(),
            description_kind: StringKind::Plain,
            deprecated: false,
        },
        nesting: NestingMode::List,
        min_items: 0,
        max_items: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::StaticDefault;

    #[test]
    fn attribute_builder_creates_required_string() {
        let attr = AttributeBuilder::new("name", AttributeType::String)
            .description("The name of the resource")
            .required()
            .build();

        assert_eq!(attr.name, "name");
        assert!(matches!(attr.r#type, AttributeType::String));
        assert!(attr.required);
        assert!(!attr.optional);
        assert_eq!(attr.description, "The name of the resource");
    }

    #[test]
    fn default_makes_attribute_optional_and_computed() {
        let attr = AttributeBuilder::new("enabled", AttributeType::Bool)
            .required()
            .default(StaticDefault::bool(true))
            .build();

        assert!(attr.optional);
        assert!(attr.computed);
        assert!(!attr.required);

        let cloned = attr.clone();
        assert!(cloned.default.is_some());
    }

    #[test]
    fn schema_builder_creates_schema_with_attributes() {
        let schema = SchemaBuilder::new()
            .version(1)
            .description("Test resource schema")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .build(),
            )
            .build();

        assert_eq!(schema.version, 1);
        assert_eq!(schema.block.attributes.len(), 2);
        assert_eq!(schema.block.description, "Test resource schema");
        assert!(schema.attribute("name").is_some());
        assert!(schema.attribute("other").is_none());
    }

    #[test]
    fn type_descriptors_match_cty_json() {
        assert_eq!(AttributeType::String.to_bytes(), br#""string""#.to_vec());
        assert_eq!(
            AttributeType::List(Box::new(AttributeType::String)).to_json(),
            json!(["list", "string"])
        );

        let object = AttributeType::Object(HashMap::from([(
            "id".to_string(),
            AttributeType::Number,
        )]));
        assert_eq!(
            AttributeType::Set(Box::new(object)).to_json(),
            json!(["set", ["object", {"id": "number"}]])
        );
    }

    #[test]
    fn accepts_checks_nested_element_types() {
        let ty = AttributeType::List(Box::new(AttributeType::String));
        assert!(ty.accepts(&Dynamic::List(vec!["a".into()])));
        assert!(!ty.accepts(&Dynamic::List(vec![Dynamic::Number(1.0)])));
        assert!(ty.accepts(&Dynamic::Unknown));
        assert!(!AttributeType::Bool.accepts(&"true".into()));
    }

    #[test]
    fn block_conform_fills_missing_and_drops_extra() {
        let schema = SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .build(),
            )
            .block(list_block(
                "team_org_map",
                "",
                vec![AttributeBuilder::new("team", AttributeType::String)
                    .required()
                    .build()],
            ))
            .build();

        let value = Dynamic::Map(HashMap::from([
            ("name".to_string(), Dynamic::from("x")),
            ("stale".to_string(), Dynamic::from("gone")),
        ]));

        let conformed = schema.block.conform(value);
        let map = conformed.as_map().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["id"], Dynamic::Null);
        assert_eq!(map["team_org_map"], Dynamic::List(vec![]));
        assert!(!map.contains_key("stale"));
    }
}
