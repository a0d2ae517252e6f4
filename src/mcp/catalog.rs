use crate::constants::{defaults, limits};
use crate::errors::ToolError;
use crate::services::executor::HttpVerb;
use crate::services::renderer::EntityKind;
use crate::utils::suggest::suggest;
use jsonschema::error::ValidationErrorKind;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub const TOOL_PREFIX: &str = "ispw_";

pub const RESPONSE_FORMATS: &[&str] = &["markdown", "json", "text", "structured"];
const LEVELS: &[&str] = &["DEV", "INT", "ACC", "PRD"];
const CHANGE_TYPES: &[&str] = &["S", "I", "E"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLocation {
    Path,
    Query,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgDefault {
    ConfiguredSrid,
}

#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub wire_name: &'static str,
    pub location: ArgLocation,
    pub kind: ArgType,
    pub required: bool,
    pub description: &'static str,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub allowed: &'static [&'static str],
    pub pattern: Option<&'static str>,
    pub default: Option<ArgDefault>,
}

impl ArgSpec {
    fn new(name: &'static str, wire_name: &'static str, location: ArgLocation) -> Self {
        Self {
            name,
            wire_name,
            location,
            kind: ArgType::String,
            required: false,
            description: "",
            min_length: None,
            max_length: None,
            allowed: &[],
            pattern: None,
            default: None,
        }
    }

    fn path(name: &'static str) -> Self {
        Self::new(name, name, ArgLocation::Path).required()
    }

    fn query(name: &'static str, wire_name: &'static str) -> Self {
        Self::new(name, wire_name, ArgLocation::Query)
    }

    fn body(name: &'static str, wire_name: &'static str) -> Self {
        Self::new(name, wire_name, ArgLocation::Body)
    }

    fn required(mut self) -> Self {
        self.required = true;
        self.min_length = Some(1);
        self
    }

    fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    fn max_len(mut self, max: u64) -> Self {
        self.max_length = Some(max);
        self
    }

    fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    fn matching(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    fn boolean(mut self) -> Self {
        self.kind = ArgType::Boolean;
        self.min_length = None;
        self
    }

    fn srid() -> Self {
        let mut spec = Self::path("srid")
            .describe("System Resource Identifier (e.g. 'ISPW'); defaults to the configured SRID")
            .max_len(limits::SRID_MAX_LENGTH);
        spec.required = false;
        spec.default = Some(ArgDefault::ConfiguredSrid);
        spec
    }

    fn schema(&self) -> Value {
        let mut prop = Map::new();
        match self.kind {
            ArgType::String => {
                prop.insert("type".into(), json!("string"));
                if let Some(min) = self.min_length {
                    prop.insert("minLength".into(), json!(min));
                }
                if let Some(max) = self.max_length {
                    prop.insert("maxLength".into(), json!(max));
                }
                if !self.allowed.is_empty() {
                    prop.insert("enum".into(), json!(self.allowed));
                }
                if let Some(pattern) = self.pattern {
                    prop.insert("pattern".into(), json!(pattern));
                }
            }
            ArgType::Boolean => {
                prop.insert("type".into(), json!("boolean"));
            }
        }
        if !self.description.is_empty() {
            prop.insert("description".into(), json!(self.description));
        }
        Value::Object(prop)
    }
}

#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    pub operation: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub verb: HttpVerb,
    pub path: &'static str,
    pub entity: EntityKind,
    pub collection: bool,
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
    /// Noun used when the upstream reports the target missing.
    pub subject: &'static str,
    pub identifier_arg: Option<&'static str>,
    pub args: Vec<ArgSpec>,
}

impl EndpointDescriptor {
    fn read(
        operation: &'static str,
        title: &'static str,
        path: &'static str,
        entity: EntityKind,
    ) -> Self {
        Self {
            operation,
            title,
            description: "",
            verb: HttpVerb::Get,
            path,
            entity,
            collection: false,
            read_only: true,
            destructive: false,
            idempotent: true,
            subject: entity.singular(),
            identifier_arg: None,
            args: vec![ArgSpec::srid()],
        }
    }

    fn write(
        operation: &'static str,
        title: &'static str,
        path: &'static str,
        entity: EntityKind,
    ) -> Self {
        Self {
            verb: HttpVerb::Post,
            read_only: false,
            idempotent: false,
            ..Self::read(operation, title, path, entity)
        }
    }

    fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    fn listing(mut self) -> Self {
        self.collection = true;
        self
    }

    fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    fn identified_by(mut self, arg: &'static str, subject: &'static str) -> Self {
        self.identifier_arg = Some(arg);
        self.subject = subject;
        self
    }

    fn arg(mut self, spec: ArgSpec) -> Self {
        self.args.push(spec);
        self
    }

    pub fn tool_name(&self) -> String {
        format!("{}{}", TOOL_PREFIX, self.operation)
    }

    pub fn arg_spec(&self, name: &str) -> Option<&ArgSpec> {
        self.args.iter().find(|spec| spec.name == name)
    }

    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for spec in &self.args {
            properties.insert(spec.name.to_string(), spec.schema());
            if spec.required && spec.default.is_none() {
                required.push(spec.name);
            }
        }
        properties.insert(
            "response_format".to_string(),
            json!({
                "type": "string",
                "enum": RESPONSE_FORMATS,
                "default": defaults::RESPONSE_FORMAT,
                "description": "Output format: 'markdown' (or 'text') for a readable summary, 'json' (or 'structured') for data"
            }),
        );
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Placeholder names referenced by the path template, in order.
    pub fn path_placeholders(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        let mut rest = self.path;
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                break;
            };
            out.push(&after[..end]);
            rest = &after[end + 1..];
        }
        out
    }
}

static CATALOG: Lazy<Vec<EndpointDescriptor>> = Lazy::new(build_catalog);

static CATALOG_INDEX: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    CATALOG
        .iter()
        .enumerate()
        .map(|(idx, descriptor)| (descriptor.operation, idx))
        .collect()
});

static VALIDATORS: Lazy<HashMap<&'static str, JSONSchema>> = Lazy::new(|| {
    CATALOG
        .iter()
        .map(|descriptor| {
            let schema = JSONSchema::compile(&descriptor.input_schema())
                .expect("catalog input schemas must compile");
            (descriptor.operation, schema)
        })
        .collect()
});

fn build_catalog() -> Vec<EndpointDescriptor> {
    use EntityKind::*;

    let assignment_id = || {
        ArgSpec::path("assignment_id")
            .describe("Assignment ID (e.g. 'PLAY000001')")
            .max_len(limits::IDENTIFIER_MAX_LENGTH)
    };
    let level_body = || {
        ArgSpec::body("level", "level")
            .describe("Target level (e.g. 'DEV', 'INT')")
            .max_len(limits::SHORT_FIELD_MAX_LENGTH)
    };

    vec![
        EndpointDescriptor::read(
            "list_assignments",
            "List ISPW Assignments",
            "ispw/{srid}/assignments",
            Assignment,
        )
        .describe("List assignments in an SRID, optionally filtered by level or assignment ID.")
        .listing()
        .arg(
            ArgSpec::query("level", "level")
                .describe("Filter by lifecycle level")
                .one_of(LEVELS),
        )
        .arg(
            ArgSpec::query("assignment_id", "assignmentId")
                .describe("Filter by assignment ID")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        ),
        EndpointDescriptor::read(
            "get_assignment",
            "Get ISPW Assignment Details",
            "ispw/{srid}/assignments/{assignment_id}",
            Assignment,
        )
        .describe("Get the details of one assignment.")
        .identified_by("assignment_id", "assignment")
        .arg(assignment_id()),
        EndpointDescriptor::write(
            "create_assignment",
            "Create ISPW Assignment",
            "ispw/{srid}/assignments",
            Assignment,
        )
        .describe("Create a new assignment in an SRID.")
        .identified_by("assignment_id", "assignment")
        .arg(
            ArgSpec::body("assignment_id", "assignmentId")
                .required()
                .describe("ID of the new assignment")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        )
        .arg(
            ArgSpec::body("stream", "stream")
                .required()
                .describe("Stream name")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        )
        .arg(
            ArgSpec::body("application", "application")
                .required()
                .describe("Application name")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        )
        .arg(
            ArgSpec::body("description", "description")
                .describe("Assignment description")
                .max_len(limits::DESCRIPTION_MAX_LENGTH),
        )
        .arg(
            ArgSpec::body("default_path", "defaultPath")
                .describe("Default path")
                .max_len(limits::PATH_MAX_LENGTH),
        ),
        EndpointDescriptor::read(
            "list_tasks",
            "List Assignment Tasks",
            "ispw/{srid}/assignments/{assignment_id}/tasks",
            Task,
        )
        .describe("List the tasks (components) of an assignment.")
        .listing()
        .identified_by("assignment_id", "assignment")
        .arg(assignment_id()),
        EndpointDescriptor::read(
            "list_releases",
            "List ISPW Releases",
            "ispw/{srid}/releases",
            Release,
        )
        .describe("List releases in an SRID, optionally filtered by release ID.")
        .listing()
        .arg(
            ArgSpec::query("release_id", "releaseId")
                .describe("Filter by release ID")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        ),
        EndpointDescriptor::read(
            "get_release",
            "Get ISPW Release Details",
            "ispw/{srid}/releases/{release_id}",
            Release,
        )
        .describe("Get the details of one release.")
        .identified_by("release_id", "release")
        .arg(
            ArgSpec::path("release_id")
                .describe("Release ID")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        ),
        EndpointDescriptor::write(
            "create_release",
            "Create ISPW Release",
            "ispw/{srid}/releases",
            Release,
        )
        .describe("Create a new release in an SRID.")
        .identified_by("release_id", "release")
        .arg(
            ArgSpec::body("release_id", "releaseId")
                .required()
                .describe("ID of the new release")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        )
        .arg(
            ArgSpec::body("stream", "stream")
                .required()
                .describe("Stream name")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        )
        .arg(
            ArgSpec::body("application", "application")
                .required()
                .describe("Application name")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        )
        .arg(
            ArgSpec::body("description", "description")
                .describe("Release description")
                .max_len(limits::DESCRIPTION_MAX_LENGTH),
        ),
        EndpointDescriptor::write(
            "generate_assignment",
            "Generate Assignment Tasks",
            "ispw/{srid}/assignments/{assignment_id}/generate",
            Operation,
        )
        .describe("Generate (compile) the tasks of an assignment.")
        .destructive()
        .identified_by("assignment_id", "assignment")
        .arg(assignment_id())
        .arg(level_body())
        .arg(
            ArgSpec::body("runtime_configuration", "runtimeConfiguration")
                .describe("Runtime configuration")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        ),
        EndpointDescriptor::write(
            "promote_assignment",
            "Promote Assignment",
            "ispw/{srid}/assignments/{assignment_id}/promote",
            Operation,
        )
        .describe("Promote an assignment to the next lifecycle level.")
        .destructive()
        .identified_by("assignment_id", "assignment")
        .arg(assignment_id())
        .arg(level_body())
        .arg(
            ArgSpec::body("change_type", "changeType")
                .describe("Change type: S (standard), I (incidental), E (emergency)")
                .one_of(CHANGE_TYPES),
        )
        .arg(
            ArgSpec::body("execution_status", "executionStatus")
                .describe("Execution status")
                .max_len(limits::SHORT_FIELD_MAX_LENGTH),
        ),
        EndpointDescriptor::write(
            "deploy",
            "Deploy Assignment, Release or Set",
            "ispw/{srid}/{target_type}s/{target_id}/deploy",
            Operation,
        )
        .describe("Deploy an assignment, release or set to a target environment.")
        .destructive()
        .identified_by("target_id", "deploy target")
        .arg(
            ArgSpec::path("target_type")
                .describe("What to deploy: 'assignment', 'release' or 'set'")
                .matching("^(assignment|release|set)$"),
        )
        .arg(
            ArgSpec::path("target_id")
                .describe("ID of the assignment, release or set")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        )
        .arg(level_body())
        .arg(
            ArgSpec::body("deploy_implementation_time", "deployImplementationTime")
                .describe("Implementation time")
                .max_len(limits::SHORT_FIELD_MAX_LENGTH),
        )
        .arg(
            ArgSpec::body("deploy_active", "deployActive")
                .boolean()
                .describe("Whether the deployment is active"),
        ),
        EndpointDescriptor::read("list_sets", "List ISPW Sets", "ispw/{srid}/sets", Set)
            .describe("List sets in an SRID, optionally filtered by set ID.")
            .listing()
            .arg(
                ArgSpec::query("set_id", "setId")
                    .describe("Filter by set ID")
                    .max_len(limits::IDENTIFIER_MAX_LENGTH),
            ),
        EndpointDescriptor::read(
            "get_set",
            "Get ISPW Set Details",
            "ispw/{srid}/sets/{set_id}",
            Set,
        )
        .describe("Get the details of one set.")
        .identified_by("set_id", "set")
        .arg(
            ArgSpec::path("set_id")
                .describe("Set ID")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        ),
        EndpointDescriptor::read(
            "list_packages",
            "List ISPW Packages",
            "ispw/{srid}/packages",
            Package,
        )
        .describe("List packages in an SRID, optionally filtered by package ID.")
        .listing()
        .arg(
            ArgSpec::query("package_id", "packageId")
                .describe("Filter by package ID")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        ),
        EndpointDescriptor::read(
            "get_package",
            "Get ISPW Package Details",
            "ispw/{srid}/packages/{package_id}",
            Package,
        )
        .describe("Get the details of one package.")
        .identified_by("package_id", "package")
        .arg(
            ArgSpec::path("package_id")
                .describe("Package ID")
                .max_len(limits::IDENTIFIER_MAX_LENGTH),
        ),
    ]
}

pub fn catalog() -> &'static [EndpointDescriptor] {
    &CATALOG
}

pub fn operation_names() -> Vec<&'static str> {
    CATALOG.iter().map(|d| d.operation).collect()
}

/// Accepts both `ispw_<operation>` and the bare operation name.
pub fn descriptor(name: &str) -> Option<&'static EndpointDescriptor> {
    let name = name.trim();
    let bare = name.strip_prefix(TOOL_PREFIX).unwrap_or(name);
    CATALOG_INDEX.get(bare).map(|idx| &CATALOG[*idx])
}

pub fn unknown_operation(name: &str) -> ToolError {
    let names = operation_names();
    let bare = name.trim().strip_prefix(TOOL_PREFIX).unwrap_or(name.trim());
    let suggestions = suggest(bare, &names, limits::SUGGESTION_LIMIT);
    let mut error = ToolError::invalid_field(
        "operation",
        "known_operation",
        format!("Unknown operation '{}'", name.trim()),
    );
    if !suggestions.is_empty() {
        error = error.with_hint(format!("Did you mean: {}?", suggestions.join(", ")));
        if let Some(details) = error.details.as_mut().and_then(Value::as_object_mut) {
            details.insert("did_you_mean".into(), json!(suggestions));
        }
    }
    error
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    pub annotations: Value,
}

pub fn tool_defs() -> Vec<ToolDef> {
    CATALOG
        .iter()
        .map(|d| ToolDef {
            name: d.tool_name(),
            title: d.title.to_string(),
            description: d.description.to_string(),
            input_schema: d.input_schema(),
            annotations: json!({
                "title": d.title,
                "readOnlyHint": d.read_only,
                "destructiveHint": d.destructive,
                "idempotentHint": d.idempotent,
                "openWorldHint": true,
            }),
        })
        .collect()
}

/// Checks arguments (already trimmed and defaulted) against the operation schema.
pub fn validate_args(descriptor: &EndpointDescriptor, args: &Value) -> Result<(), ToolError> {
    let Some(schema) = VALIDATORS.get(descriptor.operation) else {
        return Err(unknown_operation(descriptor.operation));
    };
    if let Err(errors) = schema.validate(args) {
        return Err(format_schema_errors(descriptor, errors));
    }
    Ok(())
}

fn format_schema_errors(
    descriptor: &EndpointDescriptor,
    errors: jsonschema::ErrorIterator,
) -> ToolError {
    let mut rendered = Vec::new();
    let mut first: Option<(String, &'static str)> = None;
    let mut did_you_mean = Vec::new();
    let known: Vec<&str> = descriptor
        .args
        .iter()
        .map(|spec| spec.name)
        .chain(std::iter::once("response_format"))
        .collect();

    for err in errors.take(10) {
        let pointer = err.instance_path.to_string();
        let at = pointer.trim_start_matches('/').to_string();
        let (field, constraint, text) = match &err.kind {
            ValidationErrorKind::Required { property } => {
                let name = property.as_str().unwrap_or_default().to_string();
                let text = format!("missing required argument '{}'", name);
                (name, "required", text)
            }
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                let name = unexpected.first().cloned().unwrap_or_default();
                for unknown in unexpected {
                    let hits = suggest(unknown, &known, 3);
                    if !hits.is_empty() {
                        did_you_mean.push(format!("'{}' -> {}", unknown, hits.join(", ")));
                    }
                }
                let text = format!("unknown argument(s): {}", unexpected.join(", "));
                (name, "unknown_argument", text)
            }
            ValidationErrorKind::Type { .. } => {
                (at.clone(), "type", format!("'{}' has the wrong type: {}", at, err))
            }
            ValidationErrorKind::Enum { .. } => {
                (at.clone(), "enum", format!("'{}' {}", at, err))
            }
            ValidationErrorKind::MinLength { limit } => (
                at.clone(),
                "min_length",
                format!("'{}' must be at least {} character(s)", at, limit),
            ),
            ValidationErrorKind::MaxLength { limit } => (
                at.clone(),
                "max_length",
                format!("'{}' must be at most {} characters", at, limit),
            ),
            ValidationErrorKind::Pattern { pattern } => (
                at.clone(),
                "pattern",
                format!("'{}' must match {}", at, pattern),
            ),
            _ => (at.clone(), "schema", format!("'{}': {}", at, err)),
        };
        if first.is_none() {
            first = Some((field, constraint));
        }
        rendered.push(text);
    }

    let (field, constraint) = first.unwrap_or_else(|| ("(root)".to_string(), "schema"));
    let field = if field.is_empty() {
        "(root)".to_string()
    } else {
        field
    };
    let mut error = ToolError::invalid_field(
        &field,
        constraint,
        format!(
            "Invalid arguments for {}: {}",
            descriptor.tool_name(),
            rendered.join("; ")
        ),
    );
    if !did_you_mean.is_empty() {
        error = error.with_hint(format!("Did you mean: {}", did_you_mean.join("; ")));
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_placeholder_is_a_path_argument() {
        for d in catalog() {
            for name in d.path_placeholders() {
                let spec = d
                    .arg_spec(name)
                    .unwrap_or_else(|| panic!("{} missing path arg {}", d.operation, name));
                assert_eq!(spec.location, ArgLocation::Path, "{}", d.operation);
            }
            for spec in d.args.iter().filter(|s| s.location == ArgLocation::Path) {
                assert!(d.path_placeholders().contains(&spec.name), "{}", d.operation);
            }
        }
    }

    #[test]
    fn destructive_flags_match_lifecycle_operations() {
        let destructive: Vec<&str> = catalog()
            .iter()
            .filter(|d| d.destructive)
            .map(|d| d.operation)
            .collect();
        assert_eq!(destructive, vec!["generate_assignment", "promote_assignment", "deploy"]);
        assert!(catalog().iter().filter(|d| d.read_only).all(|d| d.verb == HttpVerb::Get));
    }

    #[test]
    fn lookup_accepts_prefixed_and_bare_names() {
        assert_eq!(descriptor("ispw_deploy").map(|d| d.operation), Some("deploy"));
        assert_eq!(descriptor("deploy").map(|d| d.operation), Some("deploy"));
        assert!(descriptor("ispw_nope").is_none());
    }

    #[test]
    fn unknown_operation_suggests_neighbours() {
        let err = unknown_operation("list_assignment");
        assert_eq!(err.field(), Some("operation"));
        assert!(err.hint.as_deref().unwrap_or_default().contains("list_assignments"));
    }

    #[test]
    fn deploy_path_template_exposes_target_placeholders() {
        let d = descriptor("deploy").expect("deploy");
        assert_eq!(d.path_placeholders(), vec!["srid", "target_type", "target_id"]);
    }

    #[test]
    fn schema_errors_name_field_and_constraint() {
        let d = descriptor("get_assignment").expect("descriptor");
        let err = validate_args(d, &json!({"srid": "ISPW"})).unwrap_err();
        assert_eq!(err.field(), Some("assignment_id"));
        assert_eq!(err.constraint(), Some("required"));

        let long = "x".repeat(101);
        let err = validate_args(d, &json!({"srid": "ISPW", "assignment_id": long})).unwrap_err();
        assert_eq!(err.field(), Some("assignment_id"));
        assert_eq!(err.constraint(), Some("max_length"));

        let err = validate_args(d, &json!({"srid": "ISPW", "assignment_id": "A", "assignmnt": 1}))
            .unwrap_err();
        assert_eq!(err.constraint(), Some("unknown_argument"));
        assert_eq!(err.field(), Some("assignmnt"));
    }

    #[test]
    fn deploy_target_type_is_pattern_checked() {
        let d = descriptor("deploy").expect("deploy");
        let err = validate_args(
            d,
            &json!({"srid": "ISPW", "target_type": "package", "target_id": "P1"}),
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("target_type"));
        assert_eq!(err.constraint(), Some("pattern"));
    }

    #[test]
    fn tool_defs_carry_annotations() {
        let defs = tool_defs();
        assert_eq!(defs.len(), catalog().len());
        let deploy = defs.iter().find(|t| t.name == "ispw_deploy").expect("deploy");
        assert_eq!(deploy.annotations["destructiveHint"], true);
        assert_eq!(deploy.annotations["readOnlyHint"], false);
        assert_eq!(deploy.input_schema["additionalProperties"], false);
    }
}
