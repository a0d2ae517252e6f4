use crate::errors::ToolError;
use crate::utils::case::normalize_keys;
use serde::Serialize;
use serde_json::{Map, Value};

const NOT_SET: &str = "not set";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    Structured,
    Text,
}

impl OutputMode {
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        match raw.trim().to_lowercase().as_str() {
            "markdown" | "text" => Ok(OutputMode::Text),
            "json" | "structured" => Ok(OutputMode::Structured),
            other => Err(ToolError::invalid_field(
                "response_format",
                "enum",
                format!(
                    "response_format '{}' is not supported: expected one of markdown, json, text, structured",
                    other
                ),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Assignment,
    Task,
    Release,
    Set,
    Package,
    Operation,
}

struct Field {
    label: &'static str,
    key: &'static str,
    datetime: bool,
}

const fn field(label: &'static str, key: &'static str) -> Field {
    Field {
        label,
        key,
        datetime: false,
    }
}

const fn when(label: &'static str, key: &'static str) -> Field {
    Field {
        label,
        key,
        datetime: true,
    }
}

const ASSIGNMENT_FIELDS: &[Field] = &[
    field("Description", "description"),
    field("Owner", "owner"),
    field("Stream", "stream"),
    field("Application", "application"),
    field("Level", "level"),
    field("Status", "status"),
    when("Created", "createdDate"),
    when("Modified", "modifiedDate"),
];

const RELEASE_FIELDS: &[Field] = &[
    field("Description", "description"),
    field("Owner", "owner"),
    field("Stream", "stream"),
    field("Application", "application"),
    field("Status", "status"),
    when("Created", "createdDate"),
];

const TASK_FIELDS: &[Field] = &[
    field("Module", "moduleName"),
    field("Type", "moduleType"),
    field("Level", "level"),
    field("Status", "status"),
    field("User", "userId"),
];

const SET_FIELDS: &[Field] = &[
    field("Description", "description"),
    field("Owner", "owner"),
    field("Application", "application"),
    field("Status", "status"),
];

const PACKAGE_FIELDS: &[Field] = &[
    field("Description", "description"),
    field("Owner", "owner"),
    field("Application", "application"),
    field("Status", "status"),
    when("Created", "createdDate"),
];

const OPERATION_FIELDS: &[Field] = &[
    field("Status", "status"),
    field("Message", "message"),
    field("Set", "setId"),
    field("Status URL", "url"),
    when("Started", "startTime"),
];

impl EntityKind {
    pub fn title(self) -> &'static str {
        match self {
            EntityKind::Assignment => "Assignment",
            EntityKind::Task => "Task",
            EntityKind::Release => "Release",
            EntityKind::Set => "Set",
            EntityKind::Package => "Package",
            EntityKind::Operation => "Operation",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            EntityKind::Assignment => "assignment",
            EntityKind::Task => "task",
            EntityKind::Release => "release",
            EntityKind::Set => "set",
            EntityKind::Package => "package",
            EntityKind::Operation => "operation",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            EntityKind::Assignment => "assignments",
            EntityKind::Task => "tasks",
            EntityKind::Release => "releases",
            EntityKind::Set => "sets",
            EntityKind::Package => "packages",
            EntityKind::Operation => "operations",
        }
    }

    pub fn id_key(self) -> &'static str {
        match self {
            EntityKind::Assignment => "assignmentId",
            EntityKind::Task => "taskId",
            EntityKind::Release => "releaseId",
            EntityKind::Set => "setId",
            EntityKind::Package => "packageId",
            EntityKind::Operation => "operationId",
        }
    }

    fn detail_fields(self) -> &'static [Field] {
        match self {
            EntityKind::Assignment => ASSIGNMENT_FIELDS,
            EntityKind::Task => TASK_FIELDS,
            EntityKind::Release => RELEASE_FIELDS,
            EntityKind::Set => SET_FIELDS,
            EntityKind::Package => PACKAGE_FIELDS,
            EntityKind::Operation => OPERATION_FIELDS,
        }
    }

    // Besides the id, the fields shown on a collection bullet line.
    fn summary_keys(self) -> &'static [(&'static str, &'static str)] {
        match self {
            EntityKind::Assignment => &[
                ("level", "level"),
                ("status", "status"),
                ("owner", "owner"),
                ("application", "application"),
            ],
            EntityKind::Task => &[
                ("module", "moduleName"),
                ("type", "moduleType"),
                ("level", "level"),
                ("status", "status"),
            ],
            EntityKind::Release | EntityKind::Set | EntityKind::Package => &[
                ("status", "status"),
                ("owner", "owner"),
                ("application", "application"),
            ],
            EntityKind::Operation => &[("status", "status"), ("message", "message")],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "content", rename_all = "snake_case")]
pub enum RenderedOutput {
    Structured(Value),
    Text(String),
}

impl RenderedOutput {
    pub fn mode(&self) -> OutputMode {
        match self {
            RenderedOutput::Structured(_) => OutputMode::Structured,
            RenderedOutput::Text(_) => OutputMode::Text,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RenderedOutput::Text(text) => Some(text),
            RenderedOutput::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            RenderedOutput::Structured(value) => Some(value),
            RenderedOutput::Text(_) => None,
        }
    }

    /// Text block for transports that only carry strings.
    pub fn to_display_string(&self) -> String {
        match self {
            RenderedOutput::Text(text) => text.clone(),
            RenderedOutput::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub collection: bool,
    pub heading: Option<String>,
    pub scope: Option<String>,
    pub filters: Vec<(String, String)>,
}

impl RenderContext {
    pub fn collection() -> Self {
        Self {
            collection: true,
            ..Self::default()
        }
    }

    pub fn single() -> Self {
        Self::default()
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_filter(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((label.into(), value.into()));
        self
    }
}

pub fn render(
    payload: &Value,
    mode: OutputMode,
    kind: EntityKind,
    ctx: &RenderContext,
) -> RenderedOutput {
    match mode {
        OutputMode::Structured => RenderedOutput::Structured(normalize_keys(payload)),
        OutputMode::Text => RenderedOutput::Text(render_text(payload, kind, ctx)),
    }
}

fn render_text(payload: &Value, kind: EntityKind, ctx: &RenderContext) -> String {
    if ctx.collection || payload.is_array() {
        let items = collection_items(payload, kind);
        let total = payload
            .get("totalCount")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(items.len());
        return render_collection(&items, total, kind, ctx);
    }
    match payload {
        Value::Object(map) => render_entity(map, kind, ctx),
        Value::Null => format!("{} request accepted; the service returned no content.", kind.title()),
        Value::String(text) if text.trim().is_empty() => {
            format!("{} request accepted; the service returned no content.", kind.title())
        }
        other => {
            let mut lines = vec![entity_heading(kind, None, ctx)];
            lines.push(display_value(other));
            lines.join("\n")
        }
    }
}

fn collection_items(payload: &Value, kind: EntityKind) -> Vec<Value> {
    match payload {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .get(kind.plural())
            .or_else(|| map.get("items"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn render_collection(items: &[Value], total: usize, kind: EntityKind, ctx: &RenderContext) -> String {
    if items.is_empty() {
        let filtered = if ctx.filters.is_empty() {
            ""
        } else {
            " matching filters"
        };
        let scope = ctx
            .scope
            .as_ref()
            .map(|s| format!(" for {}", s))
            .unwrap_or_default();
        return format!("No {} found{}{}.", kind.plural(), filtered, scope);
    }

    let mut heading = ctx.heading.clone().unwrap_or_else(|| {
        let scope = ctx
            .scope
            .as_ref()
            .map(|s| format!(" for {}", s))
            .unwrap_or_default();
        format!("# {}{}", capitalize(kind.plural()), scope)
    });
    if !ctx.filters.is_empty() {
        let filters: Vec<String> = ctx
            .filters
            .iter()
            .map(|(label, value)| format!("{}: {}", label, value))
            .collect();
        heading.push_str(&format!(" ({})", filters.join(", ")));
    }

    let mut lines = vec![
        heading,
        String::new(),
        format!("Found {} {}(s)", total, kind.singular()),
        String::new(),
    ];
    for item in items {
        lines.push(summary_line(item, kind));
    }
    if total > items.len() {
        lines.push(String::new());
        lines.push(format!("Showing {} of {}.", items.len(), total));
    }
    lines.join("\n")
}

fn summary_line(item: &Value, kind: EntityKind) -> String {
    let Some(map) = item.as_object() else {
        return format!("- {}", display_value(item));
    };
    let mut parts = vec![lookup_display(map, kind.id_key(), false)];
    for (label, key) in kind.summary_keys() {
        parts.push(format!("{}: {}", label, lookup_display(map, key, false)));
    }
    format!("- {}", parts.join(" | "))
}

fn entity_heading(kind: EntityKind, map: Option<&Map<String, Value>>, ctx: &RenderContext) -> String {
    if let Some(heading) = ctx.heading.as_ref() {
        return heading.clone();
    }
    let id = map
        .map(|m| lookup_display(m, kind.id_key(), false))
        .unwrap_or_else(|| NOT_SET.to_string());
    format!("## {}: {}", kind.title(), id)
}

fn render_entity(map: &Map<String, Value>, kind: EntityKind, ctx: &RenderContext) -> String {
    let id_label = format!("{} ID", kind.title());
    // A custom heading hides the id, so it moves into the field list.
    let mut rows: Vec<(&str, String)> = Vec::new();
    if ctx.heading.is_some() {
        rows.push((id_label.as_str(), lookup_display(map, kind.id_key(), false)));
    }
    for field in kind.detail_fields() {
        rows.push((field.label, lookup_display(map, field.key, field.datetime)));
    }
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);

    let mut lines = vec![entity_heading(kind, Some(map), ctx)];
    for (label, value) in rows {
        lines.push(format!("{:<width$} : {}", label, value, width = width));
    }
    lines.join("\n")
}

fn lookup_display(map: &Map<String, Value>, key: &str, datetime: bool) -> String {
    match map.get(key) {
        None | Some(Value::Null) => NOT_SET.to_string(),
        Some(Value::String(text)) if text.trim().is_empty() => NOT_SET.to_string(),
        Some(Value::String(text)) if datetime => format_datetime(text),
        Some(value) => display_value(value),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => NOT_SET.to_string(),
        Value::String(text) => text.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub fn format_datetime(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return parsed
            .with_timezone(&chrono::Utc)
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, pattern) {
            return naive.format("%Y-%m-%d %H:%M:%S UTC").to_string();
        }
    }
    trimmed.to_string()
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
