use crate::constants::defaults;
use crate::errors::ToolError;
use crate::mcp::catalog::{self, ArgDefault, EndpointDescriptor};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct Validation {
    default_srid: String,
}

impl Validation {
    pub fn new(default_srid: &str) -> Self {
        Self {
            default_srid: default_srid.trim().to_string(),
        }
    }

    pub fn default_srid(&self) -> &str {
        &self.default_srid
    }

    pub fn ensure_object(&self, value: Value) -> Result<Map<String, Value>, ToolError> {
        match value {
            Value::Null => Ok(Map::new()),
            Value::Object(map) => Ok(map),
            _ => Err(ToolError::invalid_field(
                "(root)",
                "type",
                "Tool arguments must be a JSON object",
            )),
        }
    }

    /// Trims string values and treats `null` as an omitted argument.
    pub fn normalize(&self, args: Map<String, Value>) -> Map<String, Value> {
        args.into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| match value {
                Value::String(text) => (key, Value::String(text.trim().to_string())),
                other => (key, other),
            })
            .collect()
    }

    /// Drops blank values of optional arguments; the upstream never sees them.
    pub fn drop_blank_optionals(
        &self,
        descriptor: &EndpointDescriptor,
        args: &mut Map<String, Value>,
    ) {
        args.retain(|key, value| {
            let blank = value.as_str().is_some_and(str::is_empty);
            if !blank {
                return true;
            }
            match descriptor.arg_spec(key) {
                Some(spec) => spec.required,
                None => key != "response_format",
            }
        });
    }

    pub fn apply_defaults(
        &self,
        descriptor: &EndpointDescriptor,
        args: &mut Map<String, Value>,
    ) {
        for spec in &descriptor.args {
            if args.contains_key(spec.name) {
                continue;
            }
            if let Some(ArgDefault::ConfiguredSrid) = spec.default {
                args.insert(spec.name.to_string(), Value::String(self.default_srid.clone()));
            }
        }
        args.entry("response_format")
            .or_insert_with(|| Value::String(defaults::RESPONSE_FORMAT.to_string()));
    }

    /// Normalized, defaulted and schema-checked arguments for one call.
    pub fn prepare(
        &self,
        descriptor: &EndpointDescriptor,
        raw: Value,
    ) -> Result<Map<String, Value>, ToolError> {
        let mut args = self.normalize(self.ensure_object(raw)?);
        self.drop_blank_optionals(descriptor, &mut args);
        self.apply_defaults(descriptor, &mut args);
        catalog::validate_args(descriptor, &Value::Object(args.clone()))?;
        Ok(args)
    }

    pub fn ensure_string<'a>(
        &self,
        args: &'a Map<String, Value>,
        name: &str,
    ) -> Result<&'a str, ToolError> {
        args.get(name)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                ToolError::invalid_field(
                    name,
                    "required",
                    format!("{} must be a non-empty string", name),
                )
            })
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::new(defaults::SRID)
    }
}
