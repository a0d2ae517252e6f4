use crate::errors::ToolError;
use crate::mcp::catalog::{self, ArgLocation, EndpointDescriptor};
use crate::services::classifier::{classify, ClassifyContext};
use crate::services::config::IspwConfig;
use crate::services::executor::{HttpVerb, RequestExecutor, UpstreamRequest};
use crate::services::logger::Logger;
use crate::services::renderer::{render, EntityKind, OutputMode, RenderContext, RenderedOutput};
use crate::services::validation::Validation;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    Received,
    Validated,
    Submitted,
    Completed,
    Failed,
    Rejected,
}

impl CallPhase {
    pub fn can_advance_to(self, next: CallPhase) -> bool {
        matches!(
            (self, next),
            (CallPhase::Received, CallPhase::Validated)
                | (CallPhase::Received, CallPhase::Rejected)
                | (CallPhase::Validated, CallPhase::Submitted)
                | (CallPhase::Submitted, CallPhase::Completed)
                | (CallPhase::Submitted, CallPhase::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallPhase::Completed | CallPhase::Failed | CallPhase::Rejected
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            CallPhase::Received => "received",
            CallPhase::Validated => "validated",
            CallPhase::Submitted => "submitted",
            CallPhase::Completed => "completed",
            CallPhase::Failed => "failed",
            CallPhase::Rejected => "rejected",
        }
    }
}

struct CallTrace<'a> {
    logger: &'a Logger,
    call_id: String,
    operation: String,
    phase: CallPhase,
}

impl<'a> CallTrace<'a> {
    fn start(logger: &'a Logger, operation: &str) -> Self {
        let trace = Self {
            logger,
            call_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            phase: CallPhase::Received,
        };
        trace.log(None);
        trace
    }

    fn advance(&mut self, next: CallPhase, meta: Option<Value>) {
        if !self.phase.can_advance_to(next) {
            self.logger.warn(
                "unexpected call phase transition",
                Some(&serde_json::json!({
                    "call_id": self.call_id,
                    "from": self.phase.as_str(),
                    "to": next.as_str(),
                })),
            );
        }
        self.phase = next;
        self.log(meta);
    }

    fn fail(&mut self, err: &ToolError) {
        let next = if self.phase == CallPhase::Submitted {
            CallPhase::Failed
        } else {
            CallPhase::Rejected
        };
        self.advance(
            next,
            Some(serde_json::json!({
                "category": err.category.as_str(),
                "status": err.status,
            })),
        );
    }

    fn log(&self, meta: Option<Value>) {
        let mut fields = serde_json::json!({
            "call_id": self.call_id,
            "operation": self.operation,
            "phase": self.phase.as_str(),
        });
        if let (Some(Value::Object(extra)), Some(map)) = (meta, fields.as_object_mut()) {
            map.extend(extra);
        }
        self.logger.debug("tool call", Some(&fields));
    }
}

/// A validated call, ready to be turned into an upstream request.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub descriptor: &'static EndpointDescriptor,
    pub arguments: Map<String, Value>,
    pub mode: OutputMode,
}

impl ToolRequest {
    pub fn operation(&self) -> &'static str {
        self.descriptor.operation
    }

    fn text_arg(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).and_then(Value::as_str)
    }

    pub fn resolve_path(&self) -> Result<String, ToolError> {
        let mut path = String::with_capacity(self.descriptor.path.len() + 32);
        let mut rest = self.descriptor.path;
        while let Some(start) = rest.find('{') {
            path.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| {
                ToolError::input_invalid(format!(
                    "Malformed path template for {}",
                    self.descriptor.operation
                ))
            })?;
            let name = &after[..end];
            let value = self.text_arg(name).ok_or_else(|| {
                ToolError::invalid_field(
                    name,
                    "required",
                    format!("missing required argument '{}'", name),
                )
            })?;
            path.push_str(&encode_path_segment(value));
            rest = &after[end + 1..];
        }
        path.push_str(rest);
        Ok(path)
    }

    pub fn query(&self) -> Vec<(String, String)> {
        self.descriptor
            .args
            .iter()
            .filter(|spec| spec.location == ArgLocation::Query)
            .filter_map(|spec| {
                self.arguments
                    .get(spec.name)
                    .map(|value| (spec.wire_name.to_string(), plain(value)))
            })
            .collect()
    }

    pub fn body(&self) -> Option<Value> {
        let mut body = Map::new();
        for spec in &self.descriptor.args {
            if spec.location != ArgLocation::Body {
                continue;
            }
            if let Some(value) = self.arguments.get(spec.name) {
                body.insert(spec.wire_name.to_string(), value.clone());
            }
        }
        match self.descriptor.verb {
            HttpVerb::Get => None,
            _ => Some(Value::Object(body)),
        }
    }

    fn srid(&self) -> Option<&str> {
        self.text_arg("srid")
    }

    fn identifier(&self) -> Option<&str> {
        self.descriptor
            .identifier_arg
            .and_then(|name| self.text_arg(name))
    }

    fn classify_context(&self) -> ClassifyContext {
        let subject = if self.descriptor.operation == "deploy" {
            self.text_arg("target_type")
                .unwrap_or(self.descriptor.subject)
        } else {
            self.descriptor.subject
        };
        let mut ctx = ClassifyContext::new(subject);
        if let Some(id) = self.identifier() {
            ctx = ctx.with_identifier(id);
        }
        if let Some(srid) = self.srid() {
            ctx = ctx.with_srid(srid);
        }
        ctx
    }

    fn render_context(&self) -> RenderContext {
        let d = self.descriptor;
        let srid_scope = self
            .srid()
            .map(|srid| format!("SRID '{}'", srid))
            .unwrap_or_default();
        if d.collection {
            let scope = match self.identifier() {
                Some(id) => format!("{} '{}' in {}", d.subject, id, srid_scope),
                None => srid_scope,
            };
            let mut ctx = RenderContext::collection().with_scope(scope);
            for spec in d.args.iter().filter(|s| s.location == ArgLocation::Query) {
                if let Some(value) = self.arguments.get(spec.name) {
                    ctx = ctx.with_filter(spec.name, plain(value));
                }
            }
            return ctx;
        }
        if d.entity == EntityKind::Operation {
            let target = self.identifier().unwrap_or("");
            return RenderContext::single().with_heading(format!("## {}: {}", d.title, target));
        }
        RenderContext::single()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub operation: &'static str,
    pub entity: EntityKind,
    pub read_only: bool,
    pub destructive: bool,
    pub status: u16,
    pub output: RenderedOutput,
}

impl DispatchOutcome {
    pub fn meta(&self) -> Value {
        serde_json::json!({
            "operation": self.operation,
            "entity": self.entity,
            "read_only": self.read_only,
            "destructive": self.destructive,
            "status": self.status,
            "mode": self.output.mode(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    logger: Logger,
    validation: Validation,
    executor: RequestExecutor,
}

impl Dispatcher {
    pub fn new(executor: RequestExecutor, default_srid: &str, logger: Logger) -> Self {
        Self {
            logger: logger.child("dispatch"),
            validation: Validation::new(default_srid),
            executor,
        }
    }

    pub fn from_config(config: &IspwConfig, logger: Logger) -> Result<Self, ToolError> {
        let executor = RequestExecutor::from_config(config, logger.clone())?;
        Ok(Self::new(executor, &config.default_srid, logger))
    }

    pub fn prepare(&self, operation: &str, arguments: Value) -> Result<ToolRequest, ToolError> {
        let descriptor =
            catalog::descriptor(operation).ok_or_else(|| catalog::unknown_operation(operation))?;
        let arguments = self.validation.prepare(descriptor, arguments)?;
        let format = self.validation.ensure_string(&arguments, "response_format")?;
        let mode = OutputMode::parse(format)?;
        Ok(ToolRequest {
            descriptor,
            arguments,
            mode,
        })
    }

    pub async fn dispatch(
        &self,
        operation: &str,
        arguments: Value,
    ) -> Result<DispatchOutcome, ToolError> {
        let mut trace = CallTrace::start(&self.logger, operation);
        let request = match self.prepare(operation, arguments) {
            Ok(request) => request,
            Err(err) => {
                trace.fail(&err);
                return Err(err);
            }
        };
        trace.advance(CallPhase::Validated, None);

        let upstream = match request.resolve_path() {
            Ok(path) => UpstreamRequest {
                verb: request.descriptor.verb,
                path,
                query: request.query(),
                body: request.body(),
                timeout: self.executor.default_timeout(),
            },
            Err(err) => {
                trace.fail(&err);
                return Err(err);
            }
        };
        trace.advance(
            CallPhase::Submitted,
            Some(serde_json::json!({
                "verb": upstream.verb.as_str(),
                "path": upstream.path,
                "destructive": request.descriptor.destructive,
            })),
        );

        let result = match self.executor.send(&upstream).await {
            Ok(result) => result,
            Err(err) => {
                trace.fail(&err);
                return Err(err);
            }
        };
        if !result.is_success() {
            let err = classify(result.status, &result.body, &request.classify_context());
            trace.fail(&err);
            return Err(err);
        }

        let payload = result.body.to_value();
        let output = render(
            &payload,
            request.mode,
            request.descriptor.entity,
            &request.render_context(),
        );
        trace.advance(
            CallPhase::Completed,
            Some(serde_json::json!({ "status": result.status })),
        );
        Ok(DispatchOutcome {
            operation: request.descriptor.operation,
            entity: request.descriptor.entity,
            read_only: request.descriptor.read_only,
            destructive: request.descriptor.destructive,
            status: result.status,
            output,
        })
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn encode_path_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}
