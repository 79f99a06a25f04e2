//! Tool call supports.
//!
//! The ralph loop never executes tools itself; it only hands the caller's
//! [`ToolSet`] to the engine with every round. Engines look the requested
//! tool up by name and call it through [`ToolSet::call`].

mod error;

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::pin::Pin;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::Error;

use crate::message::{ToolCallRequest, ToolCallResult};

/// The result of a tool call.
pub type ToolResult = Result<String, Error>;

/// A pending tool call returned by [`ToolSet::call`].
pub type ToolCall = Pin<Box<dyn Future<Output = ToolCallResult> + Send>>;

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless. Context the tool
/// needs (a working directory, a sandbox session handle) should be an
/// immutable part of the tool, set during initialization.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned + Send;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    ///
    /// See [`input_schema`] for deriving it from `Self::Input`.
    fn parameter_schema(&self) -> Value;

    /// Executes the tool with the given input.
    ///
    /// The future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send;
}

/// Derives a JSON schema for a tool input type.
pub fn input_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default()
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolDefinition {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool, typically a JSON schema.
    pub parameters: Value,
}

trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameter_schema(&self) -> Value;

    fn execute(
        self: Arc<Self>,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>>;
}

struct AnyTool<T: Tool>(T);

impl<T: Tool> ToolObject for AnyTool<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn description(&self) -> &str {
        self.0.description()
    }

    #[inline]
    fn parameter_schema(&self) -> Value {
        self.0.parameter_schema()
    }

    fn execute(
        self: Arc<Self>,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                return Box::pin(std::future::ready(ToolResult::Err(
                    Error::InvalidInput(err.to_string()),
                )));
            }
        };
        Box::pin(async move { self.0.execute(input).await })
    }
}

/// A named set of tools, cheap to clone.
///
/// An empty set is valid; rounds then are pure text generation.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Arc<BTreeMap<String, Arc<dyn ToolObject>>>,
}

impl ToolSet {
    /// Creates an empty tool set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool, replacing any tool with the same name.
    pub fn insert<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        Arc::make_mut(&mut self.tools).insert(name, Arc::new(AnyTool(tool)));
    }

    /// Adds a tool and returns the set.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.insert(tool);
        self
    }

    /// Adds every tool of `other`, replacing tools with the same name.
    pub fn extend(&mut self, other: &ToolSet) {
        let tools = Arc::make_mut(&mut self.tools);
        for (name, tool) in other.tools.iter() {
            tools.insert(name.clone(), Arc::clone(tool));
        }
    }

    /// Returns `true` if the set has no tools.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the number of tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns the tool names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Returns the definitions to advertise to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema(),
            })
            .collect()
    }

    /// Calls the tool a request names.
    ///
    /// This never fails: unknown tools, invalid input and execution errors
    /// are all reported back to the model as an error result.
    pub fn call(&self, request: ToolCallRequest) -> ToolCall {
        let ToolCallRequest {
            id,
            name,
            arguments,
        } = request;
        let Some(tool) = self.tools.get(&name).cloned() else {
            warn!("tool not found: {name}");
            return Box::pin(std::future::ready(ToolCallResult {
                id,
                content: Error::NotFound(name).to_string(),
                is_error: true,
            }));
        };

        trace!("calling tool `{name}` ({id}) with args: {arguments:?}");
        Box::pin(async move {
            match tool.execute(arguments).await {
                Ok(content) => ToolCallResult {
                    id,
                    content,
                    is_error: false,
                },
                Err(err) => {
                    debug!("tool `{name}` ({id}) failed: {err}");
                    ToolCallResult {
                        id,
                        content: err.to_string(),
                        is_error: true,
                    }
                }
            }
        })
    }
}

impl Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.tools.keys()).finish()
    }
}
