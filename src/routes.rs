//! Route table built once at startup.
//!
//! Groups endpoint definitions by path template, preserving registration
//! order, and resolves the endpoint for an inbound method.

use crate::config::{ConfigError, EndpointDefinition};
use crate::matcher::{decode_path, PathTemplate};
use crate::script::{PreparedScript, ScriptRuntime};
use axum::http::{HeaderMap, StatusCode};
use std::collections::HashMap;
use tracing::{info, warn};

/// An endpoint ready to serve.
#[derive(Debug)]
pub struct Endpoint {
    /// The definition as configured
    pub definition: EndpointDefinition,
    /// Configured headers
    pub headers: HeaderMap,
    /// Configured status, 200 when unset
    pub status: StatusCode,
    /// Compiled script for scripted endpoints
    pub script: Option<PreparedScript>,
}

impl Endpoint {
    fn new(definition: EndpointDefinition, runtime: &ScriptRuntime) -> Result<Self, String> {
        let headers = definition.header_map()?;
        let status = definition.status()?;
        let script = definition
            .script
            .as_deref()
            .filter(|_| definition.is_scripted())
            .map(|source| runtime.prepare(source));

        Ok(Self {
            definition,
            headers,
            status,
            script,
        })
    }
}

/// All endpoints sharing one path template.
#[derive(Debug)]
pub struct Route {
    pub template: PathTemplate,
    pub endpoints: Vec<Endpoint>,
}

impl Route {
    /// Methods configured explicitly for this path.
    pub fn allowed_methods(&self) -> impl Iterator<Item = &str> {
        self.endpoints
            .iter()
            .map(|e| e.definition.method.as_str())
            .filter(|m| !m.is_empty())
    }
}

/// A route matched against a request path.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    /// Path parameters bound by the template
    pub params: HashMap<String, String>,
}

/// Path template -> ordered endpoints.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    /// Templates without placeholders, by path
    static_index: HashMap<String, usize>,
}

impl RouteTable {
    /// Group endpoint definitions by path and compile their scripts.
    pub fn build(
        definitions: Vec<EndpointDefinition>,
        runtime: &ScriptRuntime,
    ) -> Result<Self, ConfigError> {
        let mut table = RouteTable::default();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (index, definition) in definitions.into_iter().enumerate() {
            let path = definition.path.clone();
            let endpoint = Endpoint::new(definition, runtime).map_err(|message| {
                ConfigError::Invalid {
                    index,
                    path: path.clone(),
                    message,
                }
            })?;

            log_registration(&endpoint);

            let position = *positions.entry(path.clone()).or_insert_with(|| {
                table.routes.push(Route {
                    template: PathTemplate::parse(&path),
                    endpoints: Vec::new(),
                });
                table.routes.len() - 1
            });
            table.routes[position].endpoints.push(endpoint);
        }

        for (position, route) in table.routes.iter().enumerate() {
            if route.template.is_static() {
                table
                    .static_index
                    .insert(route.template.as_str().to_string(), position);
            }
        }

        Ok(table)
    }

    /// Routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the route for a raw request path.
    ///
    /// The path is percent-decoded first. A placeholder-free template equal to
    /// it wins; otherwise the first matching template in registration order.
    pub fn lookup(&self, path: &str) -> Option<RouteMatch<'_>> {
        let path = decode_path(path);
        if let Some(&position) = self.static_index.get(path.as_ref()) {
            return Some(RouteMatch {
                route: &self.routes[position],
                params: HashMap::new(),
            });
        }

        self.routes.iter().find_map(|route| {
            route
                .template
                .matches(&path)
                .map(|params| RouteMatch { route, params })
        })
    }
}

fn log_registration(endpoint: &Endpoint) {
    let definition = &endpoint.definition;
    let method = if definition.is_wildcard() {
        "*"
    } else {
        definition.method.as_str()
    };

    match &endpoint.script {
        Some(script) if !script.is_valid() => warn!(
            method,
            path = %definition.path,
            error = script.error().unwrap_or_default(),
            "Registered scripted endpoint with a script that does not compile"
        ),
        Some(_) => info!(method, path = %definition.path, "Registered [scripted]"),
        None => info!(method, path = %definition.path, "Registered"),
    }
}

/// Select the endpoint for a method: the first, in registration order,
/// whose method is empty or equal to `method`.
pub fn resolve_method<'a>(endpoints: &'a [Endpoint], method: &str) -> Option<&'a Endpoint> {
    endpoints.iter().find(|e| {
        let configured = e.definition.method.as_str();
        configured.is_empty() || configured == method
    })
}
