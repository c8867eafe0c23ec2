//! Resolving application paths to application callables.
//!
//! Applications are addressed as `module:callable`. A bare `module` means
//! `module:application`. The worker only ever sees the resolved
//! [`Application`]; how paths map to code is up to whoever fills the
//! registry.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use crate::server::app::{AppError, Application, Body, Chunks, StartResponse};
use crate::server::environ::{keys, RequestContext};
use crate::server::error::Error;
use crate::server::response::StatusCode;

const DEFAULT_CALLABLE: &str = "application";

/// Split an application path into module and callable.
pub fn split_app_path(path: &str) -> Result<(&str, &str), Error> {
    let (module, callable) = path.split_once(':').unwrap_or((path, DEFAULT_CALLABLE));
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .split('.')
                .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
    };
    if valid(module) && valid(callable) {
        Ok((module, callable))
    } else {
        Err(Error::InvalidAppPath(path.to_string()))
    }
}

/// Applications known to this process, keyed by `module:callable`.
#[derive(Default, Clone)]
pub struct AppRegistry {
    apps: HashMap<String, Arc<dyn Application>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `demo:*` applications.
    pub fn with_demos() -> Self {
        let mut registry = Self::new();
        registry.register("demo:hello", hello);
        registry.register("demo:echo", echo);
        registry.register("demo:environ", environ);
        registry
    }

    /// Register `app` under `path`, replacing any earlier registration.
    pub fn register(&mut self, path: &str, app: impl Application + 'static) {
        self.apps.insert(path.to_string(), Arc::new(app));
    }

    /// Resolve `path` to an application.
    pub fn resolve(&self, path: &str) -> Result<Arc<dyn Application>, Error> {
        let (module, callable) = split_app_path(path)?;
        self.apps
            .get(&format!("{module}:{callable}"))
            .cloned()
            .ok_or_else(|| Error::AppNotFound(path.to_string()))
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.apps.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

fn plain_response(start_response: &StartResponse, content_type: &str, body: Vec<u8>) -> Result<Box<dyn Body>, AppError> {
    start_response.start(
        StatusCode::Ok.status_line(),
        [
            ("Content-Type".to_string(), content_type.to_string()),
            ("Content-Length".to_string(), body.len().to_string()),
        ],
    )?;
    Ok(Box::new(Chunks::once(body)))
}

fn hello(_context: RequestContext, start_response: StartResponse) -> Result<Box<dyn Body>, AppError> {
    plain_response(&start_response, "text/plain", b"Hello, world!\n".to_vec())
}

fn echo(mut context: RequestContext, start_response: StartResponse) -> Result<Box<dyn Body>, AppError> {
    let content_type = context
        .get(keys::CONTENT_TYPE)
        .unwrap_or("application/octet-stream")
        .to_string();
    let mut body = Vec::with_capacity(context.input().len());
    context.input().read_to_end(&mut body)?;
    plain_response(&start_response, &content_type, body)
}

fn environ(context: RequestContext, start_response: StartResponse) -> Result<Box<dyn Body>, AppError> {
    let mut body = serde_json::to_vec_pretty(&context)?;
    body.push(b'\n');
    plain_response(&start_response, "application/json", body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_paths() {
        assert_eq!(split_app_path("demo:hello").unwrap(), ("demo", "hello"));
        assert_eq!(split_app_path("pkg.module").unwrap(), ("pkg.module", "application"));
        assert!(matches!(split_app_path("demo:"), Err(Error::InvalidAppPath(_))));
        assert!(matches!(split_app_path(":hello"), Err(Error::InvalidAppPath(_))));
        assert!(matches!(split_app_path("demo:he llo"), Err(Error::InvalidAppPath(_))));
        assert!(matches!(split_app_path("pkg..mod:app"), Err(Error::InvalidAppPath(_))));
    }

    #[test]
    fn resolves_registered_demos() {
        let registry = AppRegistry::with_demos();
        assert_eq!(registry.paths(), vec!["demo:echo", "demo:environ", "demo:hello"]);
        assert!(registry.resolve("demo:hello").is_ok());
        assert!(matches!(registry.resolve("demo:missing"), Err(Error::AppNotFound(ref p)) if p == "demo:missing"));
        assert!(matches!(registry.resolve("demo"), Err(Error::AppNotFound(_))));
    }

    #[test]
    fn bare_module_resolves_default_callable() {
        let mut registry = AppRegistry::new();
        registry.register("site:application", hello);
        assert!(registry.resolve("site").is_ok());
    }
}
