use http::Method;
use std::fmt::Display;
use std::slice;
use std::sync::Arc;

use crate::error::{PatternError, Reason, UrlForError};
use crate::params::Params;
use crate::pattern::Pattern;

/// A single (method, pattern, handler) registration.
///
#[derive(Debug)]
pub struct Route<T> {
    method: Method,
    pattern: Pattern,
    name: Option<Arc<str>>,
    handler: T,
}

/// The outcome of [`Router::resolve`].
///
#[derive(Debug)]
pub enum Resolved<'a, T> {
    /// The first route registered for the method that matches the path.
    Found(&'a Route<T>, Params),

    /// The path matches one or more routes, none of which accept the method.
    /// Contains the methods that would have been accepted in registration
    /// order.
    MethodNotAllowed(Vec<Method>),

    /// No route matches the path under any method.
    NotFound,
}

/// An ordered list of routes.
///
/// Routes are tried in the order they were added. When two patterns match
/// the same path, the one that was registered first wins.
///
#[derive(Debug)]
pub struct Router<T> {
    routes: Vec<Route<T>>,
}

impl<T> Route<T> {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn handler(&self) -> &T {
        &self.handler
    }
}

impl<T> Router<T> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Compiles `pattern` and appends a route for `method` to the end of the
    /// route list.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is malformed or if a route with the
    /// same method and pattern already exists.
    ///
    pub fn add(
        &mut self,
        method: Method,
        pattern: &str,
        name: Option<&str>,
        handler: T,
    ) -> Result<&Route<T>, PatternError> {
        let compiled = Pattern::compile(pattern)?;

        if self
            .routes
            .iter()
            .any(|route| route.method == method && route.pattern.as_str() == pattern)
        {
            let reason = Reason::DuplicateRoute(method);
            return Err(PatternError::new(pattern, reason));
        }

        let index = self.routes.len();

        self.routes.push(Route {
            method,
            pattern: compiled,
            name: name.map(Arc::from),
            handler,
        });

        Ok(&self.routes[index])
    }

    /// Returns the first route registered for `method` whose pattern matches
    /// `path`.
    ///
    pub fn resolve(&self, method: &Method, path: &str) -> Resolved<'_, T> {
        let mut allowed = Vec::new();

        for route in &self.routes {
            if route.method == *method {
                if let Some(params) = route.pattern.matches(path) {
                    return Resolved::Found(route, params);
                }
            } else if !allowed.contains(&route.method) && route.pattern.matches(path).is_some() {
                allowed.push(route.method.clone());
            }
        }

        if allowed.is_empty() {
            Resolved::NotFound
        } else {
            Resolved::MethodNotAllowed(allowed)
        }
    }

    /// Builds the path of the first route registered under `name`.
    ///
    /// Parameter values are formatted with `Display` and are not validated
    /// against the parameter's converter. Values for names that the pattern
    /// does not declare are ignored.
    ///
    pub fn url_for<I, K, V>(&self, name: &str, params: I) -> Result<String, UrlForError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Display,
    {
        let Some(route) = self.routes.iter().find(|route| route.name() == Some(name)) else {
            return Err(UrlForError::RouteNotFound(name.to_owned()));
        };

        let values: Vec<(K, String)> = params
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();

        route
            .pattern
            .expand(|param| {
                values
                    .iter()
                    .find(|(key, _)| key.as_ref() == param)
                    .map(|(_, value)| value.clone())
            })
            .map_err(|param| UrlForError::ParamMismatch {
                route: name.to_owned(),
                param: param.to_owned(),
            })
    }

    pub fn iter(&self) -> slice::Iter<'_, Route<T>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}
