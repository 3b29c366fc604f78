//! REST route signatures
//!
//! A route pairs an HTTP method with a path template. The template keeps its
//! `{placeholder}` segments so that requests differing only in placeholder
//! values share a rate-limit bucket.

pub use reqwest::Method;

/// A REST route: method plus path template with placeholder segments
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    template: &'static str,
    path: String,
}

impl Route {
    /// Create a route from a method and a path template
    ///
    /// The template may contain `{name}` placeholders, filled in with
    /// [`Route::param`].
    #[must_use]
    pub fn new(method: Method, template: &'static str) -> Self {
        Self {
            method,
            template,
            path: template.to_string(),
        }
    }

    /// Substitute a placeholder with a concrete value
    ///
    /// Values are expected to be path-safe identifiers (IDs, tokens); they are
    /// inserted verbatim.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl std::fmt::Display) -> Self {
        let placeholder = format!("{{{name}}}");
        self.path = self.path.replace(&placeholder, &value.to_string());
        self
    }

    /// HTTP method
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Concrete request path with placeholders substituted
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path template as written, placeholders intact
    #[must_use]
    pub const fn template(&self) -> &'static str {
        self.template
    }

    /// Rate-limit bucket signature
    ///
    /// Keyed on the template rather than the concrete path, so all requests
    /// on the same template land in the same bucket.
    #[must_use]
    pub fn bucket_key(&self) -> String {
        format!("{} {}", self.method, self.template)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}
