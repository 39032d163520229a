//! Configuration for repository dispatch and method-name parsing
//!
//! Provides a builder pattern for configuring the parser and dispatcher.

/// Default marker that opens a derived-query method name
pub const DEFAULT_QUERY_PREFIX: &str = "findBy";

/// Configuration for method-name parsing and repository dispatch
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Prefixes that mark a method as a derived query (default: `["findBy"]`)
    pub query_prefixes: Vec<String>,
    /// Reject trailing arguments that are neither `Sort` nor `Pagination`
    /// instead of logging and ignoring them (default: false)
    pub strict_trailing_arguments: bool,
    /// Reject query methods whose decoded fields are not declared in the
    /// entity metadata (default: true; no effect when metadata declares no fields)
    pub validate_fields: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig::builder().build()
    }
}

impl RepositoryConfig {
    /// Create a new configuration builder
    pub fn builder() -> RepositoryConfigBuilder {
        RepositoryConfigBuilder::new()
    }

    /// Returns the remainder of `method` after the first matching query prefix
    pub fn strip_query_prefix<'a>(&self, method: &'a str) -> Option<&'a str> {
        self.query_prefixes
            .iter()
            .find_map(|prefix| method.strip_prefix(prefix.as_str()))
    }
}

/// Builder for RepositoryConfig
#[derive(Debug)]
pub struct RepositoryConfigBuilder {
    query_prefixes: Vec<String>,
    strict_trailing_arguments: bool,
    validate_fields: bool,
}

impl RepositoryConfigBuilder {
    /// Create a new builder with the default `findBy` prefix
    pub fn new() -> Self {
        Self {
            query_prefixes: Vec::new(),
            strict_trailing_arguments: false,
            validate_fields: true,
        }
    }

    /// Add a query prefix; the first call replaces the default `findBy`
    pub fn query_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.query_prefixes.push(prefix.into());
        self
    }

    /// Enable or disable strict trailing argument handling (default: false)
    pub fn strict_trailing_arguments(mut self, enabled: bool) -> Self {
        self.strict_trailing_arguments = enabled;
        self
    }

    /// Enable or disable registration-time field validation (default: true)
    pub fn validate_fields(mut self, enabled: bool) -> Self {
        self.validate_fields = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> RepositoryConfig {
        let mut query_prefixes = self.query_prefixes;
        if query_prefixes.is_empty() {
            query_prefixes.push(DEFAULT_QUERY_PREFIX.to_string());
        }
        // Longest prefix wins when several match
        query_prefixes.sort_by(|a, b| b.len().cmp(&a.len()));

        RepositoryConfig {
            query_prefixes,
            strict_trailing_arguments: self.strict_trailing_arguments,
            validate_fields: self.validate_fields,
        }
    }
}

impl Default for RepositoryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
