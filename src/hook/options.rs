//! Names of the special hook parameters.

/// The parameter names that bind to something other than an original argument.
///
/// Every name can be overridden, e.g. to avoid clashing with an original parameter that is
/// literally called `__result`.
///
/// # Examples
///
/// ```rust
/// use dothook::hook::NamingOptions;
///
/// let options = NamingOptions::default().with_result("ret").with_field_prefix("f_");
/// assert_eq!(options.result, "ret");
/// assert_eq!(options.field_name("f_count"), Some("count"));
/// assert_eq!(options.field_name("f_"), None);
/// assert_eq!(options.instance, "__instance");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingOptions {
    /// Receiver of the original call, `null` for static routines
    pub instance: String,
    /// Prefix selecting a field of the declaring type
    pub field_prefix: String,
    /// The original routine as a `MethodBase`
    pub original_method: String,
    /// The return value slot
    pub result: String,
    /// Whether the original body runs (or ran)
    pub run_original: String,
    /// All arguments as an `object[]`
    pub args: String,
}

impl Default for NamingOptions {
    fn default() -> Self {
        NamingOptions {
            instance: "__instance".to_string(),
            field_prefix: "___".to_string(),
            original_method: "__originalMethod".to_string(),
            result: "__result".to_string(),
            run_original: "__runOriginal".to_string(),
            args: "__args".to_string(),
        }
    }
}

impl NamingOptions {
    /// Override the receiver name
    #[must_use]
    pub fn with_instance(mut self, name: &str) -> Self {
        self.instance = name.to_string();
        self
    }

    /// Override the field prefix
    #[must_use]
    pub fn with_field_prefix(mut self, prefix: &str) -> Self {
        self.field_prefix = prefix.to_string();
        self
    }

    /// Override the original method name
    #[must_use]
    pub fn with_original_method(mut self, name: &str) -> Self {
        self.original_method = name.to_string();
        self
    }

    /// Override the result name
    #[must_use]
    pub fn with_result(mut self, name: &str) -> Self {
        self.result = name.to_string();
        self
    }

    /// Override the run-original name
    #[must_use]
    pub fn with_run_original(mut self, name: &str) -> Self {
        self.run_original = name.to_string();
        self
    }

    /// Override the argument array name
    #[must_use]
    pub fn with_args(mut self, name: &str) -> Self {
        self.args = name.to_string();
        self
    }

    /// The field a parameter refers to, if it carries the field prefix
    #[must_use]
    pub fn field_name<'a>(&self, parameter: &'a str) -> Option<&'a str> {
        parameter
            .strip_prefix(self.field_prefix.as_str())
            .filter(|name| !name.is_empty())
    }
}
