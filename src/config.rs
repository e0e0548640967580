//! Configuration types for a compliance audit.
//!
//! Everything a run needs is carried by [`AuditConfig`], built through
//! [`AuditConfigBuilder`]. Setting only the fields you care about and relying
//! on documented defaults for the rest keeps call sites short; `build()`
//! rejects combinations that cannot work before any network call is made.

use crate::error::AuditError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default model for the first audit pass.
pub const DEFAULT_PRIMARY_MODEL: &str = "gemini-2.5-pro";
/// Default model for the second audit pass.
pub const DEFAULT_SECONDARY_MODEL: &str = "gemini-2.5-flash";
/// Provider used when none is named and none can be detected.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Configuration for an audit run.
///
/// # Example
/// ```rust
/// use pdf_audit::AuditConfig;
///
/// let config = AuditConfig::builder()
///     .reference_document("rbi_master_circular.pdf")
///     .reference_document("gold_loan_policy.pdf")
///     .user_instructions("Focus on loan-to-value limits.")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AuditConfig {
    /// Model for the first pass. Default: `gemini-2.5-pro`.
    pub primary_model: String,

    /// Model for the second pass. Default: `gemini-2.5-flash`.
    ///
    /// Two models disagree on recall more than on precision, so the merge
    /// catches gaps either one alone would miss.
    pub secondary_model: String,

    /// Provider name (e.g. "gemini", "openai"). If None, and no pre-built
    /// providers are set, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed provider for the first pass. Takes precedence over
    /// `provider_name`.
    pub primary_provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed provider for the second pass.
    pub secondary_provider: Option<Arc<dyn LLMProvider>>,

    /// Regulatory reference PDFs the target is audited against.
    pub reference_documents: Vec<PathBuf>,

    /// Free-form instructions appended to the base audit prompt.
    pub user_instructions: Option<String>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens per model answer. Default: 8192.
    ///
    /// A long policy document can yield dozens of findings; a truncated
    /// answer is not valid JSON and fails the whole pass.
    pub max_tokens: usize,

    /// Retries on a failed model call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-attempt timeout for a model call, in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Attach rendered target pages as images. Default: true.
    pub attach_page_images: bool,

    /// Rendering DPI for attached page images. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Longest edge of an attached page image in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// User password for an encrypted target.
    pub password: Option<String>,

    /// Silence pdfium's stderr chatter during highlighting. Default: true.
    pub suppress_backend_diagnostics: bool,

    /// Issue both model calls at once instead of one after the other.
    /// Default: false.
    pub concurrent_models: bool,

    /// Receives progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            secondary_model: DEFAULT_SECONDARY_MODEL.to_string(),
            provider_name: None,
            primary_provider: None,
            secondary_provider: None,
            reference_documents: Vec::new(),
            user_instructions: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 300,
            attach_page_images: true,
            dpi: 150,
            max_rendered_pixels: 2000,
            password: None,
            suppress_backend_diagnostics: true,
            concurrent_models: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditConfig")
            .field("primary_model", &self.primary_model)
            .field("secondary_model", &self.secondary_model)
            .field("provider_name", &self.provider_name)
            .field(
                "primary_provider",
                &self.primary_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field(
                "secondary_provider",
                &self.secondary_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("reference_documents", &self.reference_documents)
            .field("user_instructions", &self.user_instructions)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("attach_page_images", &self.attach_page_images)
            .field("dpi", &self.dpi)
            .field("concurrent_models", &self.concurrent_models)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AuditConfig {
    /// Create a new builder for `AuditConfig`.
    pub fn builder() -> AuditConfigBuilder {
        AuditConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AuditConfig`].
#[derive(Debug)]
pub struct AuditConfigBuilder {
    config: AuditConfig,
}

impl AuditConfigBuilder {
    pub fn primary_model(mut self, model: impl Into<String>) -> Self {
        self.config.primary_model = model.into();
        self
    }

    pub fn secondary_model(mut self, model: impl Into<String>) -> Self {
        self.config.secondary_model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn primary_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.primary_provider = Some(provider);
        self
    }

    pub fn secondary_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.secondary_provider = Some(provider);
        self
    }

    pub fn reference_document(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.reference_documents.push(path.into());
        self
    }

    pub fn reference_documents<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.config
            .reference_documents
            .extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn user_instructions(mut self, text: impl Into<String>) -> Self {
        self.config.user_instructions = Some(text.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn attach_page_images(mut self, v: bool) -> Self {
        self.config.attach_page_images = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn suppress_backend_diagnostics(mut self, v: bool) -> Self {
        self.config.suppress_backend_diagnostics = v;
        self
    }

    pub fn concurrent_models(mut self, v: bool) -> Self {
        self.config.concurrent_models = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Reference documents are not required here: a highlight-only run
    /// (findings loaded from a file) needs none. [`crate::audit::run_llm_audit`]
    /// checks for them before calling a model.
    pub fn build(self) -> Result<AuditConfig, AuditError> {
        let c = &self.config;
        if c.primary_model.trim().is_empty() || c.secondary_model.trim().is_empty() {
            return Err(AuditError::InvalidConfig(
                "Model names must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(AuditError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(AuditError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
