use crate::cli::VerbosityLevel;
use crate::error::{ConfigError, ValidationError};

/// Error reporter with configurable verbosity
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
    show_timestamps: bool,
}

impl ErrorReporter {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_timestamps: false,
        }
    }

    pub fn with_timestamps(verbosity: VerbosityLevel, show_timestamps: bool) -> Self {
        Self {
            verbosity,
            show_timestamps,
        }
    }

    /// Report a validation error with appropriate verbosity
    pub fn report_validation_error(&self, error: &ValidationError) {
        if let Some(formatted) = self.format_validation_error(error) {
            eprintln!("{}", formatted);
        }
    }

    /// Report a configuration error
    pub fn report_config_error(&self, error: &ConfigError) {
        eprintln!("{}", self.format_config_error(error));
    }

    /// `None` when nothing should be printed
    pub fn format_validation_error(&self, error: &ValidationError) -> Option<String> {
        if error.is_cancelled() {
            return None;
        }
        match self.verbosity {
            VerbosityLevel::Quiet => self
                .is_critical_error(error)
                .then(|| self.format_error_brief(error)),
            VerbosityLevel::Normal => Some(self.format_error_normal(error)),
            VerbosityLevel::Verbose => Some(self.format_error_verbose(error)),
            VerbosityLevel::Debug => Some(self.format_error_debug(error)),
        }
    }

    pub fn format_config_error(&self, error: &ConfigError) -> String {
        match self.verbosity {
            VerbosityLevel::Quiet => format!("Config error: {}", error),
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                format!(
                    "Configuration Error: {}\n{}",
                    error,
                    self.get_config_help(error)
                )
            }
            VerbosityLevel::Debug => {
                format!(
                    "Configuration Error: {}\nDebug: {:?}\n{}",
                    error,
                    error,
                    self.get_config_help(error)
                )
            }
        }
    }

    /// Errors that stop the run, as opposed to a single failed kind
    fn is_critical_error(&self, error: &ValidationError) -> bool {
        matches!(
            error,
            ValidationError::Config(_)
                | ValidationError::Io(_)
                | ValidationError::InvalidFileExtension { .. }
        )
    }

    fn format_error_brief(&self, error: &ValidationError) -> String {
        match error {
            ValidationError::InvalidFileExtension { path, .. } => {
                format!("NOT XML: {}", path.display())
            }
            _ => format!("ERROR: {}", error),
        }
    }

    fn format_error_normal(&self, error: &ValidationError) -> String {
        let timestamp = if self.show_timestamps {
            format!("[{}] ", chrono::Utc::now().format("%H:%M:%S"))
        } else {
            String::new()
        };

        format!("{}{}", timestamp, error)
    }

    fn format_error_verbose(&self, error: &ValidationError) -> String {
        let mut output = self.format_error_normal(error);

        match error {
            ValidationError::Http(_) | ValidationError::Timeout { .. } => {
                output.push_str(
                    "\nSuggestion: Check network connectivity and the --base-url setting",
                );
            }
            ValidationError::HttpStatus { url, status } if *status >= 500 => {
                output.push_str(&format!(
                    "\nSuggestion: The validation service at {} is failing; try again later",
                    url
                ));
            }
            ValidationError::InvalidResponse { url, .. } => {
                output.push_str(&format!(
                    "\nSuggestion: Verify that {} is a JATS validation service",
                    url
                ));
            }
            ValidationError::ServiceReported { .. } => {
                output.push_str("\nSuggestion: Check that the document is well-formed XML");
            }
            ValidationError::InvalidFileExtension { .. } => {
                output.push_str("\nSuggestion: Only .xml files can be loaded");
            }
            _ => {}
        }

        output
    }

    fn format_error_debug(&self, error: &ValidationError) -> String {
        let mut output = self.format_error_verbose(error);
        output.push_str(&format!("\nDebug Info: {:?}", error));

        output.push_str("\nError Chain:");
        let mut current_error: &dyn std::error::Error = error;
        let mut level = 0;
        while let Some(source) = current_error.source() {
            output.push_str(&format!("\n  {}: {}", level + 1, source));
            current_error = source;
            level += 1;
        }

        output
    }

    fn get_config_help(&self, error: &ConfigError) -> String {
        match error {
            ConfigError::Io(_) => "Check that the configuration file exists and is readable".to_string(),
            ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
                "Check the configuration file syntax (TOML/JSON format expected)".to_string()
            }
            ConfigError::Validation(_) => {
                "Fix the reported value in the configuration file, environment or command line"
                    .to_string()
            }
            ConfigError::Environment(_) => {
                "Fix or unset the JATS_VALIDATOR_* environment variable".to_string()
            }
            ConfigError::UnsupportedFormat(_) => {
                "Use a .toml or .json configuration file".to_string()
            }
        }
    }
}
