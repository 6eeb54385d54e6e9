use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("invalid stack configuration: {0}")]
    Config(String),

    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("server '{host}' references unknown config scope '{scope}'")]
    UnknownScope { host: String, scope: String },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StackError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        StackError::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
