use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("未知测试: {0}")]
    UnknownTest(String),

    #[error("重复注册的测试: {0}")]
    DuplicateTest(String),

    #[error("无效的测试名称: {0:?}")]
    InvalidTestName(String),

    #[error("环境配置错误: {0}")]
    Environment(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML 解析错误: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

// Add conversion from anyhow::Error
impl From<anyhow::Error> for HarnessError {
    fn from(err: anyhow::Error) -> Self {
        HarnessError::Other(err.to_string())
    }
}

/// Result type for functest crate
pub type Result<T> = std::result::Result<T, HarnessError>;
