use crate::error::{HarnessError, Result};
use crate::registry::TestRegistry;
use crate::unit::{CommandSpec, CommandUnit};
use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 指定临时目录的环境变量；日志位于其下的 `logs/`
pub const TEMP_DIR_ENV: &str = "FUNCTEST_TEMP_DIR";

/// `functest.toml` 的内容
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// 日志目录（可被 --log-dir 覆盖）
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 日志文件写缓冲大小
    #[serde(default = "default_log_buffer")]
    pub log_buffer: usize,

    /// 单个测试超时（秒）
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// 失败后是否继续运行后续测试
    #[serde(default = "default_continue_on_failure")]
    pub continue_on_failure: bool,

    #[serde(default)]
    pub tests: Vec<CommandSpec>,

    /// 配置文件所在目录，用于解析相对路径
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_log_buffer() -> usize {
    1024
}

fn default_continue_on_failure() -> bool {
    true
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            log_buffer: default_log_buffer(),
            timeout_secs: None,
            continue_on_failure: default_continue_on_failure(),
            tests: Vec::new(),
            base_dir: None,
        }
    }
}

impl HarnessConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Build the registry: one [`CommandUnit`] per `[[tests]]` entry, in file
    /// order. Duplicate names are an error.
    pub fn build_registry(&self) -> Result<TestRegistry> {
        let mut builder = TestRegistry::builder();

        for spec in &self.tests {
            let mut spec = spec.clone();
            spec.cwd = spec.cwd.map(|cwd| self.resolve_relative(cwd));

            let name = spec.name.clone();
            builder = builder.register(name, move || CommandUnit::new(spec.clone()))?;
        }

        Ok(builder.build())
    }

    fn resolve_relative(&self, path: PathBuf) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

/// 配置文件加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 配置文件名
    const CONFIG_FILE: &'static str = "functest.toml";

    /// 从指定路径加载配置文件
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<HarnessConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            HarnessError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config: HarnessConfig = toml::from_str(&content)?;
        if config.timeout_secs == Some(0) {
            return Err(HarnessError::ConfigError(format!(
                "{}: timeout_secs must be at least 1",
                path.display()
            )));
        }
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// 查找并加载配置文件
    /// 查找顺序：
    /// 1. 当前目录及其父目录
    /// 2. 用户配置目录 ~/.config/functest/
    pub fn find_and_load() -> Result<Option<HarnessConfig>> {
        match Self::find() {
            Some(path) => Self::load_from_path(path).map(Some),
            None => Ok(None),
        }
    }

    /// 查找配置文件路径
    pub fn find() -> Option<PathBuf> {
        Self::find_in_ancestors().or_else(Self::find_in_user_dir)
    }

    fn find_in_ancestors() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            let config_path = current.join(Self::CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            // 尝试父目录
            if !current.pop() {
                break;
            }
        }

        None
    }

    fn find_in_user_dir() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let config_path = home.join(".config").join("functest").join(Self::CONFIG_FILE);

        config_path.exists().then_some(config_path)
    }
}

/// Pick the log directory.
///
/// Precedence: command line, then config file, then `$FUNCTEST_TEMP_DIR/logs`.
/// Having none of them is a setup error.
pub fn resolve_log_dir(
    cli: Option<&Path>,
    config: &HarnessConfig,
    temp_dir: Option<OsString>,
) -> Result<PathBuf> {
    if let Some(dir) = cli {
        return Ok(dir.to_path_buf());
    }

    if let Some(dir) = &config.log_dir {
        return Ok(config.resolve_relative(dir.clone()));
    }

    match temp_dir {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir).join("logs")),
        _ => Err(HarnessError::Environment(format!(
            "no log directory configured. Make sure {} is set",
            TEMP_DIR_ENV
        ))),
    }
}

/// [`resolve_log_dir`] reading the temp dir from the environment.
pub fn log_dir_from_env(cli: Option<&Path>, config: &HarnessConfig) -> Result<PathBuf> {
    resolve_log_dir(cli, config, std::env::var_os(TEMP_DIR_ENV))
}
