use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db_error::{Error, Result};

/// 配置文件的顶层表 `[config]`
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigWrapper {
    #[serde(default)]
    pub config: Config,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    // 环形窗口的行数 H，只对新建的窗口生效
    pub viewport_height: usize,

    // 游标空闲多久后关闭 单位：毫秒
    pub cursor_idle_ms: u64,

    // 自动刷新间隔 单位：毫秒
    pub refresh_ms: u64,

    // 无长度上限的文本/二进制列在键比较中的字节数
    pub text_size_fallback: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self { viewport_height: 24, cursor_idle_ms: 100, refresh_ms: 300, text_size_fallback: 1024 * 1024 }
    }
}

pub struct ConfigBuilder {
    pub inner: Config,
}

impl ConfigBuilder {
    pub fn viewport_height(mut self, rows: usize) -> Self {
        self.inner.viewport_height = rows;
        self
    }
    pub fn cursor_idle_ms(mut self, ms: u64) -> Self {
        self.inner.cursor_idle_ms = ms;
        self
    }
    pub fn refresh_ms(mut self, ms: u64) -> Self {
        self.inner.refresh_ms = ms;
        self
    }
    pub fn text_size_fallback(mut self, bytes: u64) -> Self {
        self.inner.text_size_fallback = bytes;
        self
    }

    fn validate(&self) -> Result<()> {
        self.inner.validate()
    }

    pub fn build(self) -> Result<Config> {
        self.validate()?;
        Ok(self.inner)
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder { inner: Config::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.viewport_height == 0 {
            return Err(Error::ConfigError("viewport_height must be at least 1".to_string()));
        }
        if self.cursor_idle_ms == 0 || self.refresh_ms == 0 {
            return Err(Error::ConfigError("timer intervals must be positive".to_string()));
        }
        if self.text_size_fallback == 0 {
            return Err(Error::ConfigError("text_size_fallback must be positive".to_string()));
        }
        Ok(())
    }

    pub fn cursor_idle(&self) -> Duration {
        Duration::from_millis(self.cursor_idle_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    pub fn from_str_toml(content: &str) -> Result<Config> {
        let wrapper: ConfigWrapper = toml::from_str(content)?;
        wrapper.config.validate()?;
        Ok(wrapper.config)
    }

    pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
        // 1、读取配置文件
        let content = std::fs::read_to_string(path)?;
        // 2、解析并校验
        Self::from_str_toml(&content)
    }
}
