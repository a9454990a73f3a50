//! 存储装配入口。
//!
//! # 教案式说明
//! - **意图（Why）**：宿主进程在启动时决定加载哪些文件、写回到哪里；
//!   Builder 把这些决定集中到一处，避免调用方直接拼装 [`ConfigStore`] 的内部字段；
//! - **契约（What）**：
//!   - 文件按注册顺序加载，后注册的覆盖先注册的，最后一个同时是写回目标；
//!   - 未指定写回器时使用 [`IniFileWriter`]；
//!   - 文件列表也可以来自环境变量 [`FILES_ENV_VAR`]，以平台路径分隔符分隔
//!     （Unix 为 `:`，Windows 为 `;`）。

use std::{
    env,
    ffi::OsStr,
    path::{Path, PathBuf},
};

use crate::{
    error::ConfigError,
    ini::writer::{IniFileWriter, PersistenceWriter},
    store::ConfigStore,
};

/// 存放有序文件列表的环境变量名。
pub const FILES_ENV_VAR: &str = "SPARK_CONFIG_FILES";

/// [`ConfigStore`] 构建器。
#[derive(Default)]
pub struct ConfigStoreBuilder {
    files: Vec<PathBuf>,
    writer: Option<Box<dyn PersistenceWriter>>,
}

impl ConfigStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 [`FILES_ENV_VAR`] 中的路径列表初始化；变量未设置时列表为空。
    pub fn from_env() -> Self {
        match env::var_os(FILES_ENV_VAR) {
            Some(list) => Self::from_path_list(&list),
            None => Self::new(),
        }
    }

    /// 解析以平台路径分隔符分隔的路径列表，空段被忽略。
    pub fn from_path_list(list: &OsStr) -> Self {
        Self::new().with_files(env::split_paths(list).filter(|path| !path.as_os_str().is_empty()))
    }

    /// 追加一个文件。
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// 按顺序追加多个文件。
    pub fn with_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files.extend(files.into_iter().map(Into::into));
        self
    }

    /// 替换写回器，例如只读部署可传入 [`NoopWriter`](crate::NoopWriter)。
    pub fn with_writer<W>(mut self, writer: W) -> Self
    where
        W: PersistenceWriter + 'static,
    {
        self.writer = Some(Box::new(writer));
        self
    }

    /// 当前登记的文件列表。
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// 写回目标：最后登记的文件。
    pub fn write_back_file(&self) -> Option<&Path> {
        self.files.last().map(PathBuf::as_path)
    }

    /// 加载所有文件并返回存储。
    ///
    /// 任一文件缺失即返回 [`ConfigError::NotFound`]，错误中带有该文件路径。
    pub fn build(self) -> Result<ConfigStore, ConfigError> {
        let writer = self
            .writer
            .unwrap_or_else(|| Box::new(IniFileWriter) as Box<dyn PersistenceWriter>);
        ConfigStore::from_parts(self.files, writer)
    }
}

impl std::fmt::Debug for ConfigStoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStoreBuilder")
            .field("files", &self.files)
            .field("custom_writer", &self.writer.is_some())
            .finish()
    }
}
