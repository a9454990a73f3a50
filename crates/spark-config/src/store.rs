//! 分层配置存储。
//!
//! # 教案式说明
//! - **意图（Why）**：把多个 INI 文件按加载顺序合并成一张 `(section, key) -> value` 表，
//!   对外提供点查、按 section 查询、全量有序导出，以及带写回与通知的运行期修改；
//! - **逻辑（How）**：
//!   - 合并表采用 [`BTreeMap`]，全量导出天然按 `(section, key)` 字典序排列；
//!   - 加载时逐个文件解析，解析过程中的删除指令立即作用于已合并的表，
//!     随后再把该文件累积的条目写入，后加载的文件覆盖先加载的；
//!   - `set`/`delete` 先更新内存，再按需写回最后一个文件，最后同步通知观察者；
//! - **契约（What）**：
//!   - 存储没有内部锁，调用方需保证单一所有者串行访问（参见 [`crate::service`]）；
//!   - 写回文件恒为加载列表中的最后一个路径，列表为空时不写回；
//!   - 观察者失败时内存与文件中的修改已经生效，错误仅用于结束本次调用。

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info};

use crate::{
    builder::ConfigStoreBuilder,
    entry::{ConfigEntry, EntryKey},
    error::ConfigError,
    ini::{parser, writer::PersistenceWriter},
    notify::{ChangeEvent, ChangeListener, ChangeNotifier, Subscription},
    value::{self, ConfigValueType},
};

/// 合并后的配置表及其写回、通知设施。
pub struct ConfigStore {
    values: BTreeMap<EntryKey, String>,
    files: Vec<PathBuf>,
    writer: Box<dyn PersistenceWriter>,
    notifier: ChangeNotifier,
}

impl ConfigStore {
    /// 返回构建器，用于指定文件列表与写回器。
    pub fn builder() -> ConfigStoreBuilder {
        ConfigStoreBuilder::new()
    }

    /// 以默认的 INI 写回器加载有序文件列表。
    ///
    /// 任一文件缺失时返回 [`ConfigError::NotFound`]，调用方不应继续提供服务。
    pub fn load<I, P>(files: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        ConfigStoreBuilder::new().with_files(files).build()
    }

    pub(crate) fn from_parts(
        files: Vec<PathBuf>,
        writer: Box<dyn PersistenceWriter>,
    ) -> Result<Self, ConfigError> {
        let values = read_layers(&files)?;
        Ok(Self {
            values,
            files,
            writer,
            notifier: ChangeNotifier::new(),
        })
    }

    /// 加载时使用的文件列表，按加载顺序排列。
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// 写回目标：加载列表中的最后一个文件。
    pub fn write_back_file(&self) -> Option<&Path> {
        self.files.last().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 点查。
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.values
            .get(&EntryKey::new(section, key))
            .map(String::as_str)
    }

    /// 点查，缺失时返回 `default`。
    pub fn get_or(&self, section: &str, key: &str, default: &str) -> String {
        self.get(section, key).unwrap_or(default).to_owned()
    }

    /// 返回某个 section 下的全部 `(key, value)`。
    ///
    /// 调用方不应依赖返回顺序；当前实现恰好按 key 排序。
    pub fn get_section(&self, section: &str) -> Vec<(String, String)> {
        self.values
            .range(EntryKey::new(section, "")..)
            .take_while(|(identity, _)| identity.section == section)
            .map(|(identity, value)| (identity.key.clone(), value.clone()))
            .collect()
    }

    /// 全量导出，按 `(section, key)` 字典序排列。
    ///
    /// 该顺序是对外承诺的契约，运维工具据此做 diff 与展示。
    pub fn list_all(&self) -> Vec<ConfigEntry> {
        self.values
            .iter()
            .map(|(identity, value)| {
                ConfigEntry::new(identity.section.as_str(), identity.key.as_str(), value.as_str())
            })
            .collect()
    }

    /// 以 JSON 数组形式导出全量配置，顺序与 [`list_all`](Self::list_all) 一致。
    #[cfg(feature = "std_json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.list_all())
    }

    /// 按类型解释某个值；缺失时返回 `Ok(None)`。
    pub fn get_typed<T>(&self, section: &str, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: ConfigValueType,
    {
        let Some(text) = self.get(section, key) else {
            return Ok(None);
        };
        T::parse(text)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                section: section.to_owned(),
                key: key.to_owned(),
                value: text.to_owned(),
                expected: T::EXPECTED,
            })
    }

    pub fn get_integer(&self, section: &str, key: &str, default: i64) -> Result<i64, ConfigError> {
        Ok(self.get_typed(section, key)?.unwrap_or(default))
    }

    pub fn get_float(&self, section: &str, key: &str, default: f64) -> Result<f64, ConfigError> {
        Ok(self.get_typed(section, key)?.unwrap_or(default))
    }

    pub fn get_boolean(
        &self,
        section: &str,
        key: &str,
        default: bool,
    ) -> Result<bool, ConfigError> {
        Ok(self.get_typed(section, key)?.unwrap_or(default))
    }

    /// 逗号分隔列表；缺失时返回空列表。
    pub fn get_list(&self, section: &str, key: &str) -> Vec<String> {
        self.get(section, key).map(value::parse_list).unwrap_or_default()
    }

    /// 写入或覆盖一个条目。
    ///
    /// # 教案式说明
    /// - **契约（What）**：
    ///   - 需要写回时先由写回器校验条目，被拒绝（[`ConfigError::Unpersistable`]）则内存保持不变；
    ///   - 通过校验后内存中的值先被更新；
    ///   - `persist` 为真且存在写回文件时，调用写回器落盘；
    ///   - 无论是否写回，都会同步通知观察者 `(section, key, value, persist)`，
    ///     所有观察者处理完毕后本方法才返回。
    /// - **风险（Trade-offs）**：写回失败时通知不会发出，但内存已经是新值。
    pub fn set(
        &mut self,
        section: &str,
        key: &str,
        value: &str,
        persist: bool,
    ) -> Result<(), ConfigError> {
        if persist {
            self.validate_write_back(section, key, Some(value))?;
        }
        self.values
            .insert(EntryKey::new(section, key), value.to_owned());
        if persist {
            self.persist(section, key, Some(value))?;
        }
        debug!(section, key, value, persist, "configuration entry set");
        self.notifier
            .notify(&ChangeEvent::updated(section, key, value, persist))
    }

    /// 删除一个条目。
    ///
    /// 键不存在时返回 [`ConfigError::MissingKey`]：这是调用方违反前置条件，而非空操作。
    /// 写回与通知语义同 [`set`](Self::set)，事件值替换为删除标记。
    pub fn delete(&mut self, section: &str, key: &str, persist: bool) -> Result<(), ConfigError> {
        let identity = EntryKey::new(section, key);
        if !self.values.contains_key(&identity) {
            return Err(ConfigError::MissingKey {
                section: section.to_owned(),
                key: key.to_owned(),
            });
        }
        if persist {
            self.validate_write_back(section, key, None)?;
        }
        self.values.remove(&identity);
        if persist {
            self.persist(section, key, None)?;
        }
        debug!(section, key, persist, "configuration entry deleted");
        self.notifier
            .notify(&ChangeEvent::deleted(section, key, persist))
    }

    /// 注册观察者；返回的句柄被丢弃后订阅自动失效。
    pub fn register(&mut self, listener: Arc<dyn ChangeListener>) -> Subscription {
        self.notifier.register(listener)
    }

    /// 当前有效的观察者数量。
    pub fn listener_count(&self) -> usize {
        self.notifier.len()
    }

    /// 按原文件列表重新加载，完全替换内存中的表。
    ///
    /// 重新加载不产生变更事件；任一文件读取失败时保留旧表。
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        self.values = read_layers(&self.files)?;
        info!(
            files = self.files.len(),
            entries = self.values.len(),
            "configuration reloaded"
        );
        Ok(())
    }

    fn validate_write_back(
        &self,
        section: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), ConfigError> {
        match self.files.last() {
            Some(_) => self.writer.validate(section, key, value),
            None => Ok(()),
        }
    }

    fn persist(&self, section: &str, key: &str, value: Option<&str>) -> Result<(), ConfigError> {
        match self.files.last() {
            Some(file) => self.writer.save(section, key, value, file),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("entries", &self.values.len())
            .field("files", &self.files)
            .field("notifier", &self.notifier)
            .finish()
    }
}

/// 按顺序读取并合并所有文件。
fn read_layers(files: &[PathBuf]) -> Result<BTreeMap<EntryKey, String>, ConfigError> {
    let mut values = BTreeMap::new();
    for path in files {
        let entries = parser::parse_file(path, |section, key| {
            values.remove(&EntryKey::new(section, key));
        })?;
        let count = entries.len();
        values.extend(entries.into_iter().map(ConfigEntry::into_parts));
        info!(path = %path.display(), entries = count, "loaded configuration file");
    }
    Ok(values)
}
