//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为配置存储对外暴露的错误语义提供集中定义：启动期文件缺失、运行期前置条件违背、
//!   观察者回调失败、无法原样写回的条目以及服务停止后的访问；
//! - 解析阶段的畸形行（缺失右括号、以 `=` 开头等）**不会**进入本模块，它们按约定被静默忽略。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，与 `std::error::Error` 生态兼容；
//! - 通过 [`ConfigError::kind`] 暴露稳定的类别枚举，便于上层做告警维度与重试决策。

use std::{io, path::PathBuf};

use thiserror::Error;

/// 配置存储的统一错误类型。
///
/// # 教案式说明
/// - **意图 (Why)**：将文件读取、键值前置条件、类型解释与通知投递的失败映射为稳定枚举；
/// - **契约 (What)**：
///   - 所有变体均满足 `Send + Sync + 'static`，可以跨越服务线程边界返回给调用方；
///   - `NotFound` 携带解析后的路径，启动阶段遇到该错误时进程不得继续提供服务；
///   - `MissingKey` 表示删除不存在的键，属于调用方违反前置条件，而非“无操作”。
/// - **设计权衡 (Trade-offs)**：上下文使用 `String` 保存，牺牲少量分配换取可读的诊断信息。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// 配置文件不存在。
    #[error("configuration file `{}` not found", path.display())]
    NotFound { path: PathBuf },

    /// 读取或写回配置文件时出现的其它 IO 错误。
    #[error("i/o failure on configuration file `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 删除不存在的键。
    #[error("configuration key `{section}.{key}` does not exist")]
    MissingKey { section: String, key: String },

    /// 存储的文本无法按调用方期望的类型解释。
    #[error("configuration value `{section}.{key}` = `{value}` is not a valid {expected}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        expected: &'static str,
    },

    /// 观察者处理变更事件失败；进行中的 `set`/`delete` 以该错误结束。
    #[error("change listener failed: {detail}")]
    Listener { detail: String },

    /// 条目写成 INI 行后无法被原样读回，拒绝写回；内存中的值保持不变。
    #[error("configuration entry `{section}.{key}` cannot be written back: {reason}")]
    Unpersistable {
        section: String,
        key: String,
        reason: &'static str,
    },

    /// 服务已停止（或尚未启动），拒绝处理请求。
    #[error("configuration service is not running")]
    Stopped,

    /// 无法创建服务线程。
    #[error("failed to start configuration service thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
}

impl ConfigError {
    /// 将 `io::Error` 映射为带路径的配置错误，`NotFound` 被单独提取为稳定类别。
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// 构造观察者失败错误，供闭包型监听器直接返回。
    pub fn listener<D>(detail: D) -> Self
    where
        D: Into<String>,
    {
        Self::Listener {
            detail: detail.into(),
        }
    }

    /// 返回错误类别。
    pub fn kind(&self) -> ConfigErrorKind {
        match self {
            Self::NotFound { .. } => ConfigErrorKind::NotFound,
            Self::Io { .. } => ConfigErrorKind::Io,
            Self::MissingKey { .. } => ConfigErrorKind::MissingKey,
            Self::InvalidValue { .. } => ConfigErrorKind::InvalidValue,
            Self::Listener { .. } => ConfigErrorKind::Listener,
            Self::Unpersistable { .. } => ConfigErrorKind::Unpersistable,
            Self::Stopped => ConfigErrorKind::Stopped,
            Self::Spawn { .. } => ConfigErrorKind::Spawn,
        }
    }
}

/// 辅助枚举，用于在不匹配具体字段的情况下判断错误类别。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    NotFound,
    Io,
    MissingKey,
    InvalidValue,
    Listener,
    Unpersistable,
    Stopped,
    Spawn,
}

impl ConfigErrorKind {
    /// 返回稳定的字符串表示，可直接用作指标标签。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Io => "io",
            Self::MissingKey => "missing_key",
            Self::InvalidValue => "invalid_value",
            Self::Listener => "listener",
            Self::Unpersistable => "unpersistable",
            Self::Stopped => "stopped",
            Self::Spawn => "spawn",
        }
    }
}

impl std::fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const _: fn() = || {
    fn assert_error_traits<T: std::error::Error + Send + Sync + 'static>() {}

    assert_error_traits::<ConfigError>();
};
