#![deny(unsafe_code)]

//! # spark-config
//!
//! ## 定位与职责（Why）
//! - 进程级、可变的配置存储：启动时按顺序加载一个或多个 INI 文件并分层合并，
//!   运行期回答 `(section, key)` 查询、接受修改、可选地写回最后一个文件，并把变更同步广播给观察者；
//! - 宿主进程借此在不重启的情况下调整运行参数。
//!
//! ## 架构嵌入（Where）
//! - [`ini`]：INI 解析器与写回器；
//! - [`store`]：分层合并后的配置表，提供查询、修改与重新加载；
//! - [`notify`]：观察者注册与同步投递；
//! - [`service`]：以专用线程独占存储的串行服务与生命周期管理；
//! - [`builder`]、[`value`]、[`error`]：装配入口、类型化解释与统一错误。
//!
//! ## 使用路线图（How）
//! 1. 使用 [`ConfigStoreBuilder`] 登记文件（或从环境变量 [`FILES_ENV_VAR`] 读取）；
//! 2. 直接构建 [`ConfigStore`] 在单线程中使用，或交给 [`ConfigService::start`] 获得可共享的 [`ConfigHandle`]；
//! 3. 通过 `register` 订阅变更，保留返回的 [`Subscription`]，丢弃即注销。
//!
//! ## 设计取舍（Trade-offs）
//! - 变更通知同步投递且不设超时：慢观察者会阻塞整个存储，这是为了保证调用方返回时所有观察者已看到新值；
//! - 文件锁与原子替换不在职责范围内，写回采用“读入、改写一行、整体写出”。

pub mod builder;
pub mod entry;
pub mod error;
pub mod ini;
pub mod notify;
pub mod service;
pub mod store;
pub mod value;

pub use builder::{ConfigStoreBuilder, FILES_ENV_VAR};
pub use entry::{ConfigEntry, EntryKey, ParseResult};
pub use error::{ConfigError, ConfigErrorKind};
pub use ini::{
    parser::{parse, parse_file, parse_with},
    writer::{IniFileWriter, NoopWriter, PersistenceWriter, check_persistable},
};
pub use notify::{ChangeEvent, ChangeListener, ChangeNotifier, ChangeValue, Subscription};
pub use service::{ConfigHandle, ConfigService, LifecycleState};
pub use store::ConfigStore;
pub use value::ConfigValueType;
