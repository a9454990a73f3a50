//! 变更通知：把存储上的每次 `set`/`delete` 同步广播给已注册的观察者。
//!
//! # 教案式说明
//! - **意图（Why）**：运行期调参需要让依赖方立即感知新值，例如连接池上限、日志级别；
//! - **逻辑（How）**：
//!   - 观察者以 [`ChangeListener`] 形式注册，返回的 [`Subscription`] 即“所有者句柄”；
//!   - 通知器只持有所有者的弱引用，句柄被丢弃或显式 [`Subscription::cancel`] 后，
//!     下一次广播或注册时即被清理，不会无限累积失效订阅；
//! - **契约（What）**：
//!   - [`ChangeNotifier::notify`] 在调用线程上按注册顺序逐个调用观察者，全部返回后才结束；
//!   - 任一观察者返回错误即终止本轮投递，错误原样交给进行中的 `set`/`delete` 调用方；
//! - **设计权衡（Trade-offs）**：投递不设超时，慢观察者会阻塞整个存储。这是有意保留的语义，
//!   需要隔离的观察者应自行把事件转交到独立任务。

use std::sync::{Arc, Weak};

use serde::Serialize;
use tracing::warn;

use crate::error::ConfigError;

/// 事件中携带的值：新值或删除标记。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeValue {
    Value(String),
    Deleted,
}

impl ChangeValue {
    /// 返回新值；删除事件返回 `None`。
    pub fn as_value(&self) -> Option<&str> {
        match self {
            Self::Value(value) => Some(value),
            Self::Deleted => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

/// 单次变更事件 `(section, key, value_or_deleted, persisted)`。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub section: String,
    pub key: String,
    pub value: ChangeValue,
    pub persisted: bool,
}

impl ChangeEvent {
    pub fn updated(section: &str, key: &str, value: &str, persisted: bool) -> Self {
        Self {
            section: section.to_owned(),
            key: key.to_owned(),
            value: ChangeValue::Value(value.to_owned()),
            persisted,
        }
    }

    pub fn deleted(section: &str, key: &str, persisted: bool) -> Self {
        Self {
            section: section.to_owned(),
            key: key.to_owned(),
            value: ChangeValue::Deleted,
            persisted,
        }
    }
}

/// 配置变更观察者。
///
/// ### 契约说明（What）
/// - `on_change` 在存储的服务线程上同步执行，应尽快返回；
/// - 返回 `Err` 会中止本轮投递，并让触发变更的调用以该错误结束。
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent) -> Result<(), ConfigError>;
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent) -> Result<(), ConfigError> + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) -> Result<(), ConfigError> {
        self(event)
    }
}

/// 订阅的所有者句柄。
///
/// 句柄存活期间观察者持续收到事件；丢弃或 [`cancel`](Self::cancel) 后订阅失效。
#[derive(Debug)]
#[must_use = "dropping a subscription unregisters its listener"]
pub struct Subscription {
    _owner: Arc<()>,
}

impl Subscription {
    /// 显式注销，与直接丢弃句柄等价。
    pub fn cancel(self) {}
}

struct Subscriber {
    owner: Weak<()>,
    listener: Arc<dyn ChangeListener>,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

/// 观察者列表，由存储独占持有。
#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: Vec<Subscriber>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册观察者，返回其所有者句柄。
    pub fn register(&mut self, listener: Arc<dyn ChangeListener>) -> Subscription {
        self.prune();
        let owner = Arc::new(());
        self.subscribers.push(Subscriber {
            owner: Arc::downgrade(&owner),
            listener,
        });
        Subscription { _owner: owner }
    }

    /// 当前仍然有效的观察者数量。
    pub fn len(&self) -> usize {
        self.subscribers.iter().filter(|s| s.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 同步投递事件。
    ///
    /// ### 执行逻辑（How）
    /// 1. 清理所有者已失效的订阅；
    /// 2. 按注册顺序依次调用观察者，遇到第一个错误立即返回。
    pub fn notify(&mut self, event: &ChangeEvent) -> Result<(), ConfigError> {
        self.prune();
        for subscriber in &self.subscribers {
            if let Err(err) = subscriber.listener.on_change(event) {
                warn!(
                    section = event.section.as_str(),
                    key = event.key.as_str(),
                    error = %err,
                    "change listener failed, aborting delivery"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    fn prune(&mut self) {
        self.subscribers.retain(Subscriber::is_live);
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
