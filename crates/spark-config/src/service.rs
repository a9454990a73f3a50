//! 串行服务：单一线程独占存储，所有读写排队逐个处理。
//!
//! # 教案式说明
//! - **意图（Why）**：存储本身没有锁。把它交给唯一的服务线程持有，外部调用方通过
//!   [`ConfigHandle`] 发送请求，即可得到严格线性的读写历史；
//! - **逻辑（How）**：
//!   1. [`ConfigService::start`] 先加载文件（缺失即失败，不进入运行态），再创建专用的
//!      操作系统线程；
//!   2. 服务线程以 `blocking_recv` 从有界 `mpsc` 队列中逐个取出请求，执行后通过 `oneshot` 回复；
//!   3. `set`/`delete` 在回复之前同步通知全部观察者，慢观察者会阻塞后续请求；
//!   4. 收到停止请求后关闭队列、切换到 [`LifecycleState::Stopped`]，并把存储交还给
//!      [`ConfigService::stop`] 的调用方；
//! - **契约（What）**：
//!   - 生命周期只有 `Uninitialized → Running → Stopped` 两次跃迁；观察者 panic 导致服务线程
//!     退出时同样切换到 `Stopped`；
//!   - 任何请求以 [`ConfigError::Stopped`] 失败时，[`ConfigHandle::state`] 已经是 `Stopped`；
//!   - 启动不依赖 Tokio 运行时；句柄上的异步方法可以在任意执行器中等待。
//! - **设计权衡（Trade-offs）**：
//!   - 观察者回调与写回文件的 `std::fs` 读写都是同步阻塞操作，放在专用线程上执行，
//!     只会拖慢配置存储本身，不会占住宿主运行时的工作线程；
//!   - 通知投递不设超时，与存储层保持一致；需要隔离的观察者应自行把事件转交给其它任务。

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use crate::{
    builder::ConfigStoreBuilder,
    entry::ConfigEntry,
    error::ConfigError,
    notify::{ChangeListener, Subscription},
    store::ConfigStore,
    value::ConfigValueType,
};

/// 服务线程名。
pub const SERVICE_THREAD_NAME: &str = "spark-config";

/// 请求队列容量；队列满时调用方在 `send` 处等待。
pub const REQUEST_QUEUE_CAPACITY: usize = 64;

/// 服务生命周期。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Running,
    Stopped,
}

impl LifecycleState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Request {
    All {
        reply: oneshot::Sender<Vec<ConfigEntry>>,
    },
    Section {
        section: String,
        reply: oneshot::Sender<Vec<(String, String)>>,
    },
    Get {
        section: String,
        key: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Set {
        section: String,
        key: String,
        value: String,
        persist: bool,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    Delete {
        section: String,
        key: String,
        persist: bool,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    Register {
        listener: Arc<dyn ChangeListener>,
        reply: oneshot::Sender<Subscription>,
    },
    Reload {
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// 运行中的配置服务：停止时从服务线程取回存储。
pub struct ConfigService {
    handle: ConfigHandle,
    finished: oneshot::Receiver<thread::Result<ConfigStore>>,
}

impl ConfigService {
    /// 加载 Builder 登记的文件并启动服务。
    ///
    /// 文件缺失属于致命启动错误：返回 [`ConfigError::NotFound`]，服务不会进入运行态。
    pub fn start(builder: ConfigStoreBuilder) -> Result<Self, ConfigError> {
        let store = builder.build()?;
        Self::spawn(store)
    }

    /// 以已经加载好的存储启动服务。
    ///
    /// 服务运行在名为 [`SERVICE_THREAD_NAME`] 的专用线程上，调用方无需处于 Tokio 运行时内。
    /// 线程创建失败时返回 [`ConfigError::Spawn`]。
    pub fn spawn(store: ConfigStore) -> Result<Self, ConfigError> {
        let (state_tx, state_rx) = watch::channel(LifecycleState::Uninitialized);
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let (finished_tx, finished_rx) = oneshot::channel();

        let entries = store.len();
        let files = store.files().len();
        state_tx.send_replace(LifecycleState::Running);
        let state = StateGuard(state_tx);

        thread::Builder::new()
            .name(SERVICE_THREAD_NAME.to_owned())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    serve(store, requests_rx, state)
                }));
                // 服务对象已被丢弃时无人等待结果。
                let _ = finished_tx.send(outcome);
            })
            .map_err(|source| ConfigError::Spawn { source })?;
        info!(entries, files, "configuration service running");

        Ok(Self {
            handle: ConfigHandle {
                requests: requests_tx,
                state: state_rx,
            },
            finished: finished_rx,
        })
    }

    /// 返回可克隆的访问句柄。
    pub fn handle(&self) -> ConfigHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.handle.state()
    }

    /// 停止服务并取回存储。
    ///
    /// 若服务已经通过某个句柄停止，本方法直接等待服务线程结束。服务线程内的 panic
    /// （例如观察者 panic）在此处重新抛出。
    pub async fn stop(self) -> Result<ConfigStore, ConfigError> {
        match self.handle.stop().await {
            Ok(()) | Err(ConfigError::Stopped) => {}
            Err(other) => return Err(other),
        }
        match self.finished.await {
            Ok(Ok(store)) => Ok(store),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(ConfigError::Stopped),
        }
    }
}

impl fmt::Debug for ConfigService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigService")
            .field("state", &self.state())
            .finish()
    }
}

/// 服务访问句柄，可在任意任务间克隆共享。
#[derive(Clone)]
pub struct ConfigHandle {
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<LifecycleState>,
}

impl ConfigHandle {
    /// 当前生命周期状态。
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// 全量导出，按 `(section, key)` 排序。
    pub async fn all(&self) -> Result<Vec<ConfigEntry>, ConfigError> {
        self.call(|reply| Request::All { reply }).await
    }

    pub async fn get_section(&self, section: &str) -> Result<Vec<(String, String)>, ConfigError> {
        let section = section.to_owned();
        self.call(|reply| Request::Section { section, reply }).await
    }

    pub async fn get(&self, section: &str, key: &str) -> Result<Option<String>, ConfigError> {
        let (section, key) = (section.to_owned(), key.to_owned());
        self.call(|reply| Request::Get {
            section,
            key,
            reply,
        })
        .await
    }

    pub async fn get_or(
        &self,
        section: &str,
        key: &str,
        default: &str,
    ) -> Result<String, ConfigError> {
        Ok(self
            .get(section, key)
            .await?
            .unwrap_or_else(|| default.to_owned()))
    }

    /// 读取并按类型解释；缺失时返回 `default`。
    pub async fn get_typed<T>(&self, section: &str, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: ConfigValueType,
    {
        let Some(text) = self.get(section, key).await? else {
            return Ok(default);
        };
        T::parse(&text).ok_or_else(|| ConfigError::InvalidValue {
            section: section.to_owned(),
            key: key.to_owned(),
            value: text,
            expected: T::EXPECTED,
        })
    }

    /// 写入条目；返回时全部观察者均已处理该事件。
    pub async fn set(
        &self,
        section: &str,
        key: &str,
        value: &str,
        persist: bool,
    ) -> Result<(), ConfigError> {
        let (section, key, value) = (section.to_owned(), key.to_owned(), value.to_owned());
        self.call(|reply| Request::Set {
            section,
            key,
            value,
            persist,
            reply,
        })
        .await?
    }

    /// 删除条目；键不存在时返回 [`ConfigError::MissingKey`]。
    pub async fn delete(&self, section: &str, key: &str, persist: bool) -> Result<(), ConfigError> {
        let (section, key) = (section.to_owned(), key.to_owned());
        self.call(|reply| Request::Delete {
            section,
            key,
            persist,
            reply,
        })
        .await?
    }

    /// 注册观察者；返回的句柄被丢弃后订阅自动失效。
    pub async fn register(
        &self,
        listener: Arc<dyn ChangeListener>,
    ) -> Result<Subscription, ConfigError> {
        self.call(|reply| Request::Register { listener, reply }).await
    }

    /// 按原文件列表重新加载。
    pub async fn reload(&self) -> Result<(), ConfigError> {
        self.call(|reply| Request::Reload { reply }).await?
    }

    /// 请求服务停止；已停止时返回 [`ConfigError::Stopped`]。
    pub async fn stop(&self) -> Result<(), ConfigError> {
        self.call(|reply| Request::Stop { reply }).await
    }

    /// 等待服务进入 [`LifecycleState::Stopped`]。
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // 发送端析构前必定写入 Stopped，通道关闭同样意味着服务已退出。
        let _ = state
            .wait_for(|state| *state == LifecycleState::Stopped)
            .await;
    }

    async fn call<T, F>(&self, request: F) -> Result<T, ConfigError>
    where
        F: FnOnce(oneshot::Sender<T>) -> Request,
    {
        let (reply, response) = oneshot::channel();
        let replied = match self.requests.send(request(reply)).await {
            Ok(()) => response.await.ok(),
            Err(_) => None,
        };
        match replied {
            Some(value) => Ok(value),
            None => {
                self.stopped().await;
                Err(ConfigError::Stopped)
            }
        }
    }
}

impl fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("state", &self.state())
            .finish()
    }
}

fn serve(
    mut store: ConfigStore,
    mut requests: mpsc::Receiver<Request>,
    state: StateGuard,
) -> ConfigStore {
    while let Some(request) = requests.blocking_recv() {
        // 调用方放弃等待时 `send` 失败，结果直接丢弃。
        match request {
            Request::All { reply } => {
                let _ = reply.send(store.list_all());
            }
            Request::Section { section, reply } => {
                let _ = reply.send(store.get_section(&section));
            }
            Request::Get {
                section,
                key,
                reply,
            } => {
                let _ = reply.send(store.get(&section, &key).map(str::to_owned));
            }
            Request::Set {
                section,
                key,
                value,
                persist,
                reply,
            } => {
                let _ = reply.send(store.set(&section, &key, &value, persist));
            }
            Request::Delete {
                section,
                key,
                persist,
                reply,
            } => {
                let _ = reply.send(store.delete(&section, &key, persist));
            }
            Request::Register { listener, reply } => {
                let _ = reply.send(store.register(listener));
            }
            Request::Reload { reply } => {
                let _ = reply.send(store.reload());
            }
            Request::Stop { reply } => {
                requests.close();
                state.stop();
                let _ = reply.send(());
                break;
            }
        }
    }

    store
}

/// 生命周期发送端。服务线程正常退出或因 panic 展开时，析构都会写入 `Stopped`。
struct StateGuard(watch::Sender<LifecycleState>);

impl StateGuard {
    fn stop(&self) {
        self.0.send_replace(LifecycleState::Stopped);
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        self.stop();
        if thread::panicking() {
            warn!("configuration service aborted by a panic");
        } else {
            info!("configuration service stopped");
        }
    }
}
