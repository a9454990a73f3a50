//! 分层加载与运行期修改的端到端场景。
//!
//! # 教案级导览
//!
//! - **Why**：单元测试分别覆盖了解析器、写回器与通知器；本文件把它们串起来，
//!   以 `fixtures/` 下的两层文件（`default.ini` 为出厂默认，`local.ini` 为站点覆盖）
//!   验证宿主进程真正观察到的行为。
//! - **How**：每个测试先把夹具复制到临时目录，写回只会改动副本；需要观察写回参数时
//!   使用 [`RecordingWriter`] 替代默认写回器。
//! - **What**：覆盖后者覆盖前者、空值删除跨层生效、`set` 的内存/写回/通知顺序、
//!   删除写回后重新加载仍保持删除。

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use spark_config::{
    ChangeEvent, ConfigEntry, ConfigError, ConfigErrorKind, ConfigStore, PersistenceWriter,
};
use tempfile::TempDir;

const DEFAULT_INI: &str = include_str!("fixtures/default.ini");
const LOCAL_INI: &str = include_str!("fixtures/local.ini");

type SaveCall = (String, String, Option<String>, PathBuf);

/// 只记录调用参数、不触碰磁盘的写回器。
#[derive(Clone, Default)]
struct RecordingWriter {
    calls: Arc<Mutex<Vec<SaveCall>>>,
}

impl PersistenceWriter for RecordingWriter {
    fn save(
        &self,
        section: &str,
        key: &str,
        value: Option<&str>,
        file: &Path,
    ) -> Result<(), ConfigError> {
        self.calls.lock().unwrap().push((
            section.to_owned(),
            key.to_owned(),
            value.map(str::to_owned),
            file.to_path_buf(),
        ));
        Ok(())
    }
}

fn layered_files() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let default = dir.path().join("default.ini");
    let local = dir.path().join("local.ini");
    fs::write(&default, DEFAULT_INI).expect("write default.ini");
    fs::write(&local, LOCAL_INI).expect("write local.ini");
    (dir, default, local)
}

fn recorder(store: &mut ConfigStore) -> (Arc<Mutex<Vec<ChangeEvent>>>, spark_config::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = store.register(Arc::new(
        move |event: &ChangeEvent| -> Result<(), ConfigError> {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        },
    ));
    (seen, subscription)
}

#[test]
fn merged_view_is_sorted_and_later_layers_win() {
    let (_dir, default, local) = layered_files();
    let store = ConfigStore::load([default, local]).expect("load");

    let expected = vec![
        ConfigEntry::new("db", "max_size", "100"),
        ConfigEntry::new("db", "name", "widget extra"),
        ConfigEntry::new("db", "path", "/var/lib/spark"),
        ConfigEntry::new("httpd", "port", "15984"),
        ConfigEntry::new(
            "httpd",
            "socket_options",
            "[{recbuf, 262144}, {sndbuf, 262144}]",
        ),
        ConfigEntry::new("log", "file", "/var/log/spark.log"),
        ConfigEntry::new("log", "level", "debug"),
    ];
    assert_eq!(store.list_all(), expected);

    // `bind_address =` 在覆盖层中删除了默认层的值；空 section 不产生条目。
    assert_eq!(store.get("httpd", "bind_address"), None);
    assert!(store.get_section("admins").is_empty());
    assert_eq!(store.get_integer("httpd", "port", 0).unwrap(), 15984);
}

#[test]
fn single_file_example_parses_as_documented() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("only.ini");
    fs::write(
        &file,
        "[db]\nmax_size = 100\n; a comment\nname = widget\n extra\n",
    )
    .expect("write");

    let store = ConfigStore::load([&file]).expect("load");
    assert_eq!(
        store.list_all(),
        vec![
            ConfigEntry::new("db", "max_size", "100"),
            ConfigEntry::new("db", "name", "widget extra"),
        ]
    );
}

#[test]
fn set_updates_memory_then_persists_then_notifies() {
    let (_dir, default, local) = layered_files();
    let writer = RecordingWriter::default();
    let mut store = ConfigStore::builder()
        .with_file(&default)
        .with_file(&local)
        .with_writer(writer.clone())
        .build()
        .expect("build");
    let (seen, _subscription) = recorder(&mut store);

    store.set("db", "max_size", "200", true).expect("set");

    assert_eq!(store.get("db", "max_size"), Some("200"));
    assert_eq!(
        *writer.calls.lock().unwrap(),
        vec![(
            "db".to_owned(),
            "max_size".to_owned(),
            Some("200".to_owned()),
            local.clone(),
        )]
    );
    assert_eq!(
        *seen.lock().unwrap(),
        vec![ChangeEvent::updated("db", "max_size", "200", true)]
    );
}

#[test]
fn transient_set_skips_the_writer() {
    let (_dir, default, local) = layered_files();
    let writer = RecordingWriter::default();
    let mut store = ConfigStore::builder()
        .with_files([default, local])
        .with_writer(writer.clone())
        .build()
        .expect("build");
    let (seen, _subscription) = recorder(&mut store);

    store.set("log", "level", "trace", false).expect("set");

    assert!(writer.calls.lock().unwrap().is_empty());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![ChangeEvent::updated("log", "level", "trace", false)]
    );
}

#[test]
fn persisted_changes_survive_reload() {
    let (_dir, default, local) = layered_files();
    let mut store = ConfigStore::load([&default, &local]).expect("load");

    store.set("db", "max_size", "200", true).expect("set");
    store.delete("log", "level", true).expect("delete");
    store.reload().expect("reload");

    assert_eq!(store.get("db", "max_size"), Some("200"));
    assert_eq!(store.get("log", "level"), None);

    let on_disk = fs::read_to_string(&local).expect("read local.ini");
    assert!(on_disk.contains("[db]\nmax_size = 200\n"), "{on_disk}");
    assert!(on_disk.contains("[log]\nlevel =\n"), "{on_disk}");
    // 默认层从不被写回。
    assert_eq!(fs::read_to_string(&default).unwrap(), DEFAULT_INI);
}

#[test]
fn failing_writer_leaves_memory_updated_and_skips_notification() {
    struct BrokenWriter;

    impl PersistenceWriter for BrokenWriter {
        fn save(
            &self,
            _: &str,
            _: &str,
            _: Option<&str>,
            file: &Path,
        ) -> Result<(), ConfigError> {
            Err(ConfigError::NotFound {
                path: file.to_path_buf(),
            })
        }
    }

    let (_dir, default, local) = layered_files();
    let mut store = ConfigStore::builder()
        .with_files([default, local])
        .with_writer(BrokenWriter)
        .build()
        .expect("build");
    let (seen, _subscription) = recorder(&mut store);

    let err = store.set("db", "max_size", "300", true).unwrap_err();
    assert_eq!(err.kind(), ConfigErrorKind::NotFound);
    assert_eq!(store.get("db", "max_size"), Some("300"));
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn missing_layer_names_the_offending_path() {
    let (dir, default, _local) = layered_files();
    let absent = dir.path().join("site.ini");

    let err = ConfigStore::load([default, absent.clone()]).unwrap_err();
    assert_eq!(err.kind(), ConfigErrorKind::NotFound);
    assert!(err.to_string().contains("site.ini"), "{err}");
}
