//! 键值持久化模块
//!
//! # 设计思路
//!
//! 队列与面板状态只需要“按键读写 JSON 值”的能力，持久化介质本身
//! （扩展存储区、本地文件、内存）对上层不可见。这里以 `KvStore` trait
//! 收口，文件实现用于常驻运行，内存实现用于测试与一次性会话。
//!
//! # 实现思路
//!
//! - 文件实现一键一文件（`<key>.json`），写入整体覆盖，避免部分写坏整个存储区。
//! - 键名限制为字母数字与 `-_`，防止拼出路径分隔符。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::AppError;

/// 按键读写 JSON 值的最小存储接口。
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, AppError>;
    fn set(&self, key: &str, value: serde_json::Value) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// 目录内一键一文件的 JSON 存储。
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// 打开（必要时创建）存储目录。
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::Storage(format!("创建存储目录失败: {}", e)))?;
        Ok(Self { dir })
    }

    fn file_path(&self, key: &str) -> Result<PathBuf, AppError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::Storage(format!("非法存储键名: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, AppError> {
        let path = self.file_path(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let parsed = serde_json::from_str::<serde_json::Value>(&content)
            .map_err(|e| AppError::Storage(format!("解析存储文件 '{}' 失败: {}", key, e)))?;

        Ok(Some(parsed))
    }

    fn set(&self, key: &str, value: serde_json::Value) -> Result<(), AppError> {
        let path = self.file_path(key)?;
        let content = serde_json::to_string_pretty(&value)
            .map_err(|e| AppError::Storage(format!("序列化存储值失败: {}", e)))?;

        fs::write(path, content)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let path = self.file_path(key)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// 进程内存储，用于测试与不落盘的会话。
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, AppError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Storage("存储锁已中毒".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: serde_json::Value) -> Result<(), AppError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Storage("存储锁已中毒".to_string()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::Storage("存储锁已中毒".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}
